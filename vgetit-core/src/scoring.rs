// Verification score: a pure function of a target's current facts

/// Score ceiling.
pub const MAX_SCORE: f64 = 5.0;

const FACT_WEIGHT: f64 = 1.0;
const RATING_WEIGHT: f64 = 0.4;

/// The facts the score is derived from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreInputs {
    pub address_verified: bool,
    pub any_phone_verified: bool,
    pub any_contact_verified: bool,
    pub ratings: Vec<u8>,
}

/// One point per verified fact kind plus 0.4 per average rating star,
/// capped at [`MAX_SCORE`] and rounded to one decimal.
pub fn compute_score(inputs: &ScoreInputs) -> f64 {
    let mut base = 0.0;
    if inputs.address_verified {
        base += FACT_WEIGHT;
    }
    if inputs.any_phone_verified {
        base += FACT_WEIGHT;
    }
    if inputs.any_contact_verified {
        base += FACT_WEIGHT;
    }

    let avg_rating = if inputs.ratings.is_empty() {
        0.0
    } else {
        inputs.ratings.iter().map(|&r| f64::from(r)).sum::<f64>() / inputs.ratings.len() as f64
    };

    let score = (base + avg_rating * RATING_WEIGHT).clamp(0.0, MAX_SCORE);
    (score * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_facts_scores_zero() {
        assert_eq!(compute_score(&ScoreInputs::default()), 0.0);
    }

    #[test]
    fn test_address_and_phone() {
        let inputs = ScoreInputs {
            address_verified: true,
            any_phone_verified: true,
            ..Default::default()
        };
        assert_eq!(compute_score(&inputs), 2.0);
    }

    #[test]
    fn test_ratings_are_averaged() {
        let inputs = ScoreInputs {
            any_contact_verified: true,
            ratings: vec![4, 5],
            ..Default::default()
        };
        // 1 + 4.5 * 0.4
        assert_eq!(compute_score(&inputs), 2.8);
    }

    #[test]
    fn test_rounded_to_one_decimal() {
        let inputs = ScoreInputs {
            ratings: vec![1, 1, 2],
            ..Default::default()
        };
        // 4/3 * 0.4 = 0.5333
        assert_eq!(compute_score(&inputs), 0.5);
    }

    #[test]
    fn test_capped_at_five() {
        let inputs = ScoreInputs {
            address_verified: true,
            any_phone_verified: true,
            any_contact_verified: true,
            ratings: vec![5, 5, 5],
        };
        assert_eq!(compute_score(&inputs), MAX_SCORE);
    }

    #[test]
    fn test_idempotent() {
        let inputs = ScoreInputs {
            address_verified: true,
            ratings: vec![3],
            ..Default::default()
        };
        assert_eq!(compute_score(&inputs), compute_score(&inputs));
    }
}
