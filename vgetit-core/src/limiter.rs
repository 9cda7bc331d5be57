use crate::clock::Clock;
use crate::data::Database;
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Global admission gate for extractions.
///
/// Behaves as a token bucket of depth one refilled every `min_interval`,
/// shared by every target: the extractor talks to a single origin. The last
/// execution time lives in the job table, so the limit survives restarts.
/// Callers must hold the store lock across `permits` and the admission that
/// follows it.
#[derive(Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_interval,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Whether a job may start now: nothing in flight and no counted
    /// execution within the interval.
    pub fn permits(&self, db: &Database) -> Result<bool> {
        if db.processing_count()? > 0 {
            return Ok(false);
        }
        Ok(self.interval_elapsed(db.last_execution_at()?, self.now()))
    }

    pub fn interval_elapsed(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let Some(last) = last else {
            return true;
        };
        match (now - last).to_std() {
            Ok(since) => since >= self.min_interval,
            // Last execution is in the future; the clock went backwards
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeDelta;

    fn limiter(secs: u64) -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limiter = RateLimiter::new(Duration::from_secs(secs), clock.clone());
        (clock, limiter)
    }

    #[test]
    fn test_first_execution_is_permitted() {
        let (clock, limiter) = limiter(5);
        assert!(limiter.interval_elapsed(None, clock.now()));
    }

    #[test]
    fn test_interval_boundary() {
        let (clock, limiter) = limiter(5);
        let last = clock.now();

        assert!(!limiter.interval_elapsed(Some(last), last + TimeDelta::milliseconds(4999)));
        assert!(limiter.interval_elapsed(Some(last), last + TimeDelta::seconds(5)));
    }

    #[test]
    fn test_clock_skew_denies() {
        let (clock, limiter) = limiter(5);
        let now = clock.now();
        assert!(!limiter.interval_elapsed(Some(now + TimeDelta::seconds(60)), now));
    }

    #[test]
    fn test_permits_reads_job_table() {
        let (clock, limiter) = limiter(5);
        let mut db = Database::in_memory().unwrap();
        assert!(limiter.permits(&db).unwrap());

        db.get_or_create_job("acme.com", clock.now()).unwrap();
        db.admit_job("acme.com").unwrap();
        // In flight
        assert!(!limiter.permits(&db).unwrap());

        db.record_execution("acme.com", clock.now()).unwrap();
        db.complete_job("acme.com", None).unwrap();
        assert!(!limiter.permits(&db).unwrap());

        clock.advance(TimeDelta::seconds(5));
        assert!(limiter.permits(&db).unwrap());
    }

    #[test]
    fn test_failed_executions_do_not_count() {
        let (clock, limiter) = limiter(5);
        let mut db = Database::in_memory().unwrap();

        db.get_or_create_job("acme.com", clock.now()).unwrap();
        db.admit_job("acme.com").unwrap();
        db.record_execution("acme.com", clock.now()).unwrap();
        db.fail_job("acme.com", "boom").unwrap();

        assert!(limiter.permits(&db).unwrap());
    }
}
