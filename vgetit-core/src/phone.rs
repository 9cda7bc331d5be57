use regex::Regex;
use std::sync::LazyLock;

// E.164: '+', a non-zero country code digit, then up to 15 digits in total
static E164_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+[1-9][0-9]{7,14}$").unwrap());

/// Strip the visual separators people put in phone numbers.
pub fn canonical_phone(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')' | '\u{a0}'))
        .collect()
}

/// Whether a scraped phone number parses as an international number.
///
/// Numbers without a country prefix are rejected: a scraped page gives no
/// reliable region to resolve them against.
pub fn is_verified_phone(raw: &str) -> bool {
    E164_RE.is_match(&canonical_phone(raw))
}
