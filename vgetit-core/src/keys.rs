// Target key normalization and display slugs

use crate::error::{CoreError, Result};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static NON_SLUG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

const TRANSLITERATIONS: &[(char, &str)] = &[
    ('ş', "s"),
    ('ı', "i"),
    ('ğ', "g"),
    ('ü', "u"),
    ('ö', "o"),
    ('ç', "c"),
    ('Ş', "s"),
    ('I', "i"),
    ('Ğ', "g"),
    ('Ü', "u"),
    ('Ö', "o"),
    ('Ç', "c"),
    ('İ', "i"),
];

/// Normalize user input (`Acme.com`, `https://www.acme.com/about`) to the
/// hostname that keys a target (`acme.com`).
pub fn normalize_target_key(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidKey(raw.to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let parsed = Url::parse(&with_scheme).map_err(|_| CoreError::InvalidKey(raw.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| CoreError::InvalidKey(raw.to_string()))?
        .trim_end_matches('.')
        .to_lowercase();

    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if host.is_empty() {
        return Err(CoreError::InvalidKey(raw.to_string()));
    }
    Ok(host)
}

/// Derive a URL-safe slug from a target key.
pub fn slugify(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    // Transliterate before lowercasing so 'I' and 'İ' map to a plain 'i'
    let mut ascii = String::with_capacity(text.len());
    for c in text.chars() {
        match TRANSLITERATIONS.iter().find(|(from, _)| *from == c) {
            Some((_, to)) => ascii.push_str(to),
            None => ascii.push(c),
        }
    }

    let lowered = ascii
        .to_lowercase()
        .replace("https://", "")
        .replace("http://", "")
        .replace("www.", "");

    NON_SLUG_RE
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// Slug used when a key has no slug-able characters at all.
pub const FALLBACK_SLUG: &str = "target";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_bare_host() {
        assert_eq!(normalize_target_key("acme.com").unwrap(), "acme.com");
    }

    #[test]
    fn test_normalize_strips_scheme_path_and_www() {
        assert_eq!(
            normalize_target_key("https://www.Acme.com/about?x=1").unwrap(),
            "acme.com"
        );
        assert_eq!(normalize_target_key("  ACME.com.  ").unwrap(), "acme.com");
    }

    #[test]
    fn test_normalize_keeps_subdomains_and_ports_out() {
        assert_eq!(
            normalize_target_key("http://shop.acme.co.uk:8080/").unwrap(),
            "shop.acme.co.uk"
        );
    }

    #[test]
    fn test_normalize_rejects_empty_and_hostless() {
        assert!(matches!(
            normalize_target_key("   "),
            Err(CoreError::InvalidKey(_))
        ));
        assert!(normalize_target_key("mailto:someone").is_err());
        assert!(normalize_target_key("http://").is_err());
    }

    #[test]
    fn test_slugify_hostname() {
        assert_eq!(slugify("acme.com"), "acme-com");
        assert_eq!(slugify("https://www.acme.com/"), "acme-com");
    }

    #[test]
    fn test_slugify_transliterates_turkish() {
        assert_eq!(slugify("Şirket Çiçek Ğüzel"), "sirket-cicek-guzel");
        assert_eq!(slugify("İstanbul Işık"), "istanbul-isik");
    }

    #[test]
    fn test_slugify_collapses_and_trims_separators() {
        assert_eq!(slugify("--a__b  c--"), "a-b-c");
        assert_eq!(slugify("..."), "");
        assert_eq!(slugify(""), "");
    }
}
