use serde::{Deserialize, Deserializer, Serialize};

/// How much the extraction path that produced a bundle is trusted.
///
/// The full path renders the whole page and reads the structured cards; the
/// light path fetches the raw page and scrapes what it can. Only facts from
/// the full path are allowed to mark an address as verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    #[default]
    High,
    Light,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Light => "light",
        }
    }
}

/// Structured output of one extraction attempt.
///
/// Every section is optional on the wire. Missing sections, `null` and the
/// empty-string placeholder emitted by partial pages all decode to empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactBundle {
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub address: String,
    #[serde(deserialize_with = "lenient_list")]
    pub phone_numbers: Vec<PhoneEntry>,
    #[serde(deserialize_with = "lenient_list")]
    pub socials: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub listed_contacts: Vec<ContactEntry>,
}

impl FactBundle {
    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPhone")]
pub struct PhoneEntry {
    pub number: String,
    pub description: Option<String>,
}

impl PhoneEntry {
    pub fn new(number: impl Into<String>, description: Option<&str>) -> Self {
        Self {
            number: number.into(),
            description: description.map(str::to_string),
        }
    }
}

// The light path lists bare numbers, the full path emits objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawPhone {
    Bare(String),
    Entry {
        #[serde(default)]
        number: String,
        #[serde(default)]
        description: Option<String>,
    },
}

impl From<RawPhone> for PhoneEntry {
    fn from(raw: RawPhone) -> Self {
        let (number, description) = match raw {
            RawPhone::Bare(number) => (number, None),
            RawPhone::Entry {
                number,
                description,
            } => (number, description),
        };
        PhoneEntry {
            number: number.trim().to_string(),
            description: description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactEntry {
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
    pub verified_profile: bool,
    #[serde(deserialize_with = "lenient_string")]
    pub level: String,
    pub google_link: Option<String>,
    pub linkedin_link: Option<String>,
}

/// A bundle together with the confidence of the path that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub bundle: FactBundle,
    pub confidence: Confidence,
}

impl Extraction {
    pub fn new(bundle: FactBundle, confidence: Confidence) -> Self {
        Self { bundle, confidence }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListOrText<T> {
    List(Vec<T>),
    Text(#[allow(dead_code)] String),
}

fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match Option::<ListOrText<T>>::deserialize(deserializer)? {
        Some(ListOrText::List(items)) => items,
        Some(ListOrText::Text(_)) | None => Vec::new(),
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .map(|s| s.trim().to_string())
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_bundle_decodes() {
        let json = r#"{
            "name": "Acme",
            "address": "1 Main St",
            "phone_numbers": [{"number": "+15551234567", "description": "HQ"}],
            "socials": ["https://twitter.com/acme"],
            "listed_contacts": [{
                "name": "Jane Roe",
                "verified_profile": true,
                "level": "C-Level",
                "google_link": "https://google.com/search?q=jane",
                "linkedin_link": null
            }]
        }"#;

        let bundle: FactBundle = serde_json::from_str(json).unwrap();
        assert_eq!(bundle.name, "Acme");
        assert_eq!(
            bundle.phone_numbers,
            vec![PhoneEntry::new("+15551234567", Some("HQ"))]
        );
        assert_eq!(bundle.socials.len(), 1);
        assert!(bundle.listed_contacts[0].verified_profile);
        assert_eq!(bundle.listed_contacts[0].linkedin_link, None);
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let bundle: FactBundle = serde_json::from_str(r#"{"name": "Acme"}"#).unwrap();
        assert_eq!(bundle.address, "");
        assert!(bundle.phone_numbers.is_empty());
        assert!(bundle.socials.is_empty());
        assert!(bundle.listed_contacts.is_empty());
    }

    #[test]
    fn test_light_path_placeholders() {
        let json = r#"{
            "name": null,
            "address": "",
            "phone_numbers": "",
            "socials": null,
            "listed_contacts": ""
        }"#;

        let bundle: FactBundle = serde_json::from_str(json).unwrap();
        assert!(!bundle.has_name());
        assert!(bundle.phone_numbers.is_empty());
        assert!(bundle.listed_contacts.is_empty());
    }

    #[test]
    fn test_bare_phone_numbers() {
        let json = r#"{"name": "Acme", "phone_numbers": [" +90 212 555 0000 ", "+15551234567"]}"#;
        let bundle: FactBundle = serde_json::from_str(json).unwrap();

        assert_eq!(bundle.phone_numbers[0].number, "+90 212 555 0000");
        assert_eq!(bundle.phone_numbers[0].description, None);
        assert_eq!(bundle.phone_numbers[1].number, "+15551234567");
    }

    #[test]
    fn test_blank_description_is_dropped() {
        let json = r#"{"phone_numbers": [{"number": "+15551234567", "description": "  "}]}"#;
        let bundle: FactBundle = serde_json::from_str(json).unwrap();
        assert_eq!(bundle.phone_numbers[0].description, None);
    }

    #[test]
    fn test_whitespace_name_is_unusable() {
        let bundle = FactBundle {
            name: "   ".to_string(),
            ..Default::default()
        };
        assert!(!bundle.has_name());
    }
}
