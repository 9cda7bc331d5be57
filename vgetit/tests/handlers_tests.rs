use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};
use url::Url;
use vgetit::handlers::*;
use vgetit_core::model::{Job, JobState};
use vgetit_core::{Database, ScrapeResponse};
use vgetit_scanner::{Confidence, ContactEntry, Extraction, FactBundle, PhoneEntry};

fn scraped_details() -> vgetit_core::TargetDetails {
    let mut db = Database::in_memory().unwrap();
    let bundle = FactBundle {
        name: "Acme".to_string(),
        address: "1 Main St".to_string(),
        phone_numbers: vec![PhoneEntry::new("+15551234567", Some("office"))],
        socials: vec!["https://twitter.com/acme".to_string()],
        listed_contacts: vec![ContactEntry {
            name: "Jane Roe".to_string(),
            level: "CEO".to_string(),
            ..Default::default()
        }],
    };
    db.apply_extraction("acme.com", &Extraction::new(bundle, Confidence::High))
        .unwrap();
    db.submit_rating("acme.com", "alice", 4, "quick to answer").unwrap();
    db.target_details("acme.com").unwrap().unwrap()
}

#[test]
fn test_parse_key_line_with_scheme() {
    let result = parse_key_line("https://www.example.com/about");
    assert_eq!(result, Some("example.com".to_string()));
}

#[test]
fn test_parse_key_line_bare_host() {
    let result = parse_key_line("  Example.COM ");
    assert_eq!(result, Some("example.com".to_string()));
}

#[test]
fn test_parse_key_line_invalid() {
    assert_eq!(parse_key_line("not a valid host!!!"), None);
    assert_eq!(parse_key_line(""), None);
}

#[test]
fn test_load_keys_from_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut temp_file = NamedTempFile::new()?;
    writeln!(temp_file, "https://example.com")?;
    writeln!(temp_file, "# comment")?;
    writeln!(temp_file, "httpbin.org")?;
    writeln!(temp_file)?; // Empty line
    writeln!(temp_file, "www.api.example.com")?;

    let path = PathBuf::from(temp_file.path());
    let keys = load_keys_from_file(&path)?;

    assert_eq!(keys, vec!["example.com", "httpbin.org", "api.example.com"]);
    Ok(())
}

#[test]
fn test_load_keys_from_file_empty() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file).unwrap();
    writeln!(temp_file, "   ").unwrap();

    let path = PathBuf::from(temp_file.path());
    let result = load_keys_from_file(&path);

    assert!(result.is_err());
    assert!(result.unwrap_err().contains("No valid targets"));
}

#[test]
fn test_load_keys_from_missing_file() {
    let path = PathBuf::from("/nonexistent/hosts.txt");
    let result = load_keys_from_file(&path);
    assert!(result.unwrap_err().contains("Failed to read hosts file"));
}

#[test]
fn test_load_keys_from_source_dedupes() {
    let keys = vec![
        "acme.com".to_string(),
        "https://www.acme.com/".to_string(),
        "globex.com".to_string(),
    ];
    let result = load_keys_from_source(&keys, None).unwrap();

    assert_eq!(result, vec!["acme.com", "globex.com"]);
}

#[test]
fn test_load_keys_from_source_prefers_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut temp_file = NamedTempFile::new()?;
    writeln!(temp_file, "initech.com")?;
    let path = PathBuf::from(temp_file.path());

    let result = load_keys_from_source(&[], Some(&path))?;
    assert_eq!(result, vec!["initech.com"]);
    Ok(())
}

#[test]
fn test_load_keys_from_source_no_input() {
    let result = load_keys_from_source(&[], None);
    assert!(result.is_err());
    assert!(
        result
            .unwrap_err()
            .contains("Either <KEY>... or --hosts-file must be provided")
    );
}

#[test]
fn test_resolve_db_path_absolute() {
    assert_eq!(
        resolve_db_path("/var/lib/vgetit/vgetit.db"),
        PathBuf::from("/var/lib/vgetit/vgetit.db")
    );
}

#[test]
fn test_db_path_for_init() {
    let temp_dir = TempDir::new().unwrap();
    let path = db_path_for_init(temp_dir.path());
    assert_eq!(path, temp_dir.path().join("vgetit.db"));
}

#[test]
fn test_scheduler_config_flags_override() {
    let config = scheduler_config(Some(12), Some(3));
    assert_eq!(config.min_interval, Duration::from_secs(12));
    assert_eq!(config.sweep_every, Duration::from_secs(3));
}

#[test]
fn test_build_extractor() {
    let primary = Url::parse("http://127.0.0.1:8000/extract").unwrap();
    let light = Url::parse("http://127.0.0.1:8001/light").unwrap();

    assert!(build_extractor(&primary, None, 10).is_ok());
    assert!(build_extractor(&primary, Some(&light), 10).is_ok());
}

#[test]
fn test_render_target_details() {
    let report = render_target_details(&scraped_details());

    assert!(report.contains("Acme (acme.com)"));
    assert!(report.contains("Slug: acme-com"));
    // 1 address + 1 phone + 4 * 0.4
    assert!(report.contains("Score: 3.6 / 5.0"));
    assert!(report.contains("1 Main St"));
    assert!(report.contains("+15551234567 (office)"));
    assert!(report.contains("Jane Roe, CEO"));
    assert!(report.contains("https://twitter.com/acme"));
    assert!(report.contains("alice 4/5"));
    assert!(report.contains("quick to answer"));
    assert!(!report.contains("Not scraped yet"));
}

#[test]
fn test_render_placeholder() {
    let mut db = Database::in_memory().unwrap();
    db.create_placeholder_target("acme.com").unwrap();
    let details = db.target_details("acme.com").unwrap().unwrap();

    let report = render_target_details(&details);
    assert!(report.contains("acme.com"));
    assert!(report.contains("Not scraped yet"));
    assert!(!report.contains("Phone numbers"));
}

#[test]
fn test_render_job_line() {
    let job = Job {
        id: 1,
        key: "down.example".to_string(),
        state: JobState::Failed,
        retry_count: 2,
        last_executed_at: None,
        error_message: Some("Upstream returned 503".to_string()),
        created_at: chrono::Utc::now(),
    };

    let line = render_job_line(&job);
    assert!(line.contains("failed"));
    assert!(line.contains("down.example"));
    assert!(line.contains("retries=2"));
    assert!(line.contains("Upstream returned 503"));
}

#[test]
fn test_render_response() {
    let processing = ScrapeResponse::Processing {
        slug: "acme-com".to_string(),
        job_state: Some(JobState::Pending),
    };
    let line = render_response("acme.com", &processing);
    assert!(line.contains("pending"));
    assert!(line.contains("acme-com"));

    let error = ScrapeResponse::Error {
        message: "invalid target".to_string(),
    };
    assert!(render_response("???", &error).contains("invalid target"));
}
