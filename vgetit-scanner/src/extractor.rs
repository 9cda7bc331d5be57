use crate::bundle::{Confidence, Extraction, FactBundle};
use crate::error::{ExtractError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Anything that can turn a target key into a fact bundle.
///
/// Implementations may be slow and unreliable; callers treat every error as
/// a failed attempt and never retry on their own.
#[async_trait]
pub trait FactExtractor: Send + Sync {
    async fn extract(&self, key: &str) -> Result<Extraction>;
}

/// Fetches fact bundles as JSON from an extraction service at `{base}/{key}`.
pub struct HttpExtractor {
    client: Client,
    base_url: Url,
    confidence: Confidence,
}

impl HttpExtractor {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, 30)
    }

    pub fn with_timeout(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent("vgetit/0.1 (company directory)")
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs((timeout_secs / 2).max(1)))
            .pool_idle_timeout(Duration::from_secs(90))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        // Url::join drops the last path segment unless the base ends with '/'
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| ExtractError::Other(format!("Invalid extractor URL {}: {}", base_url, e)))?;

        Ok(Self {
            client,
            base_url,
            confidence: Confidence::High,
        })
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    fn endpoint(&self, key: &str) -> Result<Url> {
        let key = key.trim();
        if key.is_empty() || key.contains('/') || key.contains('?') || key.contains('#') {
            return Err(ExtractError::InvalidKey(key.to_string()));
        }
        self.base_url
            .join(key)
            .map_err(|e| ExtractError::InvalidKey(format!("{}: {}", key, e)))
    }
}

#[async_trait]
impl FactExtractor for HttpExtractor {
    async fn extract(&self, key: &str) -> Result<Extraction> {
        let url = self.endpoint(key)?;
        debug!(%url, "Fetching fact bundle");

        let start = Instant::now();
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ExtractError::Timeout(key.to_string())
            } else {
                ExtractError::HttpError(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::UpstreamStatus {
                key: key.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let bundle: FactBundle = serde_json::from_str(&body)?;

        info!(
            key,
            confidence = self.confidence.as_str(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Extraction finished"
        );
        Ok(Extraction::new(bundle, self.confidence))
    }
}

/// Tries the high-confidence path first and falls back to the light one.
pub struct FallbackExtractor {
    primary: Arc<dyn FactExtractor>,
    fallback: Arc<dyn FactExtractor>,
}

impl FallbackExtractor {
    pub fn new(primary: Arc<dyn FactExtractor>, fallback: Arc<dyn FactExtractor>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl FactExtractor for FallbackExtractor {
    async fn extract(&self, key: &str) -> Result<Extraction> {
        let first = match self.primary.extract(key).await {
            Ok(extraction) if extraction.bundle.has_name() => return Ok(extraction),
            Ok(extraction) => {
                debug!(key, "Primary path found no name, trying light path");
                Ok(extraction)
            }
            Err(e) => {
                warn!(key, error = %e, "Primary path failed, trying light path");
                Err(e)
            }
        };

        match self.fallback.extract(key).await {
            Ok(extraction) => Ok(extraction),
            // Keep an empty primary answer over a light-path error
            Err(e) => first.or(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::PhoneEntry;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    struct Fixed(std::result::Result<FactBundle, String>, Confidence);

    #[async_trait]
    impl FactExtractor for Fixed {
        async fn extract(&self, _key: &str) -> Result<Extraction> {
            match &self.0 {
                Ok(bundle) => Ok(Extraction::new(bundle.clone(), self.1)),
                Err(msg) => Err(ExtractError::Other(msg.clone())),
            }
        }
    }

    fn named(name: &str) -> FactBundle {
        FactBundle {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_extracts_bundle_from_service() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/meta/acme.com"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"name":"Acme","address":"1 Main St",
                    "phone_numbers":[{"number":"+15551234567","description":"HQ"}]}"#,
            ))
            .mount(&mock_server)
            .await;

        let extractor = HttpExtractor::new(&format!("{}/meta", mock_server.uri())).unwrap();
        let extraction = extractor.extract("acme.com").await.unwrap();

        assert_eq!(extraction.confidence, Confidence::High);
        assert_eq!(extraction.bundle.name, "Acme");
        assert_eq!(
            extraction.bundle.phone_numbers,
            vec![PhoneEntry::new("+15551234567", Some("HQ"))]
        );
    }

    #[tokio::test]
    async fn test_upstream_error_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/acme.com"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let extractor = HttpExtractor::new(&mock_server.uri()).unwrap();
        let err = extractor.extract("acme.com").await.unwrap_err();

        assert!(matches!(
            err,
            ExtractError::UpstreamStatus { status: 503, .. }
        ));
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/acme.com"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>captcha</html>"))
            .mount(&mock_server)
            .await;

        let extractor = HttpExtractor::new(&mock_server.uri()).unwrap();
        let err = extractor.extract("acme.com").await.unwrap_err();

        assert!(matches!(err, ExtractError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_slow_service_times_out() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/acme.com"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"name":"Acme"}"#)
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&mock_server)
            .await;

        let extractor = HttpExtractor::with_timeout(&mock_server.uri(), 1).unwrap();
        let err = extractor.extract("acme.com").await.unwrap_err();

        assert!(matches!(err, ExtractError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_rejects_keys_with_path_characters() {
        let extractor = HttpExtractor::new("http://127.0.0.1:9").unwrap();

        assert!(matches!(
            extractor.extract("acme.com/../admin").await,
            Err(ExtractError::InvalidKey(_))
        ));
        assert!(matches!(
            extractor.extract("  ").await,
            Err(ExtractError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_light_confidence_is_reported() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/acme.com"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"name":"Acme"}"#))
            .mount(&mock_server)
            .await;

        let extractor = HttpExtractor::new(&mock_server.uri())
            .unwrap()
            .with_confidence(Confidence::Light);
        let extraction = extractor.extract("acme.com").await.unwrap();

        assert_eq!(extraction.confidence, Confidence::Light);
    }

    #[tokio::test]
    async fn test_fallback_used_when_primary_fails() {
        let extractor = FallbackExtractor::new(
            Arc::new(Fixed(Err("blocked".into()), Confidence::High)),
            Arc::new(Fixed(Ok(named("Acme")), Confidence::Light)),
        );

        let extraction = extractor.extract("acme.com").await.unwrap();
        assert_eq!(extraction.confidence, Confidence::Light);
        assert_eq!(extraction.bundle.name, "Acme");
    }

    #[tokio::test]
    async fn test_fallback_skipped_when_primary_has_name() {
        let extractor = FallbackExtractor::new(
            Arc::new(Fixed(Ok(named("Acme")), Confidence::High)),
            Arc::new(Fixed(Err("should not be called".into()), Confidence::Light)),
        );

        let extraction = extractor.extract("acme.com").await.unwrap();
        assert_eq!(extraction.confidence, Confidence::High);
    }

    #[tokio::test]
    async fn test_empty_primary_kept_when_fallback_fails() {
        let extractor = FallbackExtractor::new(
            Arc::new(Fixed(Ok(named("")), Confidence::High)),
            Arc::new(Fixed(Err("down".into()), Confidence::Light)),
        );

        let extraction = extractor.extract("acme.com").await.unwrap();
        assert!(!extraction.bundle.has_name());
        assert_eq!(extraction.confidence, Confidence::High);
    }

    #[tokio::test]
    async fn test_both_paths_failing_reports_fallback_error() {
        let extractor = FallbackExtractor::new(
            Arc::new(Fixed(Err("blocked".into()), Confidence::High)),
            Arc::new(Fixed(Err("down".into()), Confidence::Light)),
        );

        let err = extractor.extract("acme.com").await.unwrap_err();
        assert_eq!(err.to_string(), "Other error: down");
    }
}
