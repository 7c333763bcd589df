//! Extraction gateway — the single entry point to the external OCR provider.
//!
//! The provider seam is `OcrProvider` (one attempt, typed errors); the
//! gateway layers retry/backoff on top and guarantees the pipeline always
//! receives a `RawExtraction`, degrading to a zero-confidence result with an
//! error reason instead of surfacing provider failures.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::retry::RetryPolicy;
use crate::config::ProviderSettings;

// ═══════════════════════════════════════════════════════════
// Raw provider schema
// ═══════════════════════════════════════════════════════════

/// One named provider field: value text plus extraction confidence.
#[derive(Debug, Clone, Deserialize)]
pub struct RawField {
    pub value: String,
    #[serde(default)]
    pub confidence: f32,
}

/// One raw line item as the provider reports it, all values untyped text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLineItem {
    pub description: Option<String>,
    pub quantity: Option<String>,
    pub unit_price: Option<String>,
    pub amount: Option<String>,
    pub tax: Option<String>,
    pub gst: Option<String>,
    pub pst: Option<String>,
    pub qst: Option<String>,
    #[serde(default)]
    pub confidence: f32,
}

/// The provider's document analysis, as an explicit schema rather than a
/// duck-typed response object.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawExtraction {
    #[serde(default)]
    pub fields: HashMap<String, RawField>,
    #[serde(default)]
    pub line_items: Vec<RawLineItem>,
    /// Full extracted text — drives the scanned-document heuristic and the
    /// text-only correction payload.
    #[serde(default)]
    pub full_text: String,
    /// Provider-level document confidence.
    #[serde(default)]
    pub confidence: f32,
    /// Populated by the gateway when extraction degraded.
    #[serde(skip)]
    pub error: Option<String>,
}

impl RawExtraction {
    /// Degraded result carrying only a failure reason.
    pub fn failed(reason: String) -> Self {
        Self {
            confidence: 0.0,
            error: Some(reason),
            ..Self::default()
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Provider errors
// ═══════════════════════════════════════════════════════════

/// Errors from a single provider attempt.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider rate limited (429)")]
    RateLimited { retry_after: Option<Duration> },
    #[error("Provider unavailable (503)")]
    Unavailable { retry_after: Option<Duration> },
    #[error("Provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Provider connection failed: {0}")]
    Connection(String),
    #[error("Provider request timed out")]
    Timeout,
    #[error("Provider response malformed: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// 429 and 503 are the transient cases worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. } | ProviderError::Unavailable { .. }
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after }
            | ProviderError::Unavailable { retry_after } => *retry_after,
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Provider seam
// ═══════════════════════════════════════════════════════════

/// One analysis attempt against the external OCR provider.
#[async_trait]
pub trait OcrProvider: Send + Sync {
    async fn analyze_once(&self, document: &[u8]) -> Result<RawExtraction, ProviderError>;
}

/// Production provider speaking the document-analysis HTTP contract:
/// POST raw bytes, receive `{fields, line_items, full_text, confidence}`.
pub struct HttpOcrProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpOcrProvider {
    pub fn new(settings: &ProviderSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        }
    }
}

/// Parse a Retry-After header value (whole seconds form only).
fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl OcrProvider for HttpOcrProvider {
    async fn analyze_once(&self, document: &[u8]) -> Result<RawExtraction, ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header("Content-Type", "application/octet-stream")
            .body(document.to_vec())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        match status.as_u16() {
            429 => {
                return Err(ProviderError::RateLimited {
                    retry_after: parse_retry_after(&response),
                })
            }
            503 => {
                return Err(ProviderError::Unavailable {
                    retry_after: parse_retry_after(&response),
                })
            }
            s if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::Http { status: s, body });
            }
            _ => {}
        }

        response
            .json::<RawExtraction>()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════
// Gateway
// ═══════════════════════════════════════════════════════════

/// Retrying wrapper around an `OcrProvider`. `analyze` never fails: transient
/// errors are retried within the policy's budget, everything else degrades to
/// a zero-confidence `RawExtraction` carrying the reason.
pub struct ExtractionGateway {
    provider: Box<dyn OcrProvider>,
    policy: RetryPolicy,
}

impl ExtractionGateway {
    pub fn new(provider: Box<dyn OcrProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub async fn analyze(&self, document: &[u8]) -> RawExtraction {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.provider.analyze_once(document).await {
                Ok(raw) => {
                    tracing::info!(
                        attempt,
                        fields = raw.fields.len(),
                        line_items = raw.line_items.len(),
                        confidence = raw.confidence,
                        "Provider analysis complete"
                    );
                    return raw;
                }
                Err(e) if e.is_transient() && self.policy.allows_retry(attempt) => {
                    let delay = self.policy.delay_for(attempt, e.retry_after());
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient provider error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(attempt, error = %e, "Provider analysis failed");
                    return RawExtraction::failed(e.to_string());
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use crate::config::RetrySettings;

    /// Mock provider scripted with a sequence of results.
    pub struct MockOcrProvider {
        script: Mutex<Vec<Result<RawExtraction, ProviderError>>>,
        calls: AtomicU32,
    }

    impl MockOcrProvider {
        pub fn new(script: Vec<Result<RawExtraction, ProviderError>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            }
        }

        pub fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OcrProvider for MockOcrProvider {
        async fn analyze_once(&self, _document: &[u8]) -> Result<RawExtraction, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Ok(RawExtraction::default())
            } else {
                script.remove(0)
            }
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(&RetrySettings {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(8),
        })
    }

    fn good_extraction() -> RawExtraction {
        let mut fields = HashMap::new();
        fields.insert(
            "InvoiceId".to_string(),
            RawField {
                value: "INV-42".into(),
                confidence: 0.97,
            },
        );
        RawExtraction {
            fields,
            confidence: 0.95,
            full_text: "Invoice INV-42".into(),
            ..RawExtraction::default()
        }
    }

    #[tokio::test]
    async fn two_rate_limits_then_success_makes_three_attempts() {
        let provider = MockOcrProvider::new(vec![
            Err(ProviderError::RateLimited { retry_after: None }),
            Err(ProviderError::RateLimited { retry_after: None }),
            Ok(good_extraction()),
        ]);
        let calls_handle = std::sync::Arc::new(provider);
        let gateway = ExtractionGateway::new(
            Box::new(SharedProvider(calls_handle.clone())),
            fast_policy(4),
        );

        let raw = gateway.analyze(b"doc").await;
        assert_eq!(calls_handle.calls(), 3);
        assert!(raw.error.is_none());
        assert_eq!(raw.fields["InvoiceId"].value, "INV-42");
    }

    /// Wraps an Arc'd mock so the test can keep a handle to the call counter.
    struct SharedProvider(std::sync::Arc<MockOcrProvider>);

    #[async_trait]
    impl OcrProvider for SharedProvider {
        async fn analyze_once(&self, document: &[u8]) -> Result<RawExtraction, ProviderError> {
            self.0.analyze_once(document).await
        }
    }

    #[tokio::test]
    async fn exhausted_retries_degrade_to_zero_confidence() {
        let provider = std::sync::Arc::new(MockOcrProvider::new(vec![
            Err(ProviderError::Unavailable { retry_after: None }),
            Err(ProviderError::Unavailable { retry_after: None }),
            Err(ProviderError::Unavailable { retry_after: None }),
        ]));
        let gateway =
            ExtractionGateway::new(Box::new(SharedProvider(provider.clone())), fast_policy(3));

        let raw = gateway.analyze(b"doc").await;
        assert_eq!(provider.calls(), 3);
        assert_eq!(raw.confidence, 0.0);
        assert!(raw.error.is_some());
        assert!(raw.fields.is_empty());
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let provider = std::sync::Arc::new(MockOcrProvider::new(vec![Err(ProviderError::Http {
            status: 400,
            body: "bad request".into(),
        })]));
        let gateway =
            ExtractionGateway::new(Box::new(SharedProvider(provider.clone())), fast_policy(4));

        let raw = gateway.analyze(b"doc").await;
        assert_eq!(provider.calls(), 1);
        assert_eq!(raw.confidence, 0.0);
        assert!(raw.error.as_deref().unwrap_or("").contains("400"));
    }

    #[tokio::test]
    async fn malformed_response_degrades_without_retry() {
        let provider = std::sync::Arc::new(MockOcrProvider::new(vec![Err(
            ProviderError::MalformedResponse("unexpected EOF".into()),
        )]));
        let gateway =
            ExtractionGateway::new(Box::new(SharedProvider(provider.clone())), fast_policy(4));

        let raw = gateway.analyze(b"doc").await;
        assert_eq!(provider.calls(), 1);
        assert!(raw.error.is_some());
    }

    #[test]
    fn transient_classification() {
        assert!(ProviderError::RateLimited { retry_after: None }.is_transient());
        assert!(ProviderError::Unavailable { retry_after: None }.is_transient());
        assert!(!ProviderError::Http {
            status: 400,
            body: String::new()
        }
        .is_transient());
        assert!(!ProviderError::Timeout.is_transient());
        assert!(!ProviderError::Connection("refused".into()).is_transient());
    }

    #[test]
    fn rate_limit_carries_hint() {
        let e = ProviderError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(e.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(ProviderError::Timeout.retry_after(), None);
    }

    #[test]
    fn raw_extraction_deserializes_provider_payload() {
        let json = r#"{
            "fields": {
                "InvoiceId": {"value": "INV-1", "confidence": 0.98},
                "VendorName": {"value": "Acme Corp", "confidence": 0.92}
            },
            "line_items": [
                {"description": "Widget", "quantity": "2", "unit_price": "10.00",
                 "amount": "20.00", "confidence": 0.9}
            ],
            "full_text": "Acme Corp Invoice INV-1",
            "confidence": 0.94
        }"#;
        let raw: RawExtraction = serde_json::from_str(json).unwrap();
        assert_eq!(raw.fields.len(), 2);
        assert_eq!(raw.line_items.len(), 1);
        assert_eq!(raw.line_items[0].description.as_deref(), Some("Widget"));
        assert!(raw.error.is_none());
    }
}
