//! LLM client seam for field correction.
//!
//! `CorrectionClient` abstracts the chat-completions endpoint so the
//! orchestrator can be tested against a scripted mock. The production client
//! speaks the OpenAI-compatible protocol that local runtimes (Ollama,
//! llama.cpp server, vLLM) expose.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::json;

use crate::config::LlmSettings;
use crate::pipeline::render_cache::EncodedImage;

#[derive(Debug, thiserror::Error)]
pub enum CorrectionError {
    #[error("LLM rate limited (429)")]
    RateLimited { retry_after: Option<Duration> },
    #[error("LLM returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("LLM connection failed: {0}")]
    Connection(String),
    #[error("LLM request timed out")]
    Timeout,
    #[error("LLM response malformed: {0}")]
    Malformed(String),
}

impl CorrectionError {
    /// Rate limits and server-side failures are worth retrying; client
    /// errors (bad request, bad key) are not.
    pub fn is_transient(&self) -> bool {
        match self {
            CorrectionError::RateLimited { .. } => true,
            CorrectionError::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            CorrectionError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// One chat completion against the correction model.
#[async_trait]
pub trait CorrectionClient: Send + Sync {
    async fn complete_text(&self, system: &str, user: &str) -> Result<String, CorrectionError>;

    async fn complete_multimodal(
        &self,
        system: &str,
        user: &str,
        images: &[EncodedImage],
    ) -> Result<String, CorrectionError>;
}

// ═══════════════════════════════════════════════════════════
// HTTP client
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

pub struct HttpCorrectionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpCorrectionClient {
    pub fn new(settings: &LlmSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
        }
    }

    async fn send(&self, body: serde_json::Value) -> Result<String, CorrectionError> {
        let mut request = self.client.post(&self.endpoint).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CorrectionError::Timeout
            } else {
                CorrectionError::Connection(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(CorrectionError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CorrectionError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CorrectionError::Malformed(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| CorrectionError::Malformed("response has no choices".into()))
    }
}

#[async_trait]
impl CorrectionClient for HttpCorrectionClient {
    async fn complete_text(&self, system: &str, user: &str) -> Result<String, CorrectionError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": 0.0,
        });
        self.send(body).await
    }

    async fn complete_multimodal(
        &self,
        system: &str,
        user: &str,
        images: &[EncodedImage],
    ) -> Result<String, CorrectionError> {
        let mut content = vec![json!({"type": "text", "text": user})];
        for image in images {
            let data_url = format!(
                "data:{};base64,{}",
                image.format.mime_type(),
                BASE64.encode(&image.bytes)
            );
            content.push(json!({
                "type": "image_url",
                "image_url": {"url": data_url},
            }));
        }

        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": content},
            ],
            "temperature": 0.0,
        });
        self.send(body).await
    }
}

// ── Mock for testing ──────────────────────────────────────

/// Scripted correction client. Used by orchestrator and processor tests.
pub struct MockCorrectionClient {
    script: std::sync::Mutex<Vec<Result<String, CorrectionError>>>,
    calls: std::sync::atomic::AtomicU32,
    /// Image count per multimodal call, for asserting routing decisions.
    image_counts: std::sync::Mutex<Vec<usize>>,
}

impl MockCorrectionClient {
    pub fn new(script: Vec<Result<String, CorrectionError>>) -> Self {
        Self {
            script: std::sync::Mutex::new(script),
            calls: std::sync::atomic::AtomicU32::new(0),
            image_counts: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn multimodal_image_counts(&self) -> Vec<usize> {
        self.image_counts.lock().map(|v| v.clone()).unwrap_or_default()
    }

    fn next(&self) -> Result<String, CorrectionError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut script = self.script.lock().expect("script lock");
        if script.is_empty() {
            Ok("{}".to_string())
        } else {
            script.remove(0)
        }
    }
}

#[async_trait]
impl CorrectionClient for MockCorrectionClient {
    async fn complete_text(&self, _system: &str, _user: &str) -> Result<String, CorrectionError> {
        self.next()
    }

    async fn complete_multimodal(
        &self,
        _system: &str,
        _user: &str,
        images: &[EncodedImage],
    ) -> Result<String, CorrectionError> {
        if let Ok(mut counts) = self.image_counts.lock() {
            counts.push(images.len());
        }
        self.next()
    }
}
