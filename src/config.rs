//! Runtime settings for the extraction pipeline and review service.
//!
//! One `Settings` value is constructed at startup and passed by reference
//! into each component — no module-level singletons. Defaults are tuned for
//! a local provider stack; every knob can be overridden from the environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::render_cache::{ImageFormat, PageSelection};

/// Application-level constants
pub const APP_NAME: &str = "Factura";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// ═══════════════════════════════════════════════════════════
// Settings
// ═══════════════════════════════════════════════════════════

/// Retry behavior for provider and LLM calls.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Total attempt budget (first call + retries).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Hard cap applied to every computed delay.
    pub max_delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// OCR provider endpoint configuration.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub endpoint: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:7001/analyze".into(),
            api_key: String::new(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// LLM correction endpoint configuration.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    /// Whether the configured model accepts image inputs.
    pub multimodal: bool,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/v1/chat/completions".into(),
            api_key: String::new(),
            model: "qwen2.5vl:7b".into(),
            timeout: Duration::from_secs(180),
            multimodal: true,
        }
    }
}

/// Page rendering configuration for multimodal correction.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub page_selection: PageSelection,
    /// Upper bound on rendered pages regardless of selection strategy.
    pub max_pages: usize,
    pub format: ImageFormat,
    pub dpi: u32,
    /// LRU capacity of the render cache, in documents.
    pub cache_capacity: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            page_selection: PageSelection::All,
            max_pages: 4,
            format: ImageFormat::Png,
            dpi: 150,
            cache_capacity: 32,
        }
    }
}

/// Top-level settings, injected into every pipeline component.
#[derive(Debug, Clone)]
pub struct Settings {
    /// ISO 4217 code assigned when the provider's currency text is unrecognized.
    pub default_currency: String,
    /// Fields at or above this confidence are never sent for correction.
    pub correction_threshold: f32,
    /// Confidence assigned to a field after a successful LLM correction.
    pub corrected_confidence: f32,
    /// Documents whose extracted text is shorter than this are treated as
    /// image scans and routed to multimodal correction when available.
    pub min_text_chars: usize,
    /// Extracted text sent to the LLM is truncated to this many characters.
    pub max_prompt_chars: usize,
    pub ocr: ProviderSettings,
    pub llm: LlmSettings,
    pub retry: RetrySettings,
    pub render: RenderSettings,
    pub database_path: PathBuf,
    pub bind_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_currency: "USD".into(),
            correction_threshold: 0.70,
            corrected_confidence: 0.90,
            min_text_chars: 120,
            max_prompt_chars: 12_000,
            ocr: ProviderSettings::default(),
            llm: LlmSettings::default(),
            retry: RetrySettings::default(),
            render: RenderSettings::default(),
            database_path: PathBuf::from("factura.db"),
            bind_addr: "127.0.0.1:7400".into(),
        }
    }
}

impl Settings {
    /// Build settings from defaults plus `FACTURA_*` environment overrides.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(v) = std::env::var("FACTURA_OCR_ENDPOINT") {
            settings.ocr.endpoint = v;
        }
        if let Ok(v) = std::env::var("FACTURA_OCR_API_KEY") {
            settings.ocr.api_key = v;
        }
        if let Ok(v) = std::env::var("FACTURA_LLM_ENDPOINT") {
            settings.llm.endpoint = v;
        }
        if let Ok(v) = std::env::var("FACTURA_LLM_API_KEY") {
            settings.llm.api_key = v;
        }
        if let Ok(v) = std::env::var("FACTURA_LLM_MODEL") {
            settings.llm.model = v;
        }
        if let Ok(v) = std::env::var("FACTURA_DEFAULT_CURRENCY") {
            settings.default_currency = v;
        }
        if let Ok(v) = std::env::var("FACTURA_DB_PATH") {
            settings.database_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("FACTURA_BIND_ADDR") {
            settings.bind_addr = v;
        }
        if let Some(v) = env_parse("FACTURA_CORRECTION_THRESHOLD") {
            settings.correction_threshold = v;
        }
        if let Some(v) = env_parse("FACTURA_MIN_TEXT_CHARS") {
            settings.min_text_chars = v;
        }
        if let Some(v) = env_parse("FACTURA_RETRY_MAX_ATTEMPTS") {
            settings.retry.max_attempts = v;
        }

        settings
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
