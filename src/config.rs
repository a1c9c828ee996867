use std::fmt;

/// Application-level constants
pub const APP_NAME: &str = "chartscribe";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// OpenAI-compatible endpoint of the hosted extraction service.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Model identifier sent with every extraction request.
pub const EXTRACTION_MODEL: &str = "deepseek/deepseek-r1-0528:free";

/// Reasoning models can take minutes on long documents.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";
pub const BASE_URL_ENV: &str = "CHARTSCRIBE_BASE_URL";
pub const TIMEOUT_ENV: &str = "CHARTSCRIBE_TIMEOUT_SECS";

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "warn,chartscribe=info"
}

/// Connection settings for the extraction service.
#[derive(Clone)]
pub struct ServiceConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: EXTRACTION_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ServiceConfig {
    /// Read settings from the process environment.
    /// A missing API key is not an error here; requests fail without one.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let timeout_secs = match non_blank(TIMEOUT_ENV) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    tracing::warn!(
                        value = %raw,
                        default = DEFAULT_TIMEOUT_SECS,
                        "Ignoring invalid {TIMEOUT_ENV}"
                    );
                    DEFAULT_TIMEOUT_SECS
                }
            },
            None => DEFAULT_TIMEOUT_SECS,
        };

        Self {
            api_key: non_blank(API_KEY_ENV),
            base_url: non_blank(BASE_URL_ENV).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: EXTRACTION_MODEL.to_string(),
            timeout_secs,
        }
    }
}

// Keeps the key out of logs.
impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
