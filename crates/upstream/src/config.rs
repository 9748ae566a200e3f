use std::env;
use std::time::Duration;

const DEFAULT_LLM_API_URL: &str = "https://api.wolframalpha.com/v1/llm-api";
const DEFAULT_FULL_RESULTS_URL: &str = "https://api.wolframalpha.com/v2/query";
const DEFAULT_LANGUAGE_EVAL_URL: &str = "https://api.wolframalpha.com/v1/query";
const DEFAULT_COMPLETION_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_COMPLETION_MODEL: &str = "openai/gpt-oss-120b";

pub const DEFAULT_EVAL_TIMEOUT_SECONDS: u64 = 30;

/// Computation endpoints plus the application id attached to every call.
#[derive(Debug, Clone)]
pub struct ComputeConfig {
    pub app_id: String,
    pub llm_api_url: String,
    pub full_results_url: String,
    pub show_steps_url: String,
    pub language_eval_url: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub eval_timeout_seconds: u64,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            llm_api_url: DEFAULT_LLM_API_URL.to_string(),
            full_results_url: DEFAULT_FULL_RESULTS_URL.to_string(),
            show_steps_url: DEFAULT_FULL_RESULTS_URL.to_string(),
            language_eval_url: DEFAULT_LANGUAGE_EVAL_URL.to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(6),
            eval_timeout_seconds: DEFAULT_EVAL_TIMEOUT_SECONDS,
        }
    }
}

impl ComputeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            app_id: env::var("MATHGATE_APP_ID").unwrap_or_default(),
            llm_api_url: env_or("MATHGATE_LLM_API_URL", &defaults.llm_api_url),
            full_results_url: env_or("MATHGATE_FULL_RESULTS_URL", &defaults.full_results_url),
            show_steps_url: env_or("MATHGATE_SHOW_STEPS_URL", &defaults.show_steps_url),
            language_eval_url: env_or("MATHGATE_LANGUAGE_EVAL_URL", &defaults.language_eval_url),
            timeout: Duration::from_secs(env_u64("MATHGATE_COMPUTE_TIMEOUT_SECONDS").unwrap_or(30)),
            ..defaults
        }
    }

    /// Points all four endpoints at one host, using the public path layout.
    pub fn with_base_url(base_url: &str, app_id: impl Into<String>) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            app_id: app_id.into(),
            llm_api_url: format!("{base}/v1/llm-api"),
            full_results_url: format!("{base}/v2/query"),
            show_steps_url: format!("{base}/v2/query"),
            language_eval_url: format!("{base}/v1/query"),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub default_temperature: f32,
    pub timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_COMPLETION_BASE_URL.to_string(),
            model: DEFAULT_COMPLETION_MODEL.to_string(),
            max_tokens: 8192,
            default_temperature: 0.6,
            timeout: Duration::from_secs(60),
        }
    }
}

impl CompletionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            api_key: env::var("MATHGATE_LLM_API_KEY")
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            base_url: env_or("MATHGATE_LLM_BASE_URL", &defaults.base_url),
            model: env_or("MATHGATE_LLM_MODEL", &defaults.model),
            max_tokens: env_u64("MATHGATE_LLM_MAX_TOKENS")
                .map(|value| value.clamp(1, 131_072) as u32)
                .unwrap_or(defaults.max_tokens),
            ..defaults
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub url: Option<String>,
    pub timeout: Duration,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl OcrConfig {
    pub fn from_env() -> Self {
        Self {
            url: env::var("MATHGATE_OCR_URL")
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            ..Self::default()
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_layout_matches_public_paths() {
        let config = ComputeConfig::with_base_url("http://127.0.0.1:9000/", "demo");
        assert_eq!(config.app_id, "demo");
        assert_eq!(config.llm_api_url, "http://127.0.0.1:9000/v1/llm-api");
        assert_eq!(config.full_results_url, config.show_steps_url);
        assert_eq!(config.language_eval_url, "http://127.0.0.1:9000/v1/query");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn completion_defaults() {
        let config = CompletionConfig::default();
        assert!(!config.is_configured());
        assert_eq!(config.default_temperature, 0.6);
        assert_eq!(config.timeout, Duration::from_secs(60));
    }
}
