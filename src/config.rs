use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_VOICE: &str = "vi_VN-vais1000-medium";
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000,http://127.0.0.1:3000";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{name} must be a number, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },

    #[error("Invalid listen address {0}")]
    InvalidAddress(String),
}

/// Which browser origins may call the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

/// Configuration from environment
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub llm_base_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    /// Attempts per completion call, including the first.
    pub llm_max_attempts: u32,
    pub voices_dir: PathBuf,
    pub tts_voice: String,
    pub audio_dir: PathBuf,
    pub cors_origins: CorsOrigins,
    pub batch_delay: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let var_or = |name: &str, fallback: &str| {
            var(name).or_else(|| var(fallback))
        };

        let port = match var("PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidNumber {
                name: "PORT",
                value,
            })?,
            None => 8000,
        };

        let batch_delay_ms: u64 = match var("BATCH_DELAY_MS") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidNumber {
                name: "BATCH_DELAY_MS",
                value,
            })?,
            None => 1000,
        };

        let llm_max_attempts = match var("LLM_MAX_ATTEMPTS") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidNumber {
                name: "LLM_MAX_ATTEMPTS",
                value,
            })?,
            None => 5,
        };

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            llm_base_url: var_or("LLM_BASE_URL", "AZURE_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            llm_api_key: var_or("LLM_API_KEY", "AZURE_API_KEY"),
            llm_model: var_or("LLM_MODEL", "AZURE_DEPLOYMENT_NAME")
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            llm_max_attempts,
            voices_dir: var("VOICES_DIR")
                .unwrap_or_else(|| "./voices".to_string())
                .into(),
            tts_voice: var("TTS_VOICE").unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            audio_dir: var("AUDIO_DIR")
                .unwrap_or_else(|| "static/audio".to_string())
                .into(),
            cors_origins: parse_origins(
                &var("CORS_ORIGINS").unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string()),
            ),
            batch_delay: Duration::from_millis(batch_delay_ms),
        })
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| ConfigError::InvalidAddress(addr))
    }
}

fn parse_origins(raw: &str) -> CorsOrigins {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect();

    if origins.iter().any(|o| o == "*") {
        CorsOrigins::Any
    } else {
        CorsOrigins::List(origins)
    }
}
