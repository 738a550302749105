#[derive(thiserror::Error, Debug)]
pub enum LlmError {
    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Completion service error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Completion request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Authentication with the completion service failed")]
    Authentication,

    #[error("Completion service rejected the request (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response from completion service: {0}")]
    InvalidResponse(String),

    #[error("Tool arguments do not match the {tool} schema: {source}")]
    SchemaViolation {
        tool: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl LlmError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::RateLimited | LlmError::Server { .. } => true,
            LlmError::Transport(e) => !e.is_decode() && !e.is_builder(),
            LlmError::Authentication
            | LlmError::Api { .. }
            | LlmError::InvalidResponse(_)
            | LlmError::SchemaViolation { .. } => false,
        }
    }
}
