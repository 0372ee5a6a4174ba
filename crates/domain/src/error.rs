/// Shared error type used across all SerialAgent crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("rate limited by provider {provider}: {message}")]
    RateLimited { provider: String, message: String },

    #[error("storage: {0}")]
    Storage(String),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("tool execution: {0}")]
    Tool(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Classify an error for `ProviderChain` backoff purposes (spec §4.3).
    ///
    /// Rate-limit errors get exponential backoff; everything else gets
    /// linear backoff.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            Error::RateLimited { .. } => true,
            Error::Provider { message, .. } | Error::Http(message) => {
                let lower = message.to_ascii_lowercase();
                lower.contains("429") || lower.contains("rate") || lower.contains("too many")
            }
            _ => false,
        }
    }
}
