//! Error types for the jury-core crate.
//!
//! Uses `thiserror` for the public error taxonomy: transport errors from the
//! judge LLM, caller misconfiguration at the scanner boundary, invalid model
//! or dataset wrappers, and strict-mode detector failures.

/// Top-level error type for scanning and evaluation.
#[derive(Debug, thiserror::Error)]
pub enum JuryError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    InvalidModel(String),

    #[error("{0}")]
    InvalidDataset(String),

    #[error("No detectors available: {0}")]
    NoDetectorsAvailable(String),

    #[error("Detector '{name}' failed: {message}")]
    Detector { name: String, message: String },

    #[error("Model error: {0}")]
    Model(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl JuryError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn invalid_model(msg: impl Into<String>) -> Self {
        Self::InvalidModel(msg.into())
    }

    pub fn invalid_dataset(msg: impl Into<String>) -> Self {
        Self::InvalidDataset(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn detector(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Detector {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Errors from the judge LLM transport.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// The LLM answered but did not produce a usable structured output.
    #[error("Generation error: {message}")]
    Generation { message: String },

    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

impl LlmError {
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    /// Whether this is the generation kind, which evaluators recover from per row.
    pub fn is_generation(&self) -> bool {
        matches!(self, Self::Generation { .. })
    }
}

/// Convenience result alias.
pub type Result<T, E = JuryError> = std::result::Result<T, E>;
