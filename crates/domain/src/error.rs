/// Shared error type used across all edition crates.
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

    #[error("provider {provider}: model '{model}' not found")]
    ModelNotFound { provider: String, model: String },

    #[error("provider {provider} does not support {operation}")]
    Unsupported { provider: String, operation: String },

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("invalid role '{0}' (expected system, user or assistant)")]
    InvalidRole(String),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether another provider or model is worth trying after this error.
    ///
    /// Timeouts, transport failures and 5xx-class provider answers are
    /// transient. Auth, config and 4xx errors are not.
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::Timeout(_) | Error::Http(_) => true,
            Error::Provider { message, .. } => {
                message.starts_with("HTTP 5") || message.contains("overloaded")
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_err(message: &str) -> Error {
        Error::Provider {
            provider: "claude".into(),
            message: message.into(),
        }
    }

    #[test]
    fn server_errors_are_retriable() {
        assert!(provider_err("HTTP 500 - boom").is_retriable());
        assert!(provider_err("HTTP 529 - overloaded_error").is_retriable());
        assert!(Error::Timeout("slow".into()).is_retriable());
        assert!(Error::Http("connection refused".into()).is_retriable());
    }

    #[test]
    fn client_errors_are_not_retriable() {
        assert!(!provider_err("HTTP 400 - bad request").is_retriable());
        assert!(!Error::Auth("missing key".into()).is_retriable());
        assert!(!Error::InvalidRole("narrator".into()).is_retriable());
        assert!(!Error::ModelNotFound {
            provider: "claude".into(),
            model: "claude-0".into(),
        }
        .is_retriable());
    }
}
