//! Error taxonomy for the repair pipeline.

/// Pipeline errors.
///
/// Per-candidate failures (unparseable candidates, failed artifact builds,
/// heuristic errors) are handled inside the stages and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    /// A collaborator broke one-to-one correspondence between requests and
    /// responses.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("service {name} exited before becoming healthy: {stderr}")]
    ServiceExited { name: String, stderr: String },

    #[error("service {name} request failed: {message}")]
    Service { name: String, message: String },

    #[error("materializer failed: {0}")]
    Materialize(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid masked program: {0}")]
    InvalidMask(String),

    #[error("missing checkpoint: {0}")]
    MissingCheckpoint(String),

    #[error("parse error: {0}")]
    Parse(#[from] model_syntax::ParseError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, RepairError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repair_error_display() {
        let err = RepairError::ContractViolation("2 submissions, 1 result".to_string());
        assert!(err.to_string().contains("contract violation"));

        let err = RepairError::ServiceExited {
            name: "trainer".to_string(),
            stderr: "ModuleNotFoundError".to_string(),
        };
        assert!(err.to_string().contains("trainer"));
        assert!(err.to_string().contains("ModuleNotFoundError"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: RepairError = io.into();
        assert!(matches!(err, RepairError::Io(_)));
    }
}
