use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrudError {
    #[error("Invalid value for operator '{operator}': {message}")]
    InvalidOperatorValue { operator: String, message: String },

    #[error("Operator '{operator}' is not supported by the {adapter} adapter")]
    UnsupportedOperator {
        operator: String,
        adapter: &'static str,
    },

    #[error("{clause} field \"{path}\" is invalid.")]
    InvalidField { clause: String, path: String },

    #[error("Invalid where builder state: {0}")]
    InvalidWhereState(String),

    #[error("Scan operations are disabled for table '{table}'")]
    ScanDisabled { table: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Result type alias for crudql operations
pub type Result<T> = std::result::Result<T, CrudError>;

impl CrudError {
    /// Creates a new invalid operator value error
    pub fn invalid_value<O: ToString, S: Into<String>>(operator: O, msg: S) -> Self {
        Self::InvalidOperatorValue {
            operator: operator.to_string(),
            message: msg.into(),
        }
    }

    /// Creates a new unsupported operator error
    pub fn unsupported<O: ToString>(operator: O, adapter: &'static str) -> Self {
        Self::UnsupportedOperator {
            operator: operator.to_string(),
            adapter,
        }
    }

    /// Creates a new invalid field error
    pub fn invalid_field<C: Into<String>, P: ToString>(clause: C, path: P) -> Self {
        Self::InvalidField {
            clause: clause.into(),
            path: path.to_string(),
        }
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new parse error
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Wraps a store driver error without altering it
    pub fn store<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Store(Box::new(err))
    }

    /// Returns true if the error was caused by the incoming request rather
    /// than by the store or the local environment
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidOperatorValue { .. }
                | Self::UnsupportedOperator { .. }
                | Self::InvalidField { .. }
                | Self::Parse { .. }
                | Self::ScanDisabled { .. }
        )
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidOperatorValue { .. } | Self::InvalidField { .. } => "validation",
            Self::UnsupportedOperator { .. } | Self::ScanDisabled { .. } => "capability",
            Self::InvalidWhereState(_) => "builder",
            Self::Config(_) => "config",
            Self::Parse { .. } | Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
            Self::Store(_) => "store",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CrudError::invalid_field("where", "category.name");
        assert_eq!(err.to_string(), "where field \"category.name\" is invalid.");
        assert_eq!(err.category(), "validation");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_unsupported_operator_message() {
        let err = CrudError::unsupported("ends", "dynamodb");
        assert_eq!(
            err.to_string(),
            "Operator 'ends' is not supported by the dynamodb adapter"
        );
        assert_eq!(err.category(), "capability");
    }

    #[test]
    fn test_store_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "connection reset");
        let err = CrudError::store(io);
        assert_eq!(err.category(), "store");
        assert!(!err.is_client_error());
        let source = std::error::Error::source(&err).map(|e| e.to_string());
        assert_eq!(source.as_deref(), Some("connection reset"));
    }
}
