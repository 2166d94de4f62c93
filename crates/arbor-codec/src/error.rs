use arbor_types::ErrorKind;

/// Errors from schema and value translation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// A key required by the declared class is absent.
    #[error("'{0}' not provided")]
    MissingKey(String),

    /// The schema names a class outside the supported set.
    #[error("unknown type class: {0}")]
    UnknownClass(String),

    /// A base type name outside the predefined set.
    #[error("unsupported base type: {0}")]
    UnsupportedBase(String),

    /// A key is present but its value is malformed.
    #[error("invalid value for '{key}': {reason}")]
    InvalidField { key: String, reason: String },

    /// A value does not match the schema it is checked against.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
}

impl CodecError {
    pub(crate) fn invalid(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Taxonomy kind. Type mismatches are reported to callers as bad requests.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::BadRequest
    }
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
