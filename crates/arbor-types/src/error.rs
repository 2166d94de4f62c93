use std::fmt;

use thiserror::Error;

/// The failure taxonomy every Arbor layer reports into.
///
/// Each crate keeps its own error enum; `kind()` on those enums maps every
/// variant onto exactly one of these, so the transport can translate kinds
/// to status codes without inspecting messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A uuid, path, name, or domain is absent.
    NotFound,
    /// Duplicate create where exclusivity is required.
    Conflict,
    /// Structural refusal: read-only container, root deletion, TOC mutation.
    Forbidden,
    /// Explicit per-user ACL denial.
    PermissionDenied,
    /// Malformed schema, shape, value, or domain string.
    BadRequest,
    /// Invariant violation or backend failure.
    Internal,
}

impl ErrorKind {
    /// Stable lowercase label, used in logs and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not-found",
            Self::Conflict => "conflict",
            Self::Forbidden => "forbidden",
            Self::PermissionDenied => "permission-denied",
            Self::BadRequest => "bad-request",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced when parsing foundation types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid uuid: {0}")]
    InvalidUuid(String),

    #[error("unknown object collection: {0}")]
    UnknownCollection(String),

    #[error("invalid object reference: {0}")]
    InvalidReference(String),
}
