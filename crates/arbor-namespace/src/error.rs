use std::path::PathBuf;

use arbor_store::StoreError;
use arbor_types::ErrorKind;

/// Errors from domain mapping and TOC maintenance.
#[derive(Debug, thiserror::Error)]
pub enum NamespaceError {
    #[error("invalid domain {domain:?}: {reason}")]
    InvalidDomain { domain: String, reason: String },

    #[error("path is outside the data root: {0}")]
    OutsideDataRoot(PathBuf),

    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("table of contents already exists: {0}")]
    TocExists(PathBuf),

    #[error("directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("user table: {0}")]
    UserTable(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NamespaceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDomain { .. } | Self::OutsideDataRoot(_) | Self::NonUtf8Path(_) => {
                ErrorKind::BadRequest
            }
            Self::UnknownUser(_) | Self::DirectoryNotFound(_) => ErrorKind::NotFound,
            Self::TocExists(_) => ErrorKind::Conflict,
            Self::Store(e) => e.kind(),
            Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            Self::UserTable(_) | Self::Io(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn invalid(domain: &str, reason: impl Into<String>) -> Self {
        Self::InvalidDomain {
            domain: domain.to_string(),
            reason: reason.into(),
        }
    }
}

pub type NamespaceResult<T> = Result<T, NamespaceError>;
