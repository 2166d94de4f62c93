use thiserror::Error;

use arbor_codec::CodecError;
use arbor_namespace::NamespaceError;
use arbor_store::StoreError;
use arbor_types::{ErrorKind, TypeError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("namespace error: {0}")]
    Namespace(#[from] NamespaceError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::BadRequest(_) | Self::Type(_) => ErrorKind::BadRequest,
            Self::Namespace(e) => e.kind(),
            Self::Store(e) => e.kind(),
            Self::Codec(e) => e.kind(),
            Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_pass_through() {
        assert_eq!(ServiceError::Forbidden("toc".into()).kind(), ErrorKind::Forbidden);
        assert_eq!(
            ServiceError::from(StoreError::RootDeletion).kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(
            ServiceError::from(NamespaceError::UnknownUser("eve".into())).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ServiceError::from(TypeError::InvalidUuid("x".into())).kind(),
            ErrorKind::BadRequest
        );
        assert_eq!(ServiceError::Config("bad".into()).kind(), ErrorKind::Internal);
    }
}
