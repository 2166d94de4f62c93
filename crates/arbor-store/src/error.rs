use std::path::PathBuf;

use arbor_codec::CodecError;
use arbor_types::{ErrorKind, ObjectKind, ObjectUuid, UserId};

use crate::acl::Permission;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No object with this UUID is indexed.
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectUuid),

    /// A path segment or the final target is absent.
    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("link not found: {name:?} in group {parent}")]
    LinkNotFound { parent: ObjectUuid, name: String },

    #[error("attribute not found: {name:?} on {object}")]
    AttributeNotFound { object: ObjectUuid, name: String },

    #[error("link already exists: {name:?} in group {parent}")]
    LinkExists { parent: ObjectUuid, name: String },

    #[error("attribute already exists: {name:?} on {object}")]
    AttributeExists { object: ObjectUuid, name: String },

    /// Mutation attempted on a container opened read-only.
    #[error("container is read-only")]
    ReadOnly,

    #[error("the root group cannot be deleted")]
    RootDeletion,

    #[error("permission denied: {permission} on {object} for user {user}")]
    PermissionDenied {
        object: ObjectUuid,
        user: UserId,
        permission: Permission,
    },

    /// A path traversal or link operation addressed a non-group.
    #[error("not a group: {0}")]
    NotAGroup(String),

    #[error("{id} is a {found}, expected a {expected}")]
    WrongKind {
        id: ObjectUuid,
        expected: ObjectKind,
        found: ObjectKind,
    },

    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid shape: {0}")]
    InvalidShape(String),

    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// An expected index structure is missing or inconsistent.
    #[error("index corrupt: {0}")]
    CorruptIndex(String),

    #[error("not a valid container: {path}: {reason}")]
    CorruptContainer { path: PathBuf, reason: String },

    #[error("container not found: {0}")]
    ContainerNotFound(PathBuf),

    #[error("container already exists: {0}")]
    ContainerExists(PathBuf),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Taxonomy kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ObjectNotFound(_)
            | Self::PathNotFound(_)
            | Self::LinkNotFound { .. }
            | Self::AttributeNotFound { .. }
            | Self::ContainerNotFound(_) => ErrorKind::NotFound,
            Self::LinkExists { .. } | Self::AttributeExists { .. } | Self::ContainerExists(_) => {
                ErrorKind::Conflict
            }
            Self::ReadOnly | Self::RootDeletion => ErrorKind::Forbidden,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::NotAGroup(_)
            | Self::WrongKind { .. }
            | Self::InvalidName { .. }
            | Self::InvalidPath { .. }
            | Self::InvalidShape(_)
            | Self::InvalidSelection(_) => ErrorKind::BadRequest,
            Self::Codec(e) => e.kind(),
            Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            Self::CorruptIndex(_)
            | Self::CorruptContainer { .. }
            | Self::Serialization(_)
            | Self::Io(_) => ErrorKind::Internal,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_not_conflated() {
        let id = ObjectUuid::new();
        assert_eq!(StoreError::ObjectNotFound(id).kind(), ErrorKind::NotFound);
        assert_eq!(StoreError::RootDeletion.kind(), ErrorKind::Forbidden);
        assert_eq!(StoreError::ReadOnly.kind(), ErrorKind::Forbidden);
        assert_eq!(
            StoreError::LinkExists { parent: id, name: "a".into() }.kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            StoreError::PermissionDenied {
                object: id,
                user: UserId(3),
                permission: Permission::Update
            }
            .kind(),
            ErrorKind::PermissionDenied
        );
        assert_eq!(
            StoreError::Codec(CodecError::MissingKey("class".into())).kind(),
            ErrorKind::BadRequest
        );
        assert_eq!(StoreError::CorruptIndex("x".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = StoreError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
