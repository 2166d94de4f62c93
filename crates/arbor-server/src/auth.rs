use std::sync::Arc;

use async_trait::async_trait;

use arbor_namespace::UserDirectory;
use arbor_types::UserId;

use crate::error::{ServiceError, ServiceResult};

/// The caller of a service operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    /// `None` for anonymous callers.
    pub user: Option<UserId>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self { name: "anonymous".into(), user: None }
    }

    pub fn user(name: impl Into<String>, id: UserId) -> Self {
        Self { name: name.into(), user: Some(id) }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user.is_none()
    }
}

#[derive(Clone, Debug)]
pub enum Credentials {
    /// A user name already verified by the transport.
    User(String),
    Anonymous,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> ServiceResult<Identity>;
}

/// Resolves verified user names through a [`UserDirectory`].
pub struct DirectoryAuth {
    users: Arc<dyn UserDirectory>,
}

impl DirectoryAuth {
    pub fn new(users: Arc<dyn UserDirectory>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Authenticator for DirectoryAuth {
    async fn authenticate(&self, credentials: &Credentials) -> ServiceResult<Identity> {
        match credentials {
            Credentials::Anonymous => Ok(Identity::anonymous()),
            Credentials::User(name) => self
                .users
                .lookup(name)
                .map(|record| Identity::user(record.name, record.id))
                .ok_or_else(|| ServiceError::PermissionDenied(format!("unknown user {name:?}"))),
        }
    }
}
