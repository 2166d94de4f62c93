//! User identity lookup.
//!
//! Credential checking happens elsewhere; the namespace only needs to know
//! which user names exist and their numeric ids for ACL entries.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use arbor_types::UserId;

use crate::error::{NamespaceError, NamespaceResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
}

/// Resolves user names to ids and back.
pub trait UserDirectory: Send + Sync {
    fn lookup(&self, name: &str) -> Option<UserRecord>;
    fn name_of(&self, id: UserId) -> Option<String>;
}

#[derive(Debug, Default, Deserialize)]
struct UserTable {
    #[serde(default)]
    users: BTreeMap<String, u64>,
}

/// User table held in memory, loadable from TOML:
///
/// ```toml
/// [users]
/// alice = 12
/// bob = 13
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryUserDirectory {
    users: BTreeMap<String, UserId>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user. Id 0 is reserved for the default ACL entry.
    pub fn insert(&mut self, name: impl Into<String>, id: UserId) -> NamespaceResult<()> {
        let name = name.into();
        if id.is_default() {
            return Err(NamespaceError::UserTable(format!("user {name:?} may not use id 0")));
        }
        self.users.insert(name, id);
        Ok(())
    }

    pub fn with_user(mut self, name: impl Into<String>, id: u64) -> NamespaceResult<Self> {
        self.insert(name, UserId(id))?;
        Ok(self)
    }

    pub fn from_toml(text: &str) -> NamespaceResult<Self> {
        let table: UserTable =
            toml::from_str(text).map_err(|e| NamespaceError::UserTable(e.to_string()))?;
        let mut dir = Self::new();
        for (name, id) in table.users {
            dir.insert(name, UserId(id))?;
        }
        Ok(dir)
    }

    pub fn load(path: &Path) -> NamespaceResult<Self> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn lookup(&self, name: &str) -> Option<UserRecord> {
        self.users.get(name).map(|id| UserRecord {
            id: *id,
            name: name.to_string(),
        })
    }

    fn name_of(&self, id: UserId) -> Option<String> {
        self.users
            .iter()
            .find(|(_, uid)| **uid == id)
            .map(|(name, _)| name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_both_ways() {
        let dir = InMemoryUserDirectory::new().with_user("alice", 12).unwrap();
        assert_eq!(dir.lookup("alice").unwrap().id, UserId(12));
        assert_eq!(dir.name_of(UserId(12)).as_deref(), Some("alice"));
        assert!(dir.lookup("bob").is_none());
        assert!(dir.name_of(UserId(99)).is_none());
    }

    #[test]
    fn toml_table() {
        let dir = InMemoryUserDirectory::from_toml("[users]\nalice = 12\nbob = 13\n").unwrap();
        assert_eq!(dir.len(), 2);
        assert_eq!(dir.lookup("bob").unwrap().id, UserId(13));
        assert!(InMemoryUserDirectory::from_toml("").unwrap().is_empty());
    }

    #[test]
    fn reserved_id_rejected() {
        assert!(InMemoryUserDirectory::from_toml("[users]\nroot = 0\n").is_err());
        assert!(InMemoryUserDirectory::from_toml("users = 5").is_err());
    }
}
