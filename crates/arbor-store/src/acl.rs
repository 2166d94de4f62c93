//! Access control entries and their resolution.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use arbor_types::{ObjectUuid, UserId};

/// One grantable action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Permission {
    Create,
    Read,
    Update,
    Delete,
    ReadAcl,
    UpdateAcl,
}

impl Permission {
    pub const ALL: [Permission; 6] = [
        Self::Create,
        Self::Read,
        Self::Update,
        Self::Delete,
        Self::ReadAcl,
        Self::UpdateAcl,
    ];

    /// Wire field name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::ReadAcl => "readACL",
            Self::UpdateAcl => "updateACL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grants for one user on one object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub userid: UserId,
    pub create: bool,
    pub read: bool,
    pub update: bool,
    pub delete: bool,
    #[serde(rename = "readACL")]
    pub read_acl: bool,
    #[serde(rename = "updateACL")]
    pub update_acl: bool,
}

impl Acl {
    pub fn deny_all(userid: UserId) -> Self {
        Self {
            userid,
            create: false,
            read: false,
            update: false,
            delete: false,
            read_acl: false,
            update_acl: false,
        }
    }

    pub fn allow_all(userid: UserId) -> Self {
        Self {
            userid,
            create: true,
            read: true,
            update: true,
            delete: true,
            read_acl: true,
            update_acl: true,
        }
    }

    /// Read and readACL only.
    pub fn read_only(userid: UserId) -> Self {
        Self {
            read: true,
            read_acl: true,
            ..Self::deny_all(userid)
        }
    }

    pub fn allows(&self, permission: Permission) -> bool {
        match permission {
            Permission::Create => self.create,
            Permission::Read => self.read,
            Permission::Update => self.update,
            Permission::Delete => self.delete,
            Permission::ReadAcl => self.read_acl,
            Permission::UpdateAcl => self.update_acl,
        }
    }

    pub fn set(&mut self, permission: Permission, granted: bool) {
        let slot = match permission {
            Permission::Create => &mut self.create,
            Permission::Read => &mut self.read,
            Permission::Update => &mut self.update,
            Permission::Delete => &mut self.delete,
            Permission::ReadAcl => &mut self.read_acl,
            Permission::UpdateAcl => &mut self.update_acl,
        };
        *slot = granted;
    }
}

/// Which step of the fallback chain produced an effective ACL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AclSource {
    /// (object, user)
    Exact,
    /// (object, default)
    ObjectDefault,
    /// (root, user)
    ContainerUser,
    /// (root, default)
    ContainerDefault,
    DenyAll,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EffectiveAcl {
    pub acl: Acl,
    pub source: AclSource,
}

impl EffectiveAcl {
    pub fn is_deny_all(&self) -> bool {
        self.source == AclSource::DenyAll
    }
}

/// All ACL entries of one container, keyed by object then user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclTable {
    entries: BTreeMap<ObjectUuid, Vec<Acl>>,
}

impl AclTable {
    pub fn get(&self, object: &ObjectUuid, user: UserId) -> Option<Acl> {
        self.entries
            .get(object)?
            .iter()
            .find(|acl| acl.userid == user)
            .copied()
    }

    /// Insert or replace the entry for `(object, acl.userid)`.
    pub fn set(&mut self, object: ObjectUuid, acl: Acl) {
        let list = self.entries.entry(object).or_default();
        match list.iter_mut().find(|a| a.userid == acl.userid) {
            Some(slot) => *slot = acl,
            None => {
                list.push(acl);
                list.sort_by_key(|a| a.userid);
            }
        }
    }

    pub fn remove(&mut self, object: &ObjectUuid, user: UserId) -> bool {
        let Some(list) = self.entries.get_mut(object) else {
            return false;
        };
        let before = list.len();
        list.retain(|a| a.userid != user);
        let removed = list.len() != before;
        if list.is_empty() {
            self.entries.remove(object);
        }
        removed
    }

    /// Drop every entry for a deleted object.
    pub fn remove_object(&mut self, object: &ObjectUuid) {
        self.entries.remove(object);
    }

    /// Entries for one object, ordered by user id.
    pub fn list(&self, object: &ObjectUuid) -> Vec<Acl> {
        self.entries.get(object).cloned().unwrap_or_default()
    }

    /// Resolve the effective ACL: exact entry, the object's default entry,
    /// the user's container-wide entry, the container default, then
    /// deny-all.
    pub fn resolve(&self, object: &ObjectUuid, user: UserId, root: &ObjectUuid) -> EffectiveAcl {
        let chain = [
            (object, user, AclSource::Exact),
            (object, UserId::DEFAULT, AclSource::ObjectDefault),
            (root, user, AclSource::ContainerUser),
            (root, UserId::DEFAULT, AclSource::ContainerDefault),
        ];
        for (obj, uid, source) in chain {
            if let Some(found) = self.get(obj, uid) {
                return EffectiveAcl {
                    acl: Acl { userid: user, ..found },
                    source,
                };
            }
        }
        EffectiveAcl {
            acl: Acl::deny_all(user),
            source: AclSource::DenyAll,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: UserId = UserId(12);
    const BOB: UserId = UserId(13);

    #[test]
    fn permission_names() {
        assert_eq!(Permission::ReadAcl.to_string(), "readACL");
        assert_eq!(Permission::parse("updateacl"), Some(Permission::UpdateAcl));
        assert_eq!(Permission::parse("execute"), None);
    }

    #[test]
    fn acl_flags() {
        let mut acl = Acl::deny_all(ALICE);
        assert!(Permission::ALL.iter().all(|p| !acl.allows(*p)));
        acl.set(Permission::Update, true);
        assert!(acl.allows(Permission::Update));
        assert!(!acl.allows(Permission::Delete));

        let ro = Acl::read_only(UserId::DEFAULT);
        assert!(ro.allows(Permission::Read) && ro.allows(Permission::ReadAcl));
        assert!(!ro.allows(Permission::Update));
    }

    #[test]
    fn acl_wire_names() {
        let json = serde_json::to_value(Acl::allow_all(ALICE)).unwrap();
        assert_eq!(json["readACL"], true);
        assert_eq!(json["updateACL"], true);
        assert_eq!(json["userid"], 12);
    }

    // ---- resolution precedence ----

    #[test]
    fn explicit_entry_wins() {
        let root = ObjectUuid::new();
        let obj = ObjectUuid::new();
        let mut table = AclTable::default();
        table.set(obj, Acl::read_only(UserId::DEFAULT));
        table.set(obj, Acl::allow_all(ALICE));

        let eff = table.resolve(&obj, ALICE, &root);
        assert_eq!(eff.source, AclSource::Exact);
        assert!(eff.acl.allows(Permission::Delete));
    }

    #[test]
    fn default_entry_is_fallback() {
        let root = ObjectUuid::new();
        let obj = ObjectUuid::new();
        let mut table = AclTable::default();
        table.set(obj, Acl::read_only(UserId::DEFAULT));
        table.set(obj, Acl::allow_all(ALICE));

        let eff = table.resolve(&obj, BOB, &root);
        assert_eq!(eff.source, AclSource::ObjectDefault);
        assert_eq!(eff.acl.userid, BOB);
        assert!(eff.acl.allows(Permission::Read));
        assert!(!eff.acl.allows(Permission::Update));
    }

    #[test]
    fn container_entries_apply_to_children() {
        let root = ObjectUuid::new();
        let obj = ObjectUuid::new();
        let mut table = AclTable::default();
        table.set(root, Acl::allow_all(ALICE));
        table.set(root, Acl::read_only(UserId::DEFAULT));

        assert_eq!(table.resolve(&obj, ALICE, &root).source, AclSource::ContainerUser);
        assert_eq!(table.resolve(&obj, BOB, &root).source, AclSource::ContainerDefault);
    }

    #[test]
    fn deny_all_is_final_fallback() {
        let root = ObjectUuid::new();
        let table = AclTable::default();
        let eff = table.resolve(&root, ALICE, &root);
        assert!(eff.is_deny_all());
        assert!(Permission::ALL.iter().all(|p| !eff.acl.allows(*p)));
    }

    #[test]
    fn set_replaces_and_remove_drops() {
        let obj = ObjectUuid::new();
        let mut table = AclTable::default();
        table.set(obj, Acl::deny_all(ALICE));
        table.set(obj, Acl::allow_all(ALICE));
        table.set(obj, Acl::deny_all(UserId::DEFAULT));
        let list = table.list(&obj);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].userid, UserId::DEFAULT);
        assert!(list[1].create);

        assert!(table.remove(&obj, ALICE));
        assert!(!table.remove(&obj, ALICE));
        table.remove_object(&obj);
        assert!(table.list(&obj).is_empty());
    }
}
