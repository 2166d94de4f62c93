//! The object store: UUID identity, link graph, and ACLs over one container.
//!
//! An [`ObjectStore`] wraps an opened [`Container`] for the duration of one
//! request. Opening loads (or builds) the container's UUID index, then
//! resolves every index locator to an [`Address`] so lookups in both
//! directions are map hits. Mutations mark the store dirty; [`ObjectStore::flush`]
//! writes the embedded index and the container document back.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use arbor_codec::{Schema, TypeDescriptor};
use arbor_types::{ObjectKind, ObjectUuid, UserId};

use crate::acl::{Acl, EffectiveAcl, Permission};
use crate::container::{
    Address, Container, ContainerDocument, ContainerObject, DatasetBody, ObjectBody,
    StoredLink, StoredSchema,
};
use crate::error::{StoreError, StoreResult};
use crate::index::{backfill, Locator, LocatorMode, ObjectIndex, Sidecar, INDEX_SLOT};
use crate::names;

/// Soft links resolving through more soft links than this are refused.
const MAX_SOFT_LINK_DEPTH: usize = 16;

/// What to do when a link or attribute name is already taken.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Fail with a conflict.
    #[default]
    Reject,
    /// Drop the existing entry, then create the new one. Not atomic.
    Replace,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub collision: CollisionPolicy,
    /// Extension of the sidecar index kept beside read-only containers.
    pub sidecar_ext: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            collision: CollisionPolicy::Reject,
            sidecar_ext: ".db".to_string(),
        }
    }
}

/// Resolved target of a link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkTarget {
    Hard { id: ObjectUuid, kind: ObjectKind },
    Soft { path: String },
    External { domain: String, path: String },
}

impl LinkTarget {
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Hard { .. } => "H5L_TYPE_HARD",
            Self::Soft { .. } => "H5L_TYPE_SOFT",
            Self::External { .. } => "H5L_TYPE_EXTERNAL",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkItem {
    pub name: String,
    pub target: LinkTarget,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ObjectDetail {
    Group {
        link_count: usize,
    },
    Dataset {
        schema: Schema,
        shape: Vec<usize>,
        max_shape: Option<Vec<Option<usize>>>,
    },
    Datatype {
        descriptor: TypeDescriptor,
    },
}

/// Summary of one object as reported to callers.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectInfo {
    pub id: ObjectUuid,
    pub kind: ObjectKind,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub attribute_count: usize,
    pub detail: ObjectDetail,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectCounts {
    pub groups: usize,
    pub datasets: usize,
    pub datatypes: usize,
}

pub struct ObjectStore {
    container: Box<dyn Container>,
    sidecar: Option<Sidecar>,
    config: StoreConfig,
    index: ObjectIndex,
    by_address: HashMap<Address, ObjectUuid>,
    addresses: HashMap<ObjectUuid, Address>,
    dirty: bool,
}

impl ObjectStore {
    /// Open a store over `container`, creating its index on first use.
    ///
    /// Read-write containers keep the index embedded. Read-only containers
    /// load it from the sidecar, building and saving the sidecar with a full
    /// traversal when it does not exist yet.
    pub fn open(container: Box<dyn Container>, config: StoreConfig) -> StoreResult<Self> {
        let read_only = container.is_read_only();
        let sidecar = if read_only {
            container
                .location()
                .map(|path| Sidecar::for_container(path, &config.sidecar_ext))
        } else {
            None
        };

        let (index, created) = if read_only {
            let loaded = match &sidecar {
                Some(s) => s.load()?,
                None => None,
            };
            match loaded {
                Some(index) => (index, false),
                None => {
                    let index = build_index(container.document(), LocatorMode::ByPath);
                    if let Some(s) = &sidecar {
                        s.save(&index)?;
                    }
                    (index, true)
                }
            }
        } else {
            match container.document().metadata(INDEX_SLOT) {
                Some(bytes) => (ObjectIndex::decode(bytes)?, false),
                None => (build_index(container.document(), LocatorMode::ByAddress), true),
            }
        };

        let mut store = Self {
            container,
            sidecar,
            config,
            index,
            by_address: HashMap::new(),
            addresses: HashMap::new(),
            dirty: created && !read_only,
        };
        store.rebuild_address_maps();
        debug!(
            root = %store.root_uuid(),
            read_only,
            created,
            objects = store.addresses.len(),
            "object store opened"
        );
        Ok(store)
    }

    /// A writable store over a fresh in-memory container.
    pub fn in_memory() -> StoreResult<Self> {
        Self::open(
            Box::new(crate::memory::InMemoryContainer::new()),
            StoreConfig::default(),
        )
    }

    /// Register every reachable object that has no UUID yet. Idempotent;
    /// returns the number of UUIDs assigned.
    pub fn initialize(&mut self) -> StoreResult<usize> {
        let read_only = self.container.is_read_only();
        let mode = if read_only {
            LocatorMode::ByPath
        } else {
            LocatorMode::ByAddress
        };
        let assigned = backfill(self.container.document(), &mut self.index, mode);
        if assigned > 0 {
            self.rebuild_address_maps();
            match &self.sidecar {
                Some(sidecar) if read_only => sidecar.save(&self.index)?,
                _ => self.dirty = !read_only,
            }
        }
        Ok(assigned)
    }

    fn rebuild_address_maps(&mut self) {
        self.by_address.clear();
        self.addresses.clear();
        let doc = self.container.document();
        for (_, id, locator) in self.index.entries() {
            let addr = match locator {
                Locator::Address(addr) => Some(*addr),
                Locator::Path(path) => walk_hard(doc, path),
            };
            match addr {
                Some(addr) => {
                    self.by_address.insert(addr, *id);
                    self.addresses.insert(*id, addr);
                }
                None => warn!(%id, ?locator, "index entry does not resolve"),
            }
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.container.is_read_only()
    }

    pub fn root_uuid(&self) -> ObjectUuid {
        self.index.root()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn sidecar(&self) -> Option<&Sidecar> {
        self.sidecar.as_ref()
    }

    /// Write pending index and document changes.
    pub fn flush(&mut self) -> StoreResult<()> {
        if !self.dirty || self.container.is_read_only() {
            return Ok(());
        }
        let bytes = self.index.encode()?;
        self.container.document_mut()?.set_metadata(INDEX_SLOT, bytes);
        self.container.flush()?;
        self.dirty = false;
        Ok(())
    }

    /// Flush and release the container.
    pub fn close(mut self) -> StoreResult<()> {
        self.flush()
    }

    // ---- internal accessors shared with the attribute and value modules ----

    pub(crate) fn doc(&self) -> &ContainerDocument {
        self.container.document()
    }

    pub(crate) fn doc_mut(&mut self) -> StoreResult<&mut ContainerDocument> {
        let doc = self.container.document_mut()?;
        self.dirty = true;
        Ok(doc)
    }

    pub(crate) fn address_of(&self, id: &ObjectUuid) -> StoreResult<Address> {
        self.addresses
            .get(id)
            .copied()
            .ok_or(StoreError::ObjectNotFound(*id))
    }

    pub(crate) fn entry(&self, id: &ObjectUuid) -> StoreResult<(Address, &ContainerObject)> {
        let addr = self.address_of(id)?;
        let obj = self
            .doc()
            .get(addr)
            .ok_or_else(|| StoreError::CorruptIndex(format!("{id} points at missing {addr:?}")))?;
        Ok((addr, obj))
    }

    pub(crate) fn entry_mut(&mut self, id: &ObjectUuid) -> StoreResult<&mut ContainerObject> {
        let addr = self.address_of(id)?;
        self.doc_mut()?
            .get_mut(addr)
            .ok_or_else(|| StoreError::CorruptIndex(format!("{id} points at missing {addr:?}")))
    }

    pub(crate) fn dataset(&self, id: &ObjectUuid) -> StoreResult<&DatasetBody> {
        let (_, obj) = self.entry(id)?;
        match &obj.body {
            ObjectBody::Dataset(body) => Ok(body),
            _ => Err(StoreError::WrongKind {
                id: *id,
                expected: ObjectKind::Dataset,
                found: obj.kind(),
            }),
        }
    }

    fn uuid_at(&self, addr: Address) -> StoreResult<ObjectUuid> {
        self.by_address
            .get(&addr)
            .copied()
            .ok_or_else(|| StoreError::CorruptIndex(format!("no UUID for {addr:?}")))
    }

    fn register(&mut self, addr: Address, kind: ObjectKind) -> ObjectUuid {
        let id = ObjectUuid::new();
        self.index.insert(id, kind, Locator::Address(addr));
        self.by_address.insert(addr, id);
        self.addresses.insert(id, addr);
        self.dirty = true;
        id
    }

    /// Convert a caller schema to its stored form, checking committed types.
    pub(crate) fn to_stored(&self, schema: &Schema) -> StoreResult<StoredSchema> {
        match schema {
            Schema::Inline(ty) => Ok(StoredSchema::Inline(ty.clone())),
            Schema::Committed { id, .. } => {
                let (addr, obj) = self.entry(id)?;
                match obj.body {
                    ObjectBody::Datatype(_) => Ok(StoredSchema::Committed(addr)),
                    _ => Err(StoreError::WrongKind {
                        id: *id,
                        expected: ObjectKind::Datatype,
                        found: obj.kind(),
                    }),
                }
            }
        }
    }

    /// Rebuild a caller schema. A committed type that has since been
    /// deleted is reported inline.
    pub(crate) fn from_stored(&self, stored: &StoredSchema) -> StoreResult<Schema> {
        match stored {
            StoredSchema::Inline(ty) => Ok(Schema::Inline(ty.clone())),
            StoredSchema::Committed(addr) => {
                let descriptor = self.committed_descriptor(*addr)?;
                Ok(match self.by_address.get(addr) {
                    Some(id) => Schema::Committed { id: *id, descriptor },
                    None => Schema::Inline(descriptor),
                })
            }
        }
    }

    pub(crate) fn descriptor_of(&self, stored: &StoredSchema) -> StoreResult<TypeDescriptor> {
        match stored {
            StoredSchema::Inline(ty) => Ok(ty.clone()),
            StoredSchema::Committed(addr) => self.committed_descriptor(*addr),
        }
    }

    fn committed_descriptor(&self, addr: Address) -> StoreResult<TypeDescriptor> {
        match self.doc().get(addr).map(|obj| &obj.body) {
            Some(ObjectBody::Datatype(ty)) => Ok(ty.clone()),
            _ => Err(StoreError::CorruptIndex(format!(
                "schema refers to {addr:?}, which is not a datatype"
            ))),
        }
    }

    pub(crate) fn collision(&self) -> CollisionPolicy {
        self.config.collision
    }

    // ---- path resolution ----

    /// UUID of the object at `path`. `/` is the root, answered without
    /// traversal. Relative paths start at the root.
    pub fn resolve_path(&self, path: &str) -> StoreResult<ObjectUuid> {
        if names::segments(path).next().is_none() {
            return Ok(self.root_uuid());
        }
        let addr = self.walk(self.doc().root(), path, path, 0)?;
        self.uuid_at(addr)
    }

    fn walk(&self, start: Address, path: &str, requested: &str, depth: usize) -> StoreResult<Address> {
        let doc = self.doc();
        let not_found = || StoreError::PathNotFound(requested.to_string());
        let mut current = if path.starts_with('/') { doc.root() } else { start };
        for segment in names::segments(path) {
            let obj = doc.get(current).ok_or_else(not_found)?;
            let links = obj
                .links()
                .ok_or_else(|| StoreError::NotAGroup(requested.to_string()))?;
            current = match links.get(segment).ok_or_else(not_found)? {
                StoredLink::Hard(addr) => *addr,
                StoredLink::Soft { path: target } => {
                    if depth >= MAX_SOFT_LINK_DEPTH {
                        return Err(StoreError::InvalidPath {
                            path: requested.to_string(),
                            reason: "too many levels of soft links".into(),
                        });
                    }
                    self.walk(current, target, requested, depth + 1)?
                }
                StoredLink::External { domain, .. } => {
                    return Err(StoreError::InvalidPath {
                        path: requested.to_string(),
                        reason: format!("'{segment}' is an external link into {domain}"),
                    });
                }
            };
        }
        doc.get(current).ok_or_else(not_found)?;
        Ok(current)
    }

    // ---- objects ----

    pub fn object(&self, id: &ObjectUuid) -> StoreResult<ObjectInfo> {
        let (_, obj) = self.entry(id)?;
        let detail = match &obj.body {
            ObjectBody::Group { links } => ObjectDetail::Group {
                link_count: links.len(),
            },
            ObjectBody::Dataset(body) => ObjectDetail::Dataset {
                schema: self.from_stored(&body.schema)?,
                shape: body.shape.clone(),
                max_shape: body.max_shape.clone(),
            },
            ObjectBody::Datatype(ty) => ObjectDetail::Datatype {
                descriptor: ty.clone(),
            },
        };
        Ok(ObjectInfo {
            id: *id,
            kind: obj.kind(),
            created: obj.created,
            modified: obj.modified,
            attribute_count: obj.attributes.len(),
            detail,
        })
    }

    pub fn object_at(&self, path: &str) -> StoreResult<ObjectInfo> {
        self.object(&self.resolve_path(path)?)
    }

    pub fn create_group(&mut self) -> StoreResult<ObjectUuid> {
        let addr = self.doc_mut()?.insert(ObjectBody::empty_group());
        let id = self.register(addr, ObjectKind::Group);
        debug!(%id, "group created");
        Ok(id)
    }

    pub fn create_dataset(
        &mut self,
        schema: &Schema,
        shape: Vec<usize>,
        max_shape: Option<Vec<Option<usize>>>,
    ) -> StoreResult<ObjectUuid> {
        if arbor_codec::element_count(&shape).is_none() {
            return Err(StoreError::InvalidShape(format!("shape {shape:?} is too large")));
        }
        if let Some(max) = &max_shape {
            check_max_shape(&shape, max)?;
        }
        let stored = self.to_stored(schema)?;
        let addr = self.doc_mut()?.insert(ObjectBody::Dataset(DatasetBody {
            schema: stored,
            shape,
            max_shape,
            values: None,
        }));
        let id = self.register(addr, ObjectKind::Dataset);
        debug!(%id, "dataset created");
        Ok(id)
    }

    pub fn create_committed_type(&mut self, ty: &TypeDescriptor) -> StoreResult<ObjectUuid> {
        let addr = self.doc_mut()?.insert(ObjectBody::Datatype(ty.clone()));
        let id = self.register(addr, ObjectKind::Datatype);
        debug!(%id, class = ty.class_name(), "committed type created");
        Ok(id)
    }

    /// Delete an object: every hard link to it is removed along with its
    /// index and ACL entries. Its bytes stay in the container, unreachable.
    pub fn delete_object(&mut self, id: &ObjectUuid) -> StoreResult<()> {
        if self.is_read_only() {
            return Err(StoreError::ReadOnly);
        }
        if *id == self.root_uuid() {
            return Err(StoreError::RootDeletion);
        }
        let addr = self.address_of(id)?;
        let target = StoredLink::Hard(addr);
        let mut removed = 0;
        for (_, links) in self.doc_mut()?.link_tables_mut() {
            let before = links.len();
            links.retain(|_, link| *link != target);
            removed += before - links.len();
        }
        self.index.remove(id);
        self.index.acls.remove_object(id);
        self.by_address.remove(&addr);
        self.addresses.remove(id);
        debug!(%id, links_removed = removed, "object deleted");
        Ok(())
    }

    /// UUIDs of one kind in UUID order, starting after `marker`.
    pub fn list_objects(
        &self,
        kind: ObjectKind,
        marker: Option<&ObjectUuid>,
        limit: Option<usize>,
    ) -> Vec<ObjectUuid> {
        let mut ids = self.index.uuids(kind).peekable();
        if let Some(marker) = marker {
            if !self.index.uuids(kind).any(|id| id == marker) {
                return Vec::new();
            }
            while ids.next_if(|id| *id <= marker).is_some() {}
        }
        ids.take(limit.unwrap_or(usize::MAX)).copied().collect()
    }

    pub fn counts(&self) -> ObjectCounts {
        ObjectCounts {
            groups: self.index.count(ObjectKind::Group),
            datasets: self.index.count(ObjectKind::Dataset),
            datatypes: self.index.count(ObjectKind::Datatype),
        }
    }

    // ---- links ----

    fn insert_link(&mut self, parent: &ObjectUuid, name: &str, link: StoredLink) -> StoreResult<()> {
        names::validate_link_name(name)?;
        let policy = self.collision();
        let obj = self.entry_mut(parent)?;
        let links = obj
            .links_mut()
            .ok_or_else(|| StoreError::NotAGroup(parent.to_string()))?;
        if links.contains_key(name) {
            match policy {
                CollisionPolicy::Reject => {
                    return Err(StoreError::LinkExists {
                        parent: *parent,
                        name: name.to_string(),
                    })
                }
                CollisionPolicy::Replace => {
                    links.remove(name);
                    debug!(%parent, name, "replacing existing link");
                }
            }
        }
        links.insert(name.to_string(), link);
        obj.touch();
        Ok(())
    }

    /// Hard-link `target` into `parent` as `name`.
    pub fn link(&mut self, parent: &ObjectUuid, target: &ObjectUuid, name: &str) -> StoreResult<()> {
        let addr = self.address_of(target)?;
        self.insert_link(parent, name, StoredLink::Hard(addr))?;
        debug!(%parent, %target, name, "hard link created");
        Ok(())
    }

    /// The target path is not checked; soft links may dangle.
    pub fn create_soft_link(&mut self, parent: &ObjectUuid, path: &str, name: &str) -> StoreResult<()> {
        self.insert_link(parent, name, StoredLink::Soft { path: path.to_string() })?;
        debug!(%parent, name, path, "soft link created");
        Ok(())
    }

    pub fn create_external_link(
        &mut self,
        parent: &ObjectUuid,
        domain: &str,
        path: &str,
        name: &str,
    ) -> StoreResult<()> {
        self.insert_link(
            parent,
            name,
            StoredLink::External {
                domain: domain.to_string(),
                path: path.to_string(),
            },
        )?;
        debug!(%parent, name, domain, "external link created");
        Ok(())
    }

    /// Remove the edge `parent/name`. The target object is untouched.
    pub fn unlink(&mut self, parent: &ObjectUuid, name: &str) -> StoreResult<()> {
        let obj = self.entry_mut(parent)?;
        let links = obj
            .links_mut()
            .ok_or_else(|| StoreError::NotAGroup(parent.to_string()))?;
        if links.remove(name).is_none() {
            return Err(StoreError::LinkNotFound {
                parent: *parent,
                name: name.to_string(),
            });
        }
        obj.touch();
        debug!(%parent, name, "link removed");
        Ok(())
    }

    fn group_links(&self, parent: &ObjectUuid) -> StoreResult<&BTreeMap<String, StoredLink>> {
        let (_, obj) = self.entry(parent)?;
        obj.links()
            .ok_or_else(|| StoreError::NotAGroup(parent.to_string()))
    }

    fn link_item(&self, name: &str, link: &StoredLink) -> StoreResult<LinkItem> {
        let target = match link {
            StoredLink::Hard(addr) => {
                let id = self.uuid_at(*addr)?;
                let kind = self
                    .doc()
                    .get(*addr)
                    .map(ContainerObject::kind)
                    .ok_or_else(|| StoreError::CorruptIndex(format!("dangling hard link {name:?}")))?;
                LinkTarget::Hard { id, kind }
            }
            StoredLink::Soft { path } => LinkTarget::Soft { path: path.clone() },
            StoredLink::External { domain, path } => LinkTarget::External {
                domain: domain.clone(),
                path: path.clone(),
            },
        };
        Ok(LinkItem {
            name: name.to_string(),
            target,
        })
    }

    pub fn get_link(&self, parent: &ObjectUuid, name: &str) -> StoreResult<LinkItem> {
        let link = self
            .group_links(parent)?
            .get(name)
            .ok_or_else(|| StoreError::LinkNotFound {
                parent: *parent,
                name: name.to_string(),
            })?;
        self.link_item(name, link)
    }

    /// Links of `parent` in name order, starting after `marker`. A marker
    /// that names no link yields an empty page.
    pub fn list_links(
        &self,
        parent: &ObjectUuid,
        marker: Option<&str>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<LinkItem>> {
        let links = self.group_links(parent)?;
        let lower = match marker {
            Some(m) if !links.contains_key(m) => return Ok(Vec::new()),
            Some(m) => Bound::Excluded(m),
            None => Bound::Unbounded,
        };
        links
            .range::<str, _>((lower, Bound::Unbounded))
            .take(limit.unwrap_or(usize::MAX))
            .map(|(name, link)| self.link_item(name, link))
            .collect()
    }

    // ---- access control ----

    pub fn get_acl(&self, id: &ObjectUuid, user: UserId) -> StoreResult<EffectiveAcl> {
        self.address_of(id)?;
        Ok(self.index.acls.resolve(id, user, &self.root_uuid()))
    }

    /// Explicit entries on one object, ordered by user id.
    pub fn acls(&self, id: &ObjectUuid) -> StoreResult<Vec<Acl>> {
        self.address_of(id)?;
        Ok(self.index.acls.list(id))
    }

    pub fn set_acl(&mut self, id: &ObjectUuid, acl: Acl) -> StoreResult<()> {
        if self.is_read_only() {
            return Err(StoreError::ReadOnly);
        }
        self.address_of(id)?;
        self.index.acls.set(*id, acl);
        self.dirty = true;
        debug!(%id, user = %acl.userid, "acl updated");
        Ok(())
    }

    /// Check one permission for `user` (`None` is anonymous) on `id`.
    pub fn authorize(&self, id: &ObjectUuid, user: Option<UserId>, permission: Permission) -> StoreResult<()> {
        let user = user.unwrap_or(UserId::DEFAULT);
        if self.get_acl(id, user)?.acl.allows(permission) {
            Ok(())
        } else {
            Err(StoreError::PermissionDenied {
                object: *id,
                user,
                permission,
            })
        }
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("root", &self.index.root())
            .field("object_count", &self.addresses.len())
            .field("read_only", &self.container.is_read_only())
            .field("dirty", &self.dirty)
            .finish()
    }
}

/// A new index over `doc` with every reachable object registered and a
/// permissive container-wide default ACL.
fn build_index(doc: &ContainerDocument, mode: LocatorMode) -> ObjectIndex {
    let root = match mode {
        LocatorMode::ByAddress => Locator::Address(doc.root()),
        LocatorMode::ByPath => Locator::Path("/".to_string()),
    };
    let mut index = ObjectIndex::new(root);
    let assigned = backfill(doc, &mut index, mode);
    let root_id = index.root();
    index.acls.set(root_id, Acl::allow_all(UserId::DEFAULT));
    debug!(root = %root_id, assigned, ?mode, "index created");
    index
}

/// Follow hard links only; used to place sidecar path locators.
fn walk_hard(doc: &ContainerDocument, path: &str) -> Option<Address> {
    let mut current = doc.root();
    for segment in names::segments(path) {
        match doc.get(current)?.links()?.get(segment)? {
            StoredLink::Hard(addr) => current = *addr,
            _ => return None,
        }
    }
    Some(current)
}

pub(crate) fn check_max_shape(shape: &[usize], max: &[Option<usize>]) -> StoreResult<()> {
    if max.len() != shape.len() {
        return Err(StoreError::InvalidShape(format!(
            "max shape rank {} does not match shape rank {}",
            max.len(),
            shape.len()
        )));
    }
    for (axis, (&extent, bound)) in shape.iter().zip(max).enumerate() {
        if let Some(bound) = bound {
            if extent > *bound {
                return Err(StoreError::InvalidShape(format!(
                    "extent {extent} exceeds max {bound} on axis {axis}"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{FileContainer, OpenMode};
    use crate::memory::InMemoryContainer;
    use arbor_codec::{shape_schema, EnumType, IntegerType};
    use arbor_types::ErrorKind;
    use serde_json::json;

    fn int32() -> TypeDescriptor {
        TypeDescriptor::Integer(IntegerType::signed(32).unwrap())
    }

    fn with_group(store: &mut ObjectStore, parent: &ObjectUuid, name: &str) -> ObjectUuid {
        let id = store.create_group().unwrap();
        store.link(parent, &id, name).unwrap();
        id
    }

    // ---- identity ----

    #[test]
    fn root_resolves_without_traversal() {
        let store = ObjectStore::in_memory().unwrap();
        assert_eq!(store.resolve_path("/").unwrap(), store.root_uuid());
        assert_eq!(store.resolve_path("").unwrap(), store.root_uuid());
        assert_eq!(store.counts().groups, 1);
    }

    #[test]
    fn uuid_round_trip() {
        let mut store = ObjectStore::in_memory().unwrap();
        let root = store.root_uuid();
        let g1 = with_group(&mut store, &root, "g1");
        let g2 = with_group(&mut store, &g1, "g2");

        let by_path = store.object_at("/g1/g2").unwrap();
        let by_uuid = store.object(&store.resolve_path("/g1/g2").unwrap()).unwrap();
        assert_eq!(by_path, by_uuid);
        assert_eq!(by_path.id, g2);
        assert_eq!(store.resolve_path("g1").unwrap(), g1);
    }

    #[test]
    fn scenario_dataset_in_group() {
        let mut store = ObjectStore::in_memory().unwrap();
        let root = store.root_uuid();
        let g1 = with_group(&mut store, &root, "g1");
        let d1 = store
            .create_dataset(&Schema::Inline(int32()), vec![10], None)
            .unwrap();
        store.link(&g1, &d1, "d1").unwrap();

        let mut mapping = BTreeMap::new();
        mapping.insert("LOW".to_string(), 0);
        mapping.insert("HIGH".to_string(), 1);
        let enum_ty = TypeDescriptor::Enum(EnumType {
            base: IntegerType::signed(8).unwrap(),
            mapping,
        });
        let t = store.create_committed_type(&enum_ty).unwrap();
        store
            .put_attribute(
                &g1,
                "level",
                &Schema::Committed { id: t, descriptor: enum_ty.clone() },
                arbor_codec::NdArray::scalar(arbor_codec::Element::Int(1)),
            )
            .unwrap();

        assert_eq!(store.resolve_path("/g1/d1").unwrap(), d1);
        let ObjectDetail::Dataset { schema, shape, .. } = store.object(&d1).unwrap().detail else {
            panic!("expected a dataset");
        };
        assert_eq!(shape, [10]);
        assert_eq!(
            shape_schema(&schema),
            json!({"class": "H5T_INTEGER", "base": "H5T_STD_I32LE"})
        );
        let attr = store.attribute(&g1, "level").unwrap();
        assert_eq!(attr.schema.committed_id(), Some(t));
    }

    // ---- path resolution ----

    #[test]
    fn missing_segment_is_not_found() {
        let store = ObjectStore::in_memory().unwrap();
        let err = store.resolve_path("/nope").unwrap_err();
        assert!(matches!(err, StoreError::PathNotFound(_)));
        assert_eq!(err.kind(), arbor_types::ErrorKind::NotFound);
    }

    #[test]
    fn traversal_through_dataset_is_bad_request() {
        let mut store = ObjectStore::in_memory().unwrap();
        let root = store.root_uuid();
        let d = store.create_dataset(&Schema::Inline(int32()), vec![], None).unwrap();
        store.link(&root, &d, "d").unwrap();
        assert!(matches!(
            store.resolve_path("/d/x"),
            Err(StoreError::NotAGroup(_))
        ));
    }

    #[test]
    fn soft_links_resolve_at_traversal_time() {
        let mut store = ObjectStore::in_memory().unwrap();
        let root = store.root_uuid();
        let g1 = with_group(&mut store, &root, "g1");
        store.create_soft_link(&root, "/g1/later", "abs").unwrap();
        store.create_soft_link(&g1, "later", "rel").unwrap();

        assert!(matches!(store.resolve_path("/abs"), Err(StoreError::PathNotFound(_))));
        let later = with_group(&mut store, &g1, "later");
        assert_eq!(store.resolve_path("/abs").unwrap(), later);
        assert_eq!(store.resolve_path("/g1/rel").unwrap(), later);
    }

    #[test]
    fn soft_link_cycles_are_bounded() {
        let mut store = ObjectStore::in_memory().unwrap();
        let root = store.root_uuid();
        store.create_soft_link(&root, "/b", "a").unwrap();
        store.create_soft_link(&root, "/a", "b").unwrap();
        assert!(matches!(
            store.resolve_path("/a"),
            Err(StoreError::InvalidPath { .. })
        ));
    }

    #[test]
    fn external_links_are_not_traversed() {
        let mut store = ObjectStore::in_memory().unwrap();
        let root = store.root_uuid();
        store
            .create_external_link(&root, "other.example.org", "/", "ext")
            .unwrap();
        let err = store.resolve_path("/ext/x").unwrap_err();
        assert_eq!(err.kind(), arbor_types::ErrorKind::BadRequest);
    }

    // ---- links ----

    #[test]
    fn link_unlink_inverse() {
        let mut store = ObjectStore::in_memory().unwrap();
        let root = store.root_uuid();
        let t = store.create_group().unwrap();
        store.link(&root, &t, "n").unwrap();
        store.unlink(&root, "n").unwrap();

        assert!(matches!(store.resolve_path("/n"), Err(StoreError::PathNotFound(_))));
        assert_eq!(store.object(&t).unwrap().id, t);
        assert!(matches!(
            store.unlink(&root, "n"),
            Err(StoreError::LinkNotFound { .. })
        ));
    }

    #[test]
    fn duplicate_link_name_conflicts() {
        let mut store = ObjectStore::in_memory().unwrap();
        let root = store.root_uuid();
        with_group(&mut store, &root, "g");
        let other = store.create_group().unwrap();
        let err = store.link(&root, &other, "g").unwrap_err();
        assert!(matches!(err, StoreError::LinkExists { .. }));
        assert_eq!(err.kind(), arbor_types::ErrorKind::Conflict);
    }

    #[test]
    fn replace_policy_overwrites_link() {
        let config = StoreConfig {
            collision: CollisionPolicy::Replace,
            ..StoreConfig::default()
        };
        let mut store = ObjectStore::open(Box::new(InMemoryContainer::new()), config).unwrap();
        let root = store.root_uuid();
        with_group(&mut store, &root, "g");
        let other = store.create_group().unwrap();
        store.link(&root, &other, "g").unwrap();
        assert_eq!(store.resolve_path("/g").unwrap(), other);
    }

    #[test]
    fn invalid_link_names_rejected() {
        let mut store = ObjectStore::in_memory().unwrap();
        let root = store.root_uuid();
        let g = store.create_group().unwrap();
        for name in ["", "a/b"] {
            assert!(matches!(
                store.link(&root, &g, name),
                Err(StoreError::InvalidName { .. })
            ));
        }
    }

    #[test]
    fn linking_into_non_group_is_rejected() {
        let mut store = ObjectStore::in_memory().unwrap();
        let t = store.create_committed_type(&int32()).unwrap();
        let g = store.create_group().unwrap();
        assert!(matches!(store.link(&t, &g, "x"), Err(StoreError::NotAGroup(_))));
    }

    #[test]
    fn get_link_reports_targets() {
        let mut store = ObjectStore::in_memory().unwrap();
        let root = store.root_uuid();
        let g = with_group(&mut store, &root, "g");
        store.create_soft_link(&root, "/g", "s").unwrap();
        store.create_external_link(&root, "x.org", "/a", "e").unwrap();

        let hard = store.get_link(&root, "g").unwrap();
        assert_eq!(hard.target, LinkTarget::Hard { id: g, kind: ObjectKind::Group });
        assert_eq!(hard.target.class_name(), "H5L_TYPE_HARD");
        assert_eq!(store.get_link(&root, "s").unwrap().target.class_name(), "H5L_TYPE_SOFT");
        assert_eq!(
            store.get_link(&root, "e").unwrap().target,
            LinkTarget::External { domain: "x.org".into(), path: "/a".into() }
        );
    }

    #[test]
    fn list_links_paginates_in_name_order() {
        let mut store = ObjectStore::in_memory().unwrap();
        let root = store.root_uuid();
        for name in ["c", "a", "d", "b"] {
            with_group(&mut store, &root, name);
        }
        let names = |items: Vec<LinkItem>| items.into_iter().map(|l| l.name).collect::<Vec<_>>();

        assert_eq!(names(store.list_links(&root, None, None).unwrap()), ["a", "b", "c", "d"]);
        assert_eq!(names(store.list_links(&root, None, Some(2)).unwrap()), ["a", "b"]);
        assert_eq!(names(store.list_links(&root, Some("b"), Some(1)).unwrap()), ["c"]);
        assert!(store.list_links(&root, Some("zz"), None).unwrap().is_empty());
    }

    // ---- deletion ----

    #[test]
    fn delete_removes_every_hard_link() {
        let mut store = ObjectStore::in_memory().unwrap();
        let root = store.root_uuid();
        let g1 = with_group(&mut store, &root, "g1");
        let d = store.create_dataset(&Schema::Inline(int32()), vec![2], None).unwrap();
        store.link(&root, &d, "d").unwrap();
        store.link(&g1, &d, "alias").unwrap();
        store.set_acl(&d, Acl::allow_all(UserId(5))).unwrap();

        store.delete_object(&d).unwrap();
        assert!(matches!(store.object(&d), Err(StoreError::ObjectNotFound(_))));
        assert!(store.list_links(&g1, None, None).unwrap().is_empty());
        assert_eq!(store.counts().datasets, 0);
        assert!(store.get_acl(&d, UserId(5)).is_err());
    }

    #[test]
    fn root_cannot_be_deleted() {
        let mut store = ObjectStore::in_memory().unwrap();
        let root = store.root_uuid();
        let err = store.delete_object(&root).unwrap_err();
        assert_eq!(err.kind(), arbor_types::ErrorKind::Forbidden);
    }

    #[test]
    fn deleted_committed_type_reads_back_inline() {
        let mut store = ObjectStore::in_memory().unwrap();
        let t = store.create_committed_type(&int32()).unwrap();
        let d = store
            .create_dataset(&Schema::Committed { id: t, descriptor: int32() }, vec![1], None)
            .unwrap();
        store.delete_object(&t).unwrap();
        let ObjectDetail::Dataset { schema, .. } = store.object(&d).unwrap().detail else {
            panic!("expected a dataset");
        };
        assert_eq!(schema, Schema::Inline(int32()));
    }

    #[test]
    fn committed_schema_must_be_a_datatype() {
        let mut store = ObjectStore::in_memory().unwrap();
        let g = store.create_group().unwrap();
        let err = store
            .create_dataset(&Schema::Committed { id: g, descriptor: int32() }, vec![1], None)
            .unwrap_err();
        assert!(matches!(err, StoreError::WrongKind { .. }));
    }

    #[test]
    fn max_shape_is_validated() {
        let mut store = ObjectStore::in_memory().unwrap();
        let schema = Schema::Inline(int32());
        assert!(store.create_dataset(&schema, vec![4], Some(vec![None])).is_ok());
        assert!(store.create_dataset(&schema, vec![4], Some(vec![Some(4)])).is_ok());
        for max in [vec![Some(3)], vec![None, None]] {
            assert!(matches!(
                store.create_dataset(&schema, vec![4], Some(max)),
                Err(StoreError::InvalidShape(_))
            ));
        }
    }

    #[test]
    fn overflowing_shape_is_rejected() {
        let mut store = ObjectStore::in_memory().unwrap();
        let err = store
            .create_dataset(&Schema::Inline(int32()), vec![usize::MAX, 2], None)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidShape(_)));
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn list_objects_by_kind() {
        let mut store = ObjectStore::in_memory().unwrap();
        let mut ids: Vec<_> = (0..3).map(|_| store.create_group().unwrap()).collect();
        ids.push(store.root_uuid());
        ids.sort();

        assert_eq!(store.list_objects(ObjectKind::Group, None, None), ids);
        assert_eq!(store.list_objects(ObjectKind::Group, Some(&ids[1]), Some(1)), [ids[2]]);
        assert!(store.list_objects(ObjectKind::Group, Some(&ObjectUuid::new()), None).is_empty());
        assert!(store.list_objects(ObjectKind::Dataset, None, None).is_empty());
    }

    // ---- access control ----

    #[test]
    fn fresh_container_is_permissive() {
        let store = ObjectStore::in_memory().unwrap();
        let root = store.root_uuid();
        assert!(store.authorize(&root, None, Permission::Create).is_ok());
        assert!(store.authorize(&root, Some(UserId(9)), Permission::UpdateAcl).is_ok());
    }

    #[test]
    fn acl_precedence() {
        let mut store = ObjectStore::in_memory().unwrap();
        let root = store.root_uuid();
        let g = with_group(&mut store, &root, "g");
        store.set_acl(&g, Acl::read_only(UserId::DEFAULT)).unwrap();
        store.set_acl(&g, Acl::allow_all(UserId(7))).unwrap();

        assert!(store.authorize(&g, Some(UserId(7)), Permission::Delete).is_ok());
        let err = store.authorize(&g, Some(UserId(8)), Permission::Delete).unwrap_err();
        assert_eq!(err.kind(), arbor_types::ErrorKind::PermissionDenied);
        assert!(store.authorize(&g, None, Permission::Read).is_ok());

        store.set_acl(&root, Acl::deny_all(UserId::DEFAULT)).unwrap();
        let other = with_group(&mut store, &root, "other");
        assert!(store.get_acl(&other, UserId(8)).unwrap().acl == Acl::deny_all(UserId(8)));
    }

    #[test]
    fn unknown_object_acl_is_not_found() {
        let store = ObjectStore::in_memory().unwrap();
        assert!(matches!(
            store.get_acl(&ObjectUuid::new(), UserId(1)),
            Err(StoreError::ObjectNotFound(_))
        ));
    }

    // ---- persistence ----

    #[test]
    fn embedded_index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.h5");
        let (g1, root) = {
            let container = FileContainer::create(&path).unwrap();
            let mut store = ObjectStore::open(Box::new(container), StoreConfig::default()).unwrap();
            let root = store.root_uuid();
            let g1 = with_group(&mut store, &root, "g1");
            store.set_acl(&g1, Acl::allow_all(UserId(3))).unwrap();
            store.close().unwrap();
            (g1, root)
        };

        let container = FileContainer::open(&path, OpenMode::ReadWrite).unwrap();
        let mut store = ObjectStore::open(Box::new(container), StoreConfig::default()).unwrap();
        assert_eq!(store.root_uuid(), root);
        assert_eq!(store.resolve_path("/g1").unwrap(), g1);
        assert_eq!(store.acls(&g1).unwrap(), [Acl::allow_all(UserId(3))]);
        assert_eq!(store.initialize().unwrap(), 0);
    }

    #[test]
    fn read_only_container_uses_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro.h5");
        {
            let mut doc = ContainerDocument::new();
            let g = doc.insert(ObjectBody::empty_group());
            let root = doc.root();
            doc.get_mut(root)
                .unwrap()
                .links_mut()
                .unwrap()
                .insert("g".into(), StoredLink::Hard(g));
            let mut container = FileContainer::create(&path).unwrap();
            *container.document_mut().unwrap() = doc;
            container.flush().unwrap();
        }

        let open = || {
            let container = FileContainer::open(&path, OpenMode::ReadOnly).unwrap();
            ObjectStore::open(Box::new(container), StoreConfig::default()).unwrap()
        };
        let first = open();
        let sidecar = dir.path().join("ro.db");
        assert_eq!(first.sidecar().unwrap().path(), sidecar);
        assert!(sidecar.exists());
        let g = first.resolve_path("/g").unwrap();

        let mut second = open();
        assert_eq!(second.root_uuid(), first.root_uuid());
        assert_eq!(second.resolve_path("/g").unwrap(), g);

        let err = second.create_group().unwrap_err();
        assert_eq!(err.kind(), arbor_types::ErrorKind::Forbidden);
        assert!(matches!(
            second.set_acl(&g, Acl::allow_all(UserId(1))),
            Err(StoreError::ReadOnly)
        ));
        assert!(matches!(second.delete_object(&g), Err(StoreError::ReadOnly)));
    }

    #[test]
    fn open_indexes_preexisting_objects() {
        let mut container = InMemoryContainer::new();
        let mut store_doc = container.document().clone();
        let extra = store_doc.insert(ObjectBody::empty_group());
        let root = store_doc.root();
        store_doc
            .get_mut(root)
            .unwrap()
            .links_mut()
            .unwrap()
            .insert("late".into(), StoredLink::Hard(extra));
        *container.document_mut().unwrap() = store_doc;

        let mut store = ObjectStore::open(Box::new(container), StoreConfig::default()).unwrap();
        assert!(store.resolve_path("/late").is_ok());
        assert_eq!(store.initialize().unwrap(), 0);
    }
}
