//! Per-container UUID index.
//!
//! The index maps UUIDs to locators per object kind and keeps the reverse
//! locator→UUID map. Writable containers locate objects by [`Address`] and
//! keep the index in a reserved metadata slot. Read-only containers cannot
//! be written, so their index locates objects by path and lives in a
//! sidecar file next to the container.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use arbor_types::{ObjectKind, ObjectUuid};

use crate::acl::AclTable;
use crate::container::{Address, ContainerDocument, StoredLink};
use crate::error::{StoreError, StoreResult};
use crate::names;

/// Metadata slot holding the embedded index of a writable container.
pub const INDEX_SLOT: &str = "__db__";

/// Where an indexed object lives.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Locator {
    Address(Address),
    Path(String),
}

impl Locator {
    fn key(&self) -> String {
        match self {
            Self::Address(a) => a.to_string(),
            Self::Path(p) => p.clone(),
        }
    }
}

/// How the backfill traversal locates the objects it registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocatorMode {
    ByAddress,
    ByPath,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectIndex {
    root: ObjectUuid,
    groups: BTreeMap<ObjectUuid, Locator>,
    datasets: BTreeMap<ObjectUuid, Locator>,
    datatypes: BTreeMap<ObjectUuid, Locator>,
    reverse: BTreeMap<String, ObjectUuid>,
    pub acls: AclTable,
}

impl ObjectIndex {
    /// A fresh index with a newly minted root UUID.
    pub fn new(root_locator: Locator) -> Self {
        let root = ObjectUuid::new();
        let mut index = Self {
            root,
            groups: BTreeMap::new(),
            datasets: BTreeMap::new(),
            datatypes: BTreeMap::new(),
            reverse: BTreeMap::new(),
            acls: AclTable::default(),
        };
        index.insert(root, ObjectKind::Group, root_locator);
        index
    }

    pub fn root(&self) -> ObjectUuid {
        self.root
    }

    fn collection(&self, kind: ObjectKind) -> &BTreeMap<ObjectUuid, Locator> {
        match kind {
            ObjectKind::Group => &self.groups,
            ObjectKind::Dataset => &self.datasets,
            ObjectKind::Datatype => &self.datatypes,
        }
    }

    fn collection_mut(&mut self, kind: ObjectKind) -> &mut BTreeMap<ObjectUuid, Locator> {
        match kind {
            ObjectKind::Group => &mut self.groups,
            ObjectKind::Dataset => &mut self.datasets,
            ObjectKind::Datatype => &mut self.datatypes,
        }
    }

    pub fn insert(&mut self, id: ObjectUuid, kind: ObjectKind, locator: Locator) {
        self.reverse.insert(locator.key(), id);
        self.collection_mut(kind).insert(id, locator);
    }

    /// Remove an object from its collection and the reverse map.
    pub fn remove(&mut self, id: &ObjectUuid) -> Option<(ObjectKind, Locator)> {
        for kind in ObjectKind::ALL {
            if let Some(locator) = self.collection_mut(kind).remove(id) {
                self.reverse.remove(&locator.key());
                return Some((kind, locator));
            }
        }
        None
    }

    pub fn lookup(&self, id: &ObjectUuid) -> Option<(ObjectKind, &Locator)> {
        ObjectKind::ALL
            .into_iter()
            .find_map(|kind| self.collection(kind).get(id).map(|loc| (kind, loc)))
    }

    pub fn uuid_for(&self, locator: &Locator) -> Option<ObjectUuid> {
        self.reverse.get(&locator.key()).copied()
    }

    pub fn count(&self, kind: ObjectKind) -> usize {
        self.collection(kind).len()
    }

    /// UUIDs of one kind in UUID order.
    pub fn uuids(&self, kind: ObjectKind) -> impl Iterator<Item = &ObjectUuid> {
        self.collection(kind).keys()
    }

    /// Every indexed object with its kind and locator.
    pub fn entries(&self) -> impl Iterator<Item = (ObjectKind, &ObjectUuid, &Locator)> {
        ObjectKind::ALL.into_iter().flat_map(move |kind| {
            self.collection(kind).iter().map(move |(id, loc)| (kind, id, loc))
        })
    }

    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        bincode::deserialize(bytes).map_err(|e| StoreError::CorruptIndex(e.to_string()))
    }
}

/// Traversal state threaded through [`backfill`].
struct Backfill<'a> {
    index: &'a mut ObjectIndex,
    mode: LocatorMode,
    visited: HashSet<Address>,
    assigned: usize,
}

impl Backfill<'_> {
    fn visit(&mut self, addr: Address, path: &str, kind: ObjectKind) {
        let locator = match self.mode {
            LocatorMode::ByAddress => Locator::Address(addr),
            LocatorMode::ByPath => Locator::Path(path.to_string()),
        };
        if self.index.uuid_for(&locator).is_none() {
            self.index.insert(ObjectUuid::new(), kind, locator);
            self.assigned += 1;
        }
    }
}

/// Depth-first walk over every object reachable by hard links from the
/// root, registering those not yet indexed. Each object is visited once even
/// when several hard links reach it; its first path in name order is the one
/// recorded. Returns the number of UUIDs assigned.
pub fn backfill(doc: &ContainerDocument, index: &mut ObjectIndex, mode: LocatorMode) -> usize {
    let mut state = Backfill {
        index,
        mode,
        visited: HashSet::new(),
        assigned: 0,
    };
    state.visited.insert(doc.root());

    let mut stack = vec![(doc.root(), String::from("/"))];
    while let Some((addr, path)) = stack.pop() {
        let Some(links) = doc.get(addr).and_then(|obj| obj.links()) else {
            continue;
        };
        let mut children = Vec::new();
        for (name, link) in links {
            let StoredLink::Hard(child) = link else {
                continue;
            };
            if !state.visited.insert(*child) {
                continue;
            }
            let Some(obj) = doc.get(*child) else {
                continue;
            };
            let child_path = names::join(&path, name);
            state.visit(*child, &child_path, obj.kind());
            if obj.links().is_some() {
                children.push((*child, child_path));
            }
        }
        stack.extend(children.into_iter().rev());
    }

    if state.assigned > 0 {
        debug!(assigned = state.assigned, "index backfill");
    }
    state.assigned
}

/// Sidecar index file for a read-only container.
#[derive(Clone, Debug)]
pub struct Sidecar {
    path: PathBuf,
}

impl Sidecar {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The sidecar of `container`: same path with `extension` in place of
    /// the container's own extension.
    pub fn for_container(container: &Path, extension: &str) -> Self {
        let ext = extension.trim_start_matches('.');
        Self::new(container.with_extension(ext))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> StoreResult<Option<ObjectIndex>> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::CorruptIndex(format!("{}: {e}", self.path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, index: &ObjectIndex) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(index)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;
        info!(path = %self.path.display(), objects = index.reverse.len(), "sidecar index written");
        Ok(())
    }

    /// Delete the sidecar. Returns `false` if it did not exist.
    pub fn remove(&self) -> StoreResult<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
