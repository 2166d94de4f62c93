//! The hierarchical container abstraction.
//!
//! A [`ContainerDocument`] is the raw object tree: objects keyed by
//! [`Address`], group link tables, attributes, and a few reserved metadata
//! slots. It knows nothing about UUIDs or ACLs; [`crate::ObjectStore`]
//! layers identity and authorization on top.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use arbor_codec::{Element, NdArray, TypeDescriptor};
use arbor_types::ObjectKind;

use crate::error::{StoreError, StoreResult};

/// Location of an object inside one container. Never reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub u64);

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A link as stored in a group's link table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoredLink {
    Hard(Address),
    Soft { path: String },
    External { domain: String, path: String },
}

/// A schema as stored: inline, or pointing at a datatype object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoredSchema {
    Inline(TypeDescriptor),
    Committed(Address),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredAttribute {
    pub schema: StoredSchema,
    pub value: NdArray,
    pub created: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetBody {
    pub schema: StoredSchema,
    pub shape: Vec<usize>,
    /// Per-dimension upper bound; `None` entries are unlimited.
    pub max_shape: Option<Vec<Option<usize>>>,
    /// Row-major values; `None` until the first write.
    pub values: Option<Vec<Element>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ObjectBody {
    Group { links: BTreeMap<String, StoredLink> },
    Dataset(DatasetBody),
    Datatype(TypeDescriptor),
}

impl ObjectBody {
    pub fn empty_group() -> Self {
        Self::Group { links: BTreeMap::new() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContainerObject {
    pub body: ObjectBody,
    pub attributes: BTreeMap<String, StoredAttribute>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl ContainerObject {
    pub fn new(body: ObjectBody) -> Self {
        let now = Utc::now();
        Self {
            body,
            attributes: BTreeMap::new(),
            created: now,
            modified: now,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self.body {
            ObjectBody::Group { .. } => ObjectKind::Group,
            ObjectBody::Dataset(_) => ObjectKind::Dataset,
            ObjectBody::Datatype(_) => ObjectKind::Datatype,
        }
    }

    pub fn links(&self) -> Option<&BTreeMap<String, StoredLink>> {
        match &self.body {
            ObjectBody::Group { links } => Some(links),
            _ => None,
        }
    }

    pub fn links_mut(&mut self) -> Option<&mut BTreeMap<String, StoredLink>> {
        match &mut self.body {
            ObjectBody::Group { links } => Some(links),
            _ => None,
        }
    }

    pub fn touch(&mut self) {
        self.modified = Utc::now();
    }
}

/// The raw object tree of one container.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContainerDocument {
    next_address: u64,
    root: Address,
    objects: BTreeMap<Address, ContainerObject>,
    metadata: BTreeMap<String, Vec<u8>>,
}

impl ContainerDocument {
    /// A document holding only an empty root group.
    pub fn new() -> Self {
        let root = Address(1);
        let mut objects = BTreeMap::new();
        objects.insert(root, ContainerObject::new(ObjectBody::empty_group()));
        Self {
            next_address: 2,
            root,
            objects,
            metadata: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> Address {
        self.root
    }

    pub fn get(&self, addr: Address) -> Option<&ContainerObject> {
        self.objects.get(&addr)
    }

    pub fn get_mut(&mut self, addr: Address) -> Option<&mut ContainerObject> {
        self.objects.get_mut(&addr)
    }

    /// Store a new object at a fresh address.
    pub fn insert(&mut self, body: ObjectBody) -> Address {
        let addr = Address(self.next_address);
        self.next_address += 1;
        self.objects.insert(addr, ContainerObject::new(body));
        addr
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Mutable iteration over every group's link table.
    pub fn link_tables_mut(
        &mut self,
    ) -> impl Iterator<Item = (Address, &mut BTreeMap<String, StoredLink>)> + '_ {
        self.objects
            .iter_mut()
            .filter_map(|(addr, obj)| obj.links_mut().map(|links| (*addr, links)))
    }

    pub fn metadata(&self, key: &str) -> Option<&[u8]> {
        self.metadata.get(key).map(Vec::as_slice)
    }

    pub fn set_metadata(&mut self, key: &str, value: Vec<u8>) {
        self.metadata.insert(key.to_string(), value);
    }

    pub fn remove_metadata(&mut self, key: &str) -> bool {
        self.metadata.remove(key).is_some()
    }
}

impl Default for ContainerDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// Backing storage for one container.
///
/// Implementations hand out the document for reading at any time, and for
/// writing only when opened read-write. A container is used by one request
/// at a time; `flush` makes the current document durable.
pub trait Container: Send {
    fn document(&self) -> &ContainerDocument;

    /// Mutable access. Fails with [`StoreError::ReadOnly`] on read-only
    /// containers.
    fn document_mut(&mut self) -> StoreResult<&mut ContainerDocument>;

    fn is_read_only(&self) -> bool;

    /// Persist the document. A no-op for read-only and in-memory backends.
    fn flush(&mut self) -> StoreResult<()>;

    /// Filesystem location, if the container is file-backed.
    fn location(&self) -> Option<&Path> {
        None
    }
}

pub(crate) fn read_only_guard(read_only: bool) -> StoreResult<()> {
    if read_only {
        Err(StoreError::ReadOnly)
    } else {
        Ok(())
    }
}
