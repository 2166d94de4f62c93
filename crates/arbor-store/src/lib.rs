//! Object store for Arbor containers.
//!
//! Gives every group, dataset, and committed type inside a container a
//! stable UUID, resolves hard, soft, and external link graphs, and keeps a
//! per-object access-control table.
//!
//! # Key Types
//!
//! - [`ObjectStore`]: UUID index, links, attributes, values, and ACLs over one container
//! - [`Container`]: Backing storage trait ([`FileContainer`], [`InMemoryContainer`])
//! - [`ObjectIndex`]: Persisted UUID↔locator maps, embedded or in a [`Sidecar`]
//! - [`AclTable`]: Per-object ACL entries with fallback resolution
//! - [`Selection`]: Dataset region selection ([`Hyperslab`])

pub mod acl;
pub mod attributes;
pub mod container;
pub mod error;
pub mod file;
pub mod index;
pub mod memory;
pub mod names;
pub mod selection;
pub mod store;
pub mod values;

pub use acl::{Acl, AclSource, AclTable, EffectiveAcl, Permission};
pub use attributes::AttributeInfo;
pub use container::{Address, Container, ContainerDocument, ObjectBody, StoredLink};
pub use error::{StoreError, StoreResult};
pub use file::{is_container, FileContainer, OpenMode};
pub use index::{ObjectIndex, Sidecar};
pub use memory::InMemoryContainer;
pub use selection::{DimSlice, Hyperslab, PointSelection, SelectedRegion, Selection};
pub use store::{
    CollisionPolicy, LinkItem, LinkTarget, ObjectCounts, ObjectDetail, ObjectInfo, ObjectStore,
    StoreConfig,
};
