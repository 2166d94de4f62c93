//! The domain service: every operation a transport exposes, with
//! authorization, over containers opened per call.
//!
//! Each call opens the domain's container, checks the caller's effective
//! ACL for the one permission the operation needs, performs the operation,
//! and flushes before returning. Nothing is held open between calls.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};

use arbor_codec::{decode, decode_value, encode_value, Schema};
use arbor_namespace::{
    InMemoryUserDirectory, NamespaceError, NamespaceMapper, TocManager, UserDirectory,
};
use arbor_store::{
    Acl, AttributeInfo, EffectiveAcl, FileContainer, LinkItem, ObjectCounts,
    ObjectDetail, ObjectInfo, ObjectStore, OpenMode, Permission, Selection, Sidecar, StoreError,
};
use arbor_types::{ObjectKind, ObjectUuid, UserId};

use crate::auth::Identity;
use crate::config::{NewDomainPolicy, ServiceConfig};
use crate::error::{ServiceError, ServiceResult};

/// An object named by UUID or by path from the root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectRef {
    Id(ObjectUuid),
    Path(String),
}

impl From<ObjectUuid> for ObjectRef {
    fn from(id: ObjectUuid) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for ObjectRef {
    fn from(path: &str) -> Self {
        Self::Path(path.to_string())
    }
}

/// Where to hard-link a newly created object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkRequest {
    pub parent: ObjectUuid,
    pub name: String,
}

impl LinkRequest {
    pub fn new(parent: ObjectUuid, name: impl Into<String>) -> Self {
        Self { parent, name: name.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkSpec {
    Hard(ObjectUuid),
    Soft(String),
    External { domain: String, path: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct DatasetRequest {
    /// Wire schema, or a `datatypes/<uuid>` reference to a committed type.
    pub type_spec: Value,
    pub shape: Vec<usize>,
    pub max_shape: Option<Vec<Option<usize>>>,
    pub link: Option<LinkRequest>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainInfo {
    pub domain: String,
    pub root: ObjectUuid,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub counts: ObjectCounts,
    pub read_only: bool,
    pub is_toc: bool,
}

struct Opened {
    path: PathBuf,
    store: ObjectStore,
    is_toc: bool,
}

pub struct DomainService {
    config: ServiceConfig,
    mapper: Arc<NamespaceMapper>,
    toc: Arc<TocManager>,
}

impl DomainService {
    pub fn new(config: ServiceConfig, users: Arc<dyn UserDirectory>) -> Self {
        let mapper = Arc::new(NamespaceMapper::new(config.namespace.clone(), users));
        let toc = Arc::new(TocManager::new(Arc::clone(&mapper), config.store.clone()));
        Self { config, mapper, toc }
    }

    /// Build a service, loading the user table named in the access section.
    pub fn from_config(config: ServiceConfig) -> ServiceResult<Self> {
        let users = match &config.access.users_file {
            Some(path) => InMemoryUserDirectory::load(path)?,
            None => InMemoryUserDirectory::new(),
        };
        Ok(Self::new(config, Arc::new(users)))
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn mapper(&self) -> &Arc<NamespaceMapper> {
        &self.mapper
    }

    pub fn toc(&self) -> &Arc<TocManager> {
        &self.toc
    }

    // ---- plumbing ----

    fn check_caller(&self, identity: &Identity) -> ServiceResult<()> {
        if identity.is_anonymous() && !self.config.access.allow_anonymous {
            return Err(ServiceError::PermissionDenied("anonymous access is disabled".into()));
        }
        Ok(())
    }

    /// Open the container behind `domain`, creating TOCs on first access.
    fn open(&self, domain: &str, identity: &Identity) -> ServiceResult<Opened> {
        self.check_caller(identity)?;
        let path = self.mapper.domain_to_path(domain)?;
        let is_toc = self.mapper.is_toc_path(&path);
        if is_toc {
            match self.mapper.home_user(domain)? {
                Some(user) => self.toc.ensure_user_toc(&user)?,
                None => self.toc.ensure_shared_toc()?,
            };
        }
        let container = FileContainer::open(&path, OpenMode::Auto)?;
        let mut store = ObjectStore::open(Box::new(container), self.config.store.clone())?;
        if !store.is_read_only() {
            // keep UUIDs minted for a previously unindexed container
            store.flush()?;
        }
        Ok(Opened { path, store, is_toc })
    }

    fn resolve(store: &ObjectStore, target: &ObjectRef) -> ServiceResult<ObjectUuid> {
        match target {
            ObjectRef::Id(id) => {
                store.object(id)?;
                Ok(*id)
            }
            ObjectRef::Path(path) => Ok(store.resolve_path(path)?),
        }
    }

    fn authorize(
        store: &ObjectStore,
        id: &ObjectUuid,
        identity: &Identity,
        permission: Permission,
    ) -> ServiceResult<()> {
        Ok(store.authorize(id, identity.user, permission)?)
    }

    fn forbid_toc_links(opened: &Opened, domain: &str) -> ServiceResult<()> {
        if opened.is_toc {
            return Err(ServiceError::Forbidden(format!(
                "links in the table of contents {domain} are maintained by the service"
            )));
        }
        Ok(())
    }

    /// Turn a request type into a schema. Strings containing `/` are
    /// references to committed types in the same container.
    fn resolve_schema(store: &ObjectStore, spec: &Value) -> ServiceResult<Schema> {
        if let Value::String(s) = spec {
            if s.contains('/') {
                let (kind, id) = ObjectKind::parse_reference(s)?;
                if kind != ObjectKind::Datatype {
                    return Err(ServiceError::BadRequest(format!("{s} is not a datatype reference")));
                }
                return match store.object(&id)?.detail {
                    ObjectDetail::Datatype { descriptor } => Ok(Schema::Committed { id, descriptor }),
                    _ => Err(ServiceError::BadRequest(format!("{s} is not a datatype"))),
                };
            }
        }
        Ok(Schema::Inline(decode(spec)?))
    }

    fn dataset_layout(store: &ObjectStore, id: &ObjectUuid) -> ServiceResult<(Schema, Vec<usize>)> {
        let info = store.object(id)?;
        match info.detail {
            ObjectDetail::Dataset { schema, shape, .. } => Ok((schema, shape)),
            _ => Err(StoreError::WrongKind {
                id: *id,
                expected: ObjectKind::Dataset,
                found: info.kind,
            }
            .into()),
        }
    }

    fn domain_info(domain: &str, opened: &Opened) -> ServiceResult<DomainInfo> {
        let root = opened.store.root_uuid();
        let info = opened.store.object(&root)?;
        Ok(DomainInfo {
            domain: domain.to_string(),
            root,
            created: info.created,
            modified: info.modified,
            counts: opened.store.counts(),
            read_only: opened.store.is_read_only(),
            is_toc: opened.is_toc,
        })
    }

    fn user_id(&self, name: &str) -> ServiceResult<UserId> {
        self.mapper
            .users()
            .lookup(name)
            .map(|r| r.id)
            .ok_or_else(|| NamespaceError::UnknownUser(name.to_string()).into())
    }

    // ---- domains ----

    /// Create an empty container for `domain` and list it in its TOC.
    pub fn create_domain(&self, domain: &str, identity: &Identity) -> ServiceResult<DomainInfo> {
        self.check_caller(identity)?;
        match self.config.access.new_domain_policy {
            NewDomainPolicy::None => {
                return Err(ServiceError::PermissionDenied("domain creation is disabled".into()))
            }
            NewDomainPolicy::Authenticated if identity.is_anonymous() => {
                return Err(ServiceError::PermissionDenied(
                    "anonymous callers may not create domains".into(),
                ))
            }
            _ => {}
        }
        let path = self.mapper.domain_to_path(domain)?;
        if self.mapper.is_toc_path(&path) {
            return Err(ServiceError::Forbidden(format!("{domain} is a table of contents")));
        }
        match path.parent() {
            Some(dir) if dir.is_dir() => {}
            _ => return Err(ServiceError::NotFound(format!("parent directory of {}", path.display()))),
        }

        let container = FileContainer::create(&path)?;
        let mut store = ObjectStore::open(Box::new(container), self.config.store.clone())?;
        let root = store.root_uuid();
        if let Some(owner) = identity.user {
            store.set_acl(&root, Acl::allow_all(owner))?;
            store.set_acl(&root, Acl::read_only(UserId::DEFAULT))?;
        }
        store.flush()?;
        let opened = Opened { path, store, is_toc: false };
        let info = Self::domain_info(domain, &opened)?;
        opened.store.close()?;

        if let Err(e) = self.toc.add_entry(&opened.path) {
            warn!(domain, error = %e, "could not list new domain in toc");
        }
        info!(domain, path = %opened.path.display(), owner = %identity.name, "domain created");
        Ok(info)
    }

    pub fn get_domain(&self, domain: &str, identity: &Identity) -> ServiceResult<DomainInfo> {
        let opened = self.open(domain, identity)?;
        Self::authorize(&opened.store, &opened.store.root_uuid(), identity, Permission::Read)?;
        Self::domain_info(domain, &opened)
    }

    /// Remove the container, its sidecar, and its TOC entry.
    pub fn delete_domain(&self, domain: &str, identity: &Identity) -> ServiceResult<()> {
        let path = self.mapper.domain_to_path(domain)?;
        if self.mapper.is_toc_path(&path) {
            return Err(ServiceError::Forbidden(format!("{domain} is a table of contents")));
        }
        let opened = self.open(domain, identity)?;
        Self::authorize(&opened.store, &opened.store.root_uuid(), identity, Permission::Delete)?;
        drop(opened);

        fs::remove_file(&path)?;
        Sidecar::for_container(&path, &self.config.store.sidecar_ext).remove()?;
        if let Err(e) = self.toc.remove_entry(&path) {
            warn!(domain, error = %e, "could not remove toc entry");
        }
        info!(domain, user = %identity.name, "domain deleted");
        Ok(())
    }

    // ---- objects ----

    fn finish_create(
        mut opened: Opened,
        id: ObjectUuid,
        link: Option<&LinkRequest>,
    ) -> ServiceResult<ObjectInfo> {
        if let Some(link) = link {
            opened.store.link(&link.parent, &id, &link.name)?;
        }
        let info = opened.store.object(&id)?;
        opened.store.close()?;
        Ok(info)
    }

    fn open_for_create(
        &self,
        domain: &str,
        identity: &Identity,
        link: Option<&LinkRequest>,
    ) -> ServiceResult<Opened> {
        let opened = self.open(domain, identity)?;
        if link.is_some() {
            Self::forbid_toc_links(&opened, domain)?;
        }
        Self::authorize(&opened.store, &opened.store.root_uuid(), identity, Permission::Create)?;
        Ok(opened)
    }

    pub fn create_group(
        &self,
        domain: &str,
        identity: &Identity,
        link: Option<&LinkRequest>,
    ) -> ServiceResult<ObjectInfo> {
        let mut opened = self.open_for_create(domain, identity, link)?;
        let id = opened.store.create_group()?;
        Self::finish_create(opened, id, link)
    }

    pub fn create_dataset(
        &self,
        domain: &str,
        identity: &Identity,
        request: &DatasetRequest,
    ) -> ServiceResult<ObjectInfo> {
        let mut opened = self.open_for_create(domain, identity, request.link.as_ref())?;
        let schema = Self::resolve_schema(&opened.store, &request.type_spec)?;
        let id = opened.store.create_dataset(
            &schema,
            request.shape.clone(),
            request.max_shape.clone(),
        )?;
        Self::finish_create(opened, id, request.link.as_ref())
    }

    pub fn create_datatype(
        &self,
        domain: &str,
        identity: &Identity,
        type_spec: &Value,
        link: Option<&LinkRequest>,
    ) -> ServiceResult<ObjectInfo> {
        let mut opened = self.open_for_create(domain, identity, link)?;
        let schema = Self::resolve_schema(&opened.store, type_spec)?;
        let id = opened.store.create_committed_type(schema.descriptor())?;
        Self::finish_create(opened, id, link)
    }

    pub fn get_object(
        &self,
        domain: &str,
        identity: &Identity,
        target: &ObjectRef,
    ) -> ServiceResult<ObjectInfo> {
        let opened = self.open(domain, identity)?;
        let id = Self::resolve(&opened.store, target)?;
        Self::authorize(&opened.store, &id, identity, Permission::Read)?;
        Ok(opened.store.object(&id)?)
    }

    pub fn delete_object(&self, domain: &str, identity: &Identity, target: &ObjectRef) -> ServiceResult<()> {
        let mut opened = self.open(domain, identity)?;
        let id = Self::resolve(&opened.store, target)?;
        Self::authorize(&opened.store, &id, identity, Permission::Delete)?;
        opened.store.delete_object(&id)?;
        opened.store.close()?;
        Ok(())
    }

    pub fn list_objects(
        &self,
        domain: &str,
        identity: &Identity,
        kind: ObjectKind,
        marker: Option<&ObjectUuid>,
        limit: Option<usize>,
    ) -> ServiceResult<Vec<ObjectUuid>> {
        let opened = self.open(domain, identity)?;
        Self::authorize(&opened.store, &opened.store.root_uuid(), identity, Permission::Read)?;
        Ok(opened.store.list_objects(kind, marker, limit))
    }

    // ---- links ----

    pub fn put_link(
        &self,
        domain: &str,
        identity: &Identity,
        parent: &ObjectUuid,
        name: &str,
        spec: &LinkSpec,
    ) -> ServiceResult<()> {
        let mut opened = self.open(domain, identity)?;
        Self::forbid_toc_links(&opened, domain)?;
        Self::authorize(&opened.store, parent, identity, Permission::Create)?;
        match spec {
            LinkSpec::Hard(target) => opened.store.link(parent, target, name)?,
            LinkSpec::Soft(path) => opened.store.create_soft_link(parent, path, name)?,
            LinkSpec::External { domain, path } => {
                opened.store.create_external_link(parent, domain, path, name)?
            }
        }
        opened.store.close()?;
        Ok(())
    }

    pub fn get_link(
        &self,
        domain: &str,
        identity: &Identity,
        parent: &ObjectUuid,
        name: &str,
    ) -> ServiceResult<LinkItem> {
        let opened = self.open(domain, identity)?;
        Self::authorize(&opened.store, parent, identity, Permission::Read)?;
        Ok(opened.store.get_link(parent, name)?)
    }

    pub fn list_links(
        &self,
        domain: &str,
        identity: &Identity,
        parent: &ObjectUuid,
        marker: Option<&str>,
        limit: Option<usize>,
    ) -> ServiceResult<Vec<LinkItem>> {
        let opened = self.open(domain, identity)?;
        Self::authorize(&opened.store, parent, identity, Permission::Read)?;
        Ok(opened.store.list_links(parent, marker, limit)?)
    }

    pub fn delete_link(
        &self,
        domain: &str,
        identity: &Identity,
        parent: &ObjectUuid,
        name: &str,
    ) -> ServiceResult<()> {
        let mut opened = self.open(domain, identity)?;
        Self::forbid_toc_links(&opened, domain)?;
        Self::authorize(&opened.store, parent, identity, Permission::Delete)?;
        opened.store.unlink(parent, name)?;
        opened.store.close()?;
        Ok(())
    }

    // ---- attributes ----

    #[allow(clippy::too_many_arguments)]
    pub fn put_attribute(
        &self,
        domain: &str,
        identity: &Identity,
        object: &ObjectUuid,
        name: &str,
        type_spec: &Value,
        shape: &[usize],
        literal: &Value,
    ) -> ServiceResult<()> {
        let mut opened = self.open(domain, identity)?;
        Self::authorize(&opened.store, object, identity, Permission::Create)?;
        let schema = Self::resolve_schema(&opened.store, type_spec)?;
        let value = decode_value(schema.descriptor(), shape, literal)?;
        opened.store.put_attribute(object, name, &schema, value)?;
        opened.store.close()?;
        Ok(())
    }

    pub fn get_attribute(
        &self,
        domain: &str,
        identity: &Identity,
        object: &ObjectUuid,
        name: &str,
    ) -> ServiceResult<AttributeInfo> {
        let opened = self.open(domain, identity)?;
        Self::authorize(&opened.store, object, identity, Permission::Read)?;
        Ok(opened.store.attribute(object, name)?)
    }

    pub fn list_attributes(
        &self,
        domain: &str,
        identity: &Identity,
        object: &ObjectUuid,
        marker: Option<&str>,
        limit: Option<usize>,
    ) -> ServiceResult<Vec<AttributeInfo>> {
        let opened = self.open(domain, identity)?;
        Self::authorize(&opened.store, object, identity, Permission::Read)?;
        Ok(opened.store.list_attributes(object, marker, limit)?)
    }

    pub fn delete_attribute(
        &self,
        domain: &str,
        identity: &Identity,
        object: &ObjectUuid,
        name: &str,
    ) -> ServiceResult<()> {
        let mut opened = self.open(domain, identity)?;
        Self::authorize(&opened.store, object, identity, Permission::Delete)?;
        opened.store.delete_attribute(object, name)?;
        opened.store.close()?;
        Ok(())
    }

    // ---- dataset values ----

    /// The selected values as a wire literal.
    pub fn read_values(
        &self,
        domain: &str,
        identity: &Identity,
        id: &ObjectUuid,
        selection: Option<&dyn Selection>,
    ) -> ServiceResult<Value> {
        let opened = self.open(domain, identity)?;
        Self::authorize(&opened.store, id, identity, Permission::Read)?;
        let (schema, _) = Self::dataset_layout(&opened.store, id)?;
        let values = opened
            .store
            .read_values(id, selection)?;
        Ok(encode_value(schema.descriptor(), &values)?)
    }

    pub fn write_values(
        &self,
        domain: &str,
        identity: &Identity,
        id: &ObjectUuid,
        literal: &Value,
        selection: Option<&dyn Selection>,
    ) -> ServiceResult<()> {
        let mut opened = self.open(domain, identity)?;
        Self::authorize(&opened.store, id, identity, Permission::Update)?;
        let (schema, shape) = Self::dataset_layout(&opened.store, id)?;
        let region = match selection {
            Some(s) => s.resolve(&shape)?.shape,
            None => shape,
        };
        let values = decode_value(schema.descriptor(), &region, literal)?;
        opened
            .store
            .write_values(id, values, selection)?;
        opened.store.close()?;
        Ok(())
    }

    pub fn resize_dataset(
        &self,
        domain: &str,
        identity: &Identity,
        id: &ObjectUuid,
        shape: Vec<usize>,
    ) -> ServiceResult<()> {
        let mut opened = self.open(domain, identity)?;
        Self::authorize(&opened.store, id, identity, Permission::Update)?;
        opened.store.resize_dataset(id, shape)?;
        opened.store.close()?;
        Ok(())
    }

    // ---- access control ----

    /// Effective ACL of `user` (by name) on `id`; the caller's own when
    /// `user` is `None`.
    pub fn get_acl(
        &self,
        domain: &str,
        identity: &Identity,
        id: &ObjectUuid,
        user: Option<&str>,
    ) -> ServiceResult<EffectiveAcl> {
        let opened = self.open(domain, identity)?;
        Self::authorize(&opened.store, id, identity, Permission::ReadAcl)?;
        let uid = match user {
            Some(name) => self.user_id(name)?,
            None => identity.user.unwrap_or(UserId::DEFAULT),
        };
        Ok(opened.store.get_acl(id, uid)?)
    }

    pub fn list_acls(&self, domain: &str, identity: &Identity, id: &ObjectUuid) -> ServiceResult<Vec<Acl>> {
        let opened = self.open(domain, identity)?;
        Self::authorize(&opened.store, id, identity, Permission::ReadAcl)?;
        Ok(opened.store.acls(id)?)
    }

    pub fn set_acl(&self, domain: &str, identity: &Identity, id: &ObjectUuid, acl: Acl) -> ServiceResult<()> {
        let mut opened = self.open(domain, identity)?;
        Self::authorize(&opened.store, id, identity, Permission::UpdateAcl)?;
        opened.store.set_acl(id, acl)?;
        opened.store.close()?;
        Ok(())
    }
}

impl std::fmt::Debug for DomainService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainService")
            .field("data_root", &self.config.namespace.data_root)
            .field("domain_suffix", &self.config.namespace.domain_suffix)
            .finish()
    }
}
