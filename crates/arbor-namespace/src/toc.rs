//! Table-of-contents containers.
//!
//! A TOC is an ordinary container whose groups mirror a directory tree and
//! whose external links point at the domains of the containers found in it.
//! The shared TOC covers the data root (minus the home subtree); each user
//! gets a TOC of their own home directory on first access.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use arbor_store::{
    is_container, Acl, FileContainer, LinkTarget, ObjectStore, OpenMode, StoreConfig, StoreError,
};
use arbor_types::{ObjectKind, ObjectUuid, UserId};

use crate::domain::{escape_label, NamespaceMapper};
use crate::error::{NamespaceError, NamespaceResult};
use crate::watch::{ChangeEvent, ChangeKind};

/// Link in a user's TOC pointing at the shared TOC.
pub const PUBLIC_LINK: &str = "public";

/// Outcome of building a TOC.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TocSummary {
    pub path: PathBuf,
    pub entries: usize,
    pub groups: usize,
    pub skipped: usize,
}

/// Creates and updates TOC containers.
pub struct TocManager {
    mapper: Arc<NamespaceMapper>,
    store_config: StoreConfig,
}

impl TocManager {
    pub fn new(mapper: Arc<NamespaceMapper>, store_config: StoreConfig) -> Self {
        Self { mapper, store_config }
    }

    pub fn mapper(&self) -> &NamespaceMapper {
        &self.mapper
    }

    fn open_store(&self, path: &Path) -> NamespaceResult<ObjectStore> {
        let container = FileContainer::open(path, OpenMode::ReadWrite)?;
        Ok(ObjectStore::open(Box::new(container), self.store_config.clone())?)
    }

    /// Build the TOC for `dir` by walking it. Fails with a conflict when
    /// the TOC already exists.
    pub fn create_toc_file(&self, dir: &Path) -> NamespaceResult<TocSummary> {
        if !dir.is_dir() {
            return Err(NamespaceError::DirectoryNotFound(dir.to_path_buf()));
        }
        let toc_path = dir.join(&self.mapper.config().toc_name);
        if toc_path.exists() {
            return Err(NamespaceError::TocExists(toc_path));
        }
        let base_domain = self.mapper.path_to_domain(dir)?;
        let shared = dir == self.mapper.config().data_root.as_path();
        let home = self.mapper.config().home_dir();

        let container = FileContainer::create(&toc_path)?;
        let mut store = ObjectStore::open(Box::new(container), self.store_config.clone())?;
        let mut builder = TocBuilder {
            groups: HashMap::new(),
            summary: TocSummary {
                path: toc_path.clone(),
                ..TocSummary::default()
            },
        };
        builder.groups.insert(PathBuf::new(), store.root_uuid());

        let walker = WalkDir::new(dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !(e.file_name().to_string_lossy().starts_with('.')
                        || (shared && e.path() == home.as_path()))
            });
        for entry in walker {
            let entry = entry.map_err(|e| NamespaceError::Io(e.into()))?;
            if entry.depth() == 0 || entry.path() == toc_path {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(dir)
                .map_err(|_| NamespaceError::OutsideDataRoot(entry.path().to_path_buf()))?;
            let parent_rel = relative.parent().unwrap_or(Path::new("")).to_path_buf();
            let name = entry.file_name().to_string_lossy().into_owned();

            if entry.path_is_symlink() && entry.path().is_dir() {
                let link_path = format!("/{}", relative.to_string_lossy());
                let parent = builder.group(&mut store, &parent_rel)?;
                store.create_external_link(&parent, &base_domain, &link_path, &escape_label(&name))?;
                builder.summary.entries += 1;
                continue;
            }
            if !entry.path().is_file() || !self.mapper.has_container_ext(entry.path()) {
                continue;
            }
            let Some(link) = self.entry_for(entry.path())? else {
                builder.summary.skipped += 1;
                continue;
            };
            let parent = builder.group(&mut store, &parent_rel)?;
            store.create_external_link(&parent, &link.domain, "/", &link.name)?;
            builder.summary.entries += 1;
        }
        store.close()?;
        info!(
            path = %toc_path.display(),
            entries = builder.summary.entries,
            groups = builder.summary.groups,
            skipped = builder.summary.skipped,
            "toc created"
        );
        Ok(builder.summary)
    }

    /// Link name and domain for a container file, or `None` (with a
    /// warning) when the file cannot be listed.
    fn entry_for(&self, file: &Path) -> NamespaceResult<Option<TocLink>> {
        if !is_container(file) {
            debug!(path = %file.display(), "not a container, skipped");
            return Ok(None);
        }
        let domain = self.mapper.path_to_domain(file)?;
        match self.mapper.domain_to_path(&domain) {
            Ok(back) if back == file => {}
            _ => {
                warn!(path = %file.display(), %domain, "domain does not map back to file, skipped");
                return Ok(None);
            }
        }
        let stem = file
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(self.mapper.config().container_ext.as_str()))
            .ok_or_else(|| NamespaceError::NonUtf8Path(file.to_path_buf()))?;
        Ok(Some(TocLink {
            name: escape_label(stem),
            domain,
        }))
    }

    /// TOC path and the directory chain from the TOC's directory down to
    /// `file`'s parent.
    fn placement(&self, file: &Path, domain: &str) -> NamespaceResult<(PathBuf, Vec<String>)> {
        let toc_path = self.mapper.toc_path_for_domain(domain)?;
        let toc_dir = toc_path.parent().unwrap_or(Path::new(""));
        let relative = file
            .parent()
            .and_then(|p| p.strip_prefix(toc_dir).ok())
            .ok_or_else(|| NamespaceError::OutsideDataRoot(file.to_path_buf()))?;
        let chain = relative
            .iter()
            .map(|c| {
                c.to_str()
                    .map(str::to_string)
                    .ok_or_else(|| NamespaceError::NonUtf8Path(file.to_path_buf()))
            })
            .collect::<NamespaceResult<Vec<_>>>()?;
        Ok((toc_path, chain))
    }

    /// Add the TOC entry for a container file. Returns `false` when the
    /// entry was already present or the file cannot be listed.
    pub fn add_entry(&self, file: &Path) -> NamespaceResult<bool> {
        let Some(link) = self.entry_for(file)? else {
            return Ok(false);
        };
        let (toc_path, chain) = self.placement(file, &link.domain)?;
        if !toc_path.exists() {
            // the new TOC picks the file up during its scan
            match self.mapper.home_user(&link.domain)? {
                Some(user) => self.ensure_user_toc(&user)?,
                None => self.ensure_shared_toc()?,
            };
            return Ok(true);
        }

        let mut store = self.open_store(&toc_path)?;
        let mut group = store.root_uuid();
        for name in &chain {
            group = match child_group(&store, &group, name)? {
                Some(child) => child,
                None => {
                    let child = store.create_group()?;
                    store.link(&group, &child, name)?;
                    child
                }
            };
        }
        let added = match store.get_link(&group, &link.name) {
            Ok(_) => false,
            Err(StoreError::LinkNotFound { .. }) => {
                store.create_external_link(&group, &link.domain, "/", &link.name)?;
                true
            }
            Err(e) => return Err(e.into()),
        };
        store.close()?;
        if added {
            info!(domain = %link.domain, toc = %toc_path.display(), "toc entry added");
        }
        Ok(added)
    }

    /// Remove the TOC entry for a container path. The file need not exist.
    /// Returns `false` when there was nothing to remove.
    pub fn remove_entry(&self, file: &Path) -> NamespaceResult<bool> {
        let domain = self.mapper.path_to_domain(file)?;
        let (toc_path, chain) = self.placement(file, &domain)?;
        if !toc_path.exists() {
            return Ok(false);
        }
        let Some(stem) = file
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(self.mapper.config().container_ext.as_str()))
        else {
            return Ok(false);
        };
        let name = escape_label(stem);

        let mut store = self.open_store(&toc_path)?;
        let mut group = store.root_uuid();
        for segment in &chain {
            match child_group(&store, &group, segment)? {
                Some(child) => group = child,
                None => return Ok(false),
            }
        }
        let removed = match store.unlink(&group, &name) {
            Ok(()) => true,
            Err(StoreError::LinkNotFound { .. }) => false,
            Err(e) => return Err(e.into()),
        };
        store.close()?;
        if removed {
            info!(%domain, toc = %toc_path.display(), "toc entry removed");
        }
        Ok(removed)
    }

    /// Apply one filesystem change. Files without the container extension
    /// and TOC files themselves are ignored.
    pub fn apply(&self, event: &ChangeEvent) -> NamespaceResult<bool> {
        if !self.mapper.has_container_ext(&event.path) || self.mapper.is_toc_path(&event.path) {
            return Ok(false);
        }
        match event.kind {
            ChangeKind::Added => self.add_entry(&event.path),
            ChangeKind::Removed => self.remove_entry(&event.path),
        }
    }

    /// Create the shared TOC if it does not exist yet.
    pub fn ensure_shared_toc(&self) -> NamespaceResult<PathBuf> {
        let path = self.mapper.shared_toc_path();
        if !path.exists() {
            self.create_toc_file(&self.mapper.config().data_root)?;
        }
        Ok(path)
    }

    /// Create a user's TOC on first access: the owner gets every
    /// permission, everyone else read access, and a `public` link points at
    /// the shared TOC.
    pub fn ensure_user_toc(&self, user: &str) -> NamespaceResult<PathBuf> {
        let record = self
            .mapper
            .users()
            .lookup(user)
            .ok_or_else(|| NamespaceError::UnknownUser(user.to_string()))?;
        let path = self.mapper.user_toc_path(user);
        if path.exists() {
            return Ok(path);
        }
        let dir = self.mapper.config().home_dir().join(user);
        fs::create_dir_all(&dir)?;
        match self.create_toc_file(&dir) {
            Ok(_) => {}
            // another request created it first
            Err(NamespaceError::TocExists(_)) => return Ok(path),
            Err(e) => return Err(e),
        }

        let mut store = self.open_store(&path)?;
        let root = store.root_uuid();
        store.set_acl(&root, Acl::allow_all(record.id))?;
        store.set_acl(&root, Acl::read_only(UserId::DEFAULT))?;
        store.create_external_link(&root, &self.mapper.config().domain_suffix, "/", PUBLIC_LINK)?;
        store.close()?;
        info!(user, path = %path.display(), "user toc created");
        Ok(path)
    }
}

impl std::fmt::Debug for TocManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TocManager")
            .field("data_root", &self.mapper.config().data_root)
            .finish()
    }
}

struct TocLink {
    name: String,
    domain: String,
}

/// Lazily created groups of a TOC being built, keyed by relative directory.
struct TocBuilder {
    groups: HashMap<PathBuf, ObjectUuid>,
    summary: TocSummary,
}

impl TocBuilder {
    fn group(&mut self, store: &mut ObjectStore, dir: &Path) -> NamespaceResult<ObjectUuid> {
        if let Some(id) = self.groups.get(dir) {
            return Ok(*id);
        }
        let parent_dir = dir.parent().unwrap_or(Path::new(""));
        let parent = self.group(store, parent_dir)?;
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| NamespaceError::NonUtf8Path(dir.to_path_buf()))?;
        let id = store.create_group()?;
        store.link(&parent, &id, name)?;
        self.groups.insert(dir.to_path_buf(), id);
        self.summary.groups += 1;
        Ok(id)
    }
}

/// The group hard-linked as `name` under `parent`, if any.
fn child_group(store: &ObjectStore, parent: &ObjectUuid, name: &str) -> NamespaceResult<Option<ObjectUuid>> {
    match store.get_link(parent, name) {
        Ok(item) => match item.target {
            LinkTarget::Hard { id, kind: ObjectKind::Group } => Ok(Some(id)),
            _ => Ok(None),
        },
        Err(StoreError::LinkNotFound { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
