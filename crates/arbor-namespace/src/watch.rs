//! Filesystem change notification feeding TOC maintenance.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::NamespaceConfig;
use crate::error::{NamespaceError, NamespaceResult};
use crate::toc::TocManager;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Removed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

impl ChangeEvent {
    pub fn added(path: impl Into<PathBuf>) -> Self {
        Self { kind: ChangeKind::Added, path: path.into() }
    }

    pub fn removed(path: impl Into<PathBuf>) -> Self {
        Self { kind: ChangeKind::Removed, path: path.into() }
    }
}

/// Source of container additions and removals under the data root.
#[async_trait]
pub trait ChangeFeed: Send {
    async fn poll(&mut self) -> NamespaceResult<Vec<ChangeEvent>>;
}

/// Detects changes by diffing successive directory scans.
pub struct PollingFeed {
    root: PathBuf,
    container_ext: String,
    known: BTreeSet<PathBuf>,
}

impl PollingFeed {
    /// A feed with an empty baseline: the first poll reports every
    /// container present as added.
    pub fn new(config: &NamespaceConfig) -> Self {
        Self {
            root: config.data_root.clone(),
            container_ext: config.container_ext.clone(),
            known: BTreeSet::new(),
        }
    }

    /// Take the current tree as the baseline without reporting it.
    pub async fn prime(&mut self) -> NamespaceResult<usize> {
        self.known = self.scan().await?;
        Ok(self.known.len())
    }

    async fn scan(&self) -> NamespaceResult<BTreeSet<PathBuf>> {
        let root = self.root.clone();
        let ext = self.container_ext.clone();
        tokio::task::spawn_blocking(move || snapshot(&root, &ext))
            .await
            .map_err(|e| NamespaceError::Io(std::io::Error::other(e)))?
    }
}

#[async_trait]
impl ChangeFeed for PollingFeed {
    async fn poll(&mut self) -> NamespaceResult<Vec<ChangeEvent>> {
        let current = self.scan().await?;
        let mut events: Vec<ChangeEvent> = current
            .difference(&self.known)
            .map(ChangeEvent::added)
            .collect();
        events.extend(self.known.difference(&current).map(ChangeEvent::removed));
        self.known = current;
        if !events.is_empty() {
            debug!(count = events.len(), "filesystem changes detected");
        }
        Ok(events)
    }
}

impl std::fmt::Debug for PollingFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingFeed")
            .field("root", &self.root)
            .field("known", &self.known.len())
            .finish()
    }
}

/// Container files under `root`, skipping hidden entries (TOCs included).
fn snapshot(root: &Path, ext: &str) -> NamespaceResult<BTreeSet<PathBuf>> {
    let mut found = BTreeSet::new();
    if !root.is_dir() {
        return Ok(found);
    }
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
    for entry in walker {
        let entry = entry.map_err(|e| NamespaceError::Io(e.into()))?;
        if entry.file_type().is_file()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.len() > ext.len() && n.ends_with(ext))
        {
            found.insert(entry.into_path());
        }
    }
    Ok(found)
}

/// Queues change events and applies them to the TOCs in batches.
pub struct TocMaintainer {
    toc: Arc<TocManager>,
    tx: mpsc::UnboundedSender<ChangeEvent>,
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl TocMaintainer {
    pub fn new(toc: Arc<TocManager>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { toc, tx, rx }
    }

    /// Handle for producers of change events.
    pub fn sender(&self) -> mpsc::UnboundedSender<ChangeEvent> {
        self.tx.clone()
    }

    pub fn toc(&self) -> &Arc<TocManager> {
        &self.toc
    }

    /// Apply every queued event. Failures are logged and skipped; returns
    /// the number of TOC entries that changed.
    pub async fn drain(&mut self) -> usize {
        let mut batch = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            batch.push(event);
        }
        if batch.is_empty() {
            return 0;
        }
        let toc = Arc::clone(&self.toc);
        let applied = tokio::task::spawn_blocking(move || {
            let mut changed = 0;
            for event in &batch {
                match toc.apply(event) {
                    Ok(true) => changed += 1,
                    Ok(false) => {}
                    Err(e) => warn!(path = %event.path.display(), error = %e, "toc update failed"),
                }
            }
            changed
        })
        .await;
        match applied {
            Ok(changed) => changed,
            Err(e) => {
                warn!(error = %e, "toc update task failed");
                0
            }
        }
    }

    /// Poll `feed` once and apply what it reports.
    pub async fn sync_from(&mut self, feed: &mut dyn ChangeFeed) -> NamespaceResult<usize> {
        for event in feed.poll().await? {
            // the receiver lives in self, so the channel cannot be closed
            let _ = self.tx.send(event);
        }
        Ok(self.drain().await)
    }
}

impl std::fmt::Debug for TocMaintainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TocMaintainer")
            .field("toc", &self.toc)
            .finish()
    }
}
