//! Domain namespace for Arbor.
//!
//! Maps DNS-style domain names onto container files under a data root,
//! synthesizes table-of-contents containers that list those files as
//! external links, and keeps the TOCs current as files come and go.
//!
//! # Key Types
//!
//! - [`NamespaceMapper`]: Domain ↔ path mapping
//! - [`TocManager`]: TOC creation, incremental updates, per-user TOCs
//! - [`ChangeFeed`]: Source of filesystem changes ([`PollingFeed`])
//! - [`TocMaintainer`]: Queue that applies change events to TOCs
//! - [`UserDirectory`]: User name ↔ id lookup

pub mod config;
pub mod domain;
pub mod error;
pub mod toc;
pub mod users;
pub mod watch;

pub use config::NamespaceConfig;
pub use domain::{escape_label, unescape_label, NamespaceMapper};
pub use error::{NamespaceError, NamespaceResult};
pub use toc::{TocManager, TocSummary, PUBLIC_LINK};
pub use users::{InMemoryUserDirectory, UserDirectory, UserRecord};
pub use watch::{ChangeEvent, ChangeFeed, ChangeKind, PollingFeed, TocMaintainer};
