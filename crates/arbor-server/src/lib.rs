//! Domain service for Arbor.
//!
//! Everything a transport needs to serve containers by domain name:
//! configuration, caller identity, per-operation ACL checks, the domain
//! lifecycle, and the background loop that keeps TOCs current. The wire
//! transport itself lives outside this crate.
//!
//! # Key Types
//!
//! - [`DomainService`]: Authorized operations over domains and their objects
//! - [`ServiceConfig`]: TOML configuration with environment overrides
//! - [`Identity`]: The caller; anonymous or a known user
//! - [`MaintenanceHandle`]: Running TOC maintenance loop

pub mod auth;
pub mod config;
pub mod error;
pub mod maintenance;
pub mod response;
pub mod service;

pub use auth::{Authenticator, Credentials, DirectoryAuth, Identity};
pub use config::{AccessConfig, NewDomainPolicy, ServiceConfig, WatchConfig};
pub use error::{ServiceError, ServiceResult};
pub use maintenance::{run_maintenance, MaintenanceHandle};
pub use service::{DatasetRequest, DomainInfo, DomainService, LinkRequest, LinkSpec, ObjectRef};
