//! Foundation types for Arbor.
//!
//! This crate provides the identity and classification types shared by every
//! other Arbor crate, plus the fixed error taxonomy each layer maps onto.
//!
//! # Key Types
//!
//! - [`ObjectUuid`]: Persistent identifier of a group, dataset, or datatype
//! - [`UserId`]: Numeric user identity; `0` is the default ACL entry
//! - [`ObjectKind`]: Closed tag for the three object kinds
//! - [`ErrorKind`]: Failure taxonomy shared by all layers

pub mod error;
pub mod id;
pub mod kind;

pub use error::{ErrorKind, TypeError};
pub use id::{ObjectUuid, UserId};
pub use kind::ObjectKind;
