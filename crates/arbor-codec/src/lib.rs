//! Type codec for Arbor.
//!
//! Translates between native [`TypeDescriptor`]s and the JSON wire schema
//! exchanged with clients, and between native element blocks and wire value
//! literals. The crate is pure and stateless.
//!
//! # Key Types
//!
//! - [`TypeDescriptor`]: Closed sum type, one variant per type class
//! - [`Schema`]: Inline descriptor or committed datatype reference
//! - [`Element`] / [`NdArray`]: Native values shaped by a dataspace
//!
//! # Entry Points
//!
//! - [`encode`] / [`decode`]: verbose wire schema round trip
//! - [`shape_schema`]: two-tier response form
//! - [`encode_value`] / [`decode_value`]: literal values

pub mod descriptor;
pub mod error;
pub mod shaping;
pub mod value;
pub mod wire;

pub use descriptor::{
    ArrayType, ByteOrder, Charset, CompoundField, EnumType, FloatType, IntegerType,
    ReferenceKind, StringLength, StringType, TypeDescriptor,
};
pub use error::{CodecError, CodecResult};
pub use shaping::{describe_verbose, shape_schema, shape_type, Schema};
pub use value::{
    decode_value, element_count, encode_value, fill_value, object_ref, Element, NdArray,
};
pub use wire::{decode, encode, VARIABLE};
