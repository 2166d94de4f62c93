//! Native type descriptors.
//!
//! [`TypeDescriptor`] is a closed sum type with one variant per type class.
//! Everything the wire codec and the value codec do is an exhaustive match
//! over it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Byte order of a numeric type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub(crate) fn suffix(&self) -> &'static str {
        match self {
            Self::Little => "LE",
            Self::Big => "BE",
        }
    }

    /// Wire tag (`H5T_ORDER_LE` / `H5T_ORDER_BE`).
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Little => "H5T_ORDER_LE",
            Self::Big => "H5T_ORDER_BE",
        }
    }
}

/// Fixed-width integer type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntegerType {
    bits: u8,
    signed: bool,
    order: ByteOrder,
}

impl IntegerType {
    const WIDTHS: [u8; 4] = [8, 16, 32, 64];

    /// Construct an integer type; `bits` must be 8, 16, 32, or 64.
    pub fn new(bits: u8, signed: bool, order: ByteOrder) -> Option<Self> {
        Self::WIDTHS
            .contains(&bits)
            .then_some(Self { bits, signed, order })
    }

    /// Little-endian signed integer of the given width.
    pub fn signed(bits: u8) -> Option<Self> {
        Self::new(bits, true, ByteOrder::Little)
    }

    /// Little-endian unsigned integer of the given width.
    pub fn unsigned(bits: u8) -> Option<Self> {
        Self::new(bits, false, ByteOrder::Little)
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn size(&self) -> usize {
        usize::from(self.bits / 8)
    }

    /// Predefined base name, e.g. `H5T_STD_I32LE`.
    pub fn base_name(&self) -> String {
        let sign = if self.signed { 'I' } else { 'U' };
        format!("H5T_STD_{sign}{}{}", self.bits, self.order.suffix())
    }

    /// Parse a predefined integer base name.
    pub fn parse_base(name: &str) -> Option<Self> {
        let rest = name.strip_prefix("H5T_STD_")?;
        let signed = match rest.chars().next()? {
            'I' => true,
            'U' => false,
            _ => return None,
        };
        let (width, order) = split_order(&rest[1..])?;
        let bits = match width {
            "8" => 8,
            "16" => 16,
            "32" => 32,
            "64" => 64,
            _ => return None,
        };
        Self::new(bits, signed, order)
    }

    /// Inclusive value range representable by this type.
    pub fn range(&self) -> (i128, i128) {
        let bits = u32::from(self.bits);
        if self.signed {
            (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
        } else {
            (0, (1i128 << bits) - 1)
        }
    }

    pub fn contains(&self, value: i128) -> bool {
        let (lo, hi) = self.range();
        (lo..=hi).contains(&value)
    }
}

/// IEEE floating point type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FloatType {
    bits: u8,
    order: ByteOrder,
}

impl FloatType {
    /// Construct a float type; `bits` must be 32 or 64.
    pub fn new(bits: u8, order: ByteOrder) -> Option<Self> {
        matches!(bits, 32 | 64).then_some(Self { bits, order })
    }

    pub fn f32() -> Self {
        Self { bits: 32, order: ByteOrder::Little }
    }

    pub fn f64() -> Self {
        Self { bits: 64, order: ByteOrder::Little }
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn size(&self) -> usize {
        usize::from(self.bits / 8)
    }

    /// Predefined base name, e.g. `H5T_IEEE_F64LE`.
    pub fn base_name(&self) -> String {
        format!("H5T_IEEE_F{}{}", self.bits, self.order.suffix())
    }

    pub fn parse_base(name: &str) -> Option<Self> {
        let (width, order) = split_order(name.strip_prefix("H5T_IEEE_F")?)?;
        match width {
            "32" => Self::new(32, order),
            "64" => Self::new(64, order),
            _ => None,
        }
    }
}

/// Split a trailing `LE`/`BE` off a base name remainder.
fn split_order(rest: &str) -> Option<(&str, ByteOrder)> {
    if let Some(width) = rest.strip_suffix("LE") {
        Some((width, ByteOrder::Little))
    } else {
        rest.strip_suffix("BE").map(|width| (width, ByteOrder::Big))
    }
}

/// Character set of a string type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Charset {
    Ascii,
    Utf8,
}

impl Charset {
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Ascii => "H5T_CSET_ASCII",
            Self::Utf8 => "H5T_CSET_UTF8",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "H5T_CSET_ASCII" => Some(Self::Ascii),
            "H5T_CSET_UTF8" => Some(Self::Utf8),
            _ => None,
        }
    }
}

/// Fixed byte length (null padded) or variable length (null terminated).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StringLength {
    Fixed(usize),
    Variable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StringType {
    pub length: StringLength,
    pub charset: Charset,
}

impl StringType {
    pub fn fixed(len: usize, charset: Charset) -> Self {
        Self { length: StringLength::Fixed(len), charset }
    }

    pub fn variable(charset: Charset) -> Self {
        Self { length: StringLength::Variable, charset }
    }

    /// Wire padding tag implied by the length kind.
    pub fn pad_name(&self) -> &'static str {
        match self.length {
            StringLength::Fixed(_) => "H5T_STR_NULLPAD",
            StringLength::Variable => "H5T_STR_NULLTERM",
        }
    }
}

/// One member of a compound type. Field order is significant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompoundField {
    pub name: String,
    pub ty: TypeDescriptor,
}

impl CompoundField {
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self { name: name.into(), ty }
    }
}

/// Fixed-dimension array of a primitive base.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayType {
    pub dims: Vec<usize>,
    pub base: Box<TypeDescriptor>,
}

impl ArrayType {
    /// Total element count, `None` when it overflows `usize`.
    pub fn element_count(&self) -> Option<usize> {
        self.dims.iter().try_fold(1usize, |n, d| n.checked_mul(*d))
    }
}

/// Integer-backed enumeration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumType {
    pub base: IntegerType,
    pub mapping: BTreeMap<String, i64>,
}

impl EnumType {
    pub fn has_ordinal(&self, value: i64) -> bool {
        self.mapping.values().any(|v| *v == value)
    }
}

/// Object or region reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceKind {
    Object,
    Region,
}

impl ReferenceKind {
    pub fn base_name(&self) -> &'static str {
        match self {
            Self::Object => "H5T_STD_REF_OBJ",
            Self::Region => "H5T_STD_REF_DSETREG",
        }
    }

    pub fn parse_base(name: &str) -> Option<Self> {
        match name {
            "H5T_STD_REF_OBJ" => Some(Self::Object),
            "H5T_STD_REF_DSETREG" => Some(Self::Region),
            _ => None,
        }
    }
}

/// Native description of an element type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeDescriptor {
    Integer(IntegerType),
    Float(FloatType),
    String(StringType),
    Compound(Vec<CompoundField>),
    Array(ArrayType),
    VLen(Box<TypeDescriptor>),
    Opaque { size: usize },
    Enum(EnumType),
    Reference(ReferenceKind),
}

impl TypeDescriptor {
    /// Wire class tag.
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "H5T_INTEGER",
            Self::Float(_) => "H5T_FLOAT",
            Self::String(_) => "H5T_STRING",
            Self::Compound(_) => "H5T_COMPOUND",
            Self::Array(_) => "H5T_ARRAY",
            Self::VLen(_) => "H5T_VLEN",
            Self::Opaque { .. } => "H5T_OPAQUE",
            Self::Enum(_) => "H5T_ENUM",
            Self::Reference(_) => "H5T_REFERENCE",
        }
    }

    /// Storage size in bytes, `None` for variable-length types or
    /// aggregates containing one.
    pub fn size(&self) -> Option<usize> {
        match self {
            Self::Integer(t) => Some(t.size()),
            Self::Float(t) => Some(t.size()),
            Self::String(t) => match t.length {
                StringLength::Fixed(n) => Some(n),
                StringLength::Variable => None,
            },
            Self::Compound(fields) => fields
                .iter()
                .try_fold(0usize, |n, f| n.checked_add(f.ty.size()?)),
            Self::Array(a) => a.base.size()?.checked_mul(a.element_count()?),
            Self::VLen(_) => None,
            Self::Opaque { size } => Some(*size),
            Self::Enum(e) => Some(e.base.size()),
            Self::Reference(ReferenceKind::Object) => Some(8),
            Self::Reference(ReferenceKind::Region) => Some(12),
        }
    }

    pub fn is_variable_length(&self) -> bool {
        match self {
            Self::VLen(_) => true,
            Self::String(t) => t.length == StringLength::Variable,
            _ => false,
        }
    }

    /// Integer and float types, whose base tag alone identifies them.
    pub fn is_predefined(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Float(_))
    }

    /// Types allowed as the base of an [`ArrayType`].
    pub fn is_array_base(&self) -> bool {
        match self {
            Self::Integer(_) | Self::Float(_) => true,
            Self::String(t) => t.length != StringLength::Variable,
            _ => false,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(t) => write!(f, "{}", t.base_name()),
            Self::Float(t) => write!(f, "{}", t.base_name()),
            Self::String(t) => match t.length {
                StringLength::Fixed(n) => write!(f, "string[{n}]"),
                StringLength::Variable => write!(f, "string[var]"),
            },
            Self::Compound(fields) => write!(f, "compound({} fields)", fields.len()),
            Self::Array(a) => write!(f, "array{:?} of {}", a.dims, a.base),
            Self::VLen(base) => write!(f, "vlen of {base}"),
            Self::Opaque { size } => write!(f, "opaque[{size}]"),
            Self::Enum(e) => write!(f, "enum({}) over {}", e.mapping.len(), e.base.base_name()),
            Self::Reference(r) => write!(f, "{}", r.base_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_base_names() {
        let t = IntegerType::signed(32).unwrap();
        assert_eq!(t.base_name(), "H5T_STD_I32LE");
        let t = IntegerType::new(16, false, ByteOrder::Big).unwrap();
        assert_eq!(t.base_name(), "H5T_STD_U16BE");
    }

    #[test]
    fn integer_parse_base() {
        for bits in [8, 16, 32, 64] {
            for signed in [true, false] {
                for order in [ByteOrder::Little, ByteOrder::Big] {
                    let t = IntegerType::new(bits, signed, order).unwrap();
                    assert_eq!(IntegerType::parse_base(&t.base_name()), Some(t));
                }
            }
        }
    }

    #[test]
    fn integer_parse_rejects_unknown() {
        assert_eq!(IntegerType::parse_base("H5T_STD_I24LE"), None);
        assert_eq!(IntegerType::parse_base("H5T_STD_I32XE"), None);
        assert_eq!(IntegerType::parse_base("H5T_STD_X32LE"), None);
        assert_eq!(IntegerType::parse_base("H5T_IEEE_F32LE"), None);
        assert_eq!(IntegerType::parse_base("H5T_STD_"), None);
        assert_eq!(IntegerType::parse_base("H5T_STD_I+8LE"), None);
        assert_eq!(IntegerType::parse_base("H5T_STD_I08LE"), None);
        assert_eq!(IntegerType::parse_base("H5T_STD_I€"), None);
        assert_eq!(IntegerType::parse_base("H5T_STD_I8€LE"), None);
    }

    #[test]
    fn float_parse_is_exact() {
        assert_eq!(FloatType::parse_base("H5T_IEEE_F64BE"), FloatType::new(64, ByteOrder::Big));
        assert_eq!(FloatType::parse_base("H5T_IEEE_F16LE"), None);
        assert_eq!(FloatType::parse_base("H5T_IEEE_F032LE"), None);
        assert_eq!(FloatType::parse_base("H5T_IEEE_F€"), None);
    }

    #[test]
    fn oversized_array_has_no_size() {
        let arr = ArrayType {
            dims: vec![1 << 32, 1 << 32, 1 << 32],
            base: Box::new(TypeDescriptor::Integer(IntegerType::signed(8).unwrap())),
        };
        assert_eq!(arr.element_count(), None);
        assert_eq!(TypeDescriptor::Array(arr).size(), None);
    }

    #[test]
    fn integer_ranges() {
        let i8t = IntegerType::signed(8).unwrap();
        assert_eq!(i8t.range(), (-128, 127));
        let u64t = IntegerType::unsigned(64).unwrap();
        assert!(u64t.contains(u64::MAX as i128));
        assert!(!u64t.contains(-1));
    }

    #[test]
    fn float_base_names() {
        assert_eq!(FloatType::f64().base_name(), "H5T_IEEE_F64LE");
        assert_eq!(
            FloatType::parse_base("H5T_IEEE_F32BE"),
            FloatType::new(32, ByteOrder::Big)
        );
        assert_eq!(FloatType::parse_base("H5T_IEEE_F16LE"), None);
    }

    #[test]
    fn sizes() {
        let i32t = TypeDescriptor::Integer(IntegerType::signed(32).unwrap());
        assert_eq!(i32t.size(), Some(4));

        let compound = TypeDescriptor::Compound(vec![
            CompoundField::new("a", i32t.clone()),
            CompoundField::new("b", TypeDescriptor::Float(FloatType::f64())),
        ]);
        assert_eq!(compound.size(), Some(12));

        let var = TypeDescriptor::String(StringType::variable(Charset::Utf8));
        assert_eq!(var.size(), None);
        let with_var = TypeDescriptor::Compound(vec![CompoundField::new("s", var)]);
        assert_eq!(with_var.size(), None);

        let arr = TypeDescriptor::Array(ArrayType { dims: vec![2, 3], base: Box::new(i32t) });
        assert_eq!(arr.size(), Some(24));
    }

    #[test]
    fn array_base_rules() {
        assert!(TypeDescriptor::Float(FloatType::f32()).is_array_base());
        assert!(TypeDescriptor::String(StringType::fixed(4, Charset::Ascii)).is_array_base());
        assert!(!TypeDescriptor::String(StringType::variable(Charset::Ascii)).is_array_base());
        assert!(!TypeDescriptor::Opaque { size: 4 }.is_array_base());
    }
}
