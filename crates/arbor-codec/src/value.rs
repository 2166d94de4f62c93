//! Literal value encoding.
//!
//! Values travel as nested JSON lists shaped like the dataspace. Compound
//! elements are positional tuples in field order; array-typed elements nest
//! to the array's dims; a rank-0 value is a bare scalar.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use arbor_types::{ObjectKind, ObjectUuid};

use crate::descriptor::{
    ArrayType, Charset, IntegerType, ReferenceKind, StringLength, StringType, TypeDescriptor,
};
use crate::error::{CodecError, CodecResult};

/// One element of a dataset or attribute, in native form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Element {
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    /// Compound members in field order.
    Tuple(Vec<Element>),
    /// Array (flattened row-major) or variable-length sequence members.
    List(Vec<Element>),
    /// `<collection>/<uuid>`, empty for a null reference.
    Ref(String),
}

/// A shaped block of elements stored row-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NdArray {
    pub shape: Vec<usize>,
    pub elements: Vec<Element>,
}

/// Number of cells in `shape`, `None` when it overflows `usize`.
pub fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |n, d| n.checked_mul(*d))
}

fn expect_count(shape: &[usize], len: usize) -> CodecResult<()> {
    match element_count(shape) {
        Some(expected) if expected == len => Ok(()),
        Some(expected) => Err(CodecError::TypeMismatch(format!(
            "shape {shape:?} holds {expected} elements, got {len}"
        ))),
        None => Err(CodecError::TypeMismatch(format!("shape {shape:?} is too large"))),
    }
}

impl NdArray {
    pub fn new(shape: Vec<usize>, elements: Vec<Element>) -> CodecResult<Self> {
        expect_count(&shape, elements.len())?;
        Ok(Self { shape, elements })
    }

    pub fn scalar(element: Element) -> Self {
        Self { shape: Vec::new(), elements: vec![element] }
    }

    /// Every cell set to the type's fill value.
    pub fn filled(ty: &TypeDescriptor, shape: Vec<usize>) -> Self {
        let count = element_count(&shape).unwrap_or(0);
        Self { shape, elements: vec![fill_value(ty); count] }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Default value for unwritten cells.
pub fn fill_value(ty: &TypeDescriptor) -> Element {
    match ty {
        TypeDescriptor::Integer(t) if t.is_signed() => Element::Int(0),
        TypeDescriptor::Integer(_) => Element::UInt(0),
        TypeDescriptor::Float(_) => Element::Float(0.0),
        TypeDescriptor::String(_) => Element::Str(String::new()),
        TypeDescriptor::Compound(fields) => {
            Element::Tuple(fields.iter().map(|f| fill_value(&f.ty)).collect())
        }
        TypeDescriptor::Array(a) => {
            Element::List(vec![fill_value(&a.base); a.element_count().unwrap_or(0)])
        }
        TypeDescriptor::VLen(_) => Element::List(Vec::new()),
        TypeDescriptor::Opaque { size } => Element::Bytes(vec![0; *size]),
        TypeDescriptor::Enum(e) => {
            if e.has_ordinal(0) {
                Element::Int(0)
            } else {
                Element::Int(e.mapping.values().copied().min().unwrap_or(0))
            }
        }
        TypeDescriptor::Reference(_) => Element::Ref(String::new()),
    }
}

/// Encode a block of native elements into a wire literal.
pub fn encode_value(ty: &TypeDescriptor, values: &NdArray) -> CodecResult<Value> {
    expect_count(&values.shape, values.elements.len())?;
    if values.shape.is_empty() {
        return encode_element(ty, &values.elements[0]);
    }
    nest(ty, &values.shape, &values.elements)
}

fn nest(ty: &TypeDescriptor, shape: &[usize], elements: &[Element]) -> CodecResult<Value> {
    match shape.split_first() {
        None => encode_element(ty, &elements[0]),
        Some((_, [])) => elements
            .iter()
            .map(|e| encode_element(ty, e))
            .collect::<CodecResult<Vec<_>>>()
            .map(Value::Array),
        Some((extent, rest)) => {
            let stride: usize = rest.iter().product();
            if stride == 0 {
                return Ok(Value::Array(vec![Value::Array(Vec::new()); *extent]));
            }
            elements
                .chunks(stride)
                .map(|chunk| nest(ty, rest, chunk))
                .collect::<CodecResult<Vec<_>>>()
                .map(Value::Array)
        }
    }
}

fn mismatch(ty: &TypeDescriptor, found: impl std::fmt::Debug) -> CodecError {
    CodecError::TypeMismatch(format!("{} cannot hold {found:?}", ty.class_name()))
}

fn check_int(t: &IntegerType, value: i128) -> CodecResult<()> {
    if t.contains(value) {
        Ok(())
    } else {
        Err(CodecError::TypeMismatch(format!(
            "{value} is out of range for {}",
            t.base_name()
        )))
    }
}

fn check_string(t: &StringType, s: &str) -> CodecResult<()> {
    if t.charset == Charset::Ascii && !s.is_ascii() {
        return Err(CodecError::TypeMismatch(format!("{s:?} is not ascii")));
    }
    if let StringLength::Fixed(n) = t.length {
        if s.len() > n {
            return Err(CodecError::TypeMismatch(format!(
                "{s:?} is longer than {n} bytes"
            )));
        }
    }
    Ok(())
}

fn check_reference(kind: ReferenceKind, s: &str) -> CodecResult<()> {
    if s.is_empty() {
        return Ok(());
    }
    let (collection, _) = ObjectKind::parse_reference(s)
        .map_err(|e| CodecError::TypeMismatch(e.to_string()))?;
    if kind == ReferenceKind::Region && collection != ObjectKind::Dataset {
        return Err(CodecError::TypeMismatch(format!(
            "region reference {s} must point at a dataset"
        )));
    }
    Ok(())
}

fn encode_element(ty: &TypeDescriptor, element: &Element) -> CodecResult<Value> {
    match (ty, element) {
        (TypeDescriptor::Integer(t), Element::Int(v)) => {
            check_int(t, i128::from(*v))?;
            Ok(json!(v))
        }
        (TypeDescriptor::Integer(t), Element::UInt(v)) => {
            check_int(t, i128::from(*v))?;
            Ok(json!(v))
        }
        (TypeDescriptor::Float(_), Element::Float(v)) => Ok(json!(v)),
        (TypeDescriptor::Float(_), Element::Int(v)) => Ok(json!(*v as f64)),
        (TypeDescriptor::String(t), Element::Str(s)) => {
            check_string(t, s)?;
            Ok(json!(s))
        }
        (TypeDescriptor::Compound(fields), Element::Tuple(items)) => {
            if fields.len() != items.len() {
                return Err(CodecError::TypeMismatch(format!(
                    "compound has {} fields, tuple has {}",
                    fields.len(),
                    items.len()
                )));
            }
            fields
                .iter()
                .zip(items)
                .map(|(f, item)| encode_element(&f.ty, item))
                .collect::<CodecResult<Vec<_>>>()
                .map(Value::Array)
        }
        (TypeDescriptor::Array(a), Element::List(items)) => {
            if a.element_count() != Some(items.len()) {
                return Err(CodecError::TypeMismatch(format!(
                    "array {:?} cannot hold {} elements",
                    a.dims,
                    items.len()
                )));
            }
            nest(&a.base, &a.dims, items)
        }
        (TypeDescriptor::VLen(base), Element::List(items)) => items
            .iter()
            .map(|item| encode_element(base, item))
            .collect::<CodecResult<Vec<_>>>()
            .map(Value::Array),
        (TypeDescriptor::Opaque { size }, Element::Bytes(bytes)) => {
            if bytes.len() != *size {
                return Err(CodecError::TypeMismatch(format!(
                    "opaque value must be {size} bytes, got {}",
                    bytes.len()
                )));
            }
            Ok(json!(hex::encode(bytes)))
        }
        (TypeDescriptor::Enum(e), Element::Int(v)) => {
            if !e.has_ordinal(*v) {
                return Err(CodecError::TypeMismatch(format!("{v} is not an enum member")));
            }
            Ok(json!(v))
        }
        (TypeDescriptor::Reference(kind), Element::Ref(s)) => {
            check_reference(*kind, s)?;
            Ok(json!(s))
        }
        (ty, element) => Err(mismatch(ty, element)),
    }
}

/// Decode a wire literal against a type and dataspace shape.
pub fn decode_value(ty: &TypeDescriptor, shape: &[usize], literal: &Value) -> CodecResult<NdArray> {
    if element_count(shape).is_none() {
        return Err(CodecError::TypeMismatch(format!("shape {shape:?} is too large")));
    }
    let mut elements = Vec::new();
    flatten(ty, shape, literal, &mut elements)?;
    Ok(NdArray { shape: shape.to_vec(), elements })
}

fn flatten(
    ty: &TypeDescriptor,
    shape: &[usize],
    literal: &Value,
    out: &mut Vec<Element>,
) -> CodecResult<()> {
    let Some((extent, rest)) = shape.split_first() else {
        out.push(decode_element(ty, literal)?);
        return Ok(());
    };
    let items = literal
        .as_array()
        .ok_or_else(|| CodecError::TypeMismatch(format!("expected a list of {extent}, got {literal}")))?;
    if items.len() != *extent {
        return Err(CodecError::TypeMismatch(format!(
            "expected {extent} items, got {}",
            items.len()
        )));
    }
    items.iter().try_for_each(|item| flatten(ty, rest, item, out))
}

fn decode_element(ty: &TypeDescriptor, literal: &Value) -> CodecResult<Element> {
    match ty {
        TypeDescriptor::Integer(t) => {
            if t.is_signed() {
                let v = literal.as_i64().ok_or_else(|| mismatch(ty, literal))?;
                check_int(t, i128::from(v))?;
                Ok(Element::Int(v))
            } else {
                let v = literal.as_u64().ok_or_else(|| mismatch(ty, literal))?;
                check_int(t, i128::from(v))?;
                Ok(Element::UInt(v))
            }
        }
        TypeDescriptor::Float(_) => literal
            .as_f64()
            .map(Element::Float)
            .ok_or_else(|| mismatch(ty, literal)),
        TypeDescriptor::String(t) => {
            let s = literal.as_str().ok_or_else(|| mismatch(ty, literal))?;
            check_string(t, s)?;
            Ok(Element::Str(s.to_string()))
        }
        TypeDescriptor::Compound(fields) => {
            let items = literal.as_array().ok_or_else(|| mismatch(ty, literal))?;
            if items.len() != fields.len() {
                return Err(CodecError::TypeMismatch(format!(
                    "compound has {} fields, literal has {}",
                    fields.len(),
                    items.len()
                )));
            }
            fields
                .iter()
                .zip(items)
                .map(|(f, item)| decode_element(&f.ty, item))
                .collect::<CodecResult<Vec<_>>>()
                .map(Element::Tuple)
        }
        TypeDescriptor::Array(ArrayType { dims, base }) => {
            let mut items = Vec::new();
            flatten(base, dims, literal, &mut items)?;
            Ok(Element::List(items))
        }
        TypeDescriptor::VLen(base) => {
            let items = literal.as_array().ok_or_else(|| mismatch(ty, literal))?;
            items
                .iter()
                .map(|item| decode_element(base, item))
                .collect::<CodecResult<Vec<_>>>()
                .map(Element::List)
        }
        TypeDescriptor::Opaque { size } => {
            let text = literal.as_str().ok_or_else(|| mismatch(ty, literal))?;
            let bytes = hex::decode(text)
                .map_err(|e| CodecError::TypeMismatch(format!("opaque value is not hex: {e}")))?;
            if bytes.len() != *size {
                return Err(CodecError::TypeMismatch(format!(
                    "opaque value must be {size} bytes, got {}",
                    bytes.len()
                )));
            }
            Ok(Element::Bytes(bytes))
        }
        TypeDescriptor::Enum(e) => {
            let v = literal.as_i64().ok_or_else(|| mismatch(ty, literal))?;
            if !e.has_ordinal(v) {
                return Err(CodecError::TypeMismatch(format!("{v} is not an enum member")));
            }
            Ok(Element::Int(v))
        }
        TypeDescriptor::Reference(kind) => {
            let s = literal.as_str().ok_or_else(|| mismatch(ty, literal))?;
            check_reference(*kind, s)?;
            Ok(Element::Ref(s.to_string()))
        }
    }
}

/// Build an object reference element.
pub fn object_ref(kind: ObjectKind, id: &ObjectUuid) -> Element {
    Element::Ref(kind.reference(id))
}
