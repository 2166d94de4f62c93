//! Wire schema translation.
//!
//! [`encode`] always produces the verbose form; [`decode`] accepts the
//! verbose form, the compact `{class, base}` form, a bare predefined base
//! name, and the `length`/`charSet`/`strPad` key aliases.

use std::collections::{BTreeMap, HashSet};

use serde_json::{json, Map, Value};

use crate::descriptor::{
    ArrayType, Charset, CompoundField, EnumType, FloatType, IntegerType, ReferenceKind,
    StringLength, StringType, TypeDescriptor,
};
use crate::error::{CodecError, CodecResult};

/// Marker used for variable sizes and lengths.
pub const VARIABLE: &str = "H5T_VARIABLE";

/// Encode a descriptor into its verbose wire schema.
pub fn encode(ty: &TypeDescriptor) -> Value {
    let mut obj = Map::new();
    obj.insert("class".into(), json!(ty.class_name()));
    match ty {
        TypeDescriptor::Integer(t) => {
            obj.insert("base".into(), json!(t.base_name()));
            obj.insert("order".into(), json!(t.order().wire_name()));
        }
        TypeDescriptor::Float(t) => {
            obj.insert("base".into(), json!(t.base_name()));
            obj.insert("order".into(), json!(t.order().wire_name()));
        }
        TypeDescriptor::String(t) => {
            let strsize = match t.length {
                StringLength::Fixed(n) => json!(n),
                StringLength::Variable => json!(VARIABLE),
            };
            obj.insert("strsize".into(), strsize);
            obj.insert("cset".into(), json!(t.charset.wire_name()));
            obj.insert("strpad".into(), json!(t.pad_name()));
            obj.insert("order".into(), json!("H5T_ORDER_NONE"));
        }
        TypeDescriptor::Compound(fields) => {
            let fields: Vec<Value> = fields
                .iter()
                .map(|f| json!({ "name": f.name, "type": encode(&f.ty) }))
                .collect();
            obj.insert("fields".into(), Value::Array(fields));
        }
        TypeDescriptor::Array(a) => {
            obj.insert("dims".into(), json!(a.dims));
            obj.insert("base".into(), encode(&a.base));
        }
        TypeDescriptor::VLen(base) => {
            obj.insert("base".into(), encode(base));
        }
        TypeDescriptor::Opaque { .. } => {}
        TypeDescriptor::Enum(e) => {
            obj.insert("base".into(), encode(&TypeDescriptor::Integer(e.base)));
            obj.insert("mapping".into(), json!(e.mapping));
        }
        TypeDescriptor::Reference(r) => {
            obj.insert("base".into(), json!(r.base_name()));
        }
    }
    let size = match ty.size() {
        Some(n) => json!(n),
        None => json!(VARIABLE),
    };
    if !matches!(ty, TypeDescriptor::Reference(_)) {
        obj.insert("size".into(), size);
    }
    Value::Object(obj)
}

/// Decode a wire schema into a native descriptor.
pub fn decode(value: &Value) -> CodecResult<TypeDescriptor> {
    match value {
        Value::String(name) => decode_base_name(name),
        Value::Object(obj) => decode_object(obj),
        other => Err(CodecError::invalid(
            "type",
            format!("expected a type object or base name, got {other}"),
        )),
    }
}

fn decode_base_name(name: &str) -> CodecResult<TypeDescriptor> {
    if let Some(t) = IntegerType::parse_base(name) {
        return Ok(TypeDescriptor::Integer(t));
    }
    if let Some(t) = FloatType::parse_base(name) {
        return Ok(TypeDescriptor::Float(t));
    }
    if let Some(r) = ReferenceKind::parse_base(name) {
        return Ok(TypeDescriptor::Reference(r));
    }
    Err(CodecError::UnsupportedBase(name.to_string()))
}

fn require<'a>(obj: &'a Map<String, Value>, key: &str) -> CodecResult<&'a Value> {
    obj.get(key).ok_or_else(|| CodecError::MissingKey(key.to_string()))
}

/// First present key among aliases, reporting the primary spelling when
/// none is present.
fn require_any<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> CodecResult<&'a Value> {
    keys.iter()
        .find_map(|k| obj.get(*k))
        .ok_or_else(|| CodecError::MissingKey(keys[0].to_string()))
}

fn base_str<'a>(obj: &'a Map<String, Value>) -> CodecResult<&'a str> {
    require(obj, "base")?
        .as_str()
        .ok_or_else(|| CodecError::invalid("base", "expected a predefined type name"))
}

fn positive(value: &Value, key: &str) -> CodecResult<usize> {
    match value.as_u64() {
        Some(n) if n > 0 => Ok(n as usize),
        _ => Err(CodecError::invalid(key, format!("expected a positive integer, got {value}"))),
    }
}

fn dims(value: &Value, key: &str) -> CodecResult<Vec<usize>> {
    match value {
        Value::Array(items) if !items.is_empty() => {
            items.iter().map(|v| positive(v, key)).collect()
        }
        Value::Number(_) => Ok(vec![positive(value, key)?]),
        _ => Err(CodecError::invalid(key, "expected a non-empty list of extents")),
    }
}

/// Wrap a fixed-size primitive in an array when the schema carries `shape`.
fn with_shape(obj: &Map<String, Value>, ty: TypeDescriptor) -> CodecResult<TypeDescriptor> {
    match obj.get("shape") {
        None => Ok(ty),
        Some(shape) => {
            if !ty.is_array_base() {
                return Err(CodecError::invalid(
                    "shape",
                    "variable-length values cannot be embedded in a fixed array layout",
                ));
            }
            bounded(
                "shape",
                TypeDescriptor::Array(ArrayType {
                    dims: dims(shape, "shape")?,
                    base: Box::new(ty),
                }),
            )
        }
    }
}

/// Reject fixed-size types whose byte size does not fit in `usize`.
fn bounded(key: &str, ty: TypeDescriptor) -> CodecResult<TypeDescriptor> {
    let overflows = match &ty {
        TypeDescriptor::Array(_) => ty.size().is_none(),
        TypeDescriptor::Compound(fields) => {
            fields.iter().all(|f| f.ty.size().is_some()) && ty.size().is_none()
        }
        _ => false,
    };
    if overflows {
        return Err(CodecError::invalid(key, "type size overflows"));
    }
    Ok(ty)
}

fn reject_shape(obj: &Map<String, Value>, class: &str) -> CodecResult<()> {
    if obj.contains_key("shape") {
        return Err(CodecError::invalid(
            "shape",
            format!("{class} cannot be declared with a shape"),
        ));
    }
    Ok(())
}

fn decode_object(obj: &Map<String, Value>) -> CodecResult<TypeDescriptor> {
    let class = require(obj, "class")?
        .as_str()
        .ok_or_else(|| CodecError::invalid("class", "expected a string"))?;

    match class {
        "H5T_INTEGER" => {
            let name = base_str(obj)?;
            let t = IntegerType::parse_base(name)
                .ok_or_else(|| CodecError::UnsupportedBase(name.to_string()))?;
            with_shape(obj, TypeDescriptor::Integer(t))
        }
        "H5T_FLOAT" => {
            let name = base_str(obj)?;
            let t = FloatType::parse_base(name)
                .ok_or_else(|| CodecError::UnsupportedBase(name.to_string()))?;
            with_shape(obj, TypeDescriptor::Float(t))
        }
        "H5T_STRING" => with_shape(obj, TypeDescriptor::String(decode_string(obj)?)),
        "H5T_COMPOUND" => {
            reject_shape(obj, class)?;
            decode_compound(obj)
        }
        "H5T_ARRAY" => {
            reject_shape(obj, class)?;
            let dims = dims(require(obj, "dims")?, "dims")?;
            let base = decode(require(obj, "base")?)?;
            if !base.is_array_base() {
                return Err(CodecError::invalid(
                    "base",
                    format!("array base must be a primitive type, got {}", base.class_name()),
                ));
            }
            bounded("dims", TypeDescriptor::Array(ArrayType { dims, base: Box::new(base) }))
        }
        "H5T_VLEN" => {
            reject_shape(obj, class)?;
            let base = decode(require(obj, "base")?)?;
            Ok(TypeDescriptor::VLen(Box::new(base)))
        }
        "H5T_OPAQUE" => {
            reject_shape(obj, class)?;
            let size = positive(require(obj, "size")?, "size")?;
            Ok(TypeDescriptor::Opaque { size })
        }
        "H5T_ENUM" => {
            reject_shape(obj, class)?;
            decode_enum(obj)
        }
        "H5T_REFERENCE" => {
            let name = base_str(obj)?;
            let r = ReferenceKind::parse_base(name)
                .ok_or_else(|| CodecError::UnsupportedBase(name.to_string()))?;
            Ok(TypeDescriptor::Reference(r))
        }
        other => Err(CodecError::UnknownClass(other.to_string())),
    }
}

fn decode_string(obj: &Map<String, Value>) -> CodecResult<StringType> {
    let length = match require_any(obj, &["strsize", "length"])? {
        Value::String(s) if s == VARIABLE => StringLength::Variable,
        other => StringLength::Fixed(positive(other, "strsize")?),
    };

    let charset = match obj.get("cset").or_else(|| obj.get("charSet")) {
        None => Charset::Ascii,
        Some(v) => v
            .as_str()
            .and_then(Charset::from_wire)
            .ok_or_else(|| CodecError::invalid("cset", format!("unsupported character set {v}")))?,
    };

    let ty = StringType { length, charset };
    if let Some(pad) = obj.get("strpad").or_else(|| obj.get("strPad")) {
        let pad = pad
            .as_str()
            .ok_or_else(|| CodecError::invalid("strpad", "expected a string"))?;
        let accepted = match length {
            StringLength::Fixed(_) => matches!(pad, "H5T_STR_NULLPAD" | "H5T_STR_NULLTERM"),
            StringLength::Variable => pad == "H5T_STR_NULLTERM",
        };
        if !accepted {
            return Err(CodecError::invalid(
                "strpad",
                format!("{pad} is not supported for this string length"),
            ));
        }
    }
    Ok(ty)
}

fn decode_compound(obj: &Map<String, Value>) -> CodecResult<TypeDescriptor> {
    let items = require(obj, "fields")?
        .as_array()
        .ok_or_else(|| CodecError::invalid("fields", "expected a list"))?;
    if items.is_empty() {
        return Err(CodecError::invalid("fields", "at least one field is required"));
    }

    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(items.len());
    for item in items {
        let field = item
            .as_object()
            .ok_or_else(|| CodecError::invalid("fields", "each field must be an object"))?;
        let name = require(field, "name")?
            .as_str()
            .ok_or_else(|| CodecError::invalid("name", "expected a string"))?;
        if name.is_empty() || !name.is_ascii() {
            return Err(CodecError::invalid("name", format!("field name {name:?} must be non-empty ascii")));
        }
        if !seen.insert(name) {
            return Err(CodecError::invalid("name", format!("duplicate field name {name:?}")));
        }
        let ty = decode(require(field, "type")?)?;
        fields.push(CompoundField::new(name, ty));
    }
    bounded("fields", TypeDescriptor::Compound(fields))
}

fn decode_enum(obj: &Map<String, Value>) -> CodecResult<TypeDescriptor> {
    let base = match decode(require(obj, "base")?)? {
        TypeDescriptor::Integer(t) => t,
        other => {
            return Err(CodecError::invalid(
                "base",
                format!("enum base must be an integer type, got {}", other.class_name()),
            ))
        }
    };

    let entries = require(obj, "mapping")?
        .as_object()
        .ok_or_else(|| CodecError::invalid("mapping", "expected an object of name to ordinal"))?;
    if entries.is_empty() {
        return Err(CodecError::invalid("mapping", "at least one member is required"));
    }

    let mut mapping = BTreeMap::new();
    for (name, ordinal) in entries {
        let ordinal = ordinal
            .as_i64()
            .filter(|v| base.contains(i128::from(*v)))
            .ok_or_else(|| {
                CodecError::invalid(
                    "mapping",
                    format!("{name}: {ordinal} does not fit {}", base.base_name()),
                )
            })?;
        mapping.insert(name.clone(), ordinal);
    }
    Ok(TypeDescriptor::Enum(EnumType { base, mapping }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ByteOrder;
    use arbor_types::ErrorKind;
    use proptest::prelude::*;

    fn i32le() -> TypeDescriptor {
        TypeDescriptor::Integer(IntegerType::signed(32).unwrap())
    }

    // ---- encode ----

    #[test]
    fn encode_integer() {
        let wire = encode(&i32le());
        assert_eq!(wire["class"], "H5T_INTEGER");
        assert_eq!(wire["base"], "H5T_STD_I32LE");
        assert_eq!(wire["order"], "H5T_ORDER_LE");
        assert_eq!(wire["size"], 4);
    }

    #[test]
    fn encode_strings() {
        let fixed = encode(&TypeDescriptor::String(StringType::fixed(6, Charset::Ascii)));
        assert_eq!(fixed["strsize"], 6);
        assert_eq!(fixed["cset"], "H5T_CSET_ASCII");
        assert_eq!(fixed["strpad"], "H5T_STR_NULLPAD");

        let var = encode(&TypeDescriptor::String(StringType::variable(Charset::Utf8)));
        assert_eq!(var["strsize"], VARIABLE);
        assert_eq!(var["strpad"], "H5T_STR_NULLTERM");
        assert_eq!(var["size"], VARIABLE);
    }

    #[test]
    fn encode_compound_preserves_field_order() {
        let ty = TypeDescriptor::Compound(vec![
            CompoundField::new("zeta", i32le()),
            CompoundField::new("alpha", TypeDescriptor::Float(FloatType::f64())),
        ]);
        let wire = encode(&ty);
        let names: Vec<&str> = wire["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["zeta", "alpha"]);
        assert_eq!(wire["size"], 12);
    }

    #[test]
    fn encode_reference_has_no_size() {
        let wire = encode(&TypeDescriptor::Reference(ReferenceKind::Region));
        assert_eq!(wire, json!({"class": "H5T_REFERENCE", "base": "H5T_STD_REF_DSETREG"}));
    }

    // ---- decode ----

    #[test]
    fn decode_bare_base_name() {
        assert_eq!(decode(&json!("H5T_STD_I32LE")).unwrap(), i32le());
        assert_eq!(
            decode(&json!("H5T_IEEE_F32BE")).unwrap(),
            TypeDescriptor::Float(FloatType::new(32, ByteOrder::Big).unwrap())
        );
        assert!(matches!(
            decode(&json!("H5T_STD_I128LE")),
            Err(CodecError::UnsupportedBase(_))
        ));
    }

    #[test]
    fn decode_names_missing_key() {
        let err = decode(&json!({"base": "H5T_STD_I8LE"})).unwrap_err();
        assert_eq!(err, CodecError::MissingKey("class".into()));
        assert_eq!(err.to_string(), "'class' not provided");

        let err = decode(&json!({"class": "H5T_INTEGER"})).unwrap_err();
        assert_eq!(err, CodecError::MissingKey("base".into()));

        let err = decode(&json!({"class": "H5T_STRING"})).unwrap_err();
        assert_eq!(err, CodecError::MissingKey("strsize".into()));

        let err = decode(&json!({"class": "H5T_ARRAY", "base": "H5T_STD_I8LE"})).unwrap_err();
        assert_eq!(err, CodecError::MissingKey("dims".into()));

        let err = decode(&json!({"class": "H5T_OPAQUE"})).unwrap_err();
        assert_eq!(err, CodecError::MissingKey("size".into()));
    }

    #[test]
    fn decode_rejects_non_ascii_bases() {
        for wire in [
            json!("H5T_STD_I€"),
            json!({"class": "H5T_INTEGER", "base": "H5T_STD_U€"}),
            json!({"class": "H5T_FLOAT", "base": "H5T_IEEE_F€"}),
        ] {
            let err = decode(&wire).unwrap_err();
            assert!(matches!(err, CodecError::UnsupportedBase(_)));
            assert_eq!(err.kind(), ErrorKind::BadRequest);
        }
    }

    #[test]
    fn decode_rejects_padded_widths() {
        for name in ["H5T_STD_I+8LE", "H5T_STD_I08LE", "H5T_IEEE_F+32LE"] {
            assert!(matches!(decode(&json!(name)), Err(CodecError::UnsupportedBase(_))), "{name}");
        }
    }

    #[test]
    fn decode_rejects_overflowing_dims() {
        let err = decode(&json!({
            "class": "H5T_ARRAY",
            "dims": [4294967296u64, 4294967296u64, 4294967296u64],
            "base": "H5T_STD_I8LE"
        }))
        .unwrap_err();
        assert!(matches!(err, CodecError::InvalidField { ref key, .. } if key == "dims"));

        let err = decode(&json!({
            "class": "H5T_INTEGER",
            "base": "H5T_STD_I64LE",
            "shape": [u64::MAX / 4]
        }))
        .unwrap_err();
        assert!(matches!(err, CodecError::InvalidField { ref key, .. } if key == "shape"));
    }

    #[test]
    fn decode_rejects_unknown_class_and_base() {
        assert!(matches!(
            decode(&json!({"class": "H5T_TIME"})),
            Err(CodecError::UnknownClass(_))
        ));
        assert!(matches!(
            decode(&json!({"class": "H5T_FLOAT", "base": "H5T_STD_I32LE"})),
            Err(CodecError::UnsupportedBase(_))
        ));
    }

    #[test]
    fn decode_string_aliases() {
        let ty = decode(&json!({
            "class": "H5T_STRING",
            "length": "H5T_VARIABLE",
            "charSet": "H5T_CSET_UTF8",
            "strPad": "H5T_STR_NULLTERM"
        }))
        .unwrap();
        assert_eq!(ty, TypeDescriptor::String(StringType::variable(Charset::Utf8)));
    }

    #[test]
    fn decode_string_rejects_bad_padding() {
        let err = decode(&json!({
            "class": "H5T_STRING",
            "strsize": "H5T_VARIABLE",
            "strpad": "H5T_STR_NULLPAD"
        }))
        .unwrap_err();
        assert!(matches!(err, CodecError::InvalidField { .. }));
    }

    #[test]
    fn decode_shape_builds_array() {
        let ty = decode(&json!({"class": "H5T_INTEGER", "base": "H5T_STD_U8LE", "shape": [2, 2]}))
            .unwrap();
        match ty {
            TypeDescriptor::Array(a) => {
                assert_eq!(a.dims, vec![2, 2]);
                assert_eq!(*a.base, TypeDescriptor::Integer(IntegerType::unsigned(8).unwrap()));
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn decode_shape_rejected_for_variable_length() {
        let var_string = json!({"class": "H5T_STRING", "strsize": "H5T_VARIABLE", "shape": [3]});
        assert!(matches!(decode(&var_string), Err(CodecError::InvalidField { .. })));

        let vlen = json!({"class": "H5T_VLEN", "base": "H5T_STD_I32LE", "shape": [3]});
        assert!(matches!(decode(&vlen), Err(CodecError::InvalidField { .. })));

        let opaque = json!({"class": "H5T_OPAQUE", "size": 4, "shape": [3]});
        assert!(matches!(decode(&opaque), Err(CodecError::InvalidField { .. })));
    }

    #[test]
    fn decode_array_of_array_rejected() {
        let wire = json!({
            "class": "H5T_ARRAY",
            "dims": [2],
            "base": {"class": "H5T_ARRAY", "dims": [2], "base": "H5T_STD_I8LE"}
        });
        assert!(matches!(decode(&wire), Err(CodecError::InvalidField { .. })));
    }

    #[test]
    fn decode_opaque_requires_positive_size() {
        assert!(decode(&json!({"class": "H5T_OPAQUE", "size": 0})).is_err());
        assert_eq!(
            decode(&json!({"class": "H5T_OPAQUE", "size": 16})).unwrap(),
            TypeDescriptor::Opaque { size: 16 }
        );
    }

    #[test]
    fn decode_compound_validation() {
        let empty = json!({"class": "H5T_COMPOUND", "fields": []});
        assert!(matches!(decode(&empty), Err(CodecError::InvalidField { .. })));

        let dup = json!({"class": "H5T_COMPOUND", "fields": [
            {"name": "a", "type": "H5T_STD_I8LE"},
            {"name": "a", "type": "H5T_STD_I8LE"}
        ]});
        assert!(matches!(decode(&dup), Err(CodecError::InvalidField { .. })));

        let untyped = json!({"class": "H5T_COMPOUND", "fields": [{"name": "a"}]});
        assert_eq!(decode(&untyped).unwrap_err(), CodecError::MissingKey("type".into()));
    }

    #[test]
    fn decode_enum_checks_ordinals_fit_base() {
        let wire = json!({
            "class": "H5T_ENUM",
            "base": {"class": "H5T_INTEGER", "base": "H5T_STD_I8LE"},
            "mapping": {"LOW": 0, "HIGH": 300}
        });
        assert!(matches!(decode(&wire), Err(CodecError::InvalidField { .. })));

        let wire = json!({
            "class": "H5T_ENUM",
            "base": "H5T_STD_I8LE",
            "mapping": {"LOW": 0, "HIGH": 1}
        });
        match decode(&wire).unwrap() {
            TypeDescriptor::Enum(e) => assert_eq!(e.mapping["HIGH"], 1),
            other => panic!("expected enum, got {other:?}"),
        }
    }

    // ---- round trip ----

    fn arb_integer() -> impl Strategy<Value = IntegerType> {
        (
            prop::sample::select(vec![8u8, 16, 32, 64]),
            any::<bool>(),
            prop::bool::ANY.prop_map(|b| if b { ByteOrder::Little } else { ByteOrder::Big }),
        )
            .prop_map(|(bits, signed, order)| IntegerType::new(bits, signed, order).unwrap())
    }

    fn arb_primitive() -> impl Strategy<Value = TypeDescriptor> {
        prop_oneof![
            arb_integer().prop_map(TypeDescriptor::Integer),
            (prop::sample::select(vec![32u8, 64]), any::<bool>()).prop_map(|(bits, le)| {
                let order = if le { ByteOrder::Little } else { ByteOrder::Big };
                TypeDescriptor::Float(FloatType::new(bits, order).unwrap())
            }),
            (1usize..64, any::<bool>()).prop_map(|(n, utf8)| {
                let cs = if utf8 { Charset::Utf8 } else { Charset::Ascii };
                TypeDescriptor::String(StringType::fixed(n, cs))
            }),
        ]
    }

    fn arb_leaf() -> impl Strategy<Value = TypeDescriptor> {
        prop_oneof![
            arb_primitive(),
            any::<bool>().prop_map(|utf8| {
                let cs = if utf8 { Charset::Utf8 } else { Charset::Ascii };
                TypeDescriptor::String(StringType::variable(cs))
            }),
            (1usize..256).prop_map(|size| TypeDescriptor::Opaque { size }),
            prop_oneof![Just(ReferenceKind::Object), Just(ReferenceKind::Region)]
                .prop_map(TypeDescriptor::Reference),
            (prop::collection::btree_map("[A-Z]{1,6}", -100i64..100, 1..5)).prop_map(|mapping| {
                TypeDescriptor::Enum(EnumType { base: IntegerType::signed(8).unwrap(), mapping })
            }),
            (prop::collection::vec(1usize..5, 1..3), arb_primitive()).prop_map(|(dims, base)| {
                TypeDescriptor::Array(ArrayType { dims, base: Box::new(base) })
            }),
        ]
    }

    fn arb_descriptor() -> impl Strategy<Value = TypeDescriptor> {
        arb_leaf().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                inner.clone().prop_map(|t| TypeDescriptor::VLen(Box::new(t))),
                prop::collection::vec(inner, 1..4).prop_map(|types| {
                    TypeDescriptor::Compound(
                        types
                            .into_iter()
                            .enumerate()
                            .map(|(i, ty)| CompoundField::new(format!("f{i}"), ty))
                            .collect(),
                    )
                }),
            ]
        })
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(ty in arb_descriptor()) {
            let wire = encode(&ty);
            prop_assert_eq!(decode(&wire).unwrap(), ty);
        }
    }
}
