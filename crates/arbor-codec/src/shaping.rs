//! Outward schema presentation.
//!
//! Responses use a two-tier form: committed types are shown by reference,
//! predefined primitives compactly, everything else verbosely with nested
//! members shaped the same way. Persistence and round trips use
//! [`crate::wire::encode`] instead.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use arbor_types::{ObjectKind, ObjectUuid};

use crate::descriptor::TypeDescriptor;
use crate::wire::encode;

/// A schema as attached to a dataset or attribute: either inline or a
/// reference to a committed datatype object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Schema {
    Inline(TypeDescriptor),
    Committed {
        id: ObjectUuid,
        descriptor: TypeDescriptor,
    },
}

impl Schema {
    /// The element type, regardless of how it is attached.
    pub fn descriptor(&self) -> &TypeDescriptor {
        match self {
            Self::Inline(d) => d,
            Self::Committed { descriptor, .. } => descriptor,
        }
    }

    pub fn committed_id(&self) -> Option<ObjectUuid> {
        match self {
            Self::Inline(_) => None,
            Self::Committed { id, .. } => Some(*id),
        }
    }
}

impl From<TypeDescriptor> for Schema {
    fn from(d: TypeDescriptor) -> Self {
        Self::Inline(d)
    }
}

/// Shape a schema for a response.
pub fn shape_schema(schema: &Schema) -> Value {
    match schema {
        Schema::Committed { id, .. } => json!(ObjectKind::Datatype.reference(id)),
        Schema::Inline(d) => shape_type(d),
    }
}

/// Shape an inline descriptor for a response.
pub fn shape_type(ty: &TypeDescriptor) -> Value {
    match ty {
        TypeDescriptor::Integer(t) => json!({ "class": ty.class_name(), "base": t.base_name() }),
        TypeDescriptor::Float(t) => json!({ "class": ty.class_name(), "base": t.base_name() }),
        TypeDescriptor::Opaque { size } => json!({ "class": ty.class_name(), "size": size }),
        TypeDescriptor::Reference(r) => json!({ "class": ty.class_name(), "base": r.base_name() }),
        TypeDescriptor::Compound(fields) => {
            let fields: Vec<Value> = fields
                .iter()
                .map(|f| json!({ "name": f.name, "type": shape_type(&f.ty) }))
                .collect();
            json!({ "class": ty.class_name(), "fields": fields })
        }
        TypeDescriptor::Array(a) => {
            let mut obj = verbose_without_size(ty);
            obj.insert("base".into(), shape_type(&a.base));
            Value::Object(obj)
        }
        TypeDescriptor::VLen(base) => {
            let mut obj = verbose_without_size(ty);
            obj.insert("base".into(), shape_type(base));
            Value::Object(obj)
        }
        TypeDescriptor::Enum(e) => {
            let mut obj = verbose_without_size(ty);
            obj.insert("base".into(), shape_type(&TypeDescriptor::Integer(e.base)));
            Value::Object(obj)
        }
        TypeDescriptor::String(_) => Value::Object(verbose_without_size(ty)),
    }
}

fn verbose_without_size(ty: &TypeDescriptor) -> Map<String, Value> {
    match encode(ty) {
        Value::Object(mut obj) => {
            obj.remove("size");
            obj
        }
        _ => Map::new(),
    }
}

/// Verbose description of a type with its storage layout, for `verbose`
/// item listings.
pub fn describe_verbose(schema: &Schema) -> Value {
    let mut value = encode(schema.descriptor());
    if let (Some(id), Value::Object(obj)) = (schema.committed_id(), &mut value) {
        obj.insert("id".into(), json!(id.to_string()));
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{
        ArrayType, Charset, CompoundField, EnumType, FloatType, IntegerType, StringType,
    };
    use std::collections::BTreeMap;

    fn i32le() -> TypeDescriptor {
        TypeDescriptor::Integer(IntegerType::signed(32).unwrap())
    }

    #[test]
    fn primitives_are_compact() {
        assert_eq!(
            shape_type(&i32le()),
            json!({"class": "H5T_INTEGER", "base": "H5T_STD_I32LE"})
        );
        assert_eq!(
            shape_type(&TypeDescriptor::Float(FloatType::f32())),
            json!({"class": "H5T_FLOAT", "base": "H5T_IEEE_F32LE"})
        );
    }

    #[test]
    fn committed_types_are_references() {
        let id = ObjectUuid::new();
        let schema = Schema::Committed { id, descriptor: i32le() };
        assert_eq!(shape_schema(&schema), json!(format!("datatypes/{id}")));
        assert_eq!(schema.committed_id(), Some(id));
    }

    #[test]
    fn strings_are_verbose_without_size() {
        let shaped = shape_type(&TypeDescriptor::String(StringType::fixed(8, Charset::Ascii)));
        assert_eq!(shaped["strsize"], 8);
        assert_eq!(shaped["strpad"], "H5T_STR_NULLPAD");
        assert!(shaped.get("size").is_none());
    }

    #[test]
    fn nested_members_are_shaped_recursively() {
        let compound = TypeDescriptor::Compound(vec![
            CompoundField::new("temp", TypeDescriptor::Float(FloatType::f64())),
            CompoundField::new(
                "grid",
                TypeDescriptor::Array(ArrayType { dims: vec![3], base: Box::new(i32le()) }),
            ),
        ]);
        let shaped = shape_type(&compound);
        assert_eq!(
            shaped["fields"][0]["type"],
            json!({"class": "H5T_FLOAT", "base": "H5T_IEEE_F64LE"})
        );
        let grid = &shaped["fields"][1]["type"];
        assert_eq!(grid["dims"], json!([3]));
        assert_eq!(grid["base"], json!({"class": "H5T_INTEGER", "base": "H5T_STD_I32LE"}));
        assert!(grid.get("size").is_none());
    }

    #[test]
    fn enum_base_is_compact() {
        let mut mapping = BTreeMap::new();
        mapping.insert("OFF".to_string(), 0);
        mapping.insert("ON".to_string(), 1);
        let e = TypeDescriptor::Enum(EnumType { base: IntegerType::signed(8).unwrap(), mapping });
        let shaped = shape_type(&e);
        assert_eq!(shaped["base"], json!({"class": "H5T_INTEGER", "base": "H5T_STD_I8LE"}));
        assert_eq!(shaped["mapping"]["ON"], 1);
    }

    #[test]
    fn verbose_description_carries_id() {
        let id = ObjectUuid::new();
        let v = describe_verbose(&Schema::Committed { id, descriptor: i32le() });
        assert_eq!(v["size"], 4);
        assert_eq!(v["id"], json!(id.to_string()));
    }
}
