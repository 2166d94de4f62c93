//! JSON response bodies for service results.

use serde_json::{json, Map, Value};

use arbor_codec::{encode_value, shape_schema, shape_type, CodecResult};
use arbor_store::{Acl, AttributeInfo, LinkItem, LinkTarget, ObjectDetail, ObjectInfo};

use crate::service::DomainInfo;

/// Dataspace description. Unlimited extents are reported as 0.
pub fn shape_json(shape: &[usize], max_shape: Option<&[Option<usize>]>) -> Value {
    if shape.is_empty() {
        return json!({ "class": "H5S_SCALAR" });
    }
    let mut out = json!({ "class": "H5S_SIMPLE", "dims": shape });
    if let Some(max) = max_shape {
        let maxdims: Vec<usize> = max.iter().map(|m| m.unwrap_or(0)).collect();
        out["maxdims"] = json!(maxdims);
    }
    out
}

pub fn object_json(info: &ObjectInfo) -> Value {
    let mut out = Map::new();
    out.insert("id".into(), json!(info.id.to_string()));
    out.insert("collection".into(), json!(info.kind.collection()));
    out.insert("created".into(), json!(info.created.to_rfc3339()));
    out.insert("lastModified".into(), json!(info.modified.to_rfc3339()));
    out.insert("attributeCount".into(), json!(info.attribute_count));
    match &info.detail {
        ObjectDetail::Group { link_count } => {
            out.insert("linkCount".into(), json!(link_count));
        }
        ObjectDetail::Dataset { schema, shape, max_shape } => {
            out.insert("type".into(), shape_schema(schema));
            out.insert("shape".into(), shape_json(shape, max_shape.as_deref()));
        }
        ObjectDetail::Datatype { descriptor } => {
            out.insert("type".into(), shape_type(descriptor));
        }
    }
    Value::Object(out)
}

pub fn link_json(link: &LinkItem) -> Value {
    let mut out = json!({ "title": link.name, "class": link.target.class_name() });
    match &link.target {
        LinkTarget::Hard { id, kind } => {
            out["id"] = json!(id.to_string());
            out["collection"] = json!(kind.collection());
        }
        LinkTarget::Soft { path } => out["h5path"] = json!(path),
        LinkTarget::External { domain, path } => {
            out["h5domain"] = json!(domain);
            out["h5path"] = json!(path);
        }
    }
    out
}

pub fn attribute_json(attr: &AttributeInfo) -> CodecResult<Value> {
    Ok(json!({
        "name": attr.name,
        "type": shape_schema(&attr.schema),
        "shape": shape_json(attr.shape(), None),
        "value": encode_value(attr.schema.descriptor(), &attr.value)?,
        "created": attr.created.to_rfc3339(),
    }))
}

pub fn acl_json(acl: &Acl) -> Value {
    json!({
        "userid": acl.userid.0,
        "create": acl.create,
        "read": acl.read,
        "update": acl.update,
        "delete": acl.delete,
        "readACL": acl.read_acl,
        "updateACL": acl.update_acl,
    })
}

pub fn domain_json(info: &DomainInfo) -> Value {
    json!({
        "domain": info.domain,
        "root": info.root.to_string(),
        "created": info.created.to_rfc3339(),
        "lastModified": info.modified.to_rfc3339(),
        "groupCount": info.counts.groups,
        "datasetCount": info.counts.datasets,
        "datatypeCount": info.counts.datatypes,
        "readOnly": info.read_only,
    })
}
