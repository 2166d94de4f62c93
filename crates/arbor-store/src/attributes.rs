//! Named attributes attached to any object.

use std::ops::Bound;

use chrono::{DateTime, Utc};
use tracing::debug;

use arbor_codec::{encode_value, NdArray, Schema};
use arbor_types::ObjectUuid;

use crate::container::StoredAttribute;
use crate::error::{StoreError, StoreResult};
use crate::names;
use crate::store::{CollisionPolicy, ObjectStore};

#[derive(Clone, Debug, PartialEq)]
pub struct AttributeInfo {
    pub name: String,
    pub schema: Schema,
    pub value: NdArray,
    pub created: DateTime<Utc>,
}

impl AttributeInfo {
    pub fn shape(&self) -> &[usize] {
        &self.value.shape
    }
}

impl ObjectStore {
    /// Attach `value` to `object` as `name`. The value is checked against
    /// the schema before anything is written.
    pub fn put_attribute(
        &mut self,
        object: &ObjectUuid,
        name: &str,
        schema: &Schema,
        value: NdArray,
    ) -> StoreResult<()> {
        names::validate_attribute_name(name)?;
        encode_value(schema.descriptor(), &value)?;
        let stored = self.to_stored(schema)?;
        let policy = self.collision();

        let obj = self.entry_mut(object)?;
        if obj.attributes.contains_key(name) && policy == CollisionPolicy::Reject {
            return Err(StoreError::AttributeExists {
                object: *object,
                name: name.to_string(),
            });
        }
        obj.attributes.insert(
            name.to_string(),
            StoredAttribute {
                schema: stored,
                value,
                created: Utc::now(),
            },
        );
        obj.touch();
        debug!(%object, name, "attribute written");
        Ok(())
    }

    fn attribute_info(&self, name: &str, stored: &StoredAttribute) -> StoreResult<AttributeInfo> {
        Ok(AttributeInfo {
            name: name.to_string(),
            schema: self.from_stored(&stored.schema)?,
            value: stored.value.clone(),
            created: stored.created,
        })
    }

    pub fn attribute(&self, object: &ObjectUuid, name: &str) -> StoreResult<AttributeInfo> {
        let (_, obj) = self.entry(object)?;
        let stored = obj
            .attributes
            .get(name)
            .ok_or_else(|| StoreError::AttributeNotFound {
                object: *object,
                name: name.to_string(),
            })?;
        self.attribute_info(name, stored)
    }

    /// Attributes in name order, starting after `marker`.
    pub fn list_attributes(
        &self,
        object: &ObjectUuid,
        marker: Option<&str>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<AttributeInfo>> {
        let (_, obj) = self.entry(object)?;
        let lower = match marker {
            Some(m) if !obj.attributes.contains_key(m) => return Ok(Vec::new()),
            Some(m) => Bound::Excluded(m),
            None => Bound::Unbounded,
        };
        obj.attributes
            .range::<str, _>((lower, Bound::Unbounded))
            .take(limit.unwrap_or(usize::MAX))
            .map(|(name, stored)| self.attribute_info(name, stored))
            .collect()
    }

    pub fn delete_attribute(&mut self, object: &ObjectUuid, name: &str) -> StoreResult<()> {
        let obj = self.entry_mut(object)?;
        if obj.attributes.remove(name).is_none() {
            return Err(StoreError::AttributeNotFound {
                object: *object,
                name: name.to_string(),
            });
        }
        obj.touch();
        debug!(%object, name, "attribute deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_codec::{Element, IntegerType, StringType, TypeDescriptor};
    use arbor_types::ErrorKind;

    fn int16() -> Schema {
        Schema::Inline(TypeDescriptor::Integer(IntegerType::signed(16).unwrap()))
    }

    fn ints(values: &[i64]) -> NdArray {
        NdArray::new(vec![values.len()], values.iter().map(|v| Element::Int(*v)).collect()).unwrap()
    }

    #[test]
    fn put_get_delete() {
        let mut store = ObjectStore::in_memory().unwrap();
        let root = store.root_uuid();
        store.put_attribute(&root, "a", &int16(), ints(&[1, 2, 3])).unwrap();

        let attr = store.attribute(&root, "a").unwrap();
        assert_eq!(attr.shape(), [3]);
        assert_eq!(attr.value.elements[2], Element::Int(3));
        assert_eq!(store.object(&root).unwrap().attribute_count, 1);

        store.delete_attribute(&root, "a").unwrap();
        let err = store.attribute(&root, "a").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(matches!(
            store.delete_attribute(&root, "a"),
            Err(StoreError::AttributeNotFound { .. })
        ));
    }

    #[test]
    fn existing_name_conflicts() {
        let mut store = ObjectStore::in_memory().unwrap();
        let root = store.root_uuid();
        store.put_attribute(&root, "a", &int16(), ints(&[1])).unwrap();
        let err = store.put_attribute(&root, "a", &int16(), ints(&[2])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn values_are_checked_against_schema() {
        let mut store = ObjectStore::in_memory().unwrap();
        let root = store.root_uuid();
        let err = store
            .put_attribute(&root, "a", &int16(), ints(&[70_000]))
            .unwrap_err();
        assert!(matches!(err, StoreError::Codec(_)));
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let ascii = Schema::Inline(TypeDescriptor::String(StringType::variable(
            arbor_codec::Charset::Ascii,
        )));
        let value = NdArray::scalar(Element::Str("héllo".into()));
        assert!(store.put_attribute(&root, "s", &ascii, value).is_err());
        assert!(store.list_attributes(&root, None, None).unwrap().is_empty());
    }

    #[test]
    fn list_in_name_order() {
        let mut store = ObjectStore::in_memory().unwrap();
        let root = store.root_uuid();
        for name in ["b", "c", "a"] {
            store.put_attribute(&root, name, &int16(), ints(&[0])).unwrap();
        }
        let names = |items: Vec<AttributeInfo>| items.into_iter().map(|a| a.name).collect::<Vec<_>>();
        assert_eq!(names(store.list_attributes(&root, None, None).unwrap()), ["a", "b", "c"]);
        assert_eq!(names(store.list_attributes(&root, Some("a"), Some(1)).unwrap()), ["b"]);
        assert!(store.list_attributes(&root, Some("x"), None).unwrap().is_empty());
    }

    #[test]
    fn unknown_object_is_not_found() {
        let mut store = ObjectStore::in_memory().unwrap();
        let err = store
            .put_attribute(&ObjectUuid::new(), "a", &int16(), ints(&[1]))
            .unwrap_err();
        assert!(matches!(err, StoreError::ObjectNotFound(_)));
    }
}
