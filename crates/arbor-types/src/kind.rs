use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::id::ObjectUuid;

/// The three kinds of addressable object a container holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectKind {
    Group,
    Dataset,
    Datatype,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 3] = [Self::Group, Self::Dataset, Self::Datatype];

    /// Collection name used in object references (`groups/<uuid>`).
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Group => "groups",
            Self::Dataset => "datasets",
            Self::Datatype => "datatypes",
        }
    }

    /// Inverse of [`ObjectKind::collection`].
    pub fn from_collection(name: &str) -> Result<Self, TypeError> {
        match name {
            "groups" => Ok(Self::Group),
            "datasets" => Ok(Self::Dataset),
            "datatypes" => Ok(Self::Datatype),
            other => Err(TypeError::UnknownCollection(other.to_string())),
        }
    }

    /// Render a reference string for an object of this kind.
    pub fn reference(&self, id: &ObjectUuid) -> String {
        format!("{}/{}", self.collection(), id)
    }

    /// Split a `<collection>/<uuid>` reference string.
    pub fn parse_reference(reference: &str) -> Result<(Self, ObjectUuid), TypeError> {
        let (collection, id) = reference
            .split_once('/')
            .ok_or_else(|| TypeError::InvalidReference(reference.to_string()))?;
        Ok((Self::from_collection(collection)?, ObjectUuid::parse(id)?))
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group => write!(f, "group"),
            Self::Dataset => write!(f, "dataset"),
            Self::Datatype => write!(f, "datatype"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_round_trip() {
        for kind in ObjectKind::ALL {
            assert_eq!(ObjectKind::from_collection(kind.collection()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_collection() {
        assert!(matches!(
            ObjectKind::from_collection("links"),
            Err(TypeError::UnknownCollection(_))
        ));
    }

    #[test]
    fn reference_round_trip() {
        let id = ObjectUuid::new();
        let text = ObjectKind::Dataset.reference(&id);
        assert!(text.starts_with("datasets/"));
        assert_eq!(
            ObjectKind::parse_reference(&text).unwrap(),
            (ObjectKind::Dataset, id)
        );
    }

    #[test]
    fn reference_without_separator() {
        assert!(matches!(
            ObjectKind::parse_reference("datasets"),
            Err(TypeError::InvalidReference(_))
        ));
    }

    #[test]
    fn display() {
        assert_eq!(ObjectKind::Datatype.to_string(), "datatype");
    }
}
