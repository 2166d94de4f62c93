use crate::container::{read_only_guard, Container, ContainerDocument};
use crate::error::StoreResult;

/// Container held entirely in memory.
///
/// Intended for tests and embedding. `flush` is a no-op; the document can
/// be taken back out with [`InMemoryContainer::into_document`].
pub struct InMemoryContainer {
    document: ContainerDocument,
    read_only: bool,
}

impl InMemoryContainer {
    /// A writable container holding an empty root group.
    pub fn new() -> Self {
        Self::from_document(ContainerDocument::new())
    }

    pub fn from_document(document: ContainerDocument) -> Self {
        Self { document, read_only: false }
    }

    /// Wrap a document for read-only access.
    pub fn read_only(document: ContainerDocument) -> Self {
        Self { document, read_only: true }
    }

    pub fn into_document(self) -> ContainerDocument {
        self.document
    }
}

impl Default for InMemoryContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl Container for InMemoryContainer {
    fn document(&self) -> &ContainerDocument {
        &self.document
    }

    fn document_mut(&mut self) -> StoreResult<&mut ContainerDocument> {
        read_only_guard(self.read_only)?;
        Ok(&mut self.document)
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn flush(&mut self) -> StoreResult<()> {
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryContainer")
            .field("object_count", &self.document.len())
            .field("read_only", &self.read_only)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ObjectBody;
    use crate::error::StoreError;

    #[test]
    fn writable_container_allows_mutation() {
        let mut c = InMemoryContainer::new();
        let addr = c.document_mut().unwrap().insert(ObjectBody::empty_group());
        assert!(c.document().get(addr).is_some());
        assert!(!c.is_read_only());
    }

    #[test]
    fn read_only_container_refuses_mutation() {
        let mut c = InMemoryContainer::read_only(ContainerDocument::new());
        assert!(c.is_read_only());
        assert!(matches!(c.document_mut(), Err(StoreError::ReadOnly)));
        assert!(c.flush().is_ok());
    }

    #[test]
    fn into_document_returns_contents() {
        let mut c = InMemoryContainer::new();
        c.document_mut().unwrap().set_metadata("k", vec![9]);
        let doc = c.into_document();
        assert_eq!(doc.metadata("k"), Some(&[9u8][..]));
    }
}
