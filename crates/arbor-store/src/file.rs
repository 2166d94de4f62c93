//! File-backed containers.
//!
//! On-disk format:
//! ```text
//! [8 bytes: magic "ARBORCT1"]
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload (bincode-serialized ContainerDocument)]
//! ```
//! The whole file is rewritten on flush, through a temporary file in the
//! same directory that is renamed over the original.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::container::{read_only_guard, Container, ContainerDocument};
use crate::error::{StoreError, StoreResult};

const MAGIC: &[u8; 8] = b"ARBORCT1";
const HEADER_SIZE: usize = 16;

/// How to open an existing container file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
    /// Read-write unless the file's permissions forbid writing.
    Auto,
}

/// Serialize a document with framing.
pub fn encode_document(doc: &ContainerDocument) -> StoreResult<Vec<u8>> {
    let payload = bincode::serialize(doc).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| StoreError::Serialization("container exceeds 4 GiB".into()))?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Parse a framed document, reporting why the bytes are not a container.
pub fn decode_document(bytes: &[u8]) -> Result<ContainerDocument, String> {
    if bytes.len() < HEADER_SIZE {
        return Err("too short".into());
    }
    if &bytes[..8] != MAGIC {
        return Err("bad magic".into());
    }
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[8..12]);
    let len = u32::from_le_bytes(word) as usize;
    word.copy_from_slice(&bytes[12..16]);
    let crc = u32::from_le_bytes(word);

    let payload = &bytes[HEADER_SIZE..];
    if payload.len() != len {
        return Err(format!("payload length {} does not match header {len}", payload.len()));
    }
    if crc32fast::hash(payload) != crc {
        return Err("checksum mismatch".into());
    }
    bincode::deserialize(payload).map_err(|e| e.to_string())
}

/// Whether the file at `path` is a readable, intact container.
pub fn is_container(path: &Path) -> bool {
    fs::read(path)
        .map(|bytes| decode_document(&bytes).is_ok())
        .unwrap_or(false)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

/// Container persisted as a single file.
pub struct FileContainer {
    path: PathBuf,
    document: ContainerDocument,
    read_only: bool,
}

impl FileContainer {
    /// Create a new container file holding an empty root group.
    pub fn create(path: &Path) -> StoreResult<Self> {
        if path.exists() {
            return Err(StoreError::ContainerExists(path.to_path_buf()));
        }
        let document = ContainerDocument::new();
        write_atomic(path, &encode_document(&document)?)?;
        debug!(path = %path.display(), "container created");
        Ok(Self {
            path: path.to_path_buf(),
            document,
            read_only: false,
        })
    }

    /// Open an existing container file.
    pub fn open(path: &Path, mode: OpenMode) -> StoreResult<Self> {
        let bytes = fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::ContainerNotFound(path.to_path_buf()),
            _ => StoreError::Io(e),
        })?;
        let document = decode_document(&bytes).map_err(|reason| StoreError::CorruptContainer {
            path: path.to_path_buf(),
            reason,
        })?;

        let writable = !fs::metadata(path)?.permissions().readonly();
        let read_only = match mode {
            OpenMode::ReadOnly => true,
            OpenMode::ReadWrite if !writable => return Err(StoreError::ReadOnly),
            OpenMode::ReadWrite => false,
            OpenMode::Auto => !writable,
        };
        debug!(path = %path.display(), read_only, objects = document.len(), "container opened");
        Ok(Self {
            path: path.to_path_buf(),
            document,
            read_only,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Container for FileContainer {
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
        if self.read_only {
            return Ok(());
        }
        let bytes = encode_document(&self.document)?;
        write_atomic(&self.path, &bytes)?;
        debug!(path = %self.path.display(), len = bytes.len(), "container flushed");
        Ok(())
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

impl std::fmt::Debug for FileContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileContainer")
            .field("path", &self.path)
            .field("read_only", &self.read_only)
            .finish()
    }
}
