//! On-disk store with one checksummed file per entry.
//!
//! Each entry lives at `<dir>/entries/<store_id>.entry`. The file starts with
//! a 4-byte little-endian header length, then a bincode header (magic bytes,
//! format version, the key's string form, and a payload checksum), then the
//! bincode-encoded [`CachedResponse`]. Files are written to a temporary name
//! and renamed into place so readers never see a partial entry.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strata_common::ContentHash;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::key::PipelineCacheKey;
use crate::response::CachedResponse;
use crate::store::CacheStore;

/// Magic bytes identifying a strata cache entry.
const ENTRY_MAGIC: [u8; 4] = *b"STRA";

/// Current entry format version. Increment on breaking changes to the
/// header or payload format.
const ENTRY_FORMAT_VERSION: u32 = 1;

const ENTRIES_SUBDIR: &str = "entries";
const ENTRY_EXT: &str = "entry";

/// Header prepended to every entry file for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryHeader {
    magic: [u8; 4],
    format_version: u32,
    /// Full string form of the key, guarding against id collisions.
    key: String,
    checksum: ContentHash,
}

/// Store persisting entries as files under a cache directory.
pub struct FileStore {
    entries_dir: PathBuf,
}

impl FileStore {
    /// Opens (creating if needed) a store rooted at `cache_dir`.
    pub fn open(cache_dir: &Path) -> Result<Self, CacheError> {
        let entries_dir = cache_dir.join(ENTRIES_SUBDIR);
        std::fs::create_dir_all(&entries_dir).map_err(|e| CacheError::Io {
            path: entries_dir.clone(),
            source: e,
        })?;
        Ok(Self { entries_dir })
    }

    /// Returns the file path for the entry stored under `key`.
    pub fn entry_path(&self, key: &PipelineCacheKey) -> PathBuf {
        self.entries_dir
            .join(format!("{}.{ENTRY_EXT}", key.store_id()))
    }

    /// Reads and validates the entry for `key`.
    ///
    /// `Ok(None)` means no file exists; any corruption is an error.
    pub fn read_entry(&self, key: &PipelineCacheKey) -> Result<Option<CachedResponse>, CacheError> {
        let path = self.entry_path(key);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::Io { path, source: e }),
        };

        let invalid = |reason: &str| CacheError::InvalidHeader {
            path: path.clone(),
            reason: reason.to_string(),
        };

        if raw.len() < 4 {
            return Err(invalid("truncated header length"));
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&raw[..4]);
        let header_len = u32::from_le_bytes(len_bytes) as usize;
        if raw.len() < 4 + header_len {
            return Err(invalid("truncated header"));
        }

        let (header, _): (EntryHeader, usize) =
            bincode::serde::decode_from_slice(&raw[4..4 + header_len], bincode::config::standard())
                .map_err(|e| invalid(&e.to_string()))?;

        if header.magic != ENTRY_MAGIC {
            return Err(invalid("missing magic bytes"));
        }
        if header.format_version != ENTRY_FORMAT_VERSION {
            return Err(CacheError::VersionMismatch {
                path: path.clone(),
                expected: ENTRY_FORMAT_VERSION,
                actual: header.format_version,
            });
        }
        if header.key != key.to_string() {
            return Err(invalid("entry belongs to a different key"));
        }

        let payload = &raw[4 + header_len..];
        let actual = ContentHash::from_bytes(payload);
        if actual != header.checksum {
            return Err(CacheError::ChecksumMismatch {
                path,
                expected: header.checksum.to_string(),
                actual: actual.to_string(),
            });
        }

        let (response, _): (CachedResponse, usize) =
            bincode::serde::decode_from_slice(payload, bincode::config::standard()).map_err(
                |e| CacheError::Serialization {
                    reason: e.to_string(),
                },
            )?;
        Ok(Some(response))
    }

    /// Encodes and atomically writes the entry for `key`.
    pub fn write_entry(
        &self,
        key: &PipelineCacheKey,
        response: &CachedResponse,
    ) -> Result<PathBuf, CacheError> {
        let encode_err = |e: bincode::error::EncodeError| CacheError::Serialization {
            reason: e.to_string(),
        };
        let payload = bincode::serde::encode_to_vec(response, bincode::config::standard())
            .map_err(encode_err)?;
        let header = EntryHeader {
            magic: ENTRY_MAGIC,
            format_version: ENTRY_FORMAT_VERSION,
            key: key.to_string(),
            checksum: ContentHash::from_bytes(&payload),
        };
        let header_bytes =
            bincode::serde::encode_to_vec(&header, bincode::config::standard()).map_err(encode_err)?;

        let header_len = header_bytes.len() as u32;
        let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(&payload);

        let path = self.entry_path(key);
        let tmp = path.with_extension(format!("{ENTRY_EXT}.tmp"));
        std::fs::write(&tmp, &output).map_err(|e| CacheError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| CacheError::Io {
            path: path.clone(),
            source: e,
        })?;
        Ok(path)
    }
}

impl CacheStore for FileStore {
    fn get(&self, key: &PipelineCacheKey) -> Option<CachedResponse> {
        match self.read_entry(key) {
            Ok(found) => found,
            Err(e) => {
                debug!(key = %key, error = %e, "unreadable cache entry treated as miss");
                None
            }
        }
    }

    fn store(&self, key: &PipelineCacheKey, response: CachedResponse) -> Result<(), CacheError> {
        self.write_entry(key, &response).map(|_| ())
    }

    fn remove(&self, key: &PipelineCacheKey) {
        let path = self.entry_path(key);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "failed to remove cache entry");
            }
        }
    }

    fn clear(&self) -> Result<(), CacheError> {
        let io_err = |e| CacheError::Io {
            path: self.entries_dir.clone(),
            source: e,
        };
        std::fs::remove_dir_all(&self.entries_dir).map_err(io_err)?;
        std::fs::create_dir_all(&self.entries_dir).map_err(io_err)
    }
}
