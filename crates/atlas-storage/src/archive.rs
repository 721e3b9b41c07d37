//! Portable project archives.
//!
//! ```text
//! [magic "ATPA"][version u32][payload len u64][zstd(bincode(ProjectArchive))][crc32 u32]
//! ```
//!
//! All integers are big-endian. The CRC covers the compressed payload.

use atlas_types::ProjectInfo;
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

const MAGIC: &[u8; 4] = b"ATPA";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 8;
const TRAILER_LEN: usize = 4;
const COMPRESSION_LEVEL: i32 = 3;

/// Everything a backend stores for one project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectArchive {
    pub info: ProjectInfo,
    pub folders: Vec<String>,
    /// Blobs and sidecars by path.
    pub files: Vec<(String, Vec<u8>)>,
    pub values: Vec<(String, Vec<u8>)>,
}

impl ProjectArchive {
    pub fn to_bytes(&self) -> StorageResult<Vec<u8>> {
        let raw = bincode::serialize(self)
            .map_err(|e| StorageError::exception(format!("archive encode failed: {e}")))?;
        let payload = zstd::encode_all(raw.as_slice(), COMPRESSION_LEVEL)
            .map_err(|e| StorageError::exception(format!("archive compression failed: {e}")))?;

        let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + TRAILER_LEN);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_be_bytes());
        out.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        out.extend_from_slice(&payload);
        out.extend_from_slice(&crc32fast::hash(&payload).to_be_bytes());
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> StorageResult<Self> {
        let corrupt = |reason: &str| StorageError::exception(format!("corrupt archive: {reason}"));

        if bytes.len() < HEADER_LEN + TRAILER_LEN {
            return Err(corrupt("truncated header"));
        }
        if &bytes[..4] != MAGIC {
            return Err(corrupt("bad magic"));
        }
        let version = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != VERSION {
            return Err(corrupt(&format!("unsupported version {version}")));
        }
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&bytes[8..HEADER_LEN]);
        let payload_len = u64::from_be_bytes(len_bytes) as usize;
        if bytes.len() != HEADER_LEN + payload_len + TRAILER_LEN {
            return Err(corrupt("length mismatch"));
        }

        let payload = &bytes[HEADER_LEN..HEADER_LEN + payload_len];
        let trailer = &bytes[HEADER_LEN + payload_len..];
        let expected = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        if crc32fast::hash(payload) != expected {
            return Err(corrupt("checksum mismatch"));
        }

        let raw = zstd::decode_all(payload).map_err(|e| corrupt(&e.to_string()))?;
        bincode::deserialize(&raw).map_err(|e| corrupt(&e.to_string()))
    }
}
