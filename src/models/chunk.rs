//! Represents one binary segment of a stored file.

use crate::models::FileId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One chunk of a stored file, persisted in `<bucket>.chunks`.
///
/// Every chunk of a file carries exactly `chunk_size` bytes except possibly
/// the final one. Chunk indices for a given `files_id` are dense and
/// zero-based; the download path enforces both properties.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChunkRecord {
    /// Chunk-local identifier, independent of the file id.
    #[serde(rename = "_id")]
    pub id: Uuid,

    /// Back-reference to the owning `FileRecord`. No chunk exists without a
    /// file id, though orphaned chunks are tolerated as invisible garbage.
    pub files_id: FileId,

    /// Zero-based sequential index, unique per `files_id`.
    pub n: u32,

    /// Raw bytes, base64-encoded in document form.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Serde adapter encoding chunk payloads as base64 strings.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&general_purpose::STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(D::Error::custom)
    }
}
