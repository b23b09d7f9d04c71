//! Chapter body codec.
//!
//! Bodies are stored zstd-compressed. Readers detect compression by the
//! zstd frame magic so bodies written as plain UTF-8 remain readable.

use crate::error::StorageError;

/// zstd frame magic number, little endian `0xFD2FB528`.
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

const COMPRESSION_LEVEL: i32 = 3;

pub fn is_compressed(data: &[u8]) -> bool {
    data.starts_with(&ZSTD_MAGIC)
}

pub fn compress(body: &str) -> Result<Vec<u8>, StorageError> {
    zstd::encode_all(body.as_bytes(), COMPRESSION_LEVEL)
        .map_err(|e| StorageError::Codec(format!("compress: {}", e)))
}

pub fn decompress(data: &[u8]) -> Result<String, StorageError> {
    let raw = if is_compressed(data) {
        zstd::decode_all(data).map_err(|e| StorageError::Codec(format!("decompress: {}", e)))?
    } else {
        data.to_vec()
    };
    String::from_utf8(raw).map_err(|e| StorageError::Codec(format!("invalid UTF-8: {}", e)))
}
