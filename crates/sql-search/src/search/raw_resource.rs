//! Encoding of raw resource bodies stored in the `RawResource` column.
//!
//! Bodies are UTF-16LE text without a byte order mark, gzip-compressed.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{BackendError, StorageError, StorageResult};

/// Decompresses and decodes a `RawResource` column value.
pub fn decode_raw_resource(bytes: &[u8]) -> StorageResult<String> {
    let mut decompressed = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut decompressed)
        .map_err(|e| internal(format!("failed to decompress raw resource: {}", e), e))?;

    if decompressed.len() % 2 != 0 {
        return Err(internal_message("raw resource is not valid UTF-16"));
    }
    let units: Vec<u16> = decompressed
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    let text = String::from_utf16(&units)
        .map_err(|e| internal(format!("raw resource is not valid UTF-16: {}", e), e))?;
    Ok(text.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(text))
}

/// Encodes a body the way [`decode_raw_resource`] expects it.
pub fn encode_raw_resource(text: &str) -> StorageResult<Vec<u8>> {
    let bytes: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&bytes)
        .map_err(|e| internal(format!("failed to compress raw resource: {}", e), e))?;
    encoder
        .finish()
        .map_err(|e| internal(format!("failed to compress raw resource: {}", e), e))
}

fn internal(
    message: String,
    source: impl std::error::Error + Send + Sync + 'static,
) -> StorageError {
    BackendError::Internal {
        backend_name: "sql-search".to_string(),
        message,
        source: Some(Box::new(source)),
    }
    .into()
}

fn internal_message(message: &str) -> StorageError {
    BackendError::Internal {
        backend_name: "sql-search".to_string(),
        message: message.to_string(),
        source: None,
    }
    .into()
}
