//! Gzip wrapping of the serialized record.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{DecodingError, EncodingError};

/// First two bytes of every gzip stream.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Highest gzip compression level.
const MAX_LEVEL: u32 = 9;

/// Whether `data` starts with the gzip magic number.
pub fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(&GZIP_MAGIC)
}

/// Gzip `data` at `level` (0-9, larger values are clamped to 9).
pub fn gzip(data: &[u8], level: u32) -> Result<Vec<u8>, EncodingError> {
    let mut encoder = GzEncoder::new(
        Vec::with_capacity(data.len() / 2 + 32),
        Compression::new(level.min(MAX_LEVEL)),
    );
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Gunzip `data`, refusing output larger than `max_len` bytes.
pub fn gunzip(data: &[u8], max_len: usize) -> Result<Vec<u8>, DecodingError> {
    let limit = u64::try_from(max_len).unwrap_or(u64::MAX).saturating_add(1);
    let mut decoder = GzDecoder::new(data).take(limit);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| DecodingError::CorruptEnvelope(format!("gzip: {}", e)))?;

    if out.len() > max_len {
        return Err(DecodingError::CorruptEnvelope(format!(
            "decompressed record exceeds {} bytes",
            max_len
        )));
    }
    Ok(out)
}
