/// Default gzip level used when compression is requested.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Default cap on the size of a decompressed record (64 MiB).
pub const DEFAULT_MAX_DECODED_LEN: usize = 64 * 1024 * 1024;

/// Options for [`EnvelopeCodec`](crate::EnvelopeCodec).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecConfig {
    /// Gzip level, 0 (store) to 9 (best). Larger values are clamped to 9.
    pub compression_level: u32,
    /// Largest decompressed record accepted on decode.
    pub max_decoded_len: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            max_decoded_len: DEFAULT_MAX_DECODED_LEN,
        }
    }
}
