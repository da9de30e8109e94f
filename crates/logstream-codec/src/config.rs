use crate::Compression;

/// Whether (and how) a decoded/compressed body should be treated as a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputEncoding {
    #[default]
    Buffer,
    Base64,
}

/// Whether a decoded body should be JSON-parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonParseMode {
    True,
    False,
    /// Parse only when the body looks like a JSON object or array.
    #[default]
    Auto,
}

#[derive(Debug, Clone)]
pub struct CodecConfig {
    pub compression: Compression,
    pub output_encoding: OutputEncoding,
    pub json_parse: JsonParseMode,
    pub use_s3_for_large_items: bool,
    /// Bodies at or above this size (bytes) are offloaded to the blob store.
    pub large_item_threshold_bytes: usize,
    /// Keys retained inline (alongside the `@S3Item` sentinel) when the
    /// original body was a JSON object and got offloaded.
    pub non_s3_keys: Vec<String>,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            compression: Compression::default(),
            output_encoding: OutputEncoding::default(),
            json_parse: JsonParseMode::default(),
            use_s3_for_large_items: false,
            large_item_threshold_bytes: 400 * 1024,
            non_s3_keys: Vec::new(),
        }
    }
}
