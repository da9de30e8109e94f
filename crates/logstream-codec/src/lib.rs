//! Encoding and decoding of individual log records (§4.8): compression, S3
//! large-item offload, partition-key derivation, and producer-side
//! aggregation de-bundling.

mod aggregate;
pub mod blob;
mod compression;
mod config;
mod decode;
mod encode;
mod error;
mod pb;

pub use aggregate::{deaggregate, DeaggregatedRecord};
pub use compression::Compression;
pub use config::{CodecConfig, JsonParseMode, OutputEncoding};
pub use decode::{decode, DecodedPayload, DecodedRecord, RawRecord};
pub use encode::{encode, EncodeRequest, EncodedRecord, RecordPayload};
pub use error::{Error, Result};
