use crate::{Error, Result};
use async_compression::tokio::write::{GzipDecoder, GzipEncoder, ZstdDecoder, ZstdEncoder};
use tokio::io::AsyncWriteExt;

/// Compression applied to an encoded record body before any S3 offload decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Zstd,
}

pub async fn compress(compression: Compression, body: &[u8]) -> Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(body.to_vec()),
        Compression::Gzip => {
            let mut encoder = GzipEncoder::new(Vec::new());
            encoder.write_all(body).await.map_err(Error::Compression)?;
            encoder.shutdown().await.map_err(Error::Compression)?;
            Ok(encoder.into_inner())
        }
        Compression::Zstd => {
            let mut encoder = ZstdEncoder::new(Vec::new());
            encoder.write_all(body).await.map_err(Error::Compression)?;
            encoder.shutdown().await.map_err(Error::Compression)?;
            Ok(encoder.into_inner())
        }
    }
}

pub async fn decompress(compression: Compression, body: &[u8]) -> Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(body.to_vec()),
        Compression::Gzip => {
            let mut decoder = GzipDecoder::new(Vec::new());
            decoder.write_all(body).await.map_err(Error::Compression)?;
            decoder.shutdown().await.map_err(Error::Compression)?;
            Ok(decoder.into_inner())
        }
        Compression::Zstd => {
            let mut decoder = ZstdDecoder::new(Vec::new());
            decoder.write_all(body).await.map_err(Error::Compression)?;
            decoder.shutdown().await.map_err(Error::Compression)?;
            Ok(decoder.into_inner())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn gzip_round_trips() {
        let original = b"the quick brown fox jumps over the lazy dog".repeat(8);
        let compressed = compress(Compression::Gzip, &original).await.unwrap();
        assert!(compressed.len() < original.len());
        let restored = decompress(Compression::Gzip, &compressed).await.unwrap();
        assert_eq!(restored, original);
    }

    #[tokio::test]
    async fn zstd_round_trips() {
        let original = b"the quick brown fox jumps over the lazy dog".repeat(8);
        let compressed = compress(Compression::Zstd, &original).await.unwrap();
        let restored = decompress(Compression::Zstd, &compressed).await.unwrap();
        assert_eq!(restored, original);
    }

    #[tokio::test]
    async fn none_is_a_no_op() {
        let original = b"passthrough".to_vec();
        let compressed = compress(Compression::None, &original).await.unwrap();
        assert_eq!(compressed, original);
    }
}
