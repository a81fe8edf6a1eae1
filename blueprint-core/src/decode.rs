//! Payload decoding.
//!
//! The cache does not interpret blueprint payloads. A [`PayloadDecoder`]
//! turns the raw bytes of a source into the payload stored in the record, and
//! its failure is what moves a record to [`LoadState::Error`](crate::LoadState::Error).
//!
//! Two decoders are provided:
//!
//! - [`RawDecoder`] - accepts any non-empty input as is
//! - [`ZlibDecoder`] - inflates zlib-compressed input (feature `zlib`)

use std::sync::Arc;

use thiserror::Error;

use crate::Payload;

/// Failure to decode a raw payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Nothing to decode.
    #[error("payload is empty")]
    Empty,
    /// Decoded payload exceeds the configured limit.
    #[error("decoded payload exceeds {limit} bytes")]
    TooLarge {
        /// The limit in bytes.
        limit: usize,
    },
    /// The input is not in the expected format.
    #[error("malformed payload: {0}")]
    Malformed(#[source] std::io::Error),
    /// Error raised by a custom decoder.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Turns raw source bytes into a loaded payload.
///
/// Decoding runs synchronously: inline for embedded data, inside the load
/// task for URL sources.
pub trait PayloadDecoder: Send + Sync {
    /// Decode `raw` into the payload stored in the record.
    fn decode(&self, raw: Payload) -> Result<Payload, DecodeError>;
}

impl<T> PayloadDecoder for Arc<T>
where
    T: PayloadDecoder + ?Sized,
{
    fn decode(&self, raw: Payload) -> Result<Payload, DecodeError> {
        self.as_ref().decode(raw)
    }
}

impl<T> PayloadDecoder for Box<T>
where
    T: PayloadDecoder + ?Sized,
{
    fn decode(&self, raw: Payload) -> Result<Payload, DecodeError> {
        self.as_ref().decode(raw)
    }
}

/// Stores raw bytes unchanged, rejecting empty input.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDecoder;

impl PayloadDecoder for RawDecoder {
    fn decode(&self, raw: Payload) -> Result<Payload, DecodeError> {
        if raw.is_empty() {
            return Err(DecodeError::Empty);
        }
        Ok(raw)
    }
}

/// Inflates zlib-compressed payloads.
///
/// ```
/// use std::io::Write;
///
/// use blueprint_core::{PayloadDecoder, ZlibDecoder};
/// use bytes::Bytes;
/// use flate2::{Compression, write::ZlibEncoder};
///
/// let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
/// encoder.write_all(b"blueprint").unwrap();
/// let raw = Bytes::from(encoder.finish().unwrap());
///
/// let payload = ZlibDecoder::default().decode(raw).unwrap();
/// assert_eq!(&payload[..], b"blueprint");
///
/// assert!(ZlibDecoder::default().decode(Bytes::from_static(b"not zlib")).is_err());
/// ```
#[cfg(feature = "zlib")]
#[derive(Debug, Clone, Copy)]
pub struct ZlibDecoder {
    limit: usize,
}

#[cfg(feature = "zlib")]
impl ZlibDecoder {
    /// Default limit on the inflated size: 16 MiB.
    pub const DEFAULT_LIMIT: usize = 16 * 1024 * 1024;

    /// Creates a decoder refusing to inflate more than `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self { limit }
    }

    /// The inflated size limit in bytes.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

#[cfg(feature = "zlib")]
impl Default for ZlibDecoder {
    fn default() -> Self {
        Self::with_limit(Self::DEFAULT_LIMIT)
    }
}

#[cfg(feature = "zlib")]
impl PayloadDecoder for ZlibDecoder {
    fn decode(&self, raw: Payload) -> Result<Payload, DecodeError> {
        use std::io::Read;

        if raw.is_empty() {
            return Err(DecodeError::Empty);
        }

        let mut inflated = Vec::new();
        flate2::read::ZlibDecoder::new(&raw[..])
            .take(self.limit as u64 + 1)
            .read_to_end(&mut inflated)
            .map_err(DecodeError::Malformed)?;

        if inflated.len() > self.limit {
            return Err(DecodeError::TooLarge { limit: self.limit });
        }
        if inflated.is_empty() {
            return Err(DecodeError::Empty);
        }
        Ok(Payload::from(inflated))
    }
}
