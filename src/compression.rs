//! Payload framing for transit.
//!
//! Events are serialized to JSON, deflated with zlib and base64-encoded.
//! The resulting ASCII bytes are what goes into the HTTP body or the UDP
//! datagram.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use serde::{de::DeserializeOwned, Serialize};
use std::io::{Read, Write};
use thiserror::Error;

/// Compression errors.
#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("Compression failed: {0}")]
    CompressionFailed(#[from] std::io::Error),

    #[error("Base64 decode failed: {0}")]
    Base64DecodeFailed(#[from] base64::DecodeError),

    #[error("JSON serialization failed: {0}")]
    JsonFailed(#[from] serde_json::Error),
}

/// Serializes a value to JSON, deflates it and base64-encodes the result.
///
/// # Example
///
/// ```
/// use raven::compression::{decode_payload, encode_payload};
///
/// let body = encode_payload(&serde_json::json!({"message": "Hey!"})).unwrap();
/// let decoded: serde_json::Value = decode_payload(&body).unwrap();
/// assert_eq!(decoded["message"], "Hey!");
/// ```
pub fn encode_payload<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CompressionError> {
    let json = serde_json::to_vec(value)?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;

    Ok(BASE64.encode(compressed).into_bytes())
}

/// Reverses [`encode_payload`].
pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T, CompressionError> {
    let trimmed = payload.trim_ascii();
    let compressed = BASE64.decode(trimmed)?;

    let mut decoder = ZlibDecoder::new(&compressed[..]);
    let mut json = Vec::new();
    decoder.read_to_end(&mut json)?;

    Ok(serde_json::from_slice(&json)?)
}
