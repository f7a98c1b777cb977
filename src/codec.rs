//! Codec Module
//!
//! Serializes values to the byte payloads held by cache entries, with an
//! optional deflate step. The strategy is chosen at configuration time and
//! stays fixed for the lifetime of a cache; snapshots record it so a warm
//! boot under a different strategy is refused.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

// == Strategy ==
/// Serialization strategy for cache payloads.
///
/// All three strategies are self-describing, so any payload can be decoded
/// back to a `serde_json::Value` for snapshotting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// serde_json (default)
    Json,
    /// MessagePack with named fields
    Binary,
    /// simd-json
    FastJson,
}

impl Strategy {
    /// Stable identifier recorded in snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Json => "json",
            Strategy::Binary => "binary",
            Strategy::FastJson => "fast-json",
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(Strategy::Json),
            "binary" => Ok(Strategy::Binary),
            "fast-json" => Ok(Strategy::FastJson),
            other => Err(CacheError::InvalidConfig(format!(
                "unknown serializer '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Codec ==
/// Encoder/decoder pair for one cache instance.
///
/// `compress` reflects the current configuration; entries remember whether
/// their own payload was deflated, so toggling compression live never
/// invalidates stored data.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    strategy: Strategy,
    compress: bool,
}

impl Codec {
    pub fn new(strategy: Strategy, compress: bool) -> Self {
        Self { strategy, compress }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Whether payloads produced by [`Codec::encode`] are deflated.
    pub fn compression_enabled(&self) -> bool {
        self.compress
    }

    // == Encode ==
    /// Serializes a value, deflating the result when compression is on.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let raw = match self.strategy {
            Strategy::Json => {
                serde_json::to_vec(value).map_err(|e| CacheError::Encode(e.to_string()))?
            }
            Strategy::Binary => {
                rmp_serde::to_vec_named(value).map_err(|e| CacheError::Encode(e.to_string()))?
            }
            Strategy::FastJson => {
                simd_json::to_vec(value).map_err(|e| CacheError::Encode(e.to_string()))?
            }
        };

        if self.compress {
            deflate(&raw)
        } else {
            Ok(raw)
        }
    }

    // == Decode ==
    /// Deserializes a payload.
    ///
    /// `compressed` is the flag recorded on the entry at write time, not the
    /// current configuration.
    pub fn decode<T: DeserializeOwned>(&self, payload: &[u8], compressed: bool) -> Result<T> {
        let raw;
        let bytes: &[u8] = if compressed {
            raw = inflate(payload)?;
            &raw
        } else {
            payload
        };

        match self.strategy {
            Strategy::Json => {
                serde_json::from_slice(bytes).map_err(|e| CacheError::Decode(e.to_string()))
            }
            Strategy::Binary => {
                rmp_serde::from_slice(bytes).map_err(|e| CacheError::Decode(e.to_string()))
            }
            Strategy::FastJson => {
                // simd-json parses in place and needs a mutable buffer
                let mut buf = bytes.to_vec();
                simd_json::from_slice(&mut buf).map_err(|e| CacheError::Decode(e.to_string()))
            }
        }
    }
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| CacheError::Encode(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| CacheError::Encode(e.to_string()))
}

fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CacheError::Decode(e.to_string()))?;
    Ok(out)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[derive(Debug, PartialEq, Serialize, serde::Deserialize)]
    struct User {
        name: String,
        logins: u32,
    }

    fn sample() -> User {
        User {
            name: "Alice".to_string(),
            logins: 7,
        }
    }

    #[test]
    fn test_json_roundtrip() {
        let codec = Codec::new(Strategy::Json, false);
        let bytes = codec.encode(&sample()).unwrap();
        let back: User = codec.decode(&bytes, false).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn test_binary_roundtrip() {
        let codec = Codec::new(Strategy::Binary, false);
        let bytes = codec.encode(&sample()).unwrap();
        let back: User = codec.decode(&bytes, false).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn test_fast_json_roundtrip() {
        let codec = Codec::new(Strategy::FastJson, false);
        let bytes = codec.encode(&sample()).unwrap();
        let back: User = codec.decode(&bytes, false).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn test_binary_decodes_to_value() {
        // Named-field encoding keeps struct payloads readable as maps,
        // which snapshotting depends on.
        let codec = Codec::new(Strategy::Binary, false);
        let bytes = codec.encode(&sample()).unwrap();
        let value: Value = codec.decode(&bytes, false).unwrap();
        assert_eq!(value, json!({"name": "Alice", "logins": 7}));
    }

    #[test]
    fn test_compressed_roundtrip() {
        let codec = Codec::new(Strategy::Json, true);
        let value = json!({"text": "a".repeat(4096)});
        let bytes = codec.encode(&value).unwrap();
        let back: Value = codec.decode(&bytes, true).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_compression_shrinks_repetitive_payloads() {
        let value = json!({"text": "a".repeat(4096)});
        let plain = Codec::new(Strategy::Json, false).encode(&value).unwrap();
        let packed = Codec::new(Strategy::Json, true).encode(&value).unwrap();
        assert!(packed.len() < plain.len());
    }

    #[test]
    fn test_decode_garbage_fails() {
        let codec = Codec::new(Strategy::Json, false);
        let result: Result<Value> = codec.decode(b"not json at all", false);
        assert!(matches!(result, Err(CacheError::Decode(_))));
    }

    #[test]
    fn test_inflate_garbage_fails() {
        let codec = Codec::new(Strategy::Json, false);
        let result: Result<Value> = codec.decode(b"\x00\x01\x02", true);
        assert!(matches!(result, Err(CacheError::Decode(_))));
    }

    #[test]
    fn test_strategy_identifiers() {
        assert_eq!(Strategy::Json.as_str(), "json");
        assert_eq!(Strategy::Binary.as_str(), "binary");
        assert_eq!(Strategy::FastJson.as_str(), "fast-json");
        assert_eq!("fast-json".parse::<Strategy>().unwrap(), Strategy::FastJson);
        assert!("yaml".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_strategy_serde_tags() {
        assert_eq!(
            serde_json::to_string(&Strategy::FastJson).unwrap(),
            "\"fast-json\""
        );
        let parsed: Strategy = serde_json::from_str("\"binary\"").unwrap();
        assert_eq!(parsed, Strategy::Binary);
    }
}
