//! Frame encoding for the request channel.
//!
//! Text frames carry JSON; binary frames carry named `MsgPack`
//! (`rmp_serde::to_vec_named()`), so field names survive either way and an
//! inbound frame can always be decoded from its own frame type.

use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Errors from encoding or decoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("msgpack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),
    #[error("msgpack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
}

/// Serialization used for outbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// JSON text frames.
    #[default]
    Json,
    /// Named `MsgPack` binary frames.
    MsgPack,
}

impl FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "msgpack" => Ok(Self::MsgPack),
            other => Err(format!("unknown wire format: {other} (expected json or msgpack)")),
        }
    }
}

/// One encoded message as it travels on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    /// Payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Binary(b) => b.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Encodes `value` in the given wire format.
///
/// # Errors
///
/// Returns a [`CodecError`] if the value cannot be serialized.
pub fn encode<T: Serialize>(value: &T, format: WireFormat) -> Result<Frame, CodecError> {
    match format {
        WireFormat::Json => Ok(Frame::Text(serde_json::to_string(value)?)),
        WireFormat::MsgPack => Ok(Frame::Binary(rmp_serde::to_vec_named(value)?)),
    }
}

/// Decodes a frame according to its own frame type.
///
/// # Errors
///
/// Returns a [`CodecError`] if the payload is malformed.
pub fn decode<T: DeserializeOwned>(frame: &Frame) -> Result<T, CodecError> {
    match frame {
        Frame::Text(text) => Ok(serde_json::from_str(text)?),
        Frame::Binary(bytes) => Ok(rmp_serde::from_slice(bytes)?),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
