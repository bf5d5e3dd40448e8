//! Wire messages for the chunked-transfer upload protocol.
//!
//! Every text message on the duplex connection is a JSON envelope
//! `{"type": ..., "payload": ...}`; raw file chunks travel as binary frames
//! with no envelope. The receiver decodes the payload against an
//! expected-type allowlist for the current protocol phase — anything outside
//! that allowlist is a fatal protocol error for the connection.
//!
//! ```text
//! client → server: UploadRequest, Ack, Pause, Cancel, Error, <binary chunk>
//! server → client: UploadConfig, ChunkAck, AllDone, Error
//! ```

use serde::{Deserialize, Serialize};

// ---

use inflow_domain::{InflowError, Result};

// ---------------------------------------------------------------------------
// WireMsg
// ---------------------------------------------------------------------------

/// One decoded text envelope.
///
/// Field names follow the wire protocol's casing, not Rust's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum WireMsg {
    // ---
    /// First message from the client: which upload, how many bytes total.
    UploadRequest {
        id: String,
        #[serde(rename = "totalLength")]
        total_length: u64,
    },

    /// Transfer parameters sent back to the client before the chunk loop.
    ///
    /// `sendAheadCount` is advisory pipelining depth — the sender may be
    /// that many chunks ahead of acknowledgements; the server acks every
    /// chunk individually regardless.
    UploadConfig {
        #[serde(rename = "chunkSizeKB")]
        chunk_size_kb: u32,
        #[serde(rename = "resumeFromOffset")]
        resume_from_offset: u64,
        #[serde(rename = "sendAheadCount")]
        send_ahead_count: u32,
    },

    /// Client's go/no-go after receiving the config.
    Ack { ack: bool },

    /// Per-chunk acknowledgement, carrying the accepted chunk's size.
    ChunkAck { size: u64 },

    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<u32>,
        msg: String,
    },

    Cancel { reason: String },

    Pause { pause: bool },

    AllDone { success: bool },
}

// ---------------------------------------------------------------------------
// encode / decode
// ---------------------------------------------------------------------------

/// Serialize `msg` into its JSON envelope.
pub fn encode(msg: &WireMsg) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| InflowError::Protocol(format!("encode envelope: {e}")))
}

// ---

/// Decode one JSON envelope. Unknown types and malformed payloads are
/// protocol errors.
pub fn decode(text: &str) -> Result<WireMsg> {
    serde_json::from_str(text).map_err(|e| InflowError::Protocol(format!("bad envelope: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---

    #[test]
    fn upload_request_round_trip() {
        let original = WireMsg::UploadRequest {
            id: "abc".into(),
            total_length: 4096,
        };
        let text = encode(&original).unwrap();
        assert!(text.contains("\"totalLength\":4096"), "wire casing: {text}");
        assert_eq!(decode(&text).unwrap(), original);
    }

    // ---

    #[test]
    fn upload_config_uses_wire_casing() {
        let text = encode(&WireMsg::UploadConfig {
            chunk_size_kb: 64,
            resume_from_offset: 1024,
            send_ahead_count: 2,
        })
        .unwrap();
        assert!(text.contains("\"chunkSizeKB\":64"));
        assert!(text.contains("\"resumeFromOffset\":1024"));
        assert!(text.contains("\"sendAheadCount\":2"));
    }

    // ---

    #[test]
    fn error_without_code_omits_field() {
        let text = encode(&WireMsg::Error {
            code: None,
            msg: "nope".into(),
        })
        .unwrap();
        assert!(!text.contains("code"), "{text}");
        let decoded = decode(&text).unwrap();
        assert_eq!(
            decoded,
            WireMsg::Error {
                code: None,
                msg: "nope".into()
            }
        );
    }

    // ---

    #[test]
    fn unknown_type_rejected() {
        let err = decode(r#"{"type":"SelfDestruct","payload":{}}"#).unwrap_err();
        assert!(err.to_string().contains("bad envelope"));
    }

    // ---

    #[test]
    fn garbage_rejected() {
        assert!(decode("not json at all").is_err());
        assert!(decode(r#"{"type":"Ack"}"#).is_err()); // payload missing
    }
}
