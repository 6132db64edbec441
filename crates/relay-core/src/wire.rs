//! StreamChat wire format.
//!
//! A request body is one Connect envelope:
//!
//!   [flags: u8][length: u32 big-endian][payload: length bytes]
//!
//! where the payload is a protobuf-encoded `StreamChatRequest`. The message
//! types below mirror the backend schema; tags and the fixed field values
//! are what the official client sends. Changing a tag breaks the backend's
//! decoding silently.

use bytes::{BufMut, Bytes, BytesMut};
use prost::Message;
use uuid::Uuid;

use crate::chat::{ChatRequest, ChatRole};

// ── Schema ────────────────────────────────────────────────────────────────────

/// Role as the backend encodes it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Role {
    Unspecified = 0,
    User = 1,
    Assistant = 2,
}

impl From<ChatRole> for Role {
    fn from(role: ChatRole) -> Self {
        match role {
            ChatRole::User => Role::User,
            ChatRole::Other => Role::Assistant,
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UserMessage {
    #[prost(string, tag = "1")]
    pub content: String,
    #[prost(enumeration = "Role", tag = "2")]
    pub role: i32,
    #[prost(string, tag = "13")]
    pub message_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ModelSpec {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "4")]
    pub reserved: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StreamChatRequest {
    #[prost(message, repeated, tag = "2")]
    pub messages: Vec<UserMessage>,
    #[prost(string, tag = "4")]
    pub field_4: String,
    #[prost(message, optional, tag = "7")]
    pub model: Option<ModelSpec>,
    #[prost(int32, tag = "13")]
    pub field_13: i32,
    #[prost(string, tag = "15")]
    pub conversation_id: String,
    #[prost(int32, tag = "16")]
    pub field_16: i32,
    #[prost(int32, tag = "29")]
    pub field_29: i32,
    #[prost(int32, tag = "30")]
    pub field_30: i32,
}

// ── Constants ─────────────────────────────────────────────────────────────────

/// Envelope header size: one flag byte plus a u32 length.
pub const HEADER_LEN: usize = 5;

/// Flag byte for an uncompressed message. The only kind this relay sends.
pub const FLAG_MESSAGE: u8 = 0x00;

/// Flag bit marking the trailing end-of-stream envelope.
pub const FLAG_END_STREAM: u8 = 0x02;

/// Length of the routing prefix on incoming model names (`cursor/`).
pub const MODEL_PREFIX_LEN: usize = 7;

// ── Envelope ──────────────────────────────────────────────────────────────────

/// One length-prefixed envelope. The length field is always the payload length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame {
    magic: u8,
    payload: Bytes,
}

impl WireFrame {
    pub fn new(magic: u8, payload: impl Into<Bytes>) -> Result<Self, FrameError> {
        let payload = payload.into();
        if u32::try_from(payload.len()).is_err() {
            return Err(FrameError::PayloadTooLarge(payload.len()));
        }
        Ok(Self { magic, payload })
    }

    pub fn magic(&self) -> u8 {
        self.magic
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Value of the header's length field.
    pub fn length(&self) -> u32 {
        // Bounded in `new`.
        self.payload.len() as u32
    }

    /// Header followed by payload, ready to send.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u8(self.magic);
        buf.put_u32(self.length());
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parse one envelope from the front of `buf`, returning it and the
    /// unconsumed remainder.
    pub fn decode(buf: &[u8]) -> Result<(Self, &[u8]), FrameError> {
        if buf.len() < HEADER_LEN {
            return Err(FrameError::Truncated {
                needed: HEADER_LEN,
                available: buf.len(),
            });
        }
        let magic = buf[0];
        let length = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        let body = &buf[HEADER_LEN..];
        if body.len() < length {
            return Err(FrameError::Truncated {
                needed: HEADER_LEN + length,
                available: buf.len(),
            });
        }
        let (payload, rest) = body.split_at(length);
        let frame = Self {
            magic,
            payload: Bytes::copy_from_slice(payload),
        };
        Ok((frame, rest))
    }
}

// ── Framing ───────────────────────────────────────────────────────────────────

/// Model name as the backend expects it: the routing prefix removed.
pub fn backend_model_name(model: &str) -> Result<&str, FrameError> {
    if model.len() < MODEL_PREFIX_LEN {
        return Err(FrameError::ModelName(model.to_owned()));
    }
    model
        .get(MODEL_PREFIX_LEN..)
        .ok_or_else(|| FrameError::PrefixBoundary(model.to_owned()))
}

/// Map a chat request onto the backend schema. Each call mints a new
/// conversation id and a new id for every message.
pub fn build_message(request: &ChatRequest) -> Result<StreamChatRequest, FrameError> {
    let messages = request
        .messages
        .iter()
        .map(|turn| UserMessage {
            content: turn.content.clone(),
            role: Role::from(turn.role) as i32,
            message_id: Uuid::new_v4().to_string(),
        })
        .collect();

    Ok(StreamChatRequest {
        messages,
        field_4: String::new(),
        model: Some(ModelSpec {
            name: backend_model_name(&request.model)?.to_owned(),
            reserved: String::new(),
        }),
        field_13: 1,
        conversation_id: Uuid::new_v4().to_string(),
        field_16: 1,
        field_29: 1,
        field_30: 0,
    })
}

/// Serialize a chat request into a single envelope.
pub fn frame_request(request: &ChatRequest) -> Result<WireFrame, FrameError> {
    let message = build_message(request)?;
    let mut payload = BytesMut::with_capacity(message.encoded_len());
    message.encode(&mut payload)?;
    WireFrame::new(FLAG_MESSAGE, payload.freeze())
}

/// Inverse of [`frame_request`]'s payload encoding.
pub fn decode_request(frame: &WireFrame) -> Result<StreamChatRequest, FrameError> {
    Ok(StreamChatRequest::decode(frame.payload.clone())?)
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("model name {0:?} is shorter than the {}-character routing prefix", MODEL_PREFIX_LEN)]
    ModelName(String),

    #[error("model name {0:?} has no character boundary after its {}-byte routing prefix", MODEL_PREFIX_LEN)]
    PrefixBoundary(String),

    #[error("protobuf serialization failed: {0}")]
    Serialization(#[from] prost::EncodeError),

    #[error("protobuf decoding failed: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("payload length {0} does not fit the u32 length field")]
    PayloadTooLarge(usize),

    #[error("truncated frame: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
