//! Control-protocol message codes and CBOR framing.

use crate::error::{NetError, NetResult};
use bytes::Bytes;
use ciborium::value::Value;
use std::collections::BTreeMap;

/// Numeric control-message codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    OpenTcp = 0x70,
    OpenUdp = 0x71,
    ResolveDns = 0x72,
    GatewayOk = 0x73,
    GatewayFail = 0x74,
    GatewayClose = 0x75,
    InboundOpen = 0x76,
    InboundAccept = 0x77,
    InboundReject = 0x78,
    DnsResult = 0x79,
    ListenRequest = 0x7a,
    ListenOk = 0x7b,
    ListenFail = 0x7c,
    ListenClose = 0x7d,
    GatewayData = 0x7e,
}

impl MsgType {
    pub fn from_u8(code: u8) -> NetResult<Self> {
        Ok(match code {
            0x70 => MsgType::OpenTcp,
            0x71 => MsgType::OpenUdp,
            0x72 => MsgType::ResolveDns,
            0x73 => MsgType::GatewayOk,
            0x74 => MsgType::GatewayFail,
            0x75 => MsgType::GatewayClose,
            0x76 => MsgType::InboundOpen,
            0x77 => MsgType::InboundAccept,
            0x78 => MsgType::InboundReject,
            0x79 => MsgType::DnsResult,
            0x7a => MsgType::ListenRequest,
            0x7b => MsgType::ListenOk,
            0x7c => MsgType::ListenFail,
            0x7d => MsgType::ListenClose,
            0x7e => MsgType::GatewayData,
            other => return Err(NetError::Closed(format!("unknown control code {other:#x}"))),
        })
    }
}

/// A decoded control message: its type code plus a flat field map. Byte
/// fields (`data`, `token`, `signature`, `public_key`) are held as raw
/// `Vec<u8>` and round-trip through CBOR major type 2, never as arrays of
/// integers.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub fields: BTreeMap<String, Value>,
}

impl Frame {
    pub fn new(msg_type: MsgType) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("type".to_string(), Value::Integer((msg_type as u8).into()));
        Self { fields }
    }

    pub fn with_u64(mut self, key: &str, value: u64) -> Self {
        self.fields.insert(key.to_string(), Value::Integer(value.into()));
        self
    }

    pub fn with_str(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.insert(key.to_string(), Value::Text(value.into()));
        self
    }

    pub fn with_bytes(mut self, key: &str, value: impl Into<Vec<u8>>) -> Self {
        self.fields.insert(key.to_string(), Value::Bytes(value.into()));
        self
    }

    pub fn with_str_list(mut self, key: &str, values: impl IntoIterator<Item = String>) -> Self {
        self.fields.insert(
            key.to_string(),
            Value::Array(values.into_iter().map(Value::Text).collect()),
        );
        self
    }

    pub fn msg_type(&self) -> NetResult<MsgType> {
        match self.fields.get("type") {
            Some(Value::Integer(i)) => {
                let code: i128 = (*i).into();
                MsgType::from_u8(code as u8)
            }
            _ => Err(NetError::Closed("missing control-message type".into())),
        }
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.fields.get(key) {
            Some(Value::Integer(i)) => Some((*i).try_into().unwrap_or(0)),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(Value::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_bytes(&self, key: &str) -> Option<&[u8]> {
        match self.fields.get(key) {
            Some(Value::Bytes(b)) => Some(b),
            _ => None,
        }
    }

    pub fn get_str_list(&self, key: &str) -> Vec<String> {
        match self.fields.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| match v {
                    Value::Text(s) => Some(s.clone()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Encodes `frame` as a CBOR map preceded by a 4-byte big-endian length
/// prefix, ready to hand to a transport's single `write`.
pub fn encode_frame(frame: &Frame) -> NetResult<Bytes> {
    let value = Value::Map(
        frame
            .fields
            .iter()
            .map(|(k, v)| (Value::Text(k.clone()), v.clone()))
            .collect(),
    );
    let mut payload = Vec::new();
    ciborium::ser::into_writer(&value, &mut payload)
        .map_err(|e| NetError::Closed(format!("cbor encode failed: {e}")))?;
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&payload);
    Ok(Bytes::from(out))
}

/// Decodes a single length-prefixed CBOR frame from one transport chunk.
pub fn decode_frame(chunk: &[u8]) -> NetResult<Frame> {
    if chunk.len() < 4 {
        return Err(NetError::Closed("control frame shorter than length prefix".into()));
    }
    let len = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as usize;
    let payload = chunk
        .get(4..4 + len)
        .ok_or_else(|| NetError::Closed("control frame length mismatch".into()))?;
    let value: Value = ciborium::de::from_reader(payload)
        .map_err(|e| NetError::Closed(format!("cbor decode failed: {e}")))?;
    let Value::Map(entries) = value else {
        return Err(NetError::Closed("control frame is not a map".into()));
    };
    let mut fields = BTreeMap::new();
    for (k, v) in entries {
        if let Value::Text(key) = k {
            fields.insert(key, v);
        }
    }
    Ok(Frame { fields })
}
