use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::protocol::ReplyBody;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Request,
    Reply,
    /// First frame on a bridged socket: `reply_to` is the address the
    /// gateway assigned to that socket
    Attached,
}

/// One message on the bus.
///
/// A reply mirrors its request: same operation, same correlation id, same
/// reply target. Only the kind and the payload change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: EnvelopeKind,
    pub operation: String,
    pub correlation_id: String,
    pub reply_to: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn request(operation: &str, correlation_id: &str, reply_to: &str, payload: Value) -> Self {
        Self {
            kind: EnvelopeKind::Request,
            operation: operation.to_string(),
            correlation_id: correlation_id.to_string(),
            reply_to: reply_to.to_string(),
            payload,
        }
    }

    pub fn attached(address: &str) -> Self {
        Self {
            kind: EnvelopeKind::Attached,
            operation: String::new(),
            correlation_id: String::new(),
            reply_to: address.to_string(),
            payload: Value::Null,
        }
    }

    pub fn reply(&self, body: &ReplyBody) -> Result<Self> {
        Ok(Self {
            kind: EnvelopeKind::Reply,
            operation: self.operation.clone(),
            correlation_id: self.correlation_id.clone(),
            reply_to: self.reply_to.clone(),
            payload: serde_json::to_value(body)?,
        })
    }
}
