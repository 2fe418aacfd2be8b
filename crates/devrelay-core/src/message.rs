//! Wire protocol between the relay and the remote observer.
//!
//! Outbound: `{"__IS_REDUX_NATIVE_MESSAGE__": true, "content": <message>}`.
//! Inbound: `{"method": "emitReduxMessage", "content": <message>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Envelope key marking outbound protocol messages.
pub const MESSAGE_MARKER: &str = "__IS_REDUX_NATIVE_MESSAGE__";

/// `method` value of inbound protocol events.
pub const RELAY_METHOD: &str = "emitReduxMessage";

/// Message types of the relay protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Out: lifted state snapshot.
    State,
    /// Out: one new action and the resulting state. In: remote action.
    Action,
    /// Out: reducer or evaluation failure.
    Error,
    /// In: replace the lifted state.
    Import,
    /// In: request a fresh STATE relay.
    Update,
    /// In: raw control action for the lifted store.
    Dispatch,
}

impl MessageType {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::State => "STATE",
            MessageType::Action => "ACTION",
            MessageType::Error => "ERROR",
            MessageType::Import => "IMPORT",
            MessageType::Update => "UPDATE",
            MessageType::Dispatch => "DISPATCH",
        }
    }

    /// Parse a wire name.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "STATE" => Some(MessageType::State),
            "ACTION" => Some(MessageType::Action),
            "ERROR" => Some(MessageType::Error),
            "IMPORT" => Some(MessageType::Import),
            "UPDATE" => Some(MessageType::Update),
            "DISPATCH" => Some(MessageType::Dispatch),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message posted to the observer. Always names exactly one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    /// Message type.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Target instance.
    pub id: String,
    /// Display label of the instance.
    pub name: String,
    /// Encoded state, or raw error text for ERROR.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Encoded action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// ACTION only: history is being capped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_excess: Option<bool>,
    /// ACTION only: id of the relayed action, 1 for the first recorded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action_id: Option<u64>,
}

impl OutboundMessage {
    /// An empty message of `kind` for one instance.
    pub fn new(kind: MessageType, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            name: name.into(),
            payload: None,
            action: None,
            is_excess: None,
            next_action_id: None,
        }
    }
}

/// Outbound envelope as posted to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    /// Always true; distinguishes relay traffic from other messages.
    #[serde(rename = "__IS_REDUX_NATIVE_MESSAGE__")]
    pub marker: bool,
    /// The message.
    pub content: OutboundMessage,
}

impl OutboundEnvelope {
    /// Wrap a message.
    pub fn new(content: OutboundMessage) -> Self {
        Self {
            marker: true,
            content,
        }
    }
}

/// A message received from the observer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Message type (unknown types are ignored).
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Target instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Alternative name for `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    /// ACTION: encoded action description. DISPATCH: control action object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Value>,
    /// IMPORT: encoded lifted state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    /// Fan out to every registered instance.
    #[serde(default)]
    pub to_all: bool,
}

impl InboundMessage {
    /// A message of `kind` addressed to `id`.
    pub fn new(kind: MessageType, id: impl Into<String>) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            id: Some(id.into()),
            ..Default::default()
        }
    }

    /// Parsed message type, if known.
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_wire(&self.kind)
    }

    /// Target instance: `id`, falling back to `instance_id`.
    pub fn target(&self) -> Option<&str> {
        self.id.as_deref().or(self.instance_id.as_deref())
    }

    /// Copy of this message retargeted at a single instance.
    pub fn retarget(&self, id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            instance_id: None,
            to_all: false,
            ..self.clone()
        }
    }
}

/// An event as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Relay events carry [`RELAY_METHOD`].
    #[serde(default)]
    pub method: String,
    /// The message, decoded once the method matches.
    #[serde(default)]
    pub content: Value,
}

impl InboundEvent {
    /// Wrap a relay message.
    pub fn relay(message: &InboundMessage) -> Self {
        Self {
            method: RELAY_METHOD.to_string(),
            content: serde_json::to_value(message).unwrap_or(Value::Null),
        }
    }
}
