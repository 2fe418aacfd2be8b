//! Test Harness - a relay wired to an in-process observer

use devrelay_core::lifted::action_type;
use devrelay_core::{
    channel_pair, EnhancerOptions, InboundMessage, MessageType, ObserverEndpoint,
    OutboundEnvelope, Reducer, Relay, RelayConfig, StoreHandle,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Counter reducer: `INC` adds one, `DEC` subtracts one, `BOOM` fails.
pub fn counter_reducer() -> Reducer {
    Arc::new(|state: &Value, action: &Value| {
        let n = state.as_i64().unwrap_or(0);
        match action_type(action) {
            Some("INC") => Ok(json!(n + 1)),
            Some("DEC") => Ok(json!(n - 1)),
            Some("BOOM") => Err("counter exploded".to_string()),
            _ => Ok(state.clone()),
        }
    })
}

/// `{"type": kind}`.
pub fn action(kind: &str) -> Value {
    json!({ "type": kind })
}

/// A relay plus the observer end of its transport.
pub struct RelayHarness {
    pub relay: Relay,
    pub observer: ObserverEndpoint,
}

impl Default for RelayHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayHarness {
    pub fn new() -> Self {
        let (transport, _inbound, observer) = channel_pair();
        Self {
            relay: Relay::new(transport),
            observer,
        }
    }

    /// Enhance a counter starting at 0 under `id`.
    pub fn counter(&self, id: &str, config: RelayConfig) -> StoreHandle {
        self.counter_with(EnhancerOptions::new(config).with_instance_id(id))
    }

    /// Enhance a counter starting at 0 with full options.
    pub fn counter_with(&self, options: EnhancerOptions) -> StoreHandle {
        self.relay
            .enhance(options, counter_reducer(), json!(0))
            .expect("enhance counter")
    }

    /// Every envelope posted so far.
    pub fn drain(&mut self) -> Vec<OutboundEnvelope> {
        self.observer.drain()
    }

    /// Deliver a message as the observer would.
    pub fn send(&self, message: &InboundMessage) {
        self.relay.handle_message(message);
    }

    /// Message `kind` for `id` carrying `action`.
    pub fn message_with_action(kind: MessageType, id: &str, action: Value) -> InboundMessage {
        let mut message = InboundMessage::new(kind, id);
        message.action = Some(action);
        message
    }
}

/// Types of the given envelopes, in order.
pub fn kinds(sent: &[OutboundEnvelope]) -> Vec<MessageType> {
    sent.iter().map(|e| e.content.kind).collect()
}

/// Decoded `payload` of an envelope.
pub fn payload(envelope: &OutboundEnvelope) -> Value {
    let text = envelope.content.payload.as_deref().expect("payload present");
    serde_json::from_str(text).expect("payload is JSON")
}

/// Decoded `action` of an envelope.
pub fn action_field(envelope: &OutboundEnvelope) -> Value {
    let text = envelope.content.action.as_deref().expect("action present");
    serde_json::from_str(text).expect("action is JSON")
}
