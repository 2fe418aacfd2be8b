//! Inbound dispatcher: routes observer messages to registered instances.
//!
//! Nothing received from the observer can fail the caller. Unknown instances
//! are dropped silently, and evaluation, decoding or reducer failures are
//! reported back to the observer as ERROR messages.

use crate::creators::evaluate;
use crate::error::RelayError;
use crate::lifted::{LiftedAction, LiftedState};
use crate::message::{InboundEvent, InboundMessage, MessageType, RELAY_METHOD};
use crate::registry::Instance;
use crate::relay::Relay;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

impl Relay {
    /// Consume inbound events until the channel closes.
    ///
    /// Events are handled one at a time, each to completion.
    pub async fn listen(&self, mut inbound: mpsc::UnboundedReceiver<InboundEvent>) {
        while let Some(event) = inbound.recv().await {
            self.handle_event(event);
        }
        info!("inbound channel closed");
    }

    /// Handle one transport event. Non-relay methods are ignored.
    pub fn handle_event(&self, event: InboundEvent) {
        if event.method != RELAY_METHOD {
            debug!(method = %event.method, "ignoring non-relay event");
            return;
        }
        match serde_json::from_value::<InboundMessage>(event.content) {
            Ok(message) => self.handle_message(&message),
            Err(e) => warn!(error = %e, "malformed inbound message"),
        }
    }

    /// Handle one observer message.
    pub fn handle_message(&self, message: &InboundMessage) {
        if message.to_all {
            for id in self.registry().ids() {
                self.handle_message(&message.retarget(&id));
            }
            return;
        }

        let Some(instance) = message.target().and_then(|id| self.registry().lookup(id)) else {
            debug!(instance_id = ?message.target(), kind = %message.kind, "no such instance");
            return;
        };
        let Some(kind) = message.message_type() else {
            debug!(instance_id = %instance.id(), kind = %message.kind, "ignoring message type");
            return;
        };

        match kind {
            MessageType::Import => {
                if let Err(e) = self.import_state(&instance, message.state.as_ref()) {
                    self.inner.relay_error(&instance, &e.to_string());
                    return;
                }
                self.send_update(&instance);
            }
            MessageType::Update => self.send_update(&instance),
            MessageType::Action => {
                if let Err(e) = self.dispatch_remotely(&instance, message.action.as_ref()) {
                    warn!(instance_id = %instance.id(), error = %e, "remote action failed");
                    self.inner.relay_error(&instance, &e.to_string());
                }
            }
            MessageType::Dispatch => {
                if let Err(e) = self.dispatch_control(&instance, message.action.as_ref()) {
                    warn!(instance_id = %instance.id(), error = %e, "control action failed");
                    self.inner.relay_error(&instance, &e.to_string());
                }
            }
            MessageType::State | MessageType::Error => {
                debug!(instance_id = %instance.id(), %kind, "ignoring outbound-only type");
            }
        }
    }

    fn send_update(&self, instance: &Instance) {
        let lifted = instance.lifted_state();
        self.inner.relay_state(instance, &lifted, None);
    }

    /// Decode a field that may arrive either as codec text or inline.
    fn decode_field(&self, field: Option<&Value>, what: &str) -> Result<Value, RelayError> {
        match field {
            None | Some(Value::Null) => {
                Err(RelayError::invalid_action(format!("missing `{what}`")))
            }
            Some(Value::String(text)) => self.inner.codec.parse(text),
            Some(value) => Ok(value.clone()),
        }
    }

    fn import_state(&self, instance: &Instance, state: Option<&Value>) -> Result<(), RelayError> {
        let value = self.decode_field(state, "state")?;
        let lifted: LiftedState = serde_json::from_value(value)?;
        instance.store().dispatch_lifted(LiftedAction::ImportState {
            next_lifted_state: Box::new(lifted),
            no_recompute: false,
        })
    }

    fn dispatch_remotely(
        &self,
        instance: &Instance,
        action: Option<&Value>,
    ) -> Result<(), RelayError> {
        let codec = self.inner.codec.as_ref();
        let text = match action {
            Some(Value::String(text)) => text.clone(),
            Some(value) if !value.is_null() => codec.stringify(value)?,
            _ => return Err(RelayError::evaluation("missing `action`")),
        };
        let action = evaluate(codec, &text, instance.creators().resolve())?;
        instance.store().dispatch(action)?;
        Ok(())
    }

    fn dispatch_control(
        &self,
        instance: &Instance,
        action: Option<&Value>,
    ) -> Result<(), RelayError> {
        let value = self.decode_field(action, "action")?;
        let action: LiftedAction = serde_json::from_value(value)?;
        debug!(instance_id = %instance.id(), kind = action.kind(), "control action");
        instance.store().dispatch_lifted(action)
    }
}
