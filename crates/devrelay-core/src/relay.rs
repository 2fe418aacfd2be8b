//! Outbound relay and the enhancement entry point.
//!
//! [`Relay::enhance`] wraps a reducer in a time-travel store, registers it,
//! posts the initial STATE snapshot and subscribes the recording state
//! machine to every later change. The returned [`StoreHandle`] is the local
//! dispatch surface; while the instance is locked it swallows dispatches.

use crate::codec::{stringify_with, Codec, JsonCodec};
use crate::config::EnhancerOptions;
use crate::error::RelayError;
use crate::filters::{filter_action_state, filter_state, ActionFilter};
use crate::instrument::{DevToolsStore, InstrumentedStore, Listener, Reducer, StoreChange};
use crate::lifted::{LiftedAction, LiftedState, PerformedAction};
use crate::message::{MessageType, OutboundEnvelope, OutboundMessage};
use crate::recording::RelayDecision;
use crate::registry::{generate_id, Instance, InstanceRegistry};
use crate::transport::Transport;
use serde_json::Value;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

pub(crate) struct RelayInner {
    pub(crate) registry: InstanceRegistry,
    transport: Arc<dyn Transport>,
    pub(crate) codec: Arc<dyn Codec>,
}

/// Relay coordinator: owns the registry, the transport and the codec.
#[derive(Clone)]
pub struct Relay {
    pub(crate) inner: Arc<RelayInner>,
}

impl Relay {
    /// Create a relay posting to `transport` with the JSON codec.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_codec(transport, JsonCodec)
    }

    /// Create a relay with a custom codec.
    pub fn with_codec(transport: impl Transport + 'static, codec: impl Codec + 'static) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                registry: InstanceRegistry::new(),
                transport: Arc::new(transport),
                codec: Arc::new(codec),
            }),
        }
    }

    /// The instance registry.
    pub fn registry(&self) -> &InstanceRegistry {
        &self.inner.registry
    }

    /// Wrap `reducer` in a time-travel store and register it.
    pub fn enhance(
        &self,
        options: EnhancerOptions,
        reducer: Reducer,
        initial_state: Value,
    ) -> Result<StoreHandle, RelayError> {
        let store = InstrumentedStore::new(
            reducer,
            initial_state,
            options.config.instrument_options(),
        )?;
        self.enhance_store(options, Box::new(store))
    }

    /// Register an already-built store.
    pub fn enhance_store(
        &self,
        options: EnhancerOptions,
        store: Box<dyn DevToolsStore>,
    ) -> Result<StoreHandle, RelayError> {
        let EnhancerOptions {
            config,
            creators,
            sanitizers,
            predicate,
        } = options;

        let id = generate_id(config.instance_id.as_deref());
        let mut filters = match config.filter_config() {
            Some(filter_config) => Some(ActionFilter::new(&filter_config)?),
            None => None,
        };
        if let Some(predicate) = predicate {
            filters = Some(filters.unwrap_or_default().with_predicate(predicate));
        }

        let instance = Arc::new(Instance::new(
            id,
            config.name.clone(),
            store,
            filters,
            creators,
            sanitizers,
            config.effective_max_age(),
        ));
        instance
            .store()
            .subscribe(self.inner.listener(Arc::downgrade(&instance)));
        if let Some(previous) = self.inner.registry.register(instance.clone()) {
            warn!(
                instance_id = %previous.id(),
                "instance id reused; the replaced store is no longer relayed"
            );
        }

        let descriptors = instance.creators().descriptors();
        let action = match descriptors {
            Some(descriptors) => Some(stringify_with(self.inner.codec.as_ref(), &descriptors)?),
            None => None,
        };
        let lifted = instance.lifted_state();
        self.inner.relay_state(&instance, &lifted, action);

        info!(instance_id = %instance.id(), name = %instance.name(), "store enhanced");
        Ok(StoreHandle {
            relay: self.clone(),
            instance,
        })
    }

    /// Replace the store behind an instance.
    ///
    /// With no `instance_id` the first registered instance is used, with a
    /// warning when there is more than one. Returns the id that was updated,
    /// or None if there was nothing to update.
    pub fn update_store(
        &self,
        store: Box<dyn DevToolsStore>,
        instance_id: Option<&str>,
    ) -> Option<String> {
        let registry = &self.inner.registry;
        if registry.is_empty() {
            return None;
        }
        let instance = match instance_id {
            Some(id) => registry.lookup(id)?,
            None => {
                if registry.len() > 1 {
                    warn!(
                        instances = registry.len(),
                        "multiple stores registered; pass an instance id to update_store"
                    );
                }
                registry.first()?
            }
        };
        instance.replace_store(store, self.inner.listener(Arc::downgrade(&instance)));
        Some(instance.id().to_string())
    }
}

impl RelayInner {
    fn listener(self: &Arc<Self>, instance: Weak<Instance>) -> Listener {
        let relay = Arc::downgrade(self);
        Arc::new(move |change: &StoreChange<'_>| {
            if let (Some(relay), Some(instance)) = (relay.upgrade(), instance.upgrade()) {
                relay.on_store_change(&instance, change);
            }
        })
    }

    /// Runs with the instance's store lock held.
    fn on_store_change(&self, instance: &Instance, change: &StoreChange<'_>) {
        if !self.registry.is_current(instance) {
            debug!(instance_id = %instance.id(), "change on replaced instance dropped");
            return;
        }
        let decision = instance
            .recording()
            .on_change(change, instance.filters(), instance.max_age());
        match decision {
            RelayDecision::Skip => {
                debug!(
                    instance_id = %instance.id(),
                    observed = ?change.observed,
                    "change not relayed"
                );
            }
            RelayDecision::Action {
                performed,
                next_action_id,
                is_excess,
            } => self.relay_action(instance, change.state, &performed, next_action_id, is_excess),
            RelayDecision::State(lifted) => self.relay_state(instance, &lifted, None),
        }
    }

    /// Post a STATE snapshot, sanitized and filtered for `instance`.
    pub(crate) fn relay_state(
        &self,
        instance: &Instance,
        lifted: &LiftedState,
        action: Option<String>,
    ) {
        let filtered = filter_state(lifted, instance.filters(), instance.sanitizers());
        let mut message = OutboundMessage::new(MessageType::State, instance.id(), instance.name());
        match stringify_with(self.codec.as_ref(), &filtered) {
            Ok(payload) => message.payload = Some(payload),
            Err(e) => return self.relay_error(instance, &e.to_string()),
        }
        message.action = action;
        self.post(message);
    }

    fn relay_action(
        &self,
        instance: &Instance,
        state: &Value,
        performed: &PerformedAction,
        next_action_id: u64,
        is_excess: bool,
    ) {
        let sanitizers = instance.sanitizers();
        let state = filter_action_state(state, sanitizers, next_action_id);
        let mut performed = performed.clone();
        if let Some(sanitize) = &sanitizers.action {
            performed.action = sanitize(&performed.action, next_action_id);
        }

        let codec = self.codec.as_ref();
        let encoded = codec.stringify(&state).and_then(|payload| {
            stringify_with(codec, &performed).map(|action| (payload, action))
        });
        let (payload, action) = match encoded {
            Ok(encoded) => encoded,
            Err(e) => return self.relay_error(instance, &e.to_string()),
        };

        let mut message = OutboundMessage::new(MessageType::Action, instance.id(), instance.name());
        message.payload = Some(payload);
        message.action = Some(action);
        message.is_excess = Some(is_excess);
        message.next_action_id = Some(next_action_id);
        self.post(message);
    }

    /// Post an ERROR carrying `msg` verbatim.
    pub(crate) fn relay_error(&self, instance: &Instance, msg: &str) {
        let mut message = OutboundMessage::new(MessageType::Error, instance.id(), instance.name());
        message.payload = Some(msg.to_string());
        self.post(message);
    }

    fn post(&self, message: OutboundMessage) {
        let kind = message.kind;
        let id = message.id.clone();
        match self.transport.post(OutboundEnvelope::new(message)) {
            Ok(()) => debug!(instance_id = %id, %kind, "relayed"),
            Err(e) => warn!(instance_id = %id, %kind, error = %e, "relay post failed"),
        }
    }
}

/// Local handle on an enhanced store.
///
/// `dispatch` is the lock gate: while the instance is locked, actions are
/// returned unchanged without reaching the store.
#[derive(Clone)]
pub struct StoreHandle {
    relay: Relay,
    instance: Arc<Instance>,
}

impl StoreHandle {
    /// Instance id.
    pub fn id(&self) -> &str {
        self.instance.id()
    }

    /// Instance display name.
    pub fn name(&self) -> &str {
        self.instance.name()
    }

    /// Current app state.
    pub fn state(&self) -> Value {
        self.instance.store().state()
    }

    /// Copy of the lifted state.
    pub fn lifted_state(&self) -> LiftedState {
        self.instance.lifted_state()
    }

    /// Whether local dispatches are currently swallowed.
    pub fn is_locked(&self) -> bool {
        self.instance.is_locked()
    }

    /// Dispatch an app action.
    ///
    /// Reducer failures are relayed as ERROR and returned.
    pub fn dispatch(&self, action: Value) -> Result<Value, RelayError> {
        if self.instance.is_locked() {
            debug!(instance_id = %self.id(), "dispatch swallowed while locked");
            return Ok(action);
        }
        let result = self.instance.store().dispatch(action);
        if let Err(RelayError::Reducer { msg }) = &result {
            self.relay.inner.relay_error(&self.instance, msg);
        }
        result
    }

    /// Dispatch a time-travel control action.
    pub fn dispatch_lifted(&self, action: LiftedAction) -> Result<(), RelayError> {
        let result = self.instance.store().dispatch_lifted(action);
        if let Err(RelayError::Reducer { msg }) = &result {
            self.relay.inner.relay_error(&self.instance, msg);
        }
        result
    }

    /// Swap the app reducer.
    pub fn replace_reducer(&self, reducer: Reducer) -> Result<(), RelayError> {
        self.instance.store().replace_reducer(reducer)
    }
}
