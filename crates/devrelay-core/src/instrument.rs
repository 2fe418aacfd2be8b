//! Time-travel store: wraps a reducer and records every action so the history
//! can be replayed, jumped through, toggled, imported, paused and locked.
//!
//! Listeners are notified synchronously after every change with the app
//! state, the lifted state, and the lifted action type the monitor observed.
//! The observed type is absent for actions swallowed while locked and for
//! actions folded into the pause marker while paused.

use crate::error::RelayError;
use crate::lifted::{
    action_type, ComputedState, LiftedAction, LiftedState, PerformedAction, INIT_ACTION_TYPE,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Error text recorded for steps after a failing one.
pub const INTERRUPTED_ERROR: &str = "Interrupted by an error up the chain";

/// An app reducer: `(state, action) -> state'` or a failure message.
pub type Reducer = Arc<dyn Fn(&Value, &Value) -> Result<Value, String> + Send + Sync>;

/// Callback invoked after every store change.
pub type Listener = Arc<dyn Fn(&StoreChange<'_>) + Send + Sync>;

/// What a listener sees after a change.
#[derive(Debug, Clone, Copy)]
pub struct StoreChange<'a> {
    /// App state at the current index.
    pub state: &'a Value,
    /// Full lifted state after the change.
    pub lifted: &'a LiftedState,
    /// Lifted action type seen by the monitor, if it saw one.
    pub observed: Option<&'a str>,
}

/// The store interface the relay drives.
///
/// Calls must not re-enter the same store from inside a listener: listeners
/// run while the caller still holds the store.
pub trait DevToolsStore: Send {
    /// App state currently pointed at.
    fn state(&self) -> Value;

    /// The full lifted state.
    fn lifted_state(&self) -> &LiftedState;

    /// Dispatch an app action; returns the action.
    fn dispatch(&mut self, action: Value) -> Result<Value, RelayError>;

    /// Dispatch a time-travel control action.
    fn dispatch_lifted(&mut self, action: LiftedAction) -> Result<(), RelayError>;

    /// Register a change listener.
    fn subscribe(&mut self, listener: Listener);

    /// Swap the reducer and replay (or reset) the history.
    fn replace_reducer(&mut self, reducer: Reducer) -> Result<(), RelayError>;
}

/// Options for the time-travel store.
#[derive(Debug, Clone)]
pub struct InstrumentOptions {
    /// Cap on staged actions; older ones get committed (None = unbounded).
    pub max_age: Option<usize>,
    /// Record reducer failures in the history instead of failing the dispatch.
    pub should_catch_errors: bool,
    /// Replay the history through a replaced reducer instead of resetting it.
    pub should_hot_reload: bool,
    /// Start recording immediately (otherwise start paused).
    pub should_record_changes: bool,
    /// Start with local dispatches blocked.
    pub should_start_locked: bool,
    /// Action type recorded in place of actions dispatched while paused.
    pub pause_action_type: Option<String>,
}

impl Default for InstrumentOptions {
    fn default() -> Self {
        Self {
            max_age: Some(50),
            should_catch_errors: false,
            should_hot_reload: true,
            should_record_changes: true,
            should_start_locked: false,
            pause_action_type: None,
        }
    }
}

/// Reducer-backed store with time-travel history.
pub struct InstrumentedStore {
    reducer: Reducer,
    options: InstrumentOptions,
    lifted: LiftedState,
    initial_committed_state: Value,
    listeners: Vec<Listener>,
}

fn fresh_history() -> (BTreeMap<u64, PerformedAction>, Vec<u64>) {
    let mut actions_by_id = BTreeMap::new();
    actions_by_id.insert(0, PerformedAction::init());
    (actions_by_id, vec![0])
}

impl InstrumentedStore {
    /// Create a store starting from `initial_state`.
    pub fn new(
        reducer: Reducer,
        initial_state: Value,
        options: InstrumentOptions,
    ) -> Result<Self, RelayError> {
        let (actions_by_id, staged_action_ids) = fresh_history();
        let lifted = LiftedState {
            monitor_state: Value::Null,
            next_action_id: 1,
            actions_by_id,
            staged_action_ids,
            skipped_action_ids: Vec::new(),
            committed_state: initial_state.clone(),
            current_state_index: 0,
            computed_states: Vec::new(),
            is_locked: options.should_start_locked,
            is_paused: !options.should_record_changes,
        };
        let mut store = Self {
            reducer,
            options,
            lifted,
            initial_committed_state: initial_state,
            listeners: Vec::new(),
        };
        let mut lifted = store.lifted.clone();
        store.recompute(&mut lifted, 0)?;
        store.lifted = lifted;
        Ok(store)
    }

    fn notify(&self, observed: Option<&str>) {
        let state = self
            .lifted
            .current()
            .map(|c| &c.state)
            .unwrap_or(&self.lifted.committed_state);
        let change = StoreChange {
            state,
            lifted: &self.lifted,
            observed,
        };
        for listener in &self.listeners {
            listener(&change);
        }
    }

    fn restart_history(lifted: &mut LiftedState, committed: Value) {
        let (actions_by_id, staged_action_ids) = fresh_history();
        lifted.actions_by_id = actions_by_id;
        lifted.staged_action_ids = staged_action_ids;
        lifted.next_action_id = 1;
        lifted.skipped_action_ids.clear();
        lifted.committed_state = committed;
        lifted.current_state_index = 0;
        lifted.computed_states.clear();
    }

    fn commit_excess(lifted: &mut LiftedState, n: usize) {
        if n == 0 || n >= lifted.staged_action_ids.len() || n >= lifted.computed_states.len() {
            return;
        }
        let removed: Vec<u64> = lifted.staged_action_ids[1..=n].to_vec();
        for id in &removed {
            lifted.actions_by_id.remove(id);
        }
        lifted.skipped_action_ids.retain(|id| !removed.contains(id));

        let mut staged = vec![0];
        staged.extend_from_slice(&lifted.staged_action_ids[n + 1..]);
        lifted.staged_action_ids = staged;
        lifted.committed_state = lifted.computed_states[n].state.clone();
        lifted.computed_states.drain(..n);
        lifted.current_state_index = lifted.current_state_index.saturating_sub(n);
    }

    fn compute_entry(&self, action: &Value, previous: &Value) -> Result<ComputedState, RelayError> {
        match (self.reducer)(previous, action) {
            Ok(state) => Ok(ComputedState::ok(state)),
            Err(msg) if self.options.should_catch_errors => Ok(ComputedState {
                state: previous.clone(),
                error: Some(msg),
            }),
            Err(msg) => Err(RelayError::Reducer { msg }),
        }
    }

    fn recompute(&self, lifted: &mut LiftedState, min_invalidated: usize) -> Result<(), RelayError> {
        let start = min_invalidated.min(lifted.computed_states.len());
        lifted.computed_states.truncate(start);

        for i in start..lifted.staged_action_ids.len() {
            let id = lifted.staged_action_ids[i];
            let action = lifted
                .actions_by_id
                .get(&id)
                .map(|a| a.action.clone())
                .ok_or_else(|| RelayError::invalid_action(format!("missing action {id}")))?;
            let previous = i.checked_sub(1).and_then(|p| lifted.computed_states.get(p));
            let previous_state = previous
                .map(|p| p.state.clone())
                .unwrap_or_else(|| lifted.committed_state.clone());

            let entry = if lifted.skipped_action_ids.contains(&id) {
                previous
                    .cloned()
                    .unwrap_or_else(|| ComputedState::ok(previous_state))
            } else if self.options.should_catch_errors
                && previous.is_some_and(|p| p.error.is_some())
            {
                ComputedState {
                    state: previous_state,
                    error: Some(INTERRUPTED_ERROR.to_string()),
                }
            } else {
                self.compute_entry(&action, &previous_state)?
            };
            lifted.computed_states.push(entry);
        }
        Ok(())
    }

    fn pause_marker(&self) -> Option<PerformedAction> {
        self.options
            .pause_action_type
            .as_ref()
            .map(|t| PerformedAction::new(json!({ "type": t })))
    }

    /// Fold a change into the pause marker; `action` is None when entering pause.
    fn compute_paused(
        &self,
        lifted: &mut LiftedState,
        action: Option<&Value>,
    ) -> Result<(), RelayError> {
        let current = lifted
            .current()
            .cloned()
            .unwrap_or_else(|| ComputedState::ok(lifted.committed_state.clone()));
        let computed = match action {
            None => current,
            Some(action) => self.compute_entry(action, &current.state)?,
        };
        lifted.is_paused = true;

        let marker = match self.pause_marker() {
            Some(marker) if lifted.next_action_id != 1 => marker,
            _ => {
                Self::restart_history(lifted, computed.state.clone());
                lifted.computed_states.push(computed);
                return Ok(());
            }
        };

        if action.is_none() {
            if lifted.current_state_index + 1 == lifted.staged_action_ids.len() {
                lifted.current_state_index += 1;
            }
            lifted.staged_action_ids.push(lifted.next_action_id);
            lifted.next_action_id += 1;
        }
        lifted.actions_by_id.insert(lifted.next_action_id - 1, marker);
        let keep = lifted.staged_action_ids.len().saturating_sub(1);
        lifted.computed_states.truncate(keep);
        lifted.computed_states.push(computed);
        Ok(())
    }

    /// Apply a control action to `lifted`; returns the type the monitor saw.
    fn apply(
        &self,
        lifted: &mut LiftedState,
        action: &LiftedAction,
    ) -> Result<Option<&'static str>, RelayError> {
        let mut min_invalidated = Some(0);

        match action {
            LiftedAction::PerformAction { action: app_action, timestamp } => {
                if lifted.is_locked {
                    return Ok(None);
                }
                if lifted.is_paused {
                    self.compute_paused(lifted, Some(app_action))?;
                    return Ok(None);
                }
                if let Some(max_age) = self.options.max_age {
                    if max_age > 0 && lifted.staged_action_ids.len() >= max_age {
                        let excess = lifted.staged_action_ids.len() - max_age + 1;
                        Self::commit_excess(lifted, excess);
                    }
                }
                if lifted.current_state_index + 1 == lifted.staged_action_ids.len() {
                    lifted.current_state_index += 1;
                }
                let id = lifted.next_action_id;
                lifted.next_action_id += 1;
                let mut performed = PerformedAction::new(app_action.clone());
                performed.timestamp = *timestamp;
                lifted.actions_by_id.insert(id, performed);
                lifted.staged_action_ids.push(id);
                min_invalidated = Some(lifted.staged_action_ids.len() - 1);
            }
            LiftedAction::Reset => {
                Self::restart_history(lifted, self.initial_committed_state.clone());
            }
            LiftedAction::Commit => {
                let committed = lifted
                    .current()
                    .map(|c| c.state.clone())
                    .unwrap_or_else(|| lifted.committed_state.clone());
                Self::restart_history(lifted, committed);
            }
            LiftedAction::Rollback => {
                let committed = lifted.committed_state.clone();
                Self::restart_history(lifted, committed);
            }
            LiftedAction::ToggleAction { id } => {
                let Some(index) = lifted.staged_action_ids.iter().position(|s| s == id) else {
                    return Ok(None);
                };
                if let Some(pos) = lifted.skipped_action_ids.iter().position(|s| s == id) {
                    lifted.skipped_action_ids.remove(pos);
                } else {
                    lifted.skipped_action_ids.push(*id);
                }
                min_invalidated = Some(index);
            }
            LiftedAction::SetActionsActive { start, end, active } => {
                for id in *start..*end {
                    let skipped = lifted.skipped_action_ids.contains(&id);
                    if *active && skipped {
                        lifted.skipped_action_ids.retain(|s| *s != id);
                    } else if !*active && !skipped {
                        lifted.skipped_action_ids.push(id);
                    }
                }
                min_invalidated = lifted.staged_action_ids.iter().position(|s| s == start);
                if min_invalidated.is_none() {
                    min_invalidated = Some(0);
                }
            }
            LiftedAction::ReorderAction { action_id, before_action_id } => {
                let staged = &mut lifted.staged_action_ids;
                let index = match staged.iter().position(|s| s == action_id) {
                    Some(i) if i >= 1 => i,
                    _ => return Ok(None),
                };
                let new_index = match staged.iter().position(|s| s == before_action_id) {
                    Some(i) if i >= 1 => i,
                    _ => {
                        let last = staged.last().copied().unwrap_or_default();
                        if *before_action_id > last {
                            staged.len()
                        } else {
                            1
                        }
                    }
                };
                if index > new_index {
                    let id = staged.remove(index);
                    staged.insert(new_index, id);
                    min_invalidated = Some(new_index);
                } else if index < new_index {
                    let id = staged.remove(index);
                    staged.insert(new_index - 1, id);
                    min_invalidated = Some(index);
                } else {
                    min_invalidated = None;
                }
            }
            LiftedAction::JumpToState { index } => {
                if *index < lifted.computed_states.len() {
                    lifted.current_state_index = *index;
                }
                min_invalidated = None;
            }
            LiftedAction::JumpToAction { action_id } => {
                if let Some(index) = lifted.staged_action_ids.iter().position(|s| s == action_id) {
                    lifted.current_state_index = index;
                }
                min_invalidated = None;
            }
            LiftedAction::Sweep => {
                let skipped = std::mem::take(&mut lifted.skipped_action_ids);
                lifted.staged_action_ids.retain(|id| !skipped.contains(id));
                lifted.current_state_index = lifted
                    .current_state_index
                    .min(lifted.staged_action_ids.len().saturating_sub(1));
            }
            LiftedAction::ImportState { next_lifted_state, no_recompute } => {
                let incoming = next_lifted_state.as_ref().clone();
                lifted.monitor_state = incoming.monitor_state;
                lifted.actions_by_id = incoming.actions_by_id;
                lifted.next_action_id = incoming.next_action_id;
                lifted.staged_action_ids = incoming.staged_action_ids;
                lifted.skipped_action_ids = incoming.skipped_action_ids;
                lifted.committed_state = incoming.committed_state;
                lifted.current_state_index = incoming.current_state_index;
                lifted.computed_states = incoming.computed_states;
                if *no_recompute {
                    min_invalidated = None;
                }
            }
            LiftedAction::LockChanges { status } => {
                lifted.is_locked = *status;
                min_invalidated = None;
            }
            LiftedAction::PauseRecording { status } => {
                if *status {
                    self.compute_paused(lifted, None)?;
                    return Ok(Some(action.kind()));
                }
                lifted.is_paused = false;
                let committed = lifted
                    .current()
                    .map(|c| c.state.clone())
                    .unwrap_or_else(|| lifted.committed_state.clone());
                Self::restart_history(lifted, committed);
            }
        }

        if let Some(min) = min_invalidated {
            self.recompute(lifted, min)?;
        }
        if lifted.current_state_index >= lifted.computed_states.len() {
            lifted.current_state_index = lifted.computed_states.len().saturating_sub(1);
        }
        Ok(Some(action.kind()))
    }
}

impl DevToolsStore for InstrumentedStore {
    fn state(&self) -> Value {
        self.lifted
            .current()
            .map(|c| c.state.clone())
            .unwrap_or_else(|| self.lifted.committed_state.clone())
    }

    fn lifted_state(&self) -> &LiftedState {
        &self.lifted
    }

    fn dispatch(&mut self, action: Value) -> Result<Value, RelayError> {
        if action_type(&action).is_none() {
            return Err(RelayError::invalid_action(
                "actions must be objects with a string `type`",
            ));
        }
        self.dispatch_lifted(LiftedAction::perform(action.clone()))?;
        Ok(action)
    }

    fn dispatch_lifted(&mut self, action: LiftedAction) -> Result<(), RelayError> {
        let mut next = self.lifted.clone();
        let observed = self.apply(&mut next, &action)?;
        self.lifted = next;
        self.notify(observed);
        Ok(())
    }

    fn subscribe(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    fn replace_reducer(&mut self, reducer: Reducer) -> Result<(), RelayError> {
        let previous = std::mem::replace(&mut self.reducer, reducer);
        let mut next = self.lifted.clone();

        if !self.options.should_hot_reload {
            let committed = next
                .current()
                .map(|c| c.state.clone())
                .unwrap_or_else(|| self.initial_committed_state.clone());
            Self::restart_history(&mut next, committed);
        }
        if let Some(max_age) = self.options.max_age {
            if max_age > 0 && next.staged_action_ids.len() > max_age {
                let excess = next.staged_action_ids.len() - max_age;
                Self::commit_excess(&mut next, excess);
            }
        }

        if let Err(e) = self.recompute(&mut next, 0) {
            self.reducer = previous;
            return Err(e);
        }
        self.lifted = next;
        self.notify(Some(INIT_ACTION_TYPE));
        Ok(())
    }
}
