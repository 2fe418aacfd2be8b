//! Lifted (time-travel) state and the control actions that drive it.
//!
//! The lifted state is the full recording history kept by the time-travel
//! store: every performed action, the state computed after each one, the
//! current pointer, and the pause/lock flags. It is serialized with
//! camelCase keys because that is what the remote observer reads.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Action type the store records as the first staged action.
pub const INIT_ACTION_TYPE: &str = "@@INIT";

/// Wire name of a recorded app action.
pub const PERFORM_ACTION: &str = "PERFORM_ACTION";
/// Wire name of the jump-to-state control action.
pub const JUMP_TO_STATE: &str = "JUMP_TO_STATE";
/// Wire name of the pause control action.
pub const PAUSE_RECORDING: &str = "PAUSE_RECORDING";
/// Wire name of the lock control action.
pub const LOCK_CHANGES: &str = "LOCK_CHANGES";

/// Returns the `type` field of an action object, if it has a string one.
pub fn action_type(action: &Value) -> Option<&str> {
    action.get("type").and_then(Value::as_str)
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn perform_action_type() -> String {
    PERFORM_ACTION.to_string()
}

/// An app action as recorded in the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformedAction {
    /// Always `PERFORM_ACTION`.
    #[serde(rename = "type", default = "perform_action_type")]
    pub kind: String,
    /// The app action itself.
    pub action: Value,
    /// When the action was recorded (milliseconds since epoch).
    #[serde(default)]
    pub timestamp: u64,
}

impl PerformedAction {
    /// Record `action` with the current time.
    pub fn new(action: Value) -> Self {
        Self {
            kind: perform_action_type(),
            action,
            timestamp: now_ms(),
        }
    }

    /// The recorded `INIT` action.
    pub fn init() -> Self {
        Self::new(json!({ "type": INIT_ACTION_TYPE }))
    }

    /// The app action's `type`, or an empty string if it has none.
    pub fn action_type(&self) -> &str {
        action_type(&self.action).unwrap_or_default()
    }
}

/// The state computed after one staged action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedState {
    /// Resulting app state.
    pub state: Value,
    /// Reducer failure message, if this step failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComputedState {
    /// A successfully computed state.
    pub fn ok(state: Value) -> Self {
        Self { state, error: None }
    }
}

/// The full time-travel history of one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiftedState {
    /// Opaque monitor state.
    #[serde(default)]
    pub monitor_state: Value,
    /// Identifier the next performed action will get.
    pub next_action_id: u64,
    /// Every retained action keyed by id.
    pub actions_by_id: BTreeMap<u64, PerformedAction>,
    /// Ordered ids of the actions in the history.
    pub staged_action_ids: Vec<u64>,
    /// Ids of actions toggled off.
    #[serde(default)]
    pub skipped_action_ids: Vec<u64>,
    /// State the history is replayed from.
    #[serde(default)]
    pub committed_state: Value,
    /// Index into `computed_states` of the state currently shown.
    pub current_state_index: usize,
    /// One computed state per staged action, index aligned.
    pub computed_states: Vec<ComputedState>,
    /// Whether local dispatches are blocked.
    #[serde(default)]
    pub is_locked: bool,
    /// Whether recording is paused.
    #[serde(default)]
    pub is_paused: bool,
}

impl LiftedState {
    /// The state currently pointed at, if the index is valid.
    pub fn current(&self) -> Option<&ComputedState> {
        self.computed_states.get(self.current_state_index)
    }

    /// Reducer error attached to the current step, if any.
    pub fn current_error(&self) -> Option<&str> {
        self.current().and_then(|c| c.error.as_deref())
    }

    /// The most recently performed action (`next_action_id - 1`).
    pub fn last_performed(&self) -> Option<&PerformedAction> {
        self.next_action_id
            .checked_sub(1)
            .and_then(|id| self.actions_by_id.get(&id))
    }
}

/// Time-travel control actions understood by the lifted store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiftedAction {
    /// Record and apply an app action.
    PerformAction {
        /// The app action.
        action: Value,
        /// When it was dispatched.
        #[serde(default)]
        timestamp: u64,
    },
    /// Drop the history and go back to the initial state.
    Reset,
    /// Drop the history and go back to the committed state.
    Rollback,
    /// Make the current state the new committed state.
    Commit,
    /// Remove skipped actions from the history.
    Sweep,
    /// Skip or un-skip one action.
    ToggleAction {
        /// Action id to toggle.
        id: u64,
    },
    /// Skip or un-skip a range of actions.
    #[serde(rename_all = "camelCase")]
    SetActionsActive {
        /// First action id (inclusive).
        start: u64,
        /// Last action id (exclusive).
        end: u64,
        /// Whether the range becomes active.
        active: bool,
    },
    /// Move an action before another one.
    #[serde(rename_all = "camelCase")]
    ReorderAction {
        /// Action to move.
        action_id: u64,
        /// Action it is moved in front of.
        before_action_id: u64,
    },
    /// Point at a computed state by index.
    JumpToState {
        /// Index into the computed states.
        index: usize,
    },
    /// Point at the state after a given action.
    #[serde(rename_all = "camelCase")]
    JumpToAction {
        /// Action id to jump to.
        action_id: u64,
    },
    /// Replace the whole lifted state.
    #[serde(rename_all = "camelCase")]
    ImportState {
        /// The incoming history.
        next_lifted_state: Box<LiftedState>,
        /// Keep the imported computed states instead of replaying.
        #[serde(default)]
        no_recompute: bool,
    },
    /// Block or unblock local dispatches.
    LockChanges {
        /// New lock status.
        status: bool,
    },
    /// Pause or resume recording.
    PauseRecording {
        /// New pause status.
        status: bool,
    },
}

impl LiftedAction {
    /// Wrap an app action for recording.
    pub fn perform(action: Value) -> Self {
        LiftedAction::PerformAction {
            action,
            timestamp: now_ms(),
        }
    }

    /// The wire `type` of this control action.
    pub fn kind(&self) -> &'static str {
        match self {
            LiftedAction::PerformAction { .. } => PERFORM_ACTION,
            LiftedAction::Reset => "RESET",
            LiftedAction::Rollback => "ROLLBACK",
            LiftedAction::Commit => "COMMIT",
            LiftedAction::Sweep => "SWEEP",
            LiftedAction::ToggleAction { .. } => "TOGGLE_ACTION",
            LiftedAction::SetActionsActive { .. } => "SET_ACTIONS_ACTIVE",
            LiftedAction::ReorderAction { .. } => "REORDER_ACTION",
            LiftedAction::JumpToState { .. } => JUMP_TO_STATE,
            LiftedAction::JumpToAction { .. } => "JUMP_TO_ACTION",
            LiftedAction::ImportState { .. } => "IMPORT_STATE",
            LiftedAction::LockChanges { .. } => LOCK_CHANGES,
            LiftedAction::PauseRecording { .. } => PAUSE_RECORDING,
        }
    }
}
