//! Recording state machine: decides, for each store change, which relay
//! message (if any) describes it.
//!
//! Pause and lock are layered on top of normal recording. While either is
//! on, a change the monitor did not observe is suppressed once per toggle;
//! after that, changes are relayed as STATE snapshots again.

use crate::filters::{filter_staged_actions, is_filtered, ActionFilter};
use crate::instrument::StoreChange;
use crate::lifted::{
    LiftedState, PerformedAction, JUMP_TO_STATE, LOCK_CHANGES, PAUSE_RECORDING, PERFORM_ACTION,
};

/// What to relay for one change.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayDecision {
    /// Nothing.
    Skip,
    /// An ACTION message for the just-performed action.
    Action {
        /// The recorded action.
        performed: PerformedAction,
        /// Relayed `nextActionId`: the recorded action's id, counting from 1
        /// for the first action after the initial one.
        next_action_id: u64,
        /// Excess flag as it stood before this action.
        is_excess: bool,
    },
    /// A STATE message with the action-filtered history.
    State(LiftedState),
}

/// Per-instance recording flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingMode {
    last_action: Option<String>,
    is_excess: bool,
    locked: bool,
    paused: bool,
    edge_consumed: bool,
}

impl RecordingMode {
    /// Flags matching a store's starting pause/lock state.
    pub fn from_lifted(lifted: &LiftedState) -> Self {
        Self {
            locked: lifted.is_locked,
            paused: lifted.is_paused,
            ..Default::default()
        }
    }

    /// Whether local dispatches are currently blocked.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Whether recording is paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether history capping has been reported. Sticky.
    pub fn is_excess(&self) -> bool {
        self.is_excess
    }

    /// Most recent monitor-observed action type not yet consumed.
    pub fn last_action(&self) -> Option<&str> {
        self.last_action.as_deref()
    }

    /// Decide what to relay for `change`.
    pub fn on_change(
        &mut self,
        change: &StoreChange<'_>,
        filters: Option<&ActionFilter>,
        max_age: Option<usize>,
    ) -> RelayDecision {
        let lifted = change.lifted;

        // Reducer failures win over everything and leave the flags alone.
        if lifted.current_error().is_some() {
            return RelayDecision::State(filter_staged_actions(lifted, filters));
        }

        if let Some(observed) = change.observed {
            self.last_action = Some(observed.to_string());
        }

        let last_action = self.last_action.clone();
        match last_action.as_deref() {
            Some(PERFORM_ACTION) => return self.on_perform(lifted, filters, max_age),
            Some(JUMP_TO_STATE) => return RelayDecision::Skip,
            Some(PAUSE_RECORDING) => {
                self.paused = lifted.is_paused;
                self.edge_consumed = false;
            }
            Some(LOCK_CHANGES) => {
                self.locked = lifted.is_locked;
                self.edge_consumed = false;
            }
            _ => {}
        }

        if self.paused || self.locked {
            let fresh = self.last_action.take().is_some();
            if !fresh && !self.edge_consumed {
                self.edge_consumed = true;
                return RelayDecision::Skip;
            }
        }

        RelayDecision::State(filter_staged_actions(lifted, filters))
    }

    fn on_perform(
        &mut self,
        lifted: &LiftedState,
        filters: Option<&ActionFilter>,
        max_age: Option<usize>,
    ) -> RelayDecision {
        let Some(performed) = lifted.last_performed() else {
            return RelayDecision::Skip;
        };
        if is_filtered(&performed.action, filters) {
            return RelayDecision::Skip;
        }

        let decision = RelayDecision::Action {
            performed: performed.clone(),
            next_action_id: lifted.next_action_id.saturating_sub(1),
            is_excess: self.is_excess,
        };
        if !self.is_excess {
            if let Some(max_age) = max_age {
                self.is_excess = lifted.staged_action_ids.len() >= max_age;
            }
        }
        decision
    }
}
