//! Filter engine: decides which actions are relayed and produces sanitized
//! copies of state and history before they leave the process.

use crate::error::RelayError;
use crate::lifted::{action_type, LiftedState};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Custom filter: `(state, action) -> keep`.
pub type StatePredicate = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// Value transform applied before serialization: `(value, index) -> value'`.
pub type Sanitizer = Arc<dyn Fn(&Value, u64) -> Value + Send + Sync>;

/// Whitelist/blacklist of action type patterns (regular expressions).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Only action types matching one of these are relayed.
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// Action types matching one of these are never relayed.
    #[serde(default)]
    pub blacklist: Vec<String>,
}

impl FilterConfig {
    /// Returns true if neither list has patterns.
    pub fn is_empty(&self) -> bool {
        self.whitelist.is_empty() && self.blacklist.is_empty()
    }
}

fn join_patterns(patterns: &[String]) -> Result<Option<Regex>, RelayError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    Ok(Some(Regex::new(&patterns.join("|"))?))
}

/// Compiled action filter for one instance.
#[derive(Clone, Default)]
pub struct ActionFilter {
    whitelist: Option<Regex>,
    blacklist: Option<Regex>,
    predicate: Option<StatePredicate>,
}

impl fmt::Debug for ActionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionFilter")
            .field("whitelist", &self.whitelist.as_ref().map(Regex::as_str))
            .field("blacklist", &self.blacklist.as_ref().map(Regex::as_str))
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

impl ActionFilter {
    /// Compile the patterns of `config`.
    pub fn new(config: &FilterConfig) -> Result<Self, RelayError> {
        Ok(Self {
            whitelist: join_patterns(&config.whitelist)?,
            blacklist: join_patterns(&config.blacklist)?,
            predicate: None,
        })
    }

    /// Attach a custom `(state, action) -> keep` predicate.
    pub fn with_predicate(mut self, predicate: StatePredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// True if the filter would let everything through.
    pub fn is_pass_through(&self) -> bool {
        self.whitelist.is_none() && self.blacklist.is_none() && self.predicate.is_none()
    }

    /// True if `action` matches the blacklist or misses a non-empty whitelist.
    pub fn is_filtered(&self, action: &Value) -> bool {
        let kind = action_type(action).unwrap_or_default();
        if let Some(whitelist) = &self.whitelist {
            if !whitelist.is_match(kind) {
                return true;
            }
        }
        self.blacklist.as_ref().is_some_and(|b| b.is_match(kind))
    }

    fn rejects(&self, state: &Value, action: &Value) -> bool {
        if self.is_filtered(action) {
            return true;
        }
        self.predicate.as_ref().is_some_and(|p| !p(state, action))
    }
}

/// Optional sanitizers for one instance.
#[derive(Clone, Default)]
pub struct Sanitizers {
    /// Applied to app states; index is the position in the recorded history
    /// (or the id of the action that produced the state).
    pub state: Option<Sanitizer>,
    /// Applied to app actions; index is the action id.
    pub action: Option<Sanitizer>,
}

impl fmt::Debug for Sanitizers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sanitizers")
            .field("state", &self.state.is_some())
            .field("action", &self.action.is_some())
            .finish()
    }
}

impl Sanitizers {
    /// True if no sanitizer is configured.
    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.action.is_none()
    }
}

/// Returns true if `action` must not be relayed. No filter means relay everything.
pub fn is_filtered(action: &Value, filters: Option<&ActionFilter>) -> bool {
    filters.is_some_and(|f| f.is_filtered(action))
}

fn prune(
    lifted: &LiftedState,
    mut keep: impl FnMut(usize, u64, &Value, &Value) -> bool,
) -> LiftedState {
    let mut out = lifted.clone();
    out.staged_action_ids.clear();
    out.computed_states.clear();
    out.actions_by_id.clear();
    let mut current = 0;

    for (index, (id, computed)) in lifted
        .staged_action_ids
        .iter()
        .zip(lifted.computed_states.iter())
        .enumerate()
    {
        let Some(performed) = lifted.actions_by_id.get(id) else {
            continue;
        };
        if !keep(index, *id, &computed.state, &performed.action) {
            continue;
        }
        if index <= lifted.current_state_index {
            current = out.staged_action_ids.len();
        }
        out.staged_action_ids.push(*id);
        out.computed_states.push(computed.clone());
        out.actions_by_id.insert(*id, performed.clone());
    }

    out.skipped_action_ids
        .retain(|id| out.actions_by_id.contains_key(id));
    out.current_state_index = current;
    out
}

/// Copy of `lifted` with filtered actions removed.
///
/// `staged_action_ids`, `computed_states` and `actions_by_id` stay index
/// aligned, the initial action is always kept, and `current_state_index` is
/// remapped onto the pruned history.
pub fn filter_staged_actions(lifted: &LiftedState, filters: Option<&ActionFilter>) -> LiftedState {
    match filters {
        None => lifted.clone(),
        Some(f) => prune(lifted, |index, _, _, action| index == 0 || !f.is_filtered(action)),
    }
}

/// Sanitized history for a STATE message.
///
/// Applies the pattern filter and the custom predicate (never to the initial
/// action), the state sanitizer per original history position, and the
/// action sanitizer per action id.
pub fn filter_state(
    lifted: &LiftedState,
    filters: Option<&ActionFilter>,
    sanitizers: &Sanitizers,
) -> LiftedState {
    let pass_through = filters.map_or(true, ActionFilter::is_pass_through);
    if pass_through && sanitizers.is_empty() {
        return lifted.clone();
    }

    let mut kept = Vec::with_capacity(lifted.staged_action_ids.len());
    let mut out = prune(lifted, |index, _, state, action| {
        let keep = index == 0 || !filters.is_some_and(|f| f.rejects(state, action));
        if keep {
            kept.push(index);
        }
        keep
    });

    // Sanitizers see the position in the unpruned history.
    if let Some(sanitize) = &sanitizers.state {
        for (computed, index) in out.computed_states.iter_mut().zip(&kept) {
            computed.state = sanitize(&computed.state, *index as u64);
        }
    }
    if let Some(sanitize) = &sanitizers.action {
        for (id, performed) in out.actions_by_id.iter_mut() {
            performed.action = sanitize(&performed.action, *id);
        }
    }
    out
}

/// App state carried by an ACTION message, sanitized with the id of the
/// action that produced it.
pub fn filter_action_state(state: &Value, sanitizers: &Sanitizers, action_id: u64) -> Value {
    match &sanitizers.state {
        Some(sanitize) => sanitize(state, action_id),
        None => state.clone(),
    }
}
