//! Property-Based Tests for the filter engine and recording flags

use crate::harness::{action, counter_reducer, RelayHarness};
use devrelay_core::filters::{filter_staged_actions, is_filtered};
use devrelay_core::{
    ActionFilter, DevToolsStore, FilterConfig, InstrumentOptions, InstrumentedStore, LiftedAction,
    LiftedState, MessageType, RelayConfig,
};
use proptest::prelude::*;
use serde_json::json;

fn action_kind() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("INC"), Just("DEC"), Just("TICK"), Just("NOOP")]
}

fn recorded_history(kinds: &[&str], jump_to: usize) -> LiftedState {
    let mut store = InstrumentedStore::new(
        counter_reducer(),
        json!(0),
        InstrumentOptions {
            max_age: None,
            ..Default::default()
        },
    )
    .unwrap();
    for kind in kinds {
        store.dispatch(action(kind)).unwrap();
    }
    let index = jump_to % (kinds.len() + 1);
    store
        .dispatch_lifted(LiftedAction::JumpToState { index })
        .unwrap();
    store.lifted_state().clone()
}

fn tick_filter() -> ActionFilter {
    ActionFilter::new(&FilterConfig {
        whitelist: vec![],
        blacklist: vec!["^TICK$".into()],
    })
    .unwrap()
}

proptest! {
    #[test]
    fn prop_filtered_history_stays_aligned(
        kinds in prop::collection::vec(action_kind(), 0..24),
        jump_to in 0usize..32,
    ) {
        let lifted = recorded_history(&kinds, jump_to);
        let filter = tick_filter();
        let out = filter_staged_actions(&lifted, Some(&filter));

        prop_assert_eq!(out.staged_action_ids.len(), out.computed_states.len());
        prop_assert_eq!(out.staged_action_ids.len(), out.actions_by_id.len());
        prop_assert_eq!(out.staged_action_ids[0], 0);
        prop_assert!(out.current_state_index < out.computed_states.len());
        for id in &out.staged_action_ids[1..] {
            prop_assert!(!is_filtered(&out.actions_by_id[id].action, Some(&filter)));
        }
        let ticks = kinds.iter().filter(|k| **k == "TICK").count();
        prop_assert_eq!(out.staged_action_ids.len(), kinds.len() + 1 - ticks);
    }

    #[test]
    fn prop_unfiltered_history_is_unchanged(
        kinds in prop::collection::vec(action_kind(), 0..16),
        jump_to in 0usize..16,
    ) {
        let lifted = recorded_history(&kinds, jump_to);
        prop_assert_eq!(filter_staged_actions(&lifted, None), lifted);
    }

    #[test]
    fn prop_blacklist_wins_over_whitelist(kind in "[A-Z]{1,8}") {
        let filter = ActionFilter::new(&FilterConfig {
            whitelist: vec![".*".into()],
            blacklist: vec![format!("^{kind}$")],
        })
        .unwrap();
        let candidate = json!({ "type": kind });
        prop_assert!(filter.is_filtered(&candidate));
    }

    #[test]
    fn prop_excess_never_resets(max_age in 2usize..6, dispatches in 1usize..20) {
        let mut h = RelayHarness::new();
        let store = h.counter("a", RelayConfig { max_age: Some(max_age), ..Default::default() });
        h.drain();

        let mut seen_excess = false;
        for _ in 0..dispatches {
            store.dispatch(action("INC")).unwrap();
            let sent = h.drain();
            prop_assert_eq!(sent.len(), 1);
            prop_assert_eq!(sent[0].content.kind, MessageType::Action);
            let is_excess = sent[0].content.is_excess.unwrap();
            prop_assert!(!seen_excess || is_excess);
            seen_excess |= is_excess;
        }
        prop_assert!(store.lifted_state().staged_action_ids.len() <= max_age);
        prop_assert_eq!(store.state(), json!(dispatches as i64));
    }
}
