//! End-to-end relay scenarios: local dispatch, recording modes and observer commands

use crate::harness::{action, action_field, kinds, payload, RelayHarness};
use devrelay_core::{
    ActionCreator, EnhancerOptions, FilterConfig, InboundMessage, LiftedAction, LiftedState,
    MessageType, RelayConfig,
};
use serde_json::{json, Value};
use std::sync::Arc;

#[test]
fn test_counter_initial_state_then_action() {
    let mut h = RelayHarness::new();
    let store = h.counter("counter", RelayConfig::default());

    let sent = h.drain();
    assert_eq!(kinds(&sent), vec![MessageType::State]);
    assert_eq!(payload(&sent[0])["computedStates"][0]["state"], json!(0));

    store.dispatch(action("INC")).unwrap();
    let sent = h.drain();
    assert_eq!(kinds(&sent), vec![MessageType::Action]);
    let content = &sent[0].content;
    assert_eq!(content.id, "counter");
    assert_eq!(payload(&sent[0]), json!(1));
    assert_eq!(action_field(&sent[0])["action"], action("INC"));
    assert_eq!(action_field(&sent[0])["type"], "PERFORM_ACTION");
    assert_eq!(content.next_action_id, Some(1));
    assert_eq!(store.lifted_state().next_action_id, 2);

    store.dispatch(action("INC")).unwrap();
    let sent = h.drain();
    assert_eq!(sent[0].content.next_action_id, Some(2));
    assert_eq!(payload(&sent[0]), json!(2));
}

#[test]
fn test_every_unfiltered_dispatch_relays_one_action() {
    let mut h = RelayHarness::new();
    let store = h.counter("a", RelayConfig::default());
    h.drain();

    for expected in 1..=10 {
        store.dispatch(action("INC")).unwrap();
        let sent = h.drain();
        assert_eq!(kinds(&sent), vec![MessageType::Action]);
        assert_eq!(payload(&sent[0]), json!(expected));
    }
}

#[test]
fn test_blacklisted_action_is_never_relayed() {
    let mut h = RelayHarness::new();
    let store = h.counter(
        "a",
        RelayConfig {
            actions_blacklist: vec!["TICK".into()],
            ..Default::default()
        },
    );
    h.drain();

    store.dispatch(action("TICK")).unwrap();
    assert!(h.drain().is_empty());

    store.dispatch(action("INC")).unwrap();
    assert_eq!(kinds(&h.drain()), vec![MessageType::Action]);
}

#[test]
fn test_whitelist_from_filters_section() {
    let mut h = RelayHarness::new();
    let store = h.counter(
        "a",
        RelayConfig {
            filters: Some(FilterConfig {
                whitelist: vec!["^DEC$".into()],
                blacklist: vec![],
            }),
            ..Default::default()
        },
    );
    h.drain();

    store.dispatch(action("INC")).unwrap();
    assert!(h.drain().is_empty());
    store.dispatch(action("DEC")).unwrap();
    assert_eq!(kinds(&h.drain()), vec![MessageType::Action]);
}

#[test]
fn test_filtered_actions_are_pruned_from_state_snapshots() {
    let mut h = RelayHarness::new();
    let store = h.counter(
        "a",
        RelayConfig {
            actions_blacklist: vec!["TICK".into()],
            ..Default::default()
        },
    );
    store.dispatch(action("INC")).unwrap();
    store.dispatch(action("TICK")).unwrap();
    store.dispatch(action("INC")).unwrap();
    h.drain();

    h.send(&InboundMessage::new(MessageType::Update, "a"));
    let sent = h.drain();
    let snapshot: LiftedState = serde_json::from_value(payload(&sent[0])).unwrap();
    assert_eq!(snapshot.staged_action_ids, vec![0, 1, 3]);
    assert_eq!(snapshot.computed_states.len(), 3);
    assert_eq!(snapshot.current_state_index, 2);
}

#[test]
fn test_excess_becomes_sticky_at_max_age() {
    let mut h = RelayHarness::new();
    let store = h.counter(
        "a",
        RelayConfig {
            max_age: Some(3),
            ..Default::default()
        },
    );
    h.drain();

    let mut flags = Vec::new();
    for _ in 0..6 {
        store.dispatch(action("INC")).unwrap();
        let sent = h.drain();
        flags.push(sent[0].content.is_excess.unwrap());
    }
    assert_eq!(flags, vec![false, false, true, true, true, true]);
    assert_eq!(store.lifted_state().staged_action_ids.len(), 3);
    assert_eq!(store.state(), json!(6));
}

#[test]
fn test_excess_is_per_instance() {
    let mut h = RelayHarness::new();
    let capped = h.counter(
        "capped",
        RelayConfig {
            max_age: Some(2),
            ..Default::default()
        },
    );
    let other = h.counter("other", RelayConfig::default());
    h.drain();

    for _ in 0..3 {
        capped.dispatch(action("INC")).unwrap();
    }
    other.dispatch(action("INC")).unwrap();
    let sent = h.drain();
    let last = sent.last().unwrap();
    assert_eq!(last.content.id, "other");
    assert_eq!(last.content.is_excess, Some(false));
}

#[test]
fn test_repeated_update_is_idempotent() {
    let mut h = RelayHarness::new();
    let store = h.counter("a", RelayConfig::default());
    store.dispatch(action("INC")).unwrap();
    h.drain();

    h.send(&InboundMessage::new(MessageType::Update, "a"));
    h.send(&InboundMessage::new(MessageType::Update, "a"));
    let sent = h.drain();
    assert_eq!(kinds(&sent), vec![MessageType::State, MessageType::State]);
    assert_eq!(sent[0].content.payload, sent[1].content.payload);

    store.dispatch(action("INC")).unwrap();
    assert_eq!(kinds(&h.drain()), vec![MessageType::Action]);
}

#[test]
fn test_import_round_trip() {
    let mut h = RelayHarness::new();
    let source = h.counter("source", RelayConfig::default());
    source.dispatch(action("INC")).unwrap();
    source.dispatch(action("INC")).unwrap();
    source.dispatch(action("DEC")).unwrap();
    h.drain();

    h.send(&InboundMessage::new(MessageType::Update, "source"));
    let exported = h.drain()[0].content.payload.clone().unwrap();

    let target = h.counter("target", RelayConfig::default());
    h.drain();
    let mut import = InboundMessage::new(MessageType::Import, "target");
    import.state = Some(Value::String(exported));
    h.send(&import);

    let sent = h.drain();
    assert!(!sent.is_empty());
    assert!(sent.iter().all(|e| e.content.kind == MessageType::State));
    assert!(sent.iter().all(|e| e.content.id == "target"));

    let exported_lifted = source.lifted_state();
    let imported = target.lifted_state();
    assert_eq!(imported.staged_action_ids, exported_lifted.staged_action_ids);
    assert_eq!(imported.computed_states, exported_lifted.computed_states);
    assert_eq!(target.state(), json!(1));
}

#[test]
fn test_pause_suppresses_exactly_one_change() {
    let mut h = RelayHarness::new();
    let store = h.counter("a", RelayConfig::default());
    h.drain();

    store
        .dispatch_lifted(LiftedAction::PauseRecording { status: true })
        .unwrap();
    assert_eq!(kinds(&h.drain()), vec![MessageType::State]);

    store.dispatch(action("INC")).unwrap();
    assert!(h.drain().is_empty());

    store.dispatch(action("INC")).unwrap();
    let sent = h.drain();
    assert_eq!(kinds(&sent), vec![MessageType::State]);
    let snapshot: LiftedState = serde_json::from_value(payload(&sent[0])).unwrap();
    assert!(snapshot.is_paused);
    assert_eq!(store.state(), json!(2));
}

#[test]
fn test_resume_after_pause_relays_actions_again() {
    let mut h = RelayHarness::new();
    let store = h.counter("a", RelayConfig::default());
    store
        .dispatch_lifted(LiftedAction::PauseRecording { status: true })
        .unwrap();
    store.dispatch(action("INC")).unwrap();
    store
        .dispatch_lifted(LiftedAction::PauseRecording { status: false })
        .unwrap();
    h.drain();

    store.dispatch(action("INC")).unwrap();
    let sent = h.drain();
    assert_eq!(kinds(&sent), vec![MessageType::Action]);
    assert_eq!(payload(&sent[0]), json!(2));
}

#[test]
fn test_lock_via_observer_blocks_local_dispatch() {
    let mut h = RelayHarness::new();
    let store = h.counter("a", RelayConfig::default());
    h.drain();

    h.send(&RelayHarness::message_with_action(
        MessageType::Dispatch,
        "a",
        json!({ "type": "LOCK_CHANGES", "status": true }),
    ));
    assert_eq!(kinds(&h.drain()), vec![MessageType::State]);
    assert!(store.is_locked());

    let returned = store.dispatch(action("INC")).unwrap();
    assert_eq!(returned, action("INC"));
    assert_eq!(store.state(), json!(0));
    assert!(h.drain().is_empty());
}

#[test]
fn test_unknown_creator_relays_one_error() {
    let mut h = RelayHarness::new();
    let store = h.counter_with(
        EnhancerOptions::default()
            .with_instance_id("a")
            .with_action_creators(vec![ActionCreator::new("inc", &[], |_| {
                Ok(json!({ "type": "INC" }))
            })]),
    );
    h.drain();

    h.send(&RelayHarness::message_with_action(
        MessageType::Action,
        "a",
        json!(r#"{"type":"UNKNOWN_CREATOR"}"#),
    ));
    let sent = h.drain();
    assert_eq!(kinds(&sent), vec![MessageType::Error]);
    assert_eq!(
        sent[0].content.payload.as_deref(),
        Some("unknown action creator `UNKNOWN_CREATOR`")
    );
    assert_eq!(store.state(), json!(0));
}

#[test]
fn test_remote_action_through_creators() {
    let mut h = RelayHarness::new();
    let store = h.counter_with(
        EnhancerOptions::default()
            .with_instance_id("a")
            .with_action_creators(vec![
                ActionCreator::new("inc", &[], |_| Ok(json!({ "type": "INC" }))),
                ActionCreator::new("DEC", &[], |_| Ok(json!({ "type": "DEC" }))),
            ]),
    );
    let initial = h.drain();
    assert_eq!(
        action_field(&initial[0]),
        json!([{ "name": "inc", "args": [] }, { "name": "DEC", "args": [] }])
    );

    h.send(&RelayHarness::message_with_action(
        MessageType::Action,
        "a",
        json!(r#"{"selected":0,"args":[]}"#),
    ));
    h.send(&RelayHarness::message_with_action(
        MessageType::Action,
        "a",
        json!(r#"{"name":"inc","args":[]}"#),
    ));
    h.send(&RelayHarness::message_with_action(
        MessageType::Action,
        "a",
        json!(r#"{"type":"DEC"}"#),
    ));

    assert_eq!(
        kinds(&h.drain()),
        vec![MessageType::Action, MessageType::Action, MessageType::Action]
    );
    assert_eq!(store.state(), json!(1));
}

#[test]
fn test_remote_action_reducer_failure_relays_error() {
    let mut h = RelayHarness::new();
    let store = h.counter_with(
        EnhancerOptions::default()
            .with_instance_id("a")
            .with_action_creators(vec![ActionCreator::new("boom", &[], |_| {
                Ok(json!({ "type": "BOOM" }))
            })]),
    );
    h.drain();

    h.send(&RelayHarness::message_with_action(
        MessageType::Action,
        "a",
        json!(r#"{"name":"boom"}"#),
    ));
    let sent = h.drain();
    assert_eq!(kinds(&sent), vec![MessageType::Error]);
    assert_eq!(sent[0].content.payload.as_deref(), Some("counter exploded"));
    assert_eq!(store.lifted_state().next_action_id, 1);
}

#[test]
fn test_to_all_update_fans_out() {
    let mut h = RelayHarness::new();
    let a = h.counter("A", RelayConfig::default());
    h.counter("B", RelayConfig::default());
    a.dispatch(action("INC")).unwrap();
    h.drain();

    let mut message = InboundMessage::new(MessageType::Update, "ignored");
    message.to_all = true;
    h.send(&message);

    let sent = h.drain();
    assert_eq!(kinds(&sent), vec![MessageType::State, MessageType::State]);
    assert_eq!(sent[0].content.id, "A");
    assert_eq!(sent[1].content.id, "B");
    assert_eq!(payload(&sent[0])["stagedActionIds"], json!([0, 1]));
    assert_eq!(payload(&sent[1])["stagedActionIds"], json!([0]));
}

#[test]
fn test_instance_id_field_is_accepted() {
    let mut h = RelayHarness::new();
    h.counter("a", RelayConfig::default());
    h.drain();

    let message: InboundMessage =
        serde_json::from_value(json!({ "type": "UPDATE", "instanceId": "a" })).unwrap();
    h.send(&message);
    assert_eq!(kinds(&h.drain()), vec![MessageType::State]);
}

#[test]
fn test_toggle_relays_state_and_jump_does_not() {
    let mut h = RelayHarness::new();
    let store = h.counter("a", RelayConfig::default());
    store.dispatch(action("INC")).unwrap();
    store.dispatch(action("INC")).unwrap();
    h.drain();

    h.send(&RelayHarness::message_with_action(
        MessageType::Dispatch,
        "a",
        json!({ "type": "TOGGLE_ACTION", "id": 1 }),
    ));
    assert_eq!(kinds(&h.drain()), vec![MessageType::State]);
    assert_eq!(store.state(), json!(1));

    h.send(&RelayHarness::message_with_action(
        MessageType::Dispatch,
        "a",
        json!({ "type": "JUMP_TO_STATE", "index": 0 }),
    ));
    assert!(h.drain().is_empty());
    assert_eq!(store.state(), json!(0));
}

#[test]
fn test_state_sanitizer_applies_to_both_message_kinds() {
    let mut h = RelayHarness::new();
    let store = h.counter_with(
        EnhancerOptions::default()
            .with_instance_id("a")
            .with_state_sanitizer(Arc::new(|_state: &Value, index: u64| {
                json!({ "redacted": index })
            })),
    );
    let initial = h.drain();
    assert_eq!(
        payload(&initial[0])["computedStates"][0]["state"],
        json!({ "redacted": 0 })
    );

    store.dispatch(action("INC")).unwrap();
    let sent = h.drain();
    assert_eq!(payload(&sent[0]), json!({ "redacted": 1 }));
    assert_eq!(store.state(), json!(1));
}

#[test]
fn test_predicate_prunes_state_snapshots() {
    let mut h = RelayHarness::new();
    let store = h.counter_with(
        EnhancerOptions::default()
            .with_instance_id("a")
            .with_predicate(Arc::new(|state: &Value, _action: &Value| {
                state.as_i64().unwrap_or(0) % 2 == 0
            })),
    );
    for _ in 0..4 {
        store.dispatch(action("INC")).unwrap();
    }
    h.drain();

    h.send(&InboundMessage::new(MessageType::Update, "a"));
    let snapshot: LiftedState = serde_json::from_value(payload(&h.drain()[0])).unwrap();
    assert_eq!(snapshot.staged_action_ids, vec![0, 2, 4]);
}

#[test]
fn test_replace_reducer_relays_state() {
    let mut h = RelayHarness::new();
    let store = h.counter("a", RelayConfig::default());
    store.dispatch(action("INC")).unwrap();
    h.drain();

    let doubled: devrelay_core::Reducer = Arc::new(|state: &Value, action: &Value| {
        let n = state.as_i64().unwrap_or(0);
        match devrelay_core::lifted::action_type(action) {
            Some("INC") => Ok(json!(n + 2)),
            _ => Ok(state.clone()),
        }
    });
    store.replace_reducer(doubled).unwrap();

    let sent = h.drain();
    assert_eq!(kinds(&sent), vec![MessageType::State]);
    assert_eq!(store.state(), json!(2));
}

#[tokio::test]
async fn test_listen_loop_serves_observer_events() {
    let (transport, inbound, observer) = devrelay_core::channel_pair();
    let relay = devrelay_core::Relay::new(transport);
    let store = relay
        .enhance(
            EnhancerOptions::default().with_instance_id("a"),
            crate::harness::counter_reducer(),
            json!(0),
        )
        .unwrap();
    let (mut outbound, events) = observer.split();
    assert_eq!(outbound.recv().await.unwrap().content.kind, MessageType::State);

    let listener = {
        let relay = relay.clone();
        tokio::spawn(async move { relay.listen(inbound).await })
    };

    let mut lock = InboundMessage::new(MessageType::Dispatch, "a");
    lock.action = Some(json!({ "type": "LOCK_CHANGES", "status": true }));
    events.send(devrelay_core::InboundEvent::relay(&lock)).unwrap();
    events
        .send(devrelay_core::InboundEvent::relay(&InboundMessage::new(
            MessageType::Update,
            "a",
        )))
        .unwrap();

    assert_eq!(outbound.recv().await.unwrap().content.kind, MessageType::State);
    assert_eq!(outbound.recv().await.unwrap().content.kind, MessageType::State);
    assert!(store.is_locked());

    drop(events);
    listener.await.unwrap();
}

#[test]
fn test_lock_suppresses_exactly_one_remote_change() {
    let mut h = RelayHarness::new();
    let store = h.counter_with(
        EnhancerOptions::default()
            .with_instance_id("a")
            .with_action_creators(vec![ActionCreator::new("inc", &[], |_| {
                Ok(json!({ "type": "INC" }))
            })]),
    );
    h.drain();

    h.send(&RelayHarness::message_with_action(
        MessageType::Dispatch,
        "a",
        json!({ "type": "LOCK_CHANGES", "status": true }),
    ));
    assert_eq!(kinds(&h.drain()), vec![MessageType::State]);
    assert!(store.is_locked());

    let remote_inc =
        RelayHarness::message_with_action(MessageType::Action, "a", json!(r#"{"name":"inc"}"#));
    h.send(&remote_inc);
    assert!(h.drain().is_empty());

    h.send(&remote_inc);
    let sent = h.drain();
    assert_eq!(kinds(&sent), vec![MessageType::State]);
    let snapshot: LiftedState = serde_json::from_value(payload(&sent[0])).unwrap();
    assert!(snapshot.is_locked);
    assert_eq!(snapshot.staged_action_ids, vec![0]);
    assert_eq!(store.state(), json!(0));
}

#[test]
fn test_reused_instance_id_silences_replaced_store() {
    let mut h = RelayHarness::new();
    let replaced = h.counter("a", RelayConfig::default());
    let current = h.counter("a", RelayConfig::default());
    h.drain();

    replaced.dispatch(action("INC")).unwrap();
    assert!(h.drain().is_empty());
    assert_eq!(replaced.state(), json!(1));

    current.dispatch(action("INC")).unwrap();
    let sent = h.drain();
    assert_eq!(kinds(&sent), vec![MessageType::Action]);
    assert_eq!(payload(&sent[0]), json!(1));
    assert_eq!(h.relay.registry().len(), 1);
}
