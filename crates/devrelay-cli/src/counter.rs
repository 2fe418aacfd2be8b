//! Demo counter store: reducer plus the action creators offered to the observer.

use devrelay_core::lifted::action_type;
use devrelay_core::{ActionCreator, Reducer};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn reducer() -> Reducer {
    Arc::new(|state: &Value, action: &Value| {
        let n = state.as_i64().unwrap_or(0);
        match action_type(action) {
            Some("INCREMENT") => Ok(json!(n + 1)),
            Some("DECREMENT") => Ok(json!(n - 1)),
            Some("SET") => action
                .get("value")
                .and_then(Value::as_i64)
                .map(|v| json!(v))
                .ok_or_else(|| "SET needs an integer `value`".to_string()),
            _ => Ok(state.clone()),
        }
    })
}

pub fn creators() -> Vec<ActionCreator> {
    vec![
        ActionCreator::new("increment", &[], |_| Ok(json!({ "type": "INCREMENT" }))),
        ActionCreator::new("decrement", &[], |_| Ok(json!({ "type": "DECREMENT" }))),
        ActionCreator::new("SET", &["value"], |args| {
            let value = args.first().cloned().unwrap_or(Value::Null);
            Ok(json!({ "type": "SET", "value": value }))
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_reducer() {
        let reduce = reducer();
        assert_eq!(reduce(&json!(1), &json!({ "type": "INCREMENT" })).unwrap(), json!(2));
        assert_eq!(reduce(&json!(1), &json!({ "type": "DECREMENT" })).unwrap(), json!(0));
        assert_eq!(
            reduce(&json!(1), &json!({ "type": "SET", "value": 9 })).unwrap(),
            json!(9)
        );
        assert!(reduce(&json!(1), &json!({ "type": "SET" })).is_err());
        assert_eq!(reduce(&json!(4), &json!({ "type": "OTHER" })).unwrap(), json!(4));
    }
}
