//! Action creators and the evaluator that rebuilds remote-constructed actions.
//!
//! The observer sends actions as text. Evaluation is two-stage: the text is
//! decoded into a generic value, then matched against the instance's creator
//! table. Anything that does not name a known creator is rejected.

use crate::codec::Codec;
use crate::error::RelayError;
use crate::lifted::action_type;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Body of an action creator: positional arguments in, action out.
pub type CreatorFn = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// Lazily called supplier of the creator table.
pub type CreatorSupplier = Arc<dyn Fn() -> Vec<ActionCreator> + Send + Sync>;

/// A named function producing app actions.
#[derive(Clone)]
pub struct ActionCreator {
    name: String,
    args: Vec<String>,
    func: CreatorFn,
}

impl fmt::Debug for ActionCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionCreator")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish()
    }
}

/// What the observer is told about a creator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatorDescriptor {
    /// Creator name.
    pub name: String,
    /// Argument names, in call order.
    pub args: Vec<String>,
}

impl ActionCreator {
    /// Create a creator named `name` taking the named `args`.
    pub fn new<F>(name: impl Into<String>, args: &[&str], func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            func: Arc::new(func),
        }
    }

    /// Creator name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Argument names.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Descriptor sent to the observer.
    pub fn descriptor(&self) -> CreatorDescriptor {
        CreatorDescriptor {
            name: self.name.clone(),
            args: self.args.clone(),
        }
    }

    /// Invoke the creator; the result must be an action with a string `type`.
    pub fn call(&self, args: &[Value]) -> Result<Value, RelayError> {
        let action = (self.func)(args).map_err(RelayError::evaluation)?;
        if action_type(&action).is_none() {
            return Err(RelayError::evaluation(format!(
                "action creator `{}` did not return an action with a `type`",
                self.name
            )));
        }
        Ok(action)
    }
}

enum CreatorSource {
    Empty,
    List(Vec<ActionCreator>),
    Supplier(CreatorSupplier),
}

/// Creator table of one instance, resolved at most once.
pub struct ActionCreators {
    source: CreatorSource,
    resolved: OnceLock<Vec<ActionCreator>>,
}

impl Default for ActionCreators {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for ActionCreators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionCreators")
            .field("resolved", &self.resolved.get().map(Vec::len))
            .finish()
    }
}

impl ActionCreators {
    /// No creators: every remote ACTION fails evaluation.
    pub fn empty() -> Self {
        Self {
            source: CreatorSource::Empty,
            resolved: OnceLock::new(),
        }
    }

    /// A precomputed creator list.
    pub fn from_list(creators: Vec<ActionCreator>) -> Self {
        Self {
            source: CreatorSource::List(creators),
            resolved: OnceLock::new(),
        }
    }

    /// A supplier called on first use.
    pub fn from_supplier(supplier: CreatorSupplier) -> Self {
        Self {
            source: CreatorSource::Supplier(supplier),
            resolved: OnceLock::new(),
        }
    }

    /// Returns true once the table has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// The creator table, resolving it on first call.
    pub fn resolve(&self) -> &[ActionCreator] {
        self.resolved.get_or_init(|| match &self.source {
            CreatorSource::Empty => Vec::new(),
            CreatorSource::List(list) => list.clone(),
            CreatorSource::Supplier(supplier) => supplier(),
        })
    }

    /// Descriptors of every creator, or None if there are none.
    pub fn descriptors(&self) -> Option<Vec<CreatorDescriptor>> {
        let creators = self.resolve();
        if creators.is_empty() {
            return None;
        }
        Some(creators.iter().map(ActionCreator::descriptor).collect())
    }
}

enum CreatorRef {
    Index(usize),
    Name(String),
}

enum ActionDescription {
    Invoke { target: CreatorRef, args: Vec<Value> },
    Literal { kind: String, fields: Map<String, Value> },
}

fn decode_args(codec: &dyn Codec, value: Option<&Value>) -> Result<Vec<Value>, RelayError> {
    let items = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(RelayError::evaluation("`args` must be an array")),
    };
    Ok(items
        .iter()
        .map(|item| match item {
            Value::String(text) => codec.parse(text).unwrap_or_else(|_| item.clone()),
            other => other.clone(),
        })
        .collect())
}

fn describe(codec: &dyn Codec, value: Value) -> Result<ActionDescription, RelayError> {
    let Value::Object(fields) = value else {
        return Err(RelayError::evaluation("action description must be an object"));
    };

    if let Some(selected) = fields.get("selected") {
        let index = selected
            .as_u64()
            .ok_or_else(|| RelayError::evaluation("`selected` must be a creator index"))?;
        return Ok(ActionDescription::Invoke {
            target: CreatorRef::Index(index as usize),
            args: decode_args(codec, fields.get("args"))?,
        });
    }
    if let Some(name) = fields.get("name").and_then(Value::as_str) {
        return Ok(ActionDescription::Invoke {
            target: CreatorRef::Name(name.to_string()),
            args: decode_args(codec, fields.get("args"))?,
        });
    }
    match fields.get("type").and_then(Value::as_str) {
        Some(kind) => Ok(ActionDescription::Literal {
            kind: kind.to_string(),
            fields,
        }),
        None => Err(RelayError::evaluation(
            "action description has no `selected`, `name` or `type`",
        )),
    }
}

fn find_by_name<'a>(creators: &'a [ActionCreator], name: &str) -> Result<&'a ActionCreator, RelayError> {
    creators
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| RelayError::evaluation(format!("unknown action creator `{name}`")))
}

/// Rebuild a dispatchable action from observer-supplied text.
pub fn evaluate(
    codec: &dyn Codec,
    text: &str,
    creators: &[ActionCreator],
) -> Result<Value, RelayError> {
    let value = codec
        .parse(text)
        .map_err(|e| RelayError::evaluation(format!("malformed action: {e}")))?;

    match describe(codec, value)? {
        ActionDescription::Invoke { target, args } => {
            let creator = match target {
                CreatorRef::Index(index) => creators.get(index).ok_or_else(|| {
                    RelayError::evaluation(format!("no action creator at index {index}"))
                })?,
                CreatorRef::Name(name) => find_by_name(creators, &name)?,
            };
            creator.call(&args)
        }
        ActionDescription::Literal { kind, fields } => {
            let creator = find_by_name(creators, &kind)?;
            let args: Vec<Value> = creator
                .args
                .iter()
                .map(|arg| fields.get(arg).cloned().unwrap_or(Value::Null))
                .collect();
            creator.call(&args)
        }
    }
}
