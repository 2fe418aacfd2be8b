//! Relay configuration: serializable enhancer options plus the callback-valued
//! extras (action creators, sanitizers, filter predicate).

use crate::creators::{ActionCreator, ActionCreators, CreatorSupplier};
use crate::filters::{FilterConfig, Sanitizer, Sanitizers, StatePredicate};
use crate::instrument::InstrumentOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default cap on staged actions.
pub const DEFAULT_MAX_AGE: usize = 30;

/// Default action type recorded while paused.
pub const DEFAULT_PAUSE_ACTION_TYPE: &str = "@@PAUSED";

/// Options for enhancing one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Display label (defaults to the instance id).
    pub name: Option<String>,
    /// Instance id (random when absent).
    pub instance_id: Option<String>,
    /// Cap on staged actions; `None` or 0 disables capping.
    pub max_age: Option<usize>,
    /// Record reducer failures in the history instead of failing dispatch.
    pub should_catch_errors: bool,
    /// Replay history through a replaced reducer.
    pub should_hot_reload: bool,
    /// Start recording immediately.
    pub should_record_changes: bool,
    /// Start with local dispatches blocked.
    pub should_start_locked: bool,
    /// Action type recorded while paused.
    pub pause_action_type: Option<String>,
    /// Action type patterns never relayed.
    pub actions_blacklist: Vec<String>,
    /// Only action types matching these are relayed.
    pub actions_whitelist: Vec<String>,
    /// Explicit filter; its non-empty lists override the two above.
    pub filters: Option<FilterConfig>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            name: None,
            instance_id: None,
            max_age: Some(DEFAULT_MAX_AGE),
            should_catch_errors: false,
            should_hot_reload: true,
            should_record_changes: true,
            should_start_locked: false,
            pause_action_type: Some(DEFAULT_PAUSE_ACTION_TYPE.to_string()),
            actions_blacklist: Vec::new(),
            actions_whitelist: Vec::new(),
            filters: None,
        }
    }
}

impl RelayConfig {
    /// Load from a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => Ok(toml::from_str(&contents)?),
            "json" => Ok(serde_json::from_str(&contents)?),
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        }
    }

    /// Effective max age (0 means unbounded).
    pub fn effective_max_age(&self) -> Option<usize> {
        self.max_age.filter(|age| *age > 0)
    }

    /// Merged filter lists, or None if nothing is filtered.
    pub fn filter_config(&self) -> Option<FilterConfig> {
        let mut merged = FilterConfig {
            whitelist: self.actions_whitelist.clone(),
            blacklist: self.actions_blacklist.clone(),
        };
        if let Some(filters) = &self.filters {
            if !filters.whitelist.is_empty() {
                merged.whitelist = filters.whitelist.clone();
            }
            if !filters.blacklist.is_empty() {
                merged.blacklist = filters.blacklist.clone();
            }
        }
        (!merged.is_empty()).then_some(merged)
    }

    /// Options for the time-travel store.
    pub fn instrument_options(&self) -> InstrumentOptions {
        InstrumentOptions {
            max_age: self.effective_max_age(),
            should_catch_errors: self.should_catch_errors,
            should_hot_reload: self.should_hot_reload,
            should_record_changes: self.should_record_changes,
            should_start_locked: self.should_start_locked,
            pause_action_type: self.pause_action_type.clone(),
        }
    }
}

/// Everything needed to enhance a store.
#[derive(Default)]
pub struct EnhancerOptions {
    /// Serializable options.
    pub config: RelayConfig,
    pub(crate) creators: ActionCreators,
    pub(crate) sanitizers: Sanitizers,
    pub(crate) predicate: Option<StatePredicate>,
}

impl EnhancerOptions {
    /// Options from a config.
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Use a fixed instance id.
    pub fn with_instance_id(mut self, id: impl Into<String>) -> Self {
        self.config.instance_id = Some(id.into());
        self
    }

    /// Use a display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    /// Creators available to remote ACTION messages.
    pub fn with_action_creators(mut self, creators: Vec<ActionCreator>) -> Self {
        self.creators = ActionCreators::from_list(creators);
        self
    }

    /// Creators resolved on first relay.
    pub fn with_creator_supplier(mut self, supplier: CreatorSupplier) -> Self {
        self.creators = ActionCreators::from_supplier(supplier);
        self
    }

    /// Sanitize app states before they are relayed.
    pub fn with_state_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizers.state = Some(sanitizer);
        self
    }

    /// Sanitize app actions before they are relayed.
    pub fn with_action_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizers.action = Some(sanitizer);
        self
    }

    /// Custom `(state, action) -> keep` filter for STATE relays.
    pub fn with_predicate(mut self, predicate: StatePredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }
}
