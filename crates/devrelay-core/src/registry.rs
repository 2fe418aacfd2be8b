//! Instance registry: every enhanced store, keyed by instance id.
//!
//! Instances live for the whole process. Re-registering an id replaces the
//! entry but keeps its registration position, so "first registered" stays
//! stable for fallbacks and fan-out order.

use crate::creators::ActionCreators;
use crate::filters::{ActionFilter, Sanitizers};
use crate::instrument::{DevToolsStore, Listener};
use crate::lifted::LiftedState;
use crate::recording::RecordingMode;
use parking_lot::{Mutex, MutexGuard, RwLock};
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_LEN: usize = 11;

/// Returns `id`, or a random base-36 identifier if none was supplied.
pub fn generate_id(id: Option<&str>) -> String {
    if let Some(id) = id.filter(|id| !id.is_empty()) {
        return id.to_string();
    }
    let mut rng = rand::thread_rng();
    (0..ID_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// One enhanced store plus its relay configuration.
///
/// The store and the recording flags sit behind separate locks. The store
/// lock is held while its listeners run, so listeners may take the
/// recording lock but must never take the store lock.
pub struct Instance {
    id: String,
    name: String,
    store: Mutex<Box<dyn DevToolsStore>>,
    filters: Option<ActionFilter>,
    creators: ActionCreators,
    sanitizers: Sanitizers,
    max_age: Option<usize>,
    recording: Mutex<RecordingMode>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("filters", &self.filters)
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl Instance {
    /// Create an instance around `store`. An empty `name` falls back to `id`.
    pub fn new(
        id: impl Into<String>,
        name: Option<String>,
        store: Box<dyn DevToolsStore>,
        filters: Option<ActionFilter>,
        creators: ActionCreators,
        sanitizers: Sanitizers,
        max_age: Option<usize>,
    ) -> Self {
        let id = id.into();
        let name = name.filter(|n| !n.is_empty()).unwrap_or_else(|| id.clone());
        let recording = RecordingMode::from_lifted(store.lifted_state());
        Self {
            id,
            name,
            store: Mutex::new(store),
            filters,
            creators,
            sanitizers,
            max_age,
            recording: Mutex::new(recording),
        }
    }

    /// Instance id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display label.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compiled action filter, if any.
    pub fn filters(&self) -> Option<&ActionFilter> {
        self.filters.as_ref()
    }

    /// Action creator table.
    pub fn creators(&self) -> &ActionCreators {
        &self.creators
    }

    /// Configured sanitizers.
    pub fn sanitizers(&self) -> &Sanitizers {
        &self.sanitizers
    }

    /// History cap used for the excess flag.
    pub fn max_age(&self) -> Option<usize> {
        self.max_age
    }

    /// Exclusive access to the store.
    pub fn store(&self) -> MutexGuard<'_, Box<dyn DevToolsStore>> {
        self.store.lock()
    }

    /// Exclusive access to the recording flags.
    pub fn recording(&self) -> MutexGuard<'_, RecordingMode> {
        self.recording.lock()
    }

    /// Copy of the store's lifted state.
    pub fn lifted_state(&self) -> LiftedState {
        self.store.lock().lifted_state().clone()
    }

    /// Whether local dispatches are currently swallowed.
    pub fn is_locked(&self) -> bool {
        self.recording.lock().is_locked()
    }

    /// Swap in a new store, subscribing `listener` to it first.
    pub fn replace_store(&self, mut store: Box<dyn DevToolsStore>, listener: Listener) {
        store.subscribe(listener);
        *self.store.lock() = store;
        debug!(instance_id = %self.id, "store replaced");
    }
}

#[derive(Default)]
struct RegistryInner {
    instances: HashMap<String, Arc<Instance>>,
    order: Vec<String>,
}

/// Registry of live instances.
#[derive(Default)]
pub struct InstanceRegistry {
    inner: RwLock<RegistryInner>,
}

impl InstanceRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance, replacing any entry with the same id.
    pub fn register(&self, instance: Arc<Instance>) -> Option<Arc<Instance>> {
        let id = instance.id().to_string();
        let mut inner = self.inner.write();
        let previous = inner.instances.insert(id.clone(), instance);
        if previous.is_none() {
            inner.order.push(id.clone());
            info!(instance_id = %id, "instance registered");
        } else {
            info!(instance_id = %id, "instance re-registered");
        }
        previous
    }

    /// Whether `instance` is the entry currently registered under its id.
    pub fn is_current(&self, instance: &Instance) -> bool {
        self.inner
            .read()
            .instances
            .get(instance.id())
            .is_some_and(|found| std::ptr::eq(Arc::as_ptr(found), instance))
    }

    /// Lookup an instance by id. Returns None if not found.
    pub fn lookup(&self, id: &str) -> Option<Arc<Instance>> {
        self.inner.read().instances.get(id).cloned()
    }

    /// The first instance registered, if any.
    pub fn first(&self) -> Option<Arc<Instance>> {
        let inner = self.inner.read();
        inner
            .order
            .first()
            .and_then(|id| inner.instances.get(id))
            .cloned()
    }

    /// Ids in registration order.
    pub fn ids(&self) -> Vec<String> {
        self.inner.read().order.clone()
    }

    /// Call `f` for every instance in registration order.
    ///
    /// Works on a snapshot, so `f` may use the registry freely.
    pub fn for_each_instance(&self, mut f: impl FnMut(&Arc<Instance>)) {
        let snapshot: Vec<Arc<Instance>> = {
            let inner = self.inner.read();
            inner
                .order
                .iter()
                .filter_map(|id| inner.instances.get(id).cloned())
                .collect()
        };
        for instance in &snapshot {
            f(instance);
        }
    }

    /// Number of registered instances.
    pub fn len(&self) -> usize {
        self.inner.read().instances.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.read().instances.is_empty()
    }
}
