#![forbid(unsafe_code)]

//! In-memory host runtime.
//!
//! [`Instance`] implements [`HostInstance`] over a [`HostDefinition`] the way
//! a host component runtime would, deterministically and without a renderer:
//!
//! - initial state is property defaults, then each behaviour's data, then the
//!   definition's data;
//! - a native commit parses every key first, applies the payload, fires the
//!   matching observers in declaration order (each one reads the value at
//!   its path when it runs), then runs the completion callback;
//! - lifecycle events run the matching hook of every behaviour in order.
//!
//! Every natively applied payload is recorded in
//! [`commit_log`](Instance::commit_log).
//!
//! # Example
//!
//! ```
//! use optbridge_core::host::{self, Behavior, HostDefinition};
//! use optbridge_core::{HostInstance, Map, Value};
//! use optbridge_harness::Instance;
//!
//! let mut definition = HostDefinition::new();
//! definition.data.insert("count".into(), Value::from(1));
//! definition.append_behavior(Behavior::new("log").observe(
//!     "count",
//!     host::observer(|_, value| {
//!         assert_eq!(value, Some(&Value::from(2)));
//!         Ok(())
//!     }),
//! ));
//!
//! let mut instance = Instance::create(&definition).unwrap();
//! let mut payload = Map::new();
//! payload.insert("count".into(), Value::from(2));
//! instance.commit(payload).unwrap();
//! assert_eq!(instance.data().get("count"), Some(&Value::from(2)));
//! ```

use std::fmt;
use std::rc::Rc;

use optbridge_core::host::{
    Behavior, CommitCallback, CommitInterceptor, HostDefinition, HostHook, HostInstance,
    HostMethod, HostObserver,
};
use optbridge_core::path::{self, ObserverPattern, Path};
use optbridge_core::{Error, InstanceId, Result, State, Value};
use tracing::{debug, trace};

/// Where an instance is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// State and observers are set up; no hook has run.
    Prepared,
    Created,
    Attached,
    Detached,
}

/// A host component instance.
pub struct Instance {
    id: InstanceId,
    data: State,
    property_names: Vec<String>,
    observers: Rc<Vec<(ObserverPattern, HostObserver)>>,
    behaviors: Rc<Vec<Behavior>>,
    methods: Rc<Vec<(String, HostMethod)>>,
    interceptor: Option<Rc<dyn CommitInterceptor>>,
    phase: Phase,
    commit_log: Vec<State>,
}

impl Instance {
    /// Set up state and observers without running any hook.
    pub fn prepare(definition: &HostDefinition) -> Result<Self> {
        let mut data: State = definition
            .properties
            .iter()
            .map(|(name, spec)| (name.clone(), spec.default.clone()))
            .collect();
        for behavior in &definition.behaviors {
            data.extend(behavior.data.clone());
        }
        data.extend(definition.data.clone());

        let mut observers = Vec::new();
        for behavior in &definition.behaviors {
            for (key, observer) in &behavior.observers {
                observers.push((ObserverPattern::parse(key)?, Rc::clone(observer)));
            }
        }

        let id = InstanceId::next();
        debug!(instance = %id, observers = observers.len(), "instance prepared");
        Ok(Self {
            id,
            data,
            property_names: definition.properties.iter().map(|(n, _)| n.clone()).collect(),
            observers: Rc::new(observers),
            behaviors: Rc::new(definition.behaviors.clone()),
            methods: Rc::new(definition.methods.clone()),
            interceptor: None,
            phase: Phase::Prepared,
            commit_log: Vec::new(),
        })
    }

    /// Prepare an instance and run its `created` hooks.
    pub fn create(definition: &HostDefinition) -> Result<Self> {
        let mut instance = Self::prepare(definition)?;
        instance.run_created()?;
        Ok(instance)
    }

    /// Run the `created` hooks of a prepared instance.
    pub fn run_created(&mut self) -> Result<()> {
        self.expect_phase(Phase::Prepared, "created")?;
        self.phase = Phase::Created;
        self.run_hooks("created", |b| b.lifetimes.created.as_ref())
    }

    /// Attach without property overrides.
    pub fn mount(&mut self) -> Result<()> {
        self.mount_with(State::new())
    }

    /// Apply external property overrides natively, then run `attached` and
    /// `ready` hooks.
    pub fn mount_with(&mut self, overrides: State) -> Result<()> {
        self.expect_phase(Phase::Created, "attached")?;
        if !overrides.is_empty() {
            trace!(instance = %self.id, keys = overrides.len(), "applying overrides");
            self.native_set_data(overrides, None)?;
        }
        self.phase = Phase::Attached;
        self.run_hooks("attached", |b| b.lifetimes.attached.as_ref())?;
        self.run_hooks("ready", |b| b.ready.as_ref())
    }

    /// Run `detached` hooks.
    pub fn detach(&mut self) -> Result<()> {
        if self.phase == Phase::Detached {
            return Err(Error::host(format!("instance {} already detached", self.id)));
        }
        self.phase = Phase::Detached;
        self.run_hooks("detached", |b| b.lifetimes.detached.as_ref())
    }

    pub fn show(&mut self) -> Result<()> {
        self.run_hooks("show", |b| b.page_lifetimes.show.as_ref())
    }

    pub fn hide(&mut self) -> Result<()> {
        self.run_hooks("hide", |b| b.page_lifetimes.hide.as_ref())
    }

    pub fn resize(&mut self) -> Result<()> {
        self.run_hooks("resize", |b| b.page_lifetimes.resize.as_ref())
    }

    /// The instance moved within its parent.
    pub fn moved(&mut self) -> Result<()> {
        self.run_hooks("moved", |b| b.moved.as_ref())
    }

    /// Commit through the public entry point.
    pub fn commit(&mut self, payload: State) -> Result<()> {
        let host: &mut dyn HostInstance = self;
        host.set_data(payload, None)
    }

    /// Commit through the public entry point with a completion callback.
    pub fn commit_then<F>(&mut self, payload: State, then: F) -> Result<()>
    where
        F: FnOnce(&mut dyn HostInstance) -> Result<()> + 'static,
    {
        let host: &mut dyn HostInstance = self;
        host.set_data(payload, Some(Box::new(then)))
    }

    /// Call a definition method.
    pub fn call_method(&mut self, name: &str, args: &[Value]) -> Result<Value> {
        let method = self
            .methods
            .iter()
            .find_map(|(key, method)| (key == name).then(|| Rc::clone(method)))
            .ok_or_else(|| Error::UnknownMethod {
                name: name.to_owned(),
            })?;
        method(self, args)
    }

    /// Top-level state field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Read through a path in either dialect.
    pub fn get_path(&self, raw: &str) -> Result<Option<&Value>> {
        Ok(path::resolve_in(&self.data, &Path::parse(raw)?))
    }

    /// Payloads applied by native commits, oldest first.
    #[must_use]
    pub fn commit_log(&self) -> &[State] {
        &self.commit_log
    }

    /// Most recent natively applied payload.
    #[must_use]
    pub fn last_commit(&self) -> Option<&State> {
        self.commit_log.last()
    }

    pub fn clear_commit_log(&mut self) {
        self.commit_log.clear();
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn expect_phase(&self, expected: Phase, event: &str) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(Error::host(format!(
                "cannot run {event} on instance {} in phase {:?}",
                self.id, self.phase
            )))
        }
    }

    fn run_hooks(
        &mut self,
        event: &'static str,
        select: impl Fn(&Behavior) -> Option<&HostHook>,
    ) -> Result<()> {
        let behaviors = Rc::clone(&self.behaviors);
        trace!(instance = %self.id, event, "lifecycle");
        for behavior in behaviors.iter() {
            if let Some(hook) = select(behavior) {
                hook(self)?;
            }
        }
        Ok(())
    }
}

impl HostInstance for Instance {
    fn id(&self) -> InstanceId {
        self.id
    }

    fn data(&self) -> &State {
        &self.data
    }

    fn property_names(&self) -> &[String] {
        &self.property_names
    }

    fn native_set_data(&mut self, payload: State, callback: Option<CommitCallback>) -> Result<()> {
        let mut changes = Vec::with_capacity(payload.len());
        for (key, value) in &payload {
            changes.push((Path::parse(key)?, value.clone()));
        }
        // All or nothing: a rejected write leaves the committed state as it was.
        let mut next = self.data.clone();
        for (path, value) in &changes {
            path::assign(&mut next, path, value.clone())?;
        }
        self.data = next;
        trace!(instance = %self.id, keys = payload.len(), "native commit");
        self.commit_log.push(payload);

        let observers = Rc::clone(&self.observers);
        for (pattern, observer) in observers.iter() {
            if !changes.iter().any(|(path, _)| pattern.matches(path)) {
                continue;
            }
            let value = pattern
                .path()
                .and_then(|p| path::snapshot_at(&self.data, p));
            observer(self, value.as_ref())?;
        }

        match callback {
            Some(callback) => callback(self),
            None => Ok(()),
        }
    }

    fn commit_interceptor(&self) -> Option<Rc<dyn CommitInterceptor>> {
        self.interceptor.clone()
    }

    fn replace_commit_interceptor(
        &mut self,
        interceptor: Option<Rc<dyn CommitInterceptor>>,
    ) -> Option<Rc<dyn CommitInterceptor>> {
        std::mem::replace(&mut self.interceptor, interceptor)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let observer_keys: Vec<String> = self.observers.iter().map(|(p, _)| p.key()).collect();
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("data", &self.data)
            .field("observers", &observer_keys)
            .field("intercepted", &self.interceptor.is_some())
            .field("commits", &self.commit_log.len())
            .finish()
    }
}
