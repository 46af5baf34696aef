#![forbid(unsafe_code)]

//! Contract between the adapter and the host component runtime.
//!
//! The host is a fixed external collaborator. It understands:
//!
//! - a composition primitive: [`HostDefinition`] made of [`Behavior`]
//!   fragments, each carrying `{data, observers, lifetimes, page_lifetimes,
//!   ready, moved}`;
//! - path-keyed observers (see [`ObserverPattern`](crate::path::ObserverPattern))
//!   that receive the new value at the observed path;
//! - a state-commit primitive, [`HostInstance::native_set_data`], whose
//!   callback runs after the payload has been applied and observers fired.
//!
//! The adapter never attaches fields to host instances. The only slot it
//! writes is the commit interceptor, which replaces the public commit entry
//! point ([`set_data`](trait.HostInstance.html#method.set_data)) until it is
//! removed again.
//!
//! # Behaviour order
//!
//! The host runs a lifecycle event on every behaviour in vector order. The
//! adapter relies on that: fragments appended later run later.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Map, Value};

use crate::error::Result;

/// Committed state tree of one instance.
pub type State = Map<String, Value>;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a live host instance; key of every adapter side table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Allocate a process-unique id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Completion callback of a commit.
pub type CommitCallback = Box<dyn FnOnce(&mut dyn HostInstance) -> Result<()>>;
/// Host lifecycle hook.
pub type HostHook = Rc<dyn Fn(&mut dyn HostInstance) -> Result<()>>;
/// Host path observer; receives the new value at the observed path.
pub type HostObserver = Rc<dyn Fn(&mut dyn HostInstance, Option<&Value>) -> Result<()>>;
/// Host method.
pub type HostMethod = Rc<dyn Fn(&mut dyn HostInstance, &[Value]) -> Result<Value>>;

/// Wrap a closure as a [`HostHook`].
pub fn hook<F>(f: F) -> HostHook
where
    F: Fn(&mut dyn HostInstance) -> Result<()> + 'static,
{
    Rc::new(f)
}

/// Wrap a closure as a [`HostObserver`].
pub fn observer<F>(f: F) -> HostObserver
where
    F: Fn(&mut dyn HostInstance, Option<&Value>) -> Result<()> + 'static,
{
    Rc::new(f)
}

/// Wrap a closure as a [`HostMethod`].
pub fn method<F>(f: F) -> HostMethod
where
    F: Fn(&mut dyn HostInstance, &[Value]) -> Result<Value> + 'static,
{
    Rc::new(f)
}

/// Wrap a closure as a [`CommitCallback`].
pub fn callback<F>(f: F) -> CommitCallback
where
    F: FnOnce(&mut dyn HostInstance) -> Result<()> + 'static,
{
    Box::new(f)
}

/// Replacement for the public commit entry point.
pub trait CommitInterceptor {
    fn commit(
        &self,
        host: &mut dyn HostInstance,
        payload: State,
        callback: Option<CommitCallback>,
    ) -> Result<()>;
}

/// A live host component instance.
pub trait HostInstance {
    fn id(&self) -> InstanceId;

    /// Committed state.
    fn data(&self) -> &State;

    /// Names of declared properties, in declaration order.
    fn property_names(&self) -> &[String];

    /// Apply `payload` (host-dialect path keys), fire matching observers,
    /// then run `callback`. Never intercepted.
    fn native_set_data(&mut self, payload: State, callback: Option<CommitCallback>) -> Result<()>;

    /// Currently installed interceptor, if any.
    fn commit_interceptor(&self) -> Option<Rc<dyn CommitInterceptor>>;

    /// Install (`Some`) or remove (`None`) the interceptor, returning the
    /// previous one.
    fn replace_commit_interceptor(
        &mut self,
        interceptor: Option<Rc<dyn CommitInterceptor>>,
    ) -> Option<Rc<dyn CommitInterceptor>>;
}

impl dyn HostInstance + '_ {
    /// Public commit entry point: routed through the interceptor when one is
    /// installed, otherwise straight to the native commit.
    pub fn set_data(&mut self, payload: State, callback: Option<CommitCallback>) -> Result<()> {
        match self.commit_interceptor() {
            Some(interceptor) => interceptor.commit(self, payload, callback),
            None => self.native_set_data(payload, callback),
        }
    }
}

/// Host lifecycle hooks of one behaviour.
#[derive(Clone, Default)]
pub struct Lifetimes {
    pub created: Option<HostHook>,
    pub attached: Option<HostHook>,
    pub detached: Option<HostHook>,
}

/// Page-level events forwarded to components.
#[derive(Clone, Default)]
pub struct PageLifetimes {
    pub show: Option<HostHook>,
    pub hide: Option<HostHook>,
    pub resize: Option<HostHook>,
}

fn flags<const N: usize>(slots: [(&'static str, bool); N]) -> Vec<&'static str> {
    slots
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
}

impl fmt::Debug for Lifetimes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(flags([
                ("created", self.created.is_some()),
                ("attached", self.attached.is_some()),
                ("detached", self.detached.is_some()),
            ]))
            .finish()
    }
}

impl fmt::Debug for PageLifetimes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(flags([
                ("show", self.show.is_some()),
                ("hide", self.hide.is_some()),
                ("resize", self.resize.is_some()),
            ]))
            .finish()
    }
}

/// Composable host fragment.
#[derive(Clone, Default)]
pub struct Behavior {
    /// Diagnostic label.
    pub name: String,
    pub data: State,
    /// Observer declarations in order; keys may repeat across behaviours.
    pub observers: Vec<(String, HostObserver)>,
    pub lifetimes: Lifetimes,
    pub page_lifetimes: PageLifetimes,
    pub ready: Option<HostHook>,
    pub moved: Option<HostHook>,
}

impl Behavior {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn on_created(mut self, hook: HostHook) -> Self {
        self.lifetimes.created = Some(hook);
        self
    }

    #[must_use]
    pub fn on_attached(mut self, hook: HostHook) -> Self {
        self.lifetimes.attached = Some(hook);
        self
    }

    #[must_use]
    pub fn on_detached(mut self, hook: HostHook) -> Self {
        self.lifetimes.detached = Some(hook);
        self
    }

    #[must_use]
    pub fn observe(mut self, key: impl Into<String>, observer: HostObserver) -> Self {
        self.observers.push((key.into(), observer));
        self
    }
}

impl fmt::Debug for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let observer_keys: Vec<&str> = self.observers.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("Behavior")
            .field("name", &self.name)
            .field("data", &self.data)
            .field("observers", &observer_keys)
            .field("lifetimes", &self.lifetimes)
            .field("page_lifetimes", &self.page_lifetimes)
            .field("ready", &self.ready.is_some())
            .field("moved", &self.moved.is_some())
            .finish()
    }
}

/// Declared property type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropertyType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    #[default]
    Any,
}

impl PropertyType {
    /// Value a property of this type holds when no default is declared.
    #[must_use]
    pub fn zero_value(self) -> Value {
        match self {
            Self::String => Value::String(String::new()),
            Self::Number => Value::from(0),
            Self::Boolean => Value::Bool(false),
            Self::Array => Value::Array(Vec::new()),
            Self::Object | Self::Any => Value::Null,
        }
    }
}

/// Declared property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySpec {
    pub ty: PropertyType,
    pub default: Value,
}

impl PropertySpec {
    #[must_use]
    pub fn new(ty: PropertyType) -> Self {
        Self {
            ty,
            default: ty.zero_value(),
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }
}

/// Final definition handed to the host.
#[derive(Clone, Default)]
pub struct HostDefinition {
    pub properties: Vec<(String, PropertySpec)>,
    pub data: State,
    pub methods: Vec<(String, HostMethod)>,
    /// Run in order for every lifecycle event.
    pub behaviors: Vec<Behavior>,
}

impl HostDefinition {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fragment that runs after every existing one.
    pub fn append_behavior(&mut self, behavior: Behavior) {
        self.behaviors.push(behavior);
    }

    /// Add a fragment that runs before every existing one.
    pub fn prepend_behavior(&mut self, behavior: Behavior) {
        self.behaviors.insert(0, behavior);
    }

    #[must_use]
    pub fn behavior_names(&self) -> Vec<&str> {
        self.behaviors.iter().map(|b| b.name.as_str()).collect()
    }

    #[must_use]
    pub fn method(&self, name: &str) -> Option<&HostMethod> {
        self.methods
            .iter()
            .find_map(|(key, method)| (key == name).then_some(method))
    }
}

impl fmt::Debug for HostDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods: Vec<&str> = self.methods.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("HostDefinition")
            .field("properties", &self.properties)
            .field("data", &self.data)
            .field("methods", &methods)
            .field("behaviors", &self.behaviors)
            .finish()
    }
}
