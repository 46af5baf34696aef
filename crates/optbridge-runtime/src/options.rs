#![forbid(unsafe_code)]

//! Options-style component definitions.
//!
//! [`ComponentOptions`] is the already-parsed options object: `data`,
//! `props`, `computed`, `watch`, `methods`, native `observers` and the six
//! translated lifecycle hooks. Every callable receives a [`Vm`], the
//! instance view the adapter hands to user code.
//!
//! Map-like fields are ordered `Vec<(String, T)>`; declaration order is
//! observable (setters, watch groups and observers run in it).

use std::fmt;
use std::rc::Rc;

use optbridge_core::{PropertySpec, Result, State, Value};

use crate::installers::computed::ComputedScope;
use crate::vm::Vm;

/// Lifecycle hook with an instance view.
pub type Hook = Rc<dyn Fn(&mut Vm<'_>) -> Result<()>>;
/// Hook that runs before any adapter state exists.
pub type BareHook = Rc<dyn Fn() -> Result<()>>;
pub type Method = Rc<dyn Fn(&mut Vm<'_>, &[Value]) -> Result<Value>>;
/// Host-native path observer; receives the new value at the observed path.
pub type Observer = Rc<dyn Fn(&mut Vm<'_>, Option<&Value>) -> Result<()>>;
/// Watch handler, called with `(new, old)`. `None` is "undefined".
pub type WatchHandlerFn = Rc<dyn Fn(&mut Vm<'_>, Option<&Value>, Option<&Value>) -> Result<()>>;
/// Expression watched by [`Vm::watch`].
pub type WatchGetter = Rc<dyn Fn(&mut Vm<'_>) -> Result<Value>>;
pub type Getter = Rc<dyn Fn(&ComputedScope<'_>) -> Result<Value>>;
pub type Setter = Rc<dyn Fn(&mut Vm<'_>, Value) -> Result<()>>;
/// `data` factory; receives the merged property defaults.
pub type DataFactory = Rc<dyn Fn(&State) -> Result<State>>;
/// Runs before the native commit and may rewrite the payload.
pub type BeforeUpdateHook = Rc<dyn Fn(&mut Vm<'_>, &mut State) -> Result<()>>;
/// Runs after the native commit with the payload that was applied.
pub type UpdatedHook = Rc<dyn Fn(&mut Vm<'_>, &State) -> Result<()>>;

pub fn hook<F>(f: F) -> Hook
where
    F: Fn(&mut Vm<'_>) -> Result<()> + 'static,
{
    Rc::new(f)
}

pub fn bare_hook<F>(f: F) -> BareHook
where
    F: Fn() -> Result<()> + 'static,
{
    Rc::new(f)
}

pub fn method<F>(f: F) -> Method
where
    F: Fn(&mut Vm<'_>, &[Value]) -> Result<Value> + 'static,
{
    Rc::new(f)
}

pub fn observer<F>(f: F) -> Observer
where
    F: Fn(&mut Vm<'_>, Option<&Value>) -> Result<()> + 'static,
{
    Rc::new(f)
}

pub fn handler<F>(f: F) -> WatchHandlerFn
where
    F: Fn(&mut Vm<'_>, Option<&Value>, Option<&Value>) -> Result<()> + 'static,
{
    Rc::new(f)
}

pub fn watch_getter<F>(f: F) -> WatchGetter
where
    F: Fn(&mut Vm<'_>) -> Result<Value> + 'static,
{
    Rc::new(f)
}

pub fn getter<F>(f: F) -> Getter
where
    F: Fn(&ComputedScope<'_>) -> Result<Value> + 'static,
{
    Rc::new(f)
}

pub fn setter<F>(f: F) -> Setter
where
    F: Fn(&mut Vm<'_>, Value) -> Result<()> + 'static,
{
    Rc::new(f)
}

pub fn before_update<F>(f: F) -> BeforeUpdateHook
where
    F: Fn(&mut Vm<'_>, &mut State) -> Result<()> + 'static,
{
    Rc::new(f)
}

pub fn updated<F>(f: F) -> UpdatedHook
where
    F: Fn(&mut Vm<'_>, &State) -> Result<()> + 'static,
{
    Rc::new(f)
}

// ---------------------------------------------------------------------------
// Watch
// ---------------------------------------------------------------------------

/// What a watch entry calls.
#[derive(Clone)]
pub enum WatchTarget {
    Handler(WatchHandlerFn),
    /// Method looked up at call time; skipped when missing.
    Method(String),
}

impl fmt::Debug for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler(_) => f.write_str("Handler(..)"),
            Self::Method(name) => f.debug_tuple("Method").field(name).finish(),
        }
    }
}

/// One `watch` map value.
#[derive(Clone)]
pub enum WatchSpec {
    Handler(WatchHandlerFn),
    Method(String),
    Detailed {
        handler: WatchTarget,
        deep: bool,
        immediate: bool,
    },
    List(Vec<WatchSpec>),
}

impl fmt::Debug for WatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler(_) => f.write_str("Handler(..)"),
            Self::Method(name) => f.debug_tuple("Method").field(name).finish(),
            Self::Detailed {
                handler,
                deep,
                immediate,
            } => f
                .debug_struct("Detailed")
                .field("handler", handler)
                .field("deep", deep)
                .field("immediate", immediate)
                .finish(),
            Self::List(items) => f.debug_list().entries(items).finish(),
        }
    }
}

/// A [`WatchSpec`] flattened to a single entry.
#[derive(Clone, Debug)]
pub struct WatchEntry {
    pub target: WatchTarget,
    pub deep: bool,
    pub immediate: bool,
}

impl WatchSpec {
    pub fn handler<F>(f: F) -> Self
    where
        F: Fn(&mut Vm<'_>, Option<&Value>, Option<&Value>) -> Result<()> + 'static,
    {
        Self::Handler(Rc::new(f))
    }

    pub fn method(name: impl Into<String>) -> Self {
        Self::Method(name.into())
    }

    /// Set the `deep` flag (on every entry of a list).
    #[must_use]
    pub fn deep(self, deep: bool) -> Self {
        self.map_flags(&|entry| entry.deep = deep)
    }

    /// Set the `immediate` flag (on every entry of a list).
    #[must_use]
    pub fn immediate(self, immediate: bool) -> Self {
        self.map_flags(&|entry| entry.immediate = immediate)
    }

    fn map_flags(self, apply: &dyn Fn(&mut WatchEntry)) -> Self {
        match self {
            Self::List(items) => {
                Self::List(items.into_iter().map(|item| item.map_flags(apply)).collect())
            }
            single => {
                let mut entries = single.entries();
                let mut entry = entries.remove(0);
                apply(&mut entry);
                Self::Detailed {
                    handler: entry.target,
                    deep: entry.deep,
                    immediate: entry.immediate,
                }
            }
        }
    }

    /// Flatten to entries in declaration order.
    #[must_use]
    pub fn entries(&self) -> Vec<WatchEntry> {
        match self {
            Self::Handler(f) => vec![WatchEntry {
                target: WatchTarget::Handler(Rc::clone(f)),
                deep: false,
                immediate: false,
            }],
            Self::Method(name) => vec![WatchEntry {
                target: WatchTarget::Method(name.clone()),
                deep: false,
                immediate: false,
            }],
            Self::Detailed {
                handler,
                deep,
                immediate,
            } => vec![WatchEntry {
                target: handler.clone(),
                deep: *deep,
                immediate: *immediate,
            }],
            Self::List(items) => items.iter().flat_map(Self::entries).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Computed
// ---------------------------------------------------------------------------

/// Computed entry. Entries without a getter are never recomputed.
#[derive(Clone, Default)]
pub struct ComputedSpec {
    pub get: Option<Getter>,
    pub set: Option<Setter>,
}

impl ComputedSpec {
    pub fn getter<F>(f: F) -> Self
    where
        F: Fn(&ComputedScope<'_>) -> Result<Value> + 'static,
    {
        Self {
            get: Some(Rc::new(f)),
            set: None,
        }
    }

    #[must_use]
    pub fn with_setter<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Vm<'_>, Value) -> Result<()> + 'static,
    {
        self.set = Some(Rc::new(f));
        self
    }
}

impl fmt::Debug for ComputedSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedSpec")
            .field("get", &self.get.is_some())
            .field("set", &self.set.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Lifetimes
// ---------------------------------------------------------------------------

/// Native lifetimes contributed by an installer.
#[derive(Clone, Default)]
pub struct Lifecycle {
    pub created: Option<Hook>,
    pub attached: Option<Hook>,
    pub detached: Option<Hook>,
}

/// Page events contributed by an installer.
#[derive(Clone, Default)]
pub struct PageLifecycle {
    pub show: Option<Hook>,
    pub hide: Option<Hook>,
    pub resize: Option<Hook>,
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// `data` declaration.
#[derive(Clone)]
pub enum DataSource {
    Static(State),
    Factory(DataFactory),
}

impl DataSource {
    /// Produce the initial state for the given property defaults.
    pub fn produce(&self, defaults: &State) -> Result<State> {
        match self {
            Self::Static(state) => Ok(state.clone()),
            Self::Factory(factory) => factory(defaults),
        }
    }
}

/// The options object of one component.
#[derive(Clone, Default)]
pub struct ComponentOptions {
    pub data: Option<DataSource>,
    pub props: Vec<(String, PropertySpec)>,
    pub computed: Vec<(String, ComputedSpec)>,
    pub watch: Vec<(String, WatchSpec)>,
    pub methods: Vec<(String, Method)>,
    pub observers: Vec<(String, Observer)>,
    pub before_create: Option<BareHook>,
    pub created: Option<Hook>,
    pub before_mount: Option<Hook>,
    pub mounted: Option<Hook>,
    pub before_destroy: Option<Hook>,
    pub destroyed: Option<Hook>,
}

fn state_of(value: Value) -> State {
    match value {
        Value::Object(map) => map,
        _ => State::new(),
    }
}

impl ComponentOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Static `data`. Non-object values are treated as empty.
    #[must_use]
    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(DataSource::Static(state_of(data)));
        self
    }

    #[must_use]
    pub fn data_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&State) -> Result<State> + 'static,
    {
        self.data = Some(DataSource::Factory(Rc::new(f)));
        self
    }

    #[must_use]
    pub fn prop(mut self, name: impl Into<String>, spec: PropertySpec) -> Self {
        self.props.push((name.into(), spec));
        self
    }

    #[must_use]
    pub fn computed(mut self, name: impl Into<String>, spec: ComputedSpec) -> Self {
        self.computed.push((name.into(), spec));
        self
    }

    #[must_use]
    pub fn watch(mut self, path: impl Into<String>, spec: WatchSpec) -> Self {
        self.watch.push((path.into(), spec));
        self
    }

    #[must_use]
    pub fn method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Vm<'_>, &[Value]) -> Result<Value> + 'static,
    {
        self.methods.push((name.into(), Rc::new(f)));
        self
    }

    #[must_use]
    pub fn observer<F>(mut self, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Vm<'_>, Option<&Value>) -> Result<()> + 'static,
    {
        self.observers.push((key.into(), Rc::new(f)));
        self
    }

    #[must_use]
    pub fn before_create<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Result<()> + 'static,
    {
        self.before_create = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn created<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Vm<'_>) -> Result<()> + 'static,
    {
        self.created = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn before_mount<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Vm<'_>) -> Result<()> + 'static,
    {
        self.before_mount = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn mounted<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Vm<'_>) -> Result<()> + 'static,
    {
        self.mounted = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn before_destroy<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Vm<'_>) -> Result<()> + 'static,
    {
        self.before_destroy = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn destroyed<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Vm<'_>) -> Result<()> + 'static,
    {
        self.destroyed = Some(Rc::new(f));
        self
    }
}

fn keys<T>(entries: &[(String, T)]) -> Vec<&str> {
    entries.iter().map(|(k, _)| k.as_str()).collect()
}

impl fmt::Debug for ComponentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentOptions")
            .field("data", &self.data.is_some())
            .field("props", &keys(&self.props))
            .field("computed", &keys(&self.computed))
            .field("watch", &keys(&self.watch))
            .field("methods", &keys(&self.methods))
            .field("observers", &keys(&self.observers))
            .finish_non_exhaustive()
    }
}
