#![forbid(unsafe_code)]

//! Installer pipeline.
//!
//! An [`Installer`] contributes optional fragments (lifetimes, watch and
//! computed maps, methods, ...) and may take part in two build stages.
//! [`Extender::build`] runs, for one options object:
//!
//! 1. `install` on every installer in order: merge fragments into the
//!    [`ContextStore`];
//! 2. `definition_filter` on every installer in order: attach behaviours to
//!    the [`HostDefinition`];
//! 3. aggregation: `ready` and `moved` fragments plus the teardown chain
//!    registered by the engines go into one closing behaviour, so engine
//!    teardown runs after every user `detached` hook.
//!
//! Hook fragments chain in installer order. Map fragments merge left to
//! right, later entries overriding earlier ones in place; the options
//! object's own entries merge last.
//!
//! # Example
//!
//! ```
//! use optbridge_runtime::{ComponentOptions, ComputedSpec, Extender};
//! use serde_json::json;
//!
//! let options = ComponentOptions::new()
//!     .data(json!({"count": 1}))
//!     .computed(
//!         "double",
//!         ComputedSpec::getter(|scope| {
//!             let count = scope.get_f64("count")?.unwrap_or(0.0);
//!             Ok(json!(count * 2.0))
//!         }),
//!     );
//! let definition = Extender::new().build(&options).unwrap();
//! assert_eq!(definition.data.get("count"), Some(&json!(1)));
//! ```

use std::fmt;
use std::rc::Rc;

use optbridge_core::host::{Behavior, HostDefinition, HostHook};
use optbridge_core::{ContextStore, PropertySpec, Result, State};
use tracing::debug;

use crate::config::AdapterConfig;
use crate::installers::{
    ComputedInstaller, LifecycleInstaller, StateInstaller, UpdateInstaller, WatcherInstaller,
};
use crate::options::{
    BareHook, BeforeUpdateHook, ComponentOptions, ComputedSpec, DataSource, Hook, Lifecycle,
    Method, Observer, PageLifecycle, UpdatedHook, WatchSpec,
};
use crate::shared::RuntimeShared;
use crate::side_table::{InstanceTable, InstanceTables, TrackedTable};
use crate::vm;

/// Context store keys written during a build.
pub mod keys {
    pub const PROPERTIES: &str = "properties";
    pub const STATE: &str = "state";
    pub const METHODS: &str = "methods";
    pub const WATCH: &str = "watch";
    pub const OBSERVERS: &str = "observers";
    pub const COMPUTED: &str = "computed";
    pub const BEFORE_UPDATE: &str = "beforeUpdate";
    pub const UPDATED: &str = "updated";
    pub const LIFECYCLE: &str = "lifecycle";
    pub const TEARDOWN: &str = "teardown";
}

/// Merge `entries` into `target`: a repeated key replaces the value and
/// keeps its first position.
pub fn merge_entries<T>(target: &mut Vec<(String, T)>, entries: impl IntoIterator<Item = (String, T)>) {
    for (key, value) in entries {
        match target.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => target.push((key, value)),
        }
    }
}

/// Build-time state threaded through every stage.
pub struct BuildCx<'b> {
    pub options: &'b ComponentOptions,
    pub context: ContextStore,
    installers: &'b [Rc<dyn Installer>],
    shared: Rc<RuntimeShared>,
}

impl BuildCx<'_> {
    /// Every installer of the pipeline, in order.
    #[must_use]
    pub fn installers(&self) -> &[Rc<dyn Installer>] {
        self.installers
    }

    #[must_use]
    pub fn config(&self) -> &AdapterConfig {
        self.shared.config()
    }

    pub(crate) fn shared(&self) -> &Rc<RuntimeShared> {
        &self.shared
    }

    /// Wrap an instance-view hook for the host.
    #[must_use]
    pub fn bind(&self, hook: Hook) -> HostHook {
        vm::bind_hook(&self.shared, hook)
    }

    /// Run `hook` when an instance is torn down, after user `detached` hooks.
    pub fn add_teardown(&mut self, hook: HostHook) {
        self.context
            .get_or_default::<Vec<HostHook>>(keys::TEARDOWN)
            .push(hook);
    }

    /// Report `table` through [`Extender::build_with_tables`].
    pub fn track_table<T: 'static>(&self, table: &Rc<InstanceTable<T>>) {
        self.shared.tables().register(Rc::clone(table) as Rc<dyn TrackedTable>);
    }
}

impl fmt::Debug for BuildCx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildCx")
            .field("options", self.options)
            .field("context", &self.context)
            .field("installers", &self.installers.len())
            .finish()
    }
}

/// Contributor to a component definition.
///
/// Every fragment defaults to absent. Installers are stateless across
/// instances; per-instance state belongs in side tables.
pub trait Installer {
    /// Diagnostic label.
    fn name(&self) -> &str;

    fn install(&self, _cx: &mut BuildCx<'_>) -> Result<()> {
        Ok(())
    }

    fn definition_filter(&self, _cx: &mut BuildCx<'_>, _definition: &mut HostDefinition) -> Result<()> {
        Ok(())
    }

    fn lifetimes(&self) -> Option<Lifecycle> {
        None
    }

    fn page_lifetimes(&self) -> Option<PageLifecycle> {
        None
    }

    fn ready(&self) -> Option<Hook> {
        None
    }

    fn moved(&self) -> Option<Hook> {
        None
    }

    fn before_create(&self) -> Option<BareHook> {
        None
    }

    fn created(&self) -> Option<Hook> {
        None
    }

    fn before_mount(&self) -> Option<Hook> {
        None
    }

    fn mounted(&self) -> Option<Hook> {
        None
    }

    fn before_destroy(&self) -> Option<Hook> {
        None
    }

    fn destroyed(&self) -> Option<Hook> {
        None
    }

    fn watch(&self) -> Option<Vec<(String, WatchSpec)>> {
        None
    }

    fn computed(&self) -> Option<Vec<(String, ComputedSpec)>> {
        None
    }

    fn methods(&self) -> Option<Vec<(String, Method)>> {
        None
    }

    fn observers(&self) -> Option<Vec<(String, Observer)>> {
        None
    }

    fn data(&self) -> Option<DataSource> {
        None
    }

    fn properties(&self) -> Option<Vec<(String, PropertySpec)>> {
        None
    }

    fn before_update(&self) -> Option<BeforeUpdateHook> {
        None
    }

    fn updated(&self) -> Option<UpdatedHook> {
        None
    }
}

// ---------------------------------------------------------------------------
// Extender
// ---------------------------------------------------------------------------

/// Ordered installer list plus the configuration handed to every build.
#[derive(Clone)]
pub struct Extender {
    installers: Vec<Rc<dyn Installer>>,
    config: AdapterConfig,
}

impl Default for Extender {
    fn default() -> Self {
        Self::new()
    }
}

impl Extender {
    /// State, watcher, computed, update and lifecycle installers, in that order.
    #[must_use]
    pub fn new() -> Self {
        Self::bare()
            .install(StateInstaller)
            .install(WatcherInstaller)
            .install(ComputedInstaller)
            .install(UpdateInstaller)
            .install(LifecycleInstaller)
    }

    /// No installers at all.
    #[must_use]
    pub fn bare() -> Self {
        Self {
            installers: Vec::new(),
            config: AdapterConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: AdapterConfig) -> Self {
        self.config = config;
        self
    }

    /// Append an installer.
    #[must_use]
    pub fn install(mut self, installer: impl Installer + 'static) -> Self {
        self.installers.push(Rc::new(installer));
        self
    }

    #[must_use]
    pub fn installers(&self) -> &[Rc<dyn Installer>] {
        &self.installers
    }

    #[must_use]
    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Run the pipeline for one options object.
    pub fn build(&self, options: &ComponentOptions) -> Result<HostDefinition> {
        self.build_with_tables(options).map(|(definition, _)| definition)
    }

    /// Like [`build`](Self::build), also returning the per-instance tables the
    /// engines registered, so callers can check that torn-down instances
    /// leave nothing behind.
    pub fn build_with_tables(
        &self,
        options: &ComponentOptions,
    ) -> Result<(HostDefinition, InstanceTables)> {
        let mut cx = BuildCx {
            options,
            context: ContextStore::new(),
            installers: &self.installers,
            shared: Rc::new(RuntimeShared::new(self.config.clone())),
        };

        for installer in &self.installers {
            debug!(installer = installer.name(), "install");
            installer.install(&mut cx)?;
        }

        let mut definition = HostDefinition::new();
        for installer in &self.installers {
            debug!(installer = installer.name(), "definition filter");
            installer.definition_filter(&mut cx, &mut definition)?;
        }

        definition.append_behavior(closing_behavior(&cx));
        debug!(behaviors = ?definition.behavior_names(), "definition built");
        Ok((definition, cx.shared.tables().clone()))
    }
}

fn closing_behavior(cx: &BuildCx<'_>) -> Behavior {
    let ready: Vec<Hook> = cx.installers.iter().filter_map(|i| i.ready()).collect();
    let moved: Vec<Hook> = cx.installers.iter().filter_map(|i| i.moved()).collect();
    let teardown: Vec<HostHook> = cx
        .context
        .get::<Vec<HostHook>>(keys::TEARDOWN)
        .cloned()
        .unwrap_or_default();

    let mut behavior = Behavior::new("closing");
    behavior.ready = vm::bind_chain(&cx.shared, ready);
    behavior.moved = vm::bind_chain(&cx.shared, moved);
    if !teardown.is_empty() {
        behavior.lifetimes.detached = Some(optbridge_core::host::hook(move |host| {
            teardown.iter().try_for_each(|hook| hook(&mut *host))
        }));
    }
    behavior
}

impl fmt::Debug for Extender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.installers.iter().map(|i| i.name()).collect();
        f.debug_struct("Extender")
            .field("installers", &names)
            .field("config", &self.config)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Mixin
// ---------------------------------------------------------------------------

/// Ready-made installer carrying every fragment kind.
///
/// `options` supplies the options-shaped fragments (data, props, computed,
/// watch, methods, observers, translated hooks); the remaining fields are the
/// native ones.
#[derive(Clone, Default)]
pub struct Mixin {
    name: String,
    pub options: ComponentOptions,
    pub lifetimes: Lifecycle,
    pub page_lifetimes: PageLifecycle,
    pub ready: Option<Hook>,
    pub moved: Option<Hook>,
    pub before_update: Option<BeforeUpdateHook>,
    pub updated: Option<UpdatedHook>,
}

impl Mixin {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ComponentOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn on_created<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut vm::Vm<'_>) -> Result<()> + 'static,
    {
        self.lifetimes.created = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_attached<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut vm::Vm<'_>) -> Result<()> + 'static,
    {
        self.lifetimes.attached = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_detached<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut vm::Vm<'_>) -> Result<()> + 'static,
    {
        self.lifetimes.detached = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_show<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut vm::Vm<'_>) -> Result<()> + 'static,
    {
        self.page_lifetimes.show = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_hide<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut vm::Vm<'_>) -> Result<()> + 'static,
    {
        self.page_lifetimes.hide = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_resize<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut vm::Vm<'_>) -> Result<()> + 'static,
    {
        self.page_lifetimes.resize = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_ready<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut vm::Vm<'_>) -> Result<()> + 'static,
    {
        self.ready = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_moved<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut vm::Vm<'_>) -> Result<()> + 'static,
    {
        self.moved = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_before_update<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut vm::Vm<'_>, &mut State) -> Result<()> + 'static,
    {
        self.before_update = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_updated<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut vm::Vm<'_>, &State) -> Result<()> + 'static,
    {
        self.updated = Some(Rc::new(f));
        self
    }
}

fn non_empty<T>(entries: &[(String, T)]) -> Option<Vec<(String, T)>>
where
    T: Clone,
{
    (!entries.is_empty()).then(|| entries.to_vec())
}

impl Installer for Mixin {
    fn name(&self) -> &str {
        &self.name
    }

    fn lifetimes(&self) -> Option<Lifecycle> {
        let l = &self.lifetimes;
        (l.created.is_some() || l.attached.is_some() || l.detached.is_some())
            .then(|| l.clone())
    }

    fn page_lifetimes(&self) -> Option<PageLifecycle> {
        let p = &self.page_lifetimes;
        (p.show.is_some() || p.hide.is_some() || p.resize.is_some()).then(|| p.clone())
    }

    fn ready(&self) -> Option<Hook> {
        self.ready.clone()
    }

    fn moved(&self) -> Option<Hook> {
        self.moved.clone()
    }

    fn before_create(&self) -> Option<BareHook> {
        self.options.before_create.clone()
    }

    fn created(&self) -> Option<Hook> {
        self.options.created.clone()
    }

    fn before_mount(&self) -> Option<Hook> {
        self.options.before_mount.clone()
    }

    fn mounted(&self) -> Option<Hook> {
        self.options.mounted.clone()
    }

    fn before_destroy(&self) -> Option<Hook> {
        self.options.before_destroy.clone()
    }

    fn destroyed(&self) -> Option<Hook> {
        self.options.destroyed.clone()
    }

    fn watch(&self) -> Option<Vec<(String, WatchSpec)>> {
        non_empty(&self.options.watch)
    }

    fn computed(&self) -> Option<Vec<(String, ComputedSpec)>> {
        non_empty(&self.options.computed)
    }

    fn methods(&self) -> Option<Vec<(String, Method)>> {
        non_empty(&self.options.methods)
    }

    fn observers(&self) -> Option<Vec<(String, Observer)>> {
        non_empty(&self.options.observers)
    }

    fn data(&self) -> Option<DataSource> {
        self.options.data.clone()
    }

    fn properties(&self) -> Option<Vec<(String, PropertySpec)>> {
        non_empty(&self.options.props)
    }

    fn before_update(&self) -> Option<BeforeUpdateHook> {
        self.before_update.clone()
    }

    fn updated(&self) -> Option<UpdatedHook> {
        self.updated.clone()
    }
}

impl fmt::Debug for Mixin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mixin")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
