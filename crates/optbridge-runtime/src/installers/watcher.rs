#![forbid(unsafe_code)]

//! Watch semantics on top of path-keyed host observers.
//!
//! # Static watchers
//!
//! Entries of the merged `watch` map are grouped by `(host path, deep)`. Each
//! group becomes one host observer (`path.**` for deep groups) and owns one
//! old-value slot per instance:
//!
//! 1. `created`: every slot is seeded from the current state, before external
//!    overrides are applied.
//! 2. Each observer callback re-reads the group path, and on a deep-equality
//!    difference updates the slot then calls every entry with `(new, old)` in
//!    registration order. This includes callbacks between `created` and
//!    `attached`, so an override reaches its watchers with the seeded old value.
//! 3. `attached`: groups with immediate entries fire those entries once with
//!    `(current, seeded)` and fold `current` into the slot.
//!
//! With [`ImmediatePhase::Created`] the immediate pass happens at `created`
//! with an undefined old value.
//!
//! # Dynamic watchers
//!
//! [`Vm::watch`] registers a path or getter in a per-instance table keyed by
//! [`WatchToken`]. A catch-all `**` observer walks the table after every
//! commit and pushes each re-derived value through the same equality gate.
//! Entries removed mid-walk are skipped.
//!
//! # Native observers
//!
//! Host-native `observers` merged from installers and options share keys with
//! static groups; on a shared key the native observer runs first.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use optbridge_core::equal::deep_equal;
use optbridge_core::host::{self, Behavior, HostDefinition, HostInstance, HostObserver};
use optbridge_core::path::{self, ObserverPattern, Path};
use optbridge_core::{Error, InstanceId, Result, Value};
use tracing::{debug, trace};

use crate::config::ImmediatePhase;
use crate::installer::{self, BuildCx, Installer, keys};
use crate::options::{Observer, WatchEntry, WatchGetter, WatchHandlerFn, WatchTarget};
use crate::shared::RuntimeShared;
use crate::side_table::InstanceTable;
use crate::vm::Vm;

// ---------------------------------------------------------------------------
// Handler dispatch
// ---------------------------------------------------------------------------

fn dispatch(
    vm: &mut Vm<'_>,
    target: &WatchTarget,
    new: Option<&Value>,
    old: Option<&Value>,
) -> Result<()> {
    match target {
        WatchTarget::Handler(handler) => handler(vm, new, old),
        WatchTarget::Method(name) => {
            if !vm.has_method(name) {
                trace!(method = %name, "watch method missing, skipped");
                return Ok(());
            }
            let args = [
                new.cloned().unwrap_or(Value::Null),
                old.cloned().unwrap_or(Value::Null),
            ];
            vm.call(name, &args).map(drop)
        }
    }
}

// ---------------------------------------------------------------------------
// Static watchers
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct StaticGroup {
    path: Path,
    deep: bool,
    entries: Vec<WatchEntry>,
}

impl StaticGroup {
    fn pattern(&self) -> ObserverPattern {
        if self.deep {
            ObserverPattern::Subtree(self.path.clone())
        } else {
            ObserverPattern::Exact(self.path.clone())
        }
    }

    fn has_immediate(&self) -> bool {
        self.entries.iter().any(|e| e.immediate)
    }
}

#[derive(Debug)]
struct StaticSlots {
    old: Vec<Option<Value>>,
    /// Values read at `created`, consumed by the immediate pass at `attached`.
    seeded: Vec<Option<Value>>,
}

/// Group structure of one definition plus per-instance slots.
#[derive(Debug)]
struct StaticWatchers {
    groups: Vec<StaticGroup>,
    slots: Rc<InstanceTable<StaticSlots>>,
    phase: ImmediatePhase,
}

impl StaticWatchers {
    /// Group merged watch entries by `(path, deep)`, deep group first.
    fn compile(watch: &[(String, Vec<WatchEntry>)], phase: ImmediatePhase) -> Result<Self> {
        let mut groups: Vec<StaticGroup> = Vec::new();
        for (raw, entries) in watch {
            let path = Path::parse(raw)?;
            for deep in [true, false] {
                let matching = entries.iter().filter(|e| e.deep == deep).cloned();
                match groups.iter_mut().find(|g| g.deep == deep && g.path == path) {
                    Some(group) => group.entries.extend(matching),
                    None => {
                        let entries: Vec<WatchEntry> = matching.collect();
                        if !entries.is_empty() {
                            groups.push(StaticGroup {
                                path: path.clone(),
                                deep,
                                entries,
                            });
                        }
                    }
                }
            }
        }
        Ok(Self {
            groups,
            slots: Rc::new(InstanceTable::new("static watcher")),
            phase,
        })
    }

    fn seed(&self, vm: &mut Vm<'_>) -> Result<()> {
        let old: Vec<Option<Value>> = self
            .groups
            .iter()
            .map(|g| path::snapshot_at(vm.data(), &g.path))
            .collect();
        let seeded = match self.phase {
            ImmediatePhase::Attached => old.clone(),
            ImmediatePhase::Created => Vec::new(),
        };
        self.slots.attach(vm.id(), StaticSlots { old, seeded });
        if self.phase == ImmediatePhase::Created {
            self.fire_immediate(vm, false)?;
        }
        Ok(())
    }

    fn attach(&self, vm: &mut Vm<'_>) -> Result<()> {
        if self.phase != ImmediatePhase::Attached {
            return Ok(());
        }
        self.fire_immediate(vm, true)
    }

    /// Immediate pass. `with_seeded` passes the value read at `created` as
    /// the old value; otherwise the old value is undefined.
    fn fire_immediate(&self, vm: &mut Vm<'_>, with_seeded: bool) -> Result<()> {
        let id = vm.id();
        for (index, group) in self.groups.iter().enumerate() {
            if !group.has_immediate() {
                continue;
            }
            let current = path::snapshot_at(vm.data(), &group.path);
            let Some(seeded) = self
                .slots
                .with_mut(id, |s| {
                    s.old[index] = current.clone();
                    s.seeded.get_mut(index).and_then(Option::take)
                })
                .ok()
            else {
                return Ok(());
            };
            let old = if with_seeded { seeded } else { None };
            debug!(instance = %id, path = %group.path, "immediate watch");
            for entry in group.entries.iter().filter(|e| e.immediate) {
                dispatch(vm, &entry.target, current.as_ref(), old.as_ref())?;
            }
        }
        Ok(())
    }

    fn on_change(&self, vm: &mut Vm<'_>, index: usize) -> Result<()> {
        let id = vm.id();
        let group = &self.groups[index];
        if !self.slots.contains(id) {
            trace!(instance = %id, path = %group.path, "watch callback for untracked instance");
            return Ok(());
        }

        let new = path::snapshot_at(vm.data(), &group.path);
        let changed = self
            .slots
            .with_mut(id, |s| {
                if deep_equal(s.old[index].as_ref(), new.as_ref()) {
                    None
                } else {
                    Some(std::mem::replace(&mut s.old[index], new.clone()))
                }
            })
            .ok()
            .flatten();
        let Some(old) = changed else {
            return Ok(());
        };

        debug!(instance = %id, path = %group.path, deep = group.deep, "watch fired");
        for entry in &group.entries {
            dispatch(vm, &entry.target, new.as_ref(), old.as_ref())?;
        }
        Ok(())
    }

    fn teardown(&self, id: InstanceId) {
        self.slots.detach(id);
    }
}

// ---------------------------------------------------------------------------
// Dynamic watchers
// ---------------------------------------------------------------------------

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Handle returned by [`Vm::watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchToken(u64);

impl WatchToken {
    fn next() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

/// What [`Vm::watch`] observes.
#[derive(Clone)]
pub enum WatchSource {
    /// Path in either dialect.
    Path(String),
    Getter(WatchGetter),
    /// Anything else; rejected at registration.
    Other(Value),
}

impl WatchSource {
    pub fn getter<F>(f: F) -> Self
    where
        F: Fn(&mut Vm<'_>) -> Result<Value> + 'static,
    {
        Self::Getter(Rc::new(f))
    }
}

impl From<&str> for WatchSource {
    fn from(path: &str) -> Self {
        Self::Path(path.to_owned())
    }
}

impl From<String> for WatchSource {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

impl From<WatchGetter> for WatchSource {
    fn from(getter: WatchGetter) -> Self {
        Self::Getter(getter)
    }
}

/// A JSON string is a path; every other value is rejected.
impl From<Value> for WatchSource {
    fn from(value: Value) -> Self {
        match value {
            Value::String(path) => Self::Path(path),
            other => Self::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Fire once at registration with `(current, undefined)`.
    pub immediate: bool,
}

impl WatchOptions {
    #[must_use]
    pub fn immediate() -> Self {
        Self { immediate: true }
    }
}

#[derive(Clone)]
enum Source {
    Path(Path),
    Getter(WatchGetter),
}

impl Source {
    fn read(&self, vm: &mut Vm<'_>) -> Result<Option<Value>> {
        match self {
            Self::Path(path) => Ok(path::snapshot_at(vm.data(), path)),
            Self::Getter(getter) => getter(vm).map(Some),
        }
    }
}

struct DynamicWatcher {
    token: WatchToken,
    source: Source,
    handler: WatchHandlerFn,
    old: Option<Value>,
}

/// Per-instance imperative watcher table.
#[derive(Default)]
pub(crate) struct DynamicWatchers {
    entries: Vec<DynamicWatcher>,
}

impl DynamicWatchers {
    fn get(&self, token: WatchToken) -> Option<&DynamicWatcher> {
        self.entries.iter().find(|w| w.token == token)
    }

    fn get_mut(&mut self, token: WatchToken) -> Option<&mut DynamicWatcher> {
        self.entries.iter_mut().find(|w| w.token == token)
    }

    fn remove(&mut self, token: WatchToken) -> bool {
        let before = self.entries.len();
        self.entries.retain(|w| w.token != token);
        self.entries.len() != before
    }
}

pub(crate) fn subscribe(
    vm: &mut Vm<'_>,
    source: WatchSource,
    handler: WatchHandlerFn,
    options: WatchOptions,
) -> Result<WatchToken> {
    let source = match source {
        WatchSource::Path(raw) => Source::Path(Path::parse(&raw)?),
        WatchSource::Getter(getter) => Source::Getter(getter),
        WatchSource::Other(value) => {
            return Err(Error::invalid(format!(
                "{value} is neither a path string nor a getter"
            )));
        }
    };
    let shared = Rc::clone(vm.shared());
    let id = vm.id();
    if !shared.dynamic.contains(id) {
        return Err(Error::InstanceNotTracked {
            id,
            table: shared.dynamic.name(),
        });
    }

    let current = source.read(vm)?;
    if options.immediate {
        handler(vm, current.as_ref(), None)?;
    }
    let token = WatchToken::next();
    shared.dynamic.with_mut(id, |table| {
        table.entries.push(DynamicWatcher {
            token,
            source,
            handler,
            old: current,
        });
    })?;
    trace!(instance = %id, ?token, "dynamic watcher registered");
    Ok(token)
}

pub(crate) fn unsubscribe(vm: &mut Vm<'_>, token: WatchToken) -> bool {
    vm.shared()
        .dynamic
        .with_mut(vm.id(), |table| table.remove(token))
        .unwrap_or(false)
}

/// Re-derive every dynamic watcher of the instance and fire the changed ones.
fn drive(vm: &mut Vm<'_>) -> Result<()> {
    let shared = Rc::clone(vm.shared());
    let id = vm.id();
    let Ok(tokens) = shared
        .dynamic
        .with(id, |t| t.entries.iter().map(|w| w.token).collect::<Vec<_>>())
    else {
        return Ok(());
    };

    for token in tokens {
        let Some(source) = shared
            .dynamic
            .with(id, |t| t.get(token).map(|w| w.source.clone()))
            .ok()
            .flatten()
        else {
            continue;
        };
        let new = source.read(vm)?;
        let fired = shared
            .dynamic
            .with_mut(id, |t| {
                let watcher = t.get_mut(token)?;
                if deep_equal(watcher.old.as_ref(), new.as_ref()) {
                    None
                } else {
                    let old = std::mem::replace(&mut watcher.old, new.clone());
                    Some((Rc::clone(&watcher.handler), old))
                }
            })
            .ok()
            .flatten();
        if let Some((handler, old)) = fired {
            handler(vm, new.as_ref(), old.as_ref())?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Installer
// ---------------------------------------------------------------------------

/// Merges `watch` and `observers`, and attaches both watcher kinds.
#[derive(Debug, Default, Clone, Copy)]
pub struct WatcherInstaller;

impl WatcherInstaller {
    fn observer_for(
        shared: &Rc<RuntimeShared>,
        engine: &Rc<StaticWatchers>,
        native: Option<Observer>,
        groups: Vec<usize>,
    ) -> HostObserver {
        let shared = Rc::clone(shared);
        let engine = Rc::clone(engine);
        host::observer(move |host: &mut dyn HostInstance, value| {
            let mut vm = Vm::new(host, Rc::clone(&shared));
            if let Some(native) = &native {
                native(&mut vm, value)?;
            }
            groups
                .iter()
                .try_for_each(|&index| engine.on_change(&mut vm, index))
        })
    }

    fn catch_all(shared: &Rc<RuntimeShared>, native: Option<Observer>) -> HostObserver {
        let shared = Rc::clone(shared);
        host::observer(move |host: &mut dyn HostInstance, value| {
            let mut vm = Vm::new(host, Rc::clone(&shared));
            if let Some(native) = &native {
                native(&mut vm, value)?;
            }
            drive(&mut vm)
        })
    }
}

impl Installer for WatcherInstaller {
    fn name(&self) -> &str {
        "watcher"
    }

    fn install(&self, cx: &mut BuildCx<'_>) -> Result<()> {
        let mut watch = Vec::new();
        let mut observers = Vec::new();
        for source in cx.installers() {
            if let Some(entries) = source.watch() {
                installer::merge_entries(&mut watch, entries);
            }
            if let Some(entries) = source.observers() {
                installer::merge_entries(&mut observers, entries);
            }
        }
        installer::merge_entries(&mut watch, cx.options.watch.iter().cloned());
        installer::merge_entries(&mut observers, cx.options.observers.iter().cloned());

        let normalized: Vec<(String, Vec<WatchEntry>)> = watch
            .into_iter()
            .map(|(path, spec)| (path, spec.entries()))
            .filter(|(_, entries)| !entries.is_empty())
            .collect();
        debug!(paths = normalized.len(), observers = observers.len(), "watch merged");
        cx.context.set(keys::WATCH, normalized);
        cx.context.set(keys::OBSERVERS, observers);
        Ok(())
    }

    fn definition_filter(&self, cx: &mut BuildCx<'_>, definition: &mut HostDefinition) -> Result<()> {
        let watch = cx
            .context
            .get::<Vec<(String, Vec<WatchEntry>)>>(keys::WATCH)
            .cloned()
            .unwrap_or_default();
        let observers = cx
            .context
            .get::<Vec<(String, Observer)>>(keys::OBSERVERS)
            .cloned()
            .unwrap_or_default();
        let shared = Rc::clone(cx.shared());
        let engine = Rc::new(StaticWatchers::compile(&watch, shared.config().immediate_phase)?);
        cx.track_table(&engine.slots);

        // Observer keys: native declarations first, then groups not yet covered.
        let mut catch_all_native = None;
        let mut slots: Vec<(String, Option<Observer>, Vec<usize>)> = Vec::new();
        for (raw, observer) in observers {
            let pattern = ObserverPattern::parse(&raw)?;
            if pattern == ObserverPattern::Any {
                catch_all_native = Some(observer);
                continue;
            }
            let key = pattern.key();
            match slots.iter_mut().find(|(k, _, _)| *k == key) {
                Some(slot) => slot.1 = Some(observer),
                None => slots.push((key, Some(observer), Vec::new())),
            }
        }
        for (index, group) in engine.groups.iter().enumerate() {
            let key = group.pattern().key();
            match slots.iter_mut().find(|(k, _, _)| *k == key) {
                Some(slot) => slot.2.push(index),
                None => slots.push((key, None, vec![index])),
            }
        }

        let mut behavior = Behavior::new("watcher");
        for (key, native, groups) in slots {
            behavior
                .observers
                .push((key, Self::observer_for(&shared, &engine, native, groups)));
        }
        behavior
            .observers
            .push(("**".to_owned(), Self::catch_all(&shared, catch_all_native)));

        let created = {
            let shared = Rc::clone(&shared);
            let engine = Rc::clone(&engine);
            host::hook(move |host| {
                let mut vm = Vm::new(host, Rc::clone(&shared));
                shared.dynamic.attach(vm.id(), DynamicWatchers::default());
                engine.seed(&mut vm)
            })
        };
        let attached = {
            let shared = Rc::clone(&shared);
            let engine = Rc::clone(&engine);
            host::hook(move |host| engine.attach(&mut Vm::new(host, Rc::clone(&shared))))
        };
        let teardown = {
            let shared = Rc::clone(&shared);
            let engine = Rc::clone(&engine);
            host::hook(move |host| {
                let id = host.id();
                engine.teardown(id);
                shared.dynamic.detach(id);
                trace!(instance = %id, "watcher tables released");
                Ok(())
            })
        };

        definition.prepend_behavior(behavior.on_created(created).on_attached(attached));
        cx.add_teardown(teardown);
        Ok(())
    }
}
