#![forbid(unsafe_code)]

//! The instance view handed to user code.
//!
//! A [`Vm`] borrows the host instance for the duration of one callback and
//! carries the definition's shared runtime (methods, watcher tables,
//! configuration). It is the Rust rendition of the options-style `this`:
//!
//! | Options style | [`Vm`] |
//! |---------------|--------|
//! | `this.x` | [`get`](Vm::get) |
//! | `this.$props` / `this.$data` | [`props`](Vm::props) / [`own_data`](Vm::own_data) |
//! | `this.setData(p, cb)` | [`set_data`](Vm::set_data) / [`set_data_then`](Vm::set_data_then) |
//! | `this.method(...)` | [`call`](Vm::call) |
//! | `this.$watch(...)` | [`watch`](Vm::watch) / [`unwatch`](Vm::unwatch) |

use std::fmt;
use std::rc::Rc;

use optbridge_core::host::{self, CommitCallback, HostHook, HostInstance, HostMethod};
use optbridge_core::path::{self, Path};
use optbridge_core::{Error, InstanceId, Result, State, Value};

use crate::config::AdapterConfig;
use crate::installers::watcher::{self, WatchOptions, WatchSource, WatchToken};
use crate::options::{Hook, Method};
use crate::shared::RuntimeShared;

pub struct Vm<'a> {
    host: &'a mut dyn HostInstance,
    shared: Rc<RuntimeShared>,
    /// Commits bypass the interceptor (used inside computed setters).
    native_commits: bool,
}

impl<'a> Vm<'a> {
    pub(crate) fn new(host: &'a mut dyn HostInstance, shared: Rc<RuntimeShared>) -> Self {
        Self {
            host,
            shared,
            native_commits: false,
        }
    }

    pub(crate) fn native(host: &'a mut dyn HostInstance, shared: Rc<RuntimeShared>) -> Self {
        Self {
            host,
            shared,
            native_commits: true,
        }
    }

    pub(crate) fn shared(&self) -> &Rc<RuntimeShared> {
        &self.shared
    }

    #[must_use]
    pub fn id(&self) -> InstanceId {
        self.host.id()
    }

    /// Committed state.
    #[must_use]
    pub fn data(&self) -> &State {
        self.host.data()
    }

    /// Top-level state field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.host.data().get(key)
    }

    /// Guarded read through a path in either dialect.
    pub fn get_path(&self, path: &str) -> Result<Option<&Value>> {
        let path = Path::parse(path)?;
        Ok(path::resolve_in(self.host.data(), &path))
    }

    /// State fields that are declared properties.
    #[must_use]
    pub fn props(&self) -> State {
        let names = self.host.property_names();
        self.host
            .data()
            .iter()
            .filter(|(key, _)| names.iter().any(|n| n == *key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// State fields that are not declared properties.
    #[must_use]
    pub fn own_data(&self) -> State {
        let names = self.host.property_names();
        self.host
            .data()
            .iter()
            .filter(|(key, _)| !names.iter().any(|n| n == *key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Commit `payload` (host-dialect path keys).
    pub fn set_data(&mut self, payload: State) -> Result<()> {
        self.commit(payload, None)
    }

    /// Commit a single key.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        let mut payload = State::new();
        payload.insert(key.into(), value);
        self.commit(payload, None)
    }

    /// Commit `payload`, then run `then` once the host has applied it and
    /// fired its observers.
    pub fn set_data_then<F>(&mut self, payload: State, then: F) -> Result<()>
    where
        F: FnOnce(&mut Vm<'_>) -> Result<()> + 'static,
    {
        let shared = Rc::clone(&self.shared);
        let native_commits = self.native_commits;
        let callback = host::callback(move |host| {
            let mut vm = Vm {
                host,
                shared,
                native_commits,
            };
            then(&mut vm)
        });
        self.commit(payload, Some(callback))
    }

    fn commit(&mut self, payload: State, callback: Option<CommitCallback>) -> Result<()> {
        if self.native_commits {
            self.host.native_set_data(payload, callback)
        } else {
            self.host.set_data(payload, callback)
        }
    }

    pub fn call(&mut self, name: &str, args: &[Value]) -> Result<Value> {
        let method = self.shared.method(name).ok_or_else(|| Error::UnknownMethod {
            name: name.to_owned(),
        })?;
        method(self, args)
    }

    #[must_use]
    pub fn has_method(&self, name: &str) -> bool {
        self.shared.has_method(name)
    }

    /// Subscribe to a path or getter. See [`WatchSource`].
    pub fn watch<F>(
        &mut self,
        source: impl Into<WatchSource>,
        handler: F,
        options: WatchOptions,
    ) -> Result<WatchToken>
    where
        F: Fn(&mut Vm<'_>, Option<&Value>, Option<&Value>) -> Result<()> + 'static,
    {
        watcher::subscribe(self, source.into(), Rc::new(handler), options)
    }

    /// Drop a subscription. Returns whether it was registered.
    pub fn unwatch(&mut self, token: WatchToken) -> bool {
        watcher::unsubscribe(self, token)
    }

    #[must_use]
    pub fn config(&self) -> &AdapterConfig {
        self.shared.config()
    }

    /// Underlying host instance.
    pub fn host(&mut self) -> &mut dyn HostInstance {
        &mut *self.host
    }

    /// Shorter-lived view over the same instance.
    pub fn reborrow(&mut self) -> Vm<'_> {
        Vm {
            host: &mut *self.host,
            shared: Rc::clone(&self.shared),
            native_commits: self.native_commits,
        }
    }
}

impl fmt::Debug for Vm<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("id", &self.id())
            .field("data", self.data())
            .field("native_commits", &self.native_commits)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Binding user callables to host callables
// ---------------------------------------------------------------------------

pub(crate) fn bind_hook(shared: &Rc<RuntimeShared>, hook: Hook) -> HostHook {
    let shared = Rc::clone(shared);
    host::hook(move |host| hook(&mut Vm::new(host, Rc::clone(&shared))))
}

/// One host hook running `hooks` in order; `None` when there is nothing to run.
pub(crate) fn bind_chain(shared: &Rc<RuntimeShared>, hooks: Vec<Hook>) -> Option<HostHook> {
    if hooks.is_empty() {
        return None;
    }
    let shared = Rc::clone(shared);
    Some(host::hook(move |host| {
        let mut vm = Vm::new(host, Rc::clone(&shared));
        hooks.iter().try_for_each(|hook| hook(&mut vm))
    }))
}

pub(crate) fn bind_method(shared: &Rc<RuntimeShared>, method: Method) -> HostMethod {
    let shared = Rc::clone(shared);
    host::method(move |host, args| method(&mut Vm::new(host, Rc::clone(&shared)), args))
}
