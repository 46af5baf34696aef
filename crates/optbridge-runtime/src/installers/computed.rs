#![forbid(unsafe_code)]

//! Computed entries derived from state, other computed entries and methods.
//!
//! # Read scope
//!
//! Getters receive a [`ComputedScope`], a layered accessor table. Names
//! resolve through [`ComputedScope::lookup`]:
//!
//! 1. a top-level key the pending payload assigns directly → that value;
//! 2. a computed entry with a getter → evaluated fresh for this cycle;
//! 3. any other state field (committed state with the payload applied);
//! 4. a method → callable through [`ComputedScope::call`].
//!
//! Each getter runs at most once per scope (memoized); reading a name that
//! is still being evaluated is [`Error::ComputedCycle`].
//!
//! # Commit pass
//!
//! Before every intercepted commit:
//!
//! 1. setters of computed entries named by payload keys run in declaration
//!    order; commits they make go straight to the host;
//! 2. every getter is evaluated once against state merged with the payload;
//! 3. values not deep-equal to the committed ones are folded into the payload.
//!
//! Step 3 is what keeps a computed entry from feeding itself forever.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use optbridge_core::equal::deep_equal;
use optbridge_core::host::{self, Behavior, HostDefinition, HostInstance};
use optbridge_core::path::{self, Path};
use optbridge_core::{Error, Result, State, Value};
use tracing::{debug, trace};

use crate::installer::{self, BuildCx, Installer, keys};
use crate::options::{ComputedSpec, Getter, Method};
use crate::shared::RuntimeShared;
use crate::vm::Vm;

/// What a name resolves to inside a [`ComputedScope`].
pub enum Binding<'s> {
    State(&'s Value),
    Computed(Getter),
    Method(Method),
    Missing,
}

impl fmt::Debug for Binding<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::State(value) => f.debug_tuple("State").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
            Self::Method(_) => f.write_str("Method(..)"),
            Self::Missing => f.write_str("Missing"),
        }
    }
}

/// Read context of computed getters for one evaluation cycle.
pub struct ComputedScope<'a> {
    host: RefCell<&'a mut dyn HostInstance>,
    shared: &'a Rc<RuntimeShared>,
    engine: &'a ComputedEngine,
    view: State,
    assigned: AHashSet<String>,
    memo: RefCell<AHashMap<String, Value>>,
    evaluating: RefCell<Vec<String>>,
}

impl<'a> ComputedScope<'a> {
    fn new(
        host: &'a mut dyn HostInstance,
        shared: &'a Rc<RuntimeShared>,
        engine: &'a ComputedEngine,
        pending: Option<&State>,
    ) -> Result<Self> {
        let mut view = host.data().clone();
        let mut assigned = AHashSet::new();
        for (key, value) in pending.into_iter().flatten() {
            match Path::parse(key) {
                Ok(p) => {
                    if p.segments().len() == 1 {
                        assigned.insert(p.root().as_key());
                    }
                    path::assign(&mut view, &p, value.clone())?;
                }
                Err(_) => {
                    view.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(Self {
            host: RefCell::new(host),
            shared,
            engine,
            view,
            assigned,
            memo: RefCell::new(AHashMap::new()),
            evaluating: RefCell::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Binding<'_> {
        if self.assigned.contains(name) {
            if let Some(value) = self.view.get(name) {
                return Binding::State(value);
            }
        }
        if let Some(getter) = self.engine.getter(name) {
            return Binding::Computed(getter);
        }
        if let Some(value) = self.view.get(name) {
            return Binding::State(value);
        }
        match self.shared.method(name) {
            Some(method) => Binding::Method(method),
            None => Binding::Missing,
        }
    }

    /// Value of a state field or computed entry; `None` for methods and
    /// unknown names.
    pub fn get(&self, name: &str) -> Result<Option<Value>> {
        match self.lookup(name) {
            Binding::State(value) => Ok(Some(value.clone())),
            Binding::Computed(getter) => self.evaluate(name, &getter).map(Some),
            Binding::Method(_) | Binding::Missing => Ok(None),
        }
    }

    /// Numeric convenience over [`get`](Self::get).
    pub fn get_f64(&self, name: &str) -> Result<Option<f64>> {
        Ok(self.get(name)?.and_then(|v| v.as_f64()))
    }

    /// Guarded read through a path whose root goes through [`lookup`](Self::lookup).
    pub fn get_path(&self, raw: &str) -> Result<Option<Value>> {
        let parsed = Path::parse(raw)?;
        let Some(root) = self.get(&parsed.root().as_key())? else {
            return Ok(None);
        };
        match Path::from_segments(parsed.segments()[1..].to_vec()) {
            None => Ok(Some(root)),
            Some(rest) => Ok(path::resolve(&root, &rest).cloned()),
        }
    }

    /// Call a method with an instance view.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        let method = self.shared.method(name).ok_or_else(|| Error::UnknownMethod {
            name: name.to_owned(),
        })?;
        let mut host = self
            .host
            .try_borrow_mut()
            .map_err(|_| Error::host("method re-entered a computed scope"))?;
        let mut vm = Vm::new(&mut **host, Rc::clone(self.shared));
        method(&mut vm, args)
    }

    fn evaluate(&self, name: &str, getter: &Getter) -> Result<Value> {
        if let Some(value) = self.memo.borrow().get(name) {
            return Ok(value.clone());
        }
        if self.evaluating.borrow().iter().any(|n| n == name) {
            return Err(Error::ComputedCycle {
                name: name.to_owned(),
            });
        }
        self.evaluating.borrow_mut().push(name.to_owned());
        let result = getter(self);
        self.evaluating.borrow_mut().pop();
        let value = result?;
        self.memo.borrow_mut().insert(name.to_owned(), value.clone());
        Ok(value)
    }

    /// Evaluate a computed entry by name.
    fn evaluate_named(&self, name: &str) -> Result<Option<Value>> {
        match self.engine.getter(name) {
            Some(getter) => self.evaluate(name, &getter).map(Some),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for ComputedScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedScope")
            .field("view", &self.view)
            .field("assigned", &self.assigned)
            .field("memo", &self.memo.borrow().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Merged computed entries of one definition.
pub(crate) struct ComputedEngine {
    entries: Vec<(String, ComputedSpec)>,
    index: AHashMap<String, usize>,
    shared: Rc<RuntimeShared>,
}

impl ComputedEngine {
    fn new(entries: Vec<(String, ComputedSpec)>, shared: Rc<RuntimeShared>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();
        Self {
            entries,
            index,
            shared,
        }
    }

    fn getter(&self, name: &str) -> Option<Getter> {
        let (_, spec) = &self.entries[*self.index.get(name)?];
        spec.get.clone()
    }

    fn getter_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, spec)| spec.get.is_some())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Evaluate every getter against committed state and commit the results
    /// natively.
    fn seed(&self, host: &mut dyn HostInstance) -> Result<()> {
        let names = self.getter_names();
        if names.is_empty() {
            return Ok(());
        }
        let seeded = {
            let scope = ComputedScope::new(&mut *host, &self.shared, self, None)?;
            let mut seeded = State::new();
            for name in names {
                if let Some(value) = scope.evaluate_named(name)? {
                    seeded.insert(name.to_owned(), value);
                }
            }
            seeded
        };
        debug!(instance = %host.id(), fields = seeded.len(), "computed seeded");
        host.native_set_data(seeded, None)
    }

    /// Setter pass then recompute pass; mutates `payload`.
    pub(crate) fn before_update(&self, host: &mut dyn HostInstance, payload: &mut State) -> Result<()> {
        for (name, spec) in &self.entries {
            let (Some(set), Some(value)) = (&spec.set, payload.get(name)) else {
                continue;
            };
            trace!(computed = %name, "computed setter");
            let value = value.clone();
            set(&mut Vm::native(&mut *host, Rc::clone(&self.shared)), value)?;
        }

        let names = self.getter_names();
        if names.is_empty() {
            return Ok(());
        }
        let committed: Vec<Option<Value>> = names
            .iter()
            .map(|name| host.data().get(*name).cloned())
            .collect();
        let deltas = {
            let scope = ComputedScope::new(&mut *host, &self.shared, self, Some(&*payload))?;
            let mut deltas = Vec::new();
            for (name, current) in names.iter().zip(committed) {
                let Some(next) = scope.evaluate_named(name)? else {
                    continue;
                };
                if !deep_equal(current.as_ref(), Some(&next)) {
                    deltas.push(((*name).to_owned(), next));
                }
            }
            deltas
        };
        if !deltas.is_empty() {
            debug!(
                fields = ?deltas.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
                "computed folded into payload"
            );
        }
        for (name, value) in deltas {
            payload.insert(name, value);
        }
        Ok(())
    }
}

impl fmt::Debug for ComputedEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

/// Merges `computed`, seeds values at `created` and exposes the commit pass
/// to the update installer.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComputedInstaller;

impl Installer for ComputedInstaller {
    fn name(&self) -> &str {
        "computed"
    }

    fn install(&self, cx: &mut BuildCx<'_>) -> Result<()> {
        let mut computed = Vec::new();
        for source in cx.installers() {
            if let Some(entries) = source.computed() {
                installer::merge_entries(&mut computed, entries);
            }
        }
        installer::merge_entries(&mut computed, cx.options.computed.iter().cloned());
        debug!(entries = computed.len(), "computed merged");
        let engine = Rc::new(ComputedEngine::new(computed, Rc::clone(cx.shared())));
        cx.context.set(keys::COMPUTED, engine);
        Ok(())
    }

    fn definition_filter(&self, cx: &mut BuildCx<'_>, definition: &mut HostDefinition) -> Result<()> {
        let Some(engine) = cx.context.get::<Rc<ComputedEngine>>(keys::COMPUTED).cloned() else {
            return Ok(());
        };
        if !cx.config().seed_computed {
            return Ok(());
        }
        let created = host::hook(move |host| engine.seed(host));
        definition.prepend_behavior(Behavior::new("computed").on_created(created));
        Ok(())
    }
}
