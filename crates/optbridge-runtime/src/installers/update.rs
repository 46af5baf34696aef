#![forbid(unsafe_code)]

//! Commit interception.
//!
//! At `created` every instance gets an [`UpdateInterceptor`] in its commit
//! slot. A commit through the public entry point then runs:
//!
//! 1. installer `before_update` hooks in install order (may edit the payload);
//! 2. the computed pass (setters, recompute, fold);
//! 3. the native commit, which applies the payload and fires observers;
//! 4. installer `updated` hooks, then the caller's callback.
//!
//! Teardown puts back whatever occupied the slot before.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use optbridge_core::host::{
    self, Behavior, CommitCallback, CommitInterceptor, HostDefinition, HostInstance,
};
use optbridge_core::{Error, Result, State};
use tracing::{debug, trace, warn};

use crate::installer::{BuildCx, Installer, keys};
use crate::installers::computed::ComputedEngine;
use crate::options::{BeforeUpdateHook, UpdatedHook};
use crate::shared::RuntimeShared;
use crate::side_table::InstanceTable;
use crate::vm::Vm;

/// Hook chains shared by every interceptor of one definition.
struct UpdateChains {
    before: Vec<BeforeUpdateHook>,
    after: Vec<UpdatedHook>,
    computed: Option<Rc<ComputedEngine>>,
    shared: Rc<RuntimeShared>,
}

/// Per-instance replacement of the public commit entry point.
pub struct UpdateInterceptor {
    chains: Rc<UpdateChains>,
    depth: Cell<usize>,
}

impl UpdateInterceptor {
    /// Current commit nesting depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    fn run(
        &self,
        host: &mut dyn HostInstance,
        mut payload: State,
        callback: Option<CommitCallback>,
    ) -> Result<()> {
        let chains = &self.chains;
        if !chains.before.is_empty() {
            let mut vm = Vm::new(&mut *host, Rc::clone(&chains.shared));
            for hook in &chains.before {
                hook(&mut vm, &mut payload)?;
            }
        }
        if let Some(engine) = &chains.computed {
            engine.before_update(&mut *host, &mut payload)?;
        }

        let applied = payload.clone();
        let after = Rc::clone(chains);
        let done = host::callback(move |host| {
            let mut vm = Vm::new(host, Rc::clone(&after.shared));
            for hook in &after.after {
                hook(&mut vm, &applied)?;
            }
            match callback {
                Some(callback) => callback(vm.host()),
                None => Ok(()),
            }
        });
        host.native_set_data(payload, Some(done))
    }
}

impl CommitInterceptor for UpdateInterceptor {
    fn commit(
        &self,
        host: &mut dyn HostInstance,
        payload: State,
        callback: Option<CommitCallback>,
    ) -> Result<()> {
        let limit = self.chains.shared.config().max_commit_depth;
        let depth = self.depth.get() + 1;
        if depth > limit {
            warn!(instance = %host.id(), limit, "commit nesting limit reached");
            return Err(Error::CommitDepthExceeded { limit });
        }
        trace!(instance = %host.id(), depth, keys = payload.len(), "commit");
        self.depth.set(depth);
        let result = self.run(host, payload, callback);
        self.depth.set(depth - 1);
        result
    }
}

impl fmt::Debug for UpdateInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateInterceptor")
            .field("before", &self.chains.before.len())
            .field("after", &self.chains.after.len())
            .field("computed", &self.chains.computed.is_some())
            .field("depth", &self.depth.get())
            .finish()
    }
}

/// Installs the commit interceptor on every instance.
#[derive(Debug, Default, Clone, Copy)]
pub struct UpdateInstaller;

impl Installer for UpdateInstaller {
    fn name(&self) -> &str {
        "update"
    }

    fn install(&self, cx: &mut BuildCx<'_>) -> Result<()> {
        let before: Vec<BeforeUpdateHook> = cx
            .installers()
            .iter()
            .filter_map(|i| i.before_update())
            .collect();
        let after: Vec<UpdatedHook> = cx.installers().iter().filter_map(|i| i.updated()).collect();
        cx.context.set(keys::BEFORE_UPDATE, before);
        cx.context.set(keys::UPDATED, after);
        Ok(())
    }

    fn definition_filter(&self, cx: &mut BuildCx<'_>, definition: &mut HostDefinition) -> Result<()> {
        let chains = Rc::new(UpdateChains {
            before: cx
                .context
                .get::<Vec<BeforeUpdateHook>>(keys::BEFORE_UPDATE)
                .cloned()
                .unwrap_or_default(),
            after: cx
                .context
                .get::<Vec<UpdatedHook>>(keys::UPDATED)
                .cloned()
                .unwrap_or_default(),
            computed: cx.context.get::<Rc<ComputedEngine>>(keys::COMPUTED).cloned(),
            shared: Rc::clone(cx.shared()),
        });
        debug!(
            before = chains.before.len(),
            after = chains.after.len(),
            computed = chains.computed.is_some(),
            "update chains built"
        );

        // Slot contents displaced at `created`, restored at teardown.
        let displaced: Rc<InstanceTable<Option<Rc<dyn CommitInterceptor>>>> =
            Rc::new(InstanceTable::new("commit interceptor"));
        cx.track_table(&displaced);

        let created = {
            let displaced = Rc::clone(&displaced);
            host::hook(move |host| {
                let interceptor: Rc<dyn CommitInterceptor> = Rc::new(UpdateInterceptor {
                    chains: Rc::clone(&chains),
                    depth: Cell::new(0),
                });
                let previous = host.replace_commit_interceptor(Some(interceptor));
                displaced.attach(host.id(), previous);
                Ok(())
            })
        };
        let teardown = host::hook(move |host| {
            let id = host.id();
            match displaced.detach(id) {
                Some(previous) => {
                    host.replace_commit_interceptor(previous);
                    trace!(instance = %id, "commit interceptor removed");
                }
                None => trace!(instance = %id, "no commit interceptor to remove"),
            }
            Ok(())
        });

        definition.prepend_behavior(Behavior::new("update").on_created(created));
        cx.add_teardown(teardown);
        Ok(())
    }
}
