#![forbid(unsafe_code)]

//! Lifecycle chains.
//!
//! Options-style hooks map onto host lifetimes as follows:
//!
//! | Options hook | Host lifetime |
//! |--------------|---------------|
//! | `beforeCreate` | first thing in `created`, without an instance view |
//! | `created` | `created` |
//! | `beforeMount` | `created`, after the `created` chain |
//! | `mounted` | `attached` |
//! | `beforeDestroy`, `destroyed` | `detached`, in that order |
//!
//! Every host lifetime runs native installer hooks first, then the translated
//! chain. Translated chains list installers in order and end with the options
//! object's own hook.

use optbridge_core::host::{self, Behavior, HostDefinition};
use optbridge_core::Result;
use tracing::debug;

use crate::installer::{BuildCx, Installer, keys};
use crate::options::{BareHook, Hook, Lifecycle, PageLifecycle};
use crate::vm;

/// Per-event hook chains collected during the install stage.
#[derive(Clone, Default)]
struct Chains {
    before_create: Vec<BareHook>,
    created: Vec<Hook>,
    attached: Vec<Hook>,
    detached: Vec<Hook>,
    show: Vec<Hook>,
    hide: Vec<Hook>,
    resize: Vec<Hook>,
}

impl Chains {
    fn collect(cx: &BuildCx<'_>) -> Self {
        let installers = cx.installers();
        let options = cx.options;
        let mut chains = Self::default();

        let native: Vec<Lifecycle> = installers.iter().filter_map(|i| i.lifetimes()).collect();
        let page: Vec<PageLifecycle> = installers
            .iter()
            .filter_map(|i| i.page_lifetimes())
            .collect();

        chains.before_create = installers
            .iter()
            .filter_map(|i| i.before_create())
            .chain(options.before_create.clone())
            .collect();

        chains.created = native.iter().filter_map(|l| l.created.clone()).collect();
        chains.created.extend(
            installers
                .iter()
                .filter_map(|i| i.created())
                .chain(options.created.clone()),
        );
        chains.created.extend(
            installers
                .iter()
                .filter_map(|i| i.before_mount())
                .chain(options.before_mount.clone()),
        );

        chains.attached = native.iter().filter_map(|l| l.attached.clone()).collect();
        chains.attached.extend(
            installers
                .iter()
                .filter_map(|i| i.mounted())
                .chain(options.mounted.clone()),
        );

        chains.detached = native.iter().filter_map(|l| l.detached.clone()).collect();
        chains.detached.extend(
            installers
                .iter()
                .filter_map(|i| i.before_destroy())
                .chain(options.before_destroy.clone()),
        );
        chains.detached.extend(
            installers
                .iter()
                .filter_map(|i| i.destroyed())
                .chain(options.destroyed.clone()),
        );

        chains.show = page.iter().filter_map(|p| p.show.clone()).collect();
        chains.hide = page.iter().filter_map(|p| p.hide.clone()).collect();
        chains.resize = page.iter().filter_map(|p| p.resize.clone()).collect();
        chains
    }
}

/// Builds the lifecycle behaviours.
#[derive(Debug, Default, Clone, Copy)]
pub struct LifecycleInstaller;

impl Installer for LifecycleInstaller {
    fn name(&self) -> &str {
        "lifecycle"
    }

    fn install(&self, cx: &mut BuildCx<'_>) -> Result<()> {
        let chains = Chains::collect(cx);
        debug!(
            before_create = chains.before_create.len(),
            created = chains.created.len(),
            attached = chains.attached.len(),
            detached = chains.detached.len(),
            "lifecycle chains collected"
        );
        cx.context.set(keys::LIFECYCLE, chains);
        Ok(())
    }

    fn definition_filter(&self, cx: &mut BuildCx<'_>, definition: &mut HostDefinition) -> Result<()> {
        let Some(chains) = cx.context.get::<Chains>(keys::LIFECYCLE).cloned() else {
            return Ok(());
        };
        let shared = cx.shared();

        if !chains.before_create.is_empty() {
            let hooks = chains.before_create;
            let created = host::hook(move |_| hooks.iter().try_for_each(|hook| hook()));
            definition.prepend_behavior(Behavior::new("before-create").on_created(created));
        }

        let mut behavior = Behavior::new("lifecycle");
        behavior.lifetimes.created = vm::bind_chain(shared, chains.created);
        behavior.lifetimes.attached = vm::bind_chain(shared, chains.attached);
        behavior.lifetimes.detached = vm::bind_chain(shared, chains.detached);
        behavior.page_lifetimes.show = vm::bind_chain(shared, chains.show);
        behavior.page_lifetimes.hide = vm::bind_chain(shared, chains.hide);
        behavior.page_lifetimes.resize = vm::bind_chain(shared, chains.resize);
        definition.append_behavior(behavior);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::{Extender, Mixin};
    use crate::options::ComponentOptions;

    #[test]
    fn before_create_runs_ahead_of_every_engine() {
        let options = ComponentOptions::new().before_create(|| Ok(()));
        let definition = Extender::new().build(&options).unwrap();
        assert_eq!(definition.behavior_names()[0], "before-create");
    }

    #[test]
    fn no_before_create_behaviour_without_hooks() {
        let definition = Extender::new().build(&ComponentOptions::new()).unwrap();
        assert!(!definition.behavior_names().contains(&"before-create"));
    }

    #[test]
    fn page_events_come_from_native_lifetimes() {
        let mixin = Mixin::new("page").on_show(|_| Ok(()));
        let definition = Extender::new()
            .install(mixin)
            .build(&ComponentOptions::new())
            .unwrap();
        let lifecycle = definition
            .behaviors
            .iter()
            .find(|b| b.name == "lifecycle")
            .unwrap();
        assert!(lifecycle.page_lifetimes.show.is_some());
        assert!(lifecycle.page_lifetimes.hide.is_none());
    }
}
