#![forbid(unsafe_code)]

//! Properties, initial data and methods.

use optbridge_core::host::HostDefinition;
use optbridge_core::{PropertySpec, Result, State};
use tracing::debug;

use crate::installer::{self, BuildCx, Installer, keys};
use crate::options::Method;
use crate::vm;

/// Merges `props`, `data` and `methods` into the host definition.
///
/// Data sources run in installer order and then the options object's own;
/// each factory receives the merged property defaults and later keys win.
#[derive(Debug, Default, Clone, Copy)]
pub struct StateInstaller;

fn property_defaults(properties: &[(String, PropertySpec)]) -> State {
    properties
        .iter()
        .map(|(name, spec)| (name.clone(), spec.default.clone()))
        .collect()
}

impl Installer for StateInstaller {
    fn name(&self) -> &str {
        "state"
    }

    fn install(&self, cx: &mut BuildCx<'_>) -> Result<()> {
        let mut properties = Vec::new();
        let mut methods: Vec<(String, Method)> = Vec::new();
        for source in cx.installers() {
            if let Some(entries) = source.properties() {
                installer::merge_entries(&mut properties, entries);
            }
            if let Some(entries) = source.methods() {
                installer::merge_entries(&mut methods, entries);
            }
        }
        installer::merge_entries(&mut properties, cx.options.props.iter().cloned());
        installer::merge_entries(&mut methods, cx.options.methods.iter().cloned());

        let defaults = property_defaults(&properties);
        let mut state = State::new();
        let sources = cx
            .installers()
            .iter()
            .filter_map(|i| i.data())
            .chain(cx.options.data.clone());
        for source in sources {
            state.extend(source.produce(&defaults)?);
        }

        debug!(
            properties = properties.len(),
            fields = state.len(),
            methods = methods.len(),
            "state merged"
        );
        cx.shared().set_methods(methods.clone());
        cx.context.set(keys::PROPERTIES, properties);
        cx.context.set(keys::STATE, state);
        cx.context.set(keys::METHODS, methods);
        Ok(())
    }

    fn definition_filter(&self, cx: &mut BuildCx<'_>, definition: &mut HostDefinition) -> Result<()> {
        if let Some(properties) = cx.context.get::<Vec<(String, PropertySpec)>>(keys::PROPERTIES) {
            definition.properties = properties.clone();
        }
        if let Some(state) = cx.context.get::<State>(keys::STATE) {
            definition.data = state.clone();
        }
        if let Some(methods) = cx.context.get::<Vec<(String, Method)>>(keys::METHODS) {
            definition.methods = methods
                .iter()
                .map(|(name, method)| (name.clone(), vm::bind_method(cx.shared(), method.clone())))
                .collect();
        }
        Ok(())
    }
}
