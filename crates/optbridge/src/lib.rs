#![forbid(unsafe_code)]

//! optbridge public facade.
//!
//! Build a host definition from an options object:
//!
//! ```
//! use optbridge::prelude::*;
//!
//! let options = ComponentOptions::new()
//!     .watch("count", WatchSpec::handler(|_, _, _| Ok(())));
//! let definition = Extender::new().build(&options).unwrap();
//! assert!(definition.behavior_names().contains(&"watcher"));
//! ```

pub use optbridge_core as core;
pub use optbridge_runtime as runtime;

#[cfg(feature = "logging")]
pub mod logging;

pub mod prelude {
    pub use optbridge_core::{
        Error, HostDefinition, HostInstance, InstanceId, PropertySpec, PropertyType, Result,
        State, Value,
    };
    pub use optbridge_runtime::{
        AdapterConfig, ComponentOptions, ComputedScope, ComputedSpec, Extender, ImmediatePhase,
        Installer, Mixin, Vm, WatchOptions, WatchSource, WatchSpec, WatchToken,
    };
}
