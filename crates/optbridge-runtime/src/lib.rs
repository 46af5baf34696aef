#![forbid(unsafe_code)]

//! Runtime: the installer pipeline, watch and computed engines, commit
//! interception and the instance view handed to user code.

pub mod config;
pub mod installer;
pub mod installers;
pub mod options;
pub(crate) mod shared;
pub mod side_table;
pub mod vm;

pub use config::{AdapterConfig, ImmediatePhase};
pub use installer::{BuildCx, Extender, Installer, Mixin, merge_entries};
pub use installers::{
    Binding, ComputedInstaller, ComputedScope, LifecycleInstaller, StateInstaller,
    UpdateInstaller, UpdateInterceptor, WatchOptions, WatchSource, WatchToken, WatcherInstaller,
};
pub use options::{
    BareHook, BeforeUpdateHook, ComponentOptions, ComputedSpec, DataSource, Hook, Lifecycle,
    Method, Observer, PageLifecycle, UpdatedHook, WatchEntry, WatchSpec, WatchTarget,
};
pub use side_table::{InstanceTable, InstanceTables, TrackedTable};
pub use vm::Vm;
