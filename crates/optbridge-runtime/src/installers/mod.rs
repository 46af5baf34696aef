#![forbid(unsafe_code)]

//! Built-in installers, in default pipeline order.

pub mod computed;
pub mod lifecycle;
pub mod state;
pub mod update;
pub mod watcher;

pub use computed::{Binding, ComputedInstaller, ComputedScope};
pub use lifecycle::LifecycleInstaller;
pub use state::StateInstaller;
pub use update::{UpdateInstaller, UpdateInterceptor};
pub use watcher::{WatchOptions, WatchSource, WatchToken, WatcherInstaller};
