#![forbid(unsafe_code)]

//! Core: property paths, deep equality, the build-time context store, and the
//! contract with the host component runtime.

pub mod context;
pub mod equal;
pub mod error;
pub mod host;
pub mod path;

pub use context::ContextStore;
pub use equal::{deep_equal, values_equal};
pub use error::{Error, Result};
pub use host::{
    Behavior, CommitCallback, CommitInterceptor, HostDefinition, HostHook, HostInstance,
    HostMethod, HostObserver, InstanceId, Lifetimes, PageLifetimes, PropertySpec, PropertyType,
    State,
};
pub use path::{ObserverPattern, Path, Segment};

pub use serde_json::{Map, Value};
