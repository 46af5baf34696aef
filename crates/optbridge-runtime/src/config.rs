#![forbid(unsafe_code)]

//! Adapter configuration.
//!
//! # Environment
//!
//! [`AdapterConfig::from_env`] starts from the defaults and applies:
//!
//! | Variable | Values |
//! |----------|--------|
//! | `OPTBRIDGE_IMMEDIATE_PHASE` | `attached` or `created` |
//! | `OPTBRIDGE_SEED_COMPUTED` | `1`/`true` or `0`/`false` |
//! | `OPTBRIDGE_MAX_COMMIT_DEPTH` | positive integer |
//!
//! Unparsable values are ignored with a warning.

use std::env;
use std::str::FromStr;

use optbridge_core::{Error, Result};
use tracing::warn;

/// Lifecycle phase in which immediate static watchers fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ImmediatePhase {
    /// Fire after external overrides have been applied.
    #[default]
    Attached,
    /// Fire while the instance is being constructed, with an undefined old
    /// value.
    Created,
}

impl FromStr for ImmediatePhase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "attached" => Ok(Self::Attached),
            "created" => Ok(Self::Created),
            other => Err(Error::invalid(format!("unknown immediate phase {other:?}"))),
        }
    }
}

/// Behaviour switches shared by every instance built from one definition.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AdapterConfig {
    pub immediate_phase: ImmediatePhase,
    /// Evaluate every computed getter at `created` and commit the results.
    pub seed_computed: bool,
    /// Deepest allowed commit nesting per instance.
    pub max_commit_depth: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            immediate_phase: ImmediatePhase::Attached,
            seed_computed: true,
            max_commit_depth: 32,
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl AdapterConfig {
    /// Defaults overridden by `OPTBRIDGE_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(raw) = lookup("OPTBRIDGE_IMMEDIATE_PHASE") {
            match raw.parse() {
                Ok(phase) => config.immediate_phase = phase,
                Err(_) => warn!(value = %raw, "ignoring OPTBRIDGE_IMMEDIATE_PHASE"),
            }
        }
        if let Some(raw) = lookup("OPTBRIDGE_SEED_COMPUTED") {
            match parse_flag(&raw) {
                Some(flag) => config.seed_computed = flag,
                None => warn!(value = %raw, "ignoring OPTBRIDGE_SEED_COMPUTED"),
            }
        }
        if let Some(raw) = lookup("OPTBRIDGE_MAX_COMMIT_DEPTH") {
            match raw.trim().parse::<usize>() {
                Ok(depth) if depth > 0 => config.max_commit_depth = depth,
                _ => warn!(value = %raw, "ignoring OPTBRIDGE_MAX_COMMIT_DEPTH"),
            }
        }
        config
    }

    #[must_use]
    pub fn with_immediate_phase(mut self, phase: ImmediatePhase) -> Self {
        self.immediate_phase = phase;
        self
    }

    #[must_use]
    pub fn with_seed_computed(mut self, enabled: bool) -> Self {
        self.seed_computed = enabled;
        self
    }

    /// Set the commit nesting limit. Zero is clamped to one.
    #[must_use]
    pub fn with_max_commit_depth(mut self, depth: usize) -> Self {
        self.max_commit_depth = depth.max(1);
        self
    }
}
