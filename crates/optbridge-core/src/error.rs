#![forbid(unsafe_code)]

//! Error type shared by every adapter crate.

use thiserror::Error;

use crate::host::InstanceId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "failed watching path \"{path}\": only simple dot-delimited paths are accepted ({reason})"
    )]
    PathSyntax { path: String, reason: &'static str },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("computed property \"{name}\" depends on itself")]
    ComputedCycle { name: String },

    #[error("commit nested deeper than {limit} levels")]
    CommitDepthExceeded { limit: usize },

    #[error("unknown method: {name}")]
    UnknownMethod { name: String },

    #[error("instance {id} is not tracked by the {table} table")]
    InstanceNotTracked { id: InstanceId, table: &'static str },

    #[error("host error: {message}")]
    Host { message: String },

    #[error("{message}")]
    Custom { message: String },
}

impl Error {
    #[must_use]
    pub fn path_syntax(path: impl Into<String>, reason: &'static str) -> Self {
        Self::PathSyntax {
            path: path.into(),
            reason,
        }
    }

    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn host(message: impl Into<String>) -> Self {
        Self::Host {
            message: message.into(),
        }
    }

    /// Error raised from user code (hooks, handlers, getters, setters).
    #[must_use]
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom {
            message: message.into(),
        }
    }

    /// Whether this error was produced by a malformed path.
    #[must_use]
    pub fn is_path_syntax(&self) -> bool {
        matches!(self, Self::PathSyntax { .. })
    }
}
