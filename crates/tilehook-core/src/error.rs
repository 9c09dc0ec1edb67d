#![forbid(unsafe_code)]

//! Error taxonomy for the interception core.
//!
//! Nothing in this crate is allowed to surface an error into the host's call
//! stack. These types exist so failures can be propagated with `?` inside a
//! callback and then logged once, with context, at the guard boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure while reading or writing a host object through its capability
/// interface.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("host object `{type_name}` has no field `{field}`")]
    MissingField { type_name: String, field: String },

    #[error("field `{field}` on `{type_name}` is not {expected}")]
    FieldType {
        type_name: String,
        field: String,
        expected: &'static str,
    },

    #[error("host object `{type_name}` has no method `{method}`")]
    MissingMethod { type_name: String, method: String },

    #[error("`{method}` returned {found}, expected {expected}")]
    ReturnType {
        method: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("`{type_name}.{method}` failed: {message}")]
    Invocation {
        type_name: String,
        method: String,
        message: String,
    },

    #[error("argument {index} of `{method}` is not {expected}")]
    Argument {
        method: String,
        index: usize,
        expected: &'static str,
    },
}

/// Failure to install an interception because the host does not expose the
/// expected type or method (host version mismatch).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttachError {
    #[error("host type not found: {type_name}")]
    TypeNotFound { type_name: String },

    #[error("method not found: {type_name}.{method}({params})")]
    MethodNotFound {
        type_name: String,
        method: String,
        params: String,
    },
}

/// Failure constructing or updating one tile wrapper.
#[derive(Debug, Error)]
pub enum WrapperError {
    #[error("wrapper for `{key}` could not be created: {message}")]
    Construct { key: String, message: String },

    #[error("wrapper for `{key}` rejected update: {message}")]
    Update { key: String, message: String },

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Failure loading preferences or parsing a configuration event.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("preference `{key}` has invalid value `{value}`")]
    InvalidValue { key: String, value: String },
}

/// Top-level error for anything that can go wrong inside a callback.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Attach(#[from] AttachError),

    #[error(transparent)]
    Wrapper(#[from] WrapperError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("panel state is already borrowed by `{operation}`")]
    Reentrant { operation: &'static str },

    #[error("callback panicked: {message}")]
    Panicked { message: String },
}

impl Error {
    /// Build an [`Error::Panicked`] from a `catch_unwind` payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked { message }
    }
}
