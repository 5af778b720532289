//! Error types for the declarative engine

use crate::address::ResourceAddress;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading, planning or applying configuration
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// IO error tied to a specific file
    #[error("failed to access {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file is not valid TOML
    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    /// Configuration shape is wrong (e.g. a resource that is not a table)
    #[error("invalid configuration in {}: {message}", .path.display())]
    InvalidConfig { path: PathBuf, message: String },

    /// No configuration files were found
    #[error("no *.tf.toml configuration files found in {}", .0.display())]
    NoConfiguration(PathBuf),

    /// A resource, variable or output is defined more than once
    #[error("duplicate {kind} \"{name}\": defined in {} and {}", .first.display(), .second.display())]
    Duplicate {
        kind: &'static str,
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// Address string is not of the form `type.name`
    #[error("invalid resource address \"{0}\": expected <type>.<name>")]
    InvalidAddress(String),

    /// Malformed `${...}` expression
    #[error("invalid interpolation in {location}: {message}")]
    InvalidInterpolation { location: String, message: String },

    /// Reference to an undeclared resource, attribute or variable
    #[error("{location}: reference to undeclared {target}")]
    UnknownReference { location: String, target: String },

    /// Declared variable has neither a default nor an assigned value
    #[error("no value for required variable \"{0}\"")]
    MissingVariable(String),

    /// Value assigned to a variable that is not declared
    #[error("value assigned to undeclared variable \"{0}\"")]
    UndeclaredVariable(String),

    /// No provider registered for a resource type
    #[error("{address}: unknown resource type \"{resource_type}\"")]
    UnknownResourceType {
        address: ResourceAddress,
        resource_type: String,
    },

    /// Resource attributes violate the provider schema
    #[error("{address}: {message}")]
    Schema {
        address: ResourceAddress,
        message: String,
    },

    /// Dependency cycle in the resource graph
    #[error("dependency cycle: {}", format_cycle(.0))]
    Cycle(Vec<ResourceAddress>),

    /// Plan would destroy a resource protected by `prevent_destroy`
    #[error("{0} has lifecycle.prevent_destroy set but the plan would destroy it")]
    PreventDestroy(ResourceAddress),

    /// State file written by a newer version
    #[error("state format version {found} is newer than supported version {supported}")]
    UnsupportedStateVersion { found: u32, supported: u32 },

    /// State is locked by another operation
    #[error("state is locked by \"{who}\" for {operation} (lock id {id}, since {created})")]
    StateLocked {
        id: String,
        operation: String,
        who: String,
        created: String,
    },

    /// Lock id given to force-unlock does not match the held lock
    #[error("lock id \"{given}\" does not match the current lock \"{held}\"")]
    LockMismatch { given: String, held: String },

    /// No lock is held
    #[error("state is not locked")]
    NotLocked,

    /// Provider failed while reading a resource
    #[error("{address}: {message}")]
    Provider {
        address: ResourceAddress,
        message: String,
    },

    /// Resource address not present in state
    #[error("{0} is not in the state")]
    NotInState(ResourceAddress),

    /// Resource address already present in state
    #[error("{0} already exists in the state")]
    AlreadyInState(ResourceAddress),

    /// Failed to create worker pool
    #[error("failed to create worker pool: {0}")]
    ThreadPool(String),
}

fn format_cycle(path: &[ResourceAddress]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;
