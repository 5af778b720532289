//! # Declarative
//!
//! A reconciliation engine for declarative infrastructure configuration.
//!
//! Configuration describes the desired set of resources. State records what
//! was last applied. The engine diffs the two, orders the resulting changes
//! by their dependencies, and hands each change to the provider for its
//! resource type.
//!
//! ## Core Concepts
//!
//! - **Configuration**: resources, variables and outputs loaded from TOML
//! - **DependencyGraph**: explicit `depends_on` and implicit `${...}` edges
//! - **StateSnapshot**: last-applied attributes, persisted by a [`StateStore`]
//! - **Plan**: one [`ResourceChange`] per resource (create, update, replace,
//!   destroy or no-op)
//! - **Executor**: applies a plan in dependency order with bounded
//!   parallelism
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     Configuration, ExecuteOptions, LocalStateStore, PlanOptions, ProviderRegistry,
//!     StateStore, execute_simple, plan,
//! };
//!
//! let config = Configuration::load("infra".as_ref())?;
//! let registry = ProviderRegistry::new(); // register providers here
//! let store = LocalStateStore::new("terrace.tfstate");
//!
//! let _lock = store.lock("apply")?;
//! let state = store.load()?;
//! let variables = config.resolve_variables(std::env::vars(), &Default::default())?;
//! let plan = plan(&config, &state, &registry, &PlanOptions { variables, ..Default::default() })?;
//! let mut outcome = execute_simple(&plan, &config, &registry, &ExecuteOptions::default())?;
//! store.persist(&mut outcome.state)?;
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`ResourceProvider`]: create, read, update and delete one resource type
//! - [`StateStore`]: load, persist and lock state
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! This allows the crate to be used without hard dependencies on
//! specific UI frameworks, storage backends, etc.

pub mod address;
pub mod config;
pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod graph;
pub mod planner;
pub mod provider;
pub mod state;
pub mod types;
pub mod value;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use address::{ResourceAddress, Target};
pub use config::{Configuration, Lifecycle, OutputConfig, ResourceConfig, VariableConfig};
pub use context::{
    ApplyContext, AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback,
};
pub use diff::{Action, AttributeDiff, DiffSummary, ReplaceReason, ResourceChange, group_by_type};
pub use error::{Error, Result};
pub use executor::{ExecuteOutcome, execute, execute_simple};
pub use graph::DependencyGraph;
pub use planner::{Plan, PlanMode, PlanOptions, plan, refresh};
pub use provider::{
    AttributeKind, AttributeSchema, BoxedProvider, ProviderRegistry, ResourceProvider, Schema,
    ValueType,
};
pub use state::{
    LocalStateStore, LockInfo, MemoryStateStore, OutputValue, ResourceInstance, StateLock,
    StateSnapshot, StateStore,
};
pub use types::{ApplyResult, DEFAULT_PARALLELISM, ExecuteOptions, ExecuteSummary};
pub use value::{Attributes, PlannedAttributes, PlannedValue};
