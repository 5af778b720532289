//! Apply context and callback traits
//!
//! These traits allow the declarative crate to be used without
//! depending on specific implementations of progress display, prompts, etc.

use crate::address::ResourceAddress;
use crate::diff::Action;
use crate::types::ApplyResult;
use anyhow::Result;

/// Progress callback for execution operations
///
/// All methods are called from the coordinating thread, never from workers.
pub trait ProgressCallback: Send {
    /// Called once before any change is applied
    fn on_batch_start(&mut self, count: usize);

    /// Called when a change is dispatched to a worker
    fn on_resource_start(&mut self, address: &ResourceAddress, action: Action);

    /// Called when a change completes, fails or is skipped
    fn on_resource_complete(&mut self, address: &ResourceAddress, result: &ApplyResult);

    /// Called after the last change
    fn on_batch_complete(&mut self);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_batch_start(&mut self, _count: usize) {}
    fn on_resource_start(&mut self, _address: &ResourceAddress, _action: Action) {}
    fn on_resource_complete(&mut self, _address: &ResourceAddress, _result: &ApplyResult) {}
    fn on_batch_complete(&mut self) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Context passed to provider operations
#[derive(Debug, Clone, Copy)]
pub struct ApplyContext<'a> {
    /// Address of the resource being operated on
    pub address: &'a ResourceAddress,
    /// Whether to output verbose information
    pub verbose: bool,
}

impl<'a> ApplyContext<'a> {
    pub fn new(address: &'a ResourceAddress, verbose: bool) -> Self {
        Self { address, verbose }
    }
}
