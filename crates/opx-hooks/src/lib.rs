//! # Hook Dispatcher
//!
//! Fans out block, epoch, mempool, and reorg events to plugins.
//!
//! ## Dispatch semantics
//!
//! - Block and mempool hooks run in parallel with short per-plugin
//!   timeouts; failures are collected, not fatal.
//! - `Reorg` is sequential, blocking, never dropped, and aborts on the
//!   first failure: the core waits for every plugin before resuming.
//! - Lifecycle hooks are sequential.
//! - Eligibility is permission-tagged; a plugin without the event's
//!   required permission is silently skipped.
//! - A bounded dispatch queue applies back-pressure: non-blocking events
//!   above the high-water mark are rejected and dropped with a warning.

pub mod dispatcher;
pub mod events;
pub mod plugin;

pub use dispatcher::{DispatchError, ExecutionMode, HookBehavior, HookDispatcher};
pub use events::{HookEvent, HookKind};
pub use plugin::{HookOutcome, Plugin, PluginError};
