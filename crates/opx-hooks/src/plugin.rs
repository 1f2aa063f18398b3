//! # Plugin Contract

use crate::events::HookEvent;
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// A plugin-side failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("plugin failure: {0}")]
pub struct PluginError(pub String);

/// A registered plugin.
///
/// `handle` returns an optional boolean: only `ReindexRequired` inspects
/// it (`true` = the plugin satisfied the reindex requirement).
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Stable plugin name.
    fn name(&self) -> &str;

    /// Permission tags this plugin holds (e.g. `blocks.onChange`).
    fn permissions(&self) -> HashSet<String>;

    /// Handle one event.
    async fn handle(&self, event: &HookEvent) -> Result<Option<bool>, PluginError>;
}

/// The recorded outcome of one plugin invocation.
#[derive(Debug, Clone)]
pub struct HookOutcome {
    /// Plugin name.
    pub plugin: String,
    /// Whether the call completed without error or timeout.
    pub success: bool,
    /// Wall-clock duration of the call.
    pub duration: Duration,
    /// Failure detail, when `success` is false.
    pub error: Option<String>,
    /// Boolean result, inspected only for `ReindexRequired`.
    pub result: Option<bool>,
}
