//! # Dispatcher
//!
//! Permission-filtered fan-out with per-event behavior: execution mode,
//! timeout, failure policy, and back-pressure.

use crate::events::{HookEvent, HookKind};
use crate::plugin::{HookOutcome, Plugin};
use shared_types::IndexerError;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{timeout, Instant};
use tracing::{info, warn};

/// How eligible plugins are invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// All plugins concurrently.
    Parallel,
    /// Registration order, one at a time.
    Sequential,
}

/// Per-event dispatch configuration.
#[derive(Debug, Clone)]
pub struct HookBehavior {
    pub mode: ExecutionMode,
    pub timeout: Duration,
    pub continue_on_error: bool,
    /// Whether the event may be dropped under back-pressure.
    pub droppable: bool,
}

impl HookBehavior {
    /// The behavior table. Block hooks are parallel with short timeouts;
    /// reorg is sequential, blocking, and never dropped; lifecycle is
    /// sequential.
    #[must_use]
    pub fn for_kind(kind: HookKind) -> Self {
        match kind {
            HookKind::BlockPreProcess
            | HookKind::BlockPostProcess
            | HookKind::BlockChange
            | HookKind::EpochChange
            | HookKind::EpochFinalized
            | HookKind::MempoolTransaction
            | HookKind::PurgeBlocks => Self {
                mode: ExecutionMode::Parallel,
                timeout: Duration::from_secs(5),
                continue_on_error: true,
                droppable: true,
            },
            HookKind::Reorg => Self {
                mode: ExecutionMode::Sequential,
                timeout: Duration::from_secs(300),
                continue_on_error: false,
                droppable: false,
            },
            HookKind::ReindexRequired => Self {
                mode: ExecutionMode::Sequential,
                timeout: Duration::from_secs(60),
                continue_on_error: true,
                droppable: false,
            },
            HookKind::Load | HookKind::Unload | HookKind::Enable | HookKind::Disable => Self {
                mode: ExecutionMode::Sequential,
                timeout: Duration::from_secs(30),
                continue_on_error: false,
                droppable: false,
            },
        }
    }
}

/// Dispatch failures.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// Dropped above the high-water mark.
    #[error("dispatch queue full, {kind:?} dropped")]
    Backpressure { kind: HookKind },

    /// A plugin failed and the event does not continue on error.
    #[error("plugin {plugin} failed during {kind:?}: {detail}")]
    PluginFailed {
        kind: HookKind,
        plugin: String,
        detail: String,
    },
}

impl From<DispatchError> for IndexerError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Backpressure { kind } => {
                IndexerError::Backpressure(format!("{kind:?}"))
            }
            DispatchError::PluginFailed { detail, .. } => IndexerError::Internal(detail),
        }
    }
}

/// The hook dispatcher.
pub struct HookDispatcher {
    /// Plugins in registration order.
    plugins: RwLock<Vec<Arc<dyn Plugin>>>,
    /// Disabled plugin names; disabled plugins are skipped entirely.
    disabled: RwLock<HashSet<String>>,
    /// In-flight dispatch count for back-pressure.
    in_flight: Arc<AtomicUsize>,
    /// Droppable events above this mark are rejected.
    high_water_mark: usize,
}

impl HookDispatcher {
    #[must_use]
    pub fn new(high_water_mark: usize) -> Self {
        Self {
            plugins: RwLock::new(Vec::new()),
            disabled: RwLock::new(HashSet::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            high_water_mark,
        }
    }

    /// Register a plugin and deliver `Load` to it.
    pub async fn register(&self, plugin: Arc<dyn Plugin>) -> Vec<HookOutcome> {
        let name = plugin.name().to_string();
        if let Ok(mut plugins) = self.plugins.write() {
            plugins.push(plugin.clone());
        }
        info!(plugin = %name, "plugin registered");
        self.invoke_sequential(
            &HookEvent::Load,
            &HookBehavior::for_kind(HookKind::Load),
            vec![plugin],
        )
        .await
        .unwrap_or_default()
    }

    /// Disable a plugin, delivering `Disable` to it first.
    pub async fn disable(&self, name: &str) {
        let target = self.eligible(HookKind::Disable).into_iter().find(|p| p.name() == name);
        if let Some(plugin) = target {
            let _ = self
                .invoke_sequential(
                    &HookEvent::Disable,
                    &HookBehavior::for_kind(HookKind::Disable),
                    vec![plugin],
                )
                .await;
        }
        if let Ok(mut disabled) = self.disabled.write() {
            disabled.insert(name.to_string());
        }
    }

    /// Re-enable a plugin, delivering `Enable` to it.
    pub async fn enable(&self, name: &str) {
        if let Ok(mut disabled) = self.disabled.write() {
            disabled.remove(name);
        }
        let target = self.eligible(HookKind::Enable).into_iter().find(|p| p.name() == name);
        if let Some(plugin) = target {
            let _ = self
                .invoke_sequential(
                    &HookEvent::Enable,
                    &HookBehavior::for_kind(HookKind::Enable),
                    vec![plugin],
                )
                .await;
        }
    }

    /// Dispatch one event to every eligible plugin.
    pub async fn dispatch(&self, event: &HookEvent) -> Result<Vec<HookOutcome>, DispatchError> {
        let kind = event.kind();
        let behavior = HookBehavior::for_kind(kind);

        if behavior.droppable && self.in_flight.load(Ordering::SeqCst) >= self.high_water_mark {
            warn!(?kind, "hook dispatch dropped under back-pressure");
            return Err(DispatchError::Backpressure { kind });
        }

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = self.dispatch_inner(event, &behavior).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn dispatch_inner(
        &self,
        event: &HookEvent,
        behavior: &HookBehavior,
    ) -> Result<Vec<HookOutcome>, DispatchError> {
        let eligible = self.eligible(event.kind());
        match behavior.mode {
            ExecutionMode::Parallel => Ok(self.invoke_parallel(event, behavior, eligible).await),
            ExecutionMode::Sequential => {
                self.invoke_sequential(event, behavior, eligible).await
            }
        }
    }

    fn eligible(&self, kind: HookKind) -> Vec<Arc<dyn Plugin>> {
        let permission = kind.required_permission();
        let disabled = self
            .disabled
            .read()
            .map(|set| set.clone())
            .unwrap_or_default();
        self.plugins
            .read()
            .map(|plugins| {
                plugins
                    .iter()
                    .filter(|plugin| !disabled.contains(plugin.name()))
                    .filter(|plugin| {
                        permission.is_empty() || plugin.permissions().contains(permission)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn invoke_one(
        plugin: &Arc<dyn Plugin>,
        event: &HookEvent,
        limit: Duration,
    ) -> HookOutcome {
        let started = Instant::now();
        let outcome = timeout(limit, plugin.handle(event)).await;
        let duration = started.elapsed();
        match outcome {
            Ok(Ok(result)) => HookOutcome {
                plugin: plugin.name().to_string(),
                success: true,
                duration,
                error: None,
                result,
            },
            Ok(Err(err)) => HookOutcome {
                plugin: plugin.name().to_string(),
                success: false,
                duration,
                error: Some(err.to_string()),
                result: None,
            },
            Err(_) => HookOutcome {
                plugin: plugin.name().to_string(),
                success: false,
                duration,
                error: Some(format!("timed out after {limit:?}")),
                result: None,
            },
        }
    }

    async fn invoke_parallel(
        &self,
        event: &HookEvent,
        behavior: &HookBehavior,
        plugins: Vec<Arc<dyn Plugin>>,
    ) -> Vec<HookOutcome> {
        let calls = plugins
            .iter()
            .map(|plugin| Self::invoke_one(plugin, event, behavior.timeout));
        let outcomes = futures::future::join_all(calls).await;
        for outcome in outcomes.iter().filter(|o| !o.success) {
            warn!(
                plugin = %outcome.plugin,
                kind = ?event.kind(),
                error = outcome.error.as_deref().unwrap_or(""),
                "hook failed"
            );
        }
        outcomes
    }

    async fn invoke_sequential(
        &self,
        event: &HookEvent,
        behavior: &HookBehavior,
        plugins: Vec<Arc<dyn Plugin>>,
    ) -> Result<Vec<HookOutcome>, DispatchError> {
        let mut outcomes = Vec::with_capacity(plugins.len());
        for plugin in plugins {
            let outcome = Self::invoke_one(&plugin, event, behavior.timeout).await;
            let failed = !outcome.success;
            let detail = outcome.error.clone().unwrap_or_default();
            outcomes.push(outcome);
            if failed && !behavior.continue_on_error {
                return Err(DispatchError::PluginFailed {
                    kind: event.kind(),
                    plugin: plugin.name().to_string(),
                    detail,
                });
            }
        }
        Ok(outcomes)
    }
}
