//! Typed lifecycle hook dispatch.
//!
//! Handlers of a given [`HookType`] are invoked sequentially, in
//! registration order, and their results are either collected individually
//! (`execute`) or folded into one [`MergedResult`] (`execute_and_merge`).
//! The registry tolerates concurrent `register`/`unregister`/`execute`
//! calls: each dispatch takes a snapshot of the handler list under a read
//! lock so it iterates a stable view even if another task is registering a
//! new handler concurrently.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookType {
    BeforeMessage,
    AfterMessage,
    OnIntent,
    OnAgentSelected,
    OnToolCall,
    OnResponse,
    OnContextInsertion,
    BeforeRouting,
    AfterRouting,
    AfterRoutingDecision,
    BeforePipeline,
    AfterPipeline,
    OnPipelineError,
    BeforeStep,
    AfterStep,
    OnStepError,
}

/// The payload and correlation fields passed to every handler for a given
/// dispatch. `data` carries the type-specific payload as JSON so the
/// registry doesn't need a generic parameter per hook type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookEvent {
    #[serde(rename = "type")]
    pub hook_type: HookType,
    pub data: Value,
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_name: Option<String>,
}

/// What a single handler returned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<HashMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub abort: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
    /// Name of the handler that produced this result, used to populate
    /// `abortedBy` when `abort` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl HookResult {
    pub fn skip() -> Self {
        Self { skip: true, ..Default::default() }
    }

    pub fn abort(source: impl Into<String>) -> Self {
        Self { abort: true, source: Some(source.into()), ..Default::default() }
    }
}

/// How a single handler invocation is classified for telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookOutcome {
    Executed,
    Skipped,
    Aborted,
    Modified,
    Error,
}

impl HookOutcome {
    fn classify(result: &Result<HookResult, String>) -> Self {
        match result {
            Err(_) => HookOutcome::Error,
            Ok(r) if r.abort => HookOutcome::Aborted,
            Ok(r) if r.skip => HookOutcome::Skipped,
            Ok(r) if r.context.is_some() || r.data.is_some() || r.metadata.is_some() => HookOutcome::Modified,
            Ok(_) => HookOutcome::Executed,
        }
    }
}

/// A registered handler: an async function from `HookEvent` to `HookResult`.
pub type Handler = Arc<
    dyn Fn(HookEvent) -> Pin<Box<dyn Future<Output = Result<HookResult, String>> + Send>> + Send + Sync,
>;

/// The result of folding every handler's output from one `execute` call.
#[derive(Debug, Clone, Default)]
pub struct MergedResult {
    pub context: HashMap<String, Value>,
    pub data: Option<Value>,
    pub skip: bool,
    pub abort: bool,
    pub aborted_by: Option<String>,
    pub metadata: HashMap<String, Value>,
    pub outcomes: Vec<HookOutcome>,
}

#[derive(Default)]
struct Registry {
    handlers: HashMap<HookType, Vec<(u64, Handler)>>,
}

/// Dispatches [`HookEvent`]s to registered handlers by type.
pub struct HookManager {
    registry: RwLock<Registry>,
    next_id: AtomicU64,
}

impl Default for HookManager {
    fn default() -> Self {
        Self::new()
    }
}

impl HookManager {
    pub fn new() -> Self {
        Self { registry: RwLock::new(Registry::default()), next_id: AtomicU64::new(0) }
    }

    /// Register a handler, returning a token usable with [`unregister`].
    pub async fn register(&self, hook_type: HookType, handler: Handler) -> HandlerToken {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut registry = self.registry.write().await;
        registry.handlers.entry(hook_type).or_default().push((id, handler));
        HandlerToken { hook_type, id }
    }

    /// Remove the handler matching `token`. Returns `true` the first time,
    /// `false` on a second call for the same token (already removed).
    pub async fn unregister(&self, token: HandlerToken) -> bool {
        let mut registry = self.registry.write().await;
        if let Some(handlers) = registry.handlers.get_mut(&token.hook_type) {
            let before = handlers.len();
            handlers.retain(|(id, _)| *id != token.id);
            return handlers.len() != before;
        }
        false
    }

    /// Run every handler of `hook_type` sequentially, in registration
    /// order, returning each outcome. A handler error is caught, classified
    /// as `HookOutcome::Error`, and does not stop later handlers.
    pub async fn execute(&self, hook_type: HookType, event: HookEvent) -> Vec<(HookResult, HookOutcome)> {
        // Snapshot under a read lock so concurrent register/unregister calls
        // never observe a half-iterated list.
        let snapshot: Vec<Handler> = {
            let registry = self.registry.read().await;
            registry
                .handlers
                .get(&hook_type)
                .map(|v| v.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default()
        };

        let mut results = Vec::with_capacity(snapshot.len());
        for handler in snapshot {
            let outcome_result = handler(event.clone()).await;
            if let Err(e) = &outcome_result {
                error!(hook = ?hook_type, error = %e, "hook handler failed");
            }
            let outcome = HookOutcome::classify(&outcome_result);
            let result = outcome_result.unwrap_or_default();
            results.push((result, outcome));
        }
        results
    }

    /// Run `execute` then fold results per the merge semantics: `context`
    /// shallow-merged across results, `data` = last non-null, `skip`/`abort`
    /// = any-true, `metadata` shallow-merged.
    pub async fn execute_and_merge(&self, hook_type: HookType, event: HookEvent) -> MergedResult {
        let results = self.execute(hook_type, event).await;
        let mut merged = MergedResult::default();
        for (result, outcome) in results {
            if let Some(context) = result.context {
                merged.context.extend(context);
            }
            if result.data.is_some() {
                merged.data = result.data;
            }
            merged.skip = merged.skip || result.skip;
            if result.abort {
                merged.abort = true;
                merged.aborted_by = result.source.clone().or(merged.aborted_by.take());
            }
            if let Some(metadata) = result.metadata {
                merged.metadata.extend(metadata);
            }
            merged.outcomes.push(outcome);
        }
        merged
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerToken {
    hook_type: HookType,
    id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn event(hook_type: HookType) -> HookEvent {
        HookEvent { hook_type, data: Value::Null, run_id: "r1".into(), pipeline_id: None, step_name: None }
    }

    fn ok_handler(result: HookResult) -> Handler {
        Arc::new(move |_event| {
            let result = result.clone();
            Box::pin(async move { Ok(result) })
        })
    }

    #[tokio::test]
    async fn handlers_execute_in_registration_order() {
        let manager = HookManager::new();
        let order = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            manager
                .register(
                    HookType::BeforeStep,
                    Arc::new(move |_event| {
                        let order = order.clone();
                        Box::pin(async move {
                            order.lock().await.push(i);
                            Ok(HookResult::default())
                        })
                    }),
                )
                .await;
        }

        manager.execute(HookType::BeforeStep, event(HookType::BeforeStep)).await;
        assert_eq!(*order.lock().await, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn unregister_is_idempotent_false_on_second_call() {
        let manager = HookManager::new();
        let token = manager.register(HookType::BeforeStep, ok_handler(HookResult::default())).await;
        assert!(manager.unregister(token).await);
        assert!(!manager.unregister(token).await);
    }

    #[tokio::test]
    async fn handler_error_does_not_stop_later_handlers() {
        let manager = HookManager::new();
        manager
            .register(
                HookType::BeforeStep,
                Arc::new(|_event| Box::pin(async { Err("boom".to_string()) })),
            )
            .await;
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        manager
            .register(
                HookType::BeforeStep,
                Arc::new(move |_event| {
                    let ran = ran2.clone();
                    Box::pin(async move {
                        ran.fetch_add(1, Ordering::SeqCst);
                        Ok(HookResult::default())
                    })
                }),
            )
            .await;

        let results = manager.execute(HookType::BeforeStep, event(HookType::BeforeStep)).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].1, HookOutcome::Error);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn execute_and_merge_folds_results() {
        let manager = HookManager::new();
        manager
            .register(HookType::AfterStep, ok_handler(HookResult { data: Some(Value::from(1)), ..Default::default() }))
            .await;
        manager
            .register(HookType::AfterStep, ok_handler(HookResult { data: Some(Value::from(2)), skip: true, ..Default::default() }))
            .await;

        let merged = manager.execute_and_merge(HookType::AfterStep, event(HookType::AfterStep)).await;
        assert_eq!(merged.data, Some(Value::from(2)));
        assert!(merged.skip);
        assert!(!merged.abort);
    }

    #[tokio::test]
    async fn abort_any_true_and_aborted_by_recorded() {
        let manager = HookManager::new();
        manager.register(HookType::BeforePipeline, ok_handler(HookResult::default())).await;
        manager
            .register(HookType::BeforePipeline, ok_handler(HookResult::abort("guard-handler")))
            .await;

        let merged = manager
            .execute_and_merge(HookType::BeforePipeline, event(HookType::BeforePipeline))
            .await;
        assert!(merged.abort);
        assert_eq!(merged.aborted_by.as_deref(), Some("guard-handler"));
    }
}
