// SPDX-License-Identifier: MIT OR Apache-2.0
//! The nine-step executor algorithm (§4.3).

use crate::runtime::Runtime;
use crate::worker::Worker;
use ric_cache::{CacheStrategy, JsonCacheStrategy, VersionedCacheStrategy};
use ric_core::{fingerprint, CacheStrategyKind, DepsUsagePolicy, RunContext, WorkerOutput};
use ric_error::RicError;
use ric_registry::Deps;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::Instrument;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

fn cache_strategy(kind: CacheStrategyKind) -> Box<dyn CacheStrategy> {
    match kind {
        CacheStrategyKind::Json => Box::new(JsonCacheStrategy),
        CacheStrategyKind::Versioned => Box::new(VersionedCacheStrategy),
    }
}

/// Applies run params on top of a built input, per §6:
/// - a worker input shaped like `BootstrapIn` (an object with a `user_input`
///   field) gets `user_input` overwritten with `trim(params["input"])`;
/// - any other string-keyed object gets every `params` entry merged in,
///   overwriting on collision;
/// - anything else is returned unchanged.
#[must_use]
pub fn apply_run_params(mut input: Value, params: Option<&BTreeMap<String, String>>) -> Value {
    let Some(params) = params else { return input };
    let Value::Object(map) = &mut input else {
        return input;
    };

    if map.contains_key("user_input") {
        if let Some(raw) = params.get("input") {
            map.insert("user_input".to_string(), Value::String(raw.trim().to_string()));
        }
        return input;
    }

    for (key, value) in params {
        map.insert(key.clone(), Value::String(value.clone()));
    }
    input
}

/// Runs workers against a [`Runtime`], implementing the nine-step algorithm
/// from §4.3: lookup, recursive predecessor closure (cycle-guarded),
/// build-input, dependency-usage enforcement, fingerprinting, cache lookup,
/// `run`, persistence, and downstream invalidation on a forced re-run.
pub struct Executor {
    runtime: Arc<dyn Runtime>,
    workers: HashMap<String, Arc<dyn Worker>>,
}

impl Executor {
    /// Build an executor over `runtime`, dispatching to `workers` by their
    /// normalized key.
    #[must_use]
    pub fn new(runtime: Arc<dyn Runtime>, workers: HashMap<String, Arc<dyn Worker>>) -> Self {
        Self { runtime, workers }
    }

    /// Run `key`, applying `params` on top of its built input (§6).
    ///
    /// # Errors
    ///
    /// Returns [`RicError::UnknownWorker`] if `key` isn't registered,
    /// [`RicError::Cyclic`] if its predecessor closure contains a cycle, or
    /// whatever error its `build_input`/`run` or a predecessor's execution
    /// produces.
    pub async fn run(&self, ctx: &RunContext, key: &str, params: Option<&BTreeMap<String, String>>) -> Result<WorkerOutput, RicError> {
        let mut visiting = BTreeSet::new();
        self.run_worker(ctx, key, params, &mut visiting).await
    }

    fn run_worker<'a>(
        &'a self,
        ctx: &'a RunContext,
        key: &'a str,
        params: Option<&'a BTreeMap<String, String>>,
        visiting: &'a mut BTreeSet<String>,
    ) -> BoxFuture<'a, Result<WorkerOutput, RicError>> {
        let span = tracing::info_span!("executor.run", worker = key);
        Box::pin(
            async move {
                let result = self.run_worker_inner(ctx, key, params, visiting).await;
                if let Err(err) = &result {
                    tracing::error!(code = %err.code(), "worker run failed");
                }
                result
            }
            .instrument(span),
        )
    }

    async fn run_worker_inner(
        &self,
        ctx: &RunContext,
        key: &str,
        params: Option<&BTreeMap<String, String>>,
        visiting: &mut BTreeSet<String>,
    ) -> Result<WorkerOutput, RicError> {
        let meta = self
            .runtime
            .resolver()
            .get(key)
            .cloned()
            .ok_or_else(|| RicError::UnknownWorker { key: key.to_string() })?;

        if visiting.contains(&meta.key) {
            return Err(RicError::Cyclic { worker: meta.key.clone() });
        }
        visiting.insert(meta.key.clone());

        for predecessor in &meta.requires {
            self.run_worker(ctx, predecessor, None, visiting).await?;
        }
        visiting.remove(&meta.key);

        let worker = self
            .workers
            .get(&meta.key)
            .ok_or_else(|| RicError::Configuration(format!("no executable worker registered for {}", meta.key)))?;

        let deps = Deps::new(
            self.runtime.artifacts(),
            meta.key.clone(),
            meta.requires.clone(),
            self.runtime.repo_fs().to_path_buf(),
            self.runtime.out_dir().to_path_buf(),
            std::env::vars().collect(),
        );

        let worker_ctx = ctx.clone().with_worker_key(meta.key.clone());
        let input = worker.build_input(&worker_ctx, &deps)?;
        let input = apply_run_params(input, params);

        let unused = deps.verify_usage();
        if !unused.is_empty() {
            match self.runtime.deps_usage() {
                DepsUsagePolicy::Error => {
                    return Err(RicError::UnusedRequires {
                        worker: meta.key.clone(),
                        unused,
                    });
                }
                DepsUsagePolicy::Warn => {
                    tracing::warn!(worker = %meta.key, ?unused, "declared requires never read");
                }
                DepsUsagePolicy::Ignore => {}
            }
        }

        let salt = self.runtime.model_salt();
        let fp = fingerprint(&input, &salt).map_err(|source| RicError::InvalidJson {
            raw: input.to_string(),
            source,
        })?;

        let strategy = cache_strategy(meta.cache_strategy);
        let forced = self.runtime.force_from() == Some(meta.key.as_str());
        if !forced {
            if let Some(hit) = strategy.try_load(self.runtime.artifacts(), &meta.key, &fp, &salt)? {
                return Ok(hit);
            }
        }

        let output = worker.run(&worker_ctx, &input, self.runtime.as_ref()).await?;
        strategy.save(self.runtime.artifacts(), &meta.key, &output, &fp, &salt)?;

        if forced {
            for downstream in &meta.downstream {
                if matches!(
                    self.runtime.resolver().get(downstream).map(|m| m.cache_strategy),
                    Some(CacheStrategyKind::Json)
                ) {
                    JsonCacheStrategy.invalidate(self.runtime.artifacts(), downstream)?;
                }
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ric_cache::FileArtifactStore;
    use ric_core::{CapabilityTier, LlmClient, RateLimitHeaders, Role, ToolProvider, ToolSpec};
    use ric_error::RicError as Err2;
    use ric_registry::{Registry, WorkerMeta};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct NoopLlm;

    #[async_trait]
    impl LlmClient for NoopLlm {
        async fn generate_json(&self, _: &RunContext, _: &str, _: &Value) -> Result<String, Err2> {
            Ok("{}".to_string())
        }
        async fn generate_json_stream(&self, _: &RunContext, _: &str, _: &Value, _: &mut (dyn FnMut(&str) + Send)) -> Result<String, Err2> {
            Ok("{}".to_string())
        }
        fn count_tokens(&self, _: &str) -> usize {
            0
        }
        fn token_capacity(&self) -> usize {
            0
        }
        fn name(&self) -> &str {
            "noop"
        }
        async fn close(&self) {}
        fn last_headers(&self) -> Option<RateLimitHeaders> {
            None
        }
    }

    struct NoopTools;

    #[async_trait]
    impl ToolProvider for NoopTools {
        fn specs(&self) -> Vec<ToolSpec> {
            Vec::new()
        }
        async fn call(&self, _: &RunContext, _: &str, _: Value) -> Result<Value, Err2> {
            Err(Err2::ToolNotAllowed { tool: "none".into() })
        }
    }

    struct TestRuntime {
        out_dir: std::path::PathBuf,
        repo_fs: std::path::PathBuf,
        store: FileArtifactStore,
        registry: Registry,
        llm: Arc<dyn LlmClient>,
        tools: NoopTools,
        force_from: Option<String>,
        deps_usage: DepsUsagePolicy,
    }

    impl Runtime for TestRuntime {
        fn out_dir(&self) -> &std::path::Path {
            &self.out_dir
        }
        fn repo_fs(&self) -> &std::path::Path {
            &self.repo_fs
        }
        fn artifacts(&self) -> &FileArtifactStore {
            &self.store
        }
        fn resolver(&self) -> &Registry {
            &self.registry
        }
        fn mcp(&self) -> &dyn ToolProvider {
            &self.tools
        }
        fn model_salt(&self) -> String {
            "salt".to_string()
        }
        fn force_from(&self) -> Option<&str> {
            self.force_from.as_deref()
        }
        fn deps_usage(&self) -> DepsUsagePolicy {
            self.deps_usage
        }
        fn llm(&self) -> &Arc<dyn LlmClient> {
            &self.llm
        }
    }

    struct CountingWorker {
        key: String,
        requires: Vec<String>,
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Worker for CountingWorker {
        fn key(&self) -> &str {
            &self.key
        }

        fn build_input(&self, _ctx: &RunContext, deps: &Deps<'_>) -> Result<Value, Err2> {
            let mut merged = json!({ "worker": self.key.clone() });
            for req in &self.requires {
                let value: Value = deps.artifact(req)?;
                merged[req] = value;
            }
            Ok(merged)
        }

        async fn run(&self, _ctx: &RunContext, input: &Value, _runtime: &dyn Runtime) -> Result<WorkerOutput, Err2> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(WorkerOutput::new(input.clone()))
        }
    }

    fn meta(key: &str, requires: &[&str]) -> WorkerMeta {
        WorkerMeta::new(key, "", requires.to_vec(), CacheStrategyKind::Json, Role::Worker, CapabilityTier::Middle)
    }

    fn test_executor(dir: &std::path::Path, runs: Arc<AtomicUsize>, force_from: Option<&str>) -> Executor {
        let mut registry = Registry::new();
        registry.insert(meta("a", &[]));
        registry.insert(meta("b", &["a"]));
        registry.insert(meta("c", &["b"]));
        registry.compute_downstream();

        let runtime = Arc::new(TestRuntime {
            out_dir: dir.to_path_buf(),
            repo_fs: dir.to_path_buf(),
            store: FileArtifactStore::new(dir),
            registry,
            llm: Arc::new(NoopLlm),
            tools: NoopTools,
            force_from: force_from.map(str::to_string),
            deps_usage: DepsUsagePolicy::Error,
        });

        let mut workers: HashMap<String, Arc<dyn Worker>> = HashMap::new();
        for (key, requires) in [("a", vec![]), ("b", vec!["a"]), ("c", vec!["b"])] {
            workers.insert(
                key.to_string(),
                Arc::new(CountingWorker {
                    key: key.to_string(),
                    requires: requires.into_iter().map(str::to_string).collect(),
                    runs: runs.clone(),
                }),
            );
        }

        Executor::new(runtime, workers)
    }

    #[tokio::test]
    async fn linear_graph_each_worker_runs_once_per_scenario_1() {
        let dir = tempfile::tempdir().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let executor = test_executor(dir.path(), runs.clone(), None);
        let ctx = RunContext::new(Uuid::nil());

        executor.run(&ctx, "c", None).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        executor.run(&ctx, "c", None).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 3, "second run must be a full cache hit");
    }

    #[tokio::test]
    async fn force_from_reruns_forced_worker_and_its_dependents_per_scenario_2() {
        let dir = tempfile::tempdir().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let ctx = RunContext::new(Uuid::nil());

        let executor = test_executor(dir.path(), runs.clone(), None);
        executor.run(&ctx, "c", None).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        let executor = test_executor(dir.path(), runs.clone(), Some("b"));
        executor.run(&ctx, "c", None).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 5, "a is a hit, b and c rerun");
    }

    #[tokio::test]
    async fn cyclic_closure_fails_without_running_per_scenario_3() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::new();
        registry.insert(meta("a", &["b"]));
        registry.insert(meta("b", &["a"]));
        registry.compute_downstream();

        let runs = Arc::new(AtomicUsize::new(0));
        let runtime = Arc::new(TestRuntime {
            out_dir: dir.path().to_path_buf(),
            repo_fs: dir.path().to_path_buf(),
            store: FileArtifactStore::new(dir.path()),
            registry,
            llm: Arc::new(NoopLlm),
            tools: NoopTools,
            force_from: None,
            deps_usage: DepsUsagePolicy::Error,
        });
        let mut workers: HashMap<String, Arc<dyn Worker>> = HashMap::new();
        for key in ["a", "b"] {
            workers.insert(
                key.to_string(),
                Arc::new(CountingWorker {
                    key: key.to_string(),
                    requires: vec![],
                    runs: runs.clone(),
                }),
            );
        }
        let executor = Executor::new(runtime, workers);
        let ctx = RunContext::new(Uuid::nil());

        let result = executor.run(&ctx, "a", None).await;
        assert!(matches!(result, Err(RicError::Cyclic { .. })));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unused_require_fails_under_error_policy_per_scenario_4() {
        struct LeavesUnusedWorker;

        #[async_trait]
        impl Worker for LeavesUnusedWorker {
            fn key(&self) -> &str {
                "m"
            }
            fn build_input(&self, _ctx: &RunContext, _deps: &Deps<'_>) -> Result<Value, Err2> {
                Ok(json!({}))
            }
            async fn run(&self, _ctx: &RunContext, input: &Value, _runtime: &dyn Runtime) -> Result<WorkerOutput, Err2> {
                Ok(WorkerOutput::new(input.clone()))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::new();
        registry.insert(meta("n", &[]));
        registry.insert(meta("m", &["n"]));
        registry.compute_downstream();

        let runs = Arc::new(AtomicUsize::new(0));
        let runtime = Arc::new(TestRuntime {
            out_dir: dir.path().to_path_buf(),
            repo_fs: dir.path().to_path_buf(),
            store: FileArtifactStore::new(dir.path()),
            registry,
            llm: Arc::new(NoopLlm),
            tools: NoopTools,
            force_from: None,
            deps_usage: DepsUsagePolicy::Error,
        });
        let mut workers: HashMap<String, Arc<dyn Worker>> = HashMap::new();
        workers.insert(
            "n".to_string(),
            Arc::new(CountingWorker {
                key: "n".to_string(),
                requires: vec![],
                runs: runs.clone(),
            }),
        );
        workers.insert("m".to_string(), Arc::new(LeavesUnusedWorker));
        let executor = Executor::new(runtime, workers);
        let ctx = RunContext::new(Uuid::nil());

        let result = executor.run(&ctx, "m", None).await;
        assert!(matches!(result, Err(RicError::UnusedRequires { .. })));
    }

    #[test]
    fn apply_run_params_overwrites_user_input_trimmed() {
        let input = json!({"user_input": "", "purpose": "scan"});
        let mut params = BTreeMap::new();
        params.insert("input".to_string(), "  fastapi  ".to_string());
        let merged = apply_run_params(input, Some(&params));
        assert_eq!(merged["user_input"], json!("fastapi"));
        assert_eq!(merged["purpose"], json!("scan"));
    }

    #[test]
    fn apply_run_params_merges_generic_object() {
        let input = json!({"a": "1"});
        let mut params = BTreeMap::new();
        params.insert("b".to_string(), "2".to_string());
        let merged = apply_run_params(input, Some(&params));
        assert_eq!(merged["a"], json!("1"));
        assert_eq!(merged["b"], json!("2"));
    }

    #[test]
    fn apply_run_params_ignores_non_object_input() {
        let input = json!([1, 2, 3]);
        let mut params = BTreeMap::new();
        params.insert("a".to_string(), "1".to_string());
        let merged = apply_run_params(input.clone(), Some(&params));
        assert_eq!(merged, input);
    }
}
