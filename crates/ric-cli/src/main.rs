// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use ric_cache::FileArtifactStore;
use ric_core::{CacheStrategyKind, CapabilityTier, DepsUsagePolicy, LlmClient, RunContext, Role, ToolProvider, WorkerOutput};
use ric_config::{LogFormat, RuntimeConfig};
use ric_error::RicError;
use ric_llm_mock::{MockLlmClient, MockToolProvider};
use ric_registry::{Deps, Registry, WorkerMeta};
use ric_runtime::{Executor, Runtime, Worker};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "ric", version, about = "Worker orchestration runtime demo harness")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the demo registry's worker specs, sorted by key.
    ListWorkers,

    /// Run one worker (and its predecessor closure) against the demo registry.
    Run {
        /// Worker key to run.
        #[arg(long)]
        worker: String,

        /// Free-text input merged into the worker's `user_input` (§6).
        #[arg(long)]
        input: Option<String>,

        /// Bypass this worker's cache and invalidate its downstream artifacts.
        #[arg(long)]
        force: bool,

        /// Print the raw JSON artifact instead of a formatted summary.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = RuntimeConfig::load(None).unwrap_or_else(|err| {
        eprintln!("warning: failed to load runtime config, using defaults: {err}");
        RuntimeConfig::default()
    });

    let filter = if cli.debug {
        EnvFilter::new("ric=debug")
    } else {
        EnvFilter::new("ric=info")
    };
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Pretty => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    let result = match cli.command {
        Commands::ListWorkers => cmd_list_workers(),
        Commands::Run { worker, input, force, json } => cmd_run(config, worker, input, force, json).await,
    };

    if let Err(err) = result {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn demo_registry() -> Registry {
    let mut registry = Registry::new();
    registry.insert(WorkerMeta::new(
        "intake",
        "Normalizes free-text input into a purpose statement.",
        Vec::<&str>::new(),
        CacheStrategyKind::Json,
        Role::Worker,
        CapabilityTier::Low,
    ));
    registry.insert(WorkerMeta::new(
        "report",
        "Drafts a short report from the intake artifact.",
        ["intake"],
        CacheStrategyKind::Json,
        Role::Worker,
        CapabilityTier::Middle,
    ));
    registry.compute_downstream();
    registry
}

struct IntakeWorker;

#[async_trait]
impl Worker for IntakeWorker {
    fn key(&self) -> &str {
        "intake"
    }

    fn build_input(&self, _ctx: &RunContext, _deps: &Deps<'_>) -> Result<Value, RicError> {
        Ok(json!({ "user_input": "" }))
    }

    async fn run(&self, ctx: &RunContext, input: &Value, runtime: &dyn Runtime) -> Result<WorkerOutput, RicError> {
        let user_input = input["user_input"].as_str().unwrap_or_default();
        let prompt = format!("Normalize this request into a one-line purpose: {user_input}");
        let reply = runtime.llm().generate_json(ctx, &prompt, input).await?;
        Ok(WorkerOutput::new(json!({ "purpose": reply, "raw_input": user_input })))
    }
}

struct ReportWorker;

#[async_trait]
impl Worker for ReportWorker {
    fn key(&self) -> &str {
        "report"
    }

    fn build_input(&self, _ctx: &RunContext, deps: &Deps<'_>) -> Result<Value, RicError> {
        let intake: Value = deps.artifact("intake")?;
        Ok(json!({ "intake": intake }))
    }

    async fn run(&self, ctx: &RunContext, input: &Value, runtime: &dyn Runtime) -> Result<WorkerOutput, RicError> {
        let prompt = format!("Draft a short report from: {input}");
        let reply = runtime.llm().generate_json(ctx, &prompt, input).await?;
        Ok(WorkerOutput::new(json!({ "report": reply })))
    }
}

struct DemoRuntime {
    out_dir: PathBuf,
    repo_fs: PathBuf,
    store: FileArtifactStore,
    registry: Registry,
    tools: MockToolProvider,
    llm: Arc<dyn LlmClient>,
    force_from: Option<String>,
}

impl Runtime for DemoRuntime {
    fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    fn repo_fs(&self) -> &Path {
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
        "ric-cli-demo".to_string()
    }

    fn force_from(&self) -> Option<&str> {
        self.force_from.as_deref()
    }

    fn deps_usage(&self) -> DepsUsagePolicy {
        DepsUsagePolicy::Error
    }

    fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }
}

fn cmd_list_workers() -> Result<()> {
    let registry = demo_registry();
    for spec in registry.list() {
        println!("{:<10} requires={:?}  {}", spec.key, spec.requires, spec.description);
    }
    Ok(())
}

async fn cmd_run(config: RuntimeConfig, worker: String, input: Option<String>, force: bool, json: bool) -> Result<()> {
    let store = FileArtifactStore::new(config.cache_root.clone());

    let runtime = Arc::new(DemoRuntime {
        out_dir: config.cache_root.clone(),
        repo_fs: PathBuf::from("."),
        store,
        registry: demo_registry(),
        tools: MockToolProvider::new(HashMap::new()),
        llm: Arc::new(MockLlmClient::new(["a normalized purpose statement", "a short draft report"])),
        force_from: force.then(|| worker.clone()),
    });

    let mut workers: HashMap<String, Arc<dyn Worker>> = HashMap::new();
    workers.insert("intake".to_string(), Arc::new(IntakeWorker));
    workers.insert("report".to_string(), Arc::new(ReportWorker));

    let executor = Executor::new(runtime, workers);
    let ctx = RunContext::new(Uuid::new_v4());

    let mut params = BTreeMap::new();
    if let Some(input) = input {
        params.insert("input".to_string(), input);
    }
    let params = if params.is_empty() { None } else { Some(&params) };

    let output = executor.run(&ctx, &worker, params).await.with_context(|| format!("run worker {worker}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&output.runtime_state)?);
    } else {
        println!("worker: {worker}");
        println!("{}", serde_json::to_string_pretty(&output.runtime_state)?);
    }
    Ok(())
}
