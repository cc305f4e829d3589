// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

use ric_cache::FileArtifactStore;
use ric_core::{CacheStrategyKind, CapabilityTier, Role};
use ric_error::RicError;
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Static description of one worker, independent of its executable
/// behavior (the executable `buildInput`/`run` closures live on the
/// `Worker` trait defined alongside the executor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerMeta {
    /// Normalized, unique worker identifier.
    pub key: String,
    /// Human-readable description.
    pub description: String,
    /// Declared predecessor keys.
    pub requires: BTreeSet<String>,
    /// Reverse closure of `requires`, computed by the resolver at merge
    /// time (I4). Empty until `Registry::compute_downstream` runs.
    pub downstream: BTreeSet<String>,
    /// Which cache strategy this worker's artifact uses.
    pub cache_strategy: CacheStrategyKind,
    /// Role hint passed to the model selector.
    pub llm_role: Role,
    /// Capability-tier hint passed to the model selector.
    pub llm_capability: CapabilityTier,
}

impl WorkerMeta {
    /// Construct a new spec, normalizing `key` and every entry of
    /// `requires` (lowercase, trimmed).
    #[must_use]
    pub fn new(
        key: impl AsRef<str>,
        description: impl Into<String>,
        requires: impl IntoIterator<Item = impl AsRef<str>>,
        cache_strategy: CacheStrategyKind,
        llm_role: Role,
        llm_capability: CapabilityTier,
    ) -> Self {
        Self {
            key: normalize_key(key.as_ref()),
            description: description.into(),
            requires: requires.into_iter().map(|k| normalize_key(k.as_ref())).collect(),
            downstream: BTreeSet::new(),
            cache_strategy,
            llm_role,
            llm_capability,
        }
    }
}

/// A merged map of worker specs by normalized key, with a computed
/// downstream closure (§4.1).
#[derive(Debug, Clone, Default)]
pub struct Registry {
    specs: BTreeMap<String, WorkerMeta>,
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a spec, normalizing its key.
    pub fn insert(&mut self, spec: WorkerMeta) {
        self.specs.insert(spec.key.clone(), spec);
    }

    /// Merge `other` into `self`. On key collision, `other`'s entry wins
    /// (last-writer-wins, where `other` is the later writer).
    pub fn merge(&mut self, other: Registry) {
        for (key, spec) in other.specs {
            self.specs.insert(key, spec);
        }
    }

    /// Recompute every spec's `downstream` field from the current
    /// `requires` edges (I4: `downstream[a] ∋ b ⇔ b.requires ∋ a`).
    pub fn compute_downstream(&mut self) {
        for spec in self.specs.values_mut() {
            spec.downstream.clear();
        }
        let edges: Vec<(String, String)> = self
            .specs
            .values()
            .flat_map(|spec| spec.requires.iter().map(move |r| (r.clone(), spec.key.clone())))
            .collect();
        for (predecessor, successor) in edges {
            if let Some(spec) = self.specs.get_mut(&predecessor) {
                spec.downstream.insert(successor);
            }
        }
    }

    /// Look up a spec by key (normalized before lookup).
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&WorkerMeta> {
        self.specs.get(&normalize_key(key))
    }

    /// All specs, sorted by key (the map's natural `BTreeMap` order).
    #[must_use]
    pub fn list(&self) -> Vec<&WorkerMeta> {
        self.specs.values().collect()
    }

    /// Number of registered specs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// `true` if no specs are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// A function that builds one registry's worth of worker specs.
pub type RegistryBuilder = fn() -> Registry;

static BUILDERS: OnceLock<Mutex<Vec<RegistryBuilder>>> = OnceLock::new();

/// Register a builder in the process-local builder registry (§4.1's "only
/// process-wide mutable state in the core"). Populated during program
/// init; read-only thereafter via [`build_all`].
pub fn register_builder(builder: RegistryBuilder) {
    BUILDERS
        .get_or_init(|| Mutex::new(Vec::new()))
        .lock()
        .expect("builder registry mutex poisoned")
        .push(builder);
}

/// Invoke every registered builder and merge the results, computing the
/// downstream closure once over the merged set.
#[must_use]
pub fn build_all() -> Registry {
    let builders = BUILDERS.get_or_init(|| Mutex::new(Vec::new()));
    let builders = builders.lock().expect("builder registry mutex poisoned");
    let mut merged = Registry::new();
    for builder in builders.iter() {
        merged.merge(builder());
    }
    merged.compute_downstream();
    merged
}

/// Per-worker view that only permits reading artifacts of declared
/// predecessors (I1), tracking which of them were actually read so the
/// executor can apply the unused-requires policy (§4.2).
pub struct Deps<'a> {
    store: &'a FileArtifactStore,
    worker_key: String,
    requires: BTreeSet<String>,
    read: RefCell<BTreeSet<String>>,
    repo_root: PathBuf,
    out_dir: PathBuf,
    env: BTreeMap<String, String>,
}

impl<'a> Deps<'a> {
    /// Construct a dependency view for `worker_key`, scoped to `requires`.
    #[must_use]
    pub fn new(
        store: &'a FileArtifactStore,
        worker_key: impl Into<String>,
        requires: BTreeSet<String>,
        repo_root: PathBuf,
        out_dir: PathBuf,
        env: BTreeMap<String, String>,
    ) -> Self {
        Self {
            store,
            worker_key: worker_key.into(),
            requires,
            read: RefCell::new(BTreeSet::new()),
            repo_root,
            out_dir,
            env,
        }
    }

    /// Read and decode the artifact of predecessor `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RicError::UnlistedRequire`] if `key` was not declared in
    /// this worker's `requires` (I1, P5), or [`RicError::CacheIo`] if the
    /// predecessor's artifact is missing or cannot be decoded.
    pub fn artifact<T: DeserializeOwned>(&self, key: &str) -> Result<T, RicError> {
        let normalized = normalize_key(key);
        if !self.requires.contains(&normalized) {
            return Err(RicError::UnlistedRequire {
                worker: self.worker_key.clone(),
                key: normalized,
            });
        }
        self.read.borrow_mut().insert(normalized.clone());

        let artifact = self.store.load_raw(&normalized)?.ok_or_else(|| RicError::CacheIo {
            key: normalized.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no artifact persisted for predecessor {normalized}"),
            ),
        })?;
        serde_json::from_value(artifact.runtime_state).map_err(|source| RicError::InvalidJson {
            raw: normalized,
            source,
        })
    }

    /// Repository root, exposed as a minimal stand-in for the out-of-scope
    /// `RepoFS` capability.
    #[must_use]
    pub fn repo(&self) -> &Path {
        &self.repo_root
    }

    /// This run's output directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.out_dir
    }

    /// Escape-hatch environment lookup, used sparingly by worker input
    /// builders.
    #[must_use]
    pub fn env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// Declared-but-unread predecessor keys, sorted.
    #[must_use]
    pub fn verify_usage(&self) -> Vec<String> {
        let read = self.read.borrow();
        self.requires.difference(&read).cloned().collect()
    }
}
