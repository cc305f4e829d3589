// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

use chrono::Utc;
use ric_core::{Artifact, ArtifactMeta, WorkerOutput};
use ric_error::RicError;
use std::path::{Path, PathBuf};

/// File-based store of `<key>.json` / `<key>.meta.json` artifacts rooted at
/// one directory, shared by both cache strategies.
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    root: PathBuf,
}

impl FileArtifactStore {
    /// Create a store rooted at `root`. The directory is created lazily on
    /// first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory this store persists under.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn state_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.meta.json"))
    }

    fn legacy_path(&self, key: &str) -> PathBuf {
        self.root.join(key).join("output.json")
    }

    fn versioned_path(&self, key: &str, version: u32) -> PathBuf {
        self.root.join(format!("{key}_v{version}.json"))
    }

    fn io_err(key: &str, source: std::io::Error) -> RicError {
        RicError::CacheIo {
            key: key.to_string(),
            source,
        }
    }

    fn read_json<T: serde::de::DeserializeOwned>(key: &str, path: &Path) -> Result<T, RicError> {
        let text = std::fs::read_to_string(path).map_err(|e| Self::io_err(key, e))?;
        serde_json::from_str(&text).map_err(|source| RicError::InvalidJson {
            raw: text,
            source,
        })
    }

    fn write_json<T: serde::Serialize>(key: &str, path: &Path, value: &T) -> Result<(), RicError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Self::io_err(key, e))?;
        }
        let text = serde_json::to_string_pretty(value).map_err(|source| RicError::InvalidJson {
            raw: String::new(),
            source,
        })?;
        std::fs::write(path, text).map_err(|e| Self::io_err(key, e))
    }

    /// Load the raw artifact for `key`, if one has been persisted, without
    /// regard to fingerprint or salt. Tries the canonical `<key>.json` /
    /// `<key>.meta.json` pair first, then the legacy `<key>/output.json`
    /// layout kept for one release (§4.2, §9).
    ///
    /// # Errors
    ///
    /// Returns an error if a file exists but cannot be read or parsed.
    pub fn load_raw(&self, key: &str) -> Result<Option<Artifact>, RicError> {
        let state_path = self.state_path(key);
        let meta_path = self.meta_path(key);
        if state_path.exists() && meta_path.exists() {
            let output: WorkerOutput = Self::read_json(key, &state_path)?;
            let meta: ArtifactMeta = Self::read_json(key, &meta_path)?;
            return Ok(Some(Artifact {
                key: key.to_string(),
                runtime_state: output.runtime_state,
                meta,
            }));
        }

        let legacy_path = self.legacy_path(key);
        if legacy_path.exists() {
            tracing::warn!(%key, path = %legacy_path.display(), "reading legacy artifact layout");
            let output: WorkerOutput = Self::read_json(key, &legacy_path)?;
            return Ok(Some(Artifact {
                key: key.to_string(),
                runtime_state: output.runtime_state,
                meta: ArtifactMeta {
                    inputs: String::new(),
                    salt: String::new(),
                    created_at: Utc::now(),
                },
            }));
        }

        Ok(None)
    }

    fn write_pair(&self, key: &str, output: &WorkerOutput, meta: &ArtifactMeta) -> Result<(), RicError> {
        Self::write_json(key, &self.state_path(key), output)?;
        Self::write_json(key, &self.meta_path(key), meta)
    }

    fn existing_versions(&self, key: &str) -> Result<Vec<u32>, RicError> {
        let prefix = format!("{key}_v");
        let dir = match std::fs::read_dir(&self.root) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_err(key, e)),
        };
        let mut versions = Vec::new();
        for entry in dir {
            let entry = entry.map_err(|e| Self::io_err(key, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(suffix) = name.strip_prefix(&prefix) else { continue };
            let Some(suffix) = suffix.strip_suffix(".json") else { continue };
            if let Ok(v) = suffix.parse::<u32>() {
                versions.push(v);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }
}

/// A worker's persistence strategy: whether to look for and keep cache
/// hits (`JsonCacheStrategy`) or always rerun and rewrite
/// (`VersionedCacheStrategy`), per §4.4.
pub trait CacheStrategy {
    /// Attempt a cache hit for `key` against `fingerprint`/`salt`.
    ///
    /// # Errors
    ///
    /// Returns an error if a stored file exists but cannot be read.
    fn try_load(
        &self,
        store: &FileArtifactStore,
        key: &str,
        fingerprint: &str,
        salt: &str,
    ) -> Result<Option<WorkerOutput>, RicError>;

    /// Persist `output` for `key` under this strategy's file layout.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact cannot be written.
    fn save(
        &self,
        store: &FileArtifactStore,
        key: &str,
        output: &WorkerOutput,
        fingerprint: &str,
        salt: &str,
    ) -> Result<(), RicError>;

    /// Discard any cached state for `key`, forcing the next run to execute.
    ///
    /// # Errors
    ///
    /// Returns an error if a stored file exists but cannot be removed.
    fn invalidate(&self, store: &FileArtifactStore, key: &str) -> Result<(), RicError>;
}

/// Content-addressed caching: a hit requires both the input fingerprint and
/// the model-defaults salt to match the stored metadata (P2/P3).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCacheStrategy;

impl CacheStrategy for JsonCacheStrategy {
    fn try_load(
        &self,
        store: &FileArtifactStore,
        key: &str,
        fingerprint: &str,
        salt: &str,
    ) -> Result<Option<WorkerOutput>, RicError> {
        let Some(artifact) = store.load_raw(key)? else {
            return Ok(None);
        };
        if artifact.meta.matches(fingerprint, salt) {
            Ok(Some(WorkerOutput::new(artifact.runtime_state)))
        } else {
            Ok(None)
        }
    }

    fn save(
        &self,
        store: &FileArtifactStore,
        key: &str,
        output: &WorkerOutput,
        fingerprint: &str,
        salt: &str,
    ) -> Result<(), RicError> {
        let meta = ArtifactMeta {
            inputs: fingerprint.to_string(),
            salt: salt.to_string(),
            created_at: Utc::now(),
        };
        store.write_pair(key, output, &meta)
    }

    fn invalidate(&self, store: &FileArtifactStore, key: &str) -> Result<(), RicError> {
        for path in [store.state_path(key), store.meta_path(key)] {
            if path.exists() {
                std::fs::remove_file(&path).map_err(|e| FileArtifactStore::io_err(key, e))?;
            }
        }
        Ok(())
    }
}

/// Always-rewrite caching: every run persists a new `<key>_v{N}.json`,
/// mirrors the latest version to the canonical `<key>.json` /
/// `<key>.meta.json` pair, and prunes every older `_v{N}.json`.
/// `try_load` always reports a miss; `invalidate` is a no-op, since there is
/// never a cache hit to discard (P4).
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionedCacheStrategy;

impl CacheStrategy for VersionedCacheStrategy {
    fn try_load(
        &self,
        _store: &FileArtifactStore,
        _key: &str,
        _fingerprint: &str,
        _salt: &str,
    ) -> Result<Option<WorkerOutput>, RicError> {
        Ok(None)
    }

    fn save(
        &self,
        store: &FileArtifactStore,
        key: &str,
        output: &WorkerOutput,
        fingerprint: &str,
        salt: &str,
    ) -> Result<(), RicError> {
        let versioned_path = store.versioned_path(key, 1);
        FileArtifactStore::write_json(key, &versioned_path, output)?;

        let meta = ArtifactMeta {
            inputs: fingerprint.to_string(),
            salt: salt.to_string(),
            created_at: Utc::now(),
        };
        store.write_pair(key, output, &meta)?;

        for version in store.existing_versions(key)? {
            if version != 1 {
                let stale = store.versioned_path(key, version);
                std::fs::remove_file(&stale).map_err(|e| FileArtifactStore::io_err(key, e))?;
            }
        }
        Ok(())
    }

    fn invalidate(&self, _store: &FileArtifactStore, _key: &str) -> Result<(), RicError> {
        Ok(())
    }
}
