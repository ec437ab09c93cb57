// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Null ensemble cache
//!
//! Keyed by (map name, content fingerprint, seed, n_perm). A map holds at
//! most one entry: storing a new key for a map evicts the old one, so a
//! change of seed, n_perm or map content invalidates earlier ensembles.
//! - `MemoryNullCache`: Arc<RwLock<HashMap>> shared across stats workers
//! - `DiskNullCache`: `cache/<map>/<fingerprint>_<seed>_<n_perm>.npy`

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use spinmaps_config::NullCacheMode;
use spinmaps_stats::{NullEnsemble, SurfaceMap};

use crate::npy;
use crate::types::PipelineResult;

/// Identity of one null ensemble
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NullCacheKey {
    pub map_name: String,
    pub fingerprint: u64,
    pub seed: u64,
    pub n_perm: usize,
}

impl NullCacheKey {
    pub fn for_map(map: &SurfaceMap, seed: u64, n_perm: usize) -> Self {
        Self {
            map_name: map.name.clone(),
            fingerprint: map.fingerprint(),
            seed,
            n_perm,
        }
    }

    fn file_name(&self) -> String {
        format!("{:016x}_{}_{}.npy", self.fingerprint, self.seed, self.n_perm)
    }
}

/// Storage for generated ensembles
pub trait NullCache: Send + Sync {
    fn get(&self, key: &NullCacheKey) -> PipelineResult<Option<NullEnsemble>>;

    /// Store `ensemble`, replacing any entry of the same map
    fn put(&self, key: &NullCacheKey, ensemble: &NullEnsemble) -> PipelineResult<()>;
}

/// In-process cache, one entry per map name
#[derive(Debug, Clone, Default)]
pub struct MemoryNullCache {
    entries: Arc<RwLock<HashMap<String, (NullCacheKey, NullEnsemble)>>>,
}

impl MemoryNullCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl NullCache for MemoryNullCache {
    fn get(&self, key: &NullCacheKey) -> PipelineResult<Option<NullEnsemble>> {
        Ok(self
            .entries
            .read()
            .get(&key.map_name)
            .filter(|(stored, _)| stored == key)
            .map(|(_, ensemble)| ensemble.clone()))
    }

    fn put(&self, key: &NullCacheKey, ensemble: &NullEnsemble) -> PipelineResult<()> {
        self.entries
            .write()
            .insert(key.map_name.clone(), (key.clone(), ensemble.clone()));
        Ok(())
    }
}

/// NPY files under a cache directory, one subdirectory per map
#[derive(Debug, Clone)]
pub struct DiskNullCache {
    dir: PathBuf,
}

impl DiskNullCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn map_dir(&self, map_name: &str) -> PathBuf {
        self.dir.join(map_name)
    }

    pub fn path_for(&self, key: &NullCacheKey) -> PathBuf {
        self.map_dir(&key.map_name).join(key.file_name())
    }
}

impl NullCache for DiskNullCache {
    fn get(&self, key: &NullCacheKey) -> PipelineResult<Option<NullEnsemble>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let matrix = match npy::read_matrix(&path) {
            Ok(matrix) => matrix,
            Err(e) => {
                warn!(map = %key.map_name, path = %path.display(), error = %e, "ignoring unreadable cached nulls");
                return Ok(None);
            }
        };
        if matrix.nrows() != key.n_perm {
            warn!(map = %key.map_name, path = %path.display(), "cached nulls have the wrong permutation count");
            return Ok(None);
        }
        debug!(map = %key.map_name, path = %path.display(), "null cache hit");
        Ok(Some(NullEnsemble::from_matrix(
            key.map_name.clone(),
            key.seed,
            matrix,
        )?))
    }

    fn put(&self, key: &NullCacheKey, ensemble: &NullEnsemble) -> PipelineResult<()> {
        let map_dir = self.map_dir(&key.map_name);
        if map_dir.exists() {
            fs::remove_dir_all(&map_dir)?;
        }
        fs::create_dir_all(&map_dir)?;
        npy::write_matrix(&self.path_for(key), ensemble.as_matrix())
    }
}

/// Cache for a configured mode; `None` disables caching
pub fn cache_for_mode(mode: NullCacheMode, cache_dir: PathBuf) -> Option<Arc<dyn NullCache>> {
    match mode {
        NullCacheMode::None => None,
        NullCacheMode::Memory => Some(Arc::new(MemoryNullCache::new())),
        NullCacheMode::Disk => Some(Arc::new(DiskNullCache::new(cache_dir))),
    }
}
