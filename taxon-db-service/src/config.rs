//! Taxonomy service configuration
//!
//! [`TaxonomyConfig`] carries the runtime settings. [`TaxonomyFileConfig`] is
//! the `[taxonomy]` section of a TOML file; every field is optional and only
//! the fields present override the defaults.
//!
//! ```toml
//! [taxonomy]
//! spine_size = 4096
//! max_concurrent_updates = 8
//! active_policy = "across_premises"
//! concept_assemblage = 12
//! data_dir = "/var/lib/taxonomy"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use taxon_db_core::{ActivePolicy, ConceptSeq};

use crate::error::{Result, TaxonomyError};

/// Default slots per spine.
pub const DEFAULT_SPINE_SIZE: usize = 1024;
/// Default number of spines added per growth step.
pub const DEFAULT_SPINE_INCREMENT: usize = 16;
/// Default number of cached tree tasks.
pub const DEFAULT_SNAPSHOT_CACHE_CAPACITY: usize = 16;
/// Default depth after which a kind-of walk is reported as a presumed cycle.
pub const DEFAULT_SUSPICIOUS_DEPTH: usize = 50;

/// Runtime configuration of a [`TaxonomyService`](crate::TaxonomyService).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonomyConfig {
    /// Slots per spine of the record map.
    ///
    /// Default: 1024
    pub spine_size: usize,

    /// Spines added when the record map grows.
    ///
    /// Default: 16
    pub spine_increment: usize,

    /// Updates of one commit that may run at the same time.
    ///
    /// Default: available parallelism, at least 1
    pub max_concurrent_updates: usize,

    /// Tree tasks kept in the snapshot cache.
    ///
    /// Default: 16
    pub snapshot_cache_capacity: usize,

    /// Latest-active policy used by [`coordinate`](crate::TaxonomyService::coordinate).
    pub active_policy: ActivePolicy,

    /// Depth at which a kind-of walk logs a presumed cycle.
    ///
    /// Default: 50
    pub suspicious_depth: usize,

    /// Assemblage whose concept sequences a tree build walks, enumerated by
    /// the identifier service. When unset every origin with a stored record
    /// is walked.
    pub concept_assemblage: Option<ConceptSeq>,

    /// Directory used by `load`/`sync` when none is passed explicitly.
    pub data_dir: Option<PathBuf>,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            spine_size: DEFAULT_SPINE_SIZE,
            spine_increment: DEFAULT_SPINE_INCREMENT,
            max_concurrent_updates: default_concurrency(),
            snapshot_cache_capacity: DEFAULT_SNAPSHOT_CACHE_CAPACITY,
            active_policy: ActivePolicy::default(),
            suspicious_depth: DEFAULT_SUSPICIOUS_DEPTH,
            concept_assemblage: None,
            data_dir: None,
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
        .max(1)
}

impl TaxonomyConfig {
    pub fn with_spine_size(mut self, spine_size: usize) -> Self {
        self.spine_size = spine_size;
        self
    }

    pub fn with_spine_increment(mut self, increment: usize) -> Self {
        self.spine_increment = increment;
        self
    }

    pub fn with_max_concurrent_updates(mut self, max: usize) -> Self {
        self.max_concurrent_updates = max;
        self
    }

    pub fn with_snapshot_cache_capacity(mut self, capacity: usize) -> Self {
        self.snapshot_cache_capacity = capacity;
        self
    }

    pub fn with_active_policy(mut self, policy: ActivePolicy) -> Self {
        self.active_policy = policy;
        self
    }

    pub fn with_suspicious_depth(mut self, depth: usize) -> Self {
        self.suspicious_depth = depth;
        self
    }

    pub fn with_concept_assemblage(mut self, assemblage: ConceptSeq) -> Self {
        self.concept_assemblage = Some(assemblage);
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Defaults overridden by the `[taxonomy]` section of `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = TaxonomyFileConfig::load(path)?;
        file.merge_into(Self::default()).validate()
    }

    /// Reject settings the store cannot run with.
    pub fn validate(self) -> Result<Self> {
        if self.spine_size == 0 {
            return Err(TaxonomyError::config("spine_size must be > 0"));
        }
        if self.spine_increment == 0 {
            return Err(TaxonomyError::config("spine_increment must be > 0"));
        }
        if self.max_concurrent_updates == 0 {
            return Err(TaxonomyError::config("max_concurrent_updates must be > 0"));
        }
        if self.snapshot_cache_capacity == 0 {
            return Err(TaxonomyError::config("snapshot_cache_capacity must be > 0"));
        }
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// File config (all Option; absence means "not set in file")
// ---------------------------------------------------------------------------

/// Top-level file structure. Other sections are tolerated and ignored.
#[derive(Debug, Default, Deserialize, Serialize)]
struct FileRoot {
    #[serde(default)]
    taxonomy: Option<TaxonomyFileConfig>,
}

/// The `[taxonomy]` section.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TaxonomyFileConfig {
    pub spine_size: Option<usize>,
    pub spine_increment: Option<usize>,
    pub max_concurrent_updates: Option<usize>,
    pub snapshot_cache_capacity: Option<usize>,
    pub active_policy: Option<ActivePolicy>,
    pub suspicious_depth: Option<usize>,
    pub concept_assemblage: Option<u32>,
    pub data_dir: Option<PathBuf>,
}

impl TaxonomyFileConfig {
    /// Parse the `[taxonomy]` section of a TOML document. A document without
    /// one yields an empty config.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let root: FileRoot =
            toml::from_str(content).map_err(|e| TaxonomyError::config(e.to_string()))?;
        Ok(root.taxonomy.unwrap_or_default())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| TaxonomyError::Config {
            path: Some(path.to_path_buf()),
            detail: e.to_string(),
        })?;
        let config = Self::from_toml_str(&content).map_err(|e| match e {
            TaxonomyError::Config { detail, .. } => TaxonomyError::Config {
                path: Some(path.to_path_buf()),
                detail,
            },
            other => other,
        })?;
        debug!(path = %path.display(), ?config, "loaded taxonomy config file");
        Ok(config)
    }

    /// Apply the fields set in the file over `base`.
    pub fn merge_into(self, base: TaxonomyConfig) -> TaxonomyConfig {
        TaxonomyConfig {
            spine_size: self.spine_size.unwrap_or(base.spine_size),
            spine_increment: self.spine_increment.unwrap_or(base.spine_increment),
            max_concurrent_updates: self
                .max_concurrent_updates
                .unwrap_or(base.max_concurrent_updates),
            snapshot_cache_capacity: self
                .snapshot_cache_capacity
                .unwrap_or(base.snapshot_cache_capacity),
            active_policy: self.active_policy.unwrap_or(base.active_policy),
            suspicious_depth: self.suspicious_depth.unwrap_or(base.suspicious_depth),
            concept_assemblage: self
                .concept_assemblage
                .map(ConceptSeq)
                .or(base.concept_assemblage),
            data_dir: self.data_dir.or(base.data_dir),
        }
    }
}
