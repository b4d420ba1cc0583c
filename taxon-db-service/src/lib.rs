//! # Taxon DB Service
//!
//! Query and update facade over the taxonomy store.
//!
//! This crate provides:
//! - [`TaxonomyService`]: point queries, snapshots, commit handling and
//!   persistence
//! - [`TaxonomySnapshot`] views, tree-backed ([`TreeSnapshot`]) or read from
//!   records on demand ([`RecordSnapshot`])
//! - [`SnapshotCache`]: one shared [`TreeTask`] per coordinate
//! - [`TaxonomyConfig`], loadable from the `[taxonomy]` section of a TOML file
//!
//! ## Example
//!
//! ```ignore
//! let service = TaxonomyService::new(TaxonomyConfig::default(), vocabulary, collaborators)?;
//! service.handle_commit(&CommitRecord::new([nid])).await?;
//!
//! let coord = service.coordinate(PremiseType::Stated, StampCoordinate::latest(path));
//! let snapshot = service.snapshot(&coord, SnapshotMode::Tree).await?;
//! let children = snapshot.children(concept)?;
//! ```

pub mod cache;
pub mod commit;
pub mod config;
pub mod error;
pub mod service;
pub mod snapshot;
pub mod store;

pub use cache::{SnapshotCache, TaskStatus, TreeTask};
pub use commit::{CommitListener, CommitRecord, LogicGraphSource, MemoryLogicGraphSource, SemanticChange};
pub use config::{TaxonomyConfig, TaxonomyFileConfig};
pub use error::{Result, TaxonomyError};
pub use service::{Collaborators, TaxonomyService};
pub use snapshot::{RecordSnapshot, SnapshotMode, TaxonomySnapshot, TreeSnapshot};
pub use store::{TaxonomyStore, RECORDS_DIR};
