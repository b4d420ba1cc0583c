//! # Taxon DB Tree
//!
//! Derives a navigable taxonomy from the stored records at one coordinate.
//!
//! ## Pipeline
//!
//! 1. **Collect**: [`GraphCollector`] folds every origin in parallel into
//!    per-thread [`GraphBuilder`]s (active concepts, active is-a edges)
//! 2. **Combine**: the partial builders are merged on one thread
//! 3. **Walk**: one depth-first walk numbers the nodes and drops back edges
//! 4. **Finalize**: the immutable [`Tree`] answers parent / child /
//!    descendant queries from any thread
//!
//! [`kind_of_walk`] answers ancestor questions when no tree is available.

pub mod cancel;
pub mod collector;
pub mod error;
pub mod graph;
pub mod kind_of;
pub mod tree;

pub use cancel::CancellationFlag;
pub use collector::{GraphCollector, RecordSource};
pub use error::{Result, TreeError};
pub use graph::GraphBuilder;
pub use kind_of::kind_of_walk;
pub use tree::Tree;
