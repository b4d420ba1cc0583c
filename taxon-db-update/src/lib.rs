//! # Taxon DB Update
//!
//! Derives taxonomy stamp records from committed logic graph versions.
//!
//! A [`LogicalExpression`] is reduced to the set of taxonomy relationships it
//! implies (is-a parents and existential roles, with role groups unpacked
//! into their member roles). An [`ExpressionDiffer`] compares two versions;
//! the [`TaxonomyUpdateEngine`] turns the difference into add / retire stamp
//! records and merges them into the origin's stored record.

pub mod differ;
pub mod engine;
pub mod error;
pub mod expression;

pub use differ::{ExpressionDiff, ExpressionDiffer, RelationshipDiffer};
pub use engine::{LogicGraphChange, TaxonomyDelta, TaxonomyUpdateEngine, UpdateStats};
pub use error::{Result, UpdateError};
pub use expression::{
    Children, ExpressionBuilder, LogicNode, LogicalExpression, NodeIndex, Relationship,
    RelationshipSet,
};
