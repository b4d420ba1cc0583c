//! Expression comparison.
//!
//! [`ExpressionDiffer`] is the seam for an isomorphism algorithm between two
//! versions of a logic graph. [`RelationshipDiffer`] is the default: it
//! compares the sets of taxonomy relationships each version implies, which is
//! exactly what the taxonomy records need.

use std::fmt::Debug;

use taxon_db_core::TaxonomyVocabulary;

use crate::error::{Result, UpdateError};
use crate::expression::{LogicalExpression, Relationship, RelationshipSet};

/// Relationships gained and lost between two expression versions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpressionDiff {
    pub added: Vec<Relationship>,
    pub removed: Vec<Relationship>,
    pub features_skipped: usize,
    pub universal_skipped: usize,
    pub role_groups_expanded: usize,
}

impl ExpressionDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub trait ExpressionDiffer: Debug + Send + Sync {
    /// Compare `previous` (if any) with `current`. Both must describe the
    /// same concept.
    fn diff(
        &self,
        previous: Option<&LogicalExpression>,
        current: &LogicalExpression,
        vocabulary: &TaxonomyVocabulary,
    ) -> Result<ExpressionDiff>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RelationshipDiffer;

impl ExpressionDiffer for RelationshipDiffer {
    fn diff(
        &self,
        previous: Option<&LogicalExpression>,
        current: &LogicalExpression,
        vocabulary: &TaxonomyVocabulary,
    ) -> Result<ExpressionDiff> {
        let now = current.relationships(vocabulary);
        let before = match previous {
            Some(prev) if prev.concept() != current.concept() => {
                return Err(UpdateError::ConceptMismatch {
                    expected: current.concept(),
                    found: prev.concept(),
                });
            }
            Some(prev) => prev.relationships(vocabulary),
            None => RelationshipSet::default(),
        };
        Ok(ExpressionDiff {
            added: now.relationships.difference(&before.relationships).copied().collect(),
            removed: before.relationships.difference(&now.relationships).copied().collect(),
            features_skipped: now.features_skipped,
            universal_skipped: now.universal_skipped,
            role_groups_expanded: now.role_groups_expanded,
        })
    }
}
