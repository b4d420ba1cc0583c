//! Logical expression arena.
//!
//! A logic graph version of one concept is a small DAG: definition roots
//! (necessary / sufficient sets) over conjunctions of concept references,
//! existential and universal role restrictions and features. Nodes live in a
//! flat arena; a node may only refer to nodes created before it, so the
//! graph is acyclic by construction and every walk terminates.

use smallvec::SmallVec;
use std::collections::BTreeSet;

use taxon_db_core::{ConceptSeq, TaxonomyVocabulary};

use crate::error::{Result, UpdateError};

/// Index of a node in its expression arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    #[inline]
    fn as_usize(self) -> usize {
        self.0 as usize
    }
}

pub type Children = SmallVec<[NodeIndex; 4]>;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LogicNode {
    Necessary(Children),
    Sufficient(Children),
    And(Children),
    Concept(ConceptSeq),
    RoleSome { type_seq: ConceptSeq, child: NodeIndex },
    RoleAll { type_seq: ConceptSeq, child: NodeIndex },
    Feature { type_seq: ConceptSeq },
}

impl LogicNode {
    fn children(&self) -> &[NodeIndex] {
        match self {
            LogicNode::Necessary(c) | LogicNode::Sufficient(c) | LogicNode::And(c) => c.as_slice(),
            LogicNode::RoleSome { child, .. } | LogicNode::RoleAll { child, .. } => {
                std::slice::from_ref(child)
            }
            LogicNode::Concept(_) | LogicNode::Feature { .. } => &[],
        }
    }
}

/// One logic graph version of `concept`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogicalExpression {
    concept: ConceptSeq,
    nodes: Vec<LogicNode>,
    roots: Children,
}

impl LogicalExpression {
    pub fn concept(&self) -> ConceptSeq {
        self.concept
    }

    pub fn node(&self, index: NodeIndex) -> Option<&LogicNode> {
        self.nodes.get(index.as_usize())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Definition roots (necessary / sufficient sets).
    pub fn roots(&self) -> &[NodeIndex] {
        &self.roots
    }

    /// Taxonomy relationships asserted by this expression.
    pub fn relationships(&self, vocabulary: &TaxonomyVocabulary) -> RelationshipSet {
        let mut out = RelationshipSet::default();
        let mut stack: Vec<NodeIndex> = self.roots.iter().rev().copied().collect();
        while let Some(index) = stack.pop() {
            let Some(node) = self.node(index) else {
                continue;
            };
            match node {
                LogicNode::Necessary(children)
                | LogicNode::Sufficient(children)
                | LogicNode::And(children) => stack.extend(children.iter().rev().copied()),
                LogicNode::Concept(c) => {
                    out.relationships.insert(Relationship::new(vocabulary.is_a, *c));
                }
                LogicNode::RoleSome { type_seq, child } if *type_seq == vocabulary.role_group => {
                    // The group is not an edge; its member roles are.
                    out.role_groups_expanded += 1;
                    stack.push(*child);
                }
                LogicNode::RoleSome { type_seq, child } => {
                    self.role_destinations(*type_seq, *child, &mut out);
                }
                LogicNode::RoleAll { .. } => out.universal_skipped += 1,
                LogicNode::Feature { .. } => out.features_skipped += 1,
            }
        }
        out
    }

    /// Concepts directly named by a role's filler.
    fn role_destinations(&self, type_seq: ConceptSeq, filler: NodeIndex, out: &mut RelationshipSet) {
        match self.node(filler) {
            Some(LogicNode::Concept(c)) => {
                out.relationships.insert(Relationship::new(type_seq, *c));
            }
            Some(LogicNode::And(children)) => {
                for child in children {
                    if let Some(LogicNode::Concept(c)) = self.node(*child) {
                        out.relationships.insert(Relationship::new(type_seq, *c));
                    }
                }
            }
            _ => {}
        }
    }
}

/// Builds a [`LogicalExpression`] bottom-up.
#[derive(Debug)]
pub struct ExpressionBuilder {
    concept: ConceptSeq,
    nodes: Vec<LogicNode>,
    roots: Children,
}

impl ExpressionBuilder {
    pub fn new(concept: ConceptSeq) -> Self {
        Self {
            concept,
            nodes: Vec::new(),
            roots: Children::new(),
        }
    }

    fn push(&mut self, node: LogicNode) -> NodeIndex {
        let index = NodeIndex(self.nodes.len() as u32);
        self.nodes.push(node);
        index
    }

    pub fn concept(&mut self, c: ConceptSeq) -> NodeIndex {
        self.push(LogicNode::Concept(c))
    }

    pub fn and(&mut self, children: impl IntoIterator<Item = NodeIndex>) -> NodeIndex {
        self.push(LogicNode::And(children.into_iter().collect()))
    }

    pub fn some_role(&mut self, type_seq: ConceptSeq, child: NodeIndex) -> NodeIndex {
        self.push(LogicNode::RoleSome { type_seq, child })
    }

    pub fn all_role(&mut self, type_seq: ConceptSeq, child: NodeIndex) -> NodeIndex {
        self.push(LogicNode::RoleAll { type_seq, child })
    }

    pub fn feature(&mut self, type_seq: ConceptSeq) -> NodeIndex {
        self.push(LogicNode::Feature { type_seq })
    }

    /// Add a necessary set over `children` as a definition root.
    pub fn necessary(&mut self, children: impl IntoIterator<Item = NodeIndex>) -> NodeIndex {
        let index = self.push(LogicNode::Necessary(children.into_iter().collect()));
        self.roots.push(index);
        index
    }

    /// Add a sufficient set over `children` as a definition root.
    pub fn sufficient(&mut self, children: impl IntoIterator<Item = NodeIndex>) -> NodeIndex {
        let index = self.push(LogicNode::Sufficient(children.into_iter().collect()));
        self.roots.push(index);
        index
    }

    /// Shorthand: necessary set of plain is-a parents.
    pub fn parents(mut self, parents: &[ConceptSeq]) -> Self {
        let refs: Children = parents.iter().map(|p| self.concept(*p)).collect();
        let and = self.and(refs);
        self.necessary([and]);
        self
    }

    pub fn build(self) -> Result<LogicalExpression> {
        for (position, node) in self.nodes.iter().enumerate() {
            for child in node.children() {
                if child.as_usize() >= position {
                    return Err(UpdateError::invalid(format!(
                        "node {} refers to node {} which is not older",
                        position, child.0
                    )));
                }
            }
        }
        if self.roots.is_empty() {
            return Err(UpdateError::invalid(format!(
                "expression for {} has no definition root",
                self.concept
            )));
        }
        Ok(LogicalExpression {
            concept: self.concept,
            nodes: self.nodes,
            roots: self.roots,
        })
    }
}

/// A taxonomy edge implied by an expression.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Relationship {
    pub type_seq: ConceptSeq,
    pub destination: ConceptSeq,
}

impl Relationship {
    pub fn new(type_seq: ConceptSeq, destination: ConceptSeq) -> Self {
        Self {
            type_seq,
            destination,
        }
    }
}

/// Relationships of one expression plus walk counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelationshipSet {
    pub relationships: BTreeSet<Relationship>,
    pub features_skipped: usize,
    pub universal_skipped: usize,
    pub role_groups_expanded: usize,
}
