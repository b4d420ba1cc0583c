//! Thread-local graph builder.
//!
//! Each collector thread owns one [`GraphBuilder`]; builders are combined on
//! a single thread once collection ends, then finalized into a [`Tree`].
//!
//! Only nodes added with [`add_node`](GraphBuilder::add_node) take part in
//! the tree. An edge is kept at finalization only when both of its ends were
//! added, so a parent that never became a node contributes nothing.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use taxon_db_core::ConceptSeq;

use crate::tree::Tree;

pub(crate) type Adjacent = SmallVec<[ConceptSeq; 4]>;

/// Parent → child edges plus the set of admitted nodes.
#[derive(Debug, Default, Clone)]
pub struct GraphBuilder {
    nodes: FxHashSet<ConceptSeq>,
    children: FxHashMap<ConceptSeq, Adjacent>,
    parents: FxHashMap<ConceptSeq, Adjacent>,
    edges: usize,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: ConceptSeq) {
        self.nodes.insert(node);
    }

    /// Record `parent → child`. Neither end becomes a node.
    pub fn add_edge(&mut self, parent: ConceptSeq, child: ConceptSeq) {
        self.children.entry(parent).or_default().push(child);
        self.parents.entry(child).or_default().push(parent);
        self.edges += 1;
    }

    /// Fold `other` into `self`.
    pub fn combine(&mut self, other: GraphBuilder) {
        self.nodes.extend(other.nodes);
        for (parent, children) in other.children {
            self.children.entry(parent).or_default().extend(children);
        }
        for (child, parents) in other.parents {
            self.parents.entry(child).or_default().extend(parents);
        }
        self.edges += other.edges;
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Edges added, duplicates included.
    pub fn edge_count(&self) -> usize {
        self.edges
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Sorted, deduplicated adjacency between admitted nodes.
    pub(crate) fn into_parts(self) -> (Vec<ConceptSeq>, FxHashMap<ConceptSeq, Adjacent>, FxHashMap<ConceptSeq, Adjacent>) {
        let admitted = self.nodes;
        let normalize = |map: FxHashMap<ConceptSeq, Adjacent>| -> FxHashMap<ConceptSeq, Adjacent> {
            map.into_iter()
                .filter(|(key, _)| admitted.contains(key))
                .map(|(key, mut list)| {
                    list.retain(|n| admitted.contains(n));
                    list.sort_unstable();
                    list.dedup();
                    (key, list)
                })
                .filter(|(_, list)| !list.is_empty())
                .collect()
        };
        let children = normalize(self.children);
        let parents = normalize(self.parents);
        let mut nodes: Vec<ConceptSeq> = admitted.into_iter().collect();
        nodes.sort_unstable();
        (nodes, children, parents)
    }

    /// Walk the graph and produce the immutable tree.
    pub fn finalize(self) -> Tree {
        Tree::from_builder(self)
    }
}
