//! Immutable taxonomy tree.
//!
//! Built by one depth-first walk over a combined [`GraphBuilder`]:
//!
//! - roots (nodes without parents) are walked first, ascending
//! - nodes still unvisited afterwards sit on parentless cycles and are walked
//!   from their smallest sequence, so every node gets exactly one discovery
//!   and one finish time
//! - an edge into a node that is still being processed is a back edge: it is
//!   recorded in [`Tree::cycles`] and left out of the navigable edges
//!
//! The result is acyclic and safe to share between threads.

use rustc_hash::FxHashMap;
use std::collections::{BTreeSet, VecDeque};
use tracing::warn;

use taxon_db_core::ConceptSeq;

use crate::graph::{Adjacent, GraphBuilder};

static EMPTY: &[ConceptSeq] = &[];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum VisitState {
    Unvisited,
    Processing,
    Finished,
}

#[derive(Clone, Debug)]
struct NodeData {
    parents: Adjacent,
    children: Adjacent,
    depth: u32,
    discovery: u32,
    finish: u32,
    predecessor: Option<ConceptSeq>,
    sibling_group: u32,
}

#[derive(Clone, Debug, Default)]
pub struct Tree {
    nodes: FxHashMap<ConceptSeq, NodeData>,
    roots: Vec<ConceptSeq>,
    cycles: Vec<(ConceptSeq, ConceptSeq)>,
}

struct Walk {
    state: FxHashMap<ConceptSeq, VisitState>,
    data: FxHashMap<ConceptSeq, NodeData>,
    cycles: Vec<(ConceptSeq, ConceptSeq)>,
    groups: FxHashMap<Option<ConceptSeq>, u32>,
    time: u32,
}

impl Walk {
    fn discover(&mut self, node: ConceptSeq, depth: u32, predecessor: Option<ConceptSeq>) {
        self.state.insert(node, VisitState::Processing);
        let next_group = self.groups.len() as u32;
        let sibling_group = *self.groups.entry(predecessor).or_insert(next_group);
        self.data.insert(
            node,
            NodeData {
                parents: Adjacent::new(),
                children: Adjacent::new(),
                depth,
                discovery: self.time,
                finish: 0,
                predecessor,
                sibling_group,
            },
        );
        self.time += 1;
    }

    fn run(&mut self, start: ConceptSeq, children: &FxHashMap<ConceptSeq, Adjacent>) {
        // Frame: node, index of the next child to look at.
        let mut stack: Vec<(ConceptSeq, usize)> = Vec::new();
        self.discover(start, 0, None);
        stack.push((start, 0));

        while let Some(frame) = stack.last_mut() {
            let (node, next) = *frame;
            let kids = children.get(&node).map(|k| k.as_slice()).unwrap_or(EMPTY);
            if next < kids.len() {
                frame.1 += 1;
                let child = kids[next];
                match self.state.get(&child).copied().unwrap_or(VisitState::Unvisited) {
                    VisitState::Unvisited => {
                        let depth = self.data.get(&node).map_or(0, |d| d.depth + 1);
                        self.discover(child, depth, Some(node));
                        stack.push((child, 0));
                    }
                    VisitState::Processing => {
                        warn!(parent = %node, child = %child, "taxonomy cycle detected; edge dropped");
                        self.cycles.push((node, child));
                    }
                    VisitState::Finished => {}
                }
            } else {
                self.state.insert(node, VisitState::Finished);
                if let Some(d) = self.data.get_mut(&node) {
                    d.finish = self.time;
                }
                self.time += 1;
                stack.pop();
            }
        }
    }
}

impl Tree {
    pub(crate) fn from_builder(builder: GraphBuilder) -> Self {
        let (nodes, children, parents) = builder.into_parts();
        let roots: Vec<ConceptSeq> = nodes
            .iter()
            .copied()
            .filter(|n| parents.get(n).map_or(true, |p| p.is_empty()))
            .collect();

        let mut walk = Walk {
            state: FxHashMap::default(),
            data: FxHashMap::default(),
            cycles: Vec::new(),
            groups: FxHashMap::default(),
            time: 0,
        };
        walk.state.reserve(nodes.len());
        walk.data.reserve(nodes.len());

        for root in &roots {
            walk.run(*root, &children);
        }
        let mut cycle_entries = Vec::new();
        for node in &nodes {
            if !walk.state.contains_key(node) {
                cycle_entries.push(*node);
                walk.run(*node, &children);
            }
        }

        let back_edges: BTreeSet<(ConceptSeq, ConceptSeq)> = walk.cycles.iter().copied().collect();
        for (parent, kids) in &children {
            for child in kids {
                if back_edges.contains(&(*parent, *child)) {
                    continue;
                }
                if let Some(d) = walk.data.get_mut(parent) {
                    d.children.push(*child);
                }
                if let Some(d) = walk.data.get_mut(child) {
                    d.parents.push(*parent);
                }
            }
        }
        for d in walk.data.values_mut() {
            d.parents.sort_unstable();
            d.children.sort_unstable();
        }

        let mut all_roots = roots;
        all_roots.extend(cycle_entries);
        Self {
            nodes: walk.data,
            roots: all_roots,
            cycles: walk.cycles,
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, node: ConceptSeq) -> bool {
        self.nodes.contains_key(&node)
    }

    /// Walk start points: true roots ascending, then one entry node per
    /// parentless cycle.
    pub fn roots(&self) -> &[ConceptSeq] {
        &self.roots
    }

    /// Back edges `(parent, child)` dropped to keep the tree acyclic.
    pub fn cycles(&self) -> &[(ConceptSeq, ConceptSeq)] {
        &self.cycles
    }

    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }

    /// Direct children, ascending.
    pub fn children_of(&self, node: ConceptSeq) -> &[ConceptSeq] {
        self.nodes.get(&node).map_or(EMPTY, |d| d.children.as_slice())
    }

    /// Direct parents, ascending.
    pub fn parents_of(&self, node: ConceptSeq) -> &[ConceptSeq] {
        self.nodes.get(&node).map_or(EMPTY, |d| d.parents.as_slice())
    }

    pub fn is_leaf(&self, node: ConceptSeq) -> bool {
        self.nodes.get(&node).is_some_and(|d| d.children.is_empty())
    }

    pub fn leaves(&self) -> Vec<ConceptSeq> {
        let mut leaves: Vec<ConceptSeq> = self
            .nodes
            .iter()
            .filter(|(_, d)| d.children.is_empty())
            .map(|(n, _)| *n)
            .collect();
        leaves.sort_unstable();
        leaves
    }

    /// Distance from the walk root along the depth-first tree.
    pub fn depth(&self, node: ConceptSeq) -> Option<u32> {
        self.nodes.get(&node).map(|d| d.depth)
    }

    pub fn discovery_time(&self, node: ConceptSeq) -> Option<u32> {
        self.nodes.get(&node).map(|d| d.discovery)
    }

    pub fn finish_time(&self, node: ConceptSeq) -> Option<u32> {
        self.nodes.get(&node).map(|d| d.finish)
    }

    /// Parent through which the walk first reached `node`.
    pub fn predecessor(&self, node: ConceptSeq) -> Option<ConceptSeq> {
        self.nodes.get(&node).and_then(|d| d.predecessor)
    }

    /// Nodes reached from the same predecessor share a group. All walk
    /// roots share one group.
    pub fn sibling_group(&self, node: ConceptSeq) -> Option<u32> {
        self.nodes.get(&node).map(|d| d.sibling_group)
    }

    /// `node`, its predecessor, and so on up to the walk root.
    pub fn path_to_root(&self, node: ConceptSeq) -> Vec<ConceptSeq> {
        let mut path = Vec::new();
        let mut current = self.contains(node).then_some(node);
        while let Some(n) = current {
            path.push(n);
            current = self.predecessor(n);
        }
        path
    }

    /// True if `ancestor` is reachable from `node` by parent edges
    /// (a node is not its own descendant).
    pub fn is_descendant_of(&self, node: ConceptSeq, ancestor: ConceptSeq) -> bool {
        if node == ancestor {
            return false;
        }
        let (Some(n), Some(a)) = (self.nodes.get(&node), self.nodes.get(&ancestor)) else {
            return false;
        };
        // Nested discovery intervals: descendant in the depth-first tree.
        if a.discovery < n.discovery && n.finish < a.finish {
            return true;
        }
        let mut seen = rustc_hash::FxHashSet::default();
        let mut work: Vec<ConceptSeq> = n.parents.to_vec();
        while let Some(p) = work.pop() {
            if p == ancestor {
                return true;
            }
            if seen.insert(p) {
                work.extend_from_slice(self.parents_of(p));
            }
        }
        false
    }

    /// Every node below `node`, ascending.
    pub fn descendants_of(&self, node: ConceptSeq) -> Vec<ConceptSeq> {
        self.closure(node, |n| self.children_of(n))
    }

    /// Every node above `node`, ascending.
    pub fn ancestors_of(&self, node: ConceptSeq) -> Vec<ConceptSeq> {
        self.closure(node, |n| self.parents_of(n))
    }

    fn closure<'a>(&'a self, start: ConceptSeq, next: impl Fn(ConceptSeq) -> &'a [ConceptSeq]) -> Vec<ConceptSeq> {
        let mut seen: BTreeSet<ConceptSeq> = BTreeSet::new();
        let mut queue: VecDeque<ConceptSeq> = next(start).iter().copied().collect();
        while let Some(n) = queue.pop_front() {
            if n != start && seen.insert(n) {
                queue.extend(next(n).iter().copied());
            }
        }
        seen.into_iter().collect()
    }

    /// Nodes ascending.
    pub fn nodes(&self) -> Vec<ConceptSeq> {
        let mut nodes: Vec<ConceptSeq> = self.nodes.keys().copied().collect();
        nodes.sort_unstable();
        nodes
    }
}
