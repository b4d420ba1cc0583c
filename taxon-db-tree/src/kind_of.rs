//! Ancestor search without a tree.
//!
//! Used when no precomputed tree is available: parents are fetched one
//! concept at a time straight from the records. The walk is a breadth-first
//! worklist with a visited set, so it terminates on any graph. Walking past
//! `suspicious_depth` levels is logged once as a presumed cycle.

use rustc_hash::FxHashSet;
use tracing::error;

use taxon_db_core::ConceptSeq;

/// True if `target` is `start` or one of its ancestors.
///
/// `parents(c)` returns the direct parents of `c`; its error aborts the walk.
pub fn kind_of_walk<E>(
    start: ConceptSeq,
    target: ConceptSeq,
    mut parents: impl FnMut(ConceptSeq) -> Result<Vec<ConceptSeq>, E>,
    suspicious_depth: usize,
) -> Result<bool, E> {
    if start == target {
        return Ok(true);
    }
    let mut visited: FxHashSet<ConceptSeq> = FxHashSet::default();
    visited.insert(start);
    let mut level = vec![start];
    let mut depth = 0usize;
    let mut reported = false;

    while !level.is_empty() {
        depth += 1;
        if depth > suspicious_depth && !reported {
            error!(
                start = %start,
                target = %target,
                depth,
                "kind-of walk exceeded suspicious depth; presumed cycle"
            );
            reported = true;
        }
        let mut next = Vec::new();
        for node in level {
            for parent in parents(node)? {
                if parent == target {
                    return Ok(true);
                }
                if visited.insert(parent) {
                    next.push(parent);
                }
            }
        }
        level = next;
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parents_of(edges: &[(u32, u32)]) -> HashMap<ConceptSeq, Vec<ConceptSeq>> {
        let mut map: HashMap<ConceptSeq, Vec<ConceptSeq>> = HashMap::new();
        for (child, parent) in edges {
            map.entry(ConceptSeq(*child)).or_default().push(ConceptSeq(*parent));
        }
        map
    }

    fn walk(edges: &[(u32, u32)], start: u32, target: u32) -> bool {
        let map = parents_of(edges);
        kind_of_walk::<()>(
            ConceptSeq(start),
            ConceptSeq(target),
            |c| Ok(map.get(&c).cloned().unwrap_or_default()),
            50,
        )
        .unwrap()
    }

    #[test]
    fn finds_transitive_ancestor() {
        let edges = [(4, 2), (4, 3), (3, 1)];
        assert!(walk(&edges, 4, 1));
        assert!(walk(&edges, 4, 4));
        assert!(!walk(&edges, 1, 4));
    }

    #[test]
    fn terminates_on_cycles() {
        let edges = [(1, 2), (2, 3), (3, 1)];
        assert!(walk(&edges, 1, 3));
        assert!(!walk(&edges, 1, 9));
    }

    #[test]
    fn errors_abort_the_walk() {
        let result = kind_of_walk(ConceptSeq(1), ConceptSeq(2), |_| Err("boom"), 50);
        assert_eq!(result, Err("boom"));
    }
}
