//! Depth-bounded, cycle-safe tree projection of the graph.

use std::collections::{HashMap, HashSet};

use super::{ObjectGraph, RelationshipSet, Uid};
use crate::error::EngineError;

/// Which adjacency the walk follows from the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Objects that point at the current one (the default view).
    Dependents,
    /// Objects the current one points at.
    Dependencies,
}

/// One emitted tuple of the projected tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeRow {
    pub depth: u32,
    pub parent: Option<Uid>,
    pub uid: Uid,
    /// Labels on the traversed edge; empty for the root row.
    pub relationships: RelationshipSet,
    /// Whether this row is the final sibling at its depth; the renderer uses
    /// it to pick box-drawing glyphs.
    pub last_child: bool,
}

/// A restartable sequence of tree rows for one root and direction.
#[derive(Debug)]
pub struct Projection {
    pub root: Uid,
    pub direction: Direction,
    rows: Vec<TreeRow>,
}

impl Projection {
    pub fn iter(&self) -> std::slice::Iter<'_, TreeRow> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<'a> IntoIterator for &'a Projection {
    type Item = &'a TreeRow;
    type IntoIter = std::slice::Iter<'a, TreeRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Walk the graph from `root` in the given direction.
///
/// The walk is a depth-first pre-order: children are enumerated in ascending
/// `(namespace, kind, group, name)` order, each UID is visited at most once
/// per walk, and a depth ceiling of `max_depth` (0 = unbounded) emits the
/// child at the ceiling but prunes further descent. Visited depths are
/// written back onto the nodes; they are recomputed on every projection.
pub fn project(
    graph: &mut ObjectGraph,
    root: &str,
    direction: Direction,
    max_depth: u32,
) -> Result<Projection, EngineError> {
    if !graph.contains(root) {
        return Err(EngineError::InconsistentGraph(root.to_string()));
    }

    let mut rows = Vec::new();
    let mut depths: HashMap<Uid, u32> = HashMap::new();
    let mut visited: HashSet<Uid> = HashSet::new();

    rows.push(TreeRow {
        depth: 0,
        parent: None,
        uid: root.to_string(),
        relationships: RelationshipSet::new(),
        last_child: true,
    });
    visited.insert(root.to_string());
    depths.insert(root.to_string(), 0);

    walk(
        graph, root, 0, direction, max_depth, &mut visited, &mut depths, &mut rows,
    )?;

    for (uid, depth) in depths {
        if let Some(node) = graph.get_mut(&uid) {
            node.depth = depth;
        }
    }

    Ok(Projection {
        root: root.to_string(),
        direction,
        rows,
    })
}

#[allow(clippy::too_many_arguments)]
fn walk(
    graph: &ObjectGraph,
    uid: &str,
    depth: u32,
    direction: Direction,
    max_depth: u32,
    visited: &mut HashSet<Uid>,
    depths: &mut HashMap<Uid, u32>,
    rows: &mut Vec<TreeRow>,
) -> Result<(), EngineError> {
    let node = graph
        .get(uid)
        .ok_or_else(|| EngineError::InconsistentGraph(uid.to_string()))?;
    let adjacency = match direction {
        Direction::Dependents => &node.dependents,
        Direction::Dependencies => &node.dependencies,
    };

    let mut children = Vec::with_capacity(adjacency.len());
    for (child_uid, relationships) in adjacency {
        if visited.contains(child_uid) {
            continue;
        }
        let child = graph
            .get(child_uid)
            .ok_or_else(|| EngineError::InconsistentGraph(child_uid.clone()))?;
        children.push((child_uid, relationships, child));
    }
    children.sort_by(|(_, _, a), (_, _, b)| a.sort_key().cmp(&b.sort_key()));

    // Reserve every child before descending so a sibling's subtree cannot
    // re-emit one; each UID appears at most once per walk.
    for (child_uid, _, _) in &children {
        visited.insert((*child_uid).clone());
    }

    let count = children.len();
    for (index, (child_uid, relationships, _)) in children.into_iter().enumerate() {
        let child_depth = depth + 1;
        depths.insert(child_uid.clone(), child_depth);
        rows.push(TreeRow {
            depth: child_depth,
            parent: Some(uid.to_string()),
            uid: child_uid.clone(),
            relationships: relationships.clone(),
            last_child: index + 1 == count,
        });
        if max_depth == 0 || child_depth < max_depth {
            walk(
                graph, child_uid, child_depth, direction, max_depth, visited, depths, rows,
            )?;
        }
    }
    Ok(())
}
