//! In-memory object graph: arena of nodes keyed by UID plus the machinery
//! that discovers the relationships between them and projects rooted trees.

mod node;
mod resolve;
mod root;
mod tree;

pub use node::{
    GroupKind, Node, NodeMap, ObjectReference, Relationship, RelationshipSet, Uid,
};
pub use resolve::resolve_relationships;
pub use root::{resolve_root, RootQuery};
pub use tree::{project, Direction, Projection, TreeRow};

use std::collections::{HashMap, HashSet};

/// The graph owns every node; nodes refer to each other exclusively by UID,
/// so cycles pose no ownership problem.
///
/// The graph is built once per invocation (fetch, then edge resolution) and
/// frozen before projection; after the build phase reads need no
/// synchronization.
#[derive(Debug, Default)]
pub struct ObjectGraph {
    nodes: NodeMap,
    /// `(group, kind, namespace, name)` -> UID, for name-reference lookups.
    /// Cluster-scoped entries use an empty namespace component.
    by_name: HashMap<(String, String, String, String), Uid>,
    /// Kinds observed as cluster-scoped, for reference normalization.
    cluster_scoped: HashSet<GroupKind>,
}

impl ObjectGraph {
    pub fn new(nodes: NodeMap) -> Self {
        let mut by_name = HashMap::with_capacity(nodes.len());
        let mut cluster_scoped = HashSet::new();
        for node in nodes.values() {
            by_name.insert(
                (
                    node.group.clone(),
                    node.kind.clone(),
                    node.namespace.clone(),
                    node.name.clone(),
                ),
                node.uid.clone(),
            );
            if !node.namespaced {
                cluster_scoped.insert(node.group_kind());
            }
        }
        Self {
            nodes,
            by_name,
            cluster_scoped,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.nodes.contains_key(uid)
    }

    pub fn get(&self, uid: &str) -> Option<&Node> {
        self.nodes.get(uid)
    }

    pub fn get_mut(&mut self, uid: &str) -> Option<&mut Node> {
        self.nodes.get_mut(uid)
    }

    pub fn nodes(&self) -> &NodeMap {
        &self.nodes
    }

    /// Resolve a reference to a fetched node's UID.
    ///
    /// Namespace normalization: when the target kind was observed as
    /// cluster-scoped the reference's namespace is ignored.
    pub fn lookup(&self, reference: &ObjectReference) -> Option<&Uid> {
        let namespace = if self.cluster_scoped.contains(&reference.group_kind()) {
            String::new()
        } else {
            reference.namespace.clone()
        };
        self.by_name.get(&(
            reference.group.clone(),
            reference.kind.clone(),
            namespace,
            reference.name.clone(),
        ))
    }

    /// Insert the edge `from` depends on `to`, symmetrically.
    ///
    /// All edge insertion goes through here: `from.dependencies[to]` and
    /// `to.dependents[from]` always receive the label together, and the label
    /// sets deduplicate repeats. Inserting against a UID that is not in the
    /// map is a no-op; callers resolve references first and record dangling
    /// ones via [`ObjectGraph::record_dangling`].
    pub fn relate(&mut self, from: &str, to: &str, relationship: Relationship) {
        if !self.nodes.contains_key(from) || !self.nodes.contains_key(to) {
            tracing::debug!("dropping edge {} -> {}: endpoint not in graph", from, to);
            return;
        }
        if let Some(node) = self.nodes.get_mut(from) {
            node.dependencies
                .entry(to.to_string())
                .or_default()
                .insert(relationship);
        }
        if let Some(node) = self.nodes.get_mut(to) {
            node.dependents
                .entry(from.to_string())
                .or_default()
                .insert(relationship);
        }
    }

    /// Note a reference on `holder` that resolved to nothing fetched.
    ///
    /// Dangling references never materialize edges; they are kept as a
    /// non-fatal annotation on the object that holds them.
    pub fn record_dangling(&mut self, holder: &str, reference: ObjectReference) {
        if let Some(node) = self.nodes.get_mut(holder) {
            tracing::debug!("{}: unresolved reference to {}", node, reference);
            if !node.dangling.contains(&reference) {
                node.dangling.push(reference);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(uid: &str, kind: &str, namespace: &str, name: &str) -> Node {
        let mut meta = json!({"uid": uid, "name": name});
        if !namespace.is_empty() {
            meta["namespace"] = json!(namespace);
        }
        Node::from_object(
            json!({"apiVersion": "v1", "kind": kind, "metadata": meta}),
            !namespace.is_empty(),
        )
        .unwrap()
    }

    fn graph_of(nodes: Vec<Node>) -> ObjectGraph {
        ObjectGraph::new(nodes.into_iter().map(|n| (n.uid.clone(), n)).collect())
    }

    #[test]
    fn test_relate_is_symmetric() {
        let mut graph = graph_of(vec![
            node("a", "Pod", "ns", "a"),
            node("b", "Secret", "ns", "b"),
        ]);
        graph.relate("a", "b", Relationship::PodVolume);

        let a = graph.get("a").unwrap();
        let b = graph.get("b").unwrap();
        assert!(a.dependencies["b"].contains(&Relationship::PodVolume));
        assert!(b.dependents["a"].contains(&Relationship::PodVolume));
        assert!(a.dependents.is_empty());
        assert!(b.dependencies.is_empty());
    }

    #[test]
    fn test_relate_deduplicates_labels() {
        let mut graph = graph_of(vec![
            node("a", "Pod", "ns", "a"),
            node("b", "Secret", "ns", "b"),
        ]);
        graph.relate("a", "b", Relationship::PodVolume);
        graph.relate("a", "b", Relationship::PodVolume);
        graph.relate("a", "b", Relationship::PodImagePullSecret);

        assert_eq!(graph.get("a").unwrap().dependencies["b"].len(), 2);
        assert_eq!(graph.get("b").unwrap().dependents["a"].len(), 2);
    }

    #[test]
    fn test_relate_missing_endpoint_is_dropped() {
        let mut graph = graph_of(vec![node("a", "Pod", "ns", "a")]);
        graph.relate("a", "ghost", Relationship::PodVolume);
        assert!(graph.get("a").unwrap().dependencies.is_empty());
    }

    #[test]
    fn test_lookup_cluster_scoped_ignores_namespace() {
        let graph = graph_of(vec![node("n1", "Node", "", "worker-1")]);
        let reference = ObjectReference::new("", "Node", "some-namespace", "worker-1");
        assert_eq!(graph.lookup(&reference).map(String::as_str), Some("n1"));
    }

    #[test]
    fn test_lookup_namespaced() {
        let graph = graph_of(vec![
            node("s1", "Secret", "ns1", "token"),
            node("s2", "Secret", "ns2", "token"),
        ]);
        let reference = ObjectReference::new("", "Secret", "ns2", "token");
        assert_eq!(graph.lookup(&reference).map(String::as_str), Some("s2"));
    }

    #[test]
    fn test_record_dangling_deduplicates() {
        let mut graph = graph_of(vec![node("a", "Pod", "ns", "a")]);
        let reference = ObjectReference::new("", "Secret", "ns", "ghost");
        graph.record_dangling("a", reference.clone());
        graph.record_dangling("a", reference);
        assert_eq!(graph.get("a").unwrap().dangling.len(), 1);
    }
}
