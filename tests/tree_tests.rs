//! Tree projection tests
//!
//! Walk ordering, depth bounds, cycle safety and determinism over small
//! hand-built clusters.

use kinship::{
    project, resolve_relationships, Direction, Node, NodeMap, ObjectGraph, Relationship, TreeRow,
};
use serde_json::{json, Value};

fn make_node(
    uid: &str,
    api_version: &str,
    kind: &str,
    namespace: &str,
    name: &str,
    extra: Value,
) -> Node {
    let mut body = json!({
        "apiVersion": api_version,
        "kind": kind,
        "metadata": {"uid": uid, "name": name}
    });
    if !namespace.is_empty() {
        body["metadata"]["namespace"] = json!(namespace);
    }
    if let Value::Object(extra) = extra {
        for (key, value) in extra {
            if key == "metadata" {
                if let Value::Object(meta) = value {
                    for (meta_key, meta_value) in meta {
                        body["metadata"][meta_key] = meta_value;
                    }
                }
            } else {
                body[key] = value;
            }
        }
    }
    Node::from_object(body, !namespace.is_empty()).unwrap()
}

fn graph_of(nodes: Vec<Node>) -> ObjectGraph {
    ObjectGraph::new(
        nodes
            .into_iter()
            .map(|n| (n.uid.clone(), n))
            .collect::<NodeMap>(),
    )
}

fn owner(uid: &str, api_version: &str, kind: &str, name: &str, controller: bool) -> Value {
    json!({
        "apiVersion": api_version,
        "kind": kind,
        "name": name,
        "uid": uid,
        "controller": controller
    })
}

/// Deployment -> ReplicaSet -> Pod -> Service -> EndpointSlice.
fn deployment_chain() -> ObjectGraph {
    let mut graph = graph_of(vec![
        make_node("d", "apps/v1", "Deployment", "default", "demo", json!({})),
        make_node(
            "r",
            "apps/v1",
            "ReplicaSet",
            "default",
            "demo-5d4",
            json!({"metadata": {"ownerReferences": [owner("d", "apps/v1", "Deployment", "demo", true)]}}),
        ),
        make_node(
            "p",
            "v1",
            "Pod",
            "default",
            "demo-5d4-abc",
            json!({
                "metadata": {
                    "labels": {"app": "demo"},
                    "ownerReferences": [owner("r", "apps/v1", "ReplicaSet", "demo-5d4", true)]
                }
            }),
        ),
        make_node(
            "s",
            "v1",
            "Service",
            "default",
            "demo",
            json!({"spec": {"selector": {"app": "demo"}}}),
        ),
        make_node(
            "e",
            "discovery.k8s.io/v1",
            "EndpointSlice",
            "default",
            "demo-xyz",
            json!({"metadata": {"ownerReferences": [owner("s", "v1", "Service", "demo", true)]}}),
        ),
    ]);
    resolve_relationships(&mut graph, None);
    graph
}

fn uids(rows: &[TreeRow]) -> Vec<&str> {
    rows.iter().map(|r| r.uid.as_str()).collect()
}

#[test]
fn deployment_root_walks_the_whole_chain() {
    let mut graph = deployment_chain();
    let projection = project(&mut graph, "d", Direction::Dependents, 0).unwrap();
    let rows: Vec<TreeRow> = projection.iter().cloned().collect();

    assert_eq!(uids(&rows), vec!["d", "r", "p", "s", "e"]);

    assert!(rows[0].relationships.is_empty());
    assert_eq!(rows[0].depth, 0);
    assert_eq!(
        rows[1].relationships,
        [Relationship::OwnerReference, Relationship::ControllerReference]
            .into_iter()
            .collect()
    );
    assert_eq!(
        rows[2].relationships,
        [Relationship::OwnerReference, Relationship::ControllerReference]
            .into_iter()
            .collect()
    );
    assert_eq!(
        rows[3].relationships,
        [Relationship::Service].into_iter().collect()
    );
    assert_eq!(
        rows[4].relationships,
        [Relationship::OwnerReference, Relationship::ControllerReference]
            .into_iter()
            .collect()
    );
    assert_eq!(
        rows.iter().map(|r| r.depth).collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4]
    );
}

#[test]
fn depth_cap_emits_boundary_and_prunes_descent() {
    let mut graph = deployment_chain();
    let projection = project(&mut graph, "d", Direction::Dependents, 2).unwrap();
    let rows: Vec<TreeRow> = projection.iter().cloned().collect();

    assert_eq!(uids(&rows), vec!["d", "r", "p"]);
    assert_eq!(rows.last().unwrap().depth, 2);
}

#[test]
fn dependencies_direction_inverts_the_walk() {
    let mut graph = deployment_chain();
    let projection = project(&mut graph, "p", Direction::Dependencies, 0).unwrap();
    let rows: Vec<TreeRow> = projection.iter().cloned().collect();

    // The pod's ancestors: its ReplicaSet, then the Deployment.
    assert_eq!(uids(&rows), vec!["p", "r", "d"]);
}

#[test]
fn node_root_children_are_sorted_by_namespace_kind_group_name() {
    let mut graph = graph_of(vec![
        make_node("n", "v1", "Node", "", "worker-1", json!({})),
        make_node(
            "csi",
            "storage.k8s.io/v1",
            "CSINode",
            "",
            "worker-1",
            json!({"metadata": {"ownerReferences": [owner("n", "v1", "Node", "worker-1", false)]}}),
        ),
        make_node(
            "lease",
            "coordination.k8s.io/v1",
            "Lease",
            "default",
            "worker-1",
            json!({"metadata": {"ownerReferences": [owner("n", "v1", "Node", "worker-1", false)]}}),
        ),
        make_node(
            "x",
            "v1",
            "Pod",
            "default",
            "workload",
            json!({
                "metadata": {"labels": {"app": "workload"}},
                "spec": {"nodeName": "worker-1"}
            }),
        ),
        make_node(
            "y",
            "v1",
            "Service",
            "default",
            "workload",
            json!({"spec": {"selector": {"app": "workload"}}}),
        ),
        make_node(
            "z",
            "discovery.k8s.io/v1",
            "EndpointSlice",
            "default",
            "workload-1",
            json!({"metadata": {"ownerReferences": [owner("y", "v1", "Service", "workload", true)]}}),
        ),
    ]);
    resolve_relationships(&mut graph, None);

    let projection = project(&mut graph, "n", Direction::Dependents, 0).unwrap();
    let rows: Vec<TreeRow> = projection.iter().cloned().collect();

    // Children of the Node sort cluster-scoped first, then by kind within
    // the namespace; the walk continues under the pod.
    assert_eq!(uids(&rows), vec!["n", "csi", "lease", "x", "y", "z"]);
    assert_eq!(rows[3].depth, 1);
    assert_eq!(rows[4].depth, 2);
    assert_eq!(rows[5].depth, 3);

    // Sibling flags: the Pod is the final child of the Node.
    assert!(!rows[1].last_child);
    assert!(!rows[2].last_child);
    assert!(rows[3].last_child);
}

#[test]
fn cyclic_ownership_terminates() {
    let mut graph = graph_of(vec![
        make_node(
            "a",
            "v1",
            "ConfigMap",
            "ns",
            "a",
            json!({"metadata": {"ownerReferences": [owner("c", "v1", "ConfigMap", "c", false)]}}),
        ),
        make_node(
            "b",
            "v1",
            "ConfigMap",
            "ns",
            "b",
            json!({"metadata": {"ownerReferences": [owner("a", "v1", "ConfigMap", "a", false)]}}),
        ),
        make_node(
            "c",
            "v1",
            "ConfigMap",
            "ns",
            "c",
            json!({"metadata": {"ownerReferences": [owner("b", "v1", "ConfigMap", "b", false)]}}),
        ),
    ]);
    resolve_relationships(&mut graph, None);

    let projection = project(&mut graph, "a", Direction::Dependents, 0).unwrap();
    let rows: Vec<TreeRow> = projection.iter().cloned().collect();

    // a's dependent is b, b's is c; c's dependent a is already visited.
    assert_eq!(uids(&rows), vec!["a", "b", "c"]);
}

#[test]
fn projections_are_deterministic() {
    let mut graph = deployment_chain();
    let first: Vec<TreeRow> = project(&mut graph, "d", Direction::Dependents, 0)
        .unwrap()
        .iter()
        .cloned()
        .collect();
    let second: Vec<TreeRow> = project(&mut graph, "d", Direction::Dependents, 0)
        .unwrap()
        .iter()
        .cloned()
        .collect();
    assert_eq!(first, second);
}

#[test]
fn projection_assigns_depths_to_nodes() {
    let mut graph = deployment_chain();
    project(&mut graph, "d", Direction::Dependents, 0).unwrap();
    assert_eq!(graph.get("d").unwrap().depth, 0);
    assert_eq!(graph.get("r").unwrap().depth, 1);
    assert_eq!(graph.get("e").unwrap().depth, 4);

    // Depth is per-projection: re-projecting from the pod reassigns it.
    project(&mut graph, "p", Direction::Dependents, 0).unwrap();
    assert_eq!(graph.get("p").unwrap().depth, 0);
    assert_eq!(graph.get("s").unwrap().depth, 1);
}

#[test]
fn unknown_root_is_an_inconsistency() {
    let mut graph = deployment_chain();
    let err = project(&mut graph, "ghost", Direction::Dependents, 0).unwrap_err();
    assert!(matches!(err, kinship::EngineError::InconsistentGraph(_)));
}
