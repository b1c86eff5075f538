//! Root reference resolution.

use std::collections::BTreeSet;
use std::fmt;

use super::{GroupKind, Node, ObjectGraph, Uid};
use crate::error::EngineError;
use crate::kube::discovery::ResourceInfo;

/// A user-supplied root reference: `<kind-hint>/<name>`, optionally scoped to
/// a namespace.
#[derive(Debug, Clone)]
pub struct RootQuery {
    pub kind_hint: String,
    pub name: String,
    pub namespace: Option<String>,
}

impl fmt::Display for RootQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{} -n {}", self.kind_hint, self.name, ns),
            None => write!(f, "{}/{}", self.kind_hint, self.name),
        }
    }
}

/// Find the unique node matching the query.
///
/// The kind hint is matched against the catalog in ladder order: resource
/// name (which is the plural in discovery output), singular, kind
/// (case-insensitive), then short name; the first rung with any match fixes
/// the candidate GroupKinds. When matches span several groups, a lone core
/// group match wins; anything else is ambiguous.
pub fn resolve_root(
    graph: &ObjectGraph,
    catalog: &[ResourceInfo],
    query: &RootQuery,
) -> Result<Uid, EngineError> {
    let hint = query.kind_hint.to_lowercase();

    let matchers: [&dyn Fn(&ResourceInfo) -> bool; 4] = [
        &|info: &ResourceInfo| info.resource == hint,
        &|info: &ResourceInfo| info.singular == hint,
        &|info: &ResourceInfo| info.kind.to_lowercase() == hint,
        &|info: &ResourceInfo| info.short_names.iter().any(|s| s == &hint),
    ];
    let mut candidates: BTreeSet<GroupKind> = BTreeSet::new();
    for matcher in matchers {
        candidates = catalog
            .iter()
            .filter(|info| matcher(info))
            .map(|info| info.group_kind())
            .collect();
        if !candidates.is_empty() {
            break;
        }
    }
    if candidates.is_empty() {
        return Err(EngineError::RootNotFound(query.to_string()));
    }

    let mut matches: Vec<&Node> = graph
        .nodes()
        .values()
        .filter(|node| {
            candidates.contains(&node.group_kind())
                && node.name == query.name
                && (!node.namespaced
                    || query
                        .namespace
                        .as_deref()
                        .is_none_or(|ns| node.namespace == ns))
        })
        .collect();
    matches.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    match matches.len() {
        0 => Err(EngineError::RootNotFound(query.to_string())),
        1 => Ok(matches[0].uid.clone()),
        _ => {
            let core: Vec<&&Node> = matches.iter().filter(|n| n.group.is_empty()).collect();
            if core.len() == 1 {
                return Ok(core[0].uid.clone());
            }
            let listed = matches
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            Err(EngineError::AmbiguousRoot(query.to_string(), listed))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeMap;
    use serde_json::json;

    fn info(group: &str, kind: &str, resource: &str, shorts: &[&str]) -> ResourceInfo {
        ResourceInfo {
            group: group.to_string(),
            version: "v1".to_string(),
            kind: kind.to_string(),
            resource: resource.to_string(),
            singular: kind.to_lowercase(),
            short_names: shorts.iter().map(|s| s.to_string()).collect(),
            namespaced: true,
            verbs: vec!["list".to_string()],
        }
    }

    fn node(uid: &str, api_version: &str, kind: &str, namespace: &str, name: &str) -> Node {
        let mut meta = json!({"uid": uid, "name": name});
        if !namespace.is_empty() {
            meta["namespace"] = json!(namespace);
        }
        Node::from_object(
            json!({"apiVersion": api_version, "kind": kind, "metadata": meta}),
            !namespace.is_empty(),
        )
        .unwrap()
    }

    fn graph_of(nodes: Vec<Node>) -> ObjectGraph {
        ObjectGraph::new(
            nodes
                .into_iter()
                .map(|n| (n.uid.clone(), n))
                .collect::<NodeMap>(),
        )
    }

    fn query(hint: &str, name: &str, namespace: Option<&str>) -> RootQuery {
        RootQuery {
            kind_hint: hint.to_string(),
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
        }
    }

    #[test]
    fn test_resolves_by_plural_singular_kind_and_short_name() {
        let catalog = vec![info("apps", "Deployment", "deployments", &["deploy"])];
        let graph = graph_of(vec![node("d1", "apps/v1", "Deployment", "prod", "web")]);

        for hint in ["deployments", "deployment", "Deployment", "deploy"] {
            let uid = resolve_root(&graph, &catalog, &query(hint, "web", Some("prod"))).unwrap();
            assert_eq!(uid, "d1");
        }
    }

    #[test]
    fn test_root_not_found() {
        let catalog = vec![info("apps", "Deployment", "deployments", &[])];
        let graph = graph_of(vec![node("d1", "apps/v1", "Deployment", "prod", "web")]);

        let err = resolve_root(&graph, &catalog, &query("deployment", "missing", Some("prod")))
            .unwrap_err();
        assert!(matches!(err, EngineError::RootNotFound(_)));
        assert_eq!(err.exit_code(), 1);

        let err =
            resolve_root(&graph, &catalog, &query("gadget", "web", Some("prod"))).unwrap_err();
        assert!(matches!(err, EngineError::RootNotFound(_)));
    }

    #[test]
    fn test_ambiguous_without_namespace() {
        let catalog = vec![info("apps", "Deployment", "deployments", &[])];
        let graph = graph_of(vec![
            node("d1", "apps/v1", "Deployment", "ns1", "web"),
            node("d2", "apps/v1", "Deployment", "ns2", "web"),
        ]);

        let err = resolve_root(&graph, &catalog, &query("deployment", "web", None)).unwrap_err();
        assert!(matches!(err, EngineError::AmbiguousRoot(..)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_cross_group_kind_prefers_core() {
        let mut events_info = info("events.k8s.io", "Event", "events", &["ev"]);
        events_info.singular = "event".to_string();
        let catalog = vec![info("", "Event", "events", &["ev"]), events_info];
        let graph = graph_of(vec![
            node("e1", "v1", "Event", "ns", "boom"),
            node("e2", "events.k8s.io/v1", "Event", "ns", "boom"),
        ]);

        let uid = resolve_root(&graph, &catalog, &query("event", "boom", Some("ns"))).unwrap();
        assert_eq!(uid, "e1");
    }
}
