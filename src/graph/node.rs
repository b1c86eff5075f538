//! Node and relationship types for the in-memory object graph

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde::Serialize;
use serde_json::Value;

/// UID assigned by the API server; primary key of the graph.
pub type Uid = String;

/// The frozen in-memory graph: UID -> Node.
pub type NodeMap = HashMap<Uid, Node>;

/// Unordered set of labels attached to one edge endpoint pair.
///
/// Duplicate labels on the same pair collapse; the set is ordered so that
/// rendered label lists are deterministic.
pub type RelationshipSet = BTreeSet<Relationship>;

/// The alphabet of edge labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Relationship {
    // Generic, applied to every object
    OwnerReference,
    ControllerReference,
    // RBAC
    ClusterRoleAggregationRule,
    ClusterRoleBindingRole,
    ClusterRoleBindingSubject,
    RoleBindingRole,
    RoleBindingSubject,
    // Events (core v1 and events.k8s.io)
    EventRegarding,
    EventRelated,
    // Networking
    IngressClass,
    IngressResource,
    IngressService,
    IngressTls,
    WebhookService,
    // Storage
    PersistentVolume,
    PersistentVolumeClaim,
    // Pods
    PodImagePullSecret,
    PodNode,
    PodPriorityClass,
    PodRuntimeClass,
    PodServiceAccount,
    PodVolume,
    // Services
    Service,
    // Service accounts
    ServiceAccountImagePullSecret,
    ServiceAccountSecret,
    // Helm release storage records
    HelmRelease,
}

impl Relationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relationship::OwnerReference => "OwnerReference",
            Relationship::ControllerReference => "ControllerReference",
            Relationship::ClusterRoleAggregationRule => "ClusterRoleAggregationRule",
            Relationship::ClusterRoleBindingRole => "ClusterRoleBindingRole",
            Relationship::ClusterRoleBindingSubject => "ClusterRoleBindingSubject",
            Relationship::RoleBindingRole => "RoleBindingRole",
            Relationship::RoleBindingSubject => "RoleBindingSubject",
            Relationship::EventRegarding => "EventRegarding",
            Relationship::EventRelated => "EventRelated",
            Relationship::IngressClass => "IngressClass",
            Relationship::IngressResource => "IngressResource",
            Relationship::IngressService => "IngressService",
            Relationship::IngressTls => "IngressTLS",
            Relationship::WebhookService => "WebhookService",
            Relationship::PersistentVolume => "PersistentVolume",
            Relationship::PersistentVolumeClaim => "PersistentVolumeClaim",
            Relationship::PodImagePullSecret => "PodImagePullSecret",
            Relationship::PodNode => "PodNode",
            Relationship::PodPriorityClass => "PodPriorityClass",
            Relationship::PodRuntimeClass => "PodRuntimeClass",
            Relationship::PodServiceAccount => "PodServiceAccount",
            Relationship::PodVolume => "PodVolume",
            Relationship::Service => "Service",
            Relationship::ServiceAccountImagePullSecret => "ServiceAccountImagePullSecret",
            Relationship::ServiceAccountSecret => "ServiceAccountSecret",
            Relationship::HelmRelease => "HelmRelease",
        }
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(group, kind)` pair identifying a resource type independent of version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            f.write_str(&self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

/// A reference to an object that may or may not have been fetched.
///
/// `namespace` is the namespace the reference resolves in; it is ignored when
/// the target kind turns out to be cluster-scoped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ObjectReference {
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectReference {
    pub fn new(
        group: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(self.group.clone(), self.kind.clone())
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gk = GroupKind::new(self.group.clone(), self.kind.clone());
        if self.namespace.is_empty() {
            write!(f, "{}/{}", gk, self.name)
        } else {
            write!(f, "{}/{} -n {}", gk, self.name, self.namespace)
        }
    }
}

/// One fetched object plus its adjacency in the graph.
///
/// Nodes refer to each other exclusively by UID. They are immutable after
/// fetch except for edge insertion (monotonic) and the projector-assigned
/// depth.
#[derive(Debug, Clone)]
pub struct Node {
    pub uid: Uid,
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Empty for cluster-scoped objects.
    pub namespace: String,
    pub name: String,
    pub namespaced: bool,
    pub created: Option<DateTime<Utc>>,
    pub labels: BTreeMap<String, String>,
    pub owner_references: Vec<OwnerReference>,
    /// The decoded JSON body; kind-specific fields are read on demand.
    pub body: Value,
    /// Assigned by the projector; 0 for a root. Recomputed per projection.
    pub depth: u32,
    /// UIDs this object points to, with the labels on each edge.
    pub dependencies: BTreeMap<Uid, RelationshipSet>,
    /// UIDs that point to this object, with the labels on each edge.
    pub dependents: BTreeMap<Uid, RelationshipSet>,
    /// References this object holds that resolved to nothing fetched.
    pub dangling: Vec<ObjectReference>,
}

impl Node {
    /// Build a node from a decoded object body.
    ///
    /// The body must carry `apiVersion`, `kind` and `metadata` with at least
    /// `uid` and `name`; list items fetched dynamically have these patched in
    /// by the fetcher before construction.
    pub fn from_object(body: Value, namespaced: bool) -> Result<Self> {
        let api_version = body
            .get("apiVersion")
            .and_then(|v| v.as_str())
            .context("object missing apiVersion")?;
        let (group, version) = match api_version.split_once('/') {
            Some((g, v)) => (g.to_string(), v.to_string()),
            None => (String::new(), api_version.to_string()),
        };
        let kind = body
            .get("kind")
            .and_then(|k| k.as_str())
            .context("object missing kind")?
            .to_string();

        let metadata = body
            .get("metadata")
            .and_then(|m| m.as_object())
            .context("object missing metadata")?;
        let uid = metadata
            .get("uid")
            .and_then(|u| u.as_str())
            .context("object missing metadata.uid")?
            .to_string();
        let name = metadata
            .get("name")
            .and_then(|n| n.as_str())
            .context("object missing metadata.name")?
            .to_string();
        let namespace = metadata
            .get("namespace")
            .and_then(|n| n.as_str())
            .unwrap_or_default()
            .to_string();
        let created = metadata
            .get("creationTimestamp")
            .and_then(|t| t.as_str())
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc));
        let labels = metadata
            .get("labels")
            .and_then(|l| l.as_object())
            .map(|l| {
                l.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        let owner_references = metadata
            .get("ownerReferences")
            .cloned()
            .map(|o| serde_json::from_value::<Vec<OwnerReference>>(o).unwrap_or_default())
            .unwrap_or_default();

        Ok(Self {
            uid,
            group,
            version,
            kind,
            namespace,
            name,
            namespaced,
            created,
            labels,
            owner_references,
            body,
            depth: 0,
            dependencies: BTreeMap::new(),
            dependents: BTreeMap::new(),
            dangling: Vec::new(),
        })
    }

    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(self.group.clone(), self.kind.clone())
    }

    /// Stable ordering key for sibling enumeration.
    pub fn sort_key(&self) -> (&str, &str, &str, &str) {
        (&self.namespace, &self.kind, &self.group, &self.name)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.group_kind(), self.name)
        } else {
            write!(f, "{}/{} -n {}", self.group_kind(), self.name, self.namespace)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_object_namespaced() {
        let node = Node::from_object(
            json!({
                "apiVersion": "apps/v1",
                "kind": "Deployment",
                "metadata": {
                    "uid": "uid-1",
                    "name": "web",
                    "namespace": "prod",
                    "creationTimestamp": "2024-03-01T10:00:00Z",
                    "labels": {"app": "web"},
                    "ownerReferences": [
                        {"apiVersion": "v1", "kind": "Owner", "name": "o", "uid": "uid-0", "controller": true}
                    ]
                }
            }),
            true,
        )
        .unwrap();

        assert_eq!(node.uid, "uid-1");
        assert_eq!(node.group, "apps");
        assert_eq!(node.version, "v1");
        assert_eq!(node.kind, "Deployment");
        assert_eq!(node.namespace, "prod");
        assert_eq!(node.labels.get("app").map(String::as_str), Some("web"));
        assert!(node.created.is_some());
        assert_eq!(node.owner_references.len(), 1);
        assert_eq!(node.owner_references[0].controller, Some(true));
    }

    #[test]
    fn test_from_object_core_group() {
        let node = Node::from_object(
            json!({
                "apiVersion": "v1",
                "kind": "Node",
                "metadata": {"uid": "uid-n", "name": "worker-1"}
            }),
            false,
        )
        .unwrap();

        assert_eq!(node.group, "");
        assert_eq!(node.version, "v1");
        assert_eq!(node.namespace, "");
        assert!(!node.namespaced);
        assert_eq!(node.to_string(), "Node/worker-1");
    }

    #[test]
    fn test_from_object_missing_uid() {
        let result = Node::from_object(
            json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {"name": "nameless"}
            }),
            true,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_group_kind_display() {
        assert_eq!(GroupKind::new("", "Pod").to_string(), "Pod");
        assert_eq!(
            GroupKind::new("apps", "Deployment").to_string(),
            "Deployment.apps"
        );
    }

    #[test]
    fn test_relationship_set_collapses_duplicates() {
        let mut set = RelationshipSet::new();
        set.insert(Relationship::OwnerReference);
        set.insert(Relationship::OwnerReference);
        set.insert(Relationship::ControllerReference);
        assert_eq!(set.len(), 2);
    }
}
