//! Kind-specific relationship rules.
//!
//! For each node the resolver emits zero or more planned edges, then applies
//! them through the graph's single symmetric insert. Rules dispatch on
//! `(group, kind)` and read structured fields from the generic object body;
//! unknown kinds fall through to the owner-reference rules alone. A rule that
//! cannot parse its input emits no edge for that source; rules never fail the
//! invocation.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;

use super::{GroupKind, Node, ObjectGraph, ObjectReference, Relationship, Uid};

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";
const NETWORKING_GROUP: &str = "networking.k8s.io";
const ADMISSION_GROUP: &str = "admissionregistration.k8s.io";
const EVENTS_GROUP: &str = "events.k8s.io";

/// How a planned edge names its peer object.
enum Target {
    /// Known UID (owner references, event regarding, PV claim refs). The
    /// reference is kept for the dangling annotation if the UID was not
    /// fetched.
    ByUid { uid: Uid, reference: ObjectReference },
    /// Name reference resolved against the graph's lookup index.
    ByName(ObjectReference),
}

struct PlannedEdge {
    relationship: Relationship,
    target: Target,
    /// false: the source depends on the target. true: the target depends on
    /// the source (bindings point at their subjects, service accounts at
    /// their token secrets; the tree reads top-down either way).
    reverse: bool,
}

fn depends_on(relationship: Relationship, target: Target) -> PlannedEdge {
    PlannedEdge {
        relationship,
        target,
        reverse: false,
    }
}

fn depended_on_by(relationship: Relationship, target: Target) -> PlannedEdge {
    PlannedEdge {
        relationship,
        target,
        reverse: true,
    }
}

fn by_name(group: &str, kind: &str, namespace: &str, name: &str) -> Target {
    Target::ByName(ObjectReference::new(group, kind, namespace, name))
}

/// Per-namespace pods-by-label index for service selector resolution,
/// built once over the completed node map.
struct PodIndex {
    by_namespace: HashMap<String, Vec<(Uid, String, BTreeMap<String, String>)>>,
}

impl PodIndex {
    fn build(graph: &ObjectGraph) -> Self {
        let mut by_namespace: HashMap<String, Vec<(Uid, String, BTreeMap<String, String>)>> =
            HashMap::new();
        for node in graph.nodes().values() {
            if node.group.is_empty() && node.kind == "Pod" {
                by_namespace.entry(node.namespace.clone()).or_default().push((
                    node.uid.clone(),
                    node.name.clone(),
                    node.labels.clone(),
                ));
            }
        }
        Self { by_namespace }
    }
}

/// Resolve every edge in the graph.
///
/// When `scopes` is given, only source objects whose GroupKind is in the
/// whitelist are resolved; everything else contributes no edges.
pub fn resolve_relationships(graph: &mut ObjectGraph, scopes: Option<&BTreeSet<GroupKind>>) {
    let pods = PodIndex::build(graph);

    let mut planned: Vec<(Uid, PlannedEdge)> = Vec::new();
    for node in graph.nodes().values() {
        if let Some(allow) = scopes {
            if !allow.contains(&node.group_kind()) {
                continue;
            }
        }
        for edge in owner_reference_edges(node) {
            planned.push((node.uid.clone(), edge));
        }
        for edge in kind_edges(node, graph, &pods) {
            planned.push((node.uid.clone(), edge));
        }
    }

    for (source, edge) in planned {
        apply(graph, &source, edge);
    }
}

fn apply(graph: &mut ObjectGraph, source: &str, edge: PlannedEdge) {
    let peer = match &edge.target {
        Target::ByUid { uid, .. } => graph.contains(uid).then(|| uid.clone()),
        Target::ByName(reference) => graph.lookup(reference).cloned(),
    };
    match peer {
        Some(peer) => {
            if edge.reverse {
                graph.relate(&peer, source, edge.relationship);
            } else {
                graph.relate(source, &peer, edge.relationship);
            }
        }
        None => {
            let reference = match edge.target {
                Target::ByUid { reference, .. } | Target::ByName(reference) => reference,
            };
            graph.record_dangling(source, reference);
        }
    }
}

/// Generic rules applied to every object: each owner reference yields an
/// OwnerReference edge, plus a ControllerReference edge when the entry is the
/// controlling owner. Self-edges are suppressed here (and only here).
fn owner_reference_edges(node: &Node) -> Vec<PlannedEdge> {
    let mut edges = Vec::new();
    for owner in &node.owner_references {
        if owner.uid == node.uid {
            continue;
        }
        let group = owner
            .api_version
            .split_once('/')
            .map(|(g, _)| g)
            .unwrap_or_default();
        let reference =
            ObjectReference::new(group, owner.kind.clone(), node.namespace.clone(), owner.name.clone());
        edges.push(depends_on(
            Relationship::OwnerReference,
            Target::ByUid {
                uid: owner.uid.clone(),
                reference: reference.clone(),
            },
        ));
        if owner.controller == Some(true) {
            edges.push(depends_on(
                Relationship::ControllerReference,
                Target::ByUid {
                    uid: owner.uid.clone(),
                    reference,
                },
            ));
        }
    }
    edges
}

fn kind_edges(node: &Node, graph: &ObjectGraph, pods: &PodIndex) -> Vec<PlannedEdge> {
    match (node.group.as_str(), node.kind.as_str()) {
        ("", "Pod") => pod_edges(node),
        ("", "Service") => service_edges(node, pods),
        ("", "ServiceAccount") => service_account_edges(node),
        ("", "PersistentVolume") => persistent_volume_edges(node),
        ("", "PersistentVolumeClaim") => persistent_volume_claim_edges(node),
        ("", "Event") => event_edges(node, false),
        (EVENTS_GROUP, "Event") => event_edges(node, true),
        (RBAC_GROUP, "ClusterRole") => cluster_role_edges(node, graph),
        (RBAC_GROUP, "ClusterRoleBinding") => cluster_role_binding_edges(node),
        (RBAC_GROUP, "RoleBinding") => role_binding_edges(node),
        (NETWORKING_GROUP, "Ingress") => ingress_edges(node),
        (ADMISSION_GROUP, "MutatingWebhookConfiguration")
        | (ADMISSION_GROUP, "ValidatingWebhookConfiguration") => webhook_edges(node),
        _ => Vec::new(),
    }
}

fn pod_edges(node: &Node) -> Vec<PlannedEdge> {
    let mut edges = Vec::new();
    let ns = node.namespace.as_str();
    let Some(spec) = node.body.get("spec") else {
        return edges;
    };

    if let Some(name) = spec.get("nodeName").and_then(Value::as_str) {
        edges.push(depends_on(Relationship::PodNode, by_name("", "Node", "", name)));
    }
    if let Some(name) = spec.get("priorityClassName").and_then(Value::as_str) {
        edges.push(depends_on(
            Relationship::PodPriorityClass,
            by_name("scheduling.k8s.io", "PriorityClass", "", name),
        ));
    }
    if let Some(name) = spec.get("runtimeClassName").and_then(Value::as_str) {
        edges.push(depends_on(
            Relationship::PodRuntimeClass,
            by_name("node.k8s.io", "RuntimeClass", "", name),
        ));
    }
    if let Some(name) = spec.get("serviceAccountName").and_then(Value::as_str) {
        edges.push(depends_on(
            Relationship::PodServiceAccount,
            by_name("", "ServiceAccount", ns, name),
        ));
    }
    if let Some(secrets) = spec.get("imagePullSecrets").and_then(Value::as_array) {
        for secret in secrets {
            if let Some(name) = secret.get("name").and_then(Value::as_str) {
                edges.push(depends_on(
                    Relationship::PodImagePullSecret,
                    by_name("", "Secret", ns, name),
                ));
            }
        }
    }
    if let Some(volumes) = spec.get("volumes").and_then(Value::as_array) {
        for volume in volumes {
            for target in volume_targets(volume, ns) {
                edges.push(depends_on(Relationship::PodVolume, target));
            }
        }
    }
    edges
}

/// ConfigMap, Secret, PVC and projected volume sources.
fn volume_targets(volume: &Value, namespace: &str) -> Vec<Target> {
    let mut targets = Vec::new();
    if let Some(name) = volume
        .get("configMap")
        .and_then(|c| c.get("name"))
        .and_then(Value::as_str)
    {
        targets.push(by_name("", "ConfigMap", namespace, name));
    }
    if let Some(name) = volume
        .get("secret")
        .and_then(|s| s.get("secretName"))
        .and_then(Value::as_str)
    {
        targets.push(by_name("", "Secret", namespace, name));
    }
    if let Some(name) = volume
        .get("persistentVolumeClaim")
        .and_then(|p| p.get("claimName"))
        .and_then(Value::as_str)
    {
        targets.push(by_name("", "PersistentVolumeClaim", namespace, name));
    }
    if let Some(sources) = volume
        .get("projected")
        .and_then(|p| p.get("sources"))
        .and_then(Value::as_array)
    {
        for source in sources {
            if let Some(name) = source
                .get("configMap")
                .and_then(|c| c.get("name"))
                .and_then(Value::as_str)
            {
                targets.push(by_name("", "ConfigMap", namespace, name));
            }
            if let Some(name) = source
                .get("secret")
                .and_then(|s| s.get("name"))
                .and_then(Value::as_str)
            {
                targets.push(by_name("", "Secret", namespace, name));
            }
        }
    }
    targets
}

fn service_edges(node: &Node, pods: &PodIndex) -> Vec<PlannedEdge> {
    let mut edges = Vec::new();
    let Some(selector) = node
        .body
        .get("spec")
        .and_then(|s| s.get("selector"))
        .and_then(Value::as_object)
    else {
        return edges;
    };
    // An empty selector matches nothing, not everything.
    if selector.is_empty() {
        return edges;
    }
    let Some(candidates) = pods.by_namespace.get(&node.namespace) else {
        return edges;
    };
    for (uid, name, labels) in candidates {
        let matches = selector.iter().all(|(key, value)| {
            value
                .as_str()
                .is_some_and(|v| labels.get(key).map(String::as_str) == Some(v))
        });
        if matches {
            edges.push(depends_on(
                Relationship::Service,
                Target::ByUid {
                    uid: uid.clone(),
                    reference: ObjectReference::new("", "Pod", node.namespace.clone(), name.clone()),
                },
            ));
        }
    }
    edges
}

fn service_account_edges(node: &Node) -> Vec<PlannedEdge> {
    let mut edges = Vec::new();
    let ns = node.namespace.as_str();
    if let Some(secrets) = node.body.get("secrets").and_then(Value::as_array) {
        for secret in secrets {
            if let Some(name) = secret.get("name").and_then(Value::as_str) {
                edges.push(depended_on_by(
                    Relationship::ServiceAccountSecret,
                    by_name("", "Secret", ns, name),
                ));
            }
        }
    }
    if let Some(secrets) = node.body.get("imagePullSecrets").and_then(Value::as_array) {
        for secret in secrets {
            if let Some(name) = secret.get("name").and_then(Value::as_str) {
                edges.push(depended_on_by(
                    Relationship::ServiceAccountImagePullSecret,
                    by_name("", "Secret", ns, name),
                ));
            }
        }
    }
    edges
}

fn persistent_volume_edges(node: &Node) -> Vec<PlannedEdge> {
    let Some(claim) = node.body.get("spec").and_then(|s| s.get("claimRef")) else {
        return Vec::new();
    };
    let Some(name) = claim.get("name").and_then(Value::as_str) else {
        return Vec::new();
    };
    let namespace = claim
        .get("namespace")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let reference = ObjectReference::new("", "PersistentVolumeClaim", namespace, name);
    let target = match claim.get("uid").and_then(Value::as_str) {
        Some(uid) => Target::ByUid {
            uid: uid.to_string(),
            reference,
        },
        None => Target::ByName(reference),
    };
    vec![depends_on(Relationship::PersistentVolumeClaim, target)]
}

fn persistent_volume_claim_edges(node: &Node) -> Vec<PlannedEdge> {
    let Some(name) = node
        .body
        .get("spec")
        .and_then(|s| s.get("volumeName"))
        .and_then(Value::as_str)
    else {
        return Vec::new();
    };
    vec![depends_on(
        Relationship::PersistentVolume,
        by_name("", "PersistentVolume", "", name),
    )]
}

/// Core v1 events name their target `involvedObject`; events.k8s.io names it
/// `regarding` and adds an optional `related` reference.
fn event_edges(node: &Node, events_api: bool) -> Vec<PlannedEdge> {
    let mut edges = Vec::new();
    let regarding = if events_api {
        node.body.get("regarding")
    } else {
        node.body.get("involvedObject")
    };
    if let Some(target) = regarding.and_then(|r| reference_target(r, &node.namespace)) {
        edges.push(depends_on(Relationship::EventRegarding, target));
    }
    if events_api {
        if let Some(target) = node
            .body
            .get("related")
            .and_then(|r| reference_target(r, &node.namespace))
        {
            edges.push(depends_on(Relationship::EventRelated, target));
        }
    }
    edges
}

/// Parse a v1 ObjectReference-shaped value into an edge target, resolving by
/// UID when one is present.
fn reference_target(value: &Value, default_namespace: &str) -> Option<Target> {
    let kind = value.get("kind").and_then(Value::as_str)?;
    let name = value.get("name").and_then(Value::as_str)?;
    let group = value
        .get("apiVersion")
        .and_then(Value::as_str)
        .and_then(|av| av.split_once('/').map(|(g, _)| g))
        .unwrap_or_default();
    let namespace = value
        .get("namespace")
        .and_then(Value::as_str)
        .unwrap_or(default_namespace);
    let reference = ObjectReference::new(group, kind, namespace, name);
    Some(match value.get("uid").and_then(Value::as_str) {
        Some(uid) => Target::ByUid {
            uid: uid.to_string(),
            reference,
        },
        None => Target::ByName(reference),
    })
}

/// An aggregated ClusterRole selects the ClusterRoles whose labels match any
/// of its `aggregationRule.clusterRoleSelectors`.
fn cluster_role_edges(node: &Node, graph: &ObjectGraph) -> Vec<PlannedEdge> {
    let mut edges = Vec::new();
    let Some(selectors) = node
        .body
        .get("aggregationRule")
        .and_then(|a| a.get("clusterRoleSelectors"))
        .and_then(Value::as_array)
    else {
        return edges;
    };
    for other in graph.nodes().values() {
        if other.group != RBAC_GROUP || other.kind != "ClusterRole" || other.uid == node.uid {
            continue;
        }
        let selected = selectors.iter().any(|selector| {
            selector
                .get("matchLabels")
                .and_then(Value::as_object)
                .is_some_and(|match_labels| selector_matches(match_labels, &other.labels))
        });
        if selected {
            edges.push(depends_on(
                Relationship::ClusterRoleAggregationRule,
                Target::ByUid {
                    uid: other.uid.clone(),
                    reference: ObjectReference::new(RBAC_GROUP, "ClusterRole", "", other.name.clone()),
                },
            ));
        }
    }
    edges
}

/// Equality on all selector keys; an empty selector matches nothing.
fn selector_matches(
    match_labels: &serde_json::Map<String, Value>,
    labels: &BTreeMap<String, String>,
) -> bool {
    !match_labels.is_empty()
        && match_labels.iter().all(|(key, value)| {
            value
                .as_str()
                .is_some_and(|v| labels.get(key).map(String::as_str) == Some(v))
        })
}

fn cluster_role_binding_edges(node: &Node) -> Vec<PlannedEdge> {
    let mut edges = Vec::new();
    if let Some(name) = node
        .body
        .get("roleRef")
        .and_then(|r| r.get("name"))
        .and_then(Value::as_str)
    {
        edges.push(depends_on(
            Relationship::ClusterRoleBindingRole,
            by_name(RBAC_GROUP, "ClusterRole", "", name),
        ));
    }
    edges.extend(subject_edges(
        node,
        Relationship::ClusterRoleBindingSubject,
        // ClusterRoleBinding subjects must carry their own namespace.
        "",
    ));
    edges
}

fn role_binding_edges(node: &Node) -> Vec<PlannedEdge> {
    let mut edges = Vec::new();
    if let Some(role_ref) = node.body.get("roleRef") {
        let kind = role_ref.get("kind").and_then(Value::as_str).unwrap_or("Role");
        if let Some(name) = role_ref.get("name").and_then(Value::as_str) {
            let namespace = if kind == "ClusterRole" { "" } else { node.namespace.as_str() };
            edges.push(depends_on(
                Relationship::RoleBindingRole,
                by_name(RBAC_GROUP, kind, namespace, name),
            ));
        }
    }
    edges.extend(subject_edges(
        node,
        Relationship::RoleBindingSubject,
        &node.namespace,
    ));
    edges
}

/// Subjects of kind User or Group are virtual and emit no edge; a
/// ServiceAccount subject points at the account it grants.
fn subject_edges(
    node: &Node,
    relationship: Relationship,
    default_namespace: &str,
) -> Vec<PlannedEdge> {
    let mut edges = Vec::new();
    let Some(subjects) = node.body.get("subjects").and_then(Value::as_array) else {
        return edges;
    };
    for subject in subjects {
        if subject.get("kind").and_then(Value::as_str) != Some("ServiceAccount") {
            continue;
        }
        let Some(name) = subject.get("name").and_then(Value::as_str) else {
            continue;
        };
        let namespace = subject
            .get("namespace")
            .and_then(Value::as_str)
            .unwrap_or(default_namespace);
        edges.push(depended_on_by(
            relationship,
            by_name("", "ServiceAccount", namespace, name),
        ));
    }
    edges
}

fn ingress_edges(node: &Node) -> Vec<PlannedEdge> {
    let mut edges = Vec::new();
    let ns = node.namespace.as_str();
    let Some(spec) = node.body.get("spec") else {
        return edges;
    };

    if let Some(name) = spec.get("ingressClassName").and_then(Value::as_str) {
        edges.push(depends_on(
            Relationship::IngressClass,
            by_name(NETWORKING_GROUP, "IngressClass", "", name),
        ));
    }
    if let Some(backend) = spec.get("defaultBackend") {
        edges.extend(backend_edges(backend, ns));
    }
    if let Some(rules) = spec.get("rules").and_then(Value::as_array) {
        for rule in rules {
            let Some(paths) = rule
                .get("http")
                .and_then(|h| h.get("paths"))
                .and_then(Value::as_array)
            else {
                continue;
            };
            for path in paths {
                if let Some(backend) = path.get("backend") {
                    edges.extend(backend_edges(backend, ns));
                }
            }
        }
    }
    if let Some(tls_entries) = spec.get("tls").and_then(Value::as_array) {
        for tls in tls_entries {
            if let Some(name) = tls.get("secretName").and_then(Value::as_str) {
                edges.push(depends_on(
                    Relationship::IngressTls,
                    by_name("", "Secret", ns, name),
                ));
            }
        }
    }
    edges
}

/// An ingress backend is either a service reference or a typed resource
/// reference in the ingress's own namespace.
fn backend_edges(backend: &Value, namespace: &str) -> Vec<PlannedEdge> {
    let mut edges = Vec::new();
    if let Some(name) = backend
        .get("service")
        .and_then(|s| s.get("name"))
        .and_then(Value::as_str)
    {
        edges.push(depends_on(
            Relationship::IngressService,
            by_name("", "Service", namespace, name),
        ));
    }
    if let Some(resource) = backend.get("resource") {
        let group = resource
            .get("apiGroup")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if let (Some(kind), Some(name)) = (
            resource.get("kind").and_then(Value::as_str),
            resource.get("name").and_then(Value::as_str),
        ) {
            edges.push(depends_on(
                Relationship::IngressResource,
                by_name(group, kind, namespace, name),
            ));
        }
    }
    edges
}

fn webhook_edges(node: &Node) -> Vec<PlannedEdge> {
    let mut edges = Vec::new();
    let Some(webhooks) = node.body.get("webhooks").and_then(Value::as_array) else {
        return edges;
    };
    for webhook in webhooks {
        let Some(service) = webhook.get("clientConfig").and_then(|c| c.get("service")) else {
            continue;
        };
        if let (Some(namespace), Some(name)) = (
            service.get("namespace").and_then(Value::as_str),
            service.get("name").and_then(Value::as_str),
        ) {
            edges.push(depends_on(
                Relationship::WebhookService,
                by_name("", "Service", namespace, name),
            ));
        }
    }
    edges
}
