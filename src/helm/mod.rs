//! Helm release expansion.
//!
//! Helm persists one storage record per revision in the release's namespace
//! (a Secret, or a ConfigMap for the configmap storage driver), labeled
//! `owner=helm` with the release name, revision and status. The expander
//! picks the latest deployed record, decodes its payload
//! (base64 -> gzip -> JSON) and reads the rendered manifest out of it,
//! yielding the identities that belong to the release plus the record itself
//! as the anchor root.

use std::io::Read;

use base64::Engine;
use flate2::read::GzDecoder;
use serde_json::Value;

use crate::error::EngineError;
use crate::graph::{Node, ObjectGraph, ObjectReference, Relationship, Uid};

/// The storage record plus the identities rendered into the release.
#[derive(Debug)]
pub struct ReleaseExpansion {
    /// UID of the storage record; used as the root of the projected tree.
    pub anchor: Uid,
    /// Manifest identities in document order.
    pub identities: Vec<ObjectReference>,
}

/// Expand a release name into its member identities.
pub fn expand_release(
    graph: &ObjectGraph,
    release: &str,
    namespace: &str,
) -> Result<ReleaseExpansion, EngineError> {
    let record = find_release_record(graph, release, namespace).ok_or_else(|| {
        EngineError::HelmReleaseNotFound {
            release: release.to_string(),
            namespace: namespace.to_string(),
        }
    })?;
    tracing::debug!("using release record {}", record);

    let payload =
        decode_release_payload(record).map_err(|reason| EngineError::HelmReleaseDecodeFailed {
            record: record.name.clone(),
            reason,
        })?;
    let manifest = payload.get("manifest").and_then(Value::as_str).ok_or_else(|| {
        EngineError::HelmReleaseDecodeFailed {
            record: record.name.clone(),
            reason: "release document has no manifest field".to_string(),
        }
    })?;
    let release_namespace = payload
        .get("namespace")
        .and_then(Value::as_str)
        .unwrap_or(namespace);

    Ok(ReleaseExpansion {
        anchor: record.uid.clone(),
        identities: manifest_identities(manifest, release_namespace),
    })
}

/// Wire the expansion into the graph: every resolved identity becomes a
/// depth-1 child of the anchor record; unresolved identities are recorded as
/// dangling on the anchor.
pub fn attach(graph: &mut ObjectGraph, expansion: &ReleaseExpansion) {
    for identity in &expansion.identities {
        match graph.lookup(identity).cloned() {
            Some(uid) => graph.relate(&uid, &expansion.anchor, Relationship::HelmRelease),
            None => graph.record_dangling(&expansion.anchor, identity.clone()),
        }
    }
}

/// Pick the storage record for the release: the highest-revision `deployed`
/// record, or failing that the highest revision of any status. Secrets win
/// ties against ConfigMaps.
fn find_release_record<'a>(
    graph: &'a ObjectGraph,
    release: &str,
    namespace: &str,
) -> Option<&'a Node> {
    let mut candidates: Vec<(&Node, u64, bool)> = Vec::new();
    for node in graph.nodes().values() {
        if !node.group.is_empty() || (node.kind != "Secret" && node.kind != "ConfigMap") {
            continue;
        }
        if node.namespace != namespace {
            continue;
        }
        if node.labels.get("owner").map(String::as_str) != Some("helm")
            || node.labels.get("name").map(String::as_str) != Some(release)
        {
            continue;
        }
        let Some(revision) = node.labels.get("version").and_then(|v| v.parse::<u64>().ok())
        else {
            continue;
        };
        let deployed = node.labels.get("status").map(String::as_str) == Some("deployed");
        candidates.push((node, revision, deployed));
    }

    let deployed: Vec<&(&Node, u64, bool)> =
        candidates.iter().filter(|(_, _, d)| *d).collect();
    let pool = if deployed.is_empty() {
        candidates.iter().collect()
    } else {
        deployed
    };
    pool.into_iter()
        .max_by_key(|(node, revision, _)| (*revision, node.kind == "Secret"))
        .map(|(node, _, _)| *node)
}

/// Decode the record's `release` key down to the JSON release document.
///
/// Secret data is base64 on the wire and the Helm payload is base64 again
/// underneath; ConfigMaps carry only the Helm layer. Both are handled by
/// peeling base64 until the gzip magic shows up.
fn decode_release_payload(record: &Node) -> Result<Value, String> {
    let data = record
        .body
        .get("data")
        .and_then(|d| d.get("release"))
        .and_then(Value::as_str)
        .ok_or_else(|| "record has no release key".to_string())?;

    let engine = base64::engine::general_purpose::STANDARD;
    let mut bytes = engine
        .decode(data.trim())
        .map_err(|err| format!("base64 decode failed: {}", err))?;
    if !is_gzip(&bytes) {
        if let Ok(inner) = engine.decode(&bytes) {
            bytes = inner;
        }
    }

    let document = if is_gzip(&bytes) {
        let mut decoder = GzDecoder::new(&bytes[..]);
        let mut buf = Vec::new();
        decoder
            .read_to_end(&mut buf)
            .map_err(|err| format!("gzip decode failed: {}", err))?;
        buf
    } else {
        bytes
    };

    serde_json::from_slice(&document).map_err(|err| format!("invalid release JSON: {}", err))
}

fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 3 && bytes[0] == 0x1f && bytes[1] == 0x8b && bytes[2] == 0x08
}

/// Parse the rendered manifest (`---`-separated YAML documents) into object
/// identities. Un-parseable documents are dropped with a warning.
pub fn manifest_identities(manifest: &str, default_namespace: &str) -> Vec<ObjectReference> {
    let mut identities = Vec::new();
    for document in manifest.split("---\n") {
        let document = document.trim();
        if document.is_empty() {
            continue;
        }
        let value: Value = match serde_yaml::from_str(document) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("dropping un-parseable manifest document: {}", err);
                continue;
            }
        };
        let (Some(api_version), Some(kind), Some(name)) = (
            value.get("apiVersion").and_then(Value::as_str),
            value.get("kind").and_then(Value::as_str),
            value
                .get("metadata")
                .and_then(|m| m.get("name"))
                .and_then(Value::as_str),
        ) else {
            tracing::warn!("dropping manifest document without apiVersion/kind/name");
            continue;
        };
        let group = api_version
            .split_once('/')
            .map(|(g, _)| g)
            .unwrap_or_default();
        let namespace = value
            .get("metadata")
            .and_then(|m| m.get("namespace"))
            .and_then(Value::as_str)
            .unwrap_or(default_namespace);
        identities.push(ObjectReference::new(group, kind, namespace, name));
    }
    identities
}
