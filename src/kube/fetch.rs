//! Concurrent object fetching.
//!
//! One list request per listable kind, fanned out with a bounded concurrency
//! ceiling. Per-kind failures never fail the invocation: forbidden kinds are
//! recorded and skipped, missing kinds are skipped silently, anything else is
//! surfaced as a warning and whatever was obtained is kept. The fetch fails
//! only when no objects at all could be listed.

use anyhow::Result;
use futures::stream::{self, StreamExt};
use kube::api::ListParams;
use kube::core::DynamicObject;
use kube::{Api, Client};
use serde_json::Value;
use tokio::sync::watch;

use crate::error::EngineError;
use crate::graph::{GroupKind, Node, NodeMap};
use crate::kube::discovery::ResourceInfo;

/// Cap on simultaneous list requests.
pub const LIST_CONCURRENCY: usize = 16;

/// What to fetch: everything, or one namespace plus all cluster-scoped kinds.
#[derive(Debug, Clone)]
pub enum FetchScope {
    AllNamespaces,
    Namespace(String),
}

/// The fetched node map, plus what the fetch had to leave behind.
#[derive(Debug)]
pub struct FetchOutcome {
    pub nodes: NodeMap,
    /// Kinds the caller is not allowed to list.
    pub forbidden: Vec<GroupKind>,
    /// True when the cancellation signal fired mid-fetch; `nodes` holds what
    /// was obtained up to that point.
    pub canceled: bool,
}

enum KindList {
    Objects(Vec<Node>),
    Forbidden,
    Skipped,
    Failed,
    Canceled,
}

/// List every kind in the catalog within the scope and wrap the results into
/// nodes keyed by UID.
pub async fn fetch_objects(
    client: &Client,
    catalog: &[ResourceInfo],
    scope: &FetchScope,
    cancel: &watch::Receiver<bool>,
) -> Result<FetchOutcome, EngineError> {
    let results: Vec<(&ResourceInfo, KindList)> = stream::iter(catalog.iter().map(|info| {
        let client = client.clone();
        let cancel = cancel.clone();
        let scope = scope.clone();
        async move {
            let outcome = list_kind(client, info, &scope, cancel).await;
            (info, outcome)
        }
    }))
    .buffer_unordered(LIST_CONCURRENCY)
    .collect()
    .await;

    let mut nodes = NodeMap::new();
    let mut forbidden = Vec::new();
    let mut canceled = false;
    for (info, outcome) in results {
        match outcome {
            KindList::Objects(list) => {
                for node in list {
                    nodes.insert(node.uid.clone(), node);
                }
            }
            KindList::Forbidden => forbidden.push(info.group_kind()),
            KindList::Skipped | KindList::Failed => {}
            KindList::Canceled => canceled = true,
        }
    }

    if nodes.is_empty() && !canceled {
        return Err(EngineError::FetchFailed);
    }
    tracing::debug!("fetched {} objects", nodes.len());
    Ok(FetchOutcome {
        nodes,
        forbidden,
        canceled,
    })
}

async fn list_kind(
    client: Client,
    info: &ResourceInfo,
    scope: &FetchScope,
    mut cancel: watch::Receiver<bool>,
) -> KindList {
    let ar = info.api_resource();
    let api: Api<DynamicObject> = match (scope, info.namespaced) {
        (FetchScope::Namespace(namespace), true) => Api::namespaced_with(client, namespace, &ar),
        _ => Api::all_with(client, &ar),
    };

    let params = ListParams::default();
    let listed = tokio::select! {
        _ = wait_canceled(&mut cancel) => return KindList::Canceled,
        listed = api.list(&params) => listed,
    };

    match listed {
        Ok(objects) => {
            let mut out = Vec::with_capacity(objects.items.len());
            for object in &objects.items {
                match node_from_dynamic(object, info) {
                    Ok(node) => out.push(node),
                    Err(err) => {
                        tracing::warn!("skipping malformed {} object: {}", info.kind, err);
                    }
                }
            }
            KindList::Objects(out)
        }
        Err(kube::Error::Api(response)) if response.code == 403 => {
            tracing::warn!("access denied listing {}", info);
            KindList::Forbidden
        }
        Err(kube::Error::Api(response)) if response.code == 404 || response.code == 405 => {
            tracing::debug!("skipping {}: {}", info, response.code);
            KindList::Skipped
        }
        Err(err) => {
            tracing::warn!("failed to list {}: {}", info, err);
            KindList::Failed
        }
    }
}

/// Resolves when the cancellation signal fires; pends forever if the sender
/// side is gone (no cancellation possible).
async fn wait_canceled(cancel: &mut watch::Receiver<bool>) {
    match cancel.wait_for(|canceled| *canceled).await {
        Ok(_) => {}
        Err(_) => std::future::pending().await,
    }
}

/// List items fetched dynamically do not carry their own type metadata; patch
/// it in from the catalog entry before wrapping.
fn node_from_dynamic(object: &DynamicObject, info: &ResourceInfo) -> Result<Node> {
    let mut body = serde_json::to_value(object)?;
    if body.get("apiVersion").and_then(Value::as_str).is_none() {
        body["apiVersion"] = Value::String(info.api_version());
    }
    if body.get("kind").and_then(Value::as_str).is_none() {
        body["kind"] = Value::String(info.kind.clone());
    }
    Node::from_object(body, info.namespaced)
}
