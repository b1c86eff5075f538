//! API discovery catalog.
//!
//! Enumerates every group/version/resource the cluster advertises and
//! collapses duplicate kinds onto the group's preferred version. Unreachable
//! groups (a broken aggregated API server, typically) are skipped with a
//! warning; discovery only fails when nothing at all could be listed.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResourceList;
use kube::Client;

use crate::error::EngineError;
use crate::graph::GroupKind;

/// One listable resource kind advertised by the cluster.
#[derive(Debug, Clone)]
pub struct ResourceInfo {
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Plural resource name, e.g. `deployments`.
    pub resource: String,
    pub singular: String,
    pub short_names: Vec<String>,
    pub namespaced: bool,
    pub verbs: Vec<String>,
}

impl ResourceInfo {
    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(self.group.clone(), self.kind.clone())
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// The dynamic API descriptor used to build `Api<DynamicObject>` handles.
    pub fn api_resource(&self) -> kube::core::ApiResource {
        kube::core::ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.api_version(),
            kind: self.kind.clone(),
            plural: self.resource.clone(),
        }
    }
}

impl std::fmt::Display for ResourceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.group.is_empty() {
            f.write_str(&self.resource)
        } else {
            write!(f, "{}.{}", self.resource, self.group)
        }
    }
}

/// List every listable resource kind the cluster advertises.
pub async fn discover(client: &Client) -> Result<Vec<ResourceInfo>, EngineError> {
    let mut infos = Vec::new();
    let mut core_error = None;
    let mut groups_error = None;

    match client.list_core_api_versions().await {
        Ok(versions) => {
            let preferred = versions
                .versions
                .iter()
                .max()
                .cloned()
                .unwrap_or_else(|| "v1".to_string());
            let mut lists = Vec::new();
            for version in &versions.versions {
                match client.list_api_group_resources(version).await {
                    Ok(list) => lists.push(list),
                    Err(err) => {
                        tracing::warn!("skipping core API version {}: {}", version, err);
                    }
                }
            }
            infos.extend(collect_group("", &preferred, &lists));
        }
        Err(err) => {
            tracing::warn!("failed to list core API versions: {}", err);
            core_error = Some(err.to_string());
        }
    }

    match client.list_api_groups().await {
        Ok(group_list) => {
            for group in group_list.groups {
                let preferred = group
                    .preferred_version
                    .as_ref()
                    .map(|gv| gv.version.clone())
                    .unwrap_or_else(|| {
                        group
                            .versions
                            .iter()
                            .map(|gv| gv.version.clone())
                            .max()
                            .unwrap_or_default()
                    });
                let mut lists = Vec::new();
                let mut failures = 0usize;
                for gv in &group.versions {
                    match client.list_api_group_resources(&gv.group_version).await {
                        Ok(list) => lists.push(list),
                        Err(err) => {
                            failures += 1;
                            tracing::warn!("skipping {}: {}", gv.group_version, err);
                        }
                    }
                }
                if lists.is_empty() && failures > 0 {
                    tracing::warn!("skipping unreachable API group {}", group.name);
                    continue;
                }
                infos.extend(collect_group(&group.name, &preferred, &lists));
            }
        }
        Err(err) => {
            tracing::warn!("failed to list API groups: {}", err);
            groups_error = Some(err.to_string());
        }
    }

    if let (Some(core), Some(groups)) = (&core_error, &groups_error) {
        return Err(EngineError::DiscoveryUnavailable(format!(
            "{}; {}",
            core, groups
        )));
    }
    if infos.is_empty() {
        return Err(EngineError::DiscoveryUnavailable(
            "no listable resources advertised".to_string(),
        ));
    }

    infos.sort_by(|a, b| (&a.group, &a.resource).cmp(&(&b.group, &b.resource)));
    Ok(infos)
}

/// Collapse one group's versioned resource lists into a single entry per
/// kind: the preferred version wins, then the lexicographically greatest.
/// Sub-resources (names containing `/`) and kinds without the `list` verb
/// are dropped.
fn collect_group(group: &str, preferred: &str, lists: &[APIResourceList]) -> Vec<ResourceInfo> {
    let mut chosen: HashMap<String, ResourceInfo> = HashMap::new();
    for list in lists {
        let version = list
            .group_version
            .rsplit('/')
            .next()
            .unwrap_or(&list.group_version);
        for resource in &list.resources {
            if resource.name.contains('/') {
                continue;
            }
            if !resource.verbs.iter().any(|verb| verb == "list") {
                continue;
            }
            let info = ResourceInfo {
                group: group.to_string(),
                version: version.to_string(),
                kind: resource.kind.clone(),
                resource: resource.name.clone(),
                singular: if resource.singular_name.is_empty() {
                    resource.kind.to_lowercase()
                } else {
                    resource.singular_name.clone()
                },
                short_names: resource.short_names.clone().unwrap_or_default(),
                namespaced: resource.namespaced,
                verbs: resource.verbs.clone(),
            };
            match chosen.entry(info.kind.clone()) {
                Entry::Occupied(mut entry) => {
                    if prefer(&info, entry.get(), preferred) {
                        entry.insert(info);
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(info);
                }
            }
        }
    }
    let mut out: Vec<ResourceInfo> = chosen.into_values().collect();
    out.sort_by(|a, b| a.resource.cmp(&b.resource));
    out
}

fn prefer(candidate: &ResourceInfo, current: &ResourceInfo, preferred: &str) -> bool {
    if current.version == preferred {
        return false;
    }
    if candidate.version == preferred {
        return true;
    }
    candidate.version > current.version
}
