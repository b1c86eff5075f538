//! Kubernetes client module
//!
//! Handles connection to the Kubernetes API server and provides a configured
//! client for the discovery and fetch stages.

pub mod discovery;
pub mod fetch;

use std::path::Path;

use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

/// Initialize a Kubernetes client.
///
/// With no overrides this uses the default loading strategy: in-cluster
/// config when running in a pod, then `KUBECONFIG`, then `~/.kube/config`.
/// A kubeconfig path and/or context name override that chain.
pub async fn create_client(kubeconfig: Option<&Path>, context: Option<&str>) -> Result<Client> {
    let config = match (kubeconfig, context) {
        (Some(path), _) => {
            let kubeconfig = Kubeconfig::read_from(path).with_context(|| {
                format!("failed to load kubeconfig from {}", path.display())
            })?;
            let options = KubeConfigOptions {
                context: context.map(str::to_string),
                ..Default::default()
            };
            Config::from_custom_kubeconfig(kubeconfig, &options)
                .await
                .with_context(|| {
                    format!("invalid kubeconfig {}", path.display())
                })?
        }
        (None, Some(context)) => {
            let options = KubeConfigOptions {
                context: Some(context.to_string()),
                ..Default::default()
            };
            Config::from_kubeconfig(&options)
                .await
                .with_context(|| format!("failed to load context '{}'", context))?
        }
        (None, None) => Config::infer()
            .await
            .context("failed to infer Kubernetes configuration")?,
    };

    let client = Client::try_from(config)?;
    tracing::debug!("Kubernetes client created");
    Ok(client)
}

/// The namespace of the selected kubeconfig context, if it names one.
///
/// Callers fall back to `default` when neither a `-n` flag nor the context
/// provides a namespace.
pub fn default_namespace(kubeconfig: Option<&Path>, context: Option<&str>) -> Option<String> {
    let config = match kubeconfig {
        Some(path) => Kubeconfig::read_from(path).ok()?,
        None => Kubeconfig::read().ok()?,
    };
    let context_name = context
        .map(str::to_string)
        .or_else(|| config.current_context.clone())?;
    config
        .contexts
        .iter()
        .find(|c| c.name == context_name)
        .and_then(|c| c.context.as_ref())
        .and_then(|c| c.namespace.clone())
}
