//! CLI surface: argument parsing and the top-level pipeline.

mod logging;

pub use logging::init_logging;

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use tokio::sync::watch;

use crate::graph::{
    project, resolve_relationships, resolve_root, Direction, GroupKind, ObjectGraph, RootQuery,
};
use crate::helm;
use crate::kube::discovery::{self, ResourceInfo};
use crate::kube::fetch::{fetch_objects, FetchScope};
use crate::render::{render, OutputFormat, RenderOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputArg {
    Wide,
    Json,
    Yaml,
    Split,
}

/// Print the transitive tree of dependents (or dependencies) of a Kubernetes
/// object, or of every object belonging to a Helm release.
#[derive(Parser, Debug)]
#[command(name = "kinship")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Root object: `<kind>/<name>`, `<kind> <name>`, or a Helm release name
    #[arg(required = true, num_args = 1..=2)]
    pub root: Vec<String>,

    /// Namespace of the root object (defaults to the kubeconfig context namespace)
    #[arg(short = 'n', long)]
    pub namespace: Option<String>,

    /// Fetch objects across all namespaces
    #[arg(short = 'A', long)]
    pub all_namespaces: bool,

    /// Maximum tree depth (0 = unbounded)
    #[arg(short = 'd', long, default_value_t = 0)]
    pub depth: u32,

    /// Walk dependencies (ancestors) instead of dependents
    #[arg(long)]
    pub dependencies: bool,

    /// Restrict relationship resolution to these kinds (Kind or Kind.group)
    #[arg(short = 's', long, value_delimiter = ',')]
    pub scopes: Vec<String>,

    /// Output format
    #[arg(short = 'o', long, value_enum)]
    pub output: Option<OutputArg>,

    /// Always include the API group in object names
    #[arg(long)]
    pub show_group: bool,

    /// Append a LABELS column
    #[arg(long)]
    pub show_labels: bool,

    /// Always show the NAMESPACE column
    #[arg(long)]
    pub show_namespace: bool,

    /// Kubeconfig context to use
    #[arg(long)]
    pub context: Option<String>,

    /// Path to a kubeconfig file
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

enum RootRef {
    Object { kind_hint: String, name: String },
    HelmRelease(String),
}

/// `kind/name` and `kind name` address one object; a bare name (or the
/// `helm` kind hint) addresses a Helm release.
fn parse_root(root: &[String]) -> Result<RootRef> {
    match root {
        [single] => match single.split_once('/') {
            Some((kind, name)) if !kind.is_empty() && !name.is_empty() => {
                Ok(object_or_release(kind, name))
            }
            Some(_) => bail!("invalid object reference {:?}", single),
            None => Ok(RootRef::HelmRelease(single.clone())),
        },
        [kind, name] => Ok(object_or_release(kind, name)),
        _ => bail!("expected <kind>/<name>, <kind> <name> or a helm release name"),
    }
}

fn object_or_release(kind: &str, name: &str) -> RootRef {
    if kind.eq_ignore_ascii_case("helm") {
        RootRef::HelmRelease(name.to_string())
    } else {
        RootRef::Object {
            kind_hint: kind.to_string(),
            name: name.to_string(),
        }
    }
}

/// Run the whole pipeline and return the process exit code.
pub async fn run(args: Args) -> Result<i32> {
    init_logging(args.verbose);
    let root = parse_root(&args.root)?;

    let client =
        crate::kube::create_client(args.kubeconfig.as_deref(), args.context.as_deref()).await?;
    let catalog = discovery::discover(&client).await?;
    tracing::debug!("discovered {} listable kinds", catalog.len());

    let namespace = args
        .namespace
        .clone()
        .or_else(|| {
            crate::kube::default_namespace(args.kubeconfig.as_deref(), args.context.as_deref())
        })
        .unwrap_or_else(|| "default".to_string());
    let scope = if args.all_namespaces {
        FetchScope::AllNamespaces
    } else {
        FetchScope::Namespace(namespace.clone())
    };

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, continuing with what has been fetched");
            let _ = cancel_tx.send(true);
        }
    });

    let outcome = fetch_objects(&client, &catalog, &scope, &cancel_rx).await?;
    for group_kind in &outcome.forbidden {
        tracing::warn!("results may be incomplete: cannot list {}", group_kind);
    }

    let mut graph = ObjectGraph::new(outcome.nodes);
    let scopes = parse_scopes(&args.scopes, &catalog);
    resolve_relationships(&mut graph, scopes.as_ref());

    let root_uid = match root {
        RootRef::HelmRelease(release) => {
            let expansion = helm::expand_release(&graph, &release, &namespace)?;
            helm::attach(&mut graph, &expansion);
            expansion.anchor
        }
        RootRef::Object { kind_hint, name } => {
            let query_namespace = if args.all_namespaces && args.namespace.is_none() {
                None
            } else {
                Some(namespace.clone())
            };
            resolve_root(
                &graph,
                &catalog,
                &RootQuery {
                    kind_hint,
                    name,
                    namespace: query_namespace,
                },
            )?
        }
    };

    let direction = if args.dependencies {
        Direction::Dependencies
    } else {
        Direction::Dependents
    };
    let projection = project(&mut graph, &root_uid, direction, args.depth)?;

    let opts = RenderOptions {
        format: match args.output {
            None => OutputFormat::Standard,
            Some(OutputArg::Wide) => OutputFormat::Wide,
            Some(OutputArg::Json) => OutputFormat::Json,
            Some(OutputArg::Yaml) => OutputFormat::Yaml,
            Some(OutputArg::Split) => OutputFormat::Split,
        },
        show_group: args.show_group,
        show_labels: args.show_labels,
        show_namespace: args.show_namespace,
    };
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    render(&mut out, &graph, &projection, &opts)?;

    Ok(if outcome.canceled { 4 } else { 0 })
}

/// Translate `-s` items into a GroupKind whitelist via the catalog. Unknown
/// items are ignored with a warning.
fn parse_scopes(scopes: &[String], catalog: &[ResourceInfo]) -> Option<BTreeSet<GroupKind>> {
    if scopes.is_empty() {
        return None;
    }
    let mut allow = BTreeSet::new();
    for item in scopes {
        let (kind_part, group_part) = match item.split_once('.') {
            Some((kind, group)) => (kind, Some(group)),
            None => (item.as_str(), None),
        };
        let kind_lower = kind_part.to_lowercase();
        let mut matched = false;
        for info in catalog {
            let kind_matches = info.kind.to_lowercase() == kind_lower
                || info.resource == kind_lower
                || info.singular == kind_lower
                || info.short_names.iter().any(|s| *s == kind_lower);
            let group_matches =
                group_part.is_none_or(|group| group.eq_ignore_ascii_case(&info.group));
            if kind_matches && group_matches {
                allow.insert(info.group_kind());
                matched = true;
            }
        }
        if !matched {
            tracing::warn!("ignoring unknown scope {:?}", item);
        }
    }
    Some(allow)
}
