//! kinship — dependency discovery for Kubernetes objects
//!
//! Given a root object (or a Helm release, which expands to a set of roots),
//! kinship materializes the relevant subset of cluster state into an
//! in-memory object graph, computes the typed relationships between every
//! pair of objects, and projects the graph into a rooted dependency tree.
//!
//! The crate is also usable as a library; the binary in `main.rs` is a thin
//! wrapper around [`cli::run`].
//!
//! # Library quick start
//!
//! ```rust,no_run
//! use kinship::graph::{self, Direction, ObjectGraph, RootQuery};
//! use kinship::kube::{discovery, fetch};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = kinship::kube::create_client(None, None).await?;
//! let catalog = discovery::discover(&client).await?;
//! let (_cancel, cancel_rx) = tokio::sync::watch::channel(false);
//! let outcome = fetch::fetch_objects(
//!     &client,
//!     &catalog,
//!     &fetch::FetchScope::AllNamespaces,
//!     &cancel_rx,
//! )
//! .await?;
//!
//! let mut graph = ObjectGraph::new(outcome.nodes);
//! graph::resolve_relationships(&mut graph, None);
//!
//! let query = RootQuery {
//!     kind_hint: "deployment".into(),
//!     name: "web".into(),
//!     namespace: Some("default".into()),
//! };
//! let root = graph::resolve_root(&graph, &catalog, &query)?;
//! let projection = graph::project(&mut graph, &root, Direction::Dependents, 0)?;
//! for row in &projection {
//!     println!("{} {}", row.depth, row.uid);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod error;
pub mod graph;
pub mod helm;
pub mod kube;
pub mod render;

// Re-export the engine surface
pub use error::EngineError;
pub use graph::{
    project, resolve_relationships, resolve_root, Direction, GroupKind, Node, NodeMap,
    ObjectGraph, ObjectReference, Projection, Relationship, RelationshipSet, RootQuery, TreeRow,
    Uid,
};
pub use kube::discovery::ResourceInfo;
pub use kube::fetch::{FetchOutcome, FetchScope};
