use futures_util::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::runtime::reflector::{store::Writer, Store};
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Api, Client};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Eventually-consistent view of the cluster's nodes.
///
/// Backed by a reflector store that the node watch keeps current; every
/// scheduling decision reads a fresh snapshot.
#[derive(Clone)]
pub struct NodeRegistry {
    store: Store<Node>,
}

impl NodeRegistry {
    /// Create an empty registry and the writer that feeds it
    pub fn new() -> (Self, Writer<Node>) {
        let (store, writer) = reflector::store();
        (Self { store }, writer)
    }

    /// All currently known nodes, ordered by name
    pub fn snapshot(&self) -> Vec<Arc<Node>> {
        let mut nodes = self.store.state();
        nodes.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        nodes
    }

    pub fn len(&self) -> usize {
        self.store.state().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keep the registry in sync with the cluster until cancelled.
///
/// Watch errors are retried with backoff; the registry keeps serving the
/// last known state in the meantime.
pub async fn run_node_watch(client: Client, writer: Writer<Node>, token: CancellationToken) {
    let nodes: Api<Node> = Api::all(client);
    let stream = reflector(writer, watcher(nodes, watcher::Config::default()))
        .default_backoff()
        .touched_objects();
    futures_util::pin_mut!(stream);

    info!("Node watch started");
    let mut seen = HashSet::new();

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("Node watch shutting down");
                return;
            }
            item = stream.next() => match item {
                Some(Ok(node)) => {
                    note_node(&mut seen, &node);
                }
                Some(Err(e)) => warn!("Node watch error: {}", e),
                None => {
                    warn!("Node watch stream ended");
                    return;
                }
            }
        }
    }
}

/// Log a node update, at `info` the first time the node is seen.
/// Returns whether the node is new.
fn note_node(seen: &mut HashSet<String>, node: &Node) -> bool {
    let name = node.metadata.name.as_deref().unwrap_or("unknown");
    if seen.insert(name.to_string()) {
        info!("Node {} joined the registry", name);
        true
    } else {
        debug!("Node registry updated: {}", name);
        false
    }
}
