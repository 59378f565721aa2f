use std::sync::Arc;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::info;
use crate::{
    builder::NodeBuilder,
    error::{ClusterError, ClusterResult},
    events::NodeEvent,
    node::{Connector, Node, NodeLink, NodeStatus, WebSocketConnector},
};

/// Every node this process talks to.
#[derive(Default)]
#[non_exhaustive]
pub struct Cluster {
    pub nodes: DashMap<u8, Arc<dyn NodeLink>>,
}

impl Cluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ClusterBuilder {
        ClusterBuilder::new()
    }

    pub fn add(&self, node: Arc<dyn NodeLink>) -> ClusterResult<()> {
        let id = node.id();

        match self.nodes.entry(id) {
            Entry::Occupied(_) => return Err(ClusterError::DuplicateNode(id)),
            Entry::Vacant(entry) => {
                entry.insert(node);
            }
        }

        info!("Node id {} added to cluster successfully", id);

        Ok(())
    }

    /// Node a new player should bind to: the connected node with the lowest id.
    pub fn best(&self) -> ClusterResult<Arc<dyn NodeLink>> {
        self.nodes
            .iter()
            .filter(|item| item.value().status() == NodeStatus::Connected)
            .min_by_key(|item| *item.key())
            .map(|item| Arc::clone(item.value()))
            .ok_or(ClusterError::CannotFindNode)
    }

    pub fn get(&self, id: u8) -> Option<Arc<dyn NodeLink>> {
        self.nodes.get(&id).map(|item| Arc::clone(item.value()))
    }

    /// Shuts every node down; none of them will try to reconnect afterwards.
    pub async fn shutdown(&self) {
        let nodes = self.nodes
            .iter()
            .map(|item| Arc::clone(item.value()))
            .collect::<Vec<_>>();

        for node in nodes {
            node.shutdown().await;
        }
    }
}

impl typemap_rev::TypeMapKey for Cluster {
    type Value = Arc<Cluster>;
}

pub struct ClusterBuilder {
    pub nodes: Vec<NodeBuilder>,
    pub connector: Arc<dyn Connector>,
    node_counter: AtomicU8,
}

impl Default for ClusterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterBuilder {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            connector: Arc::new(WebSocketConnector),
            node_counter: AtomicU8::new(0),
        }
    }

    pub fn add_node<F>(&mut self, func: F) -> &mut Self
    where
        F: FnOnce(&mut NodeBuilder) -> &mut NodeBuilder {
            let mut builder = NodeBuilder::default();

            func(&mut builder);

            self.nodes.push(builder);

            self
        }

    pub fn connector(&mut self, connector: Arc<dyn Connector>) -> &mut Self {
        self.connector = connector;

        self
    }

    fn get_id(&self) -> u8 {
        self.node_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Builds every node and starts connecting them in the background.
    ///
    /// Must be called from within a tokio runtime. The receiver yields the events of all nodes.
    pub fn build(self) -> ClusterResult<(Arc<Cluster>, UnboundedReceiver<NodeEvent>)> {
        let (tx, rx) = unbounded_channel();
        let cluster = Arc::new(Cluster::new());

        for builder in &self.nodes {
            let id = self.get_id();

            let node = Node::new(id, builder.build()?, Arc::clone(&self.connector), tx.clone())?;

            cluster.add(node.clone())?;

            tokio::spawn(async move { node.start().await });
        }

        Ok((cluster, rx))
    }
}
