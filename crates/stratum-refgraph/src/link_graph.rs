//! Link chain graph.
//!
//! Resources are nodes of a [`DiGraph`] addressed by [`NodeId`], links are
//! its edges. Raw link cycles between resources are representable; only the
//! hard links between them must be acyclic.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use stratum_core::{LinkKind, PriorityResource, ProviderError, Result, StagingError};

/// Link behaviour supplied by a provider plugin for a pair of resources.
#[async_trait]
pub trait LinkImplementation: Send + Sync {
    /// Whether the link is hard (ordering) or soft.
    async fn get_kind(&self) -> std::result::Result<LinkKind, ProviderError>;

    /// Which of the two resources the link depends on.
    async fn get_priority_resource(&self) -> std::result::Result<PriorityResource, ProviderError>;
}

/// Stable identity of a resource in a [`LinkGraph`].
pub type NodeId = NodeIndex;

/// A resource participating in the link graph.
pub struct ChainLinkNode {
    /// Unique name of the resource in its blueprint.
    pub resource_name: String,
    /// Neighbouring resource name -> link implementation for the pair.
    pub link_implementations: HashMap<String, Arc<dyn LinkImplementation>>,
}

impl fmt::Debug for ChainLinkNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut implementations: Vec<&String> = self.link_implementations.keys().collect();
        implementations.sort();
        f.debug_struct("ChainLinkNode")
            .field("resource_name", &self.resource_name)
            .field("link_implementations", &implementations)
            .finish()
    }
}

/// A link implementation along with the resource it was registered on.
#[derive(Clone)]
pub struct ResolvedLinkImplementation {
    pub implementation: Arc<dyn LinkImplementation>,
    /// Name of the resource whose implementation map held the entry.
    pub from_resource: String,
}

/// Resources and the links between them.
#[derive(Debug, Default)]
pub struct LinkGraph {
    graph: DiGraph<ChainLinkNode, ()>,
    node_map: HashMap<String, NodeId>,
}

impl LinkGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource, returning the existing id if it is already present.
    pub fn add_resource(&mut self, resource_name: impl Into<String>) -> NodeId {
        let resource_name = resource_name.into();
        if let Some(&id) = self.node_map.get(&resource_name) {
            return id;
        }

        let id = self.graph.add_node(ChainLinkNode {
            resource_name: resource_name.clone(),
            link_implementations: HashMap::new(),
        });
        self.node_map.insert(resource_name, id);
        id
    }

    /// Add a link from `from` to `to` with the implementation registered on `from`.
    pub fn link(&mut self, from: NodeId, to: NodeId, implementation: Arc<dyn LinkImplementation>) {
        self.connect(from, to);
        let to_name = self.graph[to].resource_name.clone();
        self.graph[from]
            .link_implementations
            .insert(to_name, implementation);
    }

    /// Add a link edge without registering an implementation.
    pub fn connect(&mut self, from: NodeId, to: NodeId) {
        if !self.graph.contains_edge(from, to) {
            self.graph.add_edge(from, to, ());
        }
    }

    /// Register the implementation for the pairing of `on` with `other_name`.
    pub fn register_link_implementation(
        &mut self,
        on: NodeId,
        other_name: impl Into<String>,
        implementation: Arc<dyn LinkImplementation>,
    ) {
        self.graph[on]
            .link_implementations
            .insert(other_name.into(), implementation);
    }

    pub fn node(&self, id: NodeId) -> &ChainLinkNode {
        &self.graph[id]
    }

    pub fn find(&self, resource_name: &str) -> Option<NodeId> {
        self.node_map.get(resource_name).copied()
    }

    pub fn resource_name(&self, id: NodeId) -> &str {
        &self.graph[id].resource_name
    }

    /// Neighbours of `id` in `direction`, in the order the links were added.
    fn neighbours(&self, id: NodeId, direction: Direction) -> Vec<NodeId> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(id, direction)
            .map(|edge| {
                let other = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                (edge.id(), other)
            })
            .collect();
        edges.sort_by_key(|(edge, _)| *edge);
        edges.into_iter().map(|(_, other)| other).collect()
    }

    /// Resources `id` links to, in link order.
    pub fn links_to(&self, id: NodeId) -> Vec<NodeId> {
        self.neighbours(id, Direction::Outgoing)
    }

    /// Resources that link to `id`, in link order.
    pub fn linked_from(&self, id: NodeId) -> Vec<NodeId> {
        self.neighbours(id, Direction::Incoming)
    }

    /// Names of the resources `id` links to, in link order.
    pub fn outbound_names(&self, id: NodeId) -> Vec<&str> {
        self.links_to(id)
            .into_iter()
            .map(|other| self.resource_name(other))
            .collect()
    }

    /// Names of the resources that link to `id`, in link order.
    pub fn inbound_names(&self, id: NodeId) -> Vec<&str> {
        self.linked_from(id)
            .into_iter()
            .map(|other| self.resource_name(other))
            .collect()
    }

    /// Ids of all resources in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.node_indices()
    }

    /// Resources no other resource links to, the starting points of chains.
    pub fn roots(&self) -> Vec<NodeId> {
        self.node_ids()
            .filter(|&id| {
                self.graph
                    .neighbors_directed(id, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Look up the implementation for the link between `a` and `b`.
    ///
    /// The implementation may be registered on either endpoint, `a` is
    /// checked first.
    pub fn link_implementation(&self, a: NodeId, b: NodeId) -> Result<ResolvedLinkImplementation> {
        let node_a = self.node(a);
        let node_b = self.node(b);

        if let Some(implementation) = node_a.link_implementations.get(&node_b.resource_name) {
            return Ok(ResolvedLinkImplementation {
                implementation: Arc::clone(implementation),
                from_resource: node_a.resource_name.clone(),
            });
        }

        // The relationship could be either way.
        if let Some(implementation) = node_b.link_implementations.get(&node_a.resource_name) {
            return Ok(ResolvedLinkImplementation {
                implementation: Arc::clone(implementation),
                from_resource: node_b.resource_name.clone(),
            });
        }

        Err(StagingError::LinkImplementationMissing {
            resource_a: node_a.resource_name.clone(),
            resource_b: node_b.resource_name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLink;

    #[async_trait]
    impl LinkImplementation for FixedLink {
        async fn get_kind(&self) -> std::result::Result<LinkKind, ProviderError> {
            Ok(LinkKind::Hard)
        }

        async fn get_priority_resource(
            &self,
        ) -> std::result::Result<PriorityResource, ProviderError> {
            Ok(PriorityResource::B)
        }
    }

    #[test]
    fn test_add_resource_is_idempotent() {
        let mut graph = LinkGraph::new();
        let a = graph.add_resource("saveOrderFunction");
        let again = graph.add_resource("saveOrderFunction");
        assert_eq!(a, again);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_link_records_both_directions() {
        let mut graph = LinkGraph::new();
        let function = graph.add_resource("saveOrderFunction");
        let table = graph.add_resource("ordersTable");
        graph.link(function, table, Arc::new(FixedLink));

        assert_eq!(graph.outbound_names(function), vec!["ordersTable"]);
        assert_eq!(graph.inbound_names(table), vec!["saveOrderFunction"]);
        assert_eq!(graph.roots(), vec![function]);
    }

    #[test]
    fn test_links_keep_insertion_order() {
        let mut graph = LinkGraph::new();
        let api = graph.add_resource("ordersApi");
        let function = graph.add_resource("saveOrderFunction");
        let table = graph.add_resource("ordersTable");
        let queue = graph.add_resource("ordersQueue");
        graph.link(function, table, Arc::new(FixedLink));
        graph.link(function, queue, Arc::new(FixedLink));
        graph.link(api, function, Arc::new(FixedLink));
        graph.connect(function, table);

        assert_eq!(graph.links_to(function), vec![table, queue]);
        assert_eq!(graph.outbound_names(function), vec!["ordersTable", "ordersQueue"]);
        assert_eq!(graph.linked_from(function), vec![api]);
        assert_eq!(graph.roots(), vec![api]);
    }

    #[test]
    fn test_link_implementation_lookup_either_side() {
        let mut graph = LinkGraph::new();
        let function = graph.add_resource("saveOrderFunction");
        let table = graph.add_resource("ordersTable");
        graph.link(function, table, Arc::new(FixedLink));

        let forward = graph.link_implementation(function, table).unwrap();
        assert_eq!(forward.from_resource, "saveOrderFunction");

        let reverse = graph.link_implementation(table, function).unwrap();
        assert_eq!(reverse.from_resource, "saveOrderFunction");
    }

    #[test]
    fn test_missing_link_implementation() {
        let mut graph = LinkGraph::new();
        let function = graph.add_resource("saveOrderFunction");
        let table = graph.add_resource("ordersTable");
        graph.connect(function, table);

        let err = graph.link_implementation(function, table).err().unwrap();
        assert_eq!(
            err,
            StagingError::LinkImplementationMissing {
                resource_a: "saveOrderFunction".to_string(),
                resource_b: "ordersTable".to_string(),
            }
        );
    }
}
