//! Reference chains.
//!
//! A reference chain records, for every collected element, the elements it
//! references and the elements that reference it. Chains are used to detect
//! cycles and to order elements for deployment or removal.

use std::collections::{HashMap, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use stratum_core::{Result, StagingError};

/// Tag prefix for references induced by a hard link.
pub const LINK_TAG_PREFIX: &str = "link:";

/// Creates the tag for a reference that comes from a link with `referenced_by`.
pub fn link_tag(referenced_by: &str) -> String {
    format!("{LINK_TAG_PREFIX}{referenced_by}")
}

/// A node in a set of reference chains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceChainNode {
    /// Unique name of the element, e.g. `resources.ordersTable`.
    pub element_name: String,
    /// Elements this element references (its dependencies).
    pub references: Vec<String>,
    /// Elements that reference this element (its dependents).
    pub referenced_by: Vec<String>,
    /// Tags describing why references were made.
    pub tags: Vec<String>,
}

impl ReferenceChainNode {
    pub fn is_referenced_by(&self, referrer: &str) -> bool {
        self.referenced_by.iter().any(|r| r == referrer)
    }
}

/// Direction used when sorting reference chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceSortDirection {
    /// Elements come before the elements they reference (removal order).
    References,
    /// Elements come after the elements they reference (deployment order).
    ReferencedBy,
}

/// Collects references between elements.
pub trait RefChainCollector: Send {
    /// Add `element_name` to the chains, optionally as referenced by `referenced_by`.
    ///
    /// A referrer must have been collected before it can be named.
    fn collect(&mut self, element_name: &str, referenced_by: Option<&str>, tags: Vec<String>)
        -> Result<()>;

    /// Look up the chain node for an element.
    fn chain(&self, element_name: &str) -> Option<ReferenceChainNode>;

    /// Returns true if `element_name` has already been recorded as referenced by `referrer`.
    fn is_referenced_by(&self, element_name: &str, referrer: &str) -> bool {
        self.chain(element_name)
            .is_some_and(|node| node.is_referenced_by(referrer))
    }

    /// Nodes that are part of a reference cycle, each reported once.
    fn find_circular_references(&self) -> Vec<ReferenceChainNode>;
}

/// A collected element. Edges point from an element to the elements it references.
#[derive(Debug, Clone)]
struct ChainElement {
    element_name: String,
    tags: Vec<String>,
}

/// Default reference chain collector backed by a [`DiGraph`].
#[derive(Debug, Default)]
pub struct ReferenceChainCollector {
    graph: DiGraph<ChainElement, ()>,
    node_map: HashMap<String, NodeIndex>,
}

impl ReferenceChainCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_node(&mut self, element_name: &str) -> NodeIndex {
        if let Some(&index) = self.node_map.get(element_name) {
            return index;
        }
        let index = self.graph.add_node(ChainElement {
            element_name: element_name.to_string(),
            tags: Vec::new(),
        });
        self.node_map.insert(element_name.to_string(), index);
        index
    }

    /// Neighbours of `index` in `direction`, in the order they were collected.
    fn neighbours(&self, index: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(index, direction)
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

    fn names(&self, indices: Vec<NodeIndex>) -> Vec<String> {
        indices
            .into_iter()
            .map(|index| self.graph[index].element_name.clone())
            .collect()
    }

    fn chain_node(&self, index: NodeIndex) -> ReferenceChainNode {
        let element = &self.graph[index];
        ReferenceChainNode {
            element_name: element.element_name.clone(),
            references: self.names(self.neighbours(index, Direction::Outgoing)),
            referenced_by: self.names(self.neighbours(index, Direction::Incoming)),
            tags: element.tags.clone(),
        }
    }

    /// All collected nodes in collection order.
    pub fn nodes(&self) -> Vec<ReferenceChainNode> {
        self.graph
            .node_indices()
            .map(|index| self.chain_node(index))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Nodes that no other element references.
    pub fn leaf_dependents(&self) -> Vec<ReferenceChainNode> {
        self.graph
            .node_indices()
            .filter(|&index| {
                self.graph
                    .neighbors_directed(index, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|index| self.chain_node(index))
            .collect()
    }

    /// Sort all collected elements, keeping collection order between peers.
    ///
    /// Kahn's algorithm over the graph, seeded and expanded in collection
    /// order so equal-rank elements keep a deterministic order.
    pub fn topological_sort(&self, direction: ReferenceSortDirection) -> Result<Vec<String>> {
        let (incoming, outgoing) = match direction {
            ReferenceSortDirection::References => (Direction::Incoming, Direction::Outgoing),
            ReferenceSortDirection::ReferencedBy => (Direction::Outgoing, Direction::Incoming),
        };

        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|index| self.graph.edges_directed(index, incoming).count())
            .collect();

        let mut ready: VecDeque<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|index| in_degree[index.index()] == 0)
            .collect();

        let mut sorted = Vec::with_capacity(self.graph.node_count());
        while let Some(index) = ready.pop_front() {
            sorted.push(self.graph[index].element_name.clone());

            for next in self.neighbours(index, outgoing) {
                in_degree[next.index()] -= 1;
                if in_degree[next.index()] == 0 {
                    ready.push_back(next);
                }
            }
        }

        if sorted.len() < self.graph.node_count() {
            let elements = self
                .graph
                .node_indices()
                .filter(|index| in_degree[index.index()] > 0)
                .map(|index| self.graph[index].element_name.clone())
                .collect();
            return Err(StagingError::CircularReferences { elements });
        }

        Ok(sorted)
    }
}

impl RefChainCollector for ReferenceChainCollector {
    fn collect(
        &mut self,
        element_name: &str,
        referenced_by: Option<&str>,
        tags: Vec<String>,
    ) -> Result<()> {
        let parent = match referenced_by {
            Some(referrer) => match self.node_map.get(referrer) {
                Some(&index) => Some(index),
                None => {
                    return Err(StagingError::UnknownReferrer {
                        element: element_name.to_string(),
                        referenced_by: referrer.to_string(),
                    })
                }
            },
            None => None,
        };

        let index = self.ensure_node(element_name);
        let element = &mut self.graph[index];
        for tag in tags {
            if !element.tags.contains(&tag) {
                element.tags.push(tag);
            }
        }

        if let Some(parent) = parent {
            if !self.graph.contains_edge(parent, index) {
                self.graph.add_edge(parent, index, ());
            }
        }

        Ok(())
    }

    fn chain(&self, element_name: &str) -> Option<ReferenceChainNode> {
        self.node_map
            .get(element_name)
            .map(|&index| self.chain_node(index))
    }

    fn is_referenced_by(&self, element_name: &str, referrer: &str) -> bool {
        match (self.node_map.get(element_name), self.node_map.get(referrer)) {
            (Some(&element), Some(&referrer)) => self.graph.contains_edge(referrer, element),
            _ => false,
        }
    }

    fn find_circular_references(&self) -> Vec<ReferenceChainNode> {
        let mut on_cycle: Vec<NodeIndex> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| match component.as_slice() {
                [single] => self.graph.contains_edge(*single, *single),
                _ => true,
            })
            .flatten()
            .collect();
        on_cycle.sort();

        on_cycle
            .into_iter()
            .map(|index| self.chain_node(index))
            .collect()
    }
}
