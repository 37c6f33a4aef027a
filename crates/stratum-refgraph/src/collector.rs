//! Collects hard link dependencies from a link chain into reference chains.

use std::collections::HashSet;

use stratum_core::{element_id, logical_link_name, ElementKind, LinkKind, PriorityResource};
use stratum_core::{Result, StagingError};
use tracing::debug;

use crate::link_graph::{LinkGraph, NodeId};
use crate::reference::{link_tag, RefChainCollector};

/// Default depth limit for link chain traversal.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 256;

/// A resource whose outbound links are still being walked.
struct Frame {
    node: NodeId,
    links: Vec<NodeId>,
    next_link: usize,
    depth: usize,
}

/// Walks a link chain and records hard link dependencies.
pub struct LinkChainCollector<'g> {
    graph: &'g LinkGraph,
    max_depth: usize,
}

impl<'g> LinkChainCollector<'g> {
    pub fn new(graph: &'g LinkGraph) -> Self {
        Self {
            graph,
            max_depth: DEFAULT_MAX_CHAIN_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Collect the chain rooted at `root` into `collector`.
    ///
    /// Every resource reached is collected even if no hard link points at it.
    /// Each resource is expanded once, so raw link cycles terminate. Soft links
    /// are followed but never recorded.
    pub async fn collect(
        &self,
        root: NodeId,
        collector: &mut dyn RefChainCollector,
    ) -> Result<()> {
        let mut visited = HashSet::new();
        self.walk(root, collector, &mut visited).await
    }

    async fn walk(
        &self,
        root: NodeId,
        collector: &mut dyn RefChainCollector,
        visited: &mut HashSet<NodeId>,
    ) -> Result<()> {
        if !visited.insert(root) {
            return Ok(());
        }
        self.collect_resource(root, collector)?;
        let mut stack = vec![Frame {
            node: root,
            links: self.graph.links_to(root),
            next_link: 0,
            depth: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            let current = frame.node;
            let Some(&linked) = frame.links.get(frame.next_link) else {
                stack.pop();
                continue;
            };
            frame.next_link += 1;
            let depth = frame.depth + 1;

            self.collect_link(current, linked, collector).await?;

            if !visited.insert(linked) {
                continue;
            }

            if depth > self.max_depth {
                return Err(StagingError::ChainDepthExceeded {
                    resource: self.graph.resource_name(linked).to_string(),
                    max_depth: self.max_depth,
                });
            }

            stack.push(Frame {
                node: linked,
                links: self.graph.links_to(linked),
                next_link: 0,
                depth,
            });
        }

        Ok(())
    }

    fn collect_resource(&self, node: NodeId, collector: &mut dyn RefChainCollector) -> Result<()> {
        let resource_id = element_id(ElementKind::Resource, self.graph.resource_name(node));
        collector.collect(&resource_id, None, Vec::new())
    }

    async fn collect_link(
        &self,
        current: NodeId,
        linked: NodeId,
        collector: &mut dyn RefChainCollector,
    ) -> Result<()> {
        let current_name = self.graph.resource_name(current);
        let linked_name = self.graph.resource_name(linked);
        let resolved = self.graph.link_implementation(current, linked)?;
        let link_context = format!("link {}", logical_link_name(current_name, linked_name));

        let kind = resolved
            .implementation
            .get_kind()
            .await
            .map_err(|err| StagingError::provider(link_context.clone(), err))?;
        let priority = resolved
            .implementation
            .get_priority_resource()
            .await
            .map_err(|err| StagingError::provider(link_context, err))?;

        self.collect_resource(linked, collector)?;

        if kind != LinkKind::Hard {
            debug!(
                "Skipping soft link between {} and {} for ordering",
                current_name, linked_name
            );
            return Ok(());
        }

        // A and B refer to the resources as ordered by the implementation's
        // registration, which may be either end of the link.
        let linked_has_priority = (resolved.from_resource == linked_name
            && priority == PriorityResource::A)
            || (resolved.from_resource == current_name && priority == PriorityResource::B);

        let (dependency, dependent) = if linked_has_priority {
            (linked_name, current_name)
        } else {
            (current_name, linked_name)
        };

        let dependency_id = element_id(ElementKind::Resource, dependency);
        let dependent_id = element_id(ElementKind::Resource, dependent);
        if !collector.is_referenced_by(&dependency_id, &dependent_id) {
            debug!("Recording {} as referenced by {}", dependency_id, dependent_id);
            collector.collect(&dependency_id, Some(&dependent_id), vec![link_tag(&dependent_id)])?;
        }

        Ok(())
    }
}

/// Collect every chain in `graph`, starting from resources nothing links to.
///
/// Resources that only appear inside raw link cycles have no root, they are
/// walked from the first resource in the cycle that has not been visited.
/// A resource reachable from several roots is expanded once.
pub async fn collect_link_chains(
    graph: &LinkGraph,
    collector: &mut dyn RefChainCollector,
    max_depth: usize,
) -> Result<()> {
    let chain_collector = LinkChainCollector::new(graph).with_max_depth(max_depth);
    let mut visited = HashSet::new();
    for root in graph.roots() {
        chain_collector.walk(root, collector, &mut visited).await?;
    }

    for node in graph.node_ids() {
        if !visited.contains(&node) {
            chain_collector.walk(node, collector, &mut visited).await?;
        }
    }

    Ok(())
}
