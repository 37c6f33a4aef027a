//! Pending link completion tracking.
//!
//! Resources sharing a link may be staged on different workers. The tracker
//! records which endpoints of each link have been staged so the link itself
//! is staged once, after both of its resources.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use stratum_core::logical_link_name;
use stratum_refgraph::{LinkGraph, NodeId};
use tracing::debug;

/// Completion state of a single link, keyed by its logical name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkPendingCompletion {
    pub resource_a_name: String,
    pub resource_b_name: String,
    /// True until resource A has been staged.
    pub resource_a_pending: bool,
    /// True until resource B has been staged.
    pub resource_b_pending: bool,
    /// True until the link's own changes have been staged.
    pub link_pending: bool,
    #[serde(skip)]
    reported: bool,
}

impl LinkPendingCompletion {
    fn new(resource_a_name: &str, resource_b_name: &str, staged: &str) -> Self {
        Self {
            resource_a_name: resource_a_name.to_string(),
            resource_b_name: resource_b_name.to_string(),
            resource_a_pending: resource_a_name != staged,
            resource_b_pending: resource_b_name != staged,
            link_pending: true,
            reported: false,
        }
    }

    /// Logical name in the form `resourceA::resourceB`.
    pub fn link_name(&self) -> String {
        logical_link_name(&self.resource_a_name, &self.resource_b_name)
    }

    /// Both endpoints have been staged.
    pub fn endpoints_staged(&self) -> bool {
        !self.resource_a_pending && !self.resource_b_pending
    }

    fn mark_staged(&mut self, resource_name: &str) {
        if self.resource_a_name == resource_name {
            self.resource_a_pending = false;
        } else if self.resource_b_name == resource_name {
            self.resource_b_pending = false;
        }
    }
}

#[derive(Debug, Default)]
struct PendingLinks {
    links: HashMap<String, LinkPendingCompletion>,
    /// Resource name -> logical names of the links touching it.
    resource_links: HashMap<String, Vec<String>>,
}

impl PendingLinks {
    fn register(&mut self, resource_a: &str, resource_b: &str, staged: &str) {
        let link_name = logical_link_name(resource_a, resource_b);
        if self.links.contains_key(&link_name) {
            return;
        }

        self.links.insert(
            link_name.clone(),
            LinkPendingCompletion::new(resource_a, resource_b, staged),
        );
        for resource in [resource_a, resource_b] {
            let names = self.resource_links.entry(resource.to_string()).or_default();
            if !names.contains(&link_name) {
                names.push(link_name.clone());
            }
        }
    }
}

/// Lock-guarded registry of link completion states.
#[derive(Debug, Default)]
pub struct PendingLinkTracker {
    inner: Mutex<PendingLinks>,
}

impl PendingLinkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PendingLinks> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record that the resource at `node` has been staged.
    ///
    /// Returns the links that became ready to stage as a result, each link is
    /// returned by exactly one call.
    pub fn update_link_staging_state(
        &self,
        graph: &LinkGraph,
        node: NodeId,
    ) -> Vec<LinkPendingCompletion> {
        self.update_resource(
            graph.resource_name(node),
            &graph.outbound_names(node),
            &graph.inbound_names(node),
        )
    }

    /// Name based form of [`Self::update_link_staging_state`].
    ///
    /// `links_to` are the resources `resource_name` links to and
    /// `linked_from` the resources linking to it.
    pub fn update_resource(
        &self,
        resource_name: &str,
        links_to: &[&str],
        linked_from: &[&str],
    ) -> Vec<LinkPendingCompletion> {
        let mut pending = self.lock();

        // Links registered by earlier calls for the other endpoint.
        let previously_registered = pending
            .resource_links
            .get(resource_name)
            .cloned()
            .unwrap_or_default();

        for &linked in links_to {
            pending.register(resource_name, linked, resource_name);
        }
        for &linking in linked_from {
            pending.register(linking, resource_name, resource_name);
        }

        let mut ready = Vec::new();
        for link_name in previously_registered {
            let Some(link) = pending.links.get_mut(&link_name) else {
                continue;
            };
            link.mark_staged(resource_name);
            if link.endpoints_staged() && !link.reported {
                link.reported = true;
                debug!("Link {} is ready to be staged", link_name);
                ready.push(link.clone());
            }
        }

        ready
    }

    /// Record that the changes for the link from `resource_a` to `resource_b`
    /// have been staged. Unknown links are ignored.
    pub fn mark_link_as_no_longer_pending(&self, resource_a: &str, resource_b: &str) {
        let link_name = logical_link_name(resource_a, resource_b);
        let mut pending = self.lock();
        match pending.links.get_mut(&link_name) {
            Some(link) => link.link_pending = false,
            None => debug!("Ignoring completion of unregistered link {}", link_name),
        }
    }

    /// Count links touching the given resources whose own changes are still
    /// pending. A link touching two of the resources is counted for each.
    pub fn count_pending_links(&self, resource_names: &[&str]) -> usize {
        let pending = self.lock();
        resource_names
            .iter()
            .filter_map(|name| pending.resource_links.get(*name))
            .flatten()
            .filter(|link_name| {
                pending
                    .links
                    .get(*link_name)
                    .is_some_and(|link| link.link_pending)
            })
            .count()
    }

    /// Current state of a link, if registered.
    pub fn link(&self, resource_a: &str, resource_b: &str) -> Option<LinkPendingCompletion> {
        self.lock()
            .links
            .get(&logical_link_name(resource_a, resource_b))
            .cloned()
    }
}
