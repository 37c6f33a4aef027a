//! Change staging state.
//!
//! One [`ChangeStagingState`] is created per staging operation and shared by
//! reference between the workers staging resources, links and children.
//! Fragments are owned by the state; link changes are written into the
//! owning resource's fragment in place. [`ChangeStagingState::extract_blueprint_changes`]
//! hands back an independent snapshot.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use stratum_core::{
    logical_link_name, qualify_field_path, BlueprintChanges, ChildChangesMessage,
    CollectedElements, ElementKind, ExportChanges, FieldChange, LinkChangesMessage,
    MetadataChanges, NewBlueprintDefinition, ResourceChanges, ResourceChangesMessage,
};
use stratum_refgraph::{LinkGraph, NodeId};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StagingConfig;
use crate::pending_links::{LinkPendingCompletion, PendingLinkTracker};
use crate::recreate::RecreationTracker;

#[derive(Debug, Default)]
struct StagedChanges {
    new_resources: HashMap<String, ResourceChanges>,
    resource_changes: HashMap<String, ResourceChanges>,
    removed_resources: Vec<String>,
    removed_links: Vec<String>,
    new_children: HashMap<String, NewBlueprintDefinition>,
    child_changes: HashMap<String, BlueprintChanges>,
    removed_children: Vec<String>,
    new_exports: HashMap<String, FieldChange>,
    export_changes: HashMap<String, FieldChange>,
    unchanged_exports: Vec<String>,
    removed_exports: Vec<String>,
    metadata_changes: Option<MetadataChanges>,
    resolve_on_deploy: Vec<String>,
    must_recreate: RecreationTracker,
}

impl StagedChanges {
    fn resource_fragment_mut(&mut self, resource_name: &str) -> Option<&mut ResourceChanges> {
        if self.new_resources.contains_key(resource_name) {
            return self.new_resources.get_mut(resource_name);
        }
        self.resource_changes.get_mut(resource_name)
    }

    fn resource_fragment(&self, resource_name: &str) -> Option<&ResourceChanges> {
        self.new_resources
            .get(resource_name)
            .or_else(|| self.resource_changes.get(resource_name))
    }
}

/// Accumulates the changes staged for one blueprint instance.
#[derive(Debug)]
pub struct ChangeStagingState {
    operation_id: Uuid,
    config: StagingConfig,
    changes: Mutex<StagedChanges>,
    pending_links: PendingLinkTracker,
}

impl Default for ChangeStagingState {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeStagingState {
    pub fn new() -> Self {
        Self::with_config(StagingConfig::default())
    }

    pub fn with_config(config: StagingConfig) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            config,
            changes: Mutex::new(StagedChanges::default()),
            pending_links: PendingLinkTracker::new(),
        }
    }

    /// Identifier of the staging operation this state belongs to.
    pub fn operation_id(&self) -> Uuid {
        self.operation_id
    }

    pub fn config(&self) -> &StagingConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, StagedChanges> {
        self.changes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Union a set of elements forced to recreate into the running set.
    pub fn add_elements_that_must_be_recreated(&self, must_recreate: &CollectedElements) {
        let mut changes = self.lock();
        let added = changes.must_recreate.merge(must_recreate);
        debug!(
            operation_id = %self.operation_id,
            added,
            total = changes.must_recreate.total(),
            "Merged elements that must be recreated"
        );
    }

    pub fn must_recreate_resource_on_removed_dependencies(&self, resource_name: &str) -> bool {
        self.lock().must_recreate.must_recreate_resource(resource_name)
    }

    /// Record the staged changes for a resource.
    ///
    /// New takes precedence over removed; anything else is an in-place update.
    pub fn apply_resource_changes(&self, message: ResourceChangesMessage) {
        let resolve_on_deploy: Vec<String> = message
            .changes
            .field_changes_known_on_deploy
            .iter()
            .map(|path| qualify_field_path(ElementKind::Resource, &message.resource_name, path))
            .collect();

        let mut changes = self.lock();
        if message.new {
            changes
                .new_resources
                .insert(message.resource_name, message.changes);
        } else if message.removed {
            changes.removed_resources.push(message.resource_name);
        } else {
            changes
                .resource_changes
                .insert(message.resource_name, message.changes);
        }
        changes.resolve_on_deploy.extend(resolve_on_deploy);
    }

    /// Record the staged changes for a link on its resource A fragment.
    ///
    /// Changes for a link whose resource A has no staged fragment are dropped.
    pub fn apply_link_changes(&self, message: LinkChangesMessage) {
        let link_name = logical_link_name(&message.resource_a_name, &message.resource_b_name);
        let mut changes = self.lock();

        if message.removed {
            changes.removed_links.push(link_name);
            return;
        }

        let resolve_on_deploy: Vec<String> = message
            .changes
            .field_changes_known_on_deploy
            .iter()
            .map(|path| qualify_field_path(ElementKind::Link, &link_name, path))
            .collect();

        let Some(fragment) = changes.resource_fragment_mut(&message.resource_a_name) else {
            debug!(
                operation_id = %self.operation_id,
                "No staged changes for {}, dropping changes for link {}",
                message.resource_a_name,
                link_name
            );
            return;
        };

        let outbound = if message.new {
            &mut fragment.new_outbound_links
        } else {
            &mut fragment.outbound_link_changes
        };
        outbound.insert(message.resource_b_name, message.changes);
        changes.resolve_on_deploy.extend(resolve_on_deploy);
    }

    /// Record the staged changes for a child blueprint.
    pub fn apply_child_changes(&self, message: ChildChangesMessage) {
        let mut changes = self.lock();
        if message.new {
            let definition = NewBlueprintDefinition {
                new_resources: message.changes.new_resources,
                new_children: message.changes.new_children,
                new_exports: message.changes.new_exports,
            };
            changes
                .new_children
                .insert(message.child_blueprint_name, definition);
        } else if message.removed {
            changes.removed_children.push(message.child_blueprint_name);
        } else {
            changes
                .child_changes
                .insert(message.child_blueprint_name, message.changes);
        }
    }

    /// Staged changes for a new or updated resource.
    pub fn get_resource_changes(&self, resource_name: &str) -> Option<ResourceChanges> {
        self.lock().resource_fragment(resource_name).cloned()
    }

    /// Replace the blueprint export changes.
    ///
    /// Paths in `resolve_on_deploy` are expected to be fully qualified already.
    pub fn update_export_changes(&self, exports: ExportChanges) {
        let mut changes = self.lock();
        changes.new_exports = exports.new_exports;
        changes.export_changes = exports.export_changes;
        changes.unchanged_exports = exports.unchanged_exports;
        changes.removed_exports = exports.removed_exports;
        changes.resolve_on_deploy.extend(exports.resolve_on_deploy);
    }

    /// Replace the blueprint metadata changes.
    pub fn update_metadata_changes(
        &self,
        metadata_changes: MetadataChanges,
        resolve_on_deploy: Vec<String>,
    ) {
        let mut changes = self.lock();
        changes.metadata_changes = Some(metadata_changes);
        changes.resolve_on_deploy.extend(resolve_on_deploy);
    }

    /// See [`PendingLinkTracker::update_link_staging_state`].
    pub fn update_link_staging_state(
        &self,
        graph: &LinkGraph,
        node: NodeId,
    ) -> Vec<LinkPendingCompletion> {
        self.pending_links.update_link_staging_state(graph, node)
    }

    pub fn mark_link_as_no_longer_pending(&self, resource_a: &str, resource_b: &str) {
        self.pending_links
            .mark_link_as_no_longer_pending(resource_a, resource_b);
    }

    pub fn count_pending_links(&self, resource_names: &[&str]) -> usize {
        self.pending_links.count_pending_links(resource_names)
    }

    /// Snapshot everything staged so far.
    pub fn extract_blueprint_changes(&self) -> BlueprintChanges {
        let changes = self.lock();

        let recreate_children: Vec<String> = changes
            .must_recreate
            .elements()
            .children()
            .iter()
            .filter(|child| changes.child_changes.contains_key(&child.child_name))
            .map(|child| child.child_name.clone())
            .collect();

        let mut child_changes = changes.child_changes.clone();
        if !self.config.include_recreated_children_in_child_changes {
            for child_name in &recreate_children {
                child_changes.remove(child_name);
            }
        }

        let resolve_on_deploy: Vec<String> = if self.config.dedupe_resolve_on_deploy {
            let mut seen = HashSet::new();
            changes
                .resolve_on_deploy
                .iter()
                .filter(|path| seen.insert(path.as_str()))
                .cloned()
                .collect()
        } else {
            changes.resolve_on_deploy.clone()
        };

        info!(
            operation_id = %self.operation_id,
            new_resources = changes.new_resources.len(),
            resource_changes = changes.resource_changes.len(),
            removed_resources = changes.removed_resources.len(),
            removed_links = changes.removed_links.len(),
            recreate_children = recreate_children.len(),
            "Extracted staged blueprint changes"
        );

        BlueprintChanges {
            new_resources: changes.new_resources.clone(),
            resource_changes: changes.resource_changes.clone(),
            removed_resources: changes.removed_resources.clone(),
            removed_links: changes.removed_links.clone(),
            new_children: changes.new_children.clone(),
            child_changes,
            recreate_children,
            removed_children: changes.removed_children.clone(),
            new_exports: changes.new_exports.clone(),
            export_changes: changes.export_changes.clone(),
            unchanged_exports: changes.unchanged_exports.clone(),
            removed_exports: changes.removed_exports.clone(),
            metadata_changes: changes.metadata_changes.clone().unwrap_or_default(),
            resolve_on_deploy,
        }
    }
}
