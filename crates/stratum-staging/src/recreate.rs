//! Elements that must be recreated because a dependency is being removed.

use stratum_core::{
    BlueprintChanges, ChildBlueprintIdInfo, CollectedElements, ElementIdentifier, ElementKind,
    ResourceIdInfo, Result,
};

use crate::instance::InstanceStateStore;

/// Running set of resources and children forced to recreate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecreationTracker {
    elements: CollectedElements,
}

impl RecreationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union `elements` into the set, returning how many were new.
    pub fn merge(&mut self, elements: &CollectedElements) -> usize {
        self.elements.merge(elements)
    }

    pub fn must_recreate_resource(&self, resource_name: &str) -> bool {
        self.elements.has_resource(resource_name)
    }

    pub fn must_recreate_child(&self, child_name: &str) -> bool {
        self.elements.has_child(child_name)
    }

    pub fn elements(&self) -> &CollectedElements {
        &self.elements
    }

    pub fn total(&self) -> usize {
        self.elements.total()
    }
}

/// Collect the candidates that directly depend on `dependee` in the deployed state.
///
/// `candidates` are the resources and children staged for deployment, link
/// candidates are ignored since nothing is recorded as depending on a link.
pub async fn find_dependents(
    dependee: &ElementIdentifier,
    candidates: &[ElementIdentifier],
    store: &dyn InstanceStateStore,
) -> Result<CollectedElements> {
    let mut dependents = CollectedElements::new();
    let dependee_name = dependee.logical_name();

    for candidate in candidates {
        match candidate {
            ElementIdentifier::Resource(info) => {
                let Some(state) = store.resource(&info.resource_name).await? else {
                    continue;
                };
                let depends = match dependee.kind() {
                    ElementKind::Resource => &state.depends_on_resources,
                    ElementKind::Child => &state.depends_on_children,
                    ElementKind::Link => continue,
                };
                if depends.iter().any(|name| name == dependee_name) {
                    dependents.add_resource(ResourceIdInfo::new(
                        state.resource_id,
                        info.resource_name.clone(),
                    ));
                }
            }
            ElementIdentifier::Child(info) => {
                let Some(state) = store.child(&info.child_name).await? else {
                    continue;
                };
                let depends = match dependee.kind() {
                    ElementKind::Resource => &state.depends_on_resources,
                    ElementKind::Child => &state.depends_on_children,
                    ElementKind::Link => continue,
                };
                if depends.iter().any(|name| name == dependee_name) {
                    dependents.add_child(ChildBlueprintIdInfo::new(
                        state.child_instance_id,
                        info.child_name.clone(),
                    ));
                }
            }
            ElementIdentifier::Link(_) => {}
        }
    }

    Ok(dependents)
}

/// Drop elements whose recreation is already planned in `changes`.
///
/// Resources are kept only if they have planned in-place changes; children
/// are kept unless they are already listed for recreation.
pub fn filter_out_recreated(
    search_in: &CollectedElements,
    changes: &BlueprintChanges,
) -> CollectedElements {
    let mut filtered = CollectedElements::new();

    for resource in search_in.resources() {
        let in_place = changes
            .resource_changes
            .get(&resource.resource_name)
            .is_some_and(|planned| !planned.must_recreate);
        if in_place {
            filtered.add_resource(resource.clone());
        }
    }

    for child in search_in.children() {
        if !changes.recreate_children.contains(&child.child_name) {
            filtered.add_child(child.clone());
        }
    }

    filtered
}
