//! Removal ordering and grouping.
//!
//! Elements being removed are first ordered so that every element comes
//! before the elements it depends on, then split into waves that can be
//! removed concurrently.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use stratum_core::{
    split_logical_link_name, CollectedElements, ElementIdentifier, ElementKind, Result,
    StagingError,
};
use stratum_refgraph::{RefChainCollector, ReferenceChainCollector, ReferenceSortDirection};
use tracing::{debug, info, warn};

use crate::instance::InstanceStateStore;

/// An element with every other element it depends on, directly or transitively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementWithAllDependencies {
    pub element: ElementIdentifier,
    pub all_dependencies: Vec<ElementIdentifier>,
    pub direct_dependencies: Vec<ElementIdentifier>,
}

impl ElementWithAllDependencies {
    pub fn new(element: impl Into<ElementIdentifier>) -> Self {
        Self {
            element: element.into(),
            all_dependencies: Vec::new(),
            direct_dependencies: Vec::new(),
        }
    }

    /// Set every dependency, direct or transitive. Grouping only reads these.
    pub fn with_dependencies(mut self, all_dependencies: Vec<ElementIdentifier>) -> Self {
        self.all_dependencies = all_dependencies;
        self
    }

    /// Set the dependencies recorded on the element itself.
    pub fn with_direct_dependencies(mut self, direct_dependencies: Vec<ElementIdentifier>) -> Self {
        self.direct_dependencies = direct_dependencies;
        self
    }

    /// Fully-qualified name of the element.
    pub fn name(&self) -> String {
        self.element.element_id()
    }

    /// True if `other` is one of this element's dependencies.
    pub fn depends_on(&self, other: &ElementIdentifier) -> bool {
        self.all_dependencies
            .iter()
            .any(|dependency| dependency.same_element(other))
    }
}

/// Order elements for removal, dependents before their dependencies.
///
/// Dependencies are read from the deployed state and restricted to the
/// elements being removed. Links depend on both of their resources.
pub async fn order_elements_for_removal(
    elements: &CollectedElements,
    store: &dyn InstanceStateStore,
) -> Result<Vec<ElementWithAllDependencies>> {
    let list: Vec<ElementIdentifier> = elements.iter().collect();

    let mut direct = Vec::with_capacity(list.len());
    for element in &list {
        direct.push(direct_dependencies(element, &list, store).await?);
    }

    let mut collector = ReferenceChainCollector::new();
    for (idx, element) in list.iter().enumerate() {
        let name = element.element_id();
        collector.collect(&name, None, Vec::new())?;
        for &dependency in &direct[idx] {
            collector.collect(&list[dependency].element_id(), Some(name.as_str()), Vec::new())?;
        }
    }

    let sorted = collector.topological_sort(ReferenceSortDirection::References)?;
    let positions: HashMap<String, usize> = list
        .iter()
        .enumerate()
        .map(|(idx, element)| (element.element_id(), idx))
        .collect();

    let ordered = sorted
        .iter()
        .filter_map(|name| positions.get(name).copied())
        .map(|idx| {
            ElementWithAllDependencies::new(list[idx].clone())
                .with_dependencies(
                    transitive_dependencies(idx, &direct)
                        .into_iter()
                        .map(|dependency| list[dependency].clone())
                        .collect(),
                )
                .with_direct_dependencies(
                    direct[idx]
                        .iter()
                        .map(|&dependency| list[dependency].clone())
                        .collect(),
                )
        })
        .collect();

    Ok(ordered)
}

async fn direct_dependencies(
    element: &ElementIdentifier,
    list: &[ElementIdentifier],
    store: &dyn InstanceStateStore,
) -> Result<Vec<usize>> {
    let (children, resources) = match element {
        ElementIdentifier::Resource(info) => match store.resource(&info.resource_name).await? {
            Some(state) => (state.depends_on_children, state.depends_on_resources),
            None => (Vec::new(), Vec::new()),
        },
        ElementIdentifier::Child(info) => match store.child(&info.child_name).await? {
            Some(state) => (state.depends_on_children, state.depends_on_resources),
            None => (Vec::new(), Vec::new()),
        },
        ElementIdentifier::Link(info) => {
            let (resource_a, resource_b) = split_logical_link_name(&info.link_name)?;
            (Vec::new(), vec![resource_a.to_string(), resource_b.to_string()])
        }
    };

    let find = |kind: ElementKind, name: &str| {
        list.iter()
            .position(|candidate| candidate.kind() == kind && candidate.logical_name() == name)
    };

    let mut dependencies = Vec::new();
    let named = children
        .iter()
        .map(|name| (ElementKind::Child, name))
        .chain(resources.iter().map(|name| (ElementKind::Resource, name)));
    for (kind, name) in named {
        if let Some(idx) = find(kind, name.as_str()) {
            if !dependencies.contains(&idx) {
                dependencies.push(idx);
            }
        }
    }

    Ok(dependencies)
}

/// Depth-first closure over direct dependencies, each element once.
fn transitive_dependencies(start: usize, direct: &[Vec<usize>]) -> Vec<usize> {
    let mut collected = Vec::new();
    let mut stack: Vec<usize> = direct[start].iter().rev().copied().collect();

    while let Some(idx) = stack.pop() {
        if collected.contains(&idx) {
            continue;
        }
        collected.push(idx);
        stack.extend(direct[idx].iter().rev().copied());
    }

    collected
}

/// Split elements into removal waves.
///
/// Every element is placed in a later wave than all of its dependents, so a
/// wave can be removed once all earlier waves have been. The input order is
/// kept where dependencies allow it; a new wave starts when the next element
/// is a dependency of a member of the current wave.
pub fn group_elements_for_removal(
    elements: &[ElementWithAllDependencies],
) -> Result<Vec<Vec<ElementIdentifier>>> {
    let order = dependents_first_order(elements)?;

    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    for idx in order {
        let blocked = current
            .iter()
            .any(|&member| elements[member].depends_on(&elements[idx].element));
        if blocked {
            groups.push(std::mem::take(&mut current));
        }
        current.push(idx);
    }
    if !current.is_empty() {
        groups.push(current);
    }

    info!(
        "Grouped {} elements into {} removal groups",
        elements.len(),
        groups.len()
    );

    Ok(groups
        .into_iter()
        .map(|group| {
            group
                .into_iter()
                .map(|idx| elements[idx].element.clone())
                .collect()
        })
        .collect())
}

/// Stable reordering where no element precedes one of its dependents.
fn dependents_first_order(elements: &[ElementWithAllDependencies]) -> Result<Vec<usize>> {
    let dependents: Vec<Vec<usize>> = elements
        .iter()
        .map(|element| {
            elements
                .iter()
                .enumerate()
                .filter(|(_, other)| other.depends_on(&element.element))
                .map(|(idx, _)| idx)
                .collect()
        })
        .collect();

    let mut placed = vec![false; elements.len()];
    let mut order = Vec::with_capacity(elements.len());

    while order.len() < elements.len() {
        let next = (0..elements.len()).find(|&idx| {
            !placed[idx] && dependents[idx].iter().all(|&dependent| placed[dependent])
        });

        let Some(idx) = next else {
            let remaining: Vec<String> = (0..elements.len())
                .filter(|&idx| !placed[idx])
                .map(|idx| elements[idx].name())
                .collect();
            warn!(
                "Removal grouping made no progress with {} elements left",
                remaining.len()
            );
            return Err(StagingError::RemovalGroupingStalled { remaining });
        };

        debug!("Placing {} in removal order", elements[idx].name());
        placed[idx] = true;
        order.push(idx);
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use stratum_core::{ChildBlueprintIdInfo, LinkIdInfo, ResourceIdInfo};

    use super::*;
    use crate::instance::{ChildState, InMemoryInstanceState, ResourceState};

    fn resource(name: &str) -> ElementIdentifier {
        ResourceIdInfo::new(format!("{name}-id"), name).into()
    }

    fn child(name: &str) -> ElementIdentifier {
        ChildBlueprintIdInfo::new(format!("{name}-id"), name).into()
    }

    fn link(name: &str) -> ElementIdentifier {
        LinkIdInfo::new(format!("{name}-id"), name).into()
    }

    fn names(groups: &[Vec<ElementIdentifier>]) -> Vec<Vec<String>> {
        groups
            .iter()
            .map(|group| group.iter().map(|e| e.logical_name().to_string()).collect())
            .collect()
    }

    fn orders_fixture() -> Vec<ElementWithAllDependencies> {
        let link_deps = |table: &str| {
            vec![
                resource("saveOrderFunction"),
                resource(table),
                resource("preprocessOrderFunction"),
                child("coreInfra"),
                child("networking"),
            ]
        };

        vec![
            ElementWithAllDependencies::new(link("saveOrderFunction::ordersTable_0"))
                .with_dependencies(link_deps("ordersTable_0")),
            ElementWithAllDependencies::new(link("saveOrderFunction::ordersTable_1"))
                .with_dependencies(link_deps("ordersTable_1")),
            ElementWithAllDependencies::new(resource("ordersTable_0")),
            ElementWithAllDependencies::new(resource("ordersTable_1")),
            ElementWithAllDependencies::new(resource("saveOrderFunction")).with_dependencies(vec![
                resource("preprocessOrderFunction"),
                child("coreInfra"),
                child("networking"),
            ]),
            ElementWithAllDependencies::new(resource("invoicesTable")),
            ElementWithAllDependencies::new(child("coreInfra"))
                .with_dependencies(vec![child("networking"), resource("preprocessOrderFunction")]),
            ElementWithAllDependencies::new(child("networking")),
            ElementWithAllDependencies::new(resource("preprocessOrderFunction")),
        ]
    }

    /// Every dependent of an element sits in an earlier group.
    fn assert_dependents_first(
        elements: &[ElementWithAllDependencies],
        groups: &[Vec<ElementIdentifier>],
    ) {
        let group_of = |target: &ElementIdentifier| {
            groups
                .iter()
                .position(|group| group.iter().any(|e| e.same_element(target)))
                .unwrap()
        };
        for element in elements {
            for dependency in &element.all_dependencies {
                if elements.iter().any(|e| e.element.same_element(dependency)) {
                    assert!(group_of(&element.element) < group_of(dependency));
                }
            }
        }
    }

    #[test]
    fn test_group_orders_fixture() {
        let elements = orders_fixture();
        let groups = group_elements_for_removal(&elements).unwrap();

        assert_eq!(
            names(&groups),
            vec![
                vec![
                    "saveOrderFunction::ordersTable_0",
                    "saveOrderFunction::ordersTable_1"
                ],
                vec![
                    "ordersTable_0",
                    "ordersTable_1",
                    "saveOrderFunction",
                    "invoicesTable"
                ],
                vec!["coreInfra"],
                vec!["networking", "preprocessOrderFunction"],
            ]
        );
        assert_dependents_first(&elements, &groups);
    }

    #[test]
    fn test_groups_cover_input_once() {
        let elements = orders_fixture();
        let groups = group_elements_for_removal(&elements).unwrap();

        let placed: Vec<String> = groups.iter().flatten().map(|e| e.element_id()).collect();
        let unique: HashSet<&String> = placed.iter().collect();
        assert_eq!(placed.len(), elements.len());
        assert_eq!(unique.len(), elements.len());
    }

    #[test]
    fn test_dependency_listed_before_dependent_is_moved() {
        let elements = vec![
            ElementWithAllDependencies::new(resource("ordersTable")),
            ElementWithAllDependencies::new(resource("saveOrderFunction"))
                .with_dependencies(vec![resource("ordersTable")]),
            ElementWithAllDependencies::new(resource("auditLog")),
        ];

        let groups = group_elements_for_removal(&elements).unwrap();
        assert_eq!(
            names(&groups),
            vec![vec!["saveOrderFunction"], vec!["ordersTable", "auditLog"]]
        );
        assert_dependents_first(&elements, &groups);
    }

    #[test]
    fn test_isolated_elements_share_a_group() {
        let elements = vec![
            ElementWithAllDependencies::new(resource("a")),
            ElementWithAllDependencies::new(resource("b")),
        ];
        let groups = group_elements_for_removal(&elements).unwrap();
        assert_eq!(names(&groups), vec![vec!["a", "b"]]);
        assert!(group_elements_for_removal(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_cyclic_dependencies_stall() {
        let elements = vec![
            ElementWithAllDependencies::new(resource("a")).with_dependencies(vec![resource("b")]),
            ElementWithAllDependencies::new(resource("b")).with_dependencies(vec![resource("a")]),
            ElementWithAllDependencies::new(resource("c")),
        ];

        let err = group_elements_for_removal(&elements).unwrap_err();
        assert_eq!(
            err,
            StagingError::RemovalGroupingStalled {
                remaining: vec!["resources.a".to_string(), "resources.b".to_string()]
            }
        );
        assert!(err.is_fatal());
    }

    fn removal_state() -> InMemoryInstanceState {
        InMemoryInstanceState::new()
            .with_resource(
                ResourceState::new("a1-id", "resourceA1")
                    .depends_on_resource("resourceA2")
                    .depends_on_resource("resourceA3"),
            )
            .with_resource(
                ResourceState::new("a2-id", "resourceA2")
                    .depends_on_child("childA1")
                    .depends_on_resource("resourceA5"),
            )
            .with_resource(ResourceState::new("a3-id", "resourceA3").depends_on_resource("resourceA6"))
            .with_resource(ResourceState::new("a5-id", "resourceA5"))
            .with_resource(ResourceState::new("a6-id", "resourceA6"))
            .with_child(ChildState::new("c1-id", "childA1"))
    }

    fn removal_elements() -> CollectedElements {
        [
            resource("resourceA1"),
            resource("resourceA2"),
            resource("resourceA3"),
            resource("resourceA5"),
            resource("resourceA6"),
            child("childA1"),
            link("resourceA1::resourceA2"),
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn test_order_elements_for_removal() {
        let store = removal_state();
        let ordered = order_elements_for_removal(&removal_elements(), &store)
            .await
            .unwrap();

        let order: Vec<String> = ordered.iter().map(|e| e.name()).collect();
        assert_eq!(
            order,
            vec![
                "links.resourceA1::resourceA2",
                "resources.resourceA1",
                "resources.resourceA2",
                "resources.resourceA3",
                "children.childA1",
                "resources.resourceA5",
                "resources.resourceA6",
            ]
        );

        let link_deps: Vec<String> = ordered[0]
            .all_dependencies
            .iter()
            .map(|e| e.element_id())
            .collect();
        assert_eq!(
            link_deps,
            vec![
                "resources.resourceA1",
                "resources.resourceA2",
                "children.childA1",
                "resources.resourceA5",
                "resources.resourceA3",
                "resources.resourceA6",
            ]
        );
        assert_eq!(ordered[0].direct_dependencies.len(), 2);

        let function_direct: Vec<String> = ordered[1]
            .direct_dependencies
            .iter()
            .map(|e| e.element_id())
            .collect();
        assert_eq!(
            function_direct,
            vec!["resources.resourceA2", "resources.resourceA3"]
        );
        assert_eq!(ordered[1].all_dependencies.len(), 5);
        assert!(ordered[1].depends_on(&resource("resourceA6")));
    }

    #[test]
    fn test_direct_dependencies_are_kept_apart() {
        let element = ElementWithAllDependencies::new(resource("saveOrderFunction"))
            .with_dependencies(vec![resource("ordersTable"), child("coreInfra")])
            .with_direct_dependencies(vec![resource("ordersTable")]);

        assert_eq!(element.direct_dependencies, vec![resource("ordersTable")]);
        assert_eq!(element.all_dependencies.len(), 2);
        assert!(element.depends_on(&child("coreInfra")));
    }

    #[tokio::test]
    async fn test_order_then_group_for_removal() {
        let store = removal_state();
        let ordered = order_elements_for_removal(&removal_elements(), &store)
            .await
            .unwrap();
        let groups = group_elements_for_removal(&ordered).unwrap();

        assert_eq!(
            names(&groups),
            vec![
                vec!["resourceA1::resourceA2"],
                vec!["resourceA1"],
                vec!["resourceA2", "resourceA3"],
                vec!["childA1", "resourceA5", "resourceA6"],
            ]
        );
        assert_dependents_first(&ordered, &groups);
    }

    #[tokio::test]
    async fn test_order_fails_on_circular_state() {
        let store = InMemoryInstanceState::new()
            .with_resource(ResourceState::new("a-id", "a").depends_on_resource("b"))
            .with_resource(ResourceState::new("b-id", "b").depends_on_resource("a"));
        let elements: CollectedElements = [resource("a"), resource("b")].into_iter().collect();

        let err = order_elements_for_removal(&elements, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, StagingError::CircularReferences { .. }));
    }
}
