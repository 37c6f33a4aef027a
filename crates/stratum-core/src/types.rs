//! Common types used across Stratum change staging.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StagingError};

/// Separator between the two resource names of a logical link name.
pub const LINK_NAME_SEPARATOR: &str = "::";

/// Whether a link imposes an ordering constraint between its resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// The priority resource must exist before the other side.
    Hard,
    /// No ordering constraint.
    Soft,
}

/// Which side of a link is authoritative for ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityResource {
    /// The resource the link implementation names first.
    A,
    /// The resource the link implementation names second.
    B,
}

/// Kind of a blueprint element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Resource,
    Child,
    Link,
}

impl ElementKind {
    /// Prefix used for fully-qualified element paths.
    pub fn path_prefix(&self) -> &'static str {
        match self {
            ElementKind::Resource => "resources",
            ElementKind::Child => "children",
            ElementKind::Link => "links",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Resource => write!(f, "resource"),
            ElementKind::Child => write!(f, "child"),
            ElementKind::Link => write!(f, "link"),
        }
    }
}

/// Builds the logical name for the link from `resource_a` to `resource_b`.
///
/// The order of the names is significant, the result is used as a lookup key.
pub fn logical_link_name(resource_a: &str, resource_b: &str) -> String {
    format!("{resource_a}{LINK_NAME_SEPARATOR}{resource_b}")
}

/// Splits a logical link name back into its two resource names.
pub fn split_logical_link_name(link_name: &str) -> Result<(&str, &str)> {
    let mut parts = link_name.split(LINK_NAME_SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) if !a.is_empty() && !b.is_empty() => Ok((a, b)),
        _ => Err(StagingError::InvalidLogicalLinkName {
            name: link_name.to_string(),
        }),
    }
}

/// Fully-qualified identifier of an element, e.g. `resources.ordersTable`.
pub fn element_id(kind: ElementKind, logical_name: &str) -> String {
    format!("{}.{}", kind.path_prefix(), logical_name)
}

/// Qualifies a field path reported by a resource, link or child.
///
/// Array index suffixes such as `[0].name` attach without a separating dot.
pub fn qualify_field_path(kind: ElementKind, logical_name: &str, field_path: &str) -> String {
    let element = element_id(kind, logical_name);
    if field_path.starts_with('[') {
        format!("{element}{field_path}")
    } else {
        format!("{element}.{field_path}")
    }
}

/// Identity of a resource element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIdInfo {
    pub resource_id: String,
    pub resource_name: String,
}

impl ResourceIdInfo {
    pub fn new(resource_id: impl Into<String>, resource_name: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            resource_name: resource_name.into(),
        }
    }
}

/// Identity of a child blueprint element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildBlueprintIdInfo {
    pub child_instance_id: String,
    pub child_name: String,
}

impl ChildBlueprintIdInfo {
    pub fn new(child_instance_id: impl Into<String>, child_name: impl Into<String>) -> Self {
        Self {
            child_instance_id: child_instance_id.into(),
            child_name: child_name.into(),
        }
    }
}

/// Identity of a link element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkIdInfo {
    pub link_id: String,
    /// Logical name in the form `resourceA::resourceB`.
    pub link_name: String,
}

impl LinkIdInfo {
    pub fn new(link_id: impl Into<String>, link_name: impl Into<String>) -> Self {
        Self {
            link_id: link_id.into(),
            link_name: link_name.into(),
        }
    }
}

/// A discriminated identity for any element kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementIdentifier {
    Resource(ResourceIdInfo),
    Child(ChildBlueprintIdInfo),
    Link(LinkIdInfo),
}

impl ElementIdentifier {
    pub fn kind(&self) -> ElementKind {
        match self {
            ElementIdentifier::Resource(_) => ElementKind::Resource,
            ElementIdentifier::Child(_) => ElementKind::Child,
            ElementIdentifier::Link(_) => ElementKind::Link,
        }
    }

    /// Name of the element within its blueprint.
    pub fn logical_name(&self) -> &str {
        match self {
            ElementIdentifier::Resource(info) => &info.resource_name,
            ElementIdentifier::Child(info) => &info.child_name,
            ElementIdentifier::Link(info) => &info.link_name,
        }
    }

    /// Durable ID of the element.
    pub fn id(&self) -> &str {
        match self {
            ElementIdentifier::Resource(info) => &info.resource_id,
            ElementIdentifier::Child(info) => &info.child_instance_id,
            ElementIdentifier::Link(info) => &info.link_id,
        }
    }

    /// Fully-qualified name, unique across element kinds.
    pub fn element_id(&self) -> String {
        element_id(self.kind(), self.logical_name())
    }

    /// True if both identify the same element by kind and logical name.
    pub fn same_element(&self, other: &ElementIdentifier) -> bool {
        self.kind() == other.kind() && self.logical_name() == other.logical_name()
    }
}

impl From<ResourceIdInfo> for ElementIdentifier {
    fn from(info: ResourceIdInfo) -> Self {
        ElementIdentifier::Resource(info)
    }
}

impl From<ChildBlueprintIdInfo> for ElementIdentifier {
    fn from(info: ChildBlueprintIdInfo) -> Self {
        ElementIdentifier::Child(info)
    }
}

impl From<LinkIdInfo> for ElementIdentifier {
    fn from(info: LinkIdInfo) -> Self {
        ElementIdentifier::Link(info)
    }
}

impl fmt::Display for ElementIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.element_id())
    }
}

/// An order-preserving set of collected elements.
///
/// Resources, children and links are unique by logical name within their kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedElements {
    resources: Vec<ResourceIdInfo>,
    children: Vec<ChildBlueprintIdInfo>,
    links: Vec<LinkIdInfo>,
    total: usize,
}

impl CollectedElements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resources(&self) -> &[ResourceIdInfo] {
        &self.resources
    }

    pub fn children(&self) -> &[ChildBlueprintIdInfo] {
        &self.children
    }

    pub fn links(&self) -> &[LinkIdInfo] {
        &self.links
    }

    /// Running count of all collected elements.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn has_resource(&self, resource_name: &str) -> bool {
        self.resources
            .iter()
            .any(|r| r.resource_name == resource_name)
    }

    pub fn has_child(&self, child_name: &str) -> bool {
        self.children.iter().any(|c| c.child_name == child_name)
    }

    pub fn has_link(&self, link_name: &str) -> bool {
        self.links.iter().any(|l| l.link_name == link_name)
    }

    /// Adds a resource unless one with the same name is present.
    ///
    /// Returns true if the resource was added.
    pub fn add_resource(&mut self, resource: ResourceIdInfo) -> bool {
        if self.has_resource(&resource.resource_name) {
            return false;
        }
        self.resources.push(resource);
        self.total += 1;
        true
    }

    /// Adds a child unless one with the same name is present.
    pub fn add_child(&mut self, child: ChildBlueprintIdInfo) -> bool {
        if self.has_child(&child.child_name) {
            return false;
        }
        self.children.push(child);
        self.total += 1;
        true
    }

    /// Adds a link unless one with the same logical name is present.
    pub fn add_link(&mut self, link: LinkIdInfo) -> bool {
        if self.has_link(&link.link_name) {
            return false;
        }
        self.links.push(link);
        self.total += 1;
        true
    }

    /// Adds any element kind, de-duplicating by logical name.
    pub fn add(&mut self, element: ElementIdentifier) -> bool {
        match element {
            ElementIdentifier::Resource(info) => self.add_resource(info),
            ElementIdentifier::Child(info) => self.add_child(info),
            ElementIdentifier::Link(info) => self.add_link(info),
        }
    }

    /// Merges another set into this one, keeping first occurrences.
    ///
    /// Returns the number of elements that were not already present.
    pub fn merge(&mut self, other: &CollectedElements) -> usize {
        other
            .iter()
            .map(|element| usize::from(self.add(element)))
            .sum()
    }

    /// Iterates resources, then children, then links.
    pub fn iter(&self) -> impl Iterator<Item = ElementIdentifier> + '_ {
        self.resources
            .iter()
            .cloned()
            .map(ElementIdentifier::from)
            .chain(self.children.iter().cloned().map(ElementIdentifier::from))
            .chain(self.links.iter().cloned().map(ElementIdentifier::from))
    }
}

impl FromIterator<ElementIdentifier> for CollectedElements {
    fn from_iter<T: IntoIterator<Item = ElementIdentifier>>(iter: T) -> Self {
        let mut collected = CollectedElements::new();
        for element in iter {
            collected.add(element);
        }
        collected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_enums_share_wire_casing() {
        assert_eq!(serde_json::to_string(&LinkKind::Hard).unwrap(), r#""hard""#);
        assert_eq!(serde_json::to_string(&PriorityResource::A).unwrap(), r#""a""#);
        let priority: PriorityResource = serde_json::from_str(r#""b""#).unwrap();
        assert_eq!(priority, PriorityResource::B);
    }

    #[test]
    fn test_logical_link_name_preserves_order() {
        assert_eq!(logical_link_name("saveOrderFunction", "ordersTable"), "saveOrderFunction::ordersTable");
        assert_eq!(logical_link_name("ordersTable", "saveOrderFunction"), "ordersTable::saveOrderFunction");
        assert_eq!(
            split_logical_link_name("saveOrderFunction::ordersTable").unwrap(),
            ("saveOrderFunction", "ordersTable")
        );
    }

    #[test]
    fn test_split_invalid_link_name() {
        assert!(split_logical_link_name("ordersTable").is_err());
        assert!(split_logical_link_name("a::b::c").is_err());
        assert!(split_logical_link_name("::b").is_err());
    }

    #[test]
    fn test_qualify_field_path() {
        assert_eq!(
            qualify_field_path(ElementKind::Resource, "ordersTable", "spec.arn"),
            "resources.ordersTable.spec.arn"
        );
        assert_eq!(
            qualify_field_path(ElementKind::Resource, "ordersTable", "[0].id"),
            "resources.ordersTable[0].id"
        );
        assert_eq!(
            qualify_field_path(ElementKind::Link, "fn::table", "policy"),
            "links.fn::table.policy"
        );
    }

    #[test]
    fn test_collected_elements_dedupe_by_name() {
        let mut collected = CollectedElements::new();
        assert!(collected.add_resource(ResourceIdInfo::new("id-1", "ordersTable")));
        assert!(!collected.add_resource(ResourceIdInfo::new("id-other", "ordersTable")));
        assert!(collected.add_child(ChildBlueprintIdInfo::new("child-1", "coreInfra")));
        assert!(!collected.add_child(ChildBlueprintIdInfo::new("child-1", "coreInfra")));

        assert_eq!(collected.total(), 2);
        assert_eq!(collected.resources()[0].resource_id, "id-1");
    }

    #[test]
    fn test_collected_elements_merge_is_idempotent() {
        let mut other = CollectedElements::new();
        other.add_resource(ResourceIdInfo::new("id-1", "ordersTable"));
        other.add_child(ChildBlueprintIdInfo::new("child-1", "coreInfra"));

        let mut collected = CollectedElements::new();
        assert_eq!(collected.merge(&other), 2);
        assert_eq!(collected.merge(&other), 0);
        assert_eq!(collected, other);
    }

    #[test]
    fn test_element_identifier_ids() {
        let link: ElementIdentifier = LinkIdInfo::new("link-1", "a::b").into();
        assert_eq!(link.kind(), ElementKind::Link);
        assert_eq!(link.element_id(), "links.a::b");
        assert_eq!(link.id(), "link-1");

        let child: ElementIdentifier = ChildBlueprintIdInfo::new("inst-1", "networking").into();
        assert_eq!(child.to_string(), "children.networking");
    }
}
