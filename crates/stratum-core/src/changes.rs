//! Change set types produced while staging a blueprint deployment.
//!
//! Field-level diffs are computed by provider plugins; the types here only
//! carry their results so they can be aggregated into a [`BlueprintChanges`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A change to a single field of a resource, link, export or metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub field_path: String,
    pub prev_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub must_recreate: bool,
}

impl FieldChange {
    pub fn new(field_path: impl Into<String>) -> Self {
        Self {
            field_path: field_path.into(),
            ..Default::default()
        }
    }

    pub fn with_prev_value(mut self, value: serde_json::Value) -> Self {
        self.prev_value = Some(value);
        self
    }

    pub fn with_new_value(mut self, value: serde_json::Value) -> Self {
        self.new_value = Some(value);
        self
    }
}

/// Changes to a link between two resources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkChanges {
    pub modified_fields: Vec<FieldChange>,
    pub new_fields: Vec<FieldChange>,
    pub removed_fields: Vec<String>,
    pub unchanged_fields: Vec<String>,
    /// Field paths whose changes are only known at deploy time.
    pub field_changes_known_on_deploy: Vec<String>,
}

/// Changes to a single resource as reported by its provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceChanges {
    /// Resource spec with substitutions resolved for change staging.
    pub resolved_resource: Option<serde_json::Value>,
    pub must_recreate: bool,
    pub modified_fields: Vec<FieldChange>,
    pub new_fields: Vec<FieldChange>,
    pub removed_fields: Vec<String>,
    pub unchanged_fields: Vec<String>,
    /// Field paths computed by the provider at deploy time.
    pub computed_fields: Vec<String>,
    /// Field paths whose changes are only known at deploy time.
    pub field_changes_known_on_deploy: Vec<String>,
    pub condition_known_on_deploy: bool,
    /// Linked-to resource name -> changes for links that will be created.
    pub new_outbound_links: HashMap<String, LinkChanges>,
    /// Linked-to resource name -> changes to existing links.
    pub outbound_link_changes: HashMap<String, LinkChanges>,
    /// Logical names of outbound links that will be removed.
    pub removed_outbound_links: Vec<String>,
}

/// Changes to blueprint-wide metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataChanges {
    pub new_fields: Vec<FieldChange>,
    pub modified_fields: Vec<FieldChange>,
    pub unchanged_fields: Vec<String>,
    pub removed_fields: Vec<String>,
}

/// Export changes collected for a whole blueprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportChanges {
    pub new_exports: HashMap<String, FieldChange>,
    pub export_changes: HashMap<String, FieldChange>,
    pub unchanged_exports: Vec<String>,
    pub removed_exports: Vec<String>,
    /// Already fully-qualified export paths resolved at deploy time.
    pub resolve_on_deploy: Vec<String>,
}

/// Definition of a child blueprint that does not exist yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBlueprintDefinition {
    pub new_resources: HashMap<String, ResourceChanges>,
    pub new_children: HashMap<String, NewBlueprintDefinition>,
    pub new_exports: HashMap<String, FieldChange>,
}

/// The complete set of changes staged for a blueprint instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintChanges {
    pub new_resources: HashMap<String, ResourceChanges>,
    pub resource_changes: HashMap<String, ResourceChanges>,
    pub removed_resources: Vec<String>,
    /// Logical names in the form `resourceA::resourceB`.
    pub removed_links: Vec<String>,
    pub new_children: HashMap<String, NewBlueprintDefinition>,
    pub child_changes: HashMap<String, BlueprintChanges>,
    /// Children that must be recreated because a dependency is being removed.
    pub recreate_children: Vec<String>,
    pub removed_children: Vec<String>,
    pub new_exports: HashMap<String, FieldChange>,
    pub export_changes: HashMap<String, FieldChange>,
    pub unchanged_exports: Vec<String>,
    pub removed_exports: Vec<String>,
    pub metadata_changes: MetadataChanges,
    /// Fully-qualified paths of values only known at deploy time.
    pub resolve_on_deploy: Vec<String>,
}

impl BlueprintChanges {
    /// True if nothing is created, changed or removed.
    pub fn is_empty(&self) -> bool {
        self.new_resources.is_empty()
            && self.resource_changes.is_empty()
            && self.removed_resources.is_empty()
            && self.removed_links.is_empty()
            && self.new_children.is_empty()
            && self.child_changes.is_empty()
            && self.recreate_children.is_empty()
            && self.removed_children.is_empty()
            && self.new_exports.is_empty()
            && self.export_changes.is_empty()
            && self.removed_exports.is_empty()
            && self.metadata_changes == MetadataChanges::default()
    }
}

/// Staged changes for one resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceChangesMessage {
    pub resource_name: String,
    /// Takes precedence over `removed`.
    pub new: bool,
    pub removed: bool,
    pub changes: ResourceChanges,
}

/// Staged changes for one link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkChangesMessage {
    pub resource_a_name: String,
    pub resource_b_name: String,
    pub new: bool,
    pub removed: bool,
    pub changes: LinkChanges,
}

/// Staged changes for one child blueprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildChangesMessage {
    pub child_blueprint_name: String,
    pub new: bool,
    pub removed: bool,
    pub changes: BlueprintChanges,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blueprint_changes_serialize_camel_case() {
        let changes = BlueprintChanges {
            removed_links: vec!["saveOrderFunction::ordersTable".to_string()],
            ..Default::default()
        };

        let json = serde_json::to_value(&changes).unwrap();
        assert_eq!(json["removedLinks"][0], "saveOrderFunction::ordersTable");
        assert!(json["recreateChildren"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_empty_blueprint_changes() {
        assert!(BlueprintChanges::default().is_empty());

        let changes = BlueprintChanges {
            removed_children: vec!["networking".to_string()],
            ..Default::default()
        };
        assert!(!changes.is_empty());
    }
}
