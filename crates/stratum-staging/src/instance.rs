//! Read-only view of the deployed blueprint instance.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stratum_core::Result;
use tokio::sync::RwLock;

/// Deployed state of a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceState {
    pub resource_id: String,
    pub resource_name: String,
    /// Logical names of resources this resource depends on.
    pub depends_on_resources: Vec<String>,
    /// Logical names of child blueprints this resource depends on.
    pub depends_on_children: Vec<String>,
}

impl ResourceState {
    pub fn new(resource_id: impl Into<String>, resource_name: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            resource_name: resource_name.into(),
            ..Default::default()
        }
    }

    pub fn depends_on_resource(mut self, resource_name: impl Into<String>) -> Self {
        self.depends_on_resources.push(resource_name.into());
        self
    }

    pub fn depends_on_child(mut self, child_name: impl Into<String>) -> Self {
        self.depends_on_children.push(child_name.into());
        self
    }
}

/// Deployed state of a child blueprint with its dependency info.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildState {
    pub child_instance_id: String,
    pub child_name: String,
    pub depends_on_resources: Vec<String>,
    pub depends_on_children: Vec<String>,
}

impl ChildState {
    pub fn new(child_instance_id: impl Into<String>, child_name: impl Into<String>) -> Self {
        Self {
            child_instance_id: child_instance_id.into(),
            child_name: child_name.into(),
            ..Default::default()
        }
    }

    pub fn depends_on_resource(mut self, resource_name: impl Into<String>) -> Self {
        self.depends_on_resources.push(resource_name.into());
        self
    }

    pub fn depends_on_child(mut self, child_name: impl Into<String>) -> Self {
        self.depends_on_children.push(child_name.into());
        self
    }
}

/// Lookups into the current state of a blueprint instance.
///
/// `None` means the element has not been deployed, it is not an error.
#[async_trait]
pub trait InstanceStateStore: Send + Sync {
    /// Get the deployed state of a resource by logical name.
    async fn resource(&self, resource_name: &str) -> Result<Option<ResourceState>>;

    /// Get the deployed state of a child blueprint by logical name.
    async fn child(&self, child_name: &str) -> Result<Option<ChildState>>;
}

/// In-memory snapshot of an instance's state.
#[derive(Debug, Default)]
pub struct InMemoryInstanceState {
    resources: RwLock<HashMap<String, ResourceState>>,
    children: RwLock<HashMap<String, ChildState>>,
}

impl InMemoryInstanceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Self::put_resource`].
    pub fn with_resource(mut self, state: ResourceState) -> Self {
        self.resources
            .get_mut()
            .insert(state.resource_name.clone(), state);
        self
    }

    pub fn with_child(mut self, state: ChildState) -> Self {
        self.children
            .get_mut()
            .insert(state.child_name.clone(), state);
        self
    }

    pub async fn put_resource(&self, state: ResourceState) {
        let mut resources = self.resources.write().await;
        resources.insert(state.resource_name.clone(), state);
    }

    pub async fn put_child(&self, state: ChildState) {
        let mut children = self.children.write().await;
        children.insert(state.child_name.clone(), state);
    }
}

#[async_trait]
impl InstanceStateStore for InMemoryInstanceState {
    async fn resource(&self, resource_name: &str) -> Result<Option<ResourceState>> {
        let resources = self.resources.read().await;
        Ok(resources.get(resource_name).cloned())
    }

    async fn child(&self, child_name: &str) -> Result<Option<ChildState>> {
        let children = self.children.read().await;
        Ok(children.get(child_name).cloned())
    }
}

/// True if the resource has not been deployed yet.
pub async fn is_new_resource(store: &dyn InstanceStateStore, resource_name: &str) -> Result<bool> {
    Ok(store.resource(resource_name).await?.is_none())
}

/// True if the child blueprint has not been deployed yet.
pub async fn is_new_child(store: &dyn InstanceStateStore, child_name: &str) -> Result<bool> {
    Ok(store.child(child_name).await?.is_none())
}
