//! # Stratum Staging
//!
//! Concurrent change staging for blueprint deployments.
//!
//! - [`ChangeStagingState`] - accumulates staged changes from many workers
//! - [`PendingLinkTracker`] - releases links once both resources are staged
//! - [`order_elements_for_removal`] and [`group_elements_for_removal`] - removal waves
//! - [`RecreationTracker`] - elements recreated because a dependency is removed

pub mod config;
pub mod instance;
pub mod pending_links;
pub mod recreate;
pub mod removal;
pub mod state;

pub use config::StagingConfig;
pub use instance::{
    is_new_child, is_new_resource, ChildState, InMemoryInstanceState, InstanceStateStore,
    ResourceState,
};
pub use pending_links::{LinkPendingCompletion, PendingLinkTracker};
pub use recreate::{filter_out_recreated, find_dependents, RecreationTracker};
pub use removal::{group_elements_for_removal, order_elements_for_removal, ElementWithAllDependencies};
pub use state::ChangeStagingState;
