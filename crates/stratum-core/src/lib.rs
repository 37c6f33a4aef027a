//! # Stratum Core
//!
//! Shared data model for Stratum change staging.
//!
//! This crate provides the building blocks the staging crates agree on:
//! - [`ElementIdentifier`] and [`CollectedElements`] - element identities
//! - [`BlueprintChanges`] and the staging messages - change set fragments
//! - [`StagingError`] - staging error types

pub mod changes;
pub mod error;
pub mod format;
pub mod types;

// Re-exports for convenience
pub use changes::{
    BlueprintChanges, ChildChangesMessage, ExportChanges, FieldChange, LinkChanges,
    LinkChangesMessage, MetadataChanges, NewBlueprintDefinition, ResourceChanges,
    ResourceChangesMessage,
};
pub use error::{ProviderError, Result, StagingError};
pub use format::{child_blueprint_path, derive_spec_format, SpecFormat};
pub use types::*;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::changes::{
        BlueprintChanges, ChildChangesMessage, LinkChangesMessage, ResourceChangesMessage,
    };
    pub use crate::error::{ProviderError, Result, StagingError};
    pub use crate::types::{
        ChildBlueprintIdInfo, CollectedElements, ElementIdentifier, ElementKind, LinkIdInfo,
        LinkKind, PriorityResource, ResourceIdInfo,
    };
}
