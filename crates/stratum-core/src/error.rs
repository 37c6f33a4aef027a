//! Error types for Stratum change staging.

use thiserror::Error;

/// Main error type for staging operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StagingError {
    /// Neither endpoint of a link has an implementation registered for the other.
    #[error("No link implementation found between {resource_a} and {resource_b}")]
    LinkImplementationMissing {
        resource_a: String,
        resource_b: String,
    },

    /// A provider plugin call failed.
    #[error("Provider error for {context}: {message}")]
    Provider { context: String, message: String },

    /// A child blueprint include has no usable path.
    #[error("Child blueprint {child_name} is missing a path")]
    MissingChildPath { child_name: String },

    /// A blueprint file has an extension that does not map to a spec format.
    #[error("Unsupported blueprint spec file extension: {path}")]
    UnsupportedSpecExtension { path: String },

    /// Removal grouping could not place any further elements.
    #[error("Removal grouping stalled with {} unplaced elements: {}", .remaining.len(), .remaining.join(", "))]
    RemovalGroupingStalled { remaining: Vec<String> },

    /// A reference chain could not be ordered because of a cycle.
    #[error("Circular references detected between: {}", .elements.join(", "))]
    CircularReferences { elements: Vec<String> },

    /// A referrer was named that has not been collected yet.
    #[error("Referenced by element {referenced_by} does not exist (referencing {element})")]
    UnknownReferrer {
        element: String,
        referenced_by: String,
    },

    /// Link chain traversal went deeper than the configured limit.
    #[error("Link chain depth exceeded {max_depth} at resource {resource}")]
    ChainDepthExceeded { resource: String, max_depth: usize },

    /// A logical link name was not of the form `resourceA::resourceB`.
    #[error("Invalid logical link name: {name}")]
    InvalidLogicalLinkName { name: String },

    /// The instance state store failed.
    #[error("State store error: {message}")]
    StateStore { message: String },

    /// Staging configuration could not be parsed.
    #[error("Invalid staging configuration: {message}")]
    InvalidConfig { message: String },
}

impl StagingError {
    /// Wraps a provider failure with the link or resource it was raised for.
    pub fn provider(context: impl Into<String>, err: ProviderError) -> Self {
        StagingError::Provider {
            context: context.into(),
            message: err.0,
        }
    }

    /// Returns true if this error must abort the whole staging operation.
    ///
    /// Provider and state store failures are scoped to a single element, the
    /// scheduler decides whether to retry them.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            StagingError::Provider { .. } | StagingError::StateStore { .. }
        )
    }
}

/// Error returned by provider plugin calls, carried verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ProviderError(pub String);

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Convenience Result type for staging operations.
pub type Result<T> = std::result::Result<T, StagingError>;

impl From<serde_json::Error> for StagingError {
    fn from(err: serde_json::Error) -> Self {
        StagingError::InvalidConfig {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_errors_are_not_fatal() {
        let err = StagingError::provider("link(a::b)", ProviderError::new("plugin unavailable"));
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "Provider error for link(a::b): plugin unavailable");
    }

    #[test]
    fn test_graph_errors_are_fatal() {
        let err = StagingError::LinkImplementationMissing {
            resource_a: "ordersTable".to_string(),
            resource_b: "saveOrderFunction".to_string(),
        };
        assert!(err.is_fatal());

        let stalled = StagingError::RemovalGroupingStalled {
            remaining: vec!["resources.a".to_string(), "resources.b".to_string()],
        };
        assert!(stalled.is_fatal());
        assert!(stalled.to_string().contains("2 unplaced elements"));
    }
}
