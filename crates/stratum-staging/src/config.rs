//! Staging configuration.

use serde::{Deserialize, Serialize};
use stratum_core::{Result, StagingError};
use stratum_refgraph::{LinkChainCollector, LinkGraph, DEFAULT_MAX_CHAIN_DEPTH};

/// Configuration for a change staging operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Maximum depth followed when collecting link chains.
    pub max_link_chain_depth: usize,

    /// Drop repeated resolve-on-deploy paths on extraction, keeping the first.
    pub dedupe_resolve_on_deploy: bool,

    /// Keep children that must be recreated in `child_changes` as well as
    /// `recreate_children`.
    pub include_recreated_children_in_child_changes: bool,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            max_link_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            dedupe_resolve_on_deploy: false,
            include_recreated_children_in_child_changes: true,
        }
    }
}

impl StagingConfig {
    /// Load configuration from JSON, falling back to defaults for missing keys.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: StagingConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_link_chain_depth == 0 {
            return Err(StagingError::InvalidConfig {
                message: "max_link_chain_depth must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// A link chain collector for `graph` limited to the configured depth.
    pub fn chain_collector<'g>(&self, graph: &'g LinkGraph) -> LinkChainCollector<'g> {
        LinkChainCollector::new(graph).with_max_depth(self.max_link_chain_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StagingConfig::default();
        assert_eq!(config.max_link_chain_depth, 256);
        assert!(!config.dedupe_resolve_on_deploy);
        assert!(config.include_recreated_children_in_child_changes);
    }

    #[test]
    fn test_from_json_partial() {
        let config = StagingConfig::from_json_str(r#"{"dedupe_resolve_on_deploy": true}"#).unwrap();
        assert!(config.dedupe_resolve_on_deploy);
        assert_eq!(config.max_link_chain_depth, 256);
    }

    #[test]
    fn test_from_json_rejects_zero_depth() {
        let err = StagingConfig::from_json_str(r#"{"max_link_chain_depth": 0}"#).unwrap_err();
        assert!(matches!(err, StagingError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn test_chain_collector_uses_configured_depth() {
        use stratum_refgraph::{RefChainCollector, ReferenceChainCollector};

        let mut graph = LinkGraph::new();
        let table = graph.add_resource("ordersTable");

        let config = StagingConfig {
            max_link_chain_depth: 1,
            ..Default::default()
        };
        let mut collector = ReferenceChainCollector::new();
        config
            .chain_collector(&graph)
            .collect(table, &mut collector)
            .await
            .unwrap();
        assert!(collector.chain("resources.ordersTable").is_some());
    }

    #[test]
    fn test_from_json_malformed() {
        let err = StagingConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, StagingError::InvalidConfig { .. }));
    }
}
