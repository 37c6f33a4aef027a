//! # Stratum Refgraph
//!
//! Link chain graphs and the reference chains built from them.
//!
//! The [`LinkChainCollector`] walks a [`LinkGraph`] and records every hard
//! link as a dependency in a [`RefChainCollector`], which is then used for
//! cycle detection and ordering.

pub mod collector;
pub mod link_graph;
pub mod reference;

pub use collector::{collect_link_chains, LinkChainCollector, DEFAULT_MAX_CHAIN_DEPTH};
pub use link_graph::{ChainLinkNode, LinkGraph, LinkImplementation, NodeId, ResolvedLinkImplementation};
pub use reference::{
    link_tag, RefChainCollector, ReferenceChainCollector, ReferenceChainNode,
    ReferenceSortDirection,
};
