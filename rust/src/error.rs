//! Error types for tree simulation.
//!
//! Every variant is fatal: simulation is a pure function of its inputs and
//! random draws, so an error points at a broken collaborator (tree, model,
//! rate scheme) or at caller misuse, never at a transient condition.

use thiserror::Error;

/// Errors raised while building or running a simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Invalid tree structure: {reason}")]
    InvalidTree { reason: String },

    #[error("Node {node} is the root and has no incoming branch")]
    RootHasNoBranch { node: usize },

    #[error("Node {node} is out of range (tree has {n_nodes} nodes)")]
    NodeOutOfRange { node: usize, n_nodes: usize },

    #[error("State {state} is out of range (alphabet has {n_states} states)")]
    StateOutOfRange { state: usize, n_states: usize },

    #[error("Rate category {category} is out of range ({n_categories} categories)")]
    CategoryOutOfRange { category: usize, n_categories: usize },

    #[error("Cumulative distribution never reached draw {draw} (node: {node:?}, row: {row:?})")]
    NormalizationDefect {
        node: Option<usize>,
        draw: f64,
        row: Vec<f64>,
    },

    #[error("Invalid substitution model: {reason}")]
    InvalidModel { reason: String },

    #[error("Invalid rate distribution: {reason}")]
    InvalidRates { reason: String },

    #[error("Invalid simulation input: {reason}")]
    InvalidInput { reason: String },

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl SimulationError {
    /// Attach the node being evolved to a normalization defect raised by a
    /// context-free sampling helper.
    pub fn at_node(self, node: usize) -> Self {
        match self {
            SimulationError::NormalizationDefect { draw, row, .. } => {
                SimulationError::NormalizationDefect {
                    node: Some(node),
                    draw,
                    row,
                }
            }
            other => other,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SimulationError>;
