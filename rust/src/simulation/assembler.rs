//! Leaf states gathered into output records.

use ndarray::{Array2, Axis};

use crate::error::{Result, SimulationError};
use crate::model::TransitionModel;
use crate::tree::Tree;

/// One simulated character: a state per leaf, in leaf order.
#[derive(Clone, Debug, PartialEq)]
pub struct Site {
    pub states: Vec<usize>,
    pub symbols: Vec<String>,
}

impl Site {
    /// Collect the leaves of a node-indexed state vector.
    pub fn from_node_states<M>(tree: &Tree, model: &M, node_states: &[usize]) -> Self
    where
        M: TransitionModel + ?Sized,
    {
        let states: Vec<usize> = tree.leaves().iter().map(|&leaf| node_states[leaf]).collect();
        let symbols = states
            .iter()
            .map(|&state| model.symbol(state).to_string())
            .collect();
        Self { states, symbols }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Simulated sequences, one row per leaf.
#[derive(Clone, Debug, PartialEq)]
pub struct Alignment {
    pub names: Vec<String>,
    /// (n_leaves, n_sites) internal states.
    pub states: Array2<usize>,
    /// Symbol of every cell, same layout as `states`.
    pub symbols: Vec<Vec<String>>,
}

impl Alignment {
    /// Collect the leaf rows of an (n_nodes, n_sites) state matrix.
    pub fn from_node_states<M>(tree: &Tree, model: &M, node_states: &Array2<usize>) -> Self
    where
        M: TransitionModel + ?Sized,
    {
        let states = node_states.select(Axis(0), tree.leaves());
        Self::from_leaf_states(tree, model, states)
    }

    /// Assemble from individually simulated sites.
    pub fn from_sites<M>(tree: &Tree, model: &M, sites: &[Site]) -> Result<Self>
    where
        M: TransitionModel + ?Sized,
    {
        let n_leaves = tree.leaves().len();
        if let Some(site) = sites.iter().find(|site| site.len() != n_leaves) {
            return Err(SimulationError::InvalidInput {
                reason: format!("site has {} states for {n_leaves} leaves", site.len()),
            });
        }
        let states = Array2::from_shape_fn((n_leaves, sites.len()), |(leaf, site)| {
            sites[site].states[leaf]
        });
        Ok(Self::from_leaf_states(tree, model, states))
    }

    fn from_leaf_states<M>(tree: &Tree, model: &M, states: Array2<usize>) -> Self
    where
        M: TransitionModel + ?Sized,
    {
        let names = tree
            .leaves()
            .iter()
            .map(|&leaf| tree.tip_names[leaf].clone())
            .collect();
        let symbols = states
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|&s| model.symbol(s).to_string()).collect())
            .collect();
        Self {
            names,
            states,
            symbols,
        }
    }

    pub fn n_sequences(&self) -> usize {
        self.states.nrows()
    }

    pub fn n_sites(&self) -> usize {
        self.states.ncols()
    }

    /// Symbols of the sequence called `name`.
    pub fn sequence(&self, name: &str) -> Option<&[String]> {
        let idx = self.names.iter().position(|n| n == name)?;
        Some(&self.symbols[idx])
    }

    /// Sequence `idx` as one string.
    pub fn sequence_string(&self, idx: usize) -> String {
        self.symbols[idx].concat()
    }

    /// Site `column` gathered across all sequences.
    pub fn site(&self, column: usize) -> Site {
        Site {
            states: self.states.column(column).to_vec(),
            symbols: self.symbols.iter().map(|row| row[column].clone()).collect(),
        }
    }
}
