//! Full mutational histories.
//!
//! Same traversal as [`TreeWalker`](super::walker::TreeWalker), but every
//! branch gets a complete jump chain from the model instead of an end state
//! only. The cache is not used.

use rand::Rng;
use tracing::trace;

use super::walker::check_rate;
use crate::error::{Result, SimulationError};
use crate::model::{MutationPath, TransitionModel};
use crate::tree::Tree;

/// History of one site over the whole tree.
#[derive(Clone, Debug, PartialEq)]
pub struct SiteHistory {
    pub initial_state: usize,
    pub rate: f64,
    /// Indexed by node; `None` for the root.
    pub paths: Vec<Option<MutationPath>>,
    /// Leaves in output order.
    pub leaves: Vec<usize>,
}

impl SiteHistory {
    /// Path along the branch above `node`.
    pub fn path(&self, node: usize) -> Option<&MutationPath> {
        self.paths.get(node).and_then(Option::as_ref)
    }

    /// State at the lower end of the branch above `node`; the root reports
    /// its initial state.
    pub fn final_state(&self, node: usize) -> Option<usize> {
        match self.paths.get(node)? {
            Some(path) => Some(path.final_state),
            None => Some(self.initial_state),
        }
    }

    pub fn leaf_states(&self) -> Vec<usize> {
        self.leaves
            .iter()
            .map(|&leaf| self.final_state(leaf).unwrap_or(self.initial_state))
            .collect()
    }

    /// Substitutions on the branch above `node` (zero for the root).
    pub fn substitution_count(&self, node: usize) -> usize {
        self.path(node).map_or(0, MutationPath::n_substitutions)
    }

    pub fn total_substitutions(&self) -> usize {
        self.paths.iter().flatten().map(MutationPath::n_substitutions).sum()
    }
}

/// Walks the tree and records one jump chain per branch, as sampled by the
/// model's own `sample_jump_chain`.
pub struct DetailedTreeWalker<'a, M> {
    tree: &'a Tree,
    model: &'a M,
}

impl<'a, M: TransitionModel> DetailedTreeWalker<'a, M> {
    pub fn new(tree: &'a Tree, model: &'a M) -> Self {
        Self { tree, model }
    }

    pub fn evolve<R: Rng + ?Sized>(
        &self,
        root_state: usize,
        rate: f64,
        rng: &mut R,
    ) -> Result<SiteHistory> {
        let n_states = self.model.n_states();
        if root_state >= n_states {
            return Err(SimulationError::StateOutOfRange {
                state: root_state,
                n_states,
            });
        }
        check_rate(rate)?;

        let mut states = vec![0; self.tree.n_nodes];
        let mut paths: Vec<Option<MutationPath>> = vec![None; self.tree.n_nodes];
        states[self.tree.root()] = root_state;

        for node in self.tree.branches() {
            let parent = self
                .tree
                .parent(node)
                .ok_or(SimulationError::RootHasNoBranch { node })?;
            let time = self.tree.branch_length(node)? * rate;
            let path = self
                .model
                .sample_jump_chain(states[parent], time, rng)
                .map_err(|e| e.at_node(node))?;
            trace!(
                node,
                from = path.initial_state,
                to = path.final_state,
                substitutions = path.n_substitutions(),
                "sampled branch history"
            );
            states[node] = path.final_state;
            paths[node] = Some(path);
        }

        Ok(SiteHistory {
            initial_state: root_state,
            rate,
            paths,
            leaves: self.tree.leaves().to_vec(),
        })
    }
}
