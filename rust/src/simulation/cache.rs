//! Cumulative transition rows for every branch and rate category.
//!
//! For node `n` with branch length `t_n` and category `c` with multiplier
//! `r_c`, the table holds
//! cum[c][x][y] = Σ_{y' ≤ y} P(x, y', t_n · r_c).
//!
//! Built once, in parallel over branches; read-only afterwards.

use ndarray::{s, Array3, ArrayView1};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::error::{Result, SimulationError};
use crate::model::TransitionModel;
use crate::rates::RateScheme;
use crate::tree::Tree;

#[derive(Clone, Debug)]
pub struct TransitionCache {
    /// Indexed by node; `None` for the root.
    tables: Vec<Option<Array3<f64>>>,
    n_categories: usize,
    n_states: usize,
}

impl TransitionCache {
    /// Precompute the cumulative rows of every non-root branch.
    ///
    /// Rows whose total deviates from one by more than `tolerance` are
    /// logged; they only fail when a draw actually exhausts them.
    pub fn build<M, D>(tree: &Tree, model: &M, rates: &D, tolerance: f64) -> Result<Self>
    where
        M: TransitionModel + ?Sized,
        D: RateScheme + ?Sized,
    {
        let n_categories = rates.n_categories();
        let n_states = model.n_states();
        if n_categories == 0 {
            return Err(SimulationError::InvalidRates {
                reason: "rate scheme has no categories".to_string(),
            });
        }

        let multipliers: Vec<f64> = (0..n_categories)
            .map(|c| rates.category_multiplier(c))
            .collect();

        let tables: Vec<Option<Array3<f64>>> = (0..tree.n_nodes)
            .into_par_iter()
            .map(|node| {
                if !tree.has_parent(node) {
                    return None;
                }
                let length = tree.branch_lengths[node];
                let mut table = Array3::zeros((n_categories, n_states, n_states));
                for (c, &multiplier) in multipliers.iter().enumerate() {
                    let p = model.transition_matrix(length * multiplier);
                    for x in 0..n_states {
                        table[[c, x, 0]] = p[[x, 0]];
                        for y in 1..n_states {
                            table[[c, x, y]] = table[[c, x, y - 1]] + p[[x, y]];
                        }
                    }
                }
                Some(table)
            })
            .collect();

        for (node, table) in tables.iter().enumerate() {
            let Some(table) = table else { continue };
            for c in 0..n_categories {
                for x in 0..n_states {
                    let total = table[[c, x, n_states - 1]];
                    if (total - 1.0).abs() > tolerance {
                        warn!(node, category = c, state = x, total, "transition row does not sum to one");
                    }
                }
            }
        }

        info!(
            nodes = tree.n_nodes,
            categories = n_categories,
            states = n_states,
            "built transition cache"
        );

        Ok(Self {
            tables,
            n_categories,
            n_states,
        })
    }

    pub fn n_categories(&self) -> usize {
        self.n_categories
    }

    pub fn n_states(&self) -> usize {
        self.n_states
    }

    /// Cumulative row for the branch above `node`, category `category`,
    /// starting in `start_state`.
    pub fn lookup(&self, node: usize, category: usize, start_state: usize) -> Result<ArrayView1<'_, f64>> {
        let table = self
            .tables
            .get(node)
            .ok_or(SimulationError::NodeOutOfRange {
                node,
                n_nodes: self.tables.len(),
            })?
            .as_ref()
            .ok_or(SimulationError::RootHasNoBranch { node })?;

        if category >= self.n_categories {
            return Err(SimulationError::CategoryOutOfRange {
                category,
                n_categories: self.n_categories,
            });
        }
        if start_state >= self.n_states {
            return Err(SimulationError::StateOutOfRange {
                state: start_state,
                n_states: self.n_states,
            });
        }

        Ok(table.slice(s![category, start_state, ..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Alphabet, BinaryModel, ReversibleModel};
    use crate::rates::{ConstantRate, GammaRates};
    use crate::test_support::three_leaf_tree;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_rows_are_normalized_and_monotone() {
        let tree = three_leaf_tree();
        let model = ReversibleModel::hky85(4.0, &[0.1, 0.2, 0.3, 0.4]).unwrap();
        let rates = GammaRates::new(0.7, 4).unwrap();
        let cache = TransitionCache::build(&tree, &model, &rates, 1e-9).unwrap();

        for node in tree.branches() {
            for c in 0..4 {
                for x in 0..4 {
                    let row = cache.lookup(node, c, x).unwrap();
                    assert_abs_diff_eq!(row[3], 1.0, epsilon = 1e-9);
                    for y in 1..4 {
                        assert!(row[y] >= row[y - 1]);
                    }
                }
            }
        }
    }

    #[test]
    fn test_rows_match_scaled_branch_lengths() {
        let tree = three_leaf_tree();
        let model = BinaryModel::new(1.0, 1.0).unwrap();
        let rates = ConstantRate::new(0.5).unwrap();
        let cache = TransitionCache::build(&tree, &model, &rates, 1e-9).unwrap();

        // Node C has length 2, scaled to 1
        let row = cache.lookup(2, 0, 0).unwrap();
        assert_abs_diff_eq!(row[0], 0.5 + 0.5 * (-2.0_f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn test_lookup_preconditions() {
        let tree = three_leaf_tree();
        let model = ReversibleModel::jc69(Alphabet::dna()).unwrap();
        let rates = ConstantRate::default();
        let cache = TransitionCache::build(&tree, &model, &rates, 1e-9).unwrap();

        assert!(matches!(
            cache.lookup(tree.root(), 0, 0),
            Err(SimulationError::RootHasNoBranch { node: 4 })
        ));
        assert!(matches!(
            cache.lookup(0, 1, 0),
            Err(SimulationError::CategoryOutOfRange { category: 1, n_categories: 1 })
        ));
        assert!(matches!(
            cache.lookup(0, 0, 4),
            Err(SimulationError::StateOutOfRange { state: 4, n_states: 4 })
        ));
        assert!(matches!(
            cache.lookup(7, 0, 0),
            Err(SimulationError::NodeOutOfRange { node: 7, .. })
        ));
    }

    #[test]
    fn test_cache_is_shareable_across_threads() {
        fn assert_sync<T: Send + Sync>() {}
        assert_sync::<TransitionCache>();
    }
}
