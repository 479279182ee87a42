//! State-only propagation from the root to the leaves.
//!
//! The root state is assigned first; every other node is drawn by inverse CDF
//! on the transition row of its parent's state. Nodes are visited in the
//! tree's pre-order so a parent is always resolved before its children, and
//! siblings follow their stored order, which keeps runs reproducible under a
//! fixed random stream.

use ndarray::Array2;
use rand::Rng;

use super::cache::TransitionCache;
use super::sampling::{draw_end_state, draw_from_cumulative};
use crate::error::{Result, SimulationError};
use crate::model::TransitionModel;
use crate::tree::Tree;

/// Propagates states down a tree, one site or a batch of sites at a time.
pub struct TreeWalker<'a, M: ?Sized> {
    tree: &'a Tree,
    model: &'a M,
    cache: &'a TransitionCache,
}

impl<'a, M: TransitionModel + ?Sized> TreeWalker<'a, M> {
    pub fn new(tree: &'a Tree, model: &'a M, cache: &'a TransitionCache) -> Self {
        Self { tree, model, cache }
    }

    /// Evolve one site with a fixed rate category, reading rows from the
    /// cache. Returns the state of every node, indexed by node.
    pub fn evolve_with_category<R: Rng + ?Sized>(
        &self,
        root_state: usize,
        category: usize,
        rng: &mut R,
    ) -> Result<Vec<usize>> {
        self.check_state(root_state)?;
        let mut states = vec![0; self.tree.n_nodes];
        states[self.tree.root()] = root_state;

        for node in self.tree.branches() {
            let parent = self.parent_of(node)?;
            let row = self.cache.lookup(node, category, states[parent])?;
            states[node] = draw_from_cumulative(row, rng.gen()).map_err(|e| e.at_node(node))?;
        }
        Ok(states)
    }

    /// Evolve one site at an arbitrary rate. Rows are computed directly from
    /// the model at `branch_length * rate`; the cache is not consulted.
    pub fn evolve_with_rate<R: Rng + ?Sized>(
        &self,
        root_state: usize,
        rate: f64,
        rng: &mut R,
    ) -> Result<Vec<usize>> {
        self.check_state(root_state)?;
        check_rate(rate)?;
        let mut states = vec![0; self.tree.n_nodes];
        states[self.tree.root()] = root_state;

        for node in self.tree.branches() {
            let parent = self.parent_of(node)?;
            let time = self.tree.branch_length(node)? * rate;
            states[node] =
                draw_end_state(self.model, states[parent], time, rng).map_err(|e| e.at_node(node))?;
        }
        Ok(states)
    }

    /// Evolve a batch of sites, each with its own root state and category.
    ///
    /// Every branch is processed for all sites before moving on, which is
    /// equivalent in distribution to walking the tree once per site.
    /// Returns an (n_nodes, n_sites) matrix of states.
    pub fn evolve_sites<R: Rng + ?Sized>(
        &self,
        root_states: &[usize],
        categories: &[usize],
        rng: &mut R,
    ) -> Result<Array2<usize>> {
        if root_states.len() != categories.len() {
            return Err(SimulationError::InvalidInput {
                reason: format!(
                    "{} root states but {} rate categories",
                    root_states.len(),
                    categories.len()
                ),
            });
        }
        for &state in root_states {
            self.check_state(state)?;
        }

        let n_sites = root_states.len();
        let mut states = Array2::zeros((self.tree.n_nodes, n_sites));
        for (site, &state) in root_states.iter().enumerate() {
            states[[self.tree.root(), site]] = state;
        }

        for node in self.tree.branches() {
            let parent = self.parent_of(node)?;
            for (site, &category) in categories.iter().enumerate() {
                let row = self.cache.lookup(node, category, states[[parent, site]])?;
                states[[node, site]] =
                    draw_from_cumulative(row, rng.gen()).map_err(|e| e.at_node(node))?;
            }
        }
        Ok(states)
    }

    fn parent_of(&self, node: usize) -> Result<usize> {
        self.tree
            .parent(node)
            .ok_or(SimulationError::RootHasNoBranch { node })
    }

    fn check_state(&self, state: usize) -> Result<()> {
        let n_states = self.model.n_states();
        if state >= n_states {
            return Err(SimulationError::StateOutOfRange { state, n_states });
        }
        Ok(())
    }
}

pub(crate) fn check_rate(rate: f64) -> Result<()> {
    if !(rate.is_finite() && rate >= 0.0) {
        return Err(SimulationError::InvalidInput {
            reason: format!("rate must be finite and non-negative, got {rate}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Alphabet, BinaryModel, ReversibleModel};
    use crate::rates::{CategoryRates, ConstantRate};
    use crate::test_support::{single_branch_tree, three_leaf_tree, ConstantRng};
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_zero_draws_keep_every_node_in_state_zero() {
        let tree = three_leaf_tree();
        let model = BinaryModel::new(1.0, 1.0).unwrap();
        let rates = ConstantRate::default();
        let cache = TransitionCache::build(&tree, &model, &rates, 1e-9).unwrap();
        let walker = TreeWalker::new(&tree, &model, &cache);

        let states = walker.evolve_with_category(0, 0, &mut ConstantRng(0)).unwrap();
        assert_eq!(states, vec![0; 5]);

        let states = walker.evolve_with_rate(0, 1.0, &mut ConstantRng(0)).unwrap();
        assert_eq!(states, vec![0; 5]);
    }

    #[test]
    fn test_long_branch_reaches_equilibrium() {
        let tree = single_branch_tree(50.0);
        let freqs = [0.1, 0.2, 0.3, 0.4];
        let model = ReversibleModel::hky85(2.0, &freqs).unwrap();
        let rates = ConstantRate::default();
        let cache = TransitionCache::build(&tree, &model, &rates, 1e-9).unwrap();
        let walker = TreeWalker::new(&tree, &model, &cache);
        let mut rng = StdRng::seed_from_u64(42);

        let n = 40_000;
        let mut counts = [0usize; 4];
        for _ in 0..n {
            let states = walker.evolve_with_category(0, 0, &mut rng).unwrap();
            counts[states[0]] += 1;
        }
        for (count, f) in counts.iter().zip(freqs) {
            assert_abs_diff_eq!(*count as f64 / n as f64, f, epsilon = 0.015);
        }
    }

    #[test]
    fn test_batched_sites_match_single_site_draws() {
        // With one site the batch consumes draws exactly like the single-site walk
        let tree = three_leaf_tree();
        let model = ReversibleModel::jc69(Alphabet::dna()).unwrap();
        let rates = CategoryRates::uniform(vec![0.2, 1.8]).unwrap();
        let cache = TransitionCache::build(&tree, &model, &rates, 1e-9).unwrap();
        let walker = TreeWalker::new(&tree, &model, &cache);

        for seed in 0..20 {
            let single = walker
                .evolve_with_category(2, 1, &mut StdRng::seed_from_u64(seed))
                .unwrap();
            let batch = walker
                .evolve_sites(&[2], &[1], &mut StdRng::seed_from_u64(seed))
                .unwrap();
            assert_eq!(batch.column(0).to_vec(), single);
        }
    }

    #[test]
    fn test_batched_marginals_match_per_site_marginals() {
        let tree = three_leaf_tree();
        let model = ReversibleModel::k80(3.0).unwrap();
        let rates = CategoryRates::uniform(vec![0.5, 1.5]).unwrap();
        let cache = TransitionCache::build(&tree, &model, &rates, 1e-9).unwrap();
        let walker = TreeWalker::new(&tree, &model, &cache);
        let mut rng = StdRng::seed_from_u64(9);

        let n = 20_000;
        let roots = vec![0; n];
        let categories: Vec<usize> = (0..n).map(|i| i % 2).collect();
        let batch = walker.evolve_sites(&roots, &categories, &mut rng).unwrap();

        let mut per_site = [0usize; 4];
        for &category in &categories {
            let states = walker.evolve_with_category(0, category, &mut rng).unwrap();
            per_site[states[2]] += 1;
        }
        let mut batched = [0usize; 4];
        for &state in batch.row(2) {
            batched[state] += 1;
        }
        for (a, b) in per_site.iter().zip(&batched) {
            assert_abs_diff_eq!(*a as f64 / n as f64, *b as f64 / n as f64, epsilon = 0.02);
        }
    }

    #[test]
    fn test_continuous_rate_matches_cached_category() {
        // Same rate through either path gives the same states for the same draws
        let tree = three_leaf_tree();
        let model = BinaryModel::new(0.7, 1.3).unwrap();
        let rates = ConstantRate::new(0.8).unwrap();
        let cache = TransitionCache::build(&tree, &model, &rates, 1e-9).unwrap();
        let walker = TreeWalker::new(&tree, &model, &cache);

        for seed in 0..20 {
            let cached = walker
                .evolve_with_category(1, 0, &mut StdRng::seed_from_u64(seed))
                .unwrap();
            let direct = walker
                .evolve_with_rate(1, 0.8, &mut StdRng::seed_from_u64(seed))
                .unwrap();
            assert_eq!(cached, direct);
        }
    }

    #[test]
    fn test_invalid_inputs() {
        let tree = three_leaf_tree();
        let model = BinaryModel::new(1.0, 1.0).unwrap();
        let rates = ConstantRate::default();
        let cache = TransitionCache::build(&tree, &model, &rates, 1e-9).unwrap();
        let walker = TreeWalker::new(&tree, &model, &cache);
        let mut rng = StdRng::seed_from_u64(0);

        assert!(matches!(
            walker.evolve_with_category(2, 0, &mut rng),
            Err(SimulationError::StateOutOfRange { state: 2, n_states: 2 })
        ));
        assert!(matches!(
            walker.evolve_with_category(0, 3, &mut rng),
            Err(SimulationError::CategoryOutOfRange { category: 3, .. })
        ));
        assert!(walker.evolve_with_rate(0, -1.0, &mut rng).is_err());
        assert!(walker.evolve_sites(&[0, 1], &[0], &mut rng).is_err());
    }

    #[test]
    fn test_normalization_defect_names_the_node() {
        struct Leaky;
        impl TransitionModel for Leaky {
            fn n_states(&self) -> usize {
                2
            }
            fn alphabet(&self) -> &Alphabet {
                unimplemented!()
            }
            fn equilibrium_frequency(&self, _state: usize) -> f64 {
                0.5
            }
            fn transition_probability(&self, _i: usize, _j: usize, _t: f64) -> f64 {
                0.25
            }
            fn generator(&self) -> &ndarray::Array2<f64> {
                unimplemented!()
            }
        }

        let tree = three_leaf_tree();
        let cache = TransitionCache::build(&tree, &Leaky, &ConstantRate::default(), 1e-9).unwrap();
        let walker = TreeWalker::new(&tree, &Leaky, &cache);

        // Draw 0.9 never reaches the row total of 0.5
        let mut rng = ConstantRng(u64::MAX - (u64::MAX / 10));
        match walker.evolve_with_category(0, 0, &mut rng) {
            Err(SimulationError::NormalizationDefect { node, row, .. }) => {
                assert_eq!(node, Some(2));
                assert_eq!(row, vec![0.25, 0.5]);
            }
            other => panic!("expected a normalization defect, got {other:?}"),
        }
    }
}
