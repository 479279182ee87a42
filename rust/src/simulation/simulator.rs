//! Simulator facade: tree, model, rate scheme and cache bundled together.
//!
//! Every entry point has the same shape: fill in whatever the caller left
//! out (root state from equilibrium, rate from the active rate mode), walk
//! the tree, and assemble the leaves.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info};

use super::assembler::{Alignment, Site};
use super::cache::TransitionCache;
use super::config::SimulationConfig;
use super::detailed::{DetailedTreeWalker, SiteHistory};
use super::sampling::draw_equilibrium_state;
use super::walker::TreeWalker;
use crate::error::Result;
use crate::model::TransitionModel;
use crate::rates::{RateMode, RateScheme};
use crate::tree::Tree;

/// Rate of one site: a cached category or a free-standing multiplier.
#[derive(Clone, Copy, Debug, PartialEq)]
enum SiteRate {
    Category(usize),
    Rate(f64),
}

pub struct SequenceSimulator<M, D> {
    tree: Tree,
    model: M,
    rates: D,
    cache: TransitionCache,
    config: SimulationConfig,
}

impl<M: TransitionModel, D: RateScheme> SequenceSimulator<M, D> {
    /// Build the simulator and its transition cache.
    pub fn new(tree: Tree, model: M, rates: D, config: SimulationConfig) -> Result<Self> {
        let cache =
            TransitionCache::build(&tree, &model, &rates, config.normalization_tolerance)?;
        info!(
            leaves = tree.n_tips,
            states = model.n_states(),
            categories = rates.n_categories(),
            rate_mode = ?config.rate_mode,
            "built sequence simulator"
        );
        Ok(Self {
            tree,
            model,
            rates,
            cache,
            config,
        })
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn rates(&self) -> &D {
        &self.rates
    }

    pub fn cache(&self) -> &TransitionCache {
        &self.cache
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    fn walker(&self) -> TreeWalker<'_, M> {
        TreeWalker::new(&self.tree, &self.model, &self.cache)
    }

    fn detailed_walker(&self) -> DetailedTreeWalker<'_, M> {
        DetailedTreeWalker::new(&self.tree, &self.model)
    }

    fn root_state<R: Rng + ?Sized>(&self, initial_state: Option<usize>, rng: &mut R) -> Result<usize> {
        match initial_state {
            Some(state) => Ok(state),
            None => draw_equilibrium_state(&self.model, rng),
        }
    }

    fn draw_site_rate<R: Rng + ?Sized>(&self, rng: &mut R) -> SiteRate {
        match self.config.rate_mode {
            RateMode::Discrete => SiteRate::Category(self.rates.draw_category(rng)),
            RateMode::Continuous => SiteRate::Rate(self.rates.draw_continuous_rate(rng)),
        }
    }

    fn evolve<R: Rng + ?Sized>(&self, root_state: usize, rate: SiteRate, rng: &mut R) -> Result<Site> {
        let states = match rate {
            SiteRate::Category(category) => self.walker().evolve_with_category(root_state, category, rng)?,
            SiteRate::Rate(rate) => self.walker().evolve_with_rate(root_state, rate, rng)?,
        };
        Ok(Site::from_node_states(&self.tree, &self.model, &states))
    }

    // --- single sites ---

    /// Root from equilibrium, rate from the active rate mode.
    pub fn simulate_site<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Site> {
        let root = self.root_state(None, rng)?;
        let rate = self.draw_site_rate(rng);
        self.evolve(root, rate, rng)
    }

    /// Fixed root state, rate from the active rate mode.
    pub fn simulate_site_from<R: Rng + ?Sized>(&self, initial_state: usize, rng: &mut R) -> Result<Site> {
        let rate = self.draw_site_rate(rng);
        self.evolve(initial_state, rate, rng)
    }

    /// Fixed rate category; rows come from the cache.
    pub fn simulate_site_with_category<R: Rng + ?Sized>(
        &self,
        initial_state: Option<usize>,
        category: usize,
        rng: &mut R,
    ) -> Result<Site> {
        self.rates.check_category(category)?;
        let root = self.root_state(initial_state, rng)?;
        self.evolve(root, SiteRate::Category(category), rng)
    }

    /// Fixed rate multiplier; rows are computed directly from the model.
    pub fn simulate_site_with_rate<R: Rng + ?Sized>(
        &self,
        initial_state: Option<usize>,
        rate: f64,
        rng: &mut R,
    ) -> Result<Site> {
        let root = self.root_state(initial_state, rng)?;
        self.evolve(root, SiteRate::Rate(rate), rng)
    }

    // --- alignments ---

    /// Simulate `n_sites` sites.
    ///
    /// Discrete mode draws every root state, then every category, and pushes
    /// all sites through each branch together. Continuous mode walks the
    /// tree once per site with that site's root state and rate.
    pub fn simulate_sites<R: Rng + ?Sized>(&self, n_sites: usize, rng: &mut R) -> Result<Alignment> {
        let roots = (0..n_sites)
            .map(|_| draw_equilibrium_state(&self.model, rng))
            .collect::<Result<Vec<_>>>()?;
        debug!(sites = n_sites, rate_mode = ?self.config.rate_mode, "simulating alignment");

        match self.config.rate_mode {
            RateMode::Discrete => {
                let categories: Vec<usize> =
                    (0..n_sites).map(|_| self.rates.draw_category(rng)).collect();
                self.simulate_sites_with(&roots, &categories, rng)
            }
            RateMode::Continuous => {
                let sites = roots
                    .iter()
                    .map(|&root| {
                        let rate = self.rates.draw_continuous_rate(rng);
                        self.evolve(root, SiteRate::Rate(rate), rng)
                    })
                    .collect::<Result<Vec<_>>>()?;
                Alignment::from_sites(&self.tree, &self.model, &sites)
            }
        }
    }

    /// Simulate one site per entry of `initial_states`, each with its
    /// category from `categories`, batched through the cache.
    pub fn simulate_sites_with<R: Rng + ?Sized>(
        &self,
        initial_states: &[usize],
        categories: &[usize],
        rng: &mut R,
    ) -> Result<Alignment> {
        let states = self.walker().evolve_sites(initial_states, categories, rng)?;
        Ok(Alignment::from_node_states(&self.tree, &self.model, &states))
    }

    /// Simulate `n_sites` independent sites in parallel.
    ///
    /// Site `i` uses its own generator seeded with `seed + i`, so the result
    /// does not depend on the thread count.
    pub fn simulate_sites_parallel(&self, n_sites: usize, seed: u64) -> Result<Alignment> {
        debug!(sites = n_sites, seed, "simulating alignment in parallel");
        let sites = (0..n_sites)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
                self.simulate_site(&mut rng)
            })
            .collect::<Result<Vec<_>>>()?;
        Alignment::from_sites(&self.tree, &self.model, &sites)
    }

    // --- histories ---

    fn history_rate<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self.draw_site_rate(rng) {
            SiteRate::Category(category) => self.rates.category_multiplier(category),
            SiteRate::Rate(rate) => rate,
        }
    }

    /// Root from equilibrium, rate from the active rate mode.
    pub fn simulate_history<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<SiteHistory> {
        let root = self.root_state(None, rng)?;
        let rate = self.history_rate(rng);
        self.detailed_walker().evolve(root, rate, rng)
    }

    pub fn simulate_history_from<R: Rng + ?Sized>(
        &self,
        initial_state: usize,
        rng: &mut R,
    ) -> Result<SiteHistory> {
        let rate = self.history_rate(rng);
        self.detailed_walker().evolve(initial_state, rate, rng)
    }

    pub fn simulate_history_with_rate<R: Rng + ?Sized>(
        &self,
        initial_state: Option<usize>,
        rate: f64,
        rng: &mut R,
    ) -> Result<SiteHistory> {
        let root = self.root_state(initial_state, rng)?;
        self.detailed_walker().evolve(root, rate, rng)
    }

    /// Detailed simulation at the multiplier of `category`.
    pub fn simulate_history_with_category<R: Rng + ?Sized>(
        &self,
        initial_state: Option<usize>,
        category: usize,
        rng: &mut R,
    ) -> Result<SiteHistory> {
        self.rates.check_category(category)?;
        let rate = self.rates.category_multiplier(category);
        self.simulate_history_with_rate(initial_state, rate, rng)
    }

    /// `n` independent histories, history `i` seeded with `seed + i`.
    pub fn simulate_histories_parallel(&self, n: usize, seed: u64) -> Result<Vec<SiteHistory>> {
        debug!(histories = n, seed, "simulating histories in parallel");
        (0..n)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
                self.simulate_history(&mut rng)
            })
            .collect()
    }
}
