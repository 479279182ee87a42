//! Substitution models: continuous-time Markov chains over a finite alphabet.
//!
//! This module provides:
//! - TransitionModel: the interface the simulators consume
//! - Alphabet: internal state → symbol translation
//! - MutationPath: jump chains sampled along a branch
//! - BinaryModel: two-state gain/loss chain with analytic P(t)
//! - ReversibleModel: general time-reversible model (JC69, K80, GTR)
//! - WordModel: independent per-position models combined into words

pub mod alphabet;
pub mod binary;
pub mod path;
pub mod reversible;
pub mod word;

pub use alphabet::Alphabet;
pub use binary::BinaryModel;
pub use path::{MutationEvent, MutationPath};
pub use reversible::ReversibleModel;
pub use word::WordModel;

use ndarray::Array2;
use rand::Rng;

use crate::error::Result;

/// Continuous-time Markov generator over `n_states()` states.
///
/// Implementations must be immutable once built: the transition cache and
/// parallel simulation share them across threads.
pub trait TransitionModel: Send + Sync {
    fn n_states(&self) -> usize;

    fn alphabet(&self) -> &Alphabet;

    /// Stationary probability of `state`.
    fn equilibrium_frequency(&self, state: usize) -> f64;

    /// P(i → j) after time `t`.
    fn transition_probability(&self, i: usize, j: usize, t: f64) -> f64;

    /// Instantaneous rate matrix Q (rows sum to zero).
    fn generator(&self) -> &Array2<f64>;

    /// Full matrix P(t).
    fn transition_matrix(&self, t: f64) -> Array2<f64> {
        let n = self.n_states();
        Array2::from_shape_fn((n, n), |(i, j)| self.transition_probability(i, j, t))
    }

    /// External symbol of an internal state.
    fn symbol(&self, state: usize) -> &str {
        self.alphabet().symbol(state)
    }

    /// Jump chain of one lineage starting in `start` and evolving for `time`.
    fn sample_jump_chain<R: Rng + ?Sized>(
        &self,
        start: usize,
        time: f64,
        rng: &mut R,
    ) -> Result<MutationPath>
    where
        Self: Sized,
    {
        path::sample_conditioned_path(self, start, time, rng)
    }
}

pub(crate) fn check_frequencies(frequencies: &[f64]) -> Result<Vec<f64>> {
    use crate::error::SimulationError;

    if frequencies.iter().any(|&f| !(f.is_finite() && f > 0.0)) {
        return Err(SimulationError::InvalidModel {
            reason: format!("frequencies must be positive and finite: {frequencies:?}"),
        });
    }
    let total: f64 = frequencies.iter().sum();
    Ok(frequencies.iter().map(|f| f / total).collect())
}
