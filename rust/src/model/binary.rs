//! Binary trait evolution (gain/loss) as a substitution model.
//!
//! Two-state continuous-time Markov chain with an analytic transition matrix.

use ndarray::{array, Array2};

use super::{Alphabet, TransitionModel};
use crate::error::{Result, SimulationError};

/// Two-state chain: state 0 = absent, state 1 = present.
///
/// Q = [[-λ, λ], [μ, -μ]] with λ the gain rate and μ the loss rate.
#[derive(Clone, Debug)]
pub struct BinaryModel {
    gain_rate: f64,
    loss_rate: f64,
    generator: Array2<f64>,
    alphabet: Alphabet,
}

impl BinaryModel {
    pub fn new(gain_rate: f64, loss_rate: f64) -> Result<Self> {
        if !(gain_rate.is_finite() && gain_rate >= 0.0 && loss_rate.is_finite() && loss_rate >= 0.0)
        {
            return Err(SimulationError::InvalidModel {
                reason: format!(
                    "gain and loss rates must be non-negative, got {gain_rate} and {loss_rate}"
                ),
            });
        }

        Ok(Self {
            gain_rate,
            loss_rate,
            generator: array![[-gain_rate, gain_rate], [loss_rate, -loss_rate]],
            alphabet: Alphabet::binary(),
        })
    }

    pub fn gain_rate(&self) -> f64 {
        self.gain_rate
    }

    pub fn loss_rate(&self) -> f64 {
        self.loss_rate
    }
}

/// Compute transition probability matrix for binary evolution.
///
/// Uses analytical solution for 2×2 continuous-time Markov chain:
/// Q = [[-λ, λ], [μ, -μ]]
/// P(t) = exp(Qt)
///
/// # Returns
/// 2×2 transition probability matrix [[P00, P01], [P10, P11]]
fn transition_matrix(gain_rate: f64, loss_rate: f64, t: f64) -> [[f64; 2]; 2] {
    let total = gain_rate + loss_rate;

    if total < 1e-10 {
        // No evolution - identity matrix
        return [[1.0, 0.0], [0.0, 1.0]];
    }

    let exp_term = (-total * t).exp();

    let p00 = (loss_rate + gain_rate * exp_term) / total;
    let p01 = (gain_rate - gain_rate * exp_term) / total;
    let p10 = (loss_rate - loss_rate * exp_term) / total;
    let p11 = (gain_rate + loss_rate * exp_term) / total;

    [[p00, p01], [p10, p11]]
}

/// Compute equilibrium frequencies for binary evolution.
///
/// At equilibrium: π₀ · λ = π₁ · μ (detailed balance)
/// And: π₀ + π₁ = 1
fn equilibrium_frequencies(gain_rate: f64, loss_rate: f64) -> [f64; 2] {
    let total = gain_rate + loss_rate;

    if total < 1e-10 {
        return [0.5, 0.5];
    }

    [loss_rate / total, gain_rate / total]
}

impl TransitionModel for BinaryModel {
    fn n_states(&self) -> usize {
        2
    }

    fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    fn equilibrium_frequency(&self, state: usize) -> f64 {
        equilibrium_frequencies(self.gain_rate, self.loss_rate)[state]
    }

    fn transition_probability(&self, i: usize, j: usize, t: f64) -> f64 {
        transition_matrix(self.gain_rate, self.loss_rate, t)[i][j]
    }

    fn generator(&self) -> &Array2<f64> {
        &self.generator
    }

    fn transition_matrix(&self, t: f64) -> Array2<f64> {
        let p = transition_matrix(self.gain_rate, self.loss_rate, t);
        array![[p[0][0], p[0][1]], [p[1][0], p[1][1]]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_transition_matrix() {
        let p = transition_matrix(1.0, 1.0, 1.0);

        // Rows should sum to 1
        assert!((p[0][0] + p[0][1] - 1.0).abs() < 1e-10);
        assert!((p[1][0] + p[1][1] - 1.0).abs() < 1e-10);

        // All probabilities should be in [0, 1]
        for row in &p {
            for &x in row {
                assert!((0.0..=1.0).contains(&x));
            }
        }
    }

    #[test]
    fn test_equilibrium_frequencies() {
        let eq = equilibrium_frequencies(1.5, 2.0);

        // Should sum to 1
        assert!((eq[0] + eq[1] - 1.0).abs() < 1e-10);

        // With higher loss rate, π₀ should be larger
        assert!(eq[0] > eq[1]);
    }

    #[test]
    fn test_symmetric_model_matches_closed_form() {
        let model = BinaryModel::new(1.0, 1.0).unwrap();

        for &t in &[0.0, 0.3, 1.0, 2.0] {
            let expected = 0.5 + 0.5 * (-2.0 * t as f64).exp();
            assert_abs_diff_eq!(model.transition_probability(0, 0, t), expected, epsilon = 1e-12);
        }
        assert_eq!(model.symbol(1), "1");
    }

    #[test]
    fn test_matrix_agrees_with_pointwise() {
        let model = BinaryModel::new(0.3, 1.7).unwrap();
        let p = TransitionModel::transition_matrix(&model, 0.8);

        for i in 0..2 {
            for j in 0..2 {
                assert_eq!(p[[i, j]], model.transition_probability(i, j, 0.8));
            }
        }
    }

    #[test]
    fn test_rejects_negative_rates() {
        assert!(BinaryModel::new(-1.0, 1.0).is_err());
        assert!(BinaryModel::new(1.0, f64::NAN).is_err());
    }
}
