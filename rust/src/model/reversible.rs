//! General time-reversible substitution model.
//!
//! Q_ij = s_ij π_j for i ≠ j, scaled so that the expected number of
//! substitutions per unit time at equilibrium is one. P(t) comes from the
//! eigendecomposition of the symmetrized matrix D^{1/2} Q D^{-1/2}:
//!
//! P_ij(t) = sqrt(π_j / π_i) Σ_k U_ik U_jk exp(λ_k t)

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2};

use super::{check_frequencies, Alphabet, TransitionModel};
use crate::error::{Result, SimulationError};

const MAX_EIGEN_ITERATIONS: usize = 10_000;

#[derive(Clone, Debug)]
pub struct ReversibleModel {
    alphabet: Alphabet,
    frequencies: Vec<f64>,
    generator: Array2<f64>,
    eigenvalues: Array1<f64>,
    /// Left factor: sqrt(1/π_i) U_ik.
    left: Array2<f64>,
    /// Right factor: U_jk sqrt(π_j), stored transposed as [k, j].
    right: Array2<f64>,
}

impl ReversibleModel {
    /// Build from a symmetric exchangeability matrix and equilibrium
    /// frequencies. The diagonal of `exchangeabilities` is ignored.
    pub fn new(
        alphabet: Alphabet,
        exchangeabilities: &Array2<f64>,
        frequencies: &[f64],
    ) -> Result<Self> {
        let n = alphabet.len();
        if exchangeabilities.shape() != [n, n] || frequencies.len() != n {
            return Err(SimulationError::InvalidModel {
                reason: format!(
                    "alphabet has {n} states but exchangeabilities are {:?} and frequencies have {}",
                    exchangeabilities.shape(),
                    frequencies.len()
                ),
            });
        }
        for ((i, j), &s) in exchangeabilities.indexed_iter() {
            if i != j && (!(s.is_finite() && s >= 0.0) || s != exchangeabilities[[j, i]]) {
                return Err(SimulationError::InvalidModel {
                    reason: format!("exchangeability ({i}, {j}) = {s} is invalid or asymmetric"),
                });
            }
        }
        let pi = check_frequencies(frequencies)?;

        let mut generator = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    generator[[i, j]] = exchangeabilities[[i, j]] * pi[j];
                }
            }
            let row_sum: f64 = generator.row(i).sum();
            generator[[i, i]] = -row_sum;
        }

        let mean_rate: f64 = -(0..n).map(|i| pi[i] * generator[[i, i]]).sum::<f64>();
        if mean_rate <= 0.0 {
            return Err(SimulationError::InvalidModel {
                reason: "all exchangeabilities are zero".to_string(),
            });
        }
        generator /= mean_rate;

        let sqrt_pi: Vec<f64> = pi.iter().map(|p| p.sqrt()).collect();
        let symmetric = DMatrix::from_fn(n, n, |i, j| {
            if i == j {
                generator[[i, i]]
            } else {
                exchangeabilities[[i, j]] * (sqrt_pi[i] * sqrt_pi[j]) / mean_rate
            }
        });
        let eigen = SymmetricEigen::try_new(symmetric, f64::EPSILON, MAX_EIGEN_ITERATIONS)
            .ok_or_else(|| SimulationError::InvalidModel {
                reason: format!(
                    "eigendecomposition did not converge after {MAX_EIGEN_ITERATIONS} iterations"
                ),
            })?;
        let eigenvalues: Array1<f64> = eigen.eigenvalues.iter().copied().collect();
        let vectors = &eigen.eigenvectors;

        let left = Array2::from_shape_fn((n, n), |(i, k)| vectors[(i, k)] / sqrt_pi[i]);
        let right = Array2::from_shape_fn((n, n), |(k, j)| vectors[(j, k)] * sqrt_pi[j]);

        Ok(Self {
            alphabet,
            frequencies: pi,
            generator,
            eigenvalues,
            left,
            right,
        })
    }

    /// Jukes-Cantor: equal exchangeabilities and frequencies.
    pub fn jc69(alphabet: Alphabet) -> Result<Self> {
        let n = alphabet.len();
        let exchangeabilities = Array2::from_elem((n, n), 1.0);
        Self::new(alphabet, &exchangeabilities, &vec![1.0 / n as f64; n])
    }

    /// Kimura two-parameter model on A, C, G, T with transition/transversion
    /// ratio `kappa`.
    pub fn k80(kappa: f64) -> Result<Self> {
        Self::hky85(kappa, &[0.25; 4])
    }

    /// HKY85 on A, C, G, T.
    pub fn hky85(kappa: f64, frequencies: &[f64]) -> Result<Self> {
        if !(kappa.is_finite() && kappa > 0.0) {
            return Err(SimulationError::InvalidModel {
                reason: format!("kappa must be positive, got {kappa}"),
            });
        }
        let exchangeabilities = Array2::from_shape_fn((4, 4), |(i, j)| {
            // A<->G and C<->T are transitions
            if (i, j) == (0, 2) || (i, j) == (2, 0) || (i, j) == (1, 3) || (i, j) == (3, 1) {
                kappa
            } else {
                1.0
            }
        });
        Self::new(Alphabet::dna(), &exchangeabilities, frequencies)
    }

    /// GTR on A, C, G, T from the six rates (AC, AG, AT, CG, CT, GT).
    pub fn gtr(rates: &[f64; 6], frequencies: &[f64]) -> Result<Self> {
        let mut exchangeabilities = Array2::<f64>::zeros((4, 4));
        let pairs = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];
        for (&(i, j), &rate) in pairs.iter().zip(rates.iter()) {
            exchangeabilities[[i, j]] = rate;
            exchangeabilities[[j, i]] = rate;
        }
        Self::new(Alphabet::dna(), &exchangeabilities, frequencies)
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }
}

impl TransitionModel for ReversibleModel {
    fn n_states(&self) -> usize {
        self.alphabet.len()
    }

    fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    fn equilibrium_frequency(&self, state: usize) -> f64 {
        self.frequencies[state]
    }

    fn transition_probability(&self, i: usize, j: usize, t: f64) -> f64 {
        let p: f64 = self
            .eigenvalues
            .iter()
            .enumerate()
            .map(|(k, &lambda)| self.left[[i, k]] * (lambda * t).exp() * self.right[[k, j]])
            .sum();
        // Round-off can leave tiny negatives
        p.max(0.0)
    }

    fn generator(&self) -> &Array2<f64> {
        &self.generator
    }
}
