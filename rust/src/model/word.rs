//! Words of independently evolving letters.
//!
//! A word state is the mixed-radix number of its letters, first position most
//! significant. Position p evolves under its own model at relative rate r_p,
//! so P_word(i, j, t) = Π_p P_p(i_p, j_p, t · r_p) and only single-letter
//! changes have non-zero instantaneous rates.
//!
//! Relative rates follow the stick-breaking parameterisation: with
//! parameters ρ_1..ρ_{n-1},
//! r_k = ρ_{k+1} Π_{i<k+1} (1 - ρ_i) for k < n - 1 and
//! r_{n-1} = Π_{i<n} (1 - ρ_i). The default ρ_i = 1/(n - i + 1) gives equal
//! rates 1/n.

use ndarray::Array2;

use super::{Alphabet, TransitionModel};
use crate::error::{Result, SimulationError};

#[derive(Clone, Debug)]
pub struct WordModel<M> {
    letters: Vec<M>,
    rates: Vec<f64>,
    radices: Vec<usize>,
    frequencies: Vec<f64>,
    generator: Array2<f64>,
    alphabet: Alphabet,
}

impl<M: TransitionModel> WordModel<M> {
    /// Word model with equal relative rates.
    pub fn new(letters: Vec<M>) -> Result<Self> {
        let n = letters.len();
        let relative = (1..n).map(|i| 1.0 / (n - i + 1) as f64).collect::<Vec<_>>();
        Self::with_relative_rates(letters, &relative)
    }

    /// Word model with stick-breaking relative rate parameters, one fewer
    /// than the number of positions, each in (0, 1).
    pub fn with_relative_rates(letters: Vec<M>, relative: &[f64]) -> Result<Self> {
        let n = letters.len();
        if n == 0 {
            return Err(SimulationError::InvalidModel {
                reason: "a word model needs at least one position".to_string(),
            });
        }
        if relative.len() != n - 1 {
            return Err(SimulationError::InvalidModel {
                reason: format!(
                    "{n} positions need {} relative rates, got {}",
                    n - 1,
                    relative.len()
                ),
            });
        }
        if relative.iter().any(|&r| !(r > 0.0 && r < 1.0)) {
            return Err(SimulationError::InvalidModel {
                reason: format!("relative rates must lie in (0, 1): {relative:?}"),
            });
        }

        let rates = position_rates(relative);
        let radices: Vec<usize> = letters.iter().map(|m| m.n_states()).collect();
        let n_states: usize = radices.iter().product();

        let letter_alphabets: Vec<&Alphabet> = letters.iter().map(|m| m.alphabet()).collect();
        let alphabet = Alphabet::words(&letter_alphabets)?;

        let mut word = Self {
            letters,
            rates,
            radices,
            frequencies: Vec::new(),
            generator: Array2::zeros((n_states, n_states)),
            alphabet,
        };
        word.frequencies = (0..n_states)
            .map(|state| {
                word.digits(state)
                    .iter()
                    .zip(&word.letters)
                    .map(|(&d, m)| m.equilibrium_frequency(d))
                    .product()
            })
            .collect();
        word.generator = word.build_generator();
        Ok(word)
    }

    pub fn position_rates(&self) -> &[f64] {
        &self.rates
    }

    pub fn letters(&self) -> &[M] {
        &self.letters
    }

    /// Letter states of a word, first position first.
    pub fn digits(&self, mut state: usize) -> Vec<usize> {
        let mut digits = vec![0; self.radices.len()];
        for (p, &radix) in self.radices.iter().enumerate().rev() {
            digits[p] = state % radix;
            state /= radix;
        }
        digits
    }

    fn build_generator(&self) -> Array2<f64> {
        let n = self.alphabet.len();
        let mut q = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            let from = self.digits(i);
            for j in 0..n {
                if i == j {
                    continue;
                }
                let to = self.digits(j);
                let mut changed = from.iter().zip(&to).enumerate().filter(|(_, (a, b))| a != b);
                if let (Some((p, (&a, &b))), None) = (changed.next(), changed.next()) {
                    q[[i, j]] = self.rates[p] * self.letters[p].generator()[[a, b]];
                }
            }
            let row_sum: f64 = q.row(i).sum();
            q[[i, i]] = -row_sum;
        }
        q
    }
}

fn position_rates(relative: &[f64]) -> Vec<f64> {
    let n = relative.len() + 1;
    let mut rates = Vec::with_capacity(n);
    let mut remaining = 1.0;
    for &rho in relative {
        rates.push(remaining * rho);
        remaining *= 1.0 - rho;
    }
    rates.push(remaining);
    rates
}

impl<M: TransitionModel> TransitionModel for WordModel<M> {
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
        self.digits(i)
            .iter()
            .zip(self.digits(j))
            .zip(self.letters.iter().zip(&self.rates))
            .map(|((&a, b), (model, &rate))| model.transition_probability(a, b, t * rate))
            .product()
    }

    fn generator(&self) -> &Array2<f64> {
        &self.generator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BinaryModel, ReversibleModel};
    use approx::assert_abs_diff_eq;

    fn doublet() -> WordModel<ReversibleModel> {
        let letter = ReversibleModel::jc69(Alphabet::dna()).unwrap();
        WordModel::new(vec![letter.clone(), letter]).unwrap()
    }

    #[test]
    fn test_default_rates_are_equal() {
        assert_eq!(position_rates(&[0.5]), vec![0.5, 0.5]);
        let rates = position_rates(&[1.0 / 3.0, 0.5]);
        for r in rates {
            assert_abs_diff_eq!(r, 1.0 / 3.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_word_states_and_symbols() {
        let model = doublet();

        assert_eq!(model.n_states(), 16);
        assert_eq!(model.digits(6), vec![1, 2]);
        assert_eq!(model.symbol(6), "CG");
        assert_abs_diff_eq!(model.equilibrium_frequency(6), 1.0 / 16.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rows_sum_to_one() {
        let model = doublet();
        let p = model.transition_matrix(0.9);
        for row in p.rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_generator_only_single_letter_changes() {
        let model = doublet();
        let q = model.generator();

        // AA -> CC changes two letters
        assert_eq!(q[[0, 5]], 0.0);
        // AA -> AC changes one letter at half rate
        assert_abs_diff_eq!(q[[0, 1]], 0.5 / 3.0, epsilon = 1e-12);
        for row in q.rows() {
            assert_abs_diff_eq!(row.sum(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_mixed_letter_models() {
        let presence = BinaryModel::new(1.0, 1.0).unwrap();
        let other = BinaryModel::new(2.0, 0.5).unwrap();
        let model = WordModel::with_relative_rates(vec![presence, other], &[0.25]).unwrap();

        assert_eq!(model.position_rates(), &[0.25, 0.75]);
        assert_eq!(model.symbol(2), "10");
        let expected = model.letters()[0].transition_probability(0, 1, 0.25)
            * model.letters()[1].transition_probability(1, 1, 0.75);
        assert_abs_diff_eq!(model.transition_probability(1, 3, 1.0), expected, epsilon = 1e-15);
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let letter = BinaryModel::new(1.0, 1.0).unwrap();
        assert!(WordModel::<BinaryModel>::new(vec![]).is_err());
        assert!(WordModel::with_relative_rates(vec![letter.clone(), letter.clone()], &[]).is_err());
        assert!(WordModel::with_relative_rates(vec![letter.clone(), letter], &[1.0]).is_err());
    }
}
