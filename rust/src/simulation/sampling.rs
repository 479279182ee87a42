//! Inverse-CDF draws shared by every walker.
//!
//! Two comparison conventions apply:
//! - end states: first `y` with `draw < cum[y]`
//! - root states: first `x` with `cum[x] >= draw`

use ndarray::ArrayView1;
use rand::Rng;

use crate::error::{Result, SimulationError};
use crate::model::TransitionModel;

/// First index whose cumulative value exceeds `draw`.
pub fn draw_from_cumulative(row: ArrayView1<f64>, draw: f64) -> Result<usize> {
    row.iter()
        .position(|&cum| draw < cum)
        .ok_or_else(|| SimulationError::NormalizationDefect {
            node: None,
            draw,
            row: row.to_vec(),
        })
}

/// Accumulate `probabilities` in order and stop at the first cumulative value
/// exceeding `draw`.
pub fn draw_from_probabilities(probabilities: &[f64], draw: f64) -> Result<usize> {
    let mut cum = 0.0;
    for (y, &p) in probabilities.iter().enumerate() {
        cum += p;
        if draw < cum {
            return Ok(y);
        }
    }
    Err(SimulationError::NormalizationDefect {
        node: None,
        draw,
        row: cumulative(probabilities),
    })
}

/// End state of a branch of length `time` evaluated directly on the model.
pub fn draw_end_state<M, R>(model: &M, start: usize, time: f64, rng: &mut R) -> Result<usize>
where
    M: TransitionModel + ?Sized,
    R: Rng + ?Sized,
{
    let draw: f64 = rng.gen();
    let n_states = model.n_states();
    let mut cum = 0.0;
    for y in 0..n_states {
        cum += model.transition_probability(start, y, time);
        if draw < cum {
            return Ok(y);
        }
    }
    let row: Vec<f64> = (0..n_states)
        .map(|y| model.transition_probability(start, y, time))
        .collect();
    Err(SimulationError::NormalizationDefect {
        node: None,
        draw,
        row: cumulative(&row),
    })
}

/// Root state drawn from the equilibrium frequencies.
pub fn draw_equilibrium_state<M, R>(model: &M, rng: &mut R) -> Result<usize>
where
    M: TransitionModel + ?Sized,
    R: Rng + ?Sized,
{
    let draw: f64 = rng.gen();
    let n_states = model.n_states();
    let mut cum = 0.0;
    for x in 0..n_states {
        cum += model.equilibrium_frequency(x);
        if cum >= draw {
            return Ok(x);
        }
    }
    let frequencies: Vec<f64> = (0..n_states).map(|x| model.equilibrium_frequency(x)).collect();
    Err(SimulationError::NormalizationDefect {
        node: None,
        draw,
        row: cumulative(&frequencies),
    })
}

pub(crate) fn cumulative(probabilities: &[f64]) -> Vec<f64> {
    probabilities
        .iter()
        .scan(0.0, |acc, &p| {
            *acc += p;
            Some(*acc)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BinaryModel;
    use crate::test_support::ConstantRng;
    use ndarray::array;

    #[test]
    fn test_cumulative_draw_uses_strict_comparison() {
        let row = array![0.25, 0.25, 1.0];

        assert_eq!(draw_from_cumulative(row.view(), 0.0).unwrap(), 0);
        // Zero-mass state 1 is skipped
        assert_eq!(draw_from_cumulative(row.view(), 0.25).unwrap(), 2);
        assert_eq!(draw_from_cumulative(row.view(), 0.999).unwrap(), 2);
    }

    #[test]
    fn test_exhausted_row_is_a_defect() {
        let row = array![0.2, 0.5];

        match draw_from_cumulative(row.view(), 0.7) {
            Err(SimulationError::NormalizationDefect { draw, row, .. }) => {
                assert_eq!(draw, 0.7);
                assert_eq!(row, vec![0.2, 0.5]);
            }
            other => panic!("expected a normalization defect, got {other:?}"),
        }
        assert!(draw_from_probabilities(&[0.1, 0.1], 0.5).is_err());
    }

    #[test]
    fn test_probabilities_draw() {
        assert_eq!(draw_from_probabilities(&[0.0, 0.3, 0.7], 0.0).unwrap(), 1);
        assert_eq!(draw_from_probabilities(&[0.0, 0.3, 0.7], 0.3).unwrap(), 2);
        assert_eq!(cumulative(&[0.5, 0.25, 0.25]), vec![0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_equilibrium_draw_is_inclusive() {
        // Gain only: π = (0, 1); a zero draw lands on state 0 since 0 >= 0
        let model = BinaryModel::new(1.0, 0.0).unwrap();
        assert_eq!(draw_equilibrium_state(&model, &mut ConstantRng(0)).unwrap(), 0);
        // A draw close to one lands on state 1
        assert_eq!(draw_equilibrium_state(&model, &mut ConstantRng(u64::MAX)).unwrap(), 1);
    }
}
