//! Mutation paths: the jump chain of one lineage along one branch.
//!
//! Paths are sampled conditioned on their end state. The end state is drawn
//! first from the transition row with a single uniform draw, exactly the way
//! the endpoint-only walker draws it, then the intermediate jumps are filled
//! in by uniformization:
//!
//! - R = I + Q/μ with μ = max_i(-Q_ii)
//! - P(n jumps | a → b, t) ∝ Poisson(n; μt) · (Rⁿ)_ab
//! - jump times are uniform order statistics on [0, t]
//! - each jump k picks s' with probability R_ss' (R^{n-k-1})_s'b / (R^{n-k})_sb
//!
//! Virtual jumps (s' == s) are dropped from the recorded path.

use ndarray::{Array1, Array2};
use rand::Rng;

use super::TransitionModel;
use crate::error::{Result, SimulationError};
use crate::simulation::sampling::draw_from_probabilities;

/// Upper bound on uniformized jumps considered for one branch.
pub const MAX_UNIFORMIZED_JUMPS: usize = 100_000;

/// One substitution: the lineage waited `waiting_time` since the previous
/// event (or the start of the branch), then moved to `state`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MutationEvent {
    pub waiting_time: f64,
    pub state: usize,
}

/// Jump chain along one branch.
#[derive(Clone, Debug, PartialEq)]
pub struct MutationPath {
    pub initial_state: usize,
    pub final_state: usize,
    pub total_time: f64,
    pub events: Vec<MutationEvent>,
}

impl MutationPath {
    /// A path without substitutions.
    pub fn constant(state: usize, total_time: f64) -> Self {
        Self {
            initial_state: state,
            final_state: state,
            total_time,
            events: Vec::new(),
        }
    }

    pub fn n_substitutions(&self) -> usize {
        self.events.len()
    }

    /// Event times measured from the start of the branch.
    pub fn event_times(&self) -> Vec<f64> {
        self.events
            .iter()
            .scan(0.0, |elapsed, event| {
                *elapsed += event.waiting_time;
                Some(*elapsed)
            })
            .collect()
    }

    /// State occupied at time `t` along the branch.
    pub fn state_at(&self, t: f64) -> usize {
        let mut state = self.initial_state;
        let mut elapsed = 0.0;
        for event in &self.events {
            elapsed += event.waiting_time;
            if elapsed > t {
                break;
            }
            state = event.state;
        }
        state
    }
}

/// Sample a jump chain from `start` over `time` using the model's generator.
pub fn sample_conditioned_path<M, R>(
    model: &M,
    start: usize,
    time: f64,
    rng: &mut R,
) -> Result<MutationPath>
where
    M: TransitionModel + ?Sized,
    R: Rng + ?Sized,
{
    let n_states = model.n_states();
    if start >= n_states {
        return Err(SimulationError::StateOutOfRange {
            state: start,
            n_states,
        });
    }

    let draw: f64 = rng.gen();
    let row: Vec<f64> = (0..n_states)
        .map(|y| model.transition_probability(start, y, time))
        .collect();
    let end = draw_from_probabilities(&row, draw)?;

    if time <= 0.0 {
        return Ok(MutationPath::constant(start, time.max(0.0)));
    }

    let events = sample_bridge(model.generator(), start, end, time, row[end], rng)?;
    Ok(MutationPath {
        initial_state: start,
        final_state: end,
        total_time: time,
        events,
    })
}

fn sample_bridge<R: Rng + ?Sized>(
    generator: &Array2<f64>,
    start: usize,
    end: usize,
    time: f64,
    p_end: f64,
    rng: &mut R,
) -> Result<Vec<MutationEvent>> {
    let n_states = generator.nrows();
    let mu = (0..n_states)
        .map(|i| -generator[[i, i]])
        .fold(0.0_f64, f64::max);

    if mu <= 0.0 {
        // Frozen chain: no jumps possible
        return Ok(Vec::new());
    }

    let mut uniformized = generator / mu;
    for i in 0..n_states {
        uniformized[[i, i]] += 1.0;
    }

    // columns[m] = R^m e_end
    let mut columns: Vec<Array1<f64>> = Vec::new();
    let mut column = Array1::zeros(n_states);
    column[end] = 1.0;

    let mu_t = mu * time;
    let u = rng.gen::<f64>() * p_end;
    let mut cumulative = 0.0;
    let mut n_jumps = 0;
    // ln Poisson(n; mu t), updated incrementally
    let mut log_weight = -mu_t;
    loop {
        cumulative += log_weight.exp() * column[start];
        columns.push(column.clone());
        if u < cumulative {
            break;
        }
        if n_jumps >= MAX_UNIFORMIZED_JUMPS {
            return Err(SimulationError::InvalidInput {
                reason: format!(
                    "branch too long for uniformization: mu * t = {mu_t} needs more than \
                     {MAX_UNIFORMIZED_JUMPS} jumps"
                ),
            });
        }
        column = uniformized.dot(&column);
        n_jumps += 1;
        log_weight += mu_t.ln() - (n_jumps as f64).ln();
    }

    if n_jumps == 0 {
        return Ok(Vec::new());
    }

    let mut times: Vec<f64> = (0..n_jumps).map(|_| rng.gen::<f64>() * time).collect();
    times.sort_by(|a, b| a.total_cmp(b));

    let mut events = Vec::new();
    let mut state = start;
    let mut last_change = 0.0;
    let mut weights = vec![0.0; n_states];
    for (k, &t) in times.iter().enumerate() {
        let remaining = &columns[n_jumps - k - 1];
        for (next, weight) in weights.iter_mut().enumerate() {
            *weight = uniformized[[state, next]] * remaining[next];
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(SimulationError::NormalizationDefect {
                node: None,
                draw: t,
                row: weights,
            });
        }
        for weight in weights.iter_mut() {
            *weight /= total;
        }
        let next = draw_from_probabilities(&weights, rng.gen())?;
        if next != state {
            events.push(MutationEvent {
                waiting_time: t - last_change,
                state: next,
            });
            last_change = t;
            state = next;
        }
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BinaryModel;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_path_queries() {
        let path = MutationPath {
            initial_state: 0,
            final_state: 0,
            total_time: 2.0,
            events: vec![
                MutationEvent { waiting_time: 0.5, state: 1 },
                MutationEvent { waiting_time: 1.0, state: 0 },
            ],
        };

        assert_eq!(path.n_substitutions(), 2);
        assert_eq!(path.event_times(), vec![0.5, 1.5]);
        assert_eq!(path.state_at(0.2), 0);
        assert_eq!(path.state_at(1.0), 1);
        assert_eq!(path.state_at(1.9), 0);
    }

    #[test]
    fn test_paths_are_consistent_jump_chains() {
        let model = BinaryModel::new(1.5, 0.5).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..500 {
            let path = sample_conditioned_path(&model, 0, 1.3, &mut rng).unwrap();
            let mut state = path.initial_state;
            let mut elapsed = 0.0;
            for event in &path.events {
                assert_ne!(event.state, state);
                assert!(event.waiting_time >= 0.0);
                elapsed += event.waiting_time;
                state = event.state;
            }
            assert!(elapsed <= path.total_time);
            assert_eq!(state, path.final_state);
        }
    }

    #[test]
    fn test_end_state_frequencies_match_transition_row() {
        let model = BinaryModel::new(1.0, 2.0).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let n = 20_000;

        let ones = (0..n)
            .filter(|_| {
                sample_conditioned_path(&model, 0, 0.4, &mut rng)
                    .unwrap()
                    .final_state
                    == 1
            })
            .count();

        let expected = model.transition_probability(0, 1, 0.4);
        assert_abs_diff_eq!(ones as f64 / n as f64, expected, epsilon = 0.015);
    }

    #[test]
    fn test_jump_cap_is_not_a_normalization_defect() {
        let model = BinaryModel::new(1000.0, 1000.0).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        // mu * t = 2e5 lies beyond the jump cap
        match sample_conditioned_path(&model, 0, 200.0, &mut rng) {
            Err(SimulationError::InvalidInput { reason }) => {
                assert!(reason.contains("too long"));
            }
            other => panic!("expected an invalid input error, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_time_path_is_constant() {
        let model = BinaryModel::new(1.0, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        let path = sample_conditioned_path(&model, 1, 0.0, &mut rng).unwrap();
        assert_eq!(path, MutationPath::constant(1, 0.0));
    }
}
