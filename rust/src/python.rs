use ndarray::Array2;
use numpy::{PyArray2, PyReadonlyArray1};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::wrap_pyfunction;

use crate::error::SimulationError;
use crate::model::{Alphabet, BinaryModel, ReversibleModel, TransitionModel};
use crate::rates::{ConstantRate, GammaRates, RateScheme};
use crate::simulation::{SequenceSimulator, SimulationConfig};
use crate::tree::Tree;

fn to_py_err(e: SimulationError) -> PyErr {
    PyErr::new::<PyValueError, _>(e.to_string())
}

fn build_tree(
    parent_indices: PyReadonlyArray1<i32>,
    branch_lengths: PyReadonlyArray1<f64>,
    n_tips: usize,
) -> PyResult<Tree> {
    Tree::from_structure(
        parent_indices.as_array().to_vec(),
        branch_lengths.as_array().to_vec(),
        n_tips,
    )
    .map_err(to_py_err)
}

fn build_config(config: Option<&str>) -> PyResult<SimulationConfig> {
    match config {
        Some(json) => SimulationConfig::from_json(json).map_err(to_py_err),
        None => Ok(SimulationConfig::default()),
    }
}

fn build_nucleotide_model(
    model: &str,
    kappa: f64,
    exchangeabilities: Option<Vec<f64>>,
    frequencies: Option<Vec<f64>>,
) -> PyResult<ReversibleModel> {
    let frequencies = frequencies.unwrap_or_else(|| vec![0.25; 4]);
    let built = match model {
        "jc69" => ReversibleModel::jc69(Alphabet::dna()),
        "k80" => ReversibleModel::k80(kappa),
        "hky85" => ReversibleModel::hky85(kappa, &frequencies),
        "gtr" => {
            let rates: [f64; 6] = exchangeabilities
                .as_deref()
                .and_then(|r| r.try_into().ok())
                .ok_or_else(|| {
                    PyErr::new::<PyValueError, _>("gtr needs exactly 6 exchangeabilities")
                })?;
            ReversibleModel::gtr(&rates, &frequencies)
        }
        other => {
            return Err(PyErr::new::<PyValueError, _>(format!(
                "unknown model '{other}' (expected jc69, k80, hky85 or gtr)"
            )))
        }
    };
    built.map_err(to_py_err)
}

fn alignment_states<M, D>(
    tree: Tree,
    model: M,
    rates: D,
    config: SimulationConfig,
    n_sites: usize,
    seed: u64,
) -> Result<Array2<i64>, SimulationError>
where
    M: TransitionModel,
    D: RateScheme,
{
    let simulator = SequenceSimulator::new(tree, model, rates, config)?;
    let alignment = simulator.simulate_sites_parallel(n_sites, seed)?;
    Ok(alignment.states.mapv(|s| s as i64))
}

fn substitution_counts<D: RateScheme>(
    tree: Tree,
    model: BinaryModel,
    rates: D,
    config: SimulationConfig,
    n_sites: usize,
    seed: u64,
) -> Result<Array2<i64>, SimulationError> {
    let n_nodes = tree.n_nodes;
    let simulator = SequenceSimulator::new(tree, model, rates, config)?;
    let histories = simulator.simulate_histories_parallel(n_sites, seed)?;
    Ok(Array2::from_shape_fn((n_nodes, n_sites), |(node, site)| {
        histories[site].substitution_count(node) as i64
    }))
}

/// Simulate a nucleotide alignment along a tree.
///
/// # Arguments
/// * `parent_indices` - Parent index for each node (-1 for root)
/// * `branch_lengths` - Branch length for each node
/// * `n_tips` - Number of tip nodes (the first `n_tips` nodes)
/// * `n_sites` - Number of sites to simulate
/// * `seed` - Base RNG seed (site i uses seed + i)
/// * `model` - One of "jc69", "k80", "hky85", "gtr"
/// * `gamma_alpha` - Shape of gamma rate heterogeneity; constant rate if None
/// * `config` - Optional JSON simulation config
///
/// # Returns
/// * (n_tips, n_sites) matrix of states, A=0, C=1, G=2, T=3
#[pyfunction]
#[pyo3(signature = (parent_indices, branch_lengths, n_tips, n_sites, seed, model="jc69", kappa=2.0, exchangeabilities=None, frequencies=None, gamma_alpha=None, n_categories=4, config=None))]
fn simulate_alignment<'py>(
    py: Python<'py>,
    parent_indices: PyReadonlyArray1<i32>,
    branch_lengths: PyReadonlyArray1<f64>,
    n_tips: usize,
    n_sites: usize,
    seed: u64,
    model: &str,
    kappa: f64,
    exchangeabilities: Option<Vec<f64>>,
    frequencies: Option<Vec<f64>>,
    gamma_alpha: Option<f64>,
    n_categories: usize,
    config: Option<&str>,
) -> PyResult<&'py PyArray2<i64>> {
    let tree = build_tree(parent_indices, branch_lengths, n_tips)?;
    let model = build_nucleotide_model(model, kappa, exchangeabilities, frequencies)?;
    let config = build_config(config)?;

    let states = match gamma_alpha {
        Some(alpha) => {
            let rates = GammaRates::new(alpha, n_categories).map_err(to_py_err)?;
            alignment_states(tree, model, rates, config, n_sites, seed)
        }
        None => alignment_states(tree, model, ConstantRate::default(), config, n_sites, seed),
    }
    .map_err(to_py_err)?;

    Ok(PyArray2::from_owned_array(py, states))
}

/// Simulate gain/loss histories and count substitutions per branch.
///
/// # Returns
/// * (n_nodes, n_sites) substitution counts; the root row is zero
#[pyfunction]
#[pyo3(signature = (parent_indices, branch_lengths, n_tips, gain_rate, loss_rate, n_sites, seed, gamma_alpha=None, n_categories=4, config=None))]
fn simulate_histories<'py>(
    py: Python<'py>,
    parent_indices: PyReadonlyArray1<i32>,
    branch_lengths: PyReadonlyArray1<f64>,
    n_tips: usize,
    gain_rate: f64,
    loss_rate: f64,
    n_sites: usize,
    seed: u64,
    gamma_alpha: Option<f64>,
    n_categories: usize,
    config: Option<&str>,
) -> PyResult<&'py PyArray2<i64>> {
    let tree = build_tree(parent_indices, branch_lengths, n_tips)?;
    let model = BinaryModel::new(gain_rate, loss_rate).map_err(to_py_err)?;
    let config = build_config(config)?;

    let counts = match gamma_alpha {
        Some(alpha) => {
            let rates = GammaRates::new(alpha, n_categories).map_err(to_py_err)?;
            substitution_counts(tree, model, rates, config, n_sites, seed)
        }
        None => substitution_counts(tree, model, ConstantRate::default(), config, n_sites, seed),
    }
    .map_err(to_py_err)?;

    Ok(PyArray2::from_owned_array(py, counts))
}

/// Python module definition
#[pymodule]
fn phylosim(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(simulate_alignment, m)?)?;
    m.add_function(wrap_pyfunction!(simulate_histories, m)?)?;
    Ok(())
}
