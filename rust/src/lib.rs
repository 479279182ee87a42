//! Simulation of character evolution along phylogenetic trees.
//!
//! A root state is drawn (or given), then every branch is evolved under a
//! continuous-time Markov substitution model, scaled by a per-site rate.
//! Outputs are single sites, alignments, or full mutational histories.

pub mod error;
pub mod tree;
pub mod model;
pub mod rates;
pub mod simulation;

#[cfg(feature = "python")]
mod python;

#[cfg(test)]
mod test_support;

pub use error::{Result, SimulationError};
pub use tree::Tree;
pub use model::{Alphabet, BinaryModel, MutationEvent, MutationPath, ReversibleModel, TransitionModel, WordModel};
pub use rates::{CategoryRates, ConstantRate, GammaRates, RateMode, RateScheme};
pub use simulation::{
    Alignment,
    DetailedTreeWalker,
    SequenceSimulator,
    SimulationConfig,
    Site,
    SiteHistory,
    TransitionCache,
    TreeWalker,
};
