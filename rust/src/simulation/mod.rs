//! Tree simulation: cached transition rows, tree walkers and output assembly.
//!
//! This module provides:
//! - TransitionCache: cumulative rows per branch and rate category
//! - TreeWalker: state-only propagation, one site or a batch
//! - DetailedTreeWalker: full jump chains per branch
//! - Site / Alignment: leaf states translated to symbols
//! - SequenceSimulator: facade with single-site, alignment and history entry points

pub mod sampling;
pub mod config;
pub mod cache;
pub mod walker;
pub mod detailed;
pub mod assembler;
pub mod simulator;

pub use config::SimulationConfig;
pub use cache::TransitionCache;
pub use walker::TreeWalker;
pub use detailed::{DetailedTreeWalker, SiteHistory};
pub use assembler::{Alignment, Site};
pub use simulator::SequenceSimulator;
