//! Alphabet: internal 0-based state index to external symbol.

use crate::error::{Result, SimulationError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alphabet {
    symbols: Vec<String>,
}

impl Alphabet {
    pub fn new<S: Into<String>>(symbols: impl IntoIterator<Item = S>) -> Result<Self> {
        let symbols: Vec<String> = symbols.into_iter().map(Into::into).collect();
        if symbols.is_empty() {
            return Err(SimulationError::InvalidModel {
                reason: "alphabet must contain at least one symbol".to_string(),
            });
        }
        Ok(Self { symbols })
    }

    /// Nucleotides in A, C, G, T order.
    pub fn dna() -> Self {
        Self {
            symbols: ["A", "C", "G", "T"].iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Presence/absence characters "0" and "1".
    pub fn binary() -> Self {
        Self {
            symbols: vec!["0".to_string(), "1".to_string()],
        }
    }

    /// Symbols "0", "1", ... for an anonymous alphabet of `n` states.
    pub fn numbered(n: usize) -> Result<Self> {
        Self::new((0..n).map(|i| i.to_string()))
    }

    /// Words over several alphabets, first alphabet most significant.
    pub fn words(letters: &[&Alphabet]) -> Result<Self> {
        let mut symbols = vec![String::new()];
        for alphabet in letters {
            symbols = symbols
                .iter()
                .flat_map(|prefix| {
                    alphabet
                        .symbols
                        .iter()
                        .map(move |letter| format!("{prefix}{letter}"))
                })
                .collect();
        }
        Self::new(symbols)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Symbol for an internal state. The state must be below `len()`.
    pub fn symbol(&self, state: usize) -> &str {
        &self.symbols[state]
    }

    pub fn state_of(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }
}
