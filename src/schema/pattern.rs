use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::core::rng::Rng;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// A titled piece of pattern text. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub title: String,
    pub text: String,
}

/// Patterns grouped under a single bank symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternBank {
    pub symbol: char,
    #[serde(default)]
    pub title: String,
    pub patterns: Vec<Pattern>,
}

impl PatternBank {
    /// Load a pattern bank from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<PatternBank, PatternError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<PatternBank, PatternError> {
        Ok(ron::from_str(input)?)
    }

    /// Look up a pattern by title.
    pub fn get(&self, title: &str) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.title == title)
    }

    /// Pick a pattern uniformly at random.
    pub fn random(&self, rng: &mut Rng) -> Option<&Pattern> {
        if self.patterns.is_empty() {
            return None;
        }
        let index = rng.next_below(self.patterns.len() as u32) as usize;
        self.patterns.get(index)
    }
}
