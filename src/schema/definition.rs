use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DefinitionKind {
    /// `=[name]`: body substituted inline.
    Macro,
    /// `&[name]`: evaluated once and cached as a resolved string.
    Global,
}

impl DefinitionKind {
    /// The character that introduces a reference of this kind.
    pub fn sigil(&self) -> char {
        match self {
            Self::Macro => '=',
            Self::Global => '&',
        }
    }
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Macro => write!(f, "macro"),
            Self::Global => write!(f, "global"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub kind: DefinitionKind,
    pub name: String,
    pub body: String,
}

/// Macro and global bodies, keyed by name. The two kinds live in
/// separate namespaces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionTable {
    pub macros: FxHashMap<String, String>,
    pub globals: FxHashMap<String, String>,
}

impl DefinitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a definition.
    pub fn insert(&mut self, definition: Definition) {
        let table = match definition.kind {
            DefinitionKind::Macro => &mut self.macros,
            DefinitionKind::Global => &mut self.globals,
        };
        table.insert(definition.name, definition.body);
    }

    pub fn get(&self, kind: DefinitionKind, name: &str) -> Option<&str> {
        let table = match kind {
            DefinitionKind::Macro => &self.macros,
            DefinitionKind::Global => &self.globals,
        };
        table.get(name).map(String::as_str)
    }

    /// Global names in sorted order, so evaluation order is reproducible.
    pub fn global_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.globals.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty() && self.globals.is_empty()
    }

    /// Load a definition list from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<DefinitionTable, DefinitionError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a RON list of `(kind: Macro|Global, name: "...", body: "...")`.
    pub fn parse_ron(input: &str) -> Result<DefinitionTable, DefinitionError> {
        let definitions: Vec<Definition> = ron::from_str(input)?;
        let mut table = DefinitionTable::new();
        for definition in definitions {
            table.insert(definition);
        }
        Ok(table)
    }

    /// Merge another table into this one. Entries from `other` win.
    pub fn merge(&mut self, other: DefinitionTable) {
        self.macros.extend(other.macros);
        self.globals.extend(other.globals);
    }
}
