/// The pattern engine: owns the banks and the cross-run state, and runs
/// expansion then interpretation for every generation call.

use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::diagnostic::{Diagnostic, Severity, Stage};
use crate::core::expand::{Expander, DEFAULT_MAX_DEPTH};
use crate::core::interpreter::{Interpreter, DEFAULT_LINE_BREAK};
use crate::core::output::Output;
use crate::core::rng::Rng;
use crate::core::wordbank::{WordBank, WordBankError};
use crate::schema::definition::{Definition, DefinitionError, DefinitionKind, DefinitionTable};
use crate::schema::pattern::{PatternBank, PatternError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Preprocessor(Diagnostic),
    #[error("{0}")]
    Interpreter(Diagnostic),
    #[error("word bank error: {0}")]
    WordBank(#[from] WordBankError),
    #[error("pattern error: {0}")]
    Pattern(#[from] PatternError),
    #[error("definition error: {0}")]
    Definition(#[from] DefinitionError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no pattern bank registered for symbol '{0}'")]
    UnknownPatternBank(char),
    #[error("pattern '{title}' not found in bank '{symbol}'")]
    PatternNotFound { symbol: char, title: String },
}

/// The top-level engine. Built via `PatternEngine::builder()`.
///
/// Banks are read-only during generation. Global flags and cached global
/// values persist across calls and are mutated through `&mut self`, so
/// sharing one engine between threads needs external locking.
pub struct PatternEngine {
    word_banks: FxHashMap<char, WordBank>,
    pattern_banks: FxHashMap<char, PatternBank>,
    definitions: DefinitionTable,
    global_values: FxHashMap<String, String>,
    global_flags: FxHashSet<String>,
    diagnostics: Vec<Diagnostic>,
    line_break: String,
    max_expansion_depth: usize,
}

/// Builder for constructing a `PatternEngine`.
pub struct PatternEngineBuilder {
    word_banks_dir: Option<PathBuf>,
    patterns_dir: Option<PathBuf>,
    definitions_path: Option<PathBuf>,
    /// Directly provided word banks (for testing without files).
    word_banks: Vec<WordBank>,
    /// Directly provided pattern banks (for testing without files).
    patterns: Vec<PatternBank>,
    /// Directly provided definitions (for testing without files).
    definitions: Option<DefinitionTable>,
    line_break: String,
    max_expansion_depth: usize,
}

impl PatternEngine {
    pub fn builder() -> PatternEngineBuilder {
        PatternEngineBuilder {
            word_banks_dir: None,
            patterns_dir: None,
            definitions_path: None,
            word_banks: Vec::new(),
            patterns: Vec::new(),
            definitions: None,
            line_break: DEFAULT_LINE_BREAK.to_string(),
            max_expansion_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Warnings and the fatal error (if any) of the last generation call.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Resolve macro and global references without interpreting.
    pub fn expand(&mut self, pattern: &str) -> Result<String, EngineError> {
        self.diagnostics.clear();
        self.expand_text(pattern)
    }

    /// Expand and interpret `pattern`.
    pub fn interpret(&mut self, rng: &mut Rng, pattern: &str) -> Result<Output, EngineError> {
        self.diagnostics.clear();
        self.run(rng, pattern)
    }

    /// Interpret the pattern titled `title` from bank `symbol`.
    pub fn interpret_pattern(
        &mut self,
        rng: &mut Rng,
        symbol: char,
        title: &str,
    ) -> Result<Output, EngineError> {
        self.diagnostics.clear();
        let bank = self
            .pattern_banks
            .get(&symbol)
            .ok_or(EngineError::UnknownPatternBank(symbol))?;
        let text = bank
            .get(title)
            .ok_or_else(|| EngineError::PatternNotFound {
                symbol,
                title: title.to_string(),
            })?
            .text
            .clone();
        self.run(rng, &text)
    }

    /// Interpret a pattern picked at random from bank `symbol`.
    pub fn interpret_random_pattern(
        &mut self,
        rng: &mut Rng,
        symbol: char,
    ) -> Result<Output, EngineError> {
        self.diagnostics.clear();
        let bank = self
            .pattern_banks
            .get(&symbol)
            .ok_or(EngineError::UnknownPatternBank(symbol))?;
        let text = bank
            .random(rng)
            .ok_or_else(|| EngineError::PatternNotFound {
                symbol,
                title: String::new(),
            })?
            .text
            .clone();
        self.run(rng, &text)
    }

    /// Evaluate every global once, in name order, and cache its `main`
    /// output. A global referenced by another is evaluated first, so every
    /// `&[name]` in one pass sees the same cached value.
    pub fn assign_globals(&mut self, rng: &mut Rng) -> Result<(), EngineError> {
        self.diagnostics.clear();
        self.global_values.clear();
        let names: Vec<String> = self
            .definitions
            .global_names()
            .into_iter()
            .map(String::from)
            .collect();
        let mut pending = Vec::new();
        for name in names {
            self.assign_global(rng, &name, &mut pending)?;
        }
        Ok(())
    }

    /// Evaluate `name` after the uncached globals its body references.
    /// A reference back into `pending` is left to the expander, which
    /// reports a self-reference or runs into the depth limit.
    fn assign_global(
        &mut self,
        rng: &mut Rng,
        name: &str,
        pending: &mut Vec<String>,
    ) -> Result<(), EngineError> {
        if self.global_values.contains_key(name) || pending.iter().any(|p| p == name) {
            return Ok(());
        }
        let body = match self.definitions.get(DefinitionKind::Global, name) {
            Some(body) => body.to_string(),
            None => return Ok(()),
        };

        let references = Expander::new(&self.definitions, &self.global_values)
            .with_max_depth(self.max_expansion_depth)
            .global_references(&body);
        pending.push(name.to_string());
        for reference in references {
            self.assign_global(rng, &reference, pending)?;
        }
        pending.pop();

        let output = self.run(rng, &body)?;
        log::debug!("assigned global '{}' = {:?}", name, output.main());
        self.global_values.insert(name.to_string(), output.main().to_string());
        Ok(())
    }

    pub fn define_macro(&mut self, name: &str, body: &str) {
        self.definitions.insert(Definition {
            kind: DefinitionKind::Macro,
            name: name.to_string(),
            body: body.to_string(),
        });
    }

    /// Define or replace a global. Any cached value for it is dropped.
    pub fn define_global(&mut self, name: &str, body: &str) {
        self.global_values.remove(name);
        self.definitions.insert(Definition {
            kind: DefinitionKind::Global,
            name: name.to_string(),
            body: body.to_string(),
        });
    }

    /// The cached value of a global, once `assign_globals` has run.
    pub fn global_value(&self, name: &str) -> Option<&str> {
        self.global_values.get(name).map(String::as_str)
    }

    pub fn definitions(&self) -> &DefinitionTable {
        &self.definitions
    }

    pub fn set_flag(&mut self, name: &str) {
        self.global_flags.insert(name.to_string());
    }

    pub fn unset_flag(&mut self, name: &str) {
        self.global_flags.remove(name);
    }

    pub fn flag_is_set(&self, name: &str) -> bool {
        self.global_flags.contains(name)
    }

    pub fn clear_global_flags(&mut self) {
        self.global_flags.clear();
    }

    /// Register a word bank, returning the one it replaces.
    pub fn add_word_bank(&mut self, bank: WordBank) -> Option<WordBank> {
        self.word_banks.insert(bank.symbol(), bank)
    }

    pub fn word_bank(&self, symbol: char) -> Option<&WordBank> {
        self.word_banks.get(&symbol)
    }

    /// Register a pattern bank, returning the one it replaces.
    pub fn add_pattern_bank(&mut self, bank: PatternBank) -> Option<PatternBank> {
        self.pattern_banks.insert(bank.symbol, bank)
    }

    pub fn pattern_bank(&self, symbol: char) -> Option<&PatternBank> {
        self.pattern_banks.get(&symbol)
    }

    /// Run the freshness pass over every word bank, in symbol order.
    pub fn reshuffle_weights(&mut self, rng: &mut Rng, factor: u32) {
        let mut symbols: Vec<char> = self.word_banks.keys().copied().collect();
        symbols.sort_unstable();
        for symbol in symbols {
            if let Some(bank) = self.word_banks.get_mut(&symbol) {
                bank.reshuffle_weights(rng, factor);
            }
        }
    }

    fn expand_text(&mut self, pattern: &str) -> Result<String, EngineError> {
        let expander = Expander::new(&self.definitions, &self.global_values)
            .with_max_depth(self.max_expansion_depth);
        expander.expand(pattern).map_err(|e| {
            let diagnostic = Diagnostic::at(
                Severity::Error,
                Stage::Preprocessor,
                e.to_string(),
                pattern,
                e.index(),
            );
            self.diagnostics.push(diagnostic.clone());
            EngineError::Preprocessor(diagnostic)
        })
    }

    fn run(&mut self, rng: &mut Rng, pattern: &str) -> Result<Output, EngineError> {
        let expanded = self.expand_text(pattern)?;

        let mut warnings = Vec::new();
        let result = Interpreter::new(&self.word_banks)
            .with_line_break(&self.line_break)
            .interpret(rng, &expanded, &mut self.global_flags, &mut warnings);

        for warning in &warnings {
            self.diagnostics.push(Diagnostic::at(
                Severity::Warning,
                Stage::Interpreter,
                warning.to_string(),
                &expanded,
                warning.index(),
            ));
        }

        result.map_err(|e| {
            let diagnostic = Diagnostic::at(
                Severity::Error,
                Stage::Interpreter,
                e.to_string(),
                &expanded,
                e.index(),
            );
            self.diagnostics.push(diagnostic.clone());
            EngineError::Interpreter(diagnostic)
        })
    }
}

impl PatternEngineBuilder {
    pub fn word_banks_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.word_banks_dir = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn patterns_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.patterns_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// A RON file of macro and global definitions.
    pub fn definitions(mut self, path: impl AsRef<Path>) -> Self {
        self.definitions_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Provide word banks directly (for testing without files).
    pub fn with_word_banks(mut self, banks: Vec<WordBank>) -> Self {
        self.word_banks = banks;
        self
    }

    /// Provide pattern banks directly (for testing without files).
    pub fn with_patterns(mut self, patterns: Vec<PatternBank>) -> Self {
        self.patterns = patterns;
        self
    }

    /// Provide definitions directly (for testing without files).
    pub fn with_definitions(mut self, definitions: DefinitionTable) -> Self {
        self.definitions = Some(definitions);
        self
    }

    /// Text emitted for `|` and newlines. Defaults to `"\r\n"`.
    pub fn line_break(mut self, line_break: &str) -> Self {
        self.line_break = line_break.to_string();
        self
    }

    pub fn max_expansion_depth(mut self, depth: usize) -> Self {
        self.max_expansion_depth = depth;
        self
    }

    pub fn build(self) -> Result<PatternEngine, EngineError> {
        let mut word_banks = FxHashMap::default();
        let mut pattern_banks = FxHashMap::default();
        let mut definitions = self.definitions.unwrap_or_default();

        // Files first; directly provided content overrides them.
        if let Some(ref dir) = self.word_banks_dir {
            if dir.exists() {
                load_ron_files_from_dir(dir, |path| {
                    let bank = WordBank::load_from_ron(path)?;
                    log::debug!("loaded word bank '{}' from {}", bank.symbol(), path.display());
                    word_banks.insert(bank.symbol(), bank);
                    Ok(())
                })?;
            }
        }

        if let Some(ref dir) = self.patterns_dir {
            if dir.exists() {
                load_ron_files_from_dir(dir, |path| {
                    let bank = PatternBank::load_from_ron(path)?;
                    log::debug!("loaded pattern bank '{}' from {}", bank.symbol, path.display());
                    pattern_banks.insert(bank.symbol, bank);
                    Ok(())
                })?;
            }
        }

        if let Some(ref path) = self.definitions_path {
            if path.exists() {
                let mut loaded = DefinitionTable::load_from_ron(path)?;
                log::debug!(
                    "loaded {} macros and {} globals from {}",
                    loaded.macros.len(),
                    loaded.globals.len(),
                    path.display()
                );
                loaded.merge(definitions);
                definitions = loaded;
            }
        }

        for bank in self.word_banks {
            word_banks.insert(bank.symbol(), bank);
        }
        for bank in self.patterns {
            pattern_banks.insert(bank.symbol, bank);
        }

        Ok(PatternEngine {
            word_banks,
            pattern_banks,
            definitions,
            global_values: FxHashMap::default(),
            global_flags: FxHashSet::default(),
            diagnostics: Vec::new(),
            line_break: self.line_break,
            max_expansion_depth: self.max_expansion_depth,
        })
    }
}

/// Load all .ron files from a directory, in file name order, calling
/// `loader` for each.
fn load_ron_files_from_dir<F>(dir: &Path, mut loader: F) -> Result<(), EngineError>
where
    F: FnMut(&Path) -> Result<(), EngineError>,
{
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) == Some("ron") {
            paths.push(path);
        }
    }
    paths.sort();
    for path in paths {
        loader(&path)?;
    }
    Ok(())
}
