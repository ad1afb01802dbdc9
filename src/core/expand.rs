/// Macro (`=[name]`) and global (`&[name]`) substitution, run before interpretation.

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::schema::definition::{DefinitionKind, DefinitionTable};

/// Default nesting limit for definition bodies.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Characters with structural meaning to the interpreter.
const STRUCTURAL: &[char] = &[
    '\\', '{', '}', '[', ']', '<', '>', '/', '|', '+', '^', '$', '#', '*', '~', '@', '=', '&',
    '%', '\r', '\n',
];

/// Expansion failures. `index` is a char index into the text handed to
/// [`Expander::expand`]; failures inside a definition body are reported at
/// the outermost reference that led to them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpandError {
    #[error("unknown macro '{name}'")]
    UnknownMacro { name: String, index: usize },
    #[error("unknown global '{name}'")]
    UnknownGlobal { name: String, index: usize },
    #[error("{kind} '{name}' references itself")]
    SelfReference {
        kind: DefinitionKind,
        name: String,
        index: usize,
    },
    #[error("malformed reference: {message}")]
    Malformed { message: String, index: usize },
    #[error("definitions nested deeper than {limit} levels")]
    DepthExceeded { limit: usize, index: usize },
}

impl ExpandError {
    pub fn index(&self) -> usize {
        match self {
            Self::UnknownMacro { index, .. }
            | Self::UnknownGlobal { index, .. }
            | Self::SelfReference { index, .. }
            | Self::Malformed { index, .. }
            | Self::DepthExceeded { index, .. } => *index,
        }
    }

    fn at(mut self, at: usize) -> Self {
        match &mut self {
            Self::UnknownMacro { index, .. }
            | Self::UnknownGlobal { index, .. }
            | Self::SelfReference { index, .. }
            | Self::Malformed { index, .. }
            | Self::DepthExceeded { index, .. } => *index = at,
        }
        self
    }
}

/// Escape every structural character so `text` is emitted verbatim.
pub fn escape_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if STRUCTURAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Recursive definition substitution.
///
/// Self-reference detection only looks at the immediately enclosing
/// definition: `a -> a` is caught, `a -> b -> a` is not and runs until the
/// depth limit.
pub struct Expander<'a> {
    definitions: &'a DefinitionTable,
    global_values: &'a FxHashMap<String, String>,
    max_depth: usize,
}

impl<'a> Expander<'a> {
    pub fn new(
        definitions: &'a DefinitionTable,
        global_values: &'a FxHashMap<String, String>,
    ) -> Self {
        Self {
            definitions,
            global_values,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn expand(&self, text: &str) -> Result<String, ExpandError> {
        if !text.contains(|c: char| c == '=' || c == '&') {
            return Ok(text.to_string());
        }
        self.expand_inner(text, None, 0)
    }

    fn expand_inner(
        &self,
        text: &str,
        parent: Option<(DefinitionKind, &str)>,
        depth: usize,
    ) -> Result<String, ExpandError> {
        if depth > self.max_depth {
            return Err(ExpandError::DepthExceeded {
                limit: self.max_depth,
                index: 0,
            });
        }

        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if c == '\\' {
                // Escapes pass through untouched for the interpreter.
                out.push(c);
                if let Some(&next) = chars.get(i + 1) {
                    out.push(next);
                }
                i += 2;
                continue;
            }

            let kind = match c {
                '=' => DefinitionKind::Macro,
                '&' => DefinitionKind::Global,
                _ => {
                    out.push(c);
                    i += 1;
                    continue;
                }
            };
            if chars.get(i + 1) != Some(&'[') {
                out.push(c);
                i += 1;
                continue;
            }

            let close = chars[i + 2..]
                .iter()
                .position(|&ch| ch == ']')
                .map(|p| p + i + 2)
                .ok_or_else(|| ExpandError::Malformed {
                    message: format!("unterminated {} reference", kind),
                    index: i,
                })?;
            let name_text: String = chars[i + 2..close].iter().collect();

            let names: Vec<&str> = match kind {
                DefinitionKind::Macro => name_text.split('+').collect(),
                DefinitionKind::Global => vec![name_text.as_str()],
            };
            for name in names {
                let name = name.trim();
                if name.is_empty() {
                    return Err(ExpandError::Malformed {
                        message: format!("empty {} name", kind),
                        index: i,
                    });
                }
                if parent == Some((kind, name)) {
                    return Err(ExpandError::SelfReference {
                        kind,
                        name: name.to_string(),
                        index: i,
                    });
                }
                let resolved = self.resolve(kind, name, depth).map_err(|e| e.at(i))?;
                out.push_str(&resolved);
            }
            i = close + 1;
        }

        Ok(out)
    }

    /// Uncached globals named in `text` or in the macros it reaches, in
    /// order of first appearance. Global bodies are not entered. Malformed
    /// and unknown references are skipped; [`Expander::expand`] reports them.
    pub fn global_references(&self, text: &str) -> Vec<String> {
        let mut found = Vec::new();
        self.collect_globals(text, None, 0, &mut found);
        found
    }

    /// Returns `false` once the depth limit is hit, which ends the scan.
    fn collect_globals(
        &self,
        text: &str,
        parent: Option<&str>,
        depth: usize,
        found: &mut Vec<String>,
    ) -> bool {
        if depth > self.max_depth {
            return false;
        }
        let chars: Vec<char> = text.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let kind = match chars[i] {
                '\\' => {
                    i += 2;
                    continue;
                }
                '=' => DefinitionKind::Macro,
                '&' => DefinitionKind::Global,
                _ => {
                    i += 1;
                    continue;
                }
            };
            if chars.get(i + 1) != Some(&'[') {
                i += 1;
                continue;
            }
            let Some(close) = chars[i + 2..].iter().position(|&c| c == ']') else {
                return true;
            };
            let close = close + i + 2;
            let name_text: String = chars[i + 2..close].iter().collect();

            match kind {
                DefinitionKind::Global => {
                    let name = name_text.trim();
                    if !name.is_empty()
                        && !self.global_values.contains_key(name)
                        && !found.iter().any(|f| f == name)
                    {
                        found.push(name.to_string());
                    }
                }
                DefinitionKind::Macro => {
                    for name in name_text.split('+').map(str::trim) {
                        if parent == Some(name) {
                            continue;
                        }
                        let Some(body) = self.definitions.get(DefinitionKind::Macro, name) else {
                            continue;
                        };
                        if !self.collect_globals(body, Some(name), depth + 1, found) {
                            return false;
                        }
                    }
                }
            }
            i = close + 1;
        }
        true
    }

    fn resolve(
        &self,
        kind: DefinitionKind,
        name: &str,
        depth: usize,
    ) -> Result<String, ExpandError> {
        if kind == DefinitionKind::Global {
            if let Some(value) = self.global_values.get(name) {
                return Ok(escape_literal(value));
            }
        }
        let body = self.definitions.get(kind, name).ok_or_else(|| match kind {
            DefinitionKind::Macro => ExpandError::UnknownMacro {
                name: name.to_string(),
                index: 0,
            },
            DefinitionKind::Global => ExpandError::UnknownGlobal {
                name: name.to_string(),
                index: 0,
            },
        })?;
        log::debug!("expanding {} '{}' at depth {}", kind, name, depth + 1);
        self.expand_inner(body, Some((kind, name)), depth + 1)
    }
}
