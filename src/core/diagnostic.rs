/// Line/column-tagged diagnostics collected during a generation call.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::cursor::line_col;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Aborted the pass.
    Error,
    /// Recorded; generation continued with an empty emission.
    Warning,
}

/// Which pass produced a diagnostic, and so which text its position refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Macro/global expansion. Positions refer to the pre-expansion text.
    Preprocessor,
    /// Pattern interpretation. Positions refer to the expanded text.
    Interpreter,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Preprocessor => write!(f, "preprocessor"),
            Stage::Interpreter => write!(f, "interpreter"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub stage: Stage,
    pub message: String,
    /// 1-based.
    pub line: usize,
    /// 1-based.
    pub column: usize,
}

impl Diagnostic {
    /// Build a diagnostic for char index `index` of `text`.
    pub fn at(
        severity: Severity,
        stage: Stage,
        message: impl Into<String>,
        text: &str,
        index: usize,
    ) -> Self {
        let prefix: Vec<char> = text.chars().take(index).collect();
        let (line, column) = line_col(&prefix);
        Self {
            severity,
            stage,
            message: message.into(),
            line,
            column,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}:{}): {}",
            self.stage, self.severity, self.line, self.column, self.message
        )
    }
}
