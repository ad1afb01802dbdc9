/// The pattern interpreter: a single pass over expanded text that jumps its
/// read position to pick selector options, cycle repeaters and skip bodies.

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::core::cursor::{Cursor, EOF};
use crate::core::output::{Output, OutputSink, StreamMark, Visibility};
use crate::core::repeater::{RepeaterInstance, RepeaterStep, RepeaterTracker};
use crate::core::rng::{Rng, VALUE_MASK};
use crate::core::wordbank::{subtype_not_found_token, Capitalization, WordBank, WordBankError};
use crate::core::wordcall::WordCall;

/// Line break emitted for `|` and newlines unless configured otherwise.
pub const DEFAULT_LINE_BREAK: &str = "\r\n";

/// Fatal interpreter conditions. `index` is a char index into the expanded text.
#[derive(Debug, Error)]
pub enum InterpretError {
    #[error("unterminated {construct}")]
    Unterminated {
        construct: &'static str,
        index: usize,
    },
    #[error("output group needs a name followed by ':'")]
    MalformedGroup { index: usize },
    #[error("'>' without an open output group")]
    UnmatchedGroupClose { index: usize },
    #[error("frequency of 0% never runs")]
    ZeroFrequency { index: usize },
    #[error("selector needs at least two options, found {options}")]
    SelectorArity { options: usize, index: usize },
    #[error("'}}' without an active selector")]
    UnmatchedSelectorClose { index: usize },
    #[error("uniform tag must be digits followed by a selector")]
    MalformedUniform { index: usize },
    #[error("malformed repeater: {message}")]
    MalformedRepeater { message: String, index: usize },
    #[error("unknown flag function '{name}'")]
    UnknownFlagFunction { name: String, index: usize },
    #[error("malformed flag call: {message}")]
    MalformedFlag { message: String, index: usize },
    #[error("malformed random number: {message}")]
    MalformedNumber { message: String, index: usize },
    #[error("word call failed: {source}")]
    WordCall {
        #[source]
        source: WordBankError,
        index: usize,
    },
}

impl InterpretError {
    pub fn index(&self) -> usize {
        match self {
            Self::Unterminated { index, .. }
            | Self::MalformedGroup { index }
            | Self::UnmatchedGroupClose { index }
            | Self::ZeroFrequency { index }
            | Self::SelectorArity { index, .. }
            | Self::UnmatchedSelectorClose { index }
            | Self::MalformedUniform { index }
            | Self::MalformedRepeater { index, .. }
            | Self::UnknownFlagFunction { index, .. }
            | Self::MalformedFlag { index, .. }
            | Self::MalformedNumber { index, .. }
            | Self::WordCall { index, .. } => *index,
        }
    }
}

/// Recoverable conditions. The construct emits nothing (or a visible
/// breadcrumb) and the run carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpretWarning {
    #[error("word call matches neither grammar")]
    UnrecognizedWordCall { index: usize },
    #[error("no word bank registered for symbol '{symbol}'")]
    UnknownSymbol { symbol: char, index: usize },
    #[error("word bank '{symbol}' has no class '{class}'")]
    UnknownClass {
        symbol: char,
        class: String,
        index: usize,
    },
    #[error("no word in bank '{symbol}' belongs to every class of '{classes}'")]
    EmptyIntersection {
        symbol: char,
        classes: String,
        index: usize,
    },
    #[error("word bank '{symbol}' has no words to pick from")]
    EmptyBank { symbol: char, index: usize },
    #[error("word bank '{symbol}' has no subtype '{subtype}'")]
    SubtypeNotFound {
        symbol: char,
        subtype: String,
        index: usize,
    },
}

impl InterpretWarning {
    pub fn index(&self) -> usize {
        match self {
            Self::UnrecognizedWordCall { index }
            | Self::UnknownSymbol { index, .. }
            | Self::UnknownClass { index, .. }
            | Self::EmptyIntersection { index, .. }
            | Self::EmptyBank { index, .. }
            | Self::SubtypeNotFound { index, .. } => *index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagScope {
    Local,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Set,
    Unset,
    IfSet,
    IfUnset,
}

/// The closed set of `$` functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FlagFunction {
    scope: FlagScope,
    action: FlagAction,
}

impl FlagFunction {
    fn parse(name: &str) -> Option<FlagFunction> {
        let mut chars = name.chars();
        let scope = match chars.next()? {
            'l' => FlagScope::Local,
            'g' => FlagScope::Global,
            _ => return None,
        };
        let action = match chars.next()? {
            's' => FlagAction::Set,
            'u' => FlagAction::Unset,
            '?' => FlagAction::IfSet,
            '!' => FlagAction::IfUnset,
            _ => return None,
        };
        if chars.next().is_some() {
            return None;
        }
        Some(FlagFunction { scope, action })
    }
}

/// Whether `word` takes "an" rather than "a".
pub fn starts_with_vowel_sound(word: &str) -> bool {
    const CONSONANT_SOUNDS: &[&str] = &["uni", "use", "usu", "uti", "eu", "ewe", "one", "once"];
    const VOWEL_SOUNDS: &[&str] = &["hour", "honest", "honor", "heir"];

    let lower = word.trim_start().to_lowercase();
    if VOWEL_SOUNDS.iter().any(|p| lower.starts_with(p)) {
        return true;
    }
    if CONSONANT_SOUNDS.iter().any(|p| lower.starts_with(p)) {
        return false;
    }
    matches!(lower.chars().next(), Some('a' | 'e' | 'i' | 'o' | 'u'))
}

/// A literal `a` waiting to learn whether the next word call needs `an`.
#[derive(Debug, Clone)]
struct PendingArticle {
    marks: Vec<StreamMark>,
    upper: bool,
}

/// Per-run state. Created fresh for every call and dropped at the end,
/// which is what keeps local flags and carriers from leaking between runs.
struct Run<'r> {
    cursor: Cursor,
    sink: OutputSink,
    repeaters: RepeaterTracker,
    /// Index of the closing `}` of each active selector, innermost last.
    selectors: Vec<usize>,
    carriers: FxHashMap<(String, char), FxHashMap<String, usize>>,
    local_flags: FxHashSet<String>,
    global_flags: &'r mut FxHashSet<String>,
    warnings: &'r mut Vec<InterpretWarning>,
    salt: u64,
    pending_uniform: Option<u64>,
    pending_article: Option<PendingArticle>,
    upper: bool,
    proper: bool,
    first_pending: bool,
    last_char: char,
}

/// Runs patterns against a set of word banks.
#[derive(Debug, Clone, Copy)]
pub struct Interpreter<'a> {
    banks: &'a FxHashMap<char, WordBank>,
    line_break: &'a str,
}

impl<'a> Interpreter<'a> {
    pub fn new(banks: &'a FxHashMap<char, WordBank>) -> Self {
        Self {
            banks,
            line_break: DEFAULT_LINE_BREAK,
        }
    }

    pub fn with_line_break(mut self, line_break: &'a str) -> Self {
        self.line_break = line_break;
        self
    }

    /// Interpret already-expanded `text`.
    ///
    /// Global flags are read and written through `global_flags`; warnings
    /// are appended to `warnings` even when the run ends in an error.
    pub fn interpret(
        &self,
        rng: &mut Rng,
        text: &str,
        global_flags: &mut FxHashSet<String>,
        warnings: &mut Vec<InterpretWarning>,
    ) -> Result<Output, InterpretError> {
        let mut run = Run {
            cursor: Cursor::new(text),
            sink: OutputSink::new(),
            repeaters: RepeaterTracker::new(),
            selectors: Vec::new(),
            carriers: FxHashMap::default(),
            local_flags: FxHashSet::default(),
            global_flags,
            warnings,
            salt: rng.peek() as u64,
            pending_uniform: None,
            pending_article: None,
            upper: false,
            proper: false,
            first_pending: false,
            last_char: EOF,
        };

        while !run.cursor.is_at_end() {
            self.step(&mut run, rng)?;
        }
        Ok(run.sink.finish())
    }

    fn step(&self, run: &mut Run<'_>, rng: &mut Rng) -> Result<(), InterpretError> {
        let index = run.cursor.position();
        let c = run.cursor.read_char();
        match c {
            '\\' => {
                let escaped = run.cursor.read_char();
                if escaped != EOF {
                    run.emit_raw(escaped);
                }
            }
            '<' => run.open_group(index)?,
            '>' => {
                if run.sink.pop_group().is_none() {
                    return Err(InterpretError::UnmatchedGroupClose { index });
                }
            }
            '0'..='9' => {
                if !run.frequency(rng, index)? {
                    run.emit_literal(c);
                }
            }
            '{' => run.selector(rng, index)?,
            '/' if !run.selectors.is_empty() => {
                // End of the chosen option: skip the rest of the selector.
                if let Some(end) = run.selectors.pop() {
                    run.cursor.set_position(end + 1);
                }
            }
            '}' => {
                if run.selectors.pop().is_none() {
                    return Err(InterpretError::UnmatchedSelectorClose { index });
                }
            }
            '*' => run.uniform(index)?,
            '^' => run.repeater(rng, index)?,
            ']' => run.close_bracket(index),
            '[' => {}
            '$' => run.flag(index)?,
            '+' => self.word_call(run, rng, index)?,
            '|' | '\n' => run.emit_line_break(self.line_break),
            '\r' => {}
            '~' => {
                if run.cursor.peek_char() == '~' {
                    run.cursor.read_char();
                    run.proper = !run.proper;
                } else {
                    run.first_pending = !run.first_pending;
                }
            }
            '@' => run.upper = !run.upper,
            '#' => run.random_number(rng, index)?,
            _ => run.emit_literal(c),
        }
        Ok(())
    }

    fn word_call(
        &self,
        run: &mut Run<'_>,
        rng: &mut Rng,
        index: usize,
    ) -> Result<(), InterpretError> {
        let Some(call) = WordCall::parse(run.cursor.tail(index)) else {
            run.warn(InterpretWarning::UnrecognizedWordCall { index });
            return Ok(());
        };
        run.cursor.set_position(index + call.len);

        let article = run.pending_article.take();
        let Some(bank) = self.banks.get(&call.symbol) else {
            run.warn(InterpretWarning::UnknownSymbol {
                symbol: call.symbol,
                index,
            });
            return Ok(());
        };

        let Some(word_index) = run.pick_word(bank, &call, rng, index)? else {
            return Ok(());
        };

        let case = run.word_case();
        let word = match bank.resolve_word(word_index, &call.subtype, case) {
            Ok(word) => word,
            Err(WordBankError::SubtypeNotFound { symbol, subtype }) => {
                let token = subtype_not_found_token(symbol, &subtype);
                run.warn(InterpretWarning::SubtypeNotFound {
                    symbol,
                    subtype,
                    index,
                });
                token
            }
            Err(source) => return Err(InterpretError::WordCall { source, index }),
        };

        if let Some(article) = article {
            if starts_with_vowel_sound(&word) {
                let n = if article.upper { "N" } else { "n" };
                run.sink.insert_at(&article.marks, n);
            }
        }
        run.emit_cased(&word);
        Ok(())
    }
}

impl Run<'_> {
    fn warn(&mut self, warning: InterpretWarning) {
        log::warn!("{} (at {})", warning, warning.index());
        self.warnings.push(warning);
    }

    /// Find the `]` closing a block whose `[` sits at `open`.
    fn block_close(
        &self,
        open: usize,
        construct: &'static str,
    ) -> Result<usize, InterpretError> {
        if self.cursor.char_at(open) != '[' {
            return Err(InterpretError::Unterminated {
                construct,
                index: open,
            });
        }
        self.cursor
            .find_square_close(open + 1)
            .ok_or(InterpretError::Unterminated {
                construct,
                index: open,
            })
    }

    fn open_group(&mut self, index: usize) -> Result<(), InterpretError> {
        let close = self
            .cursor
            .find_angle_close(index + 1)
            .ok_or(InterpretError::Unterminated {
                construct: "output group",
                index,
            })?;
        let colon = match self.cursor.find_char(':', index + 1) {
            Some(colon) if colon < close => colon,
            _ => return Err(InterpretError::MalformedGroup { index }),
        };
        let raw_name = self.cursor.slice(index + 1, colon);
        let (_, name) = Visibility::parse(&raw_name);
        if name.is_empty() || name.contains(|c: char| c.is_whitespace()) {
            return Err(InterpretError::MalformedGroup { index });
        }
        self.sink.push_group(&raw_name);
        self.cursor.set_position(colon + 1);
        Ok(())
    }

    /// `NN%[body]`. Returns `false` when the digits at `index` are plain text.
    fn frequency(&mut self, rng: &mut Rng, index: usize) -> Result<bool, InterpretError> {
        let mut end = index;
        while self.cursor.char_at(end).is_ascii_digit() {
            end += 1;
        }
        if self.cursor.char_at(end) != '%' || self.cursor.char_at(end + 1) != '[' {
            return Ok(false);
        }
        let digits = self.cursor.slice(index, end);
        let percent = digits.parse::<u32>().unwrap_or(u32::MAX).min(100);
        if percent == 0 {
            return Err(InterpretError::ZeroFrequency { index });
        }
        let close = self.block_close(end + 1, "frequency body")?;
        if rng.next_below(101) > percent {
            self.cursor.set_position(close + 1);
        } else {
            self.cursor.set_position(end + 2);
        }
        Ok(true)
    }

    fn selector(&mut self, rng: &mut Rng, index: usize) -> Result<(), InterpretError> {
        let close = self
            .cursor
            .find_curly_close(index + 1)
            .ok_or(InterpretError::Unterminated {
                construct: "selector",
                index,
            })?;

        let mut starts = vec![index + 1];
        let mut depth = 0usize;
        let mut i = index + 1;
        while i < close {
            match self.cursor.char_at(i) {
                '\\' => i += 1,
                '{' => depth += 1,
                '}' => depth = depth.saturating_sub(1),
                '/' if depth == 0 => starts.push(i + 1),
                _ => {}
            }
            i += 1;
        }
        if starts.len() < 2 {
            return Err(InterpretError::SelectorArity {
                options: starts.len(),
                index,
            });
        }

        let count = starts.len() as u64;
        let choice = match self.pending_uniform.take() {
            Some(id) => ((Rng::raw(self.salt, id as i64) & VALUE_MASK) % count) as usize,
            None => rng.next_below(count as u32) as usize,
        };
        self.selectors.push(close);
        self.cursor.set_position(starts[choice]);
        Ok(())
    }

    fn uniform(&mut self, index: usize) -> Result<(), InterpretError> {
        let mut end = index + 1;
        while self.cursor.char_at(end).is_ascii_digit() {
            end += 1;
        }
        if end == index + 1 || self.cursor.char_at(end) != '{' {
            return Err(InterpretError::MalformedUniform { index });
        }
        let id = self
            .cursor
            .slice(index + 1, end)
            .parse::<u64>()
            .map_err(|_| InterpretError::MalformedUniform { index })?;
        self.pending_uniform = Some(id);
        self.cursor.set_position(end);
        Ok(())
    }

    fn repeater(&mut self, rng: &mut Rng, index: usize) -> Result<(), InterpretError> {
        let count_close = self.block_close(index + 1, "repeater count")?;
        let sep_close = self.block_close(count_close + 1, "repeater separator")?;
        let content_close = self.block_close(sep_close + 1, "repeater content")?;

        let count_text = self.cursor.slice(index + 2, count_close);
        let max_iterations = parse_repeat_count(count_text.trim(), rng).ok_or_else(|| {
            InterpretError::MalformedRepeater {
                message: format!("invalid count '{}'", count_text),
                index,
            }
        })?;

        let instance = RepeaterInstance {
            content_start: sep_close + 2,
            content_end: content_close,
            sep_start: count_close + 2,
            sep_end: sep_close,
            max_iterations,
            iterations_done: 0,
            on_separator: false,
        };
        let content_start = instance.content_start;
        let flags = instance.iteration_flags();
        let depth = self.repeaters.push(instance);
        self.apply_iteration_flags(depth, flags);
        self.cursor.set_position(content_start);
        Ok(())
    }

    fn apply_iteration_flags(&mut self, depth: usize, flags: [(&'static str, bool); 4]) {
        for (prefix, set) in flags {
            let name = format!("{}_{}", prefix, depth);
            if set {
                self.local_flags.insert(name);
            } else {
                self.local_flags.remove(&name);
            }
        }
    }

    fn close_bracket(&mut self, index: usize) {
        let depth = self.repeaters.depth();
        match self.repeaters.on_close(index) {
            RepeaterStep::EnterSeparator(pos) | RepeaterStep::EnterContent(pos) => {
                // Flags already describe the iteration the separator leads into.
                if let Some(flags) = self.repeaters.top().map(RepeaterInstance::iteration_flags) {
                    self.apply_iteration_flags(depth, flags);
                }
                self.cursor.set_position(pos);
            }
            RepeaterStep::Finished { depth } => {
                for prefix in ["first", "last", "odd", "even"] {
                    self.local_flags.remove(&format!("{}_{}", prefix, depth));
                }
            }
            RepeaterStep::NotABoundary => {}
        }
    }

    fn flag(&mut self, index: usize) -> Result<(), InterpretError> {
        let name = self.cursor.slice(index + 1, index + 3);
        let function =
            FlagFunction::parse(&name).ok_or_else(|| InterpretError::UnknownFlagFunction {
                name: name.clone(),
                index,
            })?;

        let arg_close = self.block_close(index + 3, "flag name")?;
        let flag = self.cursor.slice(index + 4, arg_close).trim().to_string();
        if flag.is_empty() {
            return Err(InterpretError::MalformedFlag {
                message: format!("${} needs a flag name", name),
                index,
            });
        }

        let flags: &mut FxHashSet<String> = match function.scope {
            FlagScope::Local => &mut self.local_flags,
            FlagScope::Global => &mut *self.global_flags,
        };
        match function.action {
            FlagAction::Set => {
                flags.insert(flag);
            }
            FlagAction::Unset => {
                flags.remove(&flag);
            }
            FlagAction::IfSet | FlagAction::IfUnset => {
                let is_set = flags.contains(&flag);
                let body_close = self.block_close(arg_close + 1, "flag body")?;
                let run_body = is_set == (function.action == FlagAction::IfSet);
                let next = if run_body { arg_close + 2 } else { body_close + 1 };
                self.cursor.set_position(next);
                return Ok(());
            }
        }
        self.cursor.set_position(arg_close + 1);
        Ok(())
    }

    fn random_number(&mut self, rng: &mut Rng, index: usize) -> Result<(), InterpretError> {
        let close = self.block_close(index + 1, "random number")?;
        let body = self.cursor.slice(index + 2, close);
        let malformed = |message: String| InterpretError::MalformedNumber { message, index };

        let split = body
            .char_indices()
            .skip(1)
            .find(|&(_, c)| c == '-')
            .map(|(i, _)| i)
            .ok_or_else(|| malformed(format!("expected min-max, found '{}'", body)))?;
        let (min, max) = (body[..split].trim(), body[split + 1..].trim());
        let min: i64 = min
            .parse()
            .map_err(|_| malformed(format!("invalid minimum '{}'", min)))?;
        let max: i64 = max
            .parse()
            .map_err(|_| malformed(format!("invalid maximum '{}'", max)))?;
        if min >= max {
            return Err(malformed(format!("minimum {} is not below maximum {}", min, max)));
        }

        let value = rng.next_range(min, max).to_string();
        self.cursor.set_position(close + 1);
        self.pending_article = None;
        self.emit_word(&value);
        Ok(())
    }

    /// Choose the word index for a call, honouring carriers and class lists.
    /// `Ok(None)` means a warning was recorded and nothing is emitted.
    fn pick_word(
        &mut self,
        bank: &WordBank,
        call: &WordCall,
        rng: &mut Rng,
        index: usize,
    ) -> Result<Option<usize>, InterpretError> {
        let key = (call.class.clone(), call.symbol);
        if let Some(carrier) = &call.carrier {
            if let Some(&cached) = self.carriers.get(&key).and_then(|c| c.get(carrier)) {
                return Ok(Some(cached));
            }
        }

        let picked = match call.class_list() {
            Some(classes) => {
                let candidates = bank
                    .class_intersection(&classes)
                    .map_err(|source| InterpretError::WordCall { source, index })?;
                if candidates.is_empty() {
                    self.warn(InterpretWarning::EmptyIntersection {
                        symbol: call.symbol,
                        classes: call.class.clone(),
                        index,
                    });
                    return Ok(None);
                }
                bank.weighted_pick_among(rng, &candidates)
            }
            None => {
                if !call.class.is_empty() && !bank.has_class(&call.class) {
                    self.warn(InterpretWarning::UnknownClass {
                        symbol: call.symbol,
                        class: call.class.clone(),
                        index,
                    });
                    return Ok(None);
                }
                bank.weighted_pick(rng, &call.class)
            }
        };

        let Some(picked) = picked else {
            self.warn(InterpretWarning::EmptyBank {
                symbol: call.symbol,
                index,
            });
            return Ok(None);
        };
        if let Some(carrier) = &call.carrier {
            self.carriers
                .entry(key)
                .or_default()
                .insert(carrier.clone(), picked);
        }
        Ok(Some(picked))
    }

    /// Case applied to a whole word call.
    fn word_case(&self) -> Capitalization {
        if self.upper {
            Capitalization::Upper
        } else if self.proper {
            Capitalization::Proper
        } else if self.first_pending {
            Capitalization::First
        } else {
            Capitalization::None
        }
    }

    fn emit_word(&mut self, word: &str) {
        let word = self.word_case().apply(word);
        self.emit_cased(&word);
    }

    /// Emit text that already has the current case applied.
    fn emit_cased(&mut self, word: &str) {
        if word.chars().any(char::is_alphanumeric) {
            self.first_pending = false;
        }
        if let Some(last) = word.chars().last() {
            self.last_char = last;
        }
        self.sink.write(word);
    }

    fn emit_literal(&mut self, c: char) {
        let word_start = !self.last_char.is_alphanumeric() && self.last_char != '\'';
        let mut out = c;
        if c.is_alphanumeric() {
            let capitalize = self.upper || self.first_pending || (self.proper && word_start);
            if capitalize {
                out = c.to_uppercase().next().unwrap_or(c);
            }
            self.first_pending = false;
        }

        self.sink.write_char(out);
        self.last_char = c;

        if c.is_alphanumeric() {
            let next = self.cursor.peek_char();
            let standalone_a = matches!(c, 'a' | 'A') && word_start && !next.is_alphanumeric();
            self.pending_article = standalone_a.then(|| PendingArticle {
                marks: self.sink.marks(),
                upper: self.upper,
            });
        }
    }

    fn emit_raw(&mut self, c: char) {
        if c.is_alphanumeric() {
            self.pending_article = None;
        }
        self.sink.write_char(c);
        self.last_char = c;
    }

    fn emit_line_break(&mut self, line_break: &str) {
        self.sink.write(line_break);
        self.last_char = '\n';
    }
}

/// `n` or `min-max` (inclusive, both positive). Ranges draw from `rng`.
fn parse_repeat_count(text: &str, rng: &mut Rng) -> Option<u32> {
    match text.split_once('-') {
        Some((min, max)) => {
            let min: u32 = min.trim().parse().ok()?;
            let max: u32 = max.trim().parse().ok()?;
            if min == 0 || max == 0 || min > max {
                return None;
            }
            Some(rng.next_range(min as i64, max as i64 + 1) as u32)
        }
        None => {
            let count: u32 = text.parse().ok()?;
            (count > 0).then_some(count)
        }
    }
}
