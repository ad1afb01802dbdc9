/// Word banks with weighted, class-filtered selection.

use rustc_hash::FxHashMap;
use std::path::Path;
use thiserror::Error;

use crate::core::rng::Rng;
use crate::schema::word::{WordBankSource, WordEntry};

#[derive(Debug, Error)]
pub enum WordBankError {
    #[error("word {index} in bank '{symbol}' has {found} forms, expected {expected}")]
    MalformedEntry {
        symbol: char,
        index: usize,
        found: usize,
        expected: usize,
    },
    #[error("word bank '{0}' declares no subtypes")]
    NoSubtypes(char),
    #[error("class list '{0}' needs at least two class names")]
    TooFewClasses(String),
    #[error("unknown class '{class}' in word bank '{symbol}'")]
    UnknownClass { symbol: char, class: String },
    #[error("subtype '{subtype}' not found in word bank '{symbol}'")]
    SubtypeNotFound { symbol: char, subtype: String },
    #[error("word index {index} out of range for bank '{symbol}'")]
    IndexOutOfRange { symbol: char, index: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Case transform applied to emitted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Capitalization {
    #[default]
    None,
    /// First character upper-cased.
    First,
    /// First letter of every word upper-cased.
    Proper,
    /// Everything upper-cased.
    Upper,
}

impl Capitalization {
    pub fn apply(&self, text: &str) -> String {
        match self {
            Self::None => text.to_string(),
            Self::Upper => text.to_uppercase(),
            Self::First => {
                let mut chars = text.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
            Self::Proper => {
                let mut out = String::with_capacity(text.len());
                let mut at_word_start = true;
                for c in text.chars() {
                    if at_word_start && c.is_alphanumeric() {
                        out.extend(c.to_uppercase());
                    } else {
                        out.push(c);
                    }
                    at_word_start = c.is_whitespace();
                }
                out
            }
        }
    }
}

/// The token emitted in place of a word whose subtype could not be resolved.
pub fn subtype_not_found_token(symbol: char, subtype: &str) -> String {
    format!("<{}:SubtypeNotFound({})>", symbol, subtype)
}

/// A validated, class-indexed word bank for one symbol.
#[derive(Debug, Clone)]
pub struct WordBank {
    symbol: char,
    title: String,
    description: String,
    subtypes: Vec<String>,
    words: Vec<WordEntry>,
    class_index: FxHashMap<String, Vec<usize>>,
}

impl WordBank {
    /// Validate entries against the subtype list and build the class index.
    pub fn new(
        symbol: char,
        title: impl Into<String>,
        description: impl Into<String>,
        subtypes: Vec<String>,
        words: Vec<WordEntry>,
    ) -> Result<WordBank, WordBankError> {
        if subtypes.is_empty() {
            return Err(WordBankError::NoSubtypes(symbol));
        }

        let mut class_index: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        for (index, word) in words.iter().enumerate() {
            if word.forms.len() != subtypes.len() {
                return Err(WordBankError::MalformedEntry {
                    symbol,
                    index,
                    found: word.forms.len(),
                    expected: subtypes.len(),
                });
            }
            for class in &word.classes {
                class_index.entry(class.clone()).or_default().push(index);
            }
        }

        Ok(WordBank {
            symbol,
            title: title.into(),
            description: description.into(),
            subtypes,
            words,
            class_index,
        })
    }

    pub fn from_source(source: WordBankSource) -> Result<WordBank, WordBankError> {
        Self::new(
            source.symbol,
            source.title,
            source.description,
            source.subtypes,
            source.words,
        )
    }

    /// Load a word bank from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<WordBank, WordBankError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<WordBank, WordBankError> {
        let source: WordBankSource = ron::from_str(input)?;
        Self::from_source(source)
    }

    pub fn symbol(&self) -> char {
        self.symbol
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn subtypes(&self) -> &[String] {
        &self.subtypes
    }

    pub fn words(&self) -> &[WordEntry] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.class_index.contains_key(class)
    }

    /// Word indices belonging to `class`, in bank order.
    pub fn class_members(&self, class: &str) -> Option<&[usize]> {
        self.class_index.get(class).map(Vec::as_slice)
    }

    /// Uniform pick over every word (`class == ""`) or over one class.
    /// `None` for an unknown class or an empty candidate list.
    pub fn pick_index(&self, rng: &mut Rng, class: &str) -> Option<usize> {
        if class.is_empty() {
            if self.words.is_empty() {
                return None;
            }
            return Some(rng.next_below(self.words.len() as u32) as usize);
        }
        let members = self.class_index.get(class)?;
        if members.is_empty() {
            return None;
        }
        Some(members[rng.next_below(members.len() as u32) as usize])
    }

    /// Weighted pick over every word (`class == ""`) or over one class.
    pub fn weighted_pick(&self, rng: &mut Rng, class: &str) -> Option<usize> {
        if class.is_empty() {
            let all: Vec<usize> = (0..self.words.len()).collect();
            return self.weighted_pick_among(rng, &all);
        }
        let members = self.class_index.get(class)?;
        self.weighted_pick_among(rng, members)
    }

    /// Weighted pick over an explicit candidate list.
    ///
    /// Draws in `[0, total)` and returns the first candidate whose cumulative
    /// weight exceeds the draw, so ties go to list order. When every
    /// candidate has zero weight the pick falls back to uniform.
    pub fn weighted_pick_among(&self, rng: &mut Rng, candidates: &[usize]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        let total: u64 = candidates
            .iter()
            .filter_map(|&i| self.words.get(i))
            .map(WordEntry::total_weight)
            .sum();
        if total == 0 {
            return Some(candidates[rng.next_below(candidates.len() as u32) as usize]);
        }

        let draw = rng.next() as u64 % total;
        let mut cumulative = 0u64;
        for &index in candidates {
            if let Some(word) = self.words.get(index) {
                cumulative += word.total_weight();
                if cumulative > draw {
                    return Some(index);
                }
            }
        }
        candidates.last().copied()
    }

    /// Indices present in every named class, in the first class's order.
    ///
    /// Fewer than two names or an unknown class is an error; an empty
    /// intersection is not.
    pub fn class_intersection(&self, classes: &[&str]) -> Result<Vec<usize>, WordBankError> {
        if classes.len() < 2 {
            return Err(WordBankError::TooFewClasses(classes.join(",")));
        }
        let mut lists = Vec::with_capacity(classes.len());
        for class in classes {
            let members =
                self.class_index
                    .get(*class)
                    .ok_or_else(|| WordBankError::UnknownClass {
                        symbol: self.symbol,
                        class: class.to_string(),
                    })?;
            lists.push(members);
        }

        let Some((first, rest)) = lists.split_first() else {
            return Ok(Vec::new());
        };
        Ok(first
            .iter()
            .copied()
            .filter(|index| rest.iter().all(|list| list.contains(index)))
            .collect())
    }

    /// Position of a subtype by name; `""` is the first subtype.
    pub fn subtype_index(&self, subtype: &str) -> Option<usize> {
        if subtype.is_empty() {
            return Some(0);
        }
        self.subtypes.iter().position(|s| s == subtype)
    }

    /// The form of word `index` for `subtype`, with `case` applied.
    pub fn resolve_word(
        &self,
        index: usize,
        subtype: &str,
        case: Capitalization,
    ) -> Result<String, WordBankError> {
        let word = self.words.get(index).ok_or(WordBankError::IndexOutOfRange {
            symbol: self.symbol,
            index,
        })?;
        let form = self
            .subtype_index(subtype)
            .and_then(|i| word.forms.get(i))
            .ok_or_else(|| WordBankError::SubtypeNotFound {
                symbol: self.symbol,
                subtype: subtype.to_string(),
            })?;
        Ok(case.apply(form))
    }

    /// Freshness pass: each word gets a transient offset in
    /// `[factor, 20 * factor]` with probability `1 / (3 * factor + 1)`,
    /// otherwise its offset is reset to 0.
    pub fn reshuffle_weights(&mut self, rng: &mut Rng, factor: u32) {
        let odds = factor.saturating_mul(3).saturating_add(1);
        let high = factor as i64 * 20 + 1;
        for word in &mut self.words {
            word.distribution_offset = if rng.next_below(odds) == 0 {
                rng.next_range(factor as i64, high) as u32
            } else {
                0
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bank() -> WordBank {
        WordBank::new(
            'n',
            "Nouns",
            "Test nouns",
            vec!["singular".to_string(), "plural".to_string()],
            vec![
                WordEntry::new(&["apple", "apples"], 1, &["fruit", "red"]),
                WordEntry::new(&["banana", "bananas"], 1, &["fruit", "yellow"]),
                WordEntry::new(&["cardinal", "cardinals"], 1, &["animal", "red"]),
                WordEntry::new(&["canary", "canaries"], 1, &["animal", "yellow"]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn malformed_entry_rejected() {
        let result = WordBank::new(
            'n',
            "",
            "",
            vec!["singular".to_string(), "plural".to_string()],
            vec![WordEntry::new(&["apple"], 1, &[])],
        );
        assert!(matches!(
            result,
            Err(WordBankError::MalformedEntry { index: 0, found: 1, expected: 2, .. })
        ));
    }

    #[test]
    fn class_index_built() {
        let bank = make_bank();
        assert_eq!(bank.class_members("red"), Some(&[0, 2][..]));
        assert_eq!(bank.class_members("fruit"), Some(&[0, 1][..]));
        assert!(bank.class_members("blue").is_none());
    }

    #[test]
    fn pick_index_respects_class() {
        let bank = make_bank();
        let mut rng = Rng::new(9);
        for _ in 0..100 {
            let i = bank.pick_index(&mut rng, "animal").unwrap();
            assert!(i == 2 || i == 3);
        }
        assert!(bank.pick_index(&mut rng, "unknown").is_none());
    }

    #[test]
    fn weighted_pick_favors_heavy_entries() {
        let bank = WordBank::new(
            'x',
            "",
            "",
            vec!["form".to_string()],
            vec![
                WordEntry::new(&["light"], 1, &[]),
                WordEntry::new(&["heavy"], 9, &[]),
            ],
        )
        .unwrap();
        let mut rng = Rng::new(123);
        let trials = 10_000;
        let heavy = (0..trials)
            .filter(|_| bank.weighted_pick(&mut rng, "") == Some(1))
            .count();
        let ratio = heavy as f64 / trials as f64;
        assert!((0.87..0.93).contains(&ratio), "heavy ratio was {}", ratio);
    }

    #[test]
    fn weighted_pick_skips_zero_weight_entries() {
        let bank = WordBank::new(
            'x',
            "",
            "",
            vec!["form".to_string()],
            vec![
                WordEntry::new(&["never"], 0, &[]),
                WordEntry::new(&["always"], 5, &[]),
            ],
        )
        .unwrap();
        let mut rng = Rng::new(1);
        for _ in 0..200 {
            assert_eq!(bank.weighted_pick(&mut rng, ""), Some(1));
        }
    }

    #[test]
    fn all_zero_weights_fall_back_to_uniform() {
        let bank = WordBank::new(
            'x',
            "",
            "",
            vec!["form".to_string()],
            vec![WordEntry::new(&["a"], 0, &[]), WordEntry::new(&["b"], 0, &[])],
        )
        .unwrap();
        let mut rng = Rng::new(4);
        assert!(bank.weighted_pick(&mut rng, "").is_some());
    }

    #[test]
    fn intersection_of_classes() {
        let bank = make_bank();
        assert_eq!(bank.class_intersection(&["fruit", "red"]).unwrap(), vec![0]);
        assert_eq!(bank.class_intersection(&["animal", "yellow"]).unwrap(), vec![3]);
        assert!(bank.class_intersection(&["fruit", "animal"]).unwrap().is_empty());
    }

    #[test]
    fn intersection_errors() {
        let bank = make_bank();
        assert!(matches!(
            bank.class_intersection(&["fruit"]),
            Err(WordBankError::TooFewClasses(_))
        ));
        assert!(matches!(
            bank.class_intersection(&["fruit", "blue"]),
            Err(WordBankError::UnknownClass { .. })
        ));
    }

    #[test]
    fn resolve_word_subtypes() {
        let bank = make_bank();
        assert_eq!(bank.resolve_word(0, "", Capitalization::None).unwrap(), "apple");
        assert_eq!(bank.resolve_word(0, "plural", Capitalization::None).unwrap(), "apples");
        assert_eq!(bank.resolve_word(1, "plural", Capitalization::Upper).unwrap(), "BANANAS");
        assert!(matches!(
            bank.resolve_word(0, "dual", Capitalization::None),
            Err(WordBankError::SubtypeNotFound { .. })
        ));
        assert_eq!(subtype_not_found_token('n', "dual"), "<n:SubtypeNotFound(dual)>");
    }

    #[test]
    fn capitalization_modes() {
        assert_eq!(Capitalization::First.apply("big red dog"), "Big red dog");
        assert_eq!(Capitalization::Proper.apply("big red dog"), "Big Red Dog");
        assert_eq!(Capitalization::Upper.apply("big red dog"), "BIG RED DOG");
        assert_eq!(Capitalization::None.apply("big"), "big");
        assert_eq!(Capitalization::First.apply(""), "");
    }

    #[test]
    fn reshuffle_assigns_offsets_in_range() {
        let mut bank = make_bank();
        let mut rng = Rng::new(31);
        let mut saw_offset = false;
        for _ in 0..50 {
            bank.reshuffle_weights(&mut rng, 2);
            for word in bank.words() {
                let off = word.distribution_offset;
                assert!(off == 0 || (2..=40).contains(&off));
                saw_offset |= off > 0;
            }
        }
        assert!(saw_offset);
    }

    #[test]
    fn parse_word_bank_from_ron() {
        let bank = WordBank::parse_ron(
            r#"(
                symbol: 'a',
                title: "Adjectives",
                subtypes: ["plain"],
                words: [
                    (forms: ["old"], weight: 2, classes: ["age"]),
                    (forms: ["green"]),
                ],
            )"#,
        )
        .unwrap();
        assert_eq!(bank.symbol(), 'a');
        assert_eq!(bank.len(), 2);
        assert_eq!(bank.words()[0].weight, 2);
        assert!(bank.has_class("age"));
    }

    #[test]
    fn load_fixture_nouns() {
        let path = std::path::PathBuf::from("tests/fixtures/words/nouns.ron");
        let bank = WordBank::load_from_ron(&path).unwrap();
        assert_eq!(bank.symbol(), 'n');
        assert!(!bank.is_empty());
    }
}
