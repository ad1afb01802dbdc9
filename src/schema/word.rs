use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// One word in a bank, with a form per declared subtype.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordEntry {
    /// One form per subtype, in the bank's subtype order.
    pub forms: Vec<String>,
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Transient offset assigned by a reshuffle pass. Never persisted.
    #[serde(skip)]
    pub distribution_offset: u32,
    #[serde(default)]
    pub classes: FxHashSet<String>,
}

fn default_weight() -> u32 {
    1
}

impl WordEntry {
    pub fn new(forms: &[&str], weight: u32, classes: &[&str]) -> Self {
        Self {
            forms: forms.iter().map(|s| s.to_string()).collect(),
            weight,
            distribution_offset: 0,
            classes: classes.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// `weight + distribution_offset`.
    pub fn total_weight(&self) -> u64 {
        self.weight as u64 + self.distribution_offset as u64
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains(class)
    }
}

/// The on-disk shape of a word bank, before validation and indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordBankSource {
    pub symbol: char,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub subtypes: Vec<String>,
    pub words: Vec<WordEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_weight_includes_offset() {
        let mut w = WordEntry::new(&["apple"], 3, &["fruit"]);
        assert_eq!(w.total_weight(), 3);
        w.distribution_offset = 4;
        assert_eq!(w.total_weight(), 7);
        assert!(w.has_class("fruit"));
        assert!(!w.has_class("animal"));
    }

    #[test]
    fn offset_is_not_serialized() {
        let mut w = WordEntry::new(&["cat", "cats"], 2, &[]);
        w.distribution_offset = 9;
        let serialized = ron::to_string(&w).unwrap();
        let deserialized: WordEntry = ron::from_str(&serialized).unwrap();
        assert_eq!(deserialized.distribution_offset, 0);
        assert_eq!(deserialized.forms, vec!["cat", "cats"]);
    }

    #[test]
    fn weight_defaults_to_one() {
        let w: WordEntry = ron::from_str(r#"(forms: ["dog"])"#).unwrap();
        assert_eq!(w.weight, 1);
        assert!(w.classes.is_empty());
    }
}
