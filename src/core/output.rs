/// Named output streams and the visibility-scoped group stack that routes into them.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// The implicit bottom group and its stream.
pub const MAIN_STREAM: &str = "main";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    /// Output reaches every group on the stack.
    Public,
    /// Output reaches the contiguous run of internal groups at the top.
    Internal,
    /// Output reaches only the topmost group.
    Private,
}

impl Visibility {
    /// Split a raw group name into its visibility and bare name:
    /// `.name` is private, `_name` internal, anything else public.
    pub fn parse(raw: &str) -> (Visibility, &str) {
        if let Some(name) = raw.strip_prefix('.') {
            (Visibility::Private, name)
        } else if let Some(name) = raw.strip_prefix('_') {
            (Visibility::Internal, name)
        } else {
            (Visibility::Public, raw)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputGroup {
    pub name: String,
    pub visibility: Visibility,
}

/// Where a piece of text landed: byte offset just past it in `stream`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMark {
    pub stream: String,
    pub offset: usize,
}

/// The per-run set of streams plus the group stack.
#[derive(Debug, Clone)]
pub struct OutputSink {
    streams: FxHashMap<String, String>,
    groups: Vec<OutputGroup>,
}

impl Default for OutputSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink {
    pub fn new() -> Self {
        let mut streams = FxHashMap::default();
        streams.insert(MAIN_STREAM.to_string(), String::new());
        Self {
            streams,
            groups: vec![OutputGroup {
                name: MAIN_STREAM.to_string(),
                visibility: Visibility::Public,
            }],
        }
    }

    /// Open a group. `raw_name` may carry a visibility prefix.
    pub fn push_group(&mut self, raw_name: &str) {
        let (visibility, name) = Visibility::parse(raw_name);
        self.streams.entry(name.to_string()).or_default();
        self.groups.push(OutputGroup {
            name: name.to_string(),
            visibility,
        });
    }

    /// Close the topmost group. The main group is never popped.
    pub fn pop_group(&mut self) -> Option<OutputGroup> {
        if self.groups.len() > 1 {
            self.groups.pop()
        } else {
            None
        }
    }

    /// Number of open groups, including main.
    pub fn depth(&self) -> usize {
        self.groups.len()
    }

    pub fn top(&self) -> &OutputGroup {
        &self.groups[self.groups.len() - 1]
    }

    /// Streams that currently receive output, topmost first, without duplicates.
    pub fn targets(&self) -> Vec<&str> {
        let top = self.top();
        let selected: Vec<&OutputGroup> = match top.visibility {
            Visibility::Public => self.groups.iter().rev().collect(),
            Visibility::Private => vec![top],
            Visibility::Internal => self
                .groups
                .iter()
                .rev()
                .take_while(|g| g.visibility == Visibility::Internal)
                .collect(),
        };
        let mut names: Vec<&str> = Vec::with_capacity(selected.len());
        for group in selected {
            if !names.contains(&group.name.as_str()) {
                names.push(&group.name);
            }
        }
        names
    }

    pub fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let targets: Vec<String> = self.targets().into_iter().map(String::from).collect();
        for name in targets {
            self.streams.entry(name).or_default().push_str(text);
        }
    }

    pub fn write_char(&mut self, c: char) {
        let mut buf = [0u8; 4];
        self.write(c.encode_utf8(&mut buf));
    }

    /// Current end offsets of every target stream.
    pub fn marks(&self) -> Vec<StreamMark> {
        self.targets()
            .into_iter()
            .map(|name| StreamMark {
                stream: name.to_string(),
                offset: self.streams.get(name).map_or(0, String::len),
            })
            .collect()
    }

    /// Splice `text` into each marked stream at its recorded offset.
    pub fn insert_at(&mut self, marks: &[StreamMark], text: &str) {
        for mark in marks {
            if let Some(stream) = self.streams.get_mut(&mark.stream) {
                if stream.is_char_boundary(mark.offset) {
                    stream.insert_str(mark.offset, text);
                }
            }
        }
    }

    pub fn stream(&self, name: &str) -> Option<&str> {
        self.streams.get(name).map(String::as_str)
    }

    pub fn finish(self) -> Output {
        Output {
            streams: self.streams,
        }
    }
}

/// The finished streams of one interpretation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    streams: FxHashMap<String, String>,
}

impl Output {
    pub fn main(&self) -> &str {
        self.get(MAIN_STREAM).unwrap_or("")
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.streams.get(name).map(String::as_str)
    }

    /// Stream names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.streams.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn into_map(self) -> FxHashMap<String, String> {
        self.streams
    }
}
