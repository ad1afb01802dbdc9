/// Position-tracking view over pattern text.

/// Returned by `read_char`/`peek_char` past the end of the text.
pub const EOF: char = '\0';

/// A character buffer with a movable read position.
///
/// Positions are char indices, not byte offsets. All searches are
/// escape-aware: a character preceded by `\` never counts as a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    chars: Vec<char>,
    pos: usize,
}

impl Cursor {
    pub fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Jump to `pos`, clamped to the end of the text.
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.chars.len());
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    pub fn read_char(&mut self) -> char {
        let c = self.peek_char();
        if self.pos < self.chars.len() {
            self.pos += 1;
        }
        c
    }

    pub fn peek_char(&self) -> char {
        self.char_at(self.pos)
    }

    pub fn char_at(&self, index: usize) -> char {
        self.chars.get(index).copied().unwrap_or(EOF)
    }

    /// Text in `[start, end)`, clamped to the buffer.
    pub fn slice(&self, start: usize, end: usize) -> String {
        let end = end.min(self.chars.len());
        let start = start.min(end);
        self.chars[start..end].iter().collect()
    }

    /// Everything from `from` to the end of the text.
    pub fn tail(&self, from: usize) -> &[char] {
        &self.chars[from.min(self.chars.len())..]
    }

    fn is_escaped(&self, index: usize) -> bool {
        index > 0 && self.chars[index - 1] == '\\'
    }

    /// First unescaped occurrence of `needle` at or after `from`.
    pub fn find(&self, needle: &str, from: usize) -> Option<usize> {
        let needle: Vec<char> = needle.chars().collect();
        if needle.is_empty() || needle.len() > self.chars.len() {
            return None;
        }
        let last_start = self.chars.len() - needle.len();
        (from..=last_start).find(|&i| {
            self.chars[i..i + needle.len()] == needle[..] && !self.is_escaped(i)
        })
    }

    /// First unescaped occurrence of `c` at or after `from`.
    pub fn find_char(&self, c: char, from: usize) -> Option<usize> {
        (from..self.chars.len()).find(|&i| self.chars[i] == c && !self.is_escaped(i))
    }

    /// Scan from `from` (just past an opening bracket) for the closing bracket
    /// that balances it. Escaped characters are skipped.
    pub fn find_closing(&self, open: char, close: char, from: usize) -> Option<usize> {
        let mut depth = 0usize;
        let mut i = from;
        while i < self.chars.len() {
            let c = self.chars[i];
            if c == '\\' {
                i += 2;
                continue;
            }
            if c == open {
                depth += 1;
            } else if c == close {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            i += 1;
        }
        None
    }

    pub fn find_square_close(&self, from: usize) -> Option<usize> {
        self.find_closing('[', ']', from)
    }

    pub fn find_curly_close(&self, from: usize) -> Option<usize> {
        self.find_closing('{', '}', from)
    }

    pub fn find_angle_close(&self, from: usize) -> Option<usize> {
        self.find_closing('<', '>', from)
    }

    /// 1-based line and column of a char index.
    pub fn line_col(&self, index: usize) -> (usize, usize) {
        line_col(&self.chars[..index.min(self.chars.len())])
    }
}

/// 1-based line and column of the position just past `prefix`.
pub(crate) fn line_col(prefix: &[char]) -> (usize, usize) {
    let mut line = 1;
    let mut column = 1;
    for &c in prefix {
        if c == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_and_peek() {
        let mut c = Cursor::new("ab");
        assert_eq!(c.peek_char(), 'a');
        assert_eq!(c.read_char(), 'a');
        assert_eq!(c.read_char(), 'b');
        assert!(c.is_at_end());
        assert_eq!(c.read_char(), EOF);
        assert_eq!(c.position(), 2);
    }

    #[test]
    fn find_skips_escaped_matches() {
        let c = Cursor::new(r"a\/b/c");
        assert_eq!(c.find_char('/', 0), Some(4));
        assert_eq!(c.find("/c", 0), Some(4));
        assert_eq!(c.find("zz", 0), None);
    }

    #[test]
    fn balanced_square_scan() {
        let c = Cursor::new("[a[b]c]d]");
        assert_eq!(c.find_square_close(1), Some(6));
        assert_eq!(c.find_square_close(7), Some(8));
    }

    #[test]
    fn balanced_scan_ignores_escaped_brackets() {
        let c = Cursor::new(r"{x\}y}");
        assert_eq!(c.find_curly_close(1), Some(5));
    }

    #[test]
    fn unmatched_scan_returns_none() {
        let c = Cursor::new("<foo:bar");
        assert_eq!(c.find_angle_close(1), None);
    }

    #[test]
    fn line_col_counts_newlines() {
        let c = Cursor::new("ab\ncd");
        assert_eq!(c.line_col(0), (1, 1));
        assert_eq!(c.line_col(4), (2, 2));
    }
}
