/// Tokenizer for random word calls.
///
/// Two grammars are accepted, tried in this order:
///
/// - modern: `+s[subtype of class,class for carrier]`, every part optional
///   but the brackets required;
/// - legacy: `+[class]s[subtype]<carrier>`, where only the symbol is required.

/// A parsed word call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordCall {
    pub symbol: char,
    /// Empty for the bank's first subtype.
    pub subtype: String,
    /// Raw class text. Empty for no class, comma-separated for an intersection.
    pub class: String,
    pub carrier: Option<String>,
    /// Chars consumed, including the leading `+`.
    pub len: usize,
}

impl WordCall {
    /// Parse a word call starting at the `+` in `text[0]`.
    pub fn parse(text: &[char]) -> Option<WordCall> {
        if text.first() != Some(&'+') {
            return None;
        }
        parse_modern(text).or_else(|| parse_legacy(text))
    }

    /// Class names of an intersection call, or `None` for a single class.
    pub fn class_list(&self) -> Option<Vec<&str>> {
        if !self.class.contains(',') {
            return None;
        }
        Some(
            self.class
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .collect(),
        )
    }
}

fn is_symbol(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '[' | ']' | '{' | '}' | '<' | '>' | '\\' | '\0')
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '\'' | '.')
}

/// Index of the first `close` at or after `from`, if the text between
/// holds only characters accepted by `allowed`.
fn block_end(
    text: &[char],
    from: usize,
    close: char,
    allowed: impl Fn(char) -> bool,
) -> Option<usize> {
    for (offset, &c) in text.get(from..)?.iter().enumerate() {
        if c == close {
            return Some(from + offset);
        }
        if !allowed(c) {
            return None;
        }
    }
    None
}

fn parse_modern(text: &[char]) -> Option<WordCall> {
    let symbol = *text.get(1)?;
    if !is_symbol(symbol) || text.get(2) != Some(&'[') {
        return None;
    }
    let close = block_end(text, 3, ']', |c| {
        is_name_char(c) || c == ',' || c.is_whitespace()
    })?;
    let body: String = text[3..close].iter().collect();

    let mut subtype: Vec<&str> = Vec::new();
    let mut class: Vec<&str> = Vec::new();
    let mut carrier: Vec<&str> = Vec::new();
    let mut part = &mut subtype;
    let mut seen_of = false;
    let mut seen_for = false;
    for token in body.split_whitespace() {
        match token {
            "of" if !seen_of && !seen_for => {
                seen_of = true;
                part = &mut class;
            }
            "for" if !seen_for => {
                seen_for = true;
                part = &mut carrier;
            }
            _ => part.push(token),
        }
    }

    // Subtype and carrier are single names; the class list may be
    // written with spaces after its commas.
    if subtype.len() > 1 || carrier.len() > 1 {
        return None;
    }
    if (seen_of && class.is_empty()) || (seen_for && carrier.is_empty()) {
        return None;
    }
    if subtype.iter().chain(carrier.iter()).any(|t| t.contains(',')) {
        return None;
    }
    // Adjacent class tokens must be joined by a comma.
    if class
        .windows(2)
        .any(|pair| !pair[0].ends_with(',') && !pair[1].starts_with(','))
    {
        return None;
    }

    Some(WordCall {
        symbol,
        subtype: subtype.concat(),
        class: class.concat(),
        carrier: carrier.first().map(|c| c.to_string()),
        len: close + 1,
    })
}

fn parse_legacy(text: &[char]) -> Option<WordCall> {
    let mut i = 1;

    let mut class = String::new();
    if text.get(i) == Some(&'[') {
        let close = block_end(text, i + 1, ']', |c| is_name_char(c) || c == ',')?;
        class = text[i + 1..close].iter().collect();
        i = close + 1;
    }

    let symbol = *text.get(i)?;
    if !is_symbol(symbol) {
        return None;
    }
    i += 1;

    let mut subtype = String::new();
    if text.get(i) == Some(&'[') {
        let close = block_end(text, i + 1, ']', is_name_char)?;
        subtype = text[i + 1..close].iter().collect();
        i = close + 1;
    }

    // `<name:` opens an output group, not a carrier.
    let mut carrier = None;
    if text.get(i) == Some(&'<') {
        if let Some(close) = block_end(text, i + 1, '>', is_name_char) {
            if close > i + 1 {
                carrier = Some(text[i + 1..close].iter().collect());
                i = close + 1;
            }
        }
    }

    Some(WordCall {
        symbol,
        subtype,
        class,
        carrier,
        len: i,
    })
}
