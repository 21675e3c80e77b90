//! A small CSS selector engine covering what form tracking needs.
//!
//! Supported grammar: type and universal selectors, `#id`, `.class`,
//! `[attr]`, `[attr=value]` (value quoted or an identifier, CSS escapes
//! allowed), the descendant and child combinators, and comma separated lists.
//! Anything else (pseudo-classes, sibling combinators, other attribute
//! operators) is rejected with a [`SelectorError`], the same way a browser's
//! `querySelectorAll` throws on syntax it does not understand.

use crate::error::SelectorError;

use super::NodeId;

/// Read access to an element tree, as seen by the matcher.
pub trait SelectorTarget {
    /// Lowercase tag name, `None` for non-element nodes.
    fn tag_name(&self, node: NodeId) -> Option<&str>;
    fn attribute(&self, node: NodeId, name: &str) -> Option<&str>;
    fn parent_element(&self, node: NodeId) -> Option<NodeId>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttributeSelector {
    name: String,
    value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<AttributeSelector>,
}

impl Compound {
    fn matches<T: SelectorTarget + ?Sized>(&self, target: &T, node: NodeId) -> bool {
        let Some(tag) = target.tag_name(node) else {
            return false;
        };
        if let Some(expected) = &self.tag {
            if !expected.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if target.attribute(node, "id") != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let classes = target.attribute(node, "class").unwrap_or("");
            if !self
                .classes
                .iter()
                .all(|c| classes.split_ascii_whitespace().any(|have| have == c))
            {
                return false;
            }
        }
        self.attributes.iter().all(|attr| {
            match (target.attribute(node, &attr.name), &attr.value) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(have), Some(want)) => have == want,
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    compounds: Vec<Compound>,
    /// `combinators[i]` joins `compounds[i]` and `compounds[i + 1]`
    combinators: Vec<Combinator>,
}

impl Complex {
    fn matches<T: SelectorTarget + ?Sized>(&self, target: &T, node: NodeId) -> bool {
        self.matches_at(target, self.compounds.len() - 1, node)
    }

    fn matches_at<T: SelectorTarget + ?Sized>(&self, target: &T, idx: usize, node: NodeId) -> bool {
        if !self.compounds[idx].matches(target, node) {
            return false;
        }
        if idx == 0 {
            return true;
        }
        match self.combinators[idx - 1] {
            Combinator::Child => target
                .parent_element(node)
                .is_some_and(|parent| self.matches_at(target, idx - 1, parent)),
            Combinator::Descendant => {
                let mut current = target.parent_element(node);
                while let Some(ancestor) = current {
                    if self.matches_at(target, idx - 1, ancestor) {
                        return true;
                    }
                    current = target.parent_element(ancestor);
                }
                false
            }
        }
    }
}

/// A parsed, comma separated selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    selectors: Vec<Complex>,
}

impl SelectorList {
    /// Parse a selector list, failing on anything outside the supported grammar.
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        Parser::new(input).parse_list()
    }

    /// Whether `node` matches any selector in the list.
    pub fn matches<T: SelectorTarget + ?Sized>(&self, target: &T, node: NodeId) -> bool {
        self.selectors.iter().any(|s| s.matches(target, node))
    }
}

/// Whether `input` is a valid CSS identifier, i.e. usable after `#` as-is.
pub fn is_identifier(input: &str) -> bool {
    let mut parser = Parser::new(input);
    match parser.parse_identifier() {
        Ok(_) => parser.at_end(),
        Err(_) => false,
    }
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> SelectorError {
        SelectorError::new(self.source, reason)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if is_whitespace(c)) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn parse_list(&mut self) -> Result<SelectorList, SelectorError> {
        let mut selectors = Vec::new();
        loop {
            self.skip_whitespace();
            selectors.push(self.parse_complex()?);
            if self.at_end() {
                break;
            }
            // parse_complex only stops early on a comma
            self.pos += 1;
        }
        Ok(SelectorList { selectors })
    }

    fn parse_complex(&mut self) -> Result<Complex, SelectorError> {
        let mut compounds = vec![self.parse_compound()?];
        let mut combinators = Vec::new();
        loop {
            let had_space = self.skip_whitespace();
            match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    combinators.push(Combinator::Child);
                }
                Some(_) if had_space => combinators.push(Combinator::Descendant),
                Some(c) => return Err(self.error(format!("unexpected `{}`", c))),
            }
            compounds.push(self.parse_compound()?);
        }
        Ok(Complex {
            compounds,
            combinators,
        })
    }

    fn parse_compound(&mut self) -> Result<Compound, SelectorError> {
        let mut compound = Compound::default();
        let mut empty = true;

        if self.peek() == Some('*') {
            self.pos += 1;
            empty = false;
        } else if self.starts_identifier() {
            compound.tag = Some(self.parse_identifier()?.to_ascii_lowercase());
            empty = false;
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    if !self.starts_identifier() {
                        return Err(self.error("expected an identifier after `#`"));
                    }
                    compound.id = Some(self.parse_identifier()?);
                }
                Some('.') => {
                    self.pos += 1;
                    if !self.starts_identifier() {
                        return Err(self.error("expected an identifier after `.`"));
                    }
                    compound.classes.push(self.parse_identifier()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attributes.push(self.parse_attribute()?);
                }
                None | Some(',') | Some('>') => break,
                Some(c) if is_whitespace(c) => break,
                Some(c) => return Err(self.error(format!("unsupported syntax at `{}`", c))),
            }
            empty = false;
        }

        if empty {
            return Err(self.error("expected a selector"));
        }
        Ok(compound)
    }

    fn parse_attribute(&mut self) -> Result<AttributeSelector, SelectorError> {
        self.skip_whitespace();
        if !self.starts_identifier() {
            return Err(self.error("expected an attribute name"));
        }
        let name = self.parse_identifier()?.to_ascii_lowercase();
        self.skip_whitespace();
        match self.peek() {
            Some(']') => {
                self.pos += 1;
                Ok(AttributeSelector { name, value: None })
            }
            Some('=') => {
                self.pos += 1;
                self.skip_whitespace();
                let value = match self.peek() {
                    Some(q @ ('"' | '\'')) => {
                        self.pos += 1;
                        self.parse_string(q)?
                    }
                    _ if self.starts_identifier() => self.parse_identifier()?,
                    _ => return Err(self.error("expected an attribute value")),
                };
                self.skip_whitespace();
                if self.peek() != Some(']') {
                    return Err(self.error("expected `]`"));
                }
                self.pos += 1;
                Ok(AttributeSelector {
                    name,
                    value: Some(value),
                })
            }
            Some(c) => Err(self.error(format!("unsupported attribute operator at `{}`", c))),
            None => Err(self.error("unterminated attribute selector")),
        }
    }

    fn parse_string(&mut self, quote: char) -> Result<String, SelectorError> {
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some('\n') => return Err(self.error("newline in string")),
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        None => {}
                        Some('\n') => self.pos += 1,
                        Some(_) => out.push(self.consume_escape()),
                    }
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn starts_identifier(&self) -> bool {
        let first = self.peek();
        let second = self.peek_at(1);
        match first {
            Some('-') => match second {
                Some('-') => true,
                Some('\\') => self.peek_at(2).is_some_and(|c| c != '\n'),
                Some(c) => is_name_start(c),
                None => false,
            },
            Some('\\') => second.is_some_and(|c| c != '\n'),
            Some(c) => is_name_start(c),
            None => false,
        }
    }

    fn parse_identifier(&mut self) -> Result<String, SelectorError> {
        if !self.starts_identifier() {
            return Err(self.error("expected an identifier"));
        }
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                if self.peek_at(1).map_or(true, |next| next == '\n') {
                    break;
                }
                self.pos += 1;
                out.push(self.consume_escape());
            } else if is_name_char(c) {
                out.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(out)
    }

    /// Consume an escape body; the backslash has already been consumed.
    fn consume_escape(&mut self) -> char {
        let mut hex = String::new();
        while hex.len() < 6 {
            match self.peek() {
                Some(c) if c.is_ascii_hexdigit() => {
                    hex.push(c);
                    self.pos += 1;
                }
                _ => break,
            }
        }
        if hex.is_empty() {
            let c = self.peek().unwrap_or('\u{FFFD}');
            self.pos += 1;
            return c;
        }
        if matches!(self.peek(), Some(c) if is_whitespace(c)) {
            self.pos += 1;
        }
        u32::from_str_radix(&hex, 16)
            .ok()
            .filter(|&cp| cp != 0)
            .and_then(char::from_u32)
            .unwrap_or('\u{FFFD}')
    }
}

fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\u{000C}')
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || !c.is_ascii()
}

fn is_name_char(c: char) -> bool {
    is_name_start(c) || c.is_ascii_digit() || c == '-'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_form_tracking_shapes() {
        for sel in [
            "#login input[type=\"email\"][name=\"email\"]",
            "select[name=\"country\"] option[value=\"fr\"]",
            "textarea, input, select",
            "[contenteditable=\"true\"], [contenteditable=\"plaintext-only\"]",
            "div > p.note",
            "[id=\"123\"]",
            "*",
        ] {
            assert!(SelectorList::parse(sel).is_ok(), "{} should parse", sel);
        }
    }

    #[test]
    fn rejects_what_a_browser_would_throw_on() {
        for sel in [
            "",
            "#123",
            "input[name=\"a\"b\"]",
            "input[name=\"unterminated]",
            "a:hover",
            "#a:b",
            "div ~ p",
            "input[name^=\"x\"]",
            "input,",
        ] {
            assert!(SelectorList::parse(sel).is_err(), "{} should not parse", sel);
        }
    }

    #[test]
    fn escapes_decode_in_identifiers_and_strings() {
        let mut p = Parser::new("\\31 23");
        assert_eq!(p.parse_identifier().unwrap(), "123");
        let mut p = Parser::new("a\\\"b\"");
        assert_eq!(p.parse_string('"').unwrap(), "a\"b");
    }

    #[test]
    fn identifier_check() {
        assert!(is_identifier("login"));
        assert!(is_identifier("-x"));
        assert!(is_identifier("_under_score-2"));
        assert!(!is_identifier("2fa"));
        assert!(!is_identifier("a:b"));
        assert!(!is_identifier("with space"));
        assert!(!is_identifier(""));
    }
}
