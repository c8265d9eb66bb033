//! A CSS selector subset sufficient for widget and checkout markup probing.
//!
//! Supported: type selectors and `*`, `#id`, `.class`, attribute selectors
//! (`[a]`, `[a=v]`, `[a*=v]`, `[a^=v]`, `[a$=v]`, `[a~=v]`), the `:checked`
//! pseudo-class, descendant and child combinators, and comma-separated lists.

use crate::error::{Error, Result};

/// Attribute comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    /// `[name]`
    Exists,
    /// `[name=value]`
    Equals,
    /// `[name*=value]`
    Contains,
    /// `[name^=value]`
    Prefix,
    /// `[name$=value]`
    Suffix,
    /// `[name~=value]`
    Includes,
}

/// One attribute condition inside a compound selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrSelector {
    /// Attribute name, lowercased.
    pub name: String,
    /// Comparison operator.
    pub op: AttrOp,
    /// Value to compare with (empty for [`AttrOp::Exists`]).
    pub value: String,
}

impl AttrSelector {
    /// Test an attribute value (or its absence) against this condition.
    #[must_use]
    pub fn matches(&self, actual: Option<&str>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        match self.op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == self.value,
            // Per CSS, empty substring operators never match.
            AttrOp::Contains => !self.value.is_empty() && actual.contains(&self.value),
            AttrOp::Prefix => !self.value.is_empty() && actual.starts_with(&self.value),
            AttrOp::Suffix => !self.value.is_empty() && actual.ends_with(&self.value),
            AttrOp::Includes => actual.split_ascii_whitespace().any(|w| w == self.value),
        }
    }
}

/// A sequence of simple selectors applying to a single element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compound {
    /// Lowercased tag name, `None` for `*` or omitted.
    pub tag: Option<String>,
    /// Required ids.
    pub ids: Vec<String>,
    /// Required classes.
    pub classes: Vec<String>,
    /// Attribute conditions.
    pub attrs: Vec<AttrSelector>,
    /// `:checked` present.
    pub checked: bool,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && self.ids.is_empty()
            && self.classes.is_empty()
            && self.attrs.is_empty()
            && !self.checked
    }
}

/// Relationship between two compounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// `a b`
    Descendant,
    /// `a > b`
    Child,
}

/// A complex selector: compounds joined by combinators, left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Complex {
    /// Compounds, leftmost first. Never empty.
    pub compounds: Vec<Compound>,
    /// `combinators[i]` joins `compounds[i]` and `compounds[i + 1]`.
    pub combinators: Vec<Combinator>,
}

/// A parsed, comma-separated selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    /// Alternatives; an element matches if any alternative matches.
    pub alternatives: Vec<Complex>,
}

impl SelectorList {
    /// Parse selector text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Selector`] for syntax outside the supported subset.
    pub fn parse(input: &str) -> Result<Self> {
        Parser::new(input).parse_list()
    }
}

struct Parser<'a> {
    src: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> Error {
        Error::Selector {
            selector: self.src.to_string(),
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn parse_list(&mut self) -> Result<SelectorList> {
        let mut alternatives = Vec::new();
        loop {
            self.skip_ws();
            alternatives.push(self.parse_complex()?);
            self.skip_ws();
            match self.bump() {
                None => break,
                Some(',') => continue,
                Some(c) => return Err(self.error(format!("unexpected `{c}`"))),
            }
        }
        Ok(SelectorList { alternatives })
    }

    fn parse_complex(&mut self) -> Result<Complex> {
        let mut compounds = vec![self.parse_compound()?];
        let mut combinators = Vec::new();
        loop {
            let had_ws = self.skip_ws();
            let combinator = match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.pos += 1;
                    self.skip_ws();
                    Combinator::Child
                }
                Some(_) if had_ws => Combinator::Descendant,
                Some(c) => return Err(self.error(format!("unexpected `{c}`"))),
            };
            combinators.push(combinator);
            compounds.push(self.parse_compound()?);
        }
        Ok(Complex {
            compounds,
            combinators,
        })
    }

    fn parse_compound(&mut self) -> Result<Compound> {
        let mut compound = Compound::default();
        let mut universal = false;
        match self.peek() {
            Some('*') => {
                self.pos += 1;
                universal = true;
            }
            Some(c) if is_ident_char(c) => {
                compound.tag = Some(self.parse_ident()?.to_ascii_lowercase());
            }
            _ => {}
        }
        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.ids.push(self.parse_ident()?);
                }
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.parse_ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attrs.push(self.parse_attr()?);
                }
                Some(':') => {
                    self.pos += 1;
                    let pseudo = self.parse_ident()?.to_ascii_lowercase();
                    if pseudo != "checked" {
                        return Err(self.error(format!("unsupported pseudo-class `:{pseudo}`")));
                    }
                    compound.checked = true;
                }
                _ => break,
            }
        }
        if compound.is_empty() && !universal {
            return Err(self.error("expected a selector"));
        }
        Ok(compound)
    }

    fn parse_ident(&mut self) -> Result<String> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected an identifier"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_attr(&mut self) -> Result<AttrSelector> {
        self.skip_ws();
        let name = self.parse_ident()?.to_ascii_lowercase();
        self.skip_ws();
        let op = match self.bump() {
            Some(']') => {
                return Ok(AttrSelector {
                    name,
                    op: AttrOp::Exists,
                    value: String::new(),
                })
            }
            Some('=') => AttrOp::Equals,
            Some(c @ ('*' | '^' | '$' | '~')) => {
                if self.bump() != Some('=') {
                    return Err(self.error("expected `=` in attribute selector"));
                }
                match c {
                    '*' => AttrOp::Contains,
                    '^' => AttrOp::Prefix,
                    '$' => AttrOp::Suffix,
                    _ => AttrOp::Includes,
                }
            }
            _ => return Err(self.error("malformed attribute selector")),
        };
        self.skip_ws();
        let value = match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != q) {
                    self.pos += 1;
                }
                if self.peek().is_none() {
                    return Err(self.error("unterminated string"));
                }
                let value: String = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                value
            }
            _ => self.parse_ident()?,
        };
        self.skip_ws();
        if self.bump() != Some(']') {
            return Err(self.error("expected `]`"));
        }
        Ok(AttrSelector { name, op, value })
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}
