//! Label selectors
//!
//! A [`Selector`] is a conjunction of [`LabelMatcher`]s. It renders to the
//! curly-brace syntax Prometheus accepts for `match[]` parameters and can be
//! evaluated locally against a label set.

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Label name to label value.
pub type Labels = BTreeMap<String, String>;

/// Label match operators with Prometheus semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    /// Exact string match (=)
    Equal,
    /// Not equal (!=)
    NotEqual,
    /// Regex match (=~)
    RegexMatch,
    /// Regex not match (!~)
    RegexNotMatch,
}

impl MatchOp {
    /// An empty operator means equality.
    pub fn parse(op: &str) -> Result<Self> {
        match op {
            "" | "=" => Ok(Self::Equal),
            "!=" => Ok(Self::NotEqual),
            "=~" => Ok(Self::RegexMatch),
            "!~" => Ok(Self::RegexNotMatch),
            other => Err(Error::InvalidMatcher(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::RegexMatch => "=~",
            Self::RegexNotMatch => "!~",
        }
    }
}

impl fmt::Display for MatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single label constraint as supplied by a caller.
///
/// The operator is kept as the raw string so that an unknown operator is
/// reported when the selector is evaluated rather than when it is decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LabelMatcher {
    /// The name of the label to match against
    pub name: String,
    /// The value to match against
    pub value: String,
    /// One of '=', '!=', '=~' or '!~'
    #[serde(rename = "type", default)]
    pub op: String,
}

impl LabelMatcher {
    pub fn new(name: &str, op: MatchOp, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            op: op.as_str().to_string(),
        }
    }

    pub fn equal(name: &str, value: &str) -> Self {
        Self::new(name, MatchOp::Equal, value)
    }

    pub fn not_equal(name: &str, value: &str) -> Self {
        Self::new(name, MatchOp::NotEqual, value)
    }

    pub fn regex_match(name: &str, pattern: &str) -> Self {
        Self::new(name, MatchOp::RegexMatch, pattern)
    }

    pub fn regex_not_match(name: &str, pattern: &str) -> Self {
        Self::new(name, MatchOp::RegexNotMatch, pattern)
    }

    /// Operator as rendered, with the empty operator shown as `=`.
    fn rendered_op(&self) -> &str {
        if self.op.is_empty() {
            "="
        } else {
            &self.op
        }
    }

    fn compile(&self) -> Result<CompiledMatcher<'_>> {
        let op = MatchOp::parse(&self.op)?;
        let regex = match op {
            MatchOp::RegexMatch | MatchOp::RegexNotMatch => {
                // Prometheus regex matchers are fully anchored
                let anchored = format!("^(?:{})$", self.value);
                Some(Regex::new(&anchored).map_err(|source| Error::Pattern {
                    pattern: self.value.clone(),
                    source,
                })?)
            }
            MatchOp::Equal | MatchOp::NotEqual => None,
        };
        Ok(CompiledMatcher {
            name: &self.name,
            value: &self.value,
            op,
            regex,
        })
    }
}

struct CompiledMatcher<'a> {
    name: &'a str,
    value: &'a str,
    op: MatchOp,
    regex: Option<Regex>,
}

impl CompiledMatcher<'_> {
    fn matches(&self, labels: &Labels) -> bool {
        // An absent label behaves like an empty value.
        let actual = labels.get(self.name).map(String::as_str).unwrap_or("");
        match (self.op, &self.regex) {
            (MatchOp::Equal, _) => actual == self.value,
            (MatchOp::NotEqual, _) => actual != self.value,
            (MatchOp::RegexMatch, Some(re)) => re.is_match(actual),
            (MatchOp::RegexNotMatch, Some(re)) => !re.is_match(actual),
            (MatchOp::RegexMatch | MatchOp::RegexNotMatch, None) => false,
        }
    }
}

/// Conjunction of label matchers, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Selector {
    pub filters: Vec<LabelMatcher>,
}

impl Selector {
    pub fn new(filters: Vec<LabelMatcher>) -> Self {
        Self { filters }
    }

    /// Render as `{name<op>'value', ...}`.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Whether every matcher accepts `labels`. An empty selector matches
    /// everything. All matchers are validated before any is evaluated.
    pub fn matches(&self, labels: &Labels) -> Result<bool> {
        let compiled = self.compile()?;
        Ok(compiled.iter().all(|m| m.matches(labels)))
    }

    /// Check operators and regex values without evaluating anything.
    pub fn validate(&self) -> Result<()> {
        self.compile().map(|_| ())
    }

    fn compile(&self) -> Result<Vec<CompiledMatcher<'_>>> {
        self.filters.iter().map(LabelMatcher::compile).collect()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, m) in self.filters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}{}'", m.name, m.rendered_op())?;
            for ch in m.value.chars() {
                if ch == '\'' || ch == '\\' {
                    f.write_str("\\")?;
                }
                write!(f, "{}", ch)?;
            }
            f.write_str("'")?;
        }
        f.write_str("}")
    }
}

impl FromStr for Selector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SelectorParser::new(s).parse()
    }
}

struct SelectorParser<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> SelectorParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn parse(mut self) -> Result<Selector> {
        self.skip_ws();
        self.expect('{')?;
        let mut filters = Vec::new();

        self.skip_ws();
        if self.eat('}') {
            return self.finish(filters);
        }

        loop {
            self.skip_ws();
            let name = self.name()?;
            self.skip_ws();
            let op = self.op()?;
            self.skip_ws();
            let value = self.quoted()?;
            filters.push(LabelMatcher::new(&name, op, &value));

            self.skip_ws();
            if self.eat('}') {
                return self.finish(filters);
            }
            self.expect(',')?;
            self.skip_ws();
            // trailing comma
            if self.eat('}') {
                return self.finish(filters);
            }
        }
    }

    fn finish(mut self, filters: Vec<LabelMatcher>) -> Result<Selector> {
        self.skip_ws();
        if self.chars.peek().is_some() {
            return Err(self.error("trailing characters"));
        }
        Ok(Selector { filters })
    }

    fn skip_ws(&mut self) {
        while matches!(self.chars.peek(), Some((_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn eat(&mut self, want: char) -> bool {
        if matches!(self.chars.peek(), Some((_, c)) if *c == want) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, want: char) -> Result<()> {
        if self.eat(want) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", want)))
        }
    }

    fn name(&mut self) -> Result<String> {
        let mut name = String::new();
        while let Some((_, c)) = self.chars.peek() {
            let valid = c.is_ascii_alphabetic() || *c == '_' || (!name.is_empty() && c.is_ascii_digit());
            if !valid {
                break;
            }
            name.push(*c);
            self.chars.next();
        }
        if name.is_empty() {
            return Err(self.error("expected label name"));
        }
        Ok(name)
    }

    fn op(&mut self) -> Result<MatchOp> {
        let first = self.chars.next().map(|(_, c)| c);
        let second = match self.chars.peek() {
            Some((_, c)) if *c == '=' || *c == '~' => Some(*c),
            _ => None,
        };
        let op = match (first, second) {
            (Some('='), Some('~')) => MatchOp::RegexMatch,
            (Some('!'), Some('=')) => MatchOp::NotEqual,
            (Some('!'), Some('~')) => MatchOp::RegexNotMatch,
            (Some('='), _) => return Ok(MatchOp::Equal),
            _ => return Err(self.error("expected matcher operator")),
        };
        self.chars.next();
        Ok(op)
    }

    fn quoted(&mut self) -> Result<String> {
        let quote = match self.chars.next() {
            Some((_, c)) if c == '\'' || c == '"' => c,
            _ => return Err(self.error("expected quoted value")),
        };
        let mut value = String::new();
        while let Some((_, c)) = self.chars.next() {
            match c {
                '\\' => match self.chars.next() {
                    Some((_, escaped)) => value.push(escaped),
                    None => break,
                },
                c if c == quote => return Ok(value),
                c => value.push(c),
            }
        }
        Err(self.error("unterminated value"))
    }

    fn error(&mut self, reason: &str) -> Error {
        let at = self
            .chars
            .peek()
            .map(|(i, _)| *i)
            .unwrap_or(self.input.len());
        Error::Validation(format!(
            "invalid selector {:?} at offset {}: {}",
            self.input, at, reason
        ))
    }
}
