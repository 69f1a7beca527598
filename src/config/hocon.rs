//! Parser for the HOCON-style fragment language.
//!
//! Supported syntax:
//! - `#` and `//` line comments
//! - `key = value`, `key : value` and `key { ... }` fields
//! - dotted keys (`a.b.c = 1`) and quoted key segments (`"a.b" = 1`)
//! - optional braces around the whole document
//! - quoted, triple-quoted and unquoted strings, numbers, booleans, `null`
//! - objects and arrays, separated by commas or newlines
//! - `${path}` and `${?path}` substitutions, alone or concatenated with text
//!
//! Duplicate keys inside one document merge objects and replace scalars.

use super::node::{ConfigNode, NodeValue, Piece, insert_path};
use crate::error::ConfigError;
use regex_lite::Regex;
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?(0|[1-9][0-9]*)(\.[0-9]+)?([eE][+-]?[0-9]+)?$").expect("valid number regex")
});

/// Characters that end an unquoted key segment.
const KEY_STOP: &[char] = &[
    '.', '=', ':', '{', '}', '[', ']', ',', '"', '#', '$', '+', '\n',
];

/// Characters that end an unquoted value run.
const VALUE_STOP: &[char] = &['$', '"', '{', '}', '[', ']', ',', '#', '\n'];

/// Parse a fragment body into an object node.
///
/// `source` is the fragment's file name; every node's origin is
/// `"<source>: <line>"`.
pub fn parse_document(text: &str, source: &str) -> Result<ConfigNode, ConfigError> {
    let mut parser = Parser::new(text, source);
    parser.document()
}

/// Interpret an unquoted token the way an unquoted fragment value would be.
pub fn infer_scalar(text: &str) -> Value {
    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        t if NUMBER_RE.is_match(t) => parse_number(t).unwrap_or_else(|| Value::String(t.into())),
        t => Value::String(t.to_string()),
    }
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn new(text: &str, source: &'a str) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        Self {
            chars: text.chars().collect(),
            pos: 0,
            line: 1,
            source,
        }
    }

    fn origin(&self, line: usize) -> String {
        format!("{}: {}", self.source, line)
    }

    fn error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::Parse {
            origin: self.source.to_string(),
            line: self.line,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars().enumerate().all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn at_comment(&self) -> bool {
        self.peek() == Some('#') || self.starts_with("//")
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    /// Skip spaces and tabs on the current line.
    fn skip_inline_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c != '\n' && c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    /// Skip whitespace, newlines, comments and (optionally) commas.
    fn skip_trivia(&mut self, commas: bool) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some(',') if commas => {
                    self.bump();
                }
                Some(_) if self.at_comment() => self.skip_comment(),
                _ => break,
            }
        }
    }

    fn document(&mut self) -> Result<ConfigNode, ConfigError> {
        self.skip_trivia(false);
        let line = self.line;
        let map = if self.peek() == Some('{') {
            self.bump();
            let map = self.object_body(Some('}'))?;
            self.skip_trivia(false);
            if self.peek().is_some() {
                return Err(self.error("unexpected content after closing '}'"));
            }
            map
        } else {
            self.object_body(None)?
        };
        Ok(ConfigNode::new(NodeValue::Object(map), self.origin(line)))
    }

    /// Parse fields until `terminator` (consumed) or end of input.
    fn object_body(
        &mut self,
        terminator: Option<char>,
    ) -> Result<BTreeMap<String, ConfigNode>, ConfigError> {
        let mut map = BTreeMap::new();
        loop {
            self.skip_trivia(true);
            match (self.peek(), terminator) {
                (None, None) => return Ok(map),
                (None, Some(t)) => return Err(self.error(format!("expected '{t}' before end of input"))),
                (Some(c), Some(t)) if c == t => {
                    self.bump();
                    return Ok(map);
                }
                _ => {}
            }

            let key = self.key()?;
            self.skip_inline_ws();
            let node = match self.peek() {
                Some('{') => self.value()?,
                Some('=') | Some(':') => {
                    self.bump();
                    self.skip_inline_ws();
                    self.value()?
                }
                Some('+') if self.peek_at(1) == Some('=') => {
                    return Err(self.error("'+=' is not supported"));
                }
                _ => return Err(self.error(format!("expected '=', ':' or '{{' after key '{}'", key.join(".")))),
            };
            insert_path(&mut map, &key, node);
            self.end_of_field(terminator)?;
        }
    }

    /// After a field value: a newline, comma, comment, terminator or EOF.
    fn end_of_field(&mut self, terminator: Option<char>) -> Result<(), ConfigError> {
        self.skip_inline_ws();
        match self.peek() {
            None | Some('\n') | Some(',') => Ok(()),
            Some(c) if Some(c) == terminator => Ok(()),
            Some(_) if self.at_comment() => Ok(()),
            Some(c) => Err(self.error(format!("unexpected '{c}' after value"))),
        }
    }

    fn key(&mut self) -> Result<Vec<String>, ConfigError> {
        let mut segments = Vec::new();
        loop {
            let segment = if self.peek() == Some('"') {
                self.quoted_string()?
            } else {
                let mut s = String::new();
                while let Some(c) = self.peek() {
                    if KEY_STOP.contains(&c) || c.is_whitespace() || self.starts_with("//") {
                        break;
                    }
                    s.push(c);
                    self.bump();
                }
                if s.is_empty() {
                    return Err(match self.peek() {
                        Some(c) => self.error(format!("expected a key but found '{c}'")),
                        None => self.error("expected a key"),
                    });
                }
                s
            };
            segments.push(segment);
            if self.peek() == Some('.') {
                self.bump();
            } else {
                return Ok(segments);
            }
        }
    }

    fn value(&mut self) -> Result<ConfigNode, ConfigError> {
        let line = self.line;
        match self.peek() {
            Some('{') => {
                self.bump();
                let map = self.object_body(Some('}'))?;
                Ok(ConfigNode::new(NodeValue::Object(map), self.origin(line)))
            }
            Some('[') => {
                self.bump();
                let items = self.array_body()?;
                Ok(ConfigNode::new(NodeValue::Array(items), self.origin(line)))
            }
            _ => self.concatenation(line),
        }
    }

    fn array_body(&mut self) -> Result<Vec<ConfigNode>, ConfigError> {
        let mut items = Vec::new();
        loop {
            self.skip_trivia(true);
            match self.peek() {
                None => return Err(self.error("expected ']' before end of input")),
                Some(']') => {
                    self.bump();
                    return Ok(items);
                }
                _ => {
                    items.push(self.value()?);
                    self.skip_inline_ws();
                    match self.peek() {
                        None | Some('\n') | Some(',') | Some(']') => {}
                        Some(_) if self.at_comment() => {}
                        Some(c) => return Err(self.error(format!("unexpected '{c}' in array"))),
                    }
                }
            }
        }
    }

    /// A run of quoted strings, unquoted text and substitutions on one line.
    fn concatenation(&mut self, line: usize) -> Result<ConfigNode, ConfigError> {
        let mut pieces: Vec<Piece> = Vec::new();
        let mut pending_ws = String::new();
        let mut quoted = false;

        loop {
            let Some(c) = self.peek() else { break };
            if c == '}' || c == ']' || c == ',' || c == '\n' || self.at_comment() {
                break;
            }

            if c != '\n' && c.is_whitespace() {
                pending_ws.push(c);
                self.bump();
                continue;
            }

            if !pieces.is_empty() && !pending_ws.is_empty() {
                pieces.push(Piece::Text(std::mem::take(&mut pending_ws)));
            }
            pending_ws.clear();

            if c == '"' {
                quoted = true;
                let s = if self.starts_with("\"\"\"") {
                    self.triple_quoted_string()?
                } else {
                    self.quoted_string()?
                };
                pieces.push(Piece::Text(s));
            } else if c == '$' && self.peek_at(1) == Some('{') {
                pieces.push(self.substitution()?);
            } else if c == '{' || c == '[' {
                return Err(self.error("objects and arrays cannot be concatenated with text"));
            } else {
                let mut s = String::new();
                while let Some(c) = self.peek() {
                    if VALUE_STOP.contains(&c) || c.is_whitespace() || self.starts_with("//") {
                        break;
                    }
                    s.push(c);
                    self.bump();
                }
                if s.is_empty() {
                    // A lone '$' not followed by '{'
                    s.push(c);
                    self.bump();
                }
                pieces.push(Piece::Text(s));
            }
        }

        let origin = self.origin(line);
        let has_subst = pieces.iter().any(|p| matches!(p, Piece::Subst { .. }));
        if pieces.is_empty() {
            return Err(self.error("expected a value"));
        }
        if has_subst {
            return Ok(ConfigNode::new(NodeValue::Concat(pieces), origin));
        }

        let text: String = pieces
            .into_iter()
            .map(|p| match p {
                Piece::Text(s) => s,
                Piece::Subst { .. } => String::new(),
            })
            .collect();
        let value = if quoted {
            Value::String(text)
        } else {
            infer_scalar(&text)
        };
        Ok(ConfigNode::scalar(value, origin))
    }

    fn substitution(&mut self) -> Result<Piece, ConfigError> {
        // Skip "${"
        self.bump();
        self.bump();
        let optional = if self.peek() == Some('?') {
            self.bump();
            true
        } else {
            false
        };
        let mut path = String::new();
        loop {
            match self.bump() {
                Some('}') => break,
                Some('\n') | None => return Err(self.error("unterminated substitution")),
                Some(c) => path.push(c),
            }
        }
        let path = path.trim().to_string();
        if path.is_empty() {
            return Err(self.error("empty substitution '${}'"));
        }
        Ok(Piece::Subst { path, optional })
    }

    fn quoted_string(&mut self) -> Result<String, ConfigError> {
        self.bump();
        let mut s = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(s),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('b') => '\u{8}',
                        Some('f') => '\u{c}',
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some('/') => '/',
                        Some('u') => self.unicode_escape()?,
                        Some(c) => return Err(self.error(format!("invalid escape '\\{c}'"))),
                        None => return Err(self.error("unterminated string")),
                    };
                    s.push(escaped);
                }
                Some('\n') | None => return Err(self.error("unterminated string")),
                Some(c) => s.push(c),
            }
        }
    }

    fn unicode_escape(&mut self) -> Result<char, ConfigError> {
        let mut hex = String::new();
        for _ in 0..4 {
            match self.bump() {
                Some(c) => hex.push(c),
                None => return Err(self.error("truncated unicode escape")),
            }
        }
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error(format!("invalid unicode escape '\\u{hex}'")))
    }

    fn triple_quoted_string(&mut self) -> Result<String, ConfigError> {
        for _ in 0..3 {
            self.bump();
        }
        let mut s = String::new();
        loop {
            if self.starts_with("\"\"\"") {
                for _ in 0..3 {
                    self.bump();
                }
                // Extra quotes directly before the closing delimiter belong to the string
                while self.peek() == Some('"') {
                    s.push('"');
                    self.bump();
                }
                return Ok(s);
            }
            match self.bump() {
                Some(c) => s.push(c),
                None => return Err(self.error("unterminated triple-quoted string")),
            }
        }
    }
}
