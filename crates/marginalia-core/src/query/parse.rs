//! Text query parser
//!
//! Grammar:
//!
//! ```text
//! query   := or_expr?
//! or_expr := and_expr ("OR" and_expr)*
//! and_expr:= primary ("AND"? primary)*
//! primary := "(" or_expr ")" | "tag:" value | value
//! value   := word | '"' text '"'
//! ```

use super::{Query, MAX_QUERY_DEPTH};
use crate::error::{MarginaliaError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Open,
    Close,
    And,
    Or,
    Term(String),
    Tag(String),
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    position: usize,
}

const TAG_PREFIX: &str = "tag:";

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && c != '(' && c != ')' && c != '"'
}

/// Read a quoted value starting at the opening quote; returns the text and
/// the byte offset just past the closing quote.
fn read_quoted(input: &str, open: usize) -> Result<(String, usize)> {
    let body_start = open + 1;
    match input[body_start..].find('"') {
        Some(len) => Ok((
            input[body_start..body_start + len].to_string(),
            body_start + len + 1,
        )),
        None => Err(MarginaliaError::invalid_query(open, "unterminated quote")),
    }
}

fn read_word(input: &str, start: usize) -> (&str, usize) {
    let len = input[start..]
        .find(|c: char| !is_word_char(c))
        .unwrap_or(input.len() - start);
    (&input[start..start + len], start + len)
}

fn lex(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while let Some(c) = input[pos..].chars().next() {
        let start = pos;
        let kind = match c {
            c if c.is_whitespace() => {
                pos += c.len_utf8();
                continue;
            }
            '(' => {
                pos += 1;
                TokenKind::Open
            }
            ')' => {
                pos += 1;
                TokenKind::Close
            }
            '"' => {
                let (text, end) = read_quoted(input, start)?;
                pos = end;
                TokenKind::Term(text)
            }
            _ => {
                let (word, end) = read_word(input, start);
                pos = end;
                match word {
                    "AND" => TokenKind::And,
                    "OR" => TokenKind::Or,
                    w if w
                        .get(..TAG_PREFIX.len())
                        .is_some_and(|p| p.eq_ignore_ascii_case(TAG_PREFIX)) =>
                    {
                        let rest = &w[TAG_PREFIX.len()..];
                        let tag = if rest.is_empty() && input[end..].starts_with('"') {
                            let (text, quoted_end) = read_quoted(input, end)?;
                            pos = quoted_end;
                            text
                        } else {
                            rest.to_string()
                        };
                        if tag.trim().is_empty() {
                            return Err(MarginaliaError::invalid_query(start, "empty tag"));
                        }
                        TokenKind::Tag(tag.trim().to_string())
                    }
                    w => TokenKind::Term(w.to_string()),
                }
            }
        };
        tokens.push(Token {
            kind,
            position: start,
        });
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    next: usize,
    end: usize,
    /// Open groups enclosing the current token
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.next).map(|t| &t.kind)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.next)
            .map(|t| t.position)
            .unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<TokenKind> {
        let token = self.tokens.get(self.next).map(|t| t.kind.clone());
        self.next += 1;
        token
    }

    fn or_expr(&mut self) -> Result<Query> {
        let mut children = vec![self.and_expr()?];
        while self.peek() == Some(&TokenKind::Or) {
            self.advance();
            children.push(self.and_expr()?);
        }
        Ok(collapse(children, Query::Or))
    }

    fn and_expr(&mut self) -> Result<Query> {
        let mut children = vec![self.primary()?];
        loop {
            match self.peek() {
                Some(TokenKind::And) => {
                    self.advance();
                    children.push(self.primary()?);
                }
                Some(TokenKind::Open | TokenKind::Term(_) | TokenKind::Tag(_)) => {
                    children.push(self.primary()?);
                }
                _ => break,
            }
        }
        Ok(collapse(children, Query::And))
    }

    fn primary(&mut self) -> Result<Query> {
        let position = self.position();
        match self.advance() {
            Some(TokenKind::Term(text)) => Ok(Query::Term(text)),
            Some(TokenKind::Tag(tag)) => Ok(Query::Tag(tag)),
            Some(TokenKind::Open) => {
                if self.peek() == Some(&TokenKind::Close) {
                    return Err(MarginaliaError::invalid_query(position, "empty group"));
                }
                if self.depth >= MAX_QUERY_DEPTH {
                    return Err(MarginaliaError::invalid_query(position, "nesting too deep"));
                }
                self.depth += 1;
                let inner = self.or_expr()?;
                self.depth -= 1;
                match self.advance() {
                    Some(TokenKind::Close) => Ok(inner),
                    _ => Err(MarginaliaError::invalid_query(position, "unclosed '('")),
                }
            }
            Some(TokenKind::Close) => {
                Err(MarginaliaError::invalid_query(position, "unexpected ')'"))
            }
            Some(TokenKind::And) | Some(TokenKind::Or) => Err(MarginaliaError::invalid_query(
                position,
                "expected a term, tag or group before operator",
            )),
            None => Err(MarginaliaError::invalid_query(
                position,
                "expected a term, tag or group",
            )),
        }
    }
}

fn collapse(mut children: Vec<Query>, wrap: fn(Vec<Query>) -> Query) -> Query {
    if children.len() == 1 {
        children.remove(0)
    } else {
        wrap(children)
    }
}

impl Query {
    /// Parse the textual query syntax.
    ///
    /// Blank input parses to the empty query, which matches nothing.
    pub fn parse(input: &str) -> Result<Query> {
        let tokens = lex(input)?;
        if tokens.is_empty() {
            return Ok(Query::empty());
        }

        let mut parser = Parser {
            tokens,
            next: 0,
            end: input.len(),
            depth: 0,
        };
        let query = parser.or_expr()?;

        if parser.next < parser.tokens.len() {
            let position = parser.position();
            return Err(MarginaliaError::invalid_query(position, "unexpected ')'"));
        }
        Ok(query)
    }
}

impl std::str::FromStr for Query {
    type Err = MarginaliaError;

    fn from_str(s: &str) -> Result<Self> {
        Query::parse(s)
    }
}
