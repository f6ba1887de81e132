//! Boolean term and tag queries over the inverted index
//!
//! A [`Query`] is an AND/OR tree whose leaves are body terms and tags. It can
//! be built programmatically or parsed from text:
//!
//! ```text
//! channels tag:go
//! (tag:python OR tag:go) AND "error handling"
//! ```
//!
//! Adjacent predicates are implicitly ANDed and `AND` binds tighter than `OR`.
//! Keywords are uppercase only; a lowercase `and` is an ordinary search term.

mod cancel;
mod eval;
mod parse;

use crate::record::{Record, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub use cancel::CancelFlag;
pub use eval::{evaluate, paginate};

/// Deepest group nesting the parser accepts
pub const MAX_QUERY_DEPTH: usize = 128;

/// Query expression tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Free text matched against record bodies. Text that normalizes to
    /// several tokens requires all of them.
    Term(String),
    /// Tag match (case-insensitive)
    Tag(String),
    /// All children must match; an empty conjunction matches nothing
    And(Vec<Query>),
    /// Any child may match; an empty disjunction matches nothing
    Or(Vec<Query>),
}

impl Query {
    pub fn term(text: impl Into<String>) -> Self {
        Query::Term(text.into())
    }

    pub fn tag(tag: impl Into<String>) -> Self {
        Query::Tag(tag.into())
    }

    /// The query that matches nothing
    pub fn empty() -> Self {
        Query::Or(Vec::new())
    }

    /// Conjunction of `self` and `other`, flattening nested ANDs
    pub fn and(self, other: Query) -> Self {
        match self {
            Query::And(mut children) => {
                children.push(other);
                Query::And(children)
            }
            q => Query::And(vec![q, other]),
        }
    }

    /// Disjunction of `self` and `other`, flattening nested ORs
    pub fn or(self, other: Query) -> Self {
        match self {
            Query::Or(mut children) if !children.is_empty() => {
                children.push(other);
                Query::Or(children)
            }
            Query::Or(_) => other,
            q => Query::Or(vec![q, other]),
        }
    }

    /// Levels in the tree; a leaf counts as one.
    ///
    /// Walks an explicit stack so arbitrarily deep trees can be measured.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let Query::And(children) | Query::Or(children) = node {
                stack.extend(children.iter().map(|child| (child, depth + 1)));
            }
        }
        deepest
    }

    /// True when the expression has no leaves at all
    pub fn is_empty(&self) -> bool {
        match self {
            Query::Term(_) | Query::Tag(_) => false,
            Query::And(children) | Query::Or(children) => children.iter().all(Query::is_empty),
        }
    }
}

fn needs_quotes(text: &str) -> bool {
    text.is_empty()
        || text == "AND"
        || text == "OR"
        || text.to_ascii_lowercase().starts_with("tag:")
        || text
            .chars()
            .any(|c| c.is_whitespace() || c == '(' || c == ')' || c == '"')
}

fn write_text(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    if needs_quotes(text) {
        write!(f, "\"{}\"", text.replace('"', " "))
    } else {
        write!(f, "{}", text)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Term(text) => write_text(f, text),
            Query::Tag(tag) => {
                write!(f, "tag:")?;
                write_text(f, tag)
            }
            Query::And(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " AND ")?;
                    }
                    match child {
                        Query::Or(c) if c.len() > 1 => write!(f, "({})", child)?,
                        _ => write!(f, "{}", child)?,
                    }
                }
                Ok(())
            }
            Query::Or(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " OR ")?;
                    }
                    write!(f, "{}", child)?;
                }
                Ok(())
            }
        }
    }
}

/// Paging for query results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Maximum number of results; `None` means no limit
    pub limit: Option<usize>,
    /// Number of leading results to skip
    pub offset: usize,
}

impl QueryOptions {
    pub fn limit(limit: usize) -> Self {
        QueryOptions {
            limit: Some(limit),
            offset: 0,
        }
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// A matching record as returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
    pub id: RecordId,
    pub source: String,
    pub body: String,
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Record> for Hit {
    fn from(record: Record) -> Self {
        Hit {
            id: record.id,
            source: record.source,
            body: record.body,
            tags: record.tags,
            created_at: record.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_flatten() {
        let q = Query::term("a").and(Query::term("b")).and(Query::tag("c"));
        assert_eq!(
            q,
            Query::And(vec![Query::term("a"), Query::term("b"), Query::tag("c")])
        );

        let q = Query::empty().or(Query::tag("x")).or(Query::tag("y"));
        assert_eq!(q, Query::Or(vec![Query::tag("x"), Query::tag("y")]));
    }

    #[test]
    fn test_is_empty() {
        assert!(Query::empty().is_empty());
        assert!(Query::And(vec![Query::empty()]).is_empty());
        assert!(!Query::term("x").is_empty());
    }

    #[test]
    fn test_depth() {
        assert_eq!(Query::term("x").depth(), 1);
        assert_eq!(Query::empty().depth(), 1);
        let q = Query::And(vec![
            Query::tag("a"),
            Query::Or(vec![Query::term("b"), Query::And(vec![Query::term("c")])]),
        ]);
        assert_eq!(q.depth(), 4);
    }

    #[test]
    fn test_display_parses_back() {
        let q = Query::Or(vec![
            Query::And(vec![Query::tag("go"), Query::term("channels")]),
            Query::And(vec![
                Query::Or(vec![Query::tag("rust"), Query::tag("c++")]),
                Query::term("memory model"),
            ]),
        ]);
        let text = q.to_string();
        assert_eq!(
            text,
            "tag:go AND channels OR (tag:rust OR tag:c++) AND \"memory model\""
        );
        assert_eq!(Query::parse(&text).unwrap(), q);
    }

    #[test]
    fn test_options() {
        let opts = QueryOptions::limit(10).with_offset(20);
        assert_eq!(opts.limit, Some(10));
        assert_eq!(opts.offset, 20);
        assert_eq!(QueryOptions::default().limit, None);
    }
}
