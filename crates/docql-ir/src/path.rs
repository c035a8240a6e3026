//! Source paths
//!
//! A source path locates a table's rows or a column's values inside the
//! documents of one keyspace. Paths are immutable; extending one yields a new
//! path. They render to native text only at the edges (`render`).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Segment {
    /// Object member access
    Key(String),
    /// Step into the elements of an array
    Array,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourcePath {
    keyspace: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    segments: Vec<Segment>,
}

impl SourcePath {
    pub fn root(keyspace: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            segments: Vec::new(),
        }
    }

    pub fn key(&self, key: impl Into<String>) -> Self {
        self.push(Segment::Key(key.into()))
    }

    pub fn array(&self) -> Self {
        self.push(Segment::Array)
    }

    fn push(&self, segment: Segment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self {
            keyspace: self.keyspace.clone(),
            segments,
        }
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of array dimensions crossed by this path
    pub fn depth(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Array))
            .count()
    }

    pub fn ends_in_array(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Array))
    }

    /// Split around the first array marker: the object keys leading to the
    /// outermost array, and the steps that follow it.
    pub fn split_first_array(&self) -> Option<(&[Segment], &[Segment])> {
        let pos = self
            .segments
            .iter()
            .position(|s| matches!(s, Segment::Array))?;
        Some((&self.segments[..pos], &self.segments[pos + 1..]))
    }

    /// Segments of `self` below `prefix`, if `prefix` is an ancestor
    pub fn strip_prefix(&self, prefix: &SourcePath) -> Option<&[Segment]> {
        if self.keyspace != prefix.keyspace {
            return None;
        }
        self.segments.strip_prefix(prefix.segments.as_slice())
    }

    /// Native form, e.g. `` `test`.`Items`[].`ItemID` ``
    pub fn render(&self) -> String {
        let mut out = quote_identifier(&self.keyspace);
        for segment in &self.segments {
            match segment {
                Segment::Key(k) => {
                    out.push('.');
                    out.push_str(&quote_identifier(k));
                }
                Segment::Array => out.push_str("[]"),
            }
        }
        out
    }
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Back-quote an identifier, doubling embedded back-quotes
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Strip one pair of surrounding back-quotes, if present
pub fn unquote_identifier(name: &str) -> &str {
    name.strip_prefix('`')
        .and_then(|s| s.strip_suffix('`'))
        .unwrap_or(name)
}
