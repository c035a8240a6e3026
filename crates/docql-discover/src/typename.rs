//! Keyspace to discriminator attribute table
//!
//! Parsed once from a list such as ``test:type,`my-bucket`:`doc type` ``
//! and shared read-only with the discoverer.

use regex::Regex;
use std::collections::HashMap;
use tracing::{error, warn};

const ENTRY_PATTERN: &str = r"^([a-zA-Z_]\w*|(?:`[^`]*`)+):([a-zA-Z_]\w*|(?:`[^`]*`)+)$";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeNameMap {
    entries: HashMap<String, String>,
}

impl TypeNameMap {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a comma-separated `<keyspace>:<attribute>` list.
    ///
    /// Malformed entries are logged and skipped; the remaining entries still
    /// apply.
    pub fn parse(list: &str) -> Self {
        let pattern = match Regex::new(ENTRY_PATTERN) {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "Type name pattern failed to compile, partitioning disabled");
                return Self::empty();
            }
        };

        let mut entries = HashMap::new();
        for entry in split_entries(list) {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            match pattern.captures(entry) {
                Some(caps) => {
                    let keyspace = unquote(&caps[1]);
                    let attribute = unquote(&caps[2]);
                    entries.insert(keyspace, attribute);
                }
                None => warn!(entry = %entry, "Skipping malformed type name entry"),
            }
        }
        Self { entries }
    }

    /// Discriminator attribute configured for `keyspace`, unquoted
    pub fn get(&self, keyspace: &str) -> Option<&str> {
        self.entries.get(keyspace).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Commas inside back-quoted identifiers do not separate entries.
fn split_entries(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in list.char_indices() {
        match c {
            '`' => quoted = !quoted,
            ',' if !quoted => {
                parts.push(&list[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&list[start..]);
    parts
}

fn unquote(identifier: &str) -> String {
    match identifier
        .strip_prefix('`')
        .and_then(|s| s.strip_suffix('`'))
    {
        Some(inner) => inner.replace("``", "`"),
        None => identifier.to_string(),
    }
}
