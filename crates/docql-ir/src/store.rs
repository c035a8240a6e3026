//! Document store collaborator
//!
//! The network client that runs native query text is external; everything in
//! this workspace talks to it through [`DocumentStore`].

use thiserror::Error;

use crate::value::DocObject;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("query failed: {message} (query: {query})")]
    Query { query: String, message: String },

    #[error("connection error: {0}")]
    Connection(String),
}

/// Executes native query text and returns rows as document trees
pub trait DocumentStore {
    /// Namespace the store is configured for
    fn namespace(&self) -> &str;

    fn execute_query(&self, n1ql: &str) -> Result<Vec<DocObject>, StoreError>;
}

impl<T: DocumentStore + ?Sized> DocumentStore for &T {
    fn namespace(&self) -> &str {
        (**self).namespace()
    }

    fn execute_query(&self, n1ql: &str) -> Result<Vec<DocObject>, StoreError> {
        (**self).execute_query(n1ql)
    }
}

/// Scripted store for tests, enabled with the `mock` feature
#[cfg(any(test, feature = "mock"))]
mod mock {
    use std::cell::RefCell;

    use super::{DocumentStore, StoreError};
    use crate::value::DocObject;

    enum Matcher {
        Exact(String),
        Prefix(String),
    }

    impl Matcher {
        fn matches(&self, query: &str) -> bool {
            match self {
                Matcher::Exact(q) => q == query,
                Matcher::Prefix(p) => query.starts_with(p.as_str()),
            }
        }
    }

    /// Scripted in-memory store.
    ///
    /// Responses are matched in registration order; an unmatched query returns
    /// no rows. Every executed query is logged for inspection.
    pub struct MockStore {
        namespace: String,
        responses: Vec<(Matcher, Result<Vec<DocObject>, String>)>,
        executed: RefCell<Vec<String>>,
    }

    impl MockStore {
        pub fn new(namespace: impl Into<String>) -> Self {
            Self {
                namespace: namespace.into(),
                responses: Vec::new(),
                executed: RefCell::new(Vec::new()),
            }
        }

        pub fn respond(mut self, query: impl Into<String>, rows: Vec<DocObject>) -> Self {
            self.responses.push((Matcher::Exact(query.into()), Ok(rows)));
            self
        }

        pub fn respond_prefix(mut self, prefix: impl Into<String>, rows: Vec<DocObject>) -> Self {
            self.responses.push((Matcher::Prefix(prefix.into()), Ok(rows)));
            self
        }

        pub fn fail(mut self, query: impl Into<String>, message: impl Into<String>) -> Self {
            self.responses
                .push((Matcher::Exact(query.into()), Err(message.into())));
            self
        }

        pub fn executed(&self) -> Vec<String> {
            self.executed.borrow().clone()
        }
    }

    impl DocumentStore for MockStore {
        fn namespace(&self) -> &str {
            &self.namespace
        }

        fn execute_query(&self, n1ql: &str) -> Result<Vec<DocObject>, StoreError> {
            self.executed.borrow_mut().push(n1ql.to_string());
            match self.responses.iter().find(|(m, _)| m.matches(n1ql)) {
                Some((_, Ok(rows))) => Ok(rows.clone()),
                Some((_, Err(message))) => Err(StoreError::Query {
                    query: n1ql.to_string(),
                    message: message.clone(),
                }),
                None => Ok(Vec::new()),
            }
        }
    }
}

#[cfg(any(test, feature = "mock"))]
pub use mock::MockStore;
