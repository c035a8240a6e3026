//! Query execution against a document store

use docql_ir::{DataType, DocObject, DocumentStore};
use docql_n1ql::Compiled;
use tracing::{debug, info};

use crate::decoder::ResultDecoder;
use crate::procedure::{decode_procedure, ProcedureResult};
use crate::{ExecutionError, Row};

pub struct ExecutionBudget {
    pub max_rows: Option<u64>,
}

/// Item produced by an execution
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Row(Row),
    Document(ProcedureResult),
}

enum Cursor {
    Rows(ResultDecoder<std::vec::IntoIter<DocObject>>),
    Documents {
        procedure: docql_ir::Procedure,
        rows: std::vec::IntoIter<DocObject>,
    },
}

/// One running statement. Owns its store handle and result cursor; nothing
/// is shared with other executions.
pub struct QueryExecution<S: DocumentStore> {
    store: S,
    cursor: Option<Cursor>,
    budget: Option<ExecutionBudget>,
    produced: u64,
}

impl<S: DocumentStore> QueryExecution<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursor: None,
            budget: None,
            produced: 0,
        }
    }

    pub fn with_budget(mut self, budget: ExecutionBudget) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Run the compiled statement and open its cursor. `expected` overrides
    /// the query's own output types.
    pub fn execute(
        &mut self,
        compiled: &Compiled,
        expected: Option<Vec<DataType>>,
    ) -> Result<(), ExecutionError> {
        debug!(n1ql = %compiled.n1ql(), "Executing native query");
        let rows = self.store.execute_query(compiled.n1ql())?;
        info!(rows = rows.len(), "Native query returned");

        let cursor = match compiled {
            Compiled::Query(query) => {
                let decoder = ResultDecoder::new(rows, query.clone());
                let decoder = match expected {
                    Some(types) => decoder.with_types(types)?,
                    None => decoder,
                };
                Cursor::Rows(decoder)
            }
            Compiled::Procedure(procedure) => Cursor::Documents {
                procedure: procedure.procedure,
                rows: rows.into_iter(),
            },
        };
        self.cursor = Some(cursor);
        self.produced = 0;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.cursor.is_some()
    }

    /// Stop pulling and release the cursor. The store is not contacted.
    pub fn cancel(&mut self) {
        if self.cursor.take().is_some() {
            debug!(produced = self.produced, "Execution cancelled");
        }
    }

    pub fn close(&mut self) {
        self.cursor = None;
    }
}

impl<S: DocumentStore> Iterator for QueryExecution<S> {
    type Item = Result<Output, ExecutionError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = match self.cursor.as_mut()? {
            Cursor::Rows(decoder) => decoder
                .next()
                .map(|r| r.map(Output::Row).map_err(ExecutionError::from)),
            Cursor::Documents { procedure, rows } => rows.next().map(|row| {
                decode_procedure(*procedure, &row)
                    .map(Output::Document)
                    .map_err(ExecutionError::from)
            }),
        };

        match item {
            Some(Ok(output)) => {
                self.produced += 1;
                if let Some(max_rows) = self.budget.as_ref().and_then(|b| b.max_rows) {
                    if self.produced > max_rows {
                        self.cursor = None;
                        return Some(Err(ExecutionError::BudgetExceeded(format!(
                            "Max rows ({}) exceeded",
                            max_rows
                        ))));
                    }
                }
                Some(Ok(output))
            }
            other => {
                self.cursor = None;
                other
            }
        }
    }
}
