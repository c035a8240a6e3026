//! Per-compilation state
//!
//! One `CompileState` exists per compiled statement. It owns the alias
//! counters, the FROM bindings, and the `LET` or `UNNEST` bindings emitted so
//! far, and it carries the context flags consulted by the emitters.

use docql_ir::{quote_identifier, Column, ColumnRef, LogicalTable, Segment};
use docql_registry::FunctionRegistry;

use crate::alias::AliasGenerator;
use crate::dispatch::{render_member, DispatchTable};
use crate::CompileError;

/// Clause being compiled, for error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    Select,
    Where,
    GroupBy,
    Having,
    OrderBy,
}

impl Clause {
    pub fn name(&self) -> &'static str {
        match self {
            Clause::Select => "SELECT",
            Clause::Where => "WHERE",
            Clause::GroupBy => "GROUP BY",
            Clause::Having => "HAVING",
            Clause::OrderBy => "ORDER BY",
        }
    }
}

/// A FROM entry and its generated alias
#[derive(Debug, Clone)]
pub struct BoundTable<'a> {
    pub table: &'a LogicalTable,
    pub alias: String,
}

/// A column reference resolved against the FROM list
#[derive(Debug, Clone)]
pub struct Resolved<'a> {
    pub table: &'a LogicalTable,
    pub alias: String,
    pub column: &'a Column,
}

/// The array table's binding once a select item has touched it
#[derive(Debug, Clone)]
pub struct ArrayTarget {
    pub table: String,
    pub binding: String,
    pub steps: Vec<Segment>,
}

/// One `UNNEST <expression> AS <alias>` step
#[derive(Debug, Clone)]
struct Unnest {
    expression: String,
    alias: String,
}

/// The innermost `UNNEST` alias of an array table, one row per element
#[derive(Debug, Clone)]
struct Flattened {
    table: String,
    alias: String,
}

pub struct CompileState<'a> {
    pub(crate) dispatch: &'a DispatchTable,
    pub(crate) registry: &'a FunctionRegistry,
    pub(crate) tables: Vec<BoundTable<'a>>,
    /// Column emitters report what they resolved while set
    pub(crate) recording: bool,
    /// Array index/element columns may be projected for decoder unwinding
    pub(crate) array_columns: bool,
    /// Array tables are flattened natively instead of unwound by the decoder
    pub(crate) unnest: bool,
    pub(crate) clause: Clause,
    pub(crate) column_aliases: AliasGenerator,
    binding_aliases: AliasGenerator,
    bindings: Vec<(String, String)>,
    unnests: Vec<Unnest>,
    flattened: Vec<Flattened>,
    pub(crate) array: Option<ArrayTarget>,
}

impl<'a> CompileState<'a> {
    pub fn new(dispatch: &'a DispatchTable, registry: &'a FunctionRegistry) -> Self {
        Self {
            dispatch,
            registry,
            tables: Vec::new(),
            recording: true,
            array_columns: false,
            unnest: false,
            clause: Clause::Select,
            column_aliases: AliasGenerator::new(AliasGenerator::COLUMN),
            binding_aliases: AliasGenerator::new(AliasGenerator::BINDING),
            bindings: Vec::new(),
            unnests: Vec::new(),
            flattened: Vec::new(),
            array: None,
        }
    }

    pub fn resolve(&self, col: &ColumnRef) -> Result<Resolved<'a>, CompileError> {
        let bound = match &col.table {
            Some(name) => self
                .tables
                .iter()
                .find(|b| &b.table.name == name)
                .ok_or_else(|| CompileError::UnknownTable(name.clone()))?,
            None => {
                let mut matches = self
                    .tables
                    .iter()
                    .filter(|b| b.table.column(&col.column).is_some());
                let first = matches.next().ok_or_else(|| CompileError::UnknownColumn {
                    table: self
                        .tables
                        .first()
                        .map(|b| b.table.name.clone())
                        .unwrap_or_default(),
                    column: col.column.clone(),
                })?;
                if matches.next().is_some() {
                    return Err(CompileError::AmbiguousColumn(col.column.clone()));
                }
                first
            }
        };

        let table: &'a LogicalTable = bound.table;
        let column = table
            .column(&col.column)
            .ok_or_else(|| CompileError::UnknownColumn {
                table: table.name.clone(),
                column: col.column.clone(),
            })?;
        Ok(Resolved {
            table,
            alias: bound.alias.clone(),
            column,
        })
    }

    /// `LET` binding for `expression`, reusing an earlier one for the same text
    pub fn bind(&mut self, expression: String) -> String {
        if let Some((alias, _)) = self.bindings.iter().find(|(_, e)| *e == expression) {
            return alias.clone();
        }
        let alias = self.binding_aliases.generate();
        self.bindings.push((alias.clone(), expression));
        alias
    }

    /// Rendered `LET` clause body, if any binding was emitted
    pub fn let_clause(&self) -> Option<String> {
        if self.bindings.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .bindings
            .iter()
            .map(|(alias, expr)| format!("{} = {}", quote_identifier(alias), expr))
            .collect();
        Some(parts.join(", "))
    }

    /// Emit one `UNNEST` per array level of `table` below its FROM alias and
    /// return the innermost element alias
    pub fn flatten(&mut self, table: &LogicalTable, from_alias: &str) -> Result<String, CompileError> {
        if let Some(alias) = self.flattened_alias(&table.name) {
            return Ok(alias.to_string());
        }
        let unresolved = || CompileError::UnresolvedSource {
            table: table.name.clone(),
            column: table.name.clone(),
        };
        let mut base = quote_identifier(from_alias);
        let mut keys: Vec<Segment> = Vec::new();
        let mut innermost = None;
        for segment in table.source.segments() {
            match segment {
                Segment::Key(_) => keys.push(segment.clone()),
                Segment::Array => {
                    let expression = render_member(&base, &keys).map_err(|_| unresolved())?;
                    let alias = self.binding_aliases.generate();
                    base = quote_identifier(&alias);
                    keys.clear();
                    self.unnests.push(Unnest {
                        expression,
                        alias: alias.clone(),
                    });
                    innermost = Some(alias);
                }
            }
        }
        let alias = innermost.ok_or_else(unresolved)?;
        self.flattened.push(Flattened {
            table: table.name.clone(),
            alias: alias.clone(),
        });
        Ok(alias)
    }

    pub fn flattened_alias(&self, table: &str) -> Option<&str> {
        self.flattened
            .iter()
            .find(|f| f.table == table)
            .map(|f| f.alias.as_str())
    }

    /// Rendered `UNNEST` chain, if any array table was flattened
    pub fn unnest_clause(&self) -> Option<String> {
        if self.unnests.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .unnests
            .iter()
            .map(|u| format!("UNNEST {} AS {}", u.expression, quote_identifier(&u.alias)))
            .collect();
        Some(parts.join(" "))
    }
}
