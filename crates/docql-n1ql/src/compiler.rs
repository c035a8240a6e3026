//! Relational plan to N1QL
//!
//! A single pass over the plan. Select items are emitted first so that any
//! `LET` binding they need is known before the clause list is assembled.
//!
//! Array tables are read one of two ways. A plain projection binds the
//! outermost array with `LET`, projects it once, and leaves the unwinding to
//! the decoder. Any other use of an array table (filtering, ordering,
//! grouping, aggregates, DISTINCT, computed items, several array tables)
//! flattens it natively with one `UNNEST` per array level, so every native
//! row is already one output row.

use docql_ir::{
    quote_identifier, AggFunc, BinOp, ColumnRole, Command, DataType, Expr, Limit, Select,
    SchemaProvider, UnOp,
};
use docql_registry::{conversion_type, FunctionRegistry, Rewrite};
use tracing::debug;

use crate::dispatch::{emit, infix, quote_string, render_member, DispatchTable, Emitted, PREC_AND, PREC_COMPARE};
use crate::metadata::{ArrayProjection, ColumnKind, Compiled, CompiledQuery, SelectColumn};
use crate::procedures::compile_call;
use crate::state::{ArrayTarget, BoundTable, Clause, CompileState};
use crate::{CompileError, CompilerOptions};

/// Row count used when a store needs `LIMIT` in front of `OFFSET`
pub const MAX_LIMIT: u64 = i32::MAX as u64;

pub struct Compiler<'a, P: SchemaProvider> {
    schema: &'a P,
    registry: &'a FunctionRegistry,
    dispatch: DispatchTable,
    options: CompilerOptions,
}

impl<'a, P: SchemaProvider> Compiler<'a, P> {
    pub fn new(schema: &'a P, registry: &'a FunctionRegistry) -> Self {
        Self {
            schema,
            registry,
            dispatch: DispatchTable::standard(),
            options: CompilerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchTable) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn compile(&self, command: &Command) -> Result<Compiled, CompileError> {
        match command {
            Command::Select(select) => self.compile_select(select).map(Compiled::Query),
            Command::Call(call) => {
                let compiled = compile_call(call)?;
                debug!(procedure = compiled.procedure.name(), n1ql = %compiled.n1ql, "Compiled procedure");
                Ok(Compiled::Procedure(compiled))
            }
        }
    }

    pub fn compile_select(&self, select: &Select) -> Result<CompiledQuery, CompileError> {
        if select.columns.is_empty() {
            return Err(CompileError::InvalidPlan("empty select list".to_string()));
        }

        let mut state = CompileState::new(&self.dispatch, self.registry);
        let mut table_aliases = crate::alias::AliasGenerator::new(crate::alias::AliasGenerator::TABLE);
        for table_ref in &select.from {
            let table = self
                .schema
                .get_table(&table_ref.name)
                .map_err(|_| CompileError::UnknownTable(table_ref.name.clone()))?;
            state.tables.push(BoundTable {
                table,
                alias: table_aliases.generate(),
            });
        }

        state.unnest = needs_unnest(select, &state);
        if state.unnest {
            let arrays: Vec<BoundTable<'_>> =
                state.tables.iter().filter(|b| b.table.is_array).cloned().collect();
            for bound in arrays {
                state.flatten(bound.table, &bound.alias)?;
            }
        }

        // Select list
        state.clause = Clause::Select;
        state.recording = true;
        let mut items = Vec::with_capacity(select.columns.len());
        let mut columns = Vec::with_capacity(select.columns.len());
        let mut projection_alias: Option<String> = None;

        for derived in &select.columns {
            let bare = matches!(derived.expr, Expr::Column { .. }) && !state.unnest;
            state.array_columns = bare;
            let emitted = emit(&derived.expr, &mut state)?;
            state.array_columns = false;

            let kind = if bare {
                emitted.records.first().cloned().unwrap_or(ColumnKind::Scalar)
            } else {
                ColumnKind::Scalar
            };

            let alias = if kind.is_array() {
                match &projection_alias {
                    Some(alias) => alias.clone(),
                    None => {
                        let alias = state.column_aliases.generate();
                        items.push(format!("{} AS {}", emitted.text, quote_identifier(&alias)));
                        projection_alias = Some(alias.clone());
                        alias
                    }
                }
            } else {
                let alias = state.column_aliases.generate();
                items.push(format!("{} AS {}", emitted.text, quote_identifier(&alias)));
                alias
            };

            let reference = derived.alias.clone().or_else(|| match &derived.expr {
                Expr::Column { col } => Some(col.column.clone()),
                _ => None,
            });

            columns.push(SelectColumn {
                alias,
                reference,
                kind,
                data_type: output_type(&derived.expr, &state),
            });
        }

        // An array table still yields one row per element when only its
        // identity is selected
        if projection_alias.is_none() && !state.unnest {
            if let Some(bound) = state.tables.iter().find(|b| b.table.is_array).cloned() {
                let table = bound.table;
                let unresolved = || CompileError::UnresolvedSource {
                    table: table.name.clone(),
                    column: table.name.clone(),
                };
                let (head, steps) = table.source.split_first_array().ok_or_else(unresolved)?;
                let head_text = render_member(&quote_identifier(&bound.alias), head)
                    .map_err(|_| unresolved())?;
                let binding = state.bind(head_text);
                let alias = state.column_aliases.generate();
                items.push(format!("{} AS {}", quote_identifier(&binding), quote_identifier(&alias)));
                state.array = Some(ArrayTarget {
                    table: table.name.clone(),
                    binding,
                    steps: steps.to_vec(),
                });
                projection_alias = Some(alias);
            }
        }

        let array = match (state.array.as_ref(), projection_alias) {
            (Some(target), Some(alias)) => Some(ArrayProjection {
                table: target.table.clone(),
                binding: target.binding.clone(),
                alias,
                steps: target.steps.clone(),
            }),
            _ => None,
        };

        // WHERE: user predicate conjoined with each table's discriminator
        state.clause = Clause::Where;
        let mut predicates: Vec<Emitted> = Vec::new();
        if let Some(filter) = &select.filter {
            predicates.push(emit(filter, &mut state)?);
        }
        for bound in &state.tables {
            if let Some(d) = &bound.table.discriminator {
                predicates.push(Emitted::new(
                    format!(
                        "{}.{} = {}",
                        quote_identifier(&bound.alias),
                        quote_identifier(&d.attribute),
                        quote_string(&d.value)
                    ),
                    PREC_COMPARE,
                ));
            }
        }
        let where_clause = predicates
            .into_iter()
            .reduce(|acc, p| infix(&acc, "AND", PREC_AND, true, &p));

        // GROUP BY and ORDER BY reuse column rendering without recording
        state.recording = false;
        state.clause = Clause::GroupBy;
        let mut group_by = Vec::with_capacity(select.group_by.len());
        for expr in &select.group_by {
            group_by.push(emit(expr, &mut state)?.text);
        }

        state.recording = true;
        state.clause = Clause::Having;
        let having = match &select.having {
            Some(expr) => Some(emit(expr, &mut state)?.text),
            None => None,
        };

        state.recording = false;
        state.clause = Clause::OrderBy;
        let mut order_by = Vec::with_capacity(select.order_by.len());
        for key in &select.order_by {
            let mut text = emit(&key.expr, &mut state)?.text;
            if key.desc {
                text.push_str(" DESC");
            }
            match key.nulls {
                Some(docql_ir::NullOrdering::First) => text.push_str(" NULLS FIRST"),
                Some(docql_ir::NullOrdering::Last) => text.push_str(" NULLS LAST"),
                None => {}
            }
            order_by.push(text);
        }

        // Assemble
        let mut n1ql = String::from("SELECT ");
        if select.distinct {
            n1ql.push_str("DISTINCT ");
        }
        n1ql.push_str(&items.join(", "));
        if !state.tables.is_empty() {
            let from: Vec<String> = state
                .tables
                .iter()
                .map(|b| {
                    format!(
                        "{} {}",
                        quote_identifier(b.table.keyspace()),
                        quote_identifier(&b.alias)
                    )
                })
                .collect();
            n1ql.push_str(" FROM ");
            n1ql.push_str(&from.join(", "));
        }
        if let Some(unnests) = state.unnest_clause() {
            n1ql.push(' ');
            n1ql.push_str(&unnests);
        }
        if let Some(bindings) = state.let_clause() {
            n1ql.push_str(" LET ");
            n1ql.push_str(&bindings);
        }
        if let Some(predicate) = where_clause {
            n1ql.push_str(" WHERE ");
            n1ql.push_str(&predicate.text);
        }
        if !group_by.is_empty() {
            n1ql.push_str(" GROUP BY ");
            n1ql.push_str(&group_by.join(", "));
        }
        if let Some(having) = having {
            n1ql.push_str(" HAVING ");
            n1ql.push_str(&having);
        }
        if !order_by.is_empty() {
            n1ql.push_str(" ORDER BY ");
            n1ql.push_str(&order_by.join(", "));
        }

        // Array rows only exist after decoding, so the window moves there
        let window = if array.is_some() {
            select.limit.filter(|l| l.count.is_some() || l.offset > 0)
        } else {
            if let Some(limit) = select.limit.as_ref().and_then(|l| self.render_limit(l)) {
                n1ql.push(' ');
                n1ql.push_str(&limit);
            }
            None
        };

        debug!(n1ql = %n1ql, columns = columns.len(), "Compiled query");
        Ok(CompiledQuery {
            n1ql,
            columns,
            array,
            window,
        })
    }

    fn render_limit(&self, limit: &Limit) -> Option<String> {
        match (limit.count, limit.offset) {
            (Some(count), 0) => Some(format!("LIMIT {}", count)),
            (Some(count), offset) => Some(format!("LIMIT {} OFFSET {}", count, offset)),
            (None, 0) => None,
            (None, offset) if self.options.offset_requires_limit => {
                Some(format!("LIMIT {} OFFSET {}", MAX_LIMIT, offset))
            }
            (None, offset) => Some(format!("OFFSET {}", offset)),
        }
    }
}

/// Whether the array tables in FROM must be flattened with `UNNEST`, that
/// is whether anything beyond bare select items depends on their elements
fn needs_unnest(select: &Select, state: &CompileState<'_>) -> bool {
    let arrays = state.tables.iter().filter(|b| b.table.is_array).count();
    if arrays == 0 {
        return false;
    }
    if arrays > 1 || select.distinct || !select.group_by.is_empty() || select.having.is_some() {
        return true;
    }
    let computed = select
        .columns
        .iter()
        .map(|d| &d.expr)
        .filter(|e| !matches!(e, Expr::Column { .. }));
    let clauses = select.filter.iter().chain(select.order_by.iter().map(|k| &k.expr));
    computed
        .chain(clauses)
        .any(|expr| has_aggregate(expr) || touches_elements(expr, state))
}

fn has_aggregate(expr: &Expr) -> bool {
    let mut found = false;
    expr.visit(&mut |e| found |= matches!(e, Expr::Aggregate { .. }));
    found
}

// Unresolvable references are reported later by the emitters.
fn touches_elements(expr: &Expr, state: &CompileState<'_>) -> bool {
    expr.column_refs().into_iter().any(|col| {
        state
            .resolve(col)
            .is_ok_and(|r| r.table.is_array && r.column.role != ColumnRole::Identity)
    })
}

/// Relational type of a select item
fn output_type(expr: &Expr, state: &CompileState<'_>) -> DataType {
    match expr {
        Expr::Literal { value } => value.data_type(),
        Expr::Column { col } => state
            .resolve(col)
            .map(|r| r.column.data_type)
            .unwrap_or(DataType::Object),
        Expr::BinaryOp { op, left, right } => match op {
            BinOp::And | BinOp::Or | BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt
            | BinOp::Ge => DataType::Boolean,
            BinOp::Concat => DataType::String,
            BinOp::Div => DataType::Double,
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Mod => {
                let l = output_type(left, state);
                let r = output_type(right, state);
                if l == r && l.is_numeric() {
                    l
                } else {
                    DataType::Double
                }
            }
        },
        Expr::UnaryOp { op: UnOp::Not, .. } => DataType::Boolean,
        Expr::UnaryOp { op: UnOp::Neg, expr } => output_type(expr, state),
        Expr::IsNull { .. } | Expr::Like { .. } | Expr::InList { .. } => DataType::Boolean,
        Expr::Aggregate { func, arg, .. } => match func {
            AggFunc::Count => DataType::Long,
            AggFunc::Avg | AggFunc::Sum => DataType::Double,
            AggFunc::Min | AggFunc::Max => arg
                .as_deref()
                .map(|a| output_type(a, state))
                .unwrap_or(DataType::Object),
        },
        Expr::Function { name, args } => match state.registry.lookup(name).map(|f| &f.rewrite) {
            Some(Rewrite::Convert) => match args.get(1) {
                Some(Expr::Literal { value: docql_ir::Literal::String(t) }) => conversion_type(t),
                Some(Expr::Column { col }) => conversion_type(&col.column),
                _ => DataType::Object,
            },
            Some(Rewrite::DatePart { .. }) => DataType::Integer,
            Some(Rewrite::Constant { .. }) | Some(Rewrite::MetaId) | Some(Rewrite::Infix { .. }) => {
                DataType::String
            }
            _ => DataType::Object,
        },
    }
}
