//! Expression emitters
//!
//! Each expression kind maps to one emit function in a [`DispatchTable`].
//! Emitters take the node and the compile state and return native text with
//! its binding precedence, plus a record of what a bare column resolved to.

use std::collections::HashMap;

use docql_ir::{
    quote_identifier, BinOp, ColumnRole, Expr, Literal, Segment, UnOp,
};
use docql_registry::{conversion_function, Rewrite};

use crate::metadata::ColumnKind;
use crate::state::{ArrayTarget, CompileState};
use crate::CompileError;

// Binding strength, loosest first
pub const PREC_OR: u8 = 1;
pub const PREC_AND: u8 = 2;
pub const PREC_NOT: u8 = 3;
pub const PREC_COMPARE: u8 = 4;
pub const PREC_CONCAT: u8 = 5;
pub const PREC_ADD: u8 = 6;
pub const PREC_MUL: u8 = 7;
pub const PREC_UNARY: u8 = 8;
pub const PREC_ATOM: u8 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExprKind {
    Literal,
    Column,
    BinaryOp,
    UnaryOp,
    Function,
    Aggregate,
    IsNull,
    Like,
    InList,
}

impl ExprKind {
    pub fn of(expr: &Expr) -> Self {
        match expr {
            Expr::Literal { .. } => ExprKind::Literal,
            Expr::Column { .. } => ExprKind::Column,
            Expr::BinaryOp { .. } => ExprKind::BinaryOp,
            Expr::UnaryOp { .. } => ExprKind::UnaryOp,
            Expr::Function { .. } => ExprKind::Function,
            Expr::Aggregate { .. } => ExprKind::Aggregate,
            Expr::IsNull { .. } => ExprKind::IsNull,
            Expr::Like { .. } => ExprKind::Like,
            Expr::InList { .. } => ExprKind::InList,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emitted {
    pub text: String,
    pub precedence: u8,
    pub records: Vec<ColumnKind>,
}

impl Emitted {
    pub fn new(text: impl Into<String>, precedence: u8) -> Self {
        Self {
            text: text.into(),
            precedence,
            records: Vec::new(),
        }
    }

    /// Text wrapped in parentheses when it binds looser than `min`
    pub fn at_least(&self, min: u8) -> String {
        if self.precedence < min {
            format!("({})", self.text)
        } else {
            self.text.clone()
        }
    }
}

pub type EmitFn = fn(&Expr, &mut CompileState<'_>) -> Result<Emitted, CompileError>;

pub struct DispatchTable {
    entries: HashMap<ExprKind, EmitFn>,
}

impl DispatchTable {
    pub fn standard() -> Self {
        let mut entries: HashMap<ExprKind, EmitFn> = HashMap::new();
        entries.insert(ExprKind::Literal, emit_literal);
        entries.insert(ExprKind::Column, emit_column);
        entries.insert(ExprKind::BinaryOp, emit_binary);
        entries.insert(ExprKind::UnaryOp, emit_unary);
        entries.insert(ExprKind::Function, emit_function);
        entries.insert(ExprKind::Aggregate, emit_aggregate);
        entries.insert(ExprKind::IsNull, emit_is_null);
        entries.insert(ExprKind::Like, emit_like);
        entries.insert(ExprKind::InList, emit_in_list);
        Self { entries }
    }

    /// Replace the emitter for one expression kind
    pub fn register(&mut self, kind: ExprKind, emit: EmitFn) {
        self.entries.insert(kind, emit);
    }

    pub fn get(&self, kind: ExprKind) -> Option<EmitFn> {
        self.entries.get(&kind).copied()
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Emit any expression through the state's dispatch table
pub fn emit(expr: &Expr, state: &mut CompileState<'_>) -> Result<Emitted, CompileError> {
    let kind = ExprKind::of(expr);
    let f = state
        .dispatch
        .get(kind)
        .ok_or_else(|| CompileError::Unsupported(format!("no emitter for {:?}", kind)))?;
    f(expr, state)
}

pub fn quote_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn render_literal(value: &Literal) -> String {
    match value {
        Literal::Null => "NULL".to_string(),
        Literal::Bool(true) => "TRUE".to_string(),
        Literal::Bool(false) => "FALSE".to_string(),
        Literal::Int(i) => i.to_string(),
        Literal::Float(f) if f.is_finite() => f.to_string(),
        Literal::Float(_) => "NULL".to_string(),
        Literal::String(s) => quote_string(s),
    }
}

/// Member access below `base` through object keys
pub fn render_member(base: &str, keys: &[Segment]) -> Result<String, String> {
    let mut out = base.to_string();
    for segment in keys {
        match segment {
            Segment::Key(k) => {
                out.push('.');
                out.push_str(&quote_identifier(k));
            }
            Segment::Array => return Err("path crosses an array".to_string()),
        }
    }
    Ok(out)
}

fn emit_literal(expr: &Expr, _state: &mut CompileState<'_>) -> Result<Emitted, CompileError> {
    let Expr::Literal { value } = expr else {
        return Err(mismatch(expr));
    };
    let precedence = match value {
        Literal::Int(i) if *i < 0 => PREC_UNARY,
        Literal::Float(f) if *f < 0.0 => PREC_UNARY,
        _ => PREC_ATOM,
    };
    Ok(Emitted::new(render_literal(value), precedence))
}

fn emit_column(expr: &Expr, state: &mut CompileState<'_>) -> Result<Emitted, CompileError> {
    let Expr::Column { col } = expr else {
        return Err(mismatch(expr));
    };
    let resolved = state.resolve(col)?;
    let table = resolved.table;
    let column = resolved.column;
    let alias = quote_identifier(&resolved.alias);

    let (text, kind) = match column.role {
        ColumnRole::Identity => (format!("META({}).id", alias), ColumnKind::Identity),
        ColumnRole::Index | ColumnRole::Value if table.is_array && state.unnest => {
            let element = state
                .flattened_alias(&table.name)
                .map(quote_identifier)
                .ok_or_else(|| unresolved(&table.name, &column.name))?;
            let text = match column.role {
                ColumnRole::Index => format!("UNNEST_POS({})", element),
                _ => element_leaf(table, column)?
                    .iter()
                    .fold(element, |acc, key| format!("{}.{}", acc, quote_identifier(key))),
            };
            (text, ColumnKind::Scalar)
        }
        ColumnRole::Index | ColumnRole::Value if table.is_array => {
            if !state.array_columns {
                return Err(CompileError::InvalidPlan(format!(
                    "array column {}.{} in {} without UNNEST",
                    table.name,
                    column.name,
                    state.clause.name()
                )));
            }
            let kind = match column.role {
                ColumnRole::Index => ColumnKind::Index,
                _ => ColumnKind::Element {
                    leaf: element_leaf(table, column)?,
                },
            };
            let (head, steps) = table
                .source
                .split_first_array()
                .ok_or_else(|| unresolved(&table.name, &column.name))?;
            let head_text =
                render_member(&alias, head).map_err(|_| unresolved(&table.name, &column.name))?;
            let binding = state.bind(head_text);
            if state.array.is_none() {
                state.array = Some(ArrayTarget {
                    table: table.name.clone(),
                    binding: binding.clone(),
                    steps: steps.to_vec(),
                });
            }
            (quote_identifier(&binding), kind)
        }
        ColumnRole::Index => return Err(unresolved(&table.name, &column.name)),
        ColumnRole::Value => {
            let source = column
                .source
                .as_ref()
                .ok_or_else(|| unresolved(&table.name, &column.name))?;
            let relative = source
                .strip_prefix(&table.source)
                .ok_or_else(|| unresolved(&table.name, &column.name))?;
            let text =
                render_member(&alias, relative).map_err(|_| unresolved(&table.name, &column.name))?;
            (text, ColumnKind::Scalar)
        }
    };

    let mut emitted = Emitted::new(text, PREC_ATOM);
    if state.recording {
        emitted.records.push(kind);
    }
    Ok(emitted)
}

// Object keys from an array table's elements down to the column's value.
fn element_leaf(
    table: &docql_ir::LogicalTable,
    column: &docql_ir::Column,
) -> Result<Vec<String>, CompileError> {
    let Some(source) = column.source.as_ref() else {
        return Ok(Vec::new());
    };
    let relative = source
        .strip_prefix(&table.source)
        .ok_or_else(|| unresolved(&table.name, &column.name))?;
    relative
        .iter()
        .map(|s| match s {
            Segment::Key(k) => Ok(k.clone()),
            Segment::Array => Err(unresolved(&table.name, &column.name)),
        })
        .collect()
}

fn binary_info(op: BinOp) -> (&'static str, u8, bool) {
    match op {
        BinOp::Or => ("OR", PREC_OR, true),
        BinOp::And => ("AND", PREC_AND, true),
        BinOp::Eq => ("=", PREC_COMPARE, false),
        BinOp::Ne => ("!=", PREC_COMPARE, false),
        BinOp::Lt => ("<", PREC_COMPARE, false),
        BinOp::Le => ("<=", PREC_COMPARE, false),
        BinOp::Gt => (">", PREC_COMPARE, false),
        BinOp::Ge => (">=", PREC_COMPARE, false),
        BinOp::Concat => ("||", PREC_CONCAT, true),
        BinOp::Add => ("+", PREC_ADD, true),
        BinOp::Sub => ("-", PREC_ADD, false),
        BinOp::Mul => ("*", PREC_MUL, true),
        BinOp::Div => ("/", PREC_MUL, false),
        BinOp::Mod => ("%", PREC_MUL, false),
    }
}

/// Join two operands with an infix operator, parenthesizing as needed
pub fn infix(left: &Emitted, symbol: &str, precedence: u8, associative: bool, right: &Emitted) -> Emitted {
    let right_min = if associative { precedence } else { precedence + 1 };
    Emitted::new(
        format!(
            "{} {} {}",
            left.at_least(precedence),
            symbol,
            right.at_least(right_min)
        ),
        precedence,
    )
}

fn emit_binary(expr: &Expr, state: &mut CompileState<'_>) -> Result<Emitted, CompileError> {
    let Expr::BinaryOp { op, left, right } = expr else {
        return Err(mismatch(expr));
    };
    let (symbol, precedence, associative) = binary_info(*op);
    let l = emit(left, state)?;
    let r = emit(right, state)?;
    Ok(infix(&l, symbol, precedence, associative, &r))
}

fn emit_unary(expr: &Expr, state: &mut CompileState<'_>) -> Result<Emitted, CompileError> {
    let Expr::UnaryOp { op, expr: inner } = expr else {
        return Err(mismatch(expr));
    };
    let e = emit(inner, state)?;
    Ok(match op {
        UnOp::Not => Emitted::new(format!("NOT {}", e.at_least(PREC_NOT)), PREC_NOT),
        UnOp::Neg => Emitted::new(format!("-{}", e.at_least(PREC_ATOM)), PREC_UNARY),
    })
}

fn emit_is_null(expr: &Expr, state: &mut CompileState<'_>) -> Result<Emitted, CompileError> {
    let Expr::IsNull { expr: inner, negated } = expr else {
        return Err(mismatch(expr));
    };
    let e = emit(inner, state)?;
    let suffix = if *negated { "IS NOT NULL" } else { "IS NULL" };
    Ok(Emitted::new(
        format!("{} {}", e.at_least(PREC_COMPARE + 1), suffix),
        PREC_COMPARE,
    ))
}

fn emit_like(expr: &Expr, state: &mut CompileState<'_>) -> Result<Emitted, CompileError> {
    let Expr::Like { expr: inner, pattern, negated } = expr else {
        return Err(mismatch(expr));
    };
    let e = emit(inner, state)?;
    let p = emit(pattern, state)?;
    let symbol = if *negated { "NOT LIKE" } else { "LIKE" };
    Ok(infix(&e, symbol, PREC_COMPARE, false, &p))
}

fn emit_in_list(expr: &Expr, state: &mut CompileState<'_>) -> Result<Emitted, CompileError> {
    let Expr::InList { expr: inner, list, negated } = expr else {
        return Err(mismatch(expr));
    };
    let e = emit(inner, state)?;
    let items = emit_list(list, state)?;
    let symbol = if *negated { "NOT IN" } else { "IN" };
    Ok(Emitted::new(
        format!("{} {} [{}]", e.at_least(PREC_COMPARE + 1), symbol, items.join(", ")),
        PREC_COMPARE,
    ))
}

fn emit_list(args: &[Expr], state: &mut CompileState<'_>) -> Result<Vec<String>, CompileError> {
    args.iter()
        .map(|a| emit(a, state).map(|e| e.text))
        .collect()
}

fn emit_aggregate(expr: &Expr, state: &mut CompileState<'_>) -> Result<Emitted, CompileError> {
    let Expr::Aggregate { func, distinct, arg } = expr else {
        return Err(mismatch(expr));
    };
    let inner = match arg {
        Some(arg) => emit(arg, state)?.text,
        None => "*".to_string(),
    };
    let distinct = if *distinct && arg.is_some() { "DISTINCT " } else { "" };
    Ok(Emitted::new(
        format!("{}({}{})", func.name(), distinct, inner),
        PREC_ATOM,
    ))
}

fn emit_function(expr: &Expr, state: &mut CompileState<'_>) -> Result<Emitted, CompileError> {
    let Expr::Function { name, args } = expr else {
        return Err(mismatch(expr));
    };
    let registry = state.registry;
    let Some(entry) = registry.lookup(name) else {
        let rendered = emit_list(args, state)?;
        return Ok(Emitted::new(
            format!("{}({})", name, rendered.join(", ")),
            PREC_ATOM,
        ));
    };
    entry.check_arity(args.len())?;

    match &entry.rewrite {
        Rewrite::Rename { native } => {
            let rendered = emit_list(args, state)?;
            Ok(Emitted::new(format!("{}({})", native, rendered.join(", ")), PREC_ATOM))
        }
        Rewrite::Infix { operator } => {
            let mut operands = args.iter();
            let first = match operands.next() {
                Some(a) => emit(a, state)?,
                None => return Err(invalid(name, "missing operands")),
            };
            operands.try_fold(first, |acc, a| {
                let next = emit(a, state)?;
                Ok(infix(&acc, operator, PREC_CONCAT, true, &next))
            })
        }
        Rewrite::ZeroBasedStart { native } => {
            let mut rendered = Vec::with_capacity(args.len());
            for (i, arg) in args.iter().enumerate() {
                let text = match (i, arg) {
                    (1, Expr::Literal { value: Literal::Int(n) }) => n
                        .checked_sub(1)
                        .ok_or_else(|| invalid(name, "start position out of range"))?
                        .to_string(),
                    (1, other) => {
                        let e = emit(other, state)?;
                        format!("{} - 1", e.at_least(PREC_ADD))
                    }
                    (_, other) => emit(other, state)?.text,
                };
                rendered.push(text);
            }
            Ok(Emitted::new(format!("{}({})", native, rendered.join(", ")), PREC_ATOM))
        }
        Rewrite::Constant { text } => Ok(Emitted::new(text.as_str(), PREC_ATOM)),
        Rewrite::DatePart { part } => {
            let rendered = emit_list(args, state)?;
            Ok(Emitted::new(
                format!("DATE_PART_STR({}, {})", rendered.join(", "), quote_string(part)),
                PREC_ATOM,
            ))
        }
        Rewrite::Convert => {
            let target = match args.get(1) {
                Some(Expr::Literal { value: Literal::String(t) }) => t.as_str(),
                Some(Expr::Column { col }) if col.table.is_none() => col.column.as_str(),
                _ => return Err(invalid(name, "target type must be a type name")),
            };
            let native = conversion_function(target)?;
            let value = match args.first() {
                Some(a) => emit(a, state)?.text,
                None => return Err(invalid(name, "missing value")),
            };
            Ok(Emitted::new(format!("{}({})", native, value), PREC_ATOM))
        }
        Rewrite::MetaId => match args.first() {
            Some(Expr::Literal { value: Literal::String(keyspace) }) => Ok(Emitted::new(
                format!("META({}).id", quote_identifier(keyspace)),
                PREC_ATOM,
            )),
            _ => Err(invalid(name, "keyspace must be a string literal")),
        },
    }
}

fn mismatch(expr: &Expr) -> CompileError {
    CompileError::Unsupported(format!("emitter mismatch for {:?}", ExprKind::of(expr)))
}

fn unresolved(table: &str, column: &str) -> CompileError {
    CompileError::UnresolvedSource {
        table: table.to_string(),
        column: column.to_string(),
    }
}

fn invalid(function: &str, message: &str) -> CompileError {
    CompileError::InvalidArgument {
        function: function.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docql_registry::FunctionRegistry;

    fn emit_text(expr: &Expr) -> String {
        let dispatch = DispatchTable::standard();
        let registry = FunctionRegistry::default();
        let mut state = CompileState::new(&dispatch, &registry);
        emit(expr, &mut state).unwrap().text
    }

    #[test]
    fn test_literals() {
        assert_eq!(emit_text(&Expr::lit("O'Brien")), "'O''Brien'");
        assert_eq!(emit_text(&Expr::lit(true)), "TRUE");
        assert_eq!(emit_text(&Expr::Literal { value: Literal::Null }), "NULL");
        assert_eq!(emit_text(&Expr::lit(1.5)), "1.5");
    }

    #[test]
    fn test_precedence_parenthesizes() {
        let or = Expr::binary(BinOp::Or, Expr::lit(1i64), Expr::lit(2i64));
        let and = Expr::and(or, Expr::lit(3i64));
        assert_eq!(emit_text(&and), "(1 OR 2) AND 3");

        let sub = Expr::binary(
            BinOp::Sub,
            Expr::lit(1i64),
            Expr::binary(BinOp::Sub, Expr::lit(2i64), Expr::lit(3i64)),
        );
        assert_eq!(emit_text(&sub), "1 - (2 - 3)");

        let mul = Expr::binary(
            BinOp::Mul,
            Expr::binary(BinOp::Add, Expr::lit(1i64), Expr::lit(2i64)),
            Expr::lit(3i64),
        );
        assert_eq!(emit_text(&mul), "(1 + 2) * 3");
    }

    #[test]
    fn test_function_rewrites() {
        assert_eq!(emit_text(&Expr::func("lcase", vec![Expr::lit("A")])), "LOWER('A')");
        assert_eq!(
            emit_text(&Expr::func("substring", vec![Expr::lit("abc"), Expr::lit(2i64), Expr::lit(1i64)])),
            "SUBSTR('abc', 1, 1)"
        );
        assert_eq!(
            emit_text(&Expr::func("concat", vec![Expr::lit("a"), Expr::lit("b"), Expr::lit("c")])),
            "'a' || 'b' || 'c'"
        );
        assert_eq!(
            emit_text(&Expr::func("curdate", vec![])),
            "CLOCK_STR('2006-01-02')"
        );
        assert_eq!(
            emit_text(&Expr::func("year", vec![Expr::lit("2017-03-08")])),
            "DATE_PART_STR('2017-03-08', 'year')"
        );
        assert_eq!(
            emit_text(&Expr::func("convert", vec![Expr::lit(5i64), Expr::lit("string")])),
            "TOSTRING(5)"
        );
        assert_eq!(
            emit_text(&Expr::func("metaid", vec![Expr::lit("test")])),
            "META(`test`).id"
        );
        assert_eq!(
            emit_text(&Expr::func("TITLE", vec![Expr::lit("x")])),
            "TITLE('x')"
        );
    }

    #[test]
    fn test_predicates() {
        let like = Expr::Like {
            expr: Box::new(Expr::lit("abc")),
            pattern: Box::new(Expr::lit("a%")),
            negated: true,
        };
        assert_eq!(emit_text(&like), "'abc' NOT LIKE 'a%'");

        let in_list = Expr::InList {
            expr: Box::new(Expr::lit(1i64)),
            list: vec![Expr::lit(1i64), Expr::lit(2i64)],
            negated: false,
        };
        assert_eq!(emit_text(&in_list), "1 IN [1, 2]");

        let not = Expr::UnaryOp {
            op: UnOp::Not,
            expr: Box::new(Expr::eq(Expr::lit(1i64), Expr::lit(2i64))),
        };
        assert_eq!(emit_text(&not), "NOT 1 = 2");
    }

    #[test]
    fn test_substring_start_out_of_range() {
        let dispatch = DispatchTable::standard();
        let registry = FunctionRegistry::default();
        let mut state = CompileState::new(&dispatch, &registry);
        let expr = Expr::func("substring", vec![Expr::lit("abc"), Expr::lit(i64::MIN)]);
        let err = emit(&expr, &mut state).unwrap_err();
        assert!(matches!(err, CompileError::InvalidArgument { function, .. } if function == "substring"));
    }

    #[test]
    fn test_arity_checked() {
        let dispatch = DispatchTable::standard();
        let registry = FunctionRegistry::default();
        let mut state = CompileState::new(&dispatch, &registry);
        let err = emit(&Expr::func("lcase", vec![]), &mut state).unwrap_err();
        assert!(matches!(err, CompileError::Registry(_)));
    }
}
