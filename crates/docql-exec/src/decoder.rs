//! Native result rows to flat relational rows
//!
//! A query without an array table yields one row per native row. A query over
//! an array table projects the outermost array once; each native row then
//! expands into one row per element of the table's own array level, reached
//! by unwinding the remaining path steps.

use std::collections::VecDeque;

use docql_ir::{DataType, DocObject, DocValue, Segment};
use docql_n1ql::{ArrayProjection, ColumnKind, CompiledQuery, SelectColumn};
use tracing::trace;

use crate::coerce::coerce;
use crate::{DecodeError, Row};

/// Name the store gives the `n`th (1-based) unaliased projection
pub fn placeholder(n: usize) -> String {
    format!("${}", n)
}

/// Position reached while unwinding one native row: arrays entered so far
/// and path steps consumed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dimension {
    pub depth: usize,
    pub consumed: usize,
}

impl Dimension {
    fn step(self, segment: &Segment) -> Self {
        Self {
            depth: self.depth + usize::from(matches!(segment, Segment::Array)),
            consumed: self.consumed + 1,
        }
    }
}

/// Decode one native row into zero or more flat rows.
pub fn decode_fragment(
    fragment: &DocObject,
    query: &CompiledQuery,
    types: &[DataType],
) -> Result<Vec<Row>, DecodeError> {
    if types.len() != query.columns.len() {
        return Err(DecodeError::TypeCount {
            expected: query.columns.len(),
            actual: types.len(),
        });
    }

    // Natively projected positions are shared by every expanded row
    let mut base = Vec::with_capacity(query.columns.len());
    let mut unaliased = 0;
    for (column, &ty) in query.columns.iter().zip(types) {
        let slot = if column.reference.is_none() {
            unaliased += 1;
            Some(unaliased)
        } else {
            None
        };
        let value = match column.kind {
            ColumnKind::Identity | ColumnKind::Scalar => {
                let native = lookup(fragment, column, slot).cloned().unwrap_or(DocValue::Null);
                Some(coerce(native, ty, display_name(column))?)
            }
            _ => None,
        };
        base.push(value);
    }

    let Some(projection) = &query.array else {
        return Ok(vec![base.into_iter().map(|v| v.unwrap_or(DocValue::Null)).collect()]);
    };

    let Some(array) = locate_array(fragment, query, projection) else {
        return Ok(Vec::new());
    };

    let mut path = Vec::with_capacity(projection.steps.len() + 1);
    path.push(Segment::Array);
    path.extend(projection.steps.iter().cloned());

    let mut leaves = Vec::new();
    unwind(array, &path, Dimension::default(), &projection.table, &mut leaves)?;
    trace!(table = %projection.table, elements = leaves.len(), "Unwound array");

    let mut rows = Vec::with_capacity(leaves.len());
    for (index, element) in leaves {
        let mut row = Vec::with_capacity(query.columns.len());
        for ((column, &ty), native) in query.columns.iter().zip(types).zip(&base) {
            let value = match (&column.kind, native) {
                (_, Some(value)) => value.clone(),
                (ColumnKind::Index, None) => {
                    coerce(DocValue::Int64(index as i64), ty, display_name(column))?
                }
                (ColumnKind::Element { leaf }, None) => element_value(element, leaf, column, ty)?,
                (_, None) => DocValue::Null,
            };
            row.push(value);
        }
        rows.push(row);
    }
    Ok(rows)
}

fn display_name(column: &SelectColumn) -> &str {
    column.reference.as_deref().unwrap_or(&column.alias)
}

// By generated alias, then by user-facing name. A column without one is
// also looked up under the store's numbered placeholder for its position
// among the unaliased columns.
fn lookup<'f>(
    fragment: &'f DocObject,
    column: &SelectColumn,
    slot: Option<usize>,
) -> Option<&'f DocValue> {
    fragment
        .get(&column.alias)
        .or_else(|| column.reference.as_deref().and_then(|r| fragment.get(r)))
        .or_else(|| slot.and_then(|n| fragment.get(&placeholder(n))))
}

// The projected array, by generated alias first and then by the user-facing
// names of the array columns. Absent and null both mean no elements.
fn locate_array<'f>(
    fragment: &'f DocObject,
    query: &CompiledQuery,
    projection: &ArrayProjection,
) -> Option<&'f DocValue> {
    fragment
        .get(&projection.alias)
        .or_else(|| {
            query
                .columns
                .iter()
                .filter(|c| c.kind.is_array())
                .filter_map(|c| c.reference.as_deref())
                .find_map(|r| fragment.get(r))
        })
        .filter(|v| !v.is_null())
}

fn unwind<'v>(
    value: &'v DocValue,
    path: &[Segment],
    dim: Dimension,
    table: &str,
    out: &mut Vec<(usize, &'v DocValue)>,
) -> Result<(), DecodeError> {
    let Some(segment) = path.get(dim.consumed) else {
        out.push((0, value));
        return Ok(());
    };
    let next = dim.step(segment);
    let at_leaf_level = next.consumed == path.len();

    match (segment, value) {
        (_, DocValue::Null) => Ok(()),
        (Segment::Key(key), DocValue::Object(obj)) => match obj.get(key) {
            Some(child) => unwind(child, path, next, table, out),
            None => Ok(()),
        },
        (Segment::Array, DocValue::Array(items)) if at_leaf_level => {
            out.extend(items.iter().enumerate());
            Ok(())
        }
        (Segment::Array, DocValue::Array(items)) => {
            for item in items {
                unwind(item, path, next, table, out)?;
            }
            Ok(())
        }
        (Segment::Key(_), other) => Err(shape(table, dim, "object", other)),
        (Segment::Array, other) => Err(shape(table, dim, "array", other)),
    }
}

fn shape(table: &str, dim: Dimension, expected: &str, found: &DocValue) -> DecodeError {
    DecodeError::ShapeMismatch {
        column: format!("{} (dimension {})", table, dim.depth + 1),
        expected: expected.to_string(),
        found: found.kind_name().to_string(),
    }
}

fn element_value(
    element: &DocValue,
    leaf: &[String],
    column: &SelectColumn,
    ty: DataType,
) -> Result<DocValue, DecodeError> {
    let name = display_name(column);
    if leaf.is_empty() {
        let structured = matches!(element, DocValue::Object(_) | DocValue::Array(_));
        if structured && ty != DataType::Object {
            return Err(DecodeError::ShapeMismatch {
                column: name.to_string(),
                expected: ty.to_string(),
                found: element.kind_name().to_string(),
            });
        }
        return coerce(element.clone(), ty, name);
    }

    let mut current = element;
    for key in leaf {
        current = match current {
            DocValue::Object(obj) => match obj.get(key) {
                Some(child) => child,
                None => return Ok(DocValue::Null),
            },
            DocValue::Null => return Ok(DocValue::Null),
            other => {
                return Err(DecodeError::ShapeMismatch {
                    column: name.to_string(),
                    expected: "object".to_string(),
                    found: other.kind_name().to_string(),
                })
            }
        };
    }
    coerce(current.clone(), ty, name)
}

/// Lazy cursor of flat rows over a stream of native rows.
///
/// The query's post-expansion window, if any, is applied here. A decoding
/// failure is yielded once and ends the cursor.
pub struct ResultDecoder<I> {
    source: I,
    query: CompiledQuery,
    types: Vec<DataType>,
    pending: VecDeque<Row>,
    skip: u64,
    remaining: Option<u64>,
    done: bool,
}

impl<I: Iterator<Item = DocObject>> ResultDecoder<I> {
    /// Decoder producing the query's own output types
    pub fn new(source: impl IntoIterator<IntoIter = I>, query: CompiledQuery) -> Self {
        let types = query.output_types();
        let (skip, remaining) = match query.window {
            Some(window) => (window.offset, window.count),
            None => (0, None),
        };
        Self {
            source: source.into_iter(),
            query,
            types,
            pending: VecDeque::new(),
            skip,
            remaining,
            done: false,
        }
    }

    /// Override the expected output types, one per select column
    pub fn with_types(mut self, types: Vec<DataType>) -> Result<Self, DecodeError> {
        if types.len() != self.query.columns.len() {
            return Err(DecodeError::TypeCount {
                expected: self.query.columns.len(),
                actual: types.len(),
            });
        }
        self.types = types;
        Ok(self)
    }

    pub fn query(&self) -> &CompiledQuery {
        &self.query
    }
}

impl<I: Iterator<Item = DocObject>> Iterator for ResultDecoder<I> {
    type Item = Result<Row, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done || self.remaining == Some(0) {
                self.done = true;
                return None;
            }
            if let Some(row) = self.pending.pop_front() {
                if self.skip > 0 {
                    self.skip -= 1;
                    continue;
                }
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
                return Some(Ok(row));
            }
            let Some(fragment) = self.source.next() else {
                self.done = true;
                return None;
            };
            match decode_fragment(&fragment, &self.query, &self.types) {
                Ok(rows) => self.pending.extend(rows),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
