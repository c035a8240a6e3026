//! DocQL Intermediate Representation (IR)
//!
//! Shared vocabulary of the translator: the document value tree, the relational
//! schema discovered from it, and the relational query plan handed to the
//! compiler. Every type is serde-serializable so plans and schemas can cross
//! process boundaries as JSON.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod path;
pub mod schema;
pub mod store;
mod types;
pub mod value;

pub use path::{quote_identifier, unquote_identifier, Segment, SourcePath};
pub use schema::{
    Column, ColumnRole, Discriminator, ForeignKey, LogicalTable, PrimaryKey, Schema,
    SchemaProvider, DOCUMENT_ID, INDEX_SUFFIX,
};
pub use store::{DocumentStore, StoreError};
#[cfg(any(test, feature = "mock"))]
pub use store::MockStore;
pub use types::*;
pub use value::{DocObject, DocValue};

/// Top-level relational command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Select(Select),
    Call(Call),
}

impl Command {
    /// Calculate fingerprint (SHA-256) for caching compiled text
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl From<Select> for Command {
    fn from(select: Select) -> Self {
        Command::Select(select)
    }
}

impl From<Call> for Command {
    fn from(call: Call) -> Self {
        Command::Call(call)
    }
}

/// A validated query over the discovered schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Select {
    #[serde(default)]
    pub distinct: bool,

    pub columns: Vec<DerivedColumn>,

    pub from: Vec<TableRef>,

    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Expr>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<Expr>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub having: Option<Expr>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<SortKey>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<Limit>,
}

impl Select {
    pub fn from_table(name: impl Into<String>) -> Self {
        Self {
            distinct: false,
            columns: Vec::new(),
            from: vec![TableRef { name: name.into() }],
            filter: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// `SELECT *` expanded over every column of `table`, in schema order
    pub fn star(table: &LogicalTable) -> Self {
        let mut select = Self::from_table(table.name.clone());
        select.columns = table
            .columns
            .iter()
            .map(|c| DerivedColumn {
                expr: Expr::col(Some(&table.name), &c.name),
                alias: None,
            })
            .collect();
        select
    }

    pub fn column(mut self, expr: Expr) -> Self {
        self.columns.push(DerivedColumn { expr, alias: None });
        self
    }

    pub fn column_as(mut self, expr: Expr, alias: impl Into<String>) -> Self {
        self.columns.push(DerivedColumn {
            expr,
            alias: Some(alias.into()),
        });
        self
    }

    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(expr);
        self
    }

    pub fn order_by(mut self, key: SortKey) -> Self {
        self.order_by.push(key);
        self
    }

    /// `LIMIT offset, count`
    pub fn limit(mut self, offset: u64, count: u64) -> Self {
        self.limit = Some(Limit {
            offset,
            count: Some(count),
        });
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedColumn {
    pub expr: Expr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub expr: Expr,
    #[serde(default)]
    pub desc: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nulls: Option<NullOrdering>,
}

impl SortKey {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            desc: false,
            nulls: None,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            desc: true,
            nulls: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullOrdering {
    First,
    Last,
}

/// Row window; `count: None` means offset only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value")]
pub struct Limit {
    #[serde(default)]
    pub offset: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

// Numbers buffered inside tagged enums only deserialize reliably through
// `serde_json::Value` once `arbitrary_precision` is enabled.
#[derive(Deserialize)]
struct LimitFields {
    #[serde(default)]
    offset: u64,
    #[serde(default)]
    count: Option<u64>,
}

impl TryFrom<serde_json::Value> for Limit {
    type Error = serde_json::Error;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        let fields: LimitFields = serde_json::from_value(value)?;
        Ok(Self {
            offset: fields.offset,
            count: fields.count,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub column: String,
}

/// Expression types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Expr {
    Literal {
        value: Literal,
    },
    Column {
        col: ColumnRef,
    },
    BinaryOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnOp,
        expr: Box<Expr>,
    },
    Function {
        name: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
    /// `arg: None` is `COUNT(*)`
    Aggregate {
        func: AggFunc,
        #[serde(default)]
        distinct: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arg: Option<Box<Expr>>,
    },
    IsNull {
        expr: Box<Expr>,
        #[serde(default)]
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        #[serde(default)]
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        #[serde(default)]
        negated: bool,
    },
}

impl Expr {
    pub fn col(table: Option<&str>, column: &str) -> Self {
        Expr::Column {
            col: ColumnRef {
                table: table.map(str::to_string),
                column: column.to_string(),
            },
        }
    }

    pub fn lit(value: impl Into<Literal>) -> Self {
        Expr::Literal {
            value: value.into(),
        }
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::binary(BinOp::Eq, left, right)
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::binary(BinOp::And, left, right)
    }

    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            args,
        }
    }

    pub fn agg(func: AggFunc, arg: Option<Expr>) -> Self {
        Expr::Aggregate {
            func,
            distinct: false,
            arg: arg.map(Box::new),
        }
    }

    /// Walk the expression tree depth-first, parents before children
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::Literal { .. } | Expr::Column { .. } => {}
            Expr::BinaryOp { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            Expr::UnaryOp { expr, .. } | Expr::IsNull { expr, .. } => expr.visit(f),
            Expr::Function { args, .. } => args.iter().for_each(|a| a.visit(f)),
            Expr::Aggregate { arg, .. } => {
                if let Some(arg) = arg {
                    arg.visit(f);
                }
            }
            Expr::Like { expr, pattern, .. } => {
                expr.visit(f);
                pattern.visit(f);
            }
            Expr::InList { expr, list, .. } => {
                expr.visit(f);
                list.iter().for_each(|a| a.visit(f));
            }
        }
    }

    /// Column references anywhere in this expression
    pub fn column_refs(&self) -> Vec<&ColumnRef> {
        let mut refs = Vec::new();
        self.visit(&mut |e| {
            if let Expr::Column { col } = e {
                refs.push(col);
            }
        });
        refs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    // Arithmetic
    Add, Sub, Mul, Div, Mod,
    // String
    Concat,
    // Comparison
    Eq, Ne, Lt, Le, Gt, Ge,
    // Logical
    And, Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggFunc {
    pub fn name(&self) -> &'static str {
        match self {
            AggFunc::Count => "COUNT",
            AggFunc::Sum => "SUM",
            AggFunc::Avg => "AVG",
            AggFunc::Min => "MIN",
            AggFunc::Max => "MAX",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

// Read through `serde_json::Value` so numbers survive buffering inside the
// internally tagged `Expr`.
impl<'de> Deserialize<'de> for Literal {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Literal::try_from(value).map_err(serde::de::Error::custom)
    }
}

impl TryFrom<serde_json::Value> for Literal {
    type Error = String;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Null => Ok(Literal::Null),
            serde_json::Value::Bool(b) => Ok(Literal::Bool(b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Literal::Int(i)),
                None => n
                    .as_f64()
                    .filter(|f| f.is_finite())
                    .map(Literal::Float)
                    .ok_or_else(|| format!("numeric literal {} is out of range", n)),
            },
            serde_json::Value::String(s) => Ok(Literal::String(s)),
            other => Err(format!("literal must be a scalar, got {}", other)),
        }
    }
}

impl Literal {
    pub fn data_type(&self) -> DataType {
        match self {
            Literal::Null => DataType::Null,
            Literal::Bool(_) => DataType::Boolean,
            Literal::Int(i) if i32::try_from(*i).is_ok() => DataType::Integer,
            Literal::Int(_) => DataType::Long,
            Literal::Float(_) => DataType::Double,
            Literal::String(_) => DataType::String,
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::String(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::String(s)
    }
}

impl From<i32> for Literal {
    fn from(i: i32) -> Self {
        Literal::Int(i64::from(i))
    }
}

impl From<i64> for Literal {
    fn from(i: i64) -> Self {
        Literal::Int(i)
    }
}

impl From<f64> for Literal {
    fn from(f: f64) -> Self {
        Literal::Float(f)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Bool(b)
    }
}

/// Fixed raw-document procedures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Procedure {
    GetTextDocuments,
    GetDocuments,
    GetTextDocument,
    GetDocument,
    SaveDocument,
    DeleteDocument,
    GetTextMetadataDocument,
    GetMetadataDocument,
}

impl Procedure {
    pub const ALL: [Procedure; 8] = [
        Procedure::GetTextDocuments,
        Procedure::GetDocuments,
        Procedure::GetTextDocument,
        Procedure::GetDocument,
        Procedure::SaveDocument,
        Procedure::DeleteDocument,
        Procedure::GetTextMetadataDocument,
        Procedure::GetMetadataDocument,
    ];

    /// Text variants return `(id, JSON text)`; the rest return JSON bytes
    pub fn returns_text(&self) -> bool {
        matches!(
            self,
            Procedure::GetTextDocuments
                | Procedure::GetTextDocument
                | Procedure::GetTextMetadataDocument
                | Procedure::SaveDocument
                | Procedure::DeleteDocument
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Procedure::GetTextDocuments => "GetTextDocuments",
            Procedure::GetDocuments => "GetDocuments",
            Procedure::GetTextDocument => "GetTextDocument",
            Procedure::GetDocument => "GetDocument",
            Procedure::SaveDocument => "SaveDocument",
            Procedure::DeleteDocument => "DeleteDocument",
            Procedure::GetTextMetadataDocument => "GetTextMetadataDocument",
            Procedure::GetMetadataDocument => "GetMetadataDocument",
        }
    }
}

/// A named, typed procedure parameter or result column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureField {
    pub name: String,
    pub data_type: DataType,
}

impl ProcedureField {
    fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
        }
    }
}

/// Calling contract of a procedure, as published with the schema.
///
/// Binary variants return the document as JSON bytes; their `result`
/// column is typed `Object`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureDescriptor {
    pub procedure: Procedure,
    pub parameters: Vec<ProcedureField>,
    pub result_columns: Vec<ProcedureField>,
    pub returns_text: bool,
}

impl Procedure {
    pub fn descriptor(&self) -> ProcedureDescriptor {
        let mut parameters = vec![ProcedureField::new("keyspace", DataType::String)];
        if !matches!(
            self,
            Procedure::GetTextMetadataDocument | Procedure::GetMetadataDocument
        ) {
            parameters.push(ProcedureField::new("id", DataType::String));
        }
        if *self == Procedure::SaveDocument {
            parameters.push(ProcedureField::new("document", DataType::Object));
        }

        let mut result_columns = Vec::new();
        if matches!(self, Procedure::GetTextDocuments | Procedure::GetTextDocument) {
            result_columns.push(ProcedureField::new("id", DataType::String));
        }
        let body = if self.returns_text() {
            DataType::String
        } else {
            DataType::Object
        };
        result_columns.push(ProcedureField::new("result", body));

        ProcedureDescriptor {
            procedure: *self,
            parameters,
            result_columns,
            returns_text: self.returns_text(),
        }
    }
}

/// Procedure invocation; `id` is the document key or, for the plural
/// fetches, a `LIKE` pattern over keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub procedure: Procedure,
    pub keyspace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<DocValue>,
}

impl Call {
    pub fn new(procedure: Procedure, keyspace: impl Into<String>) -> Self {
        Self {
            procedure,
            keyspace: keyspace.into(),
            id: None,
            document: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_document(mut self, document: impl Into<DocValue>) -> Self {
        self.document = Some(document.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_deterministic() {
        let command1 = Command::Select(Select::from_table("Customer").column(Expr::col(None, "Name")));
        let command2 = command1.clone();

        assert_eq!(command1.fingerprint(), command2.fingerprint());
    }

    #[test]
    fn test_json_round_trip() {
        let select = Select::from_table("Customer")
            .column_as(Expr::col(Some("Customer"), "Name"), "name")
            .filter(Expr::eq(Expr::col(None, "Age"), Expr::lit(30i64)))
            .order_by(SortKey::desc(Expr::col(None, "Name")))
            .limit(2, 2);
        let command = Command::Select(select);

        let json = serde_json::to_string(&command).unwrap();
        assert!(json.contains("\"command\":\"select\""));
        assert!(json.contains("\"where\""));

        let parsed: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, command);
        assert_eq!(command.fingerprint(), parsed.fingerprint());
    }

    #[test]
    fn test_call_from_json() {
        let json = r#"{
            "command": "call",
            "procedure": "SaveDocument",
            "keyspace": "test",
            "id": "k1",
            "document": {"a": 1}
        }"#;
        let parsed: Command = serde_json::from_str(json).unwrap();
        let Command::Call(call) = parsed else {
            panic!("expected call");
        };
        assert_eq!(call.procedure, Procedure::SaveDocument);
        assert_eq!(call.id.as_deref(), Some("k1"));
        assert!(call.document.unwrap().as_object().is_some());
    }

    #[test]
    fn test_star_expands_schema_order() {
        let mut table = LogicalTable::top("Customer", "test");
        table.columns.push(Column::value(
            "Name",
            SourcePath::root("test").key("Name"),
            DataType::String,
        ));
        let select = Select::star(&table);
        let names: Vec<_> = select
            .columns
            .iter()
            .flat_map(|c| c.expr.column_refs())
            .map(|c| c.column.as_str())
            .collect();
        assert_eq!(names, vec![DOCUMENT_ID, "Name"]);
    }

    #[test]
    fn test_numbers_inside_tagged_enums() {
        let json = r#"{
            "command": "select",
            "columns": [{"expr": {"type": "Literal", "value": 1.25}}],
            "from": [{"name": "test"}],
            "where": {"type": "BinaryOp", "op": "Gt",
                      "left": {"type": "Column", "col": {"column": "Age"}},
                      "right": {"type": "Literal", "value": -3}},
            "limit": {"offset": 2, "count": 5}
        }"#;
        let Command::Select(select) = serde_json::from_str::<Command>(json).unwrap() else {
            panic!("expected select");
        };
        assert_eq!(select.columns[0].expr, Expr::lit(1.25));
        assert_eq!(
            select.limit,
            Some(Limit {
                offset: 2,
                count: Some(5)
            })
        );
        let Some(Expr::BinaryOp { right, .. }) = select.filter else {
            panic!("expected comparison");
        };
        assert_eq!(*right, Expr::lit(-3i64));
    }

    #[test]
    fn test_procedure_descriptors() {
        let save = Procedure::SaveDocument.descriptor();
        let names: Vec<_> = save.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["keyspace", "id", "document"]);
        assert!(save.returns_text);

        let fetch = Procedure::GetDocument.descriptor();
        assert_eq!(fetch.result_columns.len(), 1);
        assert_eq!(fetch.result_columns[0].data_type, DataType::Object);

        let text = Procedure::GetTextDocuments.descriptor();
        assert_eq!(text.result_columns[0].name, "id");

        let metadata = Procedure::GetMetadataDocument.descriptor();
        assert_eq!(metadata.parameters.len(), 1);
    }

    #[test]
    fn test_literal_types() {
        assert_eq!(Literal::Int(5).data_type(), DataType::Integer);
        assert_eq!(Literal::Int(i64::MAX).data_type(), DataType::Long);
        assert_eq!(
            serde_json::from_str::<Literal>("null").unwrap(),
            Literal::Null
        );
    }
}
