//! HTTP routes
//!
//! Stateless translation endpoints over the loaded schema. The server never
//! talks to the document store: callers run the compiled N1QL themselves and
//! post the native rows back to `/decode`.

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use docql_exec::{DecodeError, ResultDecoder, Row};
use docql_ir::{Command, DataType, DocObject, Limit, Procedure, Schema};
use docql_n1ql::{
    ArrayProjection, CompileError, Compiled, CompiledQuery, Compiler, CompilerOptions, SelectColumn,
};
use docql_registry::FunctionRegistry;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub struct AppState {
    pub schema: Schema,
    pub registry: FunctionRegistry,
    pub options: CompilerOptions,
}

impl AppState {
    pub fn new(schema: Schema, options: CompilerOptions) -> Self {
        Self {
            schema,
            registry: FunctionRegistry::default(),
            options,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Compile(CompileError::UnknownTable(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        warn!(status = status.as_u16(), error = %self, "Request failed");
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct CompileRequest {
    pub command: Command,
}

#[derive(Debug, Serialize)]
pub struct CompileResponse {
    pub n1ql: String,
    pub select_columns: Vec<String>,
    pub select_column_references: Vec<Option<String>>,
    pub columns: Vec<SelectColumn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array: Option<ArrayProjection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<Limit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub procedure: Option<Procedure>,
}

impl From<Compiled> for CompileResponse {
    fn from(compiled: Compiled) -> Self {
        match compiled {
            Compiled::Query(query) => Self {
                select_columns: query.select_columns().into_iter().map(str::to_string).collect(),
                select_column_references: query
                    .select_column_references()
                    .into_iter()
                    .map(|r| r.map(str::to_string))
                    .collect(),
                n1ql: query.n1ql,
                columns: query.columns,
                array: query.array,
                window: query.window,
                procedure: None,
            },
            Compiled::Procedure(procedure) => Self {
                n1ql: procedure.n1ql,
                select_columns: Vec::new(),
                select_column_references: Vec::new(),
                columns: Vec::new(),
                array: None,
                window: None,
                procedure: Some(procedure.procedure),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DecodeRequest {
    /// The query half of a compile response
    pub compiled: CompiledQuery,
    #[serde(default)]
    pub expected_types: Option<Vec<DataType>>,
    pub rows: Vec<DocObject>,
}

#[derive(Debug, Serialize)]
pub struct DecodeResponse {
    pub rows: Vec<Row>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/schema", get(schema_handler))
        .route("/compile", post(compile_handler))
        .route("/decode", post(decode_handler))
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn schema_handler(State(state): State<Arc<AppState>>) -> Json<Schema> {
    Json(state.schema.clone())
}

async fn compile_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CompileRequest>,
) -> Result<Json<CompileResponse>, ApiError> {
    let compiled = Compiler::new(&state.schema, &state.registry)
        .with_options(state.options)
        .compile(&request.command)?;
    debug!(n1ql = %compiled.n1ql(), "Compiled command");
    Ok(Json(compiled.into()))
}

async fn decode_handler(Json(request): Json<DecodeRequest>) -> Result<Json<DecodeResponse>, ApiError> {
    let fragments = request.rows.len();
    let mut decoder = ResultDecoder::new(request.rows, request.compiled);
    if let Some(types) = request.expected_types {
        decoder = decoder.with_types(types)?;
    }
    let rows = decoder.collect::<Result<Vec<Row>, DecodeError>>()?;
    debug!(fragments, rows = rows.len(), "Decoded rows");
    Ok(Json(DecodeResponse { rows }))
}
