//! Fixed raw-document procedures

use docql_ir::{quote_identifier, Call, Procedure};

use crate::dispatch::quote_string;
use crate::metadata::CompiledProcedure;
use crate::CompileError;

/// Alias of the document body in procedure results
pub const RESULT: &str = "result";
/// Alias of the document key in procedure results
pub const ID: &str = "id";

pub fn compile_call(call: &Call) -> Result<CompiledProcedure, CompileError> {
    let keyspace = quote_identifier(&call.keyspace);
    let n1ql = match call.procedure {
        Procedure::GetTextDocuments => format!(
            "SELECT META().id AS {ID}, {RESULT} FROM {keyspace} AS {RESULT} WHERE META().id LIKE {}",
            quote_string(required_id(call)?)
        ),
        Procedure::GetDocuments => format!(
            "SELECT {RESULT} FROM {keyspace} AS {RESULT} WHERE META().id LIKE {}",
            quote_string(required_id(call)?)
        ),
        Procedure::GetTextDocument => format!(
            "SELECT META().id AS {ID}, {RESULT} FROM {keyspace} AS {RESULT} USE PRIMARY KEYS {}",
            quote_string(required_id(call)?)
        ),
        Procedure::GetDocument => format!(
            "SELECT {RESULT} FROM {keyspace} AS {RESULT} USE PRIMARY KEYS {}",
            quote_string(required_id(call)?)
        ),
        Procedure::SaveDocument => {
            let id = quote_string(required_id(call)?);
            let document = call.document.as_ref().ok_or_else(|| CompileError::InvalidArgument {
                function: call.procedure.name().to_string(),
                message: "missing document".to_string(),
            })?;
            if document.as_object().is_none() {
                return Err(CompileError::InvalidArgument {
                    function: call.procedure.name().to_string(),
                    message: format!("document must be an object, got {}", document.kind_name()),
                });
            }
            format!(
                "UPSERT INTO {keyspace} (KEY, VALUE) VALUES ({id}, {}) RETURNING META().id AS {ID}",
                document
            )
        }
        Procedure::DeleteDocument => format!(
            "DELETE FROM {keyspace} USE PRIMARY KEYS {} RETURNING META().id AS {ID}",
            quote_string(required_id(call)?)
        ),
        Procedure::GetTextMetadataDocument | Procedure::GetMetadataDocument => {
            format!("SELECT META({keyspace}) AS {RESULT} FROM {keyspace}")
        }
    };
    Ok(CompiledProcedure {
        procedure: call.procedure,
        n1ql,
    })
}

fn required_id(call: &Call) -> Result<&str, CompileError> {
    call.id.as_deref().ok_or_else(|| CompileError::InvalidArgument {
        function: call.procedure.name().to_string(),
        message: "missing document id".to_string(),
    })
}
