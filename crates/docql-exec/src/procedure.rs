//! Result shaping for the raw-document procedures

use docql_ir::{DocObject, DocValue, Procedure};
use docql_n1ql::procedures::{ID, RESULT};
use serde::Serialize;

use crate::DecodeError;

/// One document returned by a procedure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum ProcedureResult {
    Text { id: Option<String>, json: String },
    Binary { bytes: Vec<u8> },
}

impl ProcedureResult {
    pub fn json(&self) -> &[u8] {
        match self {
            ProcedureResult::Text { json, .. } => json.as_bytes(),
            ProcedureResult::Binary { bytes } => bytes,
        }
    }
}

/// Shape one native row of a procedure's result
pub fn decode_procedure(procedure: Procedure, row: &DocObject) -> Result<ProcedureResult, DecodeError> {
    let id = match row.get(ID) {
        None | Some(DocValue::Null) => None,
        Some(DocValue::Text(id)) => Some(id.clone()),
        Some(other) => {
            return Err(DecodeError::ShapeMismatch {
                column: ID.to_string(),
                expected: "text".to_string(),
                found: other.kind_name().to_string(),
            })
        }
    };

    let body = match procedure {
        // Mutations hand back the returned row itself
        Procedure::SaveDocument | Procedure::DeleteDocument => DocValue::Object(row.clone()),
        _ => row.get(RESULT).cloned().unwrap_or(DocValue::Null),
    };
    let json = body.to_string();

    Ok(if procedure.returns_text() {
        ProcedureResult::Text { id, json }
    } else {
        ProcedureResult::Binary {
            bytes: json.into_bytes(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> DocObject {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_text_fetch() {
        let result = decode_procedure(
            Procedure::GetTextDocument,
            &row(json!({"id": "customer", "result": {"Name": "Ann", "Age": 3}})),
        )
        .unwrap();
        assert_eq!(
            result,
            ProcedureResult::Text {
                id: Some("customer".to_string()),
                json: r#"{"Name":"Ann","Age":3}"#.to_string(),
            }
        );
    }

    #[test]
    fn test_binary_fetch() {
        let result = decode_procedure(Procedure::GetDocument, &row(json!({"result": {"a": 1}}))).unwrap();
        assert_eq!(result.json(), br#"{"a":1}"#);
        assert!(matches!(result, ProcedureResult::Binary { .. }));
    }

    #[test]
    fn test_mutation_rows() {
        let result = decode_procedure(Procedure::DeleteDocument, &row(json!({"id": "k001"}))).unwrap();
        assert_eq!(
            result,
            ProcedureResult::Text {
                id: Some("k001".to_string()),
                json: r#"{"id":"k001"}"#.to_string(),
            }
        );
    }

    #[test]
    fn test_metadata() {
        let result = decode_procedure(
            Procedure::GetTextMetadataDocument,
            &row(json!({"result": {"id": "x", "type": "json"}})),
        )
        .unwrap();
        assert!(matches!(result, ProcedureResult::Text { id: None, .. }));
    }
}
