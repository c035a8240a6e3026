// HTTP surface exercised in-process with tower's oneshot

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use docql_ir::{Column, DataType, LogicalTable, Schema, Select, SourcePath};
use docql_n1ql::CompilerOptions;
use docql_server::{router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

fn schema() -> Schema {
    let root = SourcePath::root("test");
    let mut schema = Schema::new();
    let mut top = LogicalTable::top("test", "test");
    top.columns.push(Column::value("Name", root.key("Name"), DataType::String));
    let items_source = root.key("Items").array();
    let mut items = LogicalTable::array("test_Items", items_source.clone(), &top);
    items.columns.push(Column::value("ItemID", items_source.key("ItemID"), DataType::Integer));
    schema.add_table(top);
    schema.add_table(items);
    schema
}

fn app() -> axum::Router {
    router(Arc::new(AppState::new(schema(), CompilerOptions::default())))
}

async fn send(request: Request<Body>) -> (StatusCode, Value) {
    let response = app().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::String(
        String::from_utf8_lossy(&bytes).to_string(),
    ));
    (status, body)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".to_string()));
}

#[tokio::test]
async fn test_schema_endpoint() {
    let (status, body) = send(get("/schema")).await;
    assert_eq!(status, StatusCode::OK);
    let parsed: Schema = serde_json::from_value(body).unwrap();
    assert_eq!(parsed, schema());
}

#[tokio::test]
async fn test_compile_query() {
    let select = Select::from_table("test").column(docql_ir::Expr::col(None, "Name")).limit(2, 2);
    let command = serde_json::to_value(docql_ir::Command::from(select)).unwrap();
    let (status, body) = send(post("/compile", json!({ "command": command }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["n1ql"],
        "SELECT `$1`.`Name` AS `$c1` FROM `test` `$1` LIMIT 2 OFFSET 2"
    );
    assert_eq!(body["select_columns"], json!(["$c1"]));
    assert_eq!(body["select_column_references"], json!(["Name"]));
}

#[tokio::test]
async fn test_compile_unknown_table_is_404() {
    let select = Select::from_table("nope").column(docql_ir::Expr::col(None, "Name"));
    let command = serde_json::to_value(docql_ir::Command::from(select)).unwrap();
    let (status, body) = send(post("/compile", json!({ "command": command }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_compile_unknown_column_is_400() {
    let select = Select::from_table("test_Items").column(docql_ir::Expr::col(None, "Nope"));
    let command = serde_json::to_value(docql_ir::Command::from(select)).unwrap();
    let (status, body) = send(post("/compile", json!({ "command": command }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Nope"));
}

#[tokio::test]
async fn test_compile_distinct_over_array_table() {
    let select = Select::from_table("test_Items").column(docql_ir::Expr::col(None, "ItemID")).distinct();
    let command = serde_json::to_value(docql_ir::Command::from(select)).unwrap();
    let (status, body) = send(post("/compile", json!({ "command": command }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["n1ql"],
        "SELECT DISTINCT `$a1`.`ItemID` AS `$c1` FROM `test` `$1` UNNEST `$1`.`Items` AS `$a1`"
    );
    assert!(body.get("array").is_none());
}

#[tokio::test]
async fn test_compile_then_decode() {
    let select = Select::star(schema().table("test_Items").unwrap());
    let command = serde_json::to_value(docql_ir::Command::from(select)).unwrap();
    let (status, compiled) = send(post("/compile", json!({ "command": command }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(compiled["array"]["alias"], "$c2");

    let rows = json!([{"$c1": "doc1", "$c2": [{"ItemID": 7}, {"ItemID": 8}]}]);
    let (status, body) = send(post("/decode", json!({ "compiled": compiled, "rows": rows }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], json!([["doc1", 0, 7], ["doc1", 1, 8]]));
}

#[tokio::test]
async fn test_decode_shape_mismatch_is_400() {
    let select = Select::star(schema().table("test_Items").unwrap());
    let command = serde_json::to_value(docql_ir::Command::from(select)).unwrap();
    let (_, compiled) = send(post("/compile", json!({ "command": command }))).await;

    let rows = json!([{"$c1": "doc1", "$c2": "not an array"}]);
    let (status, body) = send(post("/decode", json!({ "compiled": compiled, "rows": rows }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Shape mismatch"));
}
