// Compilation of relational plans over a hand-built schema

use docql_ir::{
    AggFunc, BinOp, Call, Column, Command, DataType, Expr, Limit, LogicalTable, Procedure, Schema,
    Segment, Select, SortKey, SourcePath,
};
use docql_n1ql::{ColumnKind, Compiled, CompileError, Compiler, CompilerOptions};
use docql_registry::FunctionRegistry;

fn schema() -> Schema {
    let root = SourcePath::root("test");
    let mut schema = Schema::new();

    let mut customer = LogicalTable::top("Customer", "test").with_discriminator("type", "Customer");
    customer.columns.push(Column::value("Name", root.key("Name"), DataType::String));
    customer.columns.push(Column::value("Age", root.key("Age"), DataType::Integer));
    customer.columns.push(Column::value(
        "Address_City",
        root.key("Address").key("City"),
        DataType::String,
    ));

    let mut oder = LogicalTable::top("Oder", "test").with_discriminator("type", "Oder");
    oder.columns.push(Column::value("Name", root.key("Name"), DataType::String));

    let items_source = root.key("Items").array();
    let mut items = LogicalTable::array("Oder_Items", items_source.clone(), &oder);
    items.columns.push(Column::value("ItemID", items_source.key("ItemID"), DataType::Integer));
    items.columns.push(Column::value("Quantity", items_source.key("Quantity"), DataType::Integer));

    let nested_root = SourcePath::root("T3");
    let nested = LogicalTable::top("T3", "T3");
    let mut dim1 = LogicalTable::array("T3_nestedArray", nested_root.key("nestedArray").array(), &nested);
    dim1.columns.push(Column::value("T3_nestedArray", dim1.source.clone(), DataType::Object));
    let dim2_source = dim1.source.array();
    let mut dim2 = LogicalTable::array("T3_nestedArray_dim2", dim2_source.clone(), &dim1);
    dim2.columns.push(Column::value("T3_nestedArray_dim2", dim2_source, DataType::String));

    schema.add_table(customer);
    schema.add_table(oder);
    schema.add_table(items);
    schema.add_table(nested);
    schema.add_table(dim1);
    schema.add_table(dim2);
    schema
}

fn compile(select: Select) -> Result<docql_n1ql::CompiledQuery, CompileError> {
    let schema = schema();
    let registry = FunctionRegistry::default();
    Compiler::new(&schema, &registry).compile_select(&select)
}

fn name() -> Expr {
    Expr::col(None, "Name")
}

#[test]
fn test_limit_with_offset() {
    let query = compile(Select::from_table("Customer").column(name()).limit(2, 2)).unwrap();
    assert_eq!(
        query.n1ql,
        "SELECT `$1`.`Name` AS `$c1` FROM `test` `$1` WHERE `$1`.`type` = 'Customer' LIMIT 2 OFFSET 2"
    );
    assert_eq!(query.select_columns(), vec!["$c1"]);
    assert_eq!(query.select_column_references(), vec![Some("Name")]);
    assert_eq!(query.output_types(), vec![DataType::String]);
    assert!(query.array.is_none());
    assert!(query.window.is_none());
}

#[test]
fn test_offset_only() {
    let mut select = Select::from_table("Customer").column(name());
    select.limit = Some(Limit {
        offset: 5,
        count: None,
    });

    let query = compile(select.clone()).unwrap();
    assert!(query.n1ql.ends_with(" LIMIT 2147483647 OFFSET 5"));

    let schema = schema();
    let registry = FunctionRegistry::default();
    let query = Compiler::new(&schema, &registry)
        .with_options(CompilerOptions {
            offset_requires_limit: false,
        })
        .compile_select(&select)
        .unwrap();
    assert!(query.n1ql.ends_with("'Customer' OFFSET 5"));
}

#[test]
fn test_identity_and_nested_member() {
    let query = compile(
        Select::from_table("Customer")
            .column(Expr::col(Some("Customer"), "documentId"))
            .column_as(Expr::col(None, "Address_City"), "city"),
    )
    .unwrap();
    assert_eq!(
        query.n1ql,
        "SELECT META(`$1`).id AS `$c1`, `$1`.`Address`.`City` AS `$c2` FROM `test` `$1` WHERE `$1`.`type` = 'Customer'"
    );
    assert_eq!(query.columns[0].kind, ColumnKind::Identity);
    assert_eq!(query.columns[1].reference.as_deref(), Some("city"));
}

#[test]
fn test_user_filter_precedes_discriminator() {
    let filter = Expr::binary(
        BinOp::Or,
        Expr::eq(name(), Expr::lit("Ann")),
        Expr::binary(BinOp::Gt, Expr::col(None, "Age"), Expr::lit(30)),
    );
    let query = compile(Select::from_table("Customer").column(name()).filter(filter)).unwrap();
    assert_eq!(
        query.n1ql,
        "SELECT `$1`.`Name` AS `$c1` FROM `test` `$1` WHERE (`$1`.`Name` = 'Ann' OR `$1`.`Age` > 30) AND `$1`.`type` = 'Customer'"
    );
}

#[test]
fn test_distinct_and_order_by() {
    let query = compile(
        Select::from_table("Customer")
            .column(name())
            .distinct()
            .order_by(SortKey::desc(name())),
    )
    .unwrap();
    assert_eq!(
        query.n1ql,
        "SELECT DISTINCT `$1`.`Name` AS `$c1` FROM `test` `$1` WHERE `$1`.`type` = 'Customer' ORDER BY `$1`.`Name` DESC"
    );
}

#[test]
fn test_group_by_count() {
    let mut select = Select::from_table("Customer")
        .column(name())
        .column_as(Expr::agg(AggFunc::Count, None), "n");
    select.group_by.push(name());
    let query = compile(select).unwrap();
    assert_eq!(
        query.n1ql,
        "SELECT `$1`.`Name` AS `$c1`, COUNT(*) AS `$c2` FROM `test` `$1` WHERE `$1`.`type` = 'Customer' GROUP BY `$1`.`Name`"
    );
    assert_eq!(query.output_types(), vec![DataType::String, DataType::Long]);
    assert_eq!(query.columns[1].kind, ColumnKind::Scalar);
}

#[test]
fn test_function_rewrite_in_select() {
    let query = compile(
        Select::from_table("Customer").column_as(Expr::func("ucase", vec![name()]), "upper"),
    )
    .unwrap();
    assert!(query.n1ql.starts_with("SELECT UPPER(`$1`.`Name`) AS `$c1` FROM"));
}

#[test]
fn test_array_table_star() {
    let schema = schema();
    let items = schema.table("Oder_Items").unwrap();
    let select = Select::star(items).limit(1, 1);
    let registry = FunctionRegistry::default();
    let query = Compiler::new(&schema, &registry).compile_select(&select).unwrap();

    assert_eq!(
        query.n1ql,
        "SELECT META(`$1`).id AS `$c1`, `$a1` AS `$c2` FROM `test` `$1` LET `$a1` = `$1`.`Items` WHERE `$1`.`type` = 'Oder'"
    );
    assert_eq!(query.select_columns(), vec!["$c1", "$c2", "$c2", "$c2"]);
    assert_eq!(
        query.columns.iter().map(|c| c.kind.clone()).collect::<Vec<_>>(),
        vec![
            ColumnKind::Identity,
            ColumnKind::Index,
            ColumnKind::Element {
                leaf: vec!["ItemID".to_string()]
            },
            ColumnKind::Element {
                leaf: vec!["Quantity".to_string()]
            },
        ]
    );

    let array = query.array.as_ref().unwrap();
    assert_eq!(array.binding, "$a1");
    assert_eq!(array.alias, "$c2");
    assert!(array.steps.is_empty());
    assert_eq!(
        query.window,
        Some(Limit {
            offset: 1,
            count: Some(1)
        })
    );
}

#[test]
fn test_identity_only_select_still_projects_array() {
    let query = compile(Select::from_table("Oder_Items").column(Expr::col(None, "documentId"))).unwrap();
    assert_eq!(
        query.n1ql,
        "SELECT META(`$1`).id AS `$c1`, `$a1` AS `$c2` FROM `test` `$1` LET `$a1` = `$1`.`Items` WHERE `$1`.`type` = 'Oder'"
    );
    assert_eq!(query.columns.len(), 1);
    assert_eq!(query.array.as_ref().unwrap().alias, "$c2");
}

#[test]
fn test_nested_dimension_steps() {
    let query = compile(
        Select::from_table("T3_nestedArray_dim2")
            .column(Expr::col(None, "T3_nestedArray_dim2_idx"))
            .column(Expr::col(None, "T3_nestedArray_dim2")),
    )
    .unwrap();
    assert_eq!(
        query.n1ql,
        "SELECT `$a1` AS `$c1` FROM `T3` `$1` LET `$a1` = `$1`.`nestedArray`"
    );
    let array = query.array.unwrap();
    assert_eq!(array.steps, vec![Segment::Array]);
    assert_eq!(query.columns[1].kind, ColumnKind::Element { leaf: vec![] });
}

#[test]
fn test_array_filter_flattens_with_unnest() {
    let schema = schema();
    let items = schema.table("Oder_Items").unwrap();
    let select = Select::star(items)
        .filter(Expr::eq(Expr::col(None, "ItemID"), Expr::lit(1)))
        .limit(1, 1);
    let registry = FunctionRegistry::default();
    let query = Compiler::new(&schema, &registry).compile_select(&select).unwrap();

    assert_eq!(
        query.n1ql,
        "SELECT META(`$1`).id AS `$c1`, UNNEST_POS(`$a1`) AS `$c2`, `$a1`.`ItemID` AS `$c3`, `$a1`.`Quantity` AS `$c4` \
         FROM `test` `$1` UNNEST `$1`.`Items` AS `$a1` \
         WHERE `$a1`.`ItemID` = 1 AND `$1`.`type` = 'Oder' LIMIT 1 OFFSET 1"
    );
    assert_eq!(query.select_columns(), vec!["$c1", "$c2", "$c3", "$c4"]);
    assert!(query.columns[1..].iter().all(|c| c.kind == ColumnKind::Scalar));
    assert_eq!(
        query.output_types(),
        vec![DataType::String, DataType::Integer, DataType::Integer, DataType::Integer]
    );
    assert!(query.array.is_none());
    assert!(query.window.is_none());
}

#[test]
fn test_array_count_and_group_by() {
    let query = compile(Select::from_table("Oder_Items").column(Expr::agg(AggFunc::Count, None))).unwrap();
    assert_eq!(
        query.n1ql,
        "SELECT COUNT(*) AS `$c1` FROM `test` `$1` UNNEST `$1`.`Items` AS `$a1` WHERE `$1`.`type` = 'Oder'"
    );
    assert_eq!(query.output_types(), vec![DataType::Long]);

    let mut grouped = Select::from_table("Oder_Items")
        .column(Expr::col(None, "ItemID"))
        .column_as(Expr::agg(AggFunc::Sum, Some(Expr::col(None, "Quantity"))), "total");
    grouped.group_by.push(Expr::col(None, "ItemID"));
    let query = compile(grouped).unwrap();
    assert_eq!(
        query.n1ql,
        "SELECT `$a1`.`ItemID` AS `$c1`, SUM(`$a1`.`Quantity`) AS `$c2` FROM `test` `$1` \
         UNNEST `$1`.`Items` AS `$a1` WHERE `$1`.`type` = 'Oder' GROUP BY `$a1`.`ItemID`"
    );
}

#[test]
fn test_array_order_by_and_distinct() {
    let query = compile(
        Select::from_table("Oder_Items")
            .column(Expr::col(None, "ItemID"))
            .order_by(SortKey::desc(Expr::col(None, "Quantity"))),
    )
    .unwrap();
    assert_eq!(
        query.n1ql,
        "SELECT `$a1`.`ItemID` AS `$c1` FROM `test` `$1` UNNEST `$1`.`Items` AS `$a1` \
         WHERE `$1`.`type` = 'Oder' ORDER BY `$a1`.`Quantity` DESC"
    );

    let query = compile(
        Select::from_table("Oder_Items")
            .column(Expr::col(None, "ItemID"))
            .distinct(),
    )
    .unwrap();
    assert!(query
        .n1ql
        .starts_with("SELECT DISTINCT `$a1`.`ItemID` AS `$c1` FROM `test` `$1` UNNEST `$1`.`Items` AS `$a1`"));
}

#[test]
fn test_array_column_inside_function() {
    let query = compile(
        Select::from_table("Oder_Items").column(Expr::func("abs", vec![Expr::col(None, "Quantity")])),
    )
    .unwrap();
    assert!(query.n1ql.contains("(`$a1`.`Quantity`) AS `$c1`"));
    assert!(query.n1ql.contains("UNNEST `$1`.`Items` AS `$a1`"));
}

#[test]
fn test_nested_dimension_unnest_chain() {
    let query = compile(
        Select::from_table("T3_nestedArray_dim2")
            .column(Expr::col(None, "T3_nestedArray_dim2_idx"))
            .filter(Expr::eq(Expr::col(None, "T3_nestedArray_dim2"), Expr::lit("x"))),
    )
    .unwrap();
    assert_eq!(
        query.n1ql,
        "SELECT UNNEST_POS(`$a2`) AS `$c1` FROM `T3` `$1` UNNEST `$1`.`nestedArray` AS `$a1` \
         UNNEST `$a1` AS `$a2` WHERE `$a2` = 'x'"
    );
}

#[test]
fn test_two_array_tables_each_flattened() {
    let mut select = Select::from_table("Oder_Items").column(Expr::col(Some("Oder_Items"), "ItemID"));
    select.from.push(docql_ir::TableRef {
        name: "T3_nestedArray".to_string(),
    });
    let query = compile(select).unwrap();
    assert_eq!(
        query.n1ql,
        "SELECT `$a1`.`ItemID` AS `$c1` FROM `test` `$1`, `T3` `$2` UNNEST `$1`.`Items` AS `$a1` \
         UNNEST `$2`.`nestedArray` AS `$a2` WHERE `$1`.`type` = 'Oder'"
    );
}

#[test]
fn test_resolution_errors() {
    assert!(matches!(
        compile(Select::from_table("Missing").column(name())),
        Err(CompileError::UnknownTable(t)) if t == "Missing"
    ));
    assert!(matches!(
        compile(Select::from_table("Customer").column(Expr::col(None, "Nope"))),
        Err(CompileError::UnknownColumn { .. })
    ));

    let mut both = Select::from_table("Customer").column(name());
    both.from.push(docql_ir::TableRef {
        name: "Oder".to_string(),
    });
    assert!(matches!(compile(both), Err(CompileError::AmbiguousColumn(c)) if c == "Name"));

    assert!(matches!(
        compile(Select::from_table("Customer")),
        Err(CompileError::InvalidPlan(_))
    ));
}

#[test]
fn test_compile_dispatches_procedures() {
    let schema = schema();
    let registry = FunctionRegistry::default();
    let compiler = Compiler::new(&schema, &registry);

    let command = Command::from(Call::new(Procedure::GetDocument, "test").with_id("customer"));
    let compiled = compiler.compile(&command).unwrap();
    assert!(matches!(compiled, Compiled::Procedure(_)));
    assert_eq!(
        compiled.n1ql(),
        "SELECT result FROM `test` AS result USE PRIMARY KEYS 'customer'"
    );

    let command = Command::from(Select::from_table("Customer").column(name()));
    assert!(matches!(compiler.compile(&command).unwrap(), Compiled::Query(_)));
}
