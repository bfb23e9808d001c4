use pretty_assertions::assert_eq;

use quarry_core::{DriverResponse, Method, QuarryError, QueryOutcome, Returning, Row, Statement, Value};

use crate::ast::{Lock, QueryAst, Raw, SqlValue, insert_row};
use crate::dialect::dialect;
use crate::formatter::FormatPolicy;

use super::QueryCompiler;

fn compile(dialect_name: &str, ast: &QueryAst) -> Vec<Statement> {
    compile_with(dialect_name, &FormatPolicy::default(), ast)
}

fn compile_with(dialect_name: &str, policy: &FormatPolicy, ast: &QueryAst) -> Vec<Statement> {
    let dialect = dialect(dialect_name).expect("dialect is registered");
    QueryCompiler::new(dialect, policy, ast)
        .with_database("quarry_test")
        .compile()
        .expect("compiles")
}

fn compile_one(dialect_name: &str, ast: &QueryAst) -> Statement {
    let mut statements = compile(dialect_name, ast);
    assert_eq!(statements.len(), 1);
    statements.remove(0)
}

// ============================================================================
// Select
// ============================================================================

#[test]
fn test_select_basic() {
    let ast = QueryAst::select("users")
        .with_columns(["id", "name"])
        .with_where(Raw::with_bindings("\"id\" = ?", vec![Value::Int(1)]))
        .with_limit(10)
        .with_offset(5);
    let stmt = compile_one("postgresql", &ast);
    assert_eq!(
        stmt.sql,
        "select \"id\", \"name\" from \"users\" where \"id\" = ? limit ? offset ?"
    );
    assert_eq!(
        stmt.bindings,
        vec![Value::Int(1), Value::Int(10), Value::Int(5)]
    );
}

#[test]
fn test_select_compiles_identically_twice() {
    let ast = QueryAst::select("users")
        .with_columns(["id"])
        .with_where(Raw::with_bindings("\"id\" = ?", vec![Value::Int(7)]))
        .with_limit(3);
    for name in ["postgresql", "mysql", "mssql", "oracle", "sqlite3", "redshift"] {
        let first = compile_one(name, &ast);
        let second = compile_one(name, &ast);
        assert_eq!(first, second, "{name} must compile deterministically");
    }
}

#[test]
fn test_select_mssql_top() {
    let ast = QueryAst::select("users").with_limit(10);
    let stmt = compile_one("mssql", &ast);
    assert_eq!(stmt.sql, "select top (?) * from [users]");
    assert_eq!(stmt.bindings, vec![Value::Int(10)]);
}

#[test]
fn test_select_mssql_offset_fetch() {
    let ast = QueryAst::select("users").with_limit(10).with_offset(5);
    let stmt = compile_one("mssql", &ast);
    assert_eq!(
        stmt.sql,
        "select * from [users] offset ? rows fetch next ? rows only"
    );
    assert_eq!(stmt.bindings, vec![Value::Int(5), Value::Int(10)]);
}

#[test]
fn test_select_sqlite_offset_without_limit_uses_sentinel() {
    let ast = QueryAst::select("users").with_offset(5);
    let stmt = compile_one("sqlite3", &ast);
    assert_eq!(stmt.sql, "select * from \"users\" limit ? offset ?");
    assert_eq!(stmt.bindings, vec![Value::Int(-1), Value::Int(5)]);
}

#[test]
fn test_select_oracle_rownum_pagination() {
    let ast = QueryAst::select("users").with_limit(10).with_offset(5);
    let stmt = compile_one("oracle", &ast);
    assert_eq!(
        stmt.sql,
        "select * from (select row_.*, ROWNUM rownum_ from (select * from \"users\") row_ \
         where rownum <= ?) where rownum_ > ?"
    );
    assert_eq!(stmt.bindings, vec![Value::Int(15), Value::Int(5)]);

    let limit_only = QueryAst::select("users").with_limit(10);
    let stmt = compile_one("oracle", &limit_only);
    assert_eq!(
        stmt.sql,
        "select * from (select * from \"users\") where rownum <= ?"
    );
}

#[test]
fn test_select_lock_clauses() {
    let ast = QueryAst::select("jobs").with_lock(Lock::ForUpdate);
    assert_eq!(
        compile_one("postgresql", &ast).sql,
        "select * from \"jobs\" for update"
    );
    assert_eq!(
        compile_one("mysql", &ast).sql,
        "select * from `jobs` for update"
    );
    // sqlite and redshift warn and omit the clause
    assert_eq!(compile_one("sqlite3", &ast).sql, "select * from \"jobs\"");
    assert_eq!(compile_one("redshift", &ast).sql, "select * from \"jobs\"");
}

#[test]
fn test_select_mssql_lock_sits_after_columns() {
    let ast = QueryAst::select("jobs")
        .with_lock(Lock::ForShare)
        .with_where(Raw::new("[id] = 1"));
    let stmt = compile_one("mssql", &ast);
    assert_eq!(stmt.sql, "select * from [jobs] with (NOLOCK) where [id] = 1");
}

#[test]
fn test_select_schema_qualified_table() {
    let mut ast = QueryAst::select("users");
    ast.schema = Some("public".to_string());
    let stmt = compile_one("postgresql", &ast);
    assert_eq!(stmt.sql, "select * from \"public\".\"users\"");
}

#[test]
fn test_select_with_cte_prefix() {
    let mut ast = QueryAst::select("recent").with_columns(["id"]);
    ast.ctes.push(crate::ast::Cte {
        name: "recent".to_string(),
        body: Raw::with_bindings("select * from \"events\" where \"at\" > ?", vec![Value::Int(0)]),
    });
    let stmt = compile_one("postgresql", &ast);
    assert_eq!(
        stmt.sql,
        "with \"recent\" as (select * from \"events\" where \"at\" > ?) \
         select \"id\" from \"recent\""
    );
    assert_eq!(stmt.bindings, vec![Value::Int(0)]);
}

// ============================================================================
// Insert
// ============================================================================

#[test]
fn test_insert_multi_row_single_statement() {
    let ast = QueryAst::insert_into("users")
        .with_row(insert_row([("name", "a")]))
        .with_row(insert_row([("name", "b")]));
    let stmt = compile_one("postgresql", &ast);
    assert_eq!(stmt.sql, "insert into \"users\" (\"name\") values (?), (?)");
    assert_eq!(
        stmt.bindings,
        vec![Value::Text("a".into()), Value::Text("b".into())]
    );
}

#[test]
fn test_insert_bindings_parallel_column_order() {
    let ast = QueryAst::insert_into("users")
        .with_row(insert_row([
            ("name", SqlValue::from("a")),
            ("age", SqlValue::from(30i64)),
        ]))
        .with_row(insert_row([
            ("age", SqlValue::from(40i64)),
            ("name", SqlValue::from("b")),
        ]));
    let stmt = compile_one("postgresql", &ast);
    assert_eq!(
        stmt.sql,
        "insert into \"users\" (\"age\", \"name\") values (?, ?), (?, ?)"
    );
    assert_eq!(
        stmt.bindings,
        vec![
            Value::Int(30),
            Value::Text("a".into()),
            Value::Int(40),
            Value::Text("b".into()),
        ]
    );
}

#[test]
fn test_insert_sqlite_union_all_chain() {
    let ast = QueryAst::insert_into("users")
        .with_row(insert_row([("name", "a")]))
        .with_row(insert_row([("name", "b")]));
    let stmt = compile_one("sqlite3", &ast);
    assert_eq!(
        stmt.sql,
        "insert into \"users\" (\"name\") select ? as \"name\" union all select ? as \"name\""
    );
    assert_eq!(
        stmt.bindings,
        vec![Value::Text("a".into()), Value::Text("b".into())]
    );
}

#[test]
fn test_insert_sqlite_single_row_keeps_values_form() {
    let ast = QueryAst::insert_into("users").with_row(insert_row([("name", "a")]));
    let stmt = compile_one("sqlite3", &ast);
    assert_eq!(stmt.sql, "insert into \"users\" (\"name\") values (?)");
}

#[test]
fn test_insert_missing_cell_uses_default_keyword() {
    let mut sparse = insert_row([("name", "a")]);
    sparse.insert("age".to_string(), None);
    let ast = QueryAst::insert_into("users").with_row(sparse);
    let stmt = compile_one("postgresql", &ast);
    assert_eq!(
        stmt.sql,
        "insert into \"users\" (\"age\", \"name\") values (DEFAULT, ?)"
    );
    assert_eq!(stmt.bindings, vec![Value::Text("a".into())]);
}

#[test]
fn test_insert_missing_cell_null_policy_binds_null() {
    let mut sparse = insert_row([("name", "a")]);
    sparse.insert("age".to_string(), None);
    let ast = QueryAst::insert_into("users").with_row(sparse);
    let policy = FormatPolicy::use_null_as_default();
    let mut statements = compile_with("sqlite3", &policy, &ast);
    let stmt = statements.remove(0);
    assert_eq!(stmt.sql, "insert into \"users\" (\"age\", \"name\") values (?, ?)");
    assert_eq!(
        stmt.bindings,
        vec![Value::Null, Value::Text("a".into())]
    );
}

#[test]
fn test_insert_sqlite_rejects_missing_cell_under_default_policy() {
    let mut sparse = insert_row([("name", "a")]);
    sparse.insert("age".to_string(), None);
    let ast = QueryAst::insert_into("users").with_row(sparse);
    let dialect = dialect("sqlite3").expect("dialect is registered");
    let policy = FormatPolicy::default();
    let err = QueryCompiler::new(dialect, &policy, &ast).compile();
    assert!(matches!(err, Err(QuarryError::Compile(_))));
}

#[test]
fn test_insert_zero_rows_is_a_noop_statement() {
    let ast = QueryAst::insert_into("users");
    let stmt = compile_one("postgresql", &ast);
    assert!(stmt.is_empty());
    assert!(stmt.bindings.is_empty());
}

#[test]
fn test_insert_single_empty_row_uses_sentinel() {
    let ast = QueryAst::insert_into("users").with_row(Default::default());
    assert_eq!(
        compile_one("postgresql", &ast).sql,
        "insert into \"users\" default values"
    );
    assert_eq!(
        compile_one("mssql", &ast).sql,
        "insert into [users] default values"
    );
}

#[test]
fn test_insert_returning_postgres() {
    let ast = QueryAst::insert_into("users")
        .with_row(insert_row([("name", "a")]))
        .with_returning(Returning::Columns(vec!["id".to_string()]));
    let stmt = compile_one("postgresql", &ast);
    assert_eq!(
        stmt.sql,
        "insert into \"users\" (\"name\") values (?) returning \"id\""
    );
    assert_eq!(
        stmt.returning,
        Some(Returning::Columns(vec!["id".to_string()]))
    );
}

#[test]
fn test_insert_returning_mssql_output_before_values() {
    let ast = QueryAst::insert_into("users")
        .with_row(insert_row([("name", "a")]))
        .with_returning(Returning::Columns(vec!["id".to_string()]));
    let stmt = compile_one("mssql", &ast);
    assert_eq!(
        stmt.sql,
        "insert into [users] ([name]) output inserted.[id] values (?)"
    );
}

// ============================================================================
// Update / delete / counter
// ============================================================================

#[test]
fn test_update_postgres_returning() {
    let ast = QueryAst::update_table("users")
        .with_set("name", "b")
        .with_where(Raw::with_bindings("\"id\" = ?", vec![Value::Int(1)]))
        .with_returning(Returning::All);
    let stmt = compile_one("postgresql", &ast);
    assert_eq!(
        stmt.sql,
        "update \"users\" set \"name\" = ? where \"id\" = ? returning *"
    );
    assert_eq!(
        stmt.bindings,
        vec![Value::Text("b".into()), Value::Int(1)]
    );
}

#[test]
fn test_update_mssql_appends_rowcount_select() {
    let ast = QueryAst::update_table("users")
        .with_set("name", "b")
        .with_where(Raw::with_bindings("[id] = ?", vec![Value::Int(1)]));
    let stmt = compile_one("mssql", &ast);
    assert_eq!(
        stmt.sql,
        "update [users] set [name] = ? where [id] = ?;select @@rowcount"
    );
}

#[test]
fn test_update_mssql_output_sits_before_where() {
    let ast = QueryAst::update_table("users")
        .with_set("name", "b")
        .with_where(Raw::new("[id] = 1"))
        .with_returning(Returning::Columns(vec!["name".to_string()]));
    let stmt = compile_one("mssql", &ast);
    assert_eq!(
        stmt.sql,
        "update [users] set [name] = ? output inserted.[name] where [id] = 1"
    );
}

#[test]
fn test_update_without_returning_support_warns_and_omits() {
    let ast = QueryAst::update_table("users")
        .with_set("name", "b")
        .with_returning(Returning::All);
    let stmt = compile_one("sqlite3", &ast);
    assert_eq!(stmt.sql, "update \"users\" set \"name\" = ?");
}

#[test]
fn test_delete_with_returning() {
    let ast = QueryAst::delete_from("users")
        .with_where(Raw::with_bindings("\"id\" = ?", vec![Value::Int(1)]))
        .with_returning(Returning::All);
    assert_eq!(
        compile_one("postgresql", &ast).sql,
        "delete from \"users\" where \"id\" = ? returning *"
    );
    // raw fragments pass through untouched, bracket wrapping included
    assert_eq!(
        compile_one("mssql", &ast).sql,
        "delete from [users] output deleted.* where \"id\" = ?"
    );
}

#[test]
fn test_counter_inlines_amounts() {
    let mut ast = QueryAst::update_table("points");
    ast.method = Method::Counter;
    ast.counters.push(("score".to_string(), 5));
    ast.counters.push(("lives".to_string(), -1));
    let stmt = compile_one("postgresql", &ast);
    assert_eq!(
        stmt.sql,
        "update \"points\" set \"score\" = \"score\" + 5, \"lives\" = \"lives\" - 1"
    );
    assert_eq!(stmt.method, Method::Counter);
    assert!(stmt.bindings.is_empty());
}

// ============================================================================
// Truncate / columnInfo / raw
// ============================================================================

#[test]
fn test_truncate_per_dialect() {
    let ast = QueryAst::truncate("users");
    assert_eq!(
        compile_one("postgresql", &ast).sql,
        "truncate \"users\" restart identity"
    );
    assert_eq!(compile_one("mysql", &ast).sql, "truncate `users`");
    assert_eq!(compile_one("mssql", &ast).sql, "truncate table [users]");
    assert_eq!(compile_one("redshift", &ast).sql, "truncate \"users\"");
}

#[test]
fn test_truncate_sqlite_emulation_sequence() {
    let ast = QueryAst::truncate("users");
    let statements = compile("sqlite3", &ast);
    assert_eq!(statements.len(), 2);
    assert_eq!(statements[0].sql, "delete from \"users\"");
    assert_eq!(
        statements[1].sql,
        "delete from sqlite_sequence where name = ?"
    );
    assert_eq!(statements[1].bindings, vec![Value::Text("users".into())]);
    assert!(statements[1].ignores_errors());
    assert!(!statements[0].ignores_errors());
}

#[test]
fn test_column_info_postgres() {
    let ast = QueryAst::column_info("users");
    let stmt = compile_one("postgresql", &ast);
    assert_eq!(
        stmt.sql,
        "select * from information_schema.columns where table_name = ? and table_catalog = ? \
         and table_schema = current_schema()"
    );
    assert_eq!(
        stmt.bindings,
        vec![
            Value::Text("users".into()),
            Value::Text("quarry_test".into())
        ]
    );

    let output = stmt.output.as_ref().expect("columnInfo carries a shaper");
    let resp = DriverResponse::rows(vec![Row::new(
        vec![
            "column_name".into(),
            "data_type".into(),
            "character_maximum_length".into(),
            "is_nullable".into(),
            "column_default".into(),
        ],
        vec![
            Value::Text("name".into()),
            Value::Text("character varying".into()),
            Value::Int(255),
            Value::Text("YES".into()),
            Value::Null,
        ],
    )]);
    let outcome = output(&resp).expect("shapes");
    let QueryOutcome::ColumnInfo(info) = outcome else {
        panic!("expected column info outcome");
    };
    let descriptor = &info["name"];
    assert_eq!(descriptor.type_name, "character varying");
    assert_eq!(descriptor.max_length, Some(255));
    assert!(descriptor.nullable);
    assert_eq!(descriptor.default_value, None);
}

#[test]
fn test_column_info_sqlite_pragma_and_type_split() {
    let mut ast = QueryAst::column_info("users");
    ast.info_column = Some("name".to_string());
    let stmt = compile_one("sqlite3", &ast);
    assert_eq!(stmt.sql, "PRAGMA table_info(`users`)");

    let output = stmt.output.as_ref().expect("columnInfo carries a shaper");
    let columns = vec![
        "name".to_string(),
        "type".to_string(),
        "notnull".to_string(),
        "dflt_value".to_string(),
    ];
    let resp = DriverResponse::rows(vec![
        Row::new(
            columns.clone(),
            vec![
                Value::Text("name".into()),
                Value::Text("varchar(255)".into()),
                Value::Int(1),
                Value::Null,
            ],
        ),
        Row::new(
            columns,
            vec![
                Value::Text("age".into()),
                Value::Text("integer".into()),
                Value::Int(0),
                Value::Null,
            ],
        ),
    ]);
    let QueryOutcome::ColumnInfo(info) = output(&resp).expect("shapes") else {
        panic!("expected column info outcome");
    };
    // filtered down to the requested column
    assert_eq!(info.len(), 1);
    let descriptor = &info["name"];
    assert_eq!(descriptor.type_name, "varchar");
    assert_eq!(descriptor.max_length, Some(255));
    assert!(!descriptor.nullable);
}

#[test]
fn test_raw_passthrough_checks_binding_count() {
    let ast = QueryAst::raw_statement(Raw::with_bindings(
        "select * from users where id = ?",
        vec![Value::Int(1)],
    ));
    let stmt = compile_one("postgresql", &ast);
    assert_eq!(stmt.method, Method::Raw);

    let bad = QueryAst::raw_statement(Raw::new("select * from users where id = ?"));
    let dialect = dialect("postgresql").expect("dialect is registered");
    let policy = FormatPolicy::default();
    let err = QueryCompiler::new(dialect, &policy, &bad).compile();
    assert!(matches!(err, Err(QuarryError::Compile(_))));
}

#[test]
fn test_timeout_hints_propagate_to_statements() {
    let ast = QueryAst::select("users").with_timeout(std::time::Duration::from_millis(100), true);
    let stmt = compile_one("postgresql", &ast);
    assert_eq!(stmt.timeout, Some(std::time::Duration::from_millis(100)));
    assert!(stmt.cancel_on_timeout);
}
