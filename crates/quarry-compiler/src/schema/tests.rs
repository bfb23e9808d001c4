use pretty_assertions::assert_eq;

use quarry_core::{Method, QuarryError, Value};

use crate::ast::Raw;
use crate::dialects::{MssqlDialect, MysqlDialect, PostgresDialect, SqliteDialect};
use crate::formatter::FormatPolicy;

use super::{
    ColumnDef, ColumnKind, ForeignKey, KeySpec, SchemaAst, SchemaCompiler, SchemaOp, TableDef,
};

fn compile(dialect: &dyn crate::dialect::SqlDialect, ast: &SchemaAst) -> Vec<quarry_core::Statement> {
    let policy = FormatPolicy::default();
    SchemaCompiler::new(dialect, &policy)
        .compile(ast)
        .expect("compiles")
}

// ============================================================================
// Create table
// ============================================================================

#[test]
fn test_create_table_postgres() {
    let ast = SchemaAst::new().op(SchemaOp::CreateTable(
        TableDef::new("users")
            .column(ColumnDef::increments())
            .column(ColumnDef::new("email", ColumnKind::VarChar(None)).not_nullable())
            .column(ColumnDef::new("active", ColumnKind::Bool).default_to(Value::Bool(true))),
    ));
    let stmts = compile(&PostgresDialect, &ast);
    assert_eq!(stmts.len(), 1);
    assert_eq!(
        stmts[0].sql,
        "create table \"users\" (\"id\" serial primary key, \"email\" varchar(255) not null, \"active\" boolean default '1')"
    );
    assert_eq!(stmts[0].method, Method::Ddl);
    assert!(stmts[0].bindings.is_empty());
}

#[test]
fn test_create_table_if_not_exists() {
    let ast = SchemaAst::new().op(SchemaOp::CreateTableIfNotExists(
        TableDef::new("users").column(ColumnDef::increments()),
    ));
    let stmts = compile(&PostgresDialect, &ast);
    assert_eq!(
        stmts[0].sql,
        "create table if not exists \"users\" (\"id\" serial primary key)"
    );
}

#[test]
fn test_create_table_schema_qualified() {
    let ast = SchemaAst::new().with_schema("app").op(SchemaOp::CreateTable(
        TableDef::new("users").column(ColumnDef::increments()),
    ));
    let stmts = compile(&PostgresDialect, &ast);
    assert_eq!(
        stmts[0].sql,
        "create table \"app\".\"users\" (\"id\" serial primary key)"
    );
}

#[test]
fn test_create_table_constraints_as_alter_statements() {
    let table = TableDef::new("posts")
        .column(ColumnDef::new("id", ColumnKind::Integer).not_nullable())
        .column(ColumnDef::new("user_id", ColumnKind::Integer))
        .primary(vec!["id".to_string()])
        .foreign(
            ForeignKey::new(vec!["user_id".to_string()], "users", vec!["id".to_string()])
                .on_delete("cascade"),
        );
    let stmts = compile(&PostgresDialect, &SchemaAst::new().op(SchemaOp::CreateTable(table)));
    assert_eq!(stmts.len(), 3);
    assert_eq!(
        stmts[0].sql,
        "create table \"posts\" (\"id\" integer not null, \"user_id\" integer)"
    );
    assert_eq!(
        stmts[1].sql,
        "alter table \"posts\" add constraint \"posts_pkey\" primary key (\"id\")"
    );
    assert_eq!(
        stmts[2].sql,
        "alter table \"posts\" add constraint \"posts_user_id_foreign\" foreign key (\"user_id\") references \"users\" (\"id\") on delete cascade"
    );
}

#[test]
fn test_create_table_sqlite_inlines_keys() {
    let table = TableDef::new("posts")
        .column(ColumnDef::new("id", ColumnKind::Integer).not_nullable())
        .column(ColumnDef::new("user_id", ColumnKind::Integer))
        .primary(vec!["id".to_string()])
        .foreign(
            ForeignKey::new(vec!["user_id".to_string()], "users", vec!["id".to_string()])
                .on_delete("cascade"),
        );
    let stmts = compile(&SqliteDialect, &SchemaAst::new().op(SchemaOp::CreateTable(table)));
    assert_eq!(stmts.len(), 1);
    assert_eq!(
        stmts[0].sql,
        "create table \"posts\" (\"id\" integer not null, \"user_id\" integer, primary key (\"id\"), foreign key (\"user_id\") references \"users\" (\"id\") on delete cascade)"
    );
}

#[test]
fn test_create_table_mysql_suffix_and_unsigned() {
    let table = TableDef::new("accounts")
        .column(ColumnDef::increments())
        .column(ColumnDef::new("balance", ColumnKind::Integer).unsigned().not_nullable())
        .unique(KeySpec::new(vec!["owner".to_string()]))
        .engine("InnoDB")
        .charset("utf8");
    let stmts = compile(&MysqlDialect, &SchemaAst::new().op(SchemaOp::CreateTable(table)));
    assert_eq!(stmts.len(), 2);
    assert_eq!(
        stmts[0].sql,
        "create table `accounts` (`id` int unsigned not null auto_increment primary key, `balance` int unsigned not null) engine = InnoDB default character set utf8"
    );
    assert_eq!(
        stmts[1].sql,
        "alter table `accounts` add unique `accounts_owner_unique`(`owner`)"
    );
}

#[test]
fn test_create_table_mssql_uppercase_keywords() {
    let table = TableDef::new("tasks")
        .column(ColumnDef::new("id", ColumnKind::Integer).not_nullable())
        .column(ColumnDef::new("title", ColumnKind::VarChar(None)))
        .primary(vec!["id".to_string()]);
    let stmts = compile(&MssqlDialect, &SchemaAst::new().op(SchemaOp::CreateTable(table)));
    assert_eq!(
        stmts[0].sql,
        "CREATE TABLE [tasks] ([id] int not null, [title] nvarchar(255))"
    );
    assert_eq!(
        stmts[1].sql,
        "ALTER TABLE [tasks] ADD CONSTRAINT [tasks_pkey] PRIMARY KEY ([id])"
    );
}

#[test]
fn test_create_index_statement() {
    let table = TableDef::new("users")
        .column(ColumnDef::increments())
        .index(KeySpec::new(vec!["name".to_string()]));
    let stmts = compile(&PostgresDialect, &SchemaAst::new().op(SchemaOp::CreateTable(table)));
    assert_eq!(
        stmts[1].sql,
        "create index \"users_name_index\" on \"users\" (\"name\")"
    );
}

#[test]
fn test_named_unique_key() {
    let table = TableDef::new("users")
        .column(ColumnDef::increments())
        .unique(KeySpec::new(vec!["email".to_string()]).named("uq_users_email"));
    let stmts = compile(&PostgresDialect, &SchemaAst::new().op(SchemaOp::CreateTable(table)));
    assert_eq!(
        stmts[1].sql,
        "alter table \"users\" add constraint \"uq_users_email\" unique (\"email\")"
    );
}

// ============================================================================
// Column types and modifiers
// ============================================================================

#[test]
fn test_enum_column_per_dialect() {
    let table = || {
        TableDef::new("tickets").column(ColumnDef::new(
            "status",
            ColumnKind::Enum(vec!["new".to_string(), "done".to_string()]),
        ))
    };
    let pg = compile(&PostgresDialect, &SchemaAst::new().op(SchemaOp::CreateTable(table())));
    assert_eq!(
        pg[0].sql,
        "create table \"tickets\" (\"status\" text check (\"status\" in ('new', 'done')))"
    );
    let mysql = compile(&MysqlDialect, &SchemaAst::new().op(SchemaOp::CreateTable(table())));
    assert_eq!(
        mysql[0].sql,
        "create table `tickets` (`status` enum('new', 'done'))"
    );
}

#[test]
fn test_raw_default_is_inlined() {
    let table = TableDef::new("events")
        .column(ColumnDef::new("created_at", ColumnKind::Timestamp).default_to(Raw::new("now()")))
        .column(ColumnDef::new("payload", ColumnKind::Jsonb));
    let stmts = compile(&PostgresDialect, &SchemaAst::new().op(SchemaOp::CreateTable(table)));
    assert_eq!(
        stmts[0].sql,
        "create table \"events\" (\"created_at\" timestamptz default now(), \"payload\" jsonb)"
    );
}

#[test]
fn test_mysql_drops_default_on_text_columns() {
    let table = TableDef::new("notes")
        .column(ColumnDef::new("body", ColumnKind::Text).default_to(Value::Text("x".into())));
    let stmts = compile(&MysqlDialect, &SchemaAst::new().op(SchemaOp::CreateTable(table)));
    assert_eq!(stmts[0].sql, "create table `notes` (`body` text)");
}

#[test]
fn test_increments_rejects_modifiers() {
    let policy = FormatPolicy::default();
    let ast = SchemaAst::new().op(SchemaOp::CreateTable(
        TableDef::new("users").column(ColumnDef::increments().nullable()),
    ));
    let err = SchemaCompiler::new(&PostgresDialect, &policy)
        .compile(&ast)
        .expect_err("auto-increment keys reject modifiers");
    assert!(matches!(err, QuarryError::Compile(_)));
}

// ============================================================================
// Alter table
// ============================================================================

#[test]
fn test_alter_table_adds_columns_in_one_statement() {
    let table = TableDef::new("users")
        .column(ColumnDef::new("age", ColumnKind::Integer))
        .column(ColumnDef::new("bio", ColumnKind::Text));
    let stmts = compile(&PostgresDialect, &SchemaAst::new().op(SchemaOp::AlterTable(table)));
    assert_eq!(stmts.len(), 1);
    assert_eq!(
        stmts[0].sql,
        "alter table \"users\" add column \"age\" integer, add column \"bio\" text"
    );
}

#[test]
fn test_alter_table_drop_columns() {
    let table = TableDef::new("users").drop_column("age").drop_column("bio");
    let stmts = compile(&PostgresDialect, &SchemaAst::new().op(SchemaOp::AlterTable(table)));
    assert_eq!(
        stmts[0].sql,
        "alter table \"users\" drop column \"age\", drop column \"bio\""
    );
}

#[test]
fn test_alter_table_sqlite_rejects_drop_column() {
    let policy = FormatPolicy::default();
    let ast = SchemaAst::new().op(SchemaOp::AlterTable(
        TableDef::new("users").drop_column("age"),
    ));
    let err = SchemaCompiler::new(&SqliteDialect, &policy)
        .compile(&ast)
        .expect_err("sqlite cannot drop columns");
    assert!(matches!(err, QuarryError::Compile(_)));
}

// ============================================================================
// Drop and rename
// ============================================================================

#[test]
fn test_drop_table_per_dialect() {
    let ast = SchemaAst::new().op(SchemaOp::DropTable("users".to_string()));
    assert_eq!(compile(&PostgresDialect, &ast)[0].sql, "drop table \"users\"");
    assert_eq!(compile(&MssqlDialect, &ast)[0].sql, "DROP TABLE [users]");

    let if_exists = SchemaAst::new().op(SchemaOp::DropTableIfExists("users".to_string()));
    assert_eq!(
        compile(&PostgresDialect, &if_exists)[0].sql,
        "drop table if exists \"users\""
    );
    assert_eq!(
        compile(&MssqlDialect, &if_exists)[0].sql,
        "if object_id('[users]', 'U') is not null DROP TABLE [users]"
    );
}

#[test]
fn test_drop_table_schema_qualified() {
    let ast = SchemaAst::new()
        .with_schema("app")
        .op(SchemaOp::DropTable("users".to_string()));
    assert_eq!(
        compile(&PostgresDialect, &ast)[0].sql,
        "drop table \"app\".\"users\""
    );
}

#[test]
fn test_rename_table_per_dialect() {
    let ast = SchemaAst::new().op(SchemaOp::RenameTable {
        from: "users".to_string(),
        to: "people".to_string(),
    });
    assert_eq!(
        compile(&PostgresDialect, &ast)[0].sql,
        "alter table \"users\" rename to \"people\""
    );
    assert_eq!(
        compile(&MysqlDialect, &ast)[0].sql,
        "rename table `users` to `people`"
    );
    let mssql = compile(&MssqlDialect, &ast);
    assert_eq!(mssql[0].sql, "exec sp_rename ?, ?");
    assert_eq!(
        mssql[0].bindings,
        vec![
            Value::Text("users".to_string()),
            Value::Text("people".to_string())
        ]
    );
}

// ============================================================================
// Sequencing
// ============================================================================

#[test]
fn test_operations_compile_in_order() {
    let ast = SchemaAst::new()
        .op(SchemaOp::DropTableIfExists("users".to_string()))
        .op(SchemaOp::CreateTable(
            TableDef::new("users").column(ColumnDef::increments()),
        ))
        .op(SchemaOp::Raw(Raw::new("analyze users")));
    let stmts = compile(&PostgresDialect, &ast);
    assert_eq!(stmts.len(), 3);
    assert_eq!(stmts[0].sql, "drop table if exists \"users\"");
    assert_eq!(stmts[2].sql, "analyze users");
    assert!(stmts.iter().all(|s| s.method == Method::Ddl));
}
