//! MySQL dialect (also serves the mysql2 and MariaDB drivers)

use quarry_core::{DriverError, Method, Result, Statement, Value};

use crate::dialects::{INFO_SCHEMA_UPPER, information_schema_output};
use crate::dialect::SqlDialect;
use crate::formatter::Formatter;
use crate::schema::column::quoted_list;
use crate::schema::{ColumnKind, TableDef, base_column_type};

/// MySQL error number raised when rolling back to a savepoint that a DDL
/// statement already implicitly committed away.
const ER_SP_DOES_NOT_EXIST: &str = "1305";

pub struct MysqlDialect;

impl SqlDialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn driver_name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn column_info(
        &self,
        fmt: &mut Formatter<'_>,
        table: &str,
        _schema: Option<&str>,
        database: &str,
        column: Option<String>,
    ) -> Result<Statement> {
        let table = fmt.policy().apply_wrap_hook(table);
        Ok(Statement::new(
            "select * from information_schema.columns where table_name = ? and table_schema = ?",
            vec![Value::Text(table), Value::Text(database.to_string())],
            Method::ColumnInfo,
        )?
        .with_output(information_schema_output(column, &INFO_SCHEMA_UPPER)))
    }

    fn ddl_column_type(&self, fmt: &Formatter<'_>, column: &str, kind: &ColumnKind) -> String {
        match kind {
            ColumnKind::Increments => "int unsigned not null auto_increment primary key".to_string(),
            ColumnKind::BigIncrements => {
                "bigint unsigned not null auto_increment primary key".to_string()
            }
            ColumnKind::Integer => "int".to_string(),
            ColumnKind::Double => "double".to_string(),
            ColumnKind::Enum(allowed) => format!("enum({})", quoted_list(allowed)),
            ColumnKind::DateTime => "datetime".to_string(),
            ColumnKind::Timestamp => "timestamp".to_string(),
            ColumnKind::Bit(length) => match length {
                Some(n) => format!("bit({})", n),
                None => "bit".to_string(),
            },
            ColumnKind::Binary => "blob".to_string(),
            ColumnKind::Json | ColumnKind::Jsonb => "json".to_string(),
            _ => base_column_type(fmt, column, kind),
        }
    }

    fn ddl_supports_unsigned(&self) -> bool {
        true
    }

    // defaults on text and blob columns are rejected by the server
    fn ddl_skips_default_for(&self, type_name: &str) -> bool {
        type_name == "blob" || type_name.contains("text")
    }

    fn create_table_suffix(&self, table: &TableDef) -> String {
        let mut suffix = String::new();
        if let Some(engine) = &table.engine {
            suffix.push_str(&format!(" engine = {}", engine));
        }
        if let Some(charset) = &table.charset {
            suffix.push_str(&format!(" default character set {}", charset));
        }
        if let Some(collation) = &table.collation {
            suffix.push_str(&format!(" collate '{}'", collation));
        }
        suffix
    }

    fn rename_table_statement(
        &self,
        fmt: &Formatter<'_>,
        from: &str,
        to: &str,
    ) -> Result<Statement> {
        Statement::new(
            format!("rename table {} to {}", fmt.wrap(from), fmt.wrap(to)),
            Vec::new(),
            Method::Ddl,
        )
    }

    fn add_primary_key_sql(&self, table: &str, _constraint: &str, columns: &str) -> String {
        format!("alter table {} add primary key ({})", table, columns)
    }

    fn add_unique_sql(&self, table: &str, index: &str, columns: &str) -> String {
        format!("alter table {} add unique {}({})", table, index, columns)
    }

    fn is_implicit_commit_error(&self, err: &DriverError) -> bool {
        err.code.as_deref() == Some(ER_SP_DOES_NOT_EXIST)
    }

    fn can_cancel_query(&self) -> bool {
        true
    }

    fn kill_query_statement(&self, session_id: i64) -> Result<Option<Statement>> {
        Ok(Some(Statement::new(
            "KILL QUERY ?",
            vec![Value::Int(session_id)],
            Method::Raw,
        )?))
    }
}
