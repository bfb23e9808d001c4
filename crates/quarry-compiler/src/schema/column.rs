//! Column definitions and their compilation to `name type modifiers`
//! fragments. The abstract kinds map to concrete type names through the
//! dialect's `ddl_column_type` hook; the base map here is the fallback for
//! dialects that do not diverge.

use quarry_core::{QuarryError, Result, Value};

use crate::ast::SqlValue;
use crate::dialect::SqlDialect;
use crate::formatter::Formatter;

/// Abstract column type, resolved to a dialect type name at compile time.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    Increments,
    BigIncrements,
    Integer,
    BigInteger,
    SmallInt,
    TinyInt,
    VarChar(Option<u32>),
    Text,
    Float,
    Double,
    Decimal(Option<(u32, u32)>),
    Bool,
    Date,
    Time,
    DateTime,
    Timestamp,
    Binary,
    Enum(Vec<String>),
    Json,
    Jsonb,
    Uuid,
    Bit(Option<u32>),
    /// Verbatim type name for anything the abstract set does not cover.
    Custom(String),
}

impl ColumnKind {
    pub fn is_increments(&self) -> bool {
        matches!(self, ColumnKind::Increments | ColumnKind::BigIncrements)
    }
}

/// One column of a create or alter operation.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ColumnKind,
    /// `Some(true)` renders `null`, `Some(false)` renders `not null`,
    /// `None` leaves the dialect default.
    pub nullable: Option<bool>,
    pub default: Option<SqlValue>,
    pub unsigned: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: None,
            default: None,
            unsigned: false,
        }
    }

    /// Auto-increment primary key with the conventional `id` name.
    pub fn increments() -> Self {
        Self::new("id", ColumnKind::Increments)
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = Some(true);
        self
    }

    pub fn not_nullable(mut self) -> Self {
        self.nullable = Some(false);
        self
    }

    pub fn default_to(mut self, value: impl Into<SqlValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }
}

/// Compiles column definitions for one dialect.
pub struct ColumnCompiler<'a> {
    dialect: &'a dyn SqlDialect,
}

impl<'a> ColumnCompiler<'a> {
    pub fn new(dialect: &'a dyn SqlDialect) -> Self {
        Self { dialect }
    }

    /// Render `wrapped_name type modifiers`. Auto-increment kinds already
    /// carry their key and nullability in the type name and reject the
    /// explicit modifiers.
    pub fn compile(&self, fmt: &Formatter<'_>, column: &ColumnDef) -> Result<String> {
        let type_name = self.dialect.ddl_column_type(fmt, &column.name, &column.kind);
        let mut sql = format!("{} {}", fmt.wrap(&column.name), type_name);

        if column.kind.is_increments() {
            if column.nullable == Some(true) || column.default.is_some() {
                return Err(QuarryError::Compile(format!(
                    "column \"{}\" is an auto-increment key and cannot take nullable or default modifiers",
                    column.name
                )));
            }
            return Ok(sql);
        }

        if column.unsigned {
            if self.dialect.ddl_supports_unsigned() {
                sql.push_str(" unsigned");
            } else {
                tracing::warn!(
                    dialect = self.dialect.name(),
                    column = %column.name,
                    "unsigned modifier is not supported by this dialect"
                );
            }
        }
        match column.nullable {
            Some(false) => sql.push_str(" not null"),
            Some(true) => sql.push_str(" null"),
            None => {}
        }
        if let Some(default) = &column.default {
            if self.dialect.ddl_skips_default_for(&type_name) {
                tracing::warn!(
                    dialect = self.dialect.name(),
                    column = %column.name,
                    %type_name,
                    "default values are not supported on this column type"
                );
            } else {
                sql.push_str(" default ");
                sql.push_str(&self.default_value(default));
            }
        }
        Ok(sql)
    }

    /// Inline rendering of a default value. Booleans quote as '0'/'1' so the
    /// same literal works on backends that store them as bits.
    fn default_value(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Raw(raw) => raw.sql.clone(),
            SqlValue::Value(Value::Null) => "null".to_string(),
            SqlValue::Value(Value::Bool(b)) => if *b { "'1'" } else { "'0'" }.to_string(),
            SqlValue::Value(v) => self.dialect.escape_value(v),
        }
    }
}

/// Dialect-neutral type map, used by every dialect for the kinds it does not
/// override.
pub fn base_column_type(fmt: &Formatter<'_>, column: &str, kind: &ColumnKind) -> String {
    let _ = (fmt, column);
    match kind {
        ColumnKind::Increments | ColumnKind::BigIncrements => {
            "integer not null primary key autoincrement".to_string()
        }
        ColumnKind::Integer => "integer".to_string(),
        ColumnKind::BigInteger => "bigint".to_string(),
        ColumnKind::SmallInt => "smallint".to_string(),
        ColumnKind::TinyInt => "tinyint".to_string(),
        ColumnKind::VarChar(length) => format!("varchar({})", length.unwrap_or(255)),
        ColumnKind::Text => "text".to_string(),
        ColumnKind::Float | ColumnKind::Double => "float".to_string(),
        ColumnKind::Decimal(precision) => {
            let (p, s) = precision.unwrap_or((8, 2));
            format!("decimal({}, {})", p, s)
        }
        ColumnKind::Bool => "boolean".to_string(),
        ColumnKind::Date => "date".to_string(),
        ColumnKind::Time => "time".to_string(),
        ColumnKind::DateTime => "datetime".to_string(),
        ColumnKind::Timestamp => "timestamp".to_string(),
        ColumnKind::Binary => "blob".to_string(),
        ColumnKind::Enum(_) => "varchar(100)".to_string(),
        ColumnKind::Json | ColumnKind::Jsonb | ColumnKind::Bit(_) => "text".to_string(),
        ColumnKind::Uuid => "char(36)".to_string(),
        ColumnKind::Custom(type_name) => type_name.clone(),
    }
}

/// `'a', 'b', 'c'` list body for enum check constraints and enum types.
pub(crate) fn quoted_list(allowed: &[String]) -> String {
    allowed
        .iter()
        .map(|v| format!("'{}'", v.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(", ")
}
