//! Table-level DDL compilation: column lists, primary keys, foreign keys,
//! indexes. Creates emit one `create table` statement followed by constraint
//! statements; dialects that only know inline constraints fold primary and
//! foreign keys into the create parentheses instead.

use quarry_core::{QuarryError, Result, Statement};

use crate::dialect::{SqlDialect, qualified_table};
use crate::formatter::{FormatPolicy, Formatter};
use crate::schema::column::{ColumnCompiler, ColumnDef};
use crate::schema::{kw, push_ddl};

/// Named key or index over a set of columns. `name` falls back to the
/// `table_columns_type` convention.
#[derive(Debug, Clone)]
pub struct KeySpec {
    pub columns: Vec<String>,
    pub name: Option<String>,
}

impl KeySpec {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ForeignKey {
    pub columns: Vec<String>,
    pub in_table: String,
    pub references: Vec<String>,
    pub on_update: Option<String>,
    pub on_delete: Option<String>,
    pub name: Option<String>,
}

impl ForeignKey {
    pub fn new(columns: Vec<String>, in_table: impl Into<String>, references: Vec<String>) -> Self {
        Self {
            columns,
            in_table: in_table.into(),
            references,
            on_update: None,
            on_delete: None,
            name: None,
        }
    }

    pub fn on_update(mut self, action: impl Into<String>) -> Self {
        self.on_update = Some(action.into());
        self
    }

    pub fn on_delete(mut self, action: impl Into<String>) -> Self {
        self.on_delete = Some(action.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Everything one create or alter operation says about a table.
#[derive(Debug, Clone, Default)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub drop_columns: Vec<String>,
    pub primary_key: Option<KeySpec>,
    pub uniques: Vec<KeySpec>,
    pub indexes: Vec<KeySpec>,
    pub foreign_keys: Vec<ForeignKey>,
    pub engine: Option<String>,
    pub charset: Option<String>,
    pub collation: Option<String>,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn drop_column(mut self, name: impl Into<String>) -> Self {
        self.drop_columns.push(name.into());
        self
    }

    pub fn primary(mut self, columns: Vec<String>) -> Self {
        self.primary_key = Some(KeySpec::new(columns));
        self
    }

    pub fn unique(mut self, key: KeySpec) -> Self {
        self.uniques.push(key);
        self
    }

    pub fn index(mut self, key: KeySpec) -> Self {
        self.indexes.push(key);
        self
    }

    pub fn foreign(mut self, key: ForeignKey) -> Self {
        self.foreign_keys.push(key);
        self
    }

    pub fn engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    pub fn collation(mut self, collation: impl Into<String>) -> Self {
        self.collation = Some(collation.into());
        self
    }
}

pub struct TableCompiler<'a> {
    dialect: &'a dyn SqlDialect,
    policy: &'a FormatPolicy,
    schema: Option<&'a str>,
    table: &'a TableDef,
    sequence: Vec<Statement>,
}

impl<'a> TableCompiler<'a> {
    pub fn new(
        dialect: &'a dyn SqlDialect,
        policy: &'a FormatPolicy,
        schema: Option<&'a str>,
        table: &'a TableDef,
    ) -> Self {
        Self {
            dialect,
            policy,
            schema,
            table,
            sequence: Vec::new(),
        }
    }

    fn formatter(&self) -> Formatter<'a> {
        Formatter::new(self.dialect, self.policy)
    }

    /// Schema-qualified, wrapped table reference.
    fn table_name(&self) -> String {
        self.formatter()
            .wrap(&qualified_table(&self.table.name, self.schema))
    }

    fn push_query(&mut self, sql: String) -> Result<()> {
        push_ddl(&mut self.sequence, sql)
    }

    pub fn create(mut self, if_not_exists: bool) -> Result<Vec<Statement>> {
        let fmt = self.formatter();
        let columns = ColumnCompiler::new(self.dialect);
        let mut items = self
            .table
            .columns
            .iter()
            .map(|c| columns.compile(&fmt, c))
            .collect::<Result<Vec<_>>>()?;

        let inline = self.dialect.ddl_inline_constraints();
        if inline {
            if let Some(pk) = &self.table.primary_key {
                items.push(format!(
                    "{} ({})",
                    kw(self.dialect, "primary key"),
                    fmt.columnize(&pk.columns)
                ));
            }
            for fk in &self.table.foreign_keys {
                items.push(self.foreign_fragment(&fmt, fk, false));
            }
        }

        let verb = if if_not_exists {
            kw(self.dialect, "create table if not exists ")
        } else {
            kw(self.dialect, "create table ")
        };
        let sql = format!(
            "{}{} ({}){}",
            verb,
            self.table_name(),
            items.join(", "),
            self.dialect.create_table_suffix(self.table)
        );
        self.push_query(sql)?;

        if !inline {
            self.push_primary_key()?;
            self.push_foreign_keys()?;
        }
        self.push_uniques_and_indexes()?;
        Ok(self.sequence)
    }

    pub fn alter(mut self) -> Result<Vec<Statement>> {
        let fmt = self.formatter();
        let columns = ColumnCompiler::new(self.dialect);

        if !self.table.columns.is_empty() {
            let adds = self
                .table
                .columns
                .iter()
                .map(|c| Ok(format!("{}{}", kw(self.dialect, "add column "), columns.compile(&fmt, c)?)))
                .collect::<Result<Vec<_>>>()?;
            let sql = format!(
                "{}{} {}",
                kw(self.dialect, "alter table "),
                self.table_name(),
                adds.join(", ")
            );
            self.push_query(sql)?;
        }

        if !self.table.drop_columns.is_empty() {
            if !self.dialect.ddl_supports_drop_column() {
                return Err(QuarryError::Compile(format!(
                    "{} does not support dropping columns from an existing table",
                    self.dialect.name()
                )));
            }
            let drops = self
                .table
                .drop_columns
                .iter()
                .map(|c| format!("{}{}", kw(self.dialect, "drop column "), fmt.wrap(c)))
                .collect::<Vec<_>>();
            let sql = format!(
                "{}{} {}",
                kw(self.dialect, "alter table "),
                self.table_name(),
                drops.join(", ")
            );
            self.push_query(sql)?;
        }

        if self.dialect.ddl_inline_constraints() {
            if self.table.primary_key.is_some() || !self.table.foreign_keys.is_empty() {
                tracing::warn!(
                    dialect = self.dialect.name(),
                    table = %self.table.name,
                    "primary and foreign keys may only be added at create time on this dialect"
                );
            }
        } else {
            self.push_primary_key()?;
            self.push_foreign_keys()?;
        }
        self.push_uniques_and_indexes()?;
        Ok(self.sequence)
    }

    fn push_primary_key(&mut self) -> Result<()> {
        let Some(pk) = &self.table.primary_key else {
            return Ok(());
        };
        let fmt = self.formatter();
        let constraint = match &pk.name {
            Some(name) => fmt.wrap(name),
            None => fmt.wrap(&format!("{}_pkey", self.table.name)),
        };
        let sql = self
            .dialect
            .add_primary_key_sql(&self.table_name(), &constraint, &fmt.columnize(&pk.columns));
        self.push_query(sql)
    }

    // emitted as alter statements even when the table was just created, so
    // the create statement never depends on constraint ordering
    fn push_foreign_keys(&mut self) -> Result<()> {
        for fk in &self.table.foreign_keys {
            let fmt = self.formatter();
            let fragment = self.foreign_fragment(&fmt, fk, true);
            let sql = format!(
                "{}{} {} {}",
                kw(self.dialect, "alter table "),
                self.table_name(),
                kw(self.dialect, "add"),
                fragment
            );
            self.push_query(sql)?;
        }
        Ok(())
    }

    fn push_uniques_and_indexes(&mut self) -> Result<()> {
        for unique in &self.table.uniques {
            let fmt = self.formatter();
            let name = self.index_name(&fmt, "unique", &unique.name, &unique.columns);
            let sql =
                self.dialect
                    .add_unique_sql(&self.table_name(), &name, &fmt.columnize(&unique.columns));
            self.push_query(sql)?;
        }
        for index in &self.table.indexes {
            let fmt = self.formatter();
            let name = self.index_name(&fmt, "index", &index.name, &index.columns);
            let sql =
                self.dialect
                    .create_index_sql(&self.table_name(), &name, &fmt.columnize(&index.columns));
            self.push_query(sql)?;
        }
        Ok(())
    }

    /// `constraint name foreign key (cols) references table (cols)` with the
    /// optional referential actions; inline form (create parentheses) drops
    /// the constraint name.
    fn foreign_fragment(&self, fmt: &Formatter<'_>, fk: &ForeignKey, with_constraint: bool) -> String {
        let mut sql = String::new();
        if with_constraint {
            let name = self.index_name(fmt, "foreign", &fk.name, &fk.columns);
            sql.push_str(&format!("{} {} ", kw(self.dialect, "constraint"), name));
        }
        sql.push_str(&format!(
            "{} ({}) {} {} ({})",
            kw(self.dialect, "foreign key"),
            fmt.columnize(&fk.columns),
            kw(self.dialect, "references"),
            fmt.wrap(&fk.in_table),
            fmt.columnize(&fk.references)
        ));
        if let Some(action) = &fk.on_update {
            sql.push_str(&kw(self.dialect, " on update "));
            sql.push_str(action);
        }
        if let Some(action) = &fk.on_delete {
            sql.push_str(&kw(self.dialect, " on delete "));
            sql.push_str(action);
        }
        sql
    }

    /// Default key naming: `table_columns_type`, lowercased, dots and dashes
    /// folded to underscores.
    fn index_name(
        &self,
        fmt: &Formatter<'_>,
        kind: &str,
        explicit: &Option<String>,
        columns: &[String],
    ) -> String {
        if let Some(name) = explicit {
            return fmt.wrap(name);
        }
        let table = self.table.name.replace(['.', '-'], "_");
        let name = format!("{}_{}_{}", table, columns.join("_"), kind).to_lowercase();
        fmt.wrap(&name)
    }
}
