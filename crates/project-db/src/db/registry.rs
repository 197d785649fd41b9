//! Declarative base: the registry root for mapped models.
//!
//! Models register their [`TableDef`] with a [`Base`]; the base then owns
//! schema-wide operations such as creating or dropping every registered
//! table and rendering INSERTs for model instances.

use std::collections::HashSet;

use super::engine::Engine;
use super::model::{quote_identifier, validate_identifier, Model, TableDef};
use super::value::Statement;
use crate::error::{DbError, DbResult};

/// Registry of table-mapped models.
#[derive(Debug, Clone, Default)]
pub struct Base {
    schema: Option<String>,
    tables: Vec<TableDef>,
}

impl Base {
    /// A base whose tables live in the connection's default search path.
    pub fn new() -> Self {
        Self::default()
    }

    /// A base whose tables are qualified with `schema`.
    pub fn with_schema(schema: impl Into<String>) -> DbResult<Self> {
        let schema = schema.into();
        validate_identifier(&schema)?;
        Ok(Self {
            schema: Some(schema),
            tables: Vec::new(),
        })
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Register a model's table.
    pub fn register<M: Model>(&mut self) -> DbResult<&TableDef> {
        self.register_table(M::table_def())
    }

    /// Register a table definition directly.
    pub fn register_table(&mut self, table: TableDef) -> DbResult<&TableDef> {
        table.validate()?;

        if self.contains(&table.name) {
            return Err(DbError::Registry(format!(
                "table '{}' is already registered",
                table.name
            )));
        }

        tracing::debug!(table = %table.name, columns = table.columns.len(), "Registered table");
        self.tables.push(table);
        Ok(&self.tables[self.tables.len() - 1])
    }

    /// Registered tables in registration order.
    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    /// Quoted table name, prefixed with the base's schema if any.
    pub fn qualified_name(&self, table: &str) -> String {
        match self.schema {
            Some(ref schema) => format!("{}.{}", quote_identifier(schema), quote_identifier(table)),
            None => quote_identifier(table),
        }
    }

    /// Render an INSERT for a model instance.
    ///
    /// Placeholders are cast to the declared column type so NULLs bind into
    /// any column.
    pub fn insert_statement<M: Model>(&self, model: &M) -> DbResult<Statement> {
        let name = M::table_def().name;
        let table = self.table(&name).ok_or_else(|| {
            DbError::Registry(format!("table '{}' is not registered", name))
        })?;

        let values = model.values();
        if values.is_empty() {
            return Ok(Statement::new(format!(
                "INSERT INTO {} DEFAULT VALUES",
                self.qualified_name(&table.name)
            )));
        }

        let mut seen = HashSet::new();
        let mut columns: Vec<String> = Vec::with_capacity(values.len());
        let mut placeholders = Vec::with_capacity(values.len());
        let mut statement = Statement::new(String::new());

        for (idx, (column_name, value)) in values.into_iter().enumerate() {
            let column = table.get_column(column_name).ok_or_else(|| {
                DbError::Model(format!(
                    "unknown column '{}' on table '{}'",
                    column_name, table.name
                ))
            })?;
            if !seen.insert(column_name) {
                return Err(DbError::Model(format!(
                    "column '{}' given twice for table '{}'",
                    column_name, table.name
                )));
            }

            columns.push(quote_identifier(&column.name));
            placeholders.push(format!("${}::{}", idx + 1, column.column_type.cast()));
            statement.params.push(value);
        }

        statement.sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.qualified_name(&table.name),
            columns.join(", "),
            placeholders.join(", ")
        );

        Ok(statement)
    }

    /// DDL creating the schema (if any) and every registered table.
    pub fn create_all_sql(&self) -> Vec<String> {
        let mut statements = Vec::with_capacity(self.tables.len() + 1);
        if let Some(ref schema) = self.schema {
            statements.push(format!(
                "CREATE SCHEMA IF NOT EXISTS {}",
                quote_identifier(schema)
            ));
        }
        statements.extend(
            self.tables
                .iter()
                .map(|t| t.create_sql(&self.qualified_name(&t.name))),
        );
        statements
    }

    /// DDL dropping every registered table, newest first.
    pub fn drop_all_sql(&self) -> Vec<String> {
        self.tables
            .iter()
            .rev()
            .map(|t| format!("DROP TABLE IF EXISTS {}", self.qualified_name(&t.name)))
            .collect()
    }

    /// Create every registered table in a single transaction.
    pub async fn create_all(&self, engine: &Engine) -> DbResult<()> {
        self.run_ddl(engine, self.create_all_sql()).await?;
        tracing::info!(tables = self.tables.len(), "Created registered tables");
        Ok(())
    }

    /// Drop every registered table in a single transaction.
    pub async fn drop_all(&self, engine: &Engine) -> DbResult<()> {
        self.run_ddl(engine, self.drop_all_sql()).await?;
        tracing::info!(tables = self.tables.len(), "Dropped registered tables");
        Ok(())
    }

    async fn run_ddl(&self, engine: &Engine, statements: Vec<String>) -> DbResult<()> {
        let mut tx = engine.begin().await?;
        for sql in &statements {
            tracing::debug!(sql = %sql, "Executing DDL");
            sqlx::query(sql).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
