//! Table and column definitions for declaratively mapped models.
//!
//! A model describes its table once through [`Model::table_def`] and hands
//! out the values of a single row through [`Model::values`]. The registry in
//! [`crate::db::registry`] turns those descriptions into DDL and INSERTs.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use super::value::SqlValue;
use crate::error::{DbError, DbResult};

/// PostgreSQL truncates identifiers beyond this many bytes.
const MAX_IDENTIFIER_LEN: usize = 63;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// Check that `name` is usable as a table, column or schema name.
pub fn validate_identifier(name: &str) -> DbResult<()> {
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(DbError::Model(format!(
            "identifier '{}' exceeds {} bytes",
            name, MAX_IDENTIFIER_LEN
        )));
    }
    if !IDENTIFIER.is_match(name) {
        return Err(DbError::Model(format!("invalid identifier '{}'", name)));
    }
    Ok(())
}

/// Double-quote an identifier so reserved words such as `user` stay usable.
///
/// Callers validate first; validated names never contain `"`.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name)
}

/// Column types understood by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    /// Auto-incrementing 64-bit key
    BigSerial,
    BigInt,
    Integer,
    Double,
    Boolean,
    Text,
    /// `TIMESTAMPTZ`
    Timestamp,
    /// `JSONB`
    Json,
    Uuid,
}

impl ColumnType {
    /// Type as written in `CREATE TABLE`.
    pub fn ddl(&self) -> &'static str {
        match self {
            ColumnType::BigSerial => "BIGSERIAL",
            other => other.cast(),
        }
    }

    /// Type used to cast bind placeholders in INSERTs.
    pub fn cast(&self) -> &'static str {
        match self {
            ColumnType::BigSerial | ColumnType::BigInt => "BIGINT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Double => "DOUBLE PRECISION",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Text => "TEXT",
            ColumnType::Timestamp => "TIMESTAMPTZ",
            ColumnType::Json => "JSONB",
            ColumnType::Uuid => "UUID",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ddl())
    }
}

/// A single column of a mapped table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
    /// Raw SQL default expression, e.g. `now()`
    pub default: Option<String>,
}

impl ColumnDef {
    /// A nullable column with no constraints.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            primary_key: false,
            unique: false,
            default: None,
        }
    }

    /// Mark as primary key (implies NOT NULL).
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_sql(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    fn ddl(&self) -> String {
        let mut sql = format!("{} {}", quote_identifier(&self.name), self.column_type.ddl());
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        } else if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if self.unique && !self.primary_key {
            sql.push_str(" UNIQUE");
        }
        if let Some(ref expr) = self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(expr);
        }
        sql
    }
}

/// Definition of a mapped table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Look up a column by name.
    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> Vec<&ColumnDef> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }

    /// Validate identifiers and column uniqueness.
    pub fn validate(&self) -> DbResult<()> {
        validate_identifier(&self.name)?;

        if self.columns.is_empty() {
            return Err(DbError::Model(format!(
                "table '{}' declares no columns",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            validate_identifier(&column.name)?;
            if !seen.insert(column.name.as_str()) {
                return Err(DbError::Model(format!(
                    "duplicate column '{}' on table '{}'",
                    column.name, self.name
                )));
            }
        }

        Ok(())
    }

    /// Render `CREATE TABLE IF NOT EXISTS` for an already quoted `qualified_name`.
    pub(crate) fn create_sql(&self, qualified_name: &str) -> String {
        let columns: Vec<String> = self.columns.iter().map(ColumnDef::ddl).collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            qualified_name,
            columns.join(",\n    ")
        )
    }
}

/// A type mapped onto a database table.
///
/// # Example
///
/// ```ignore
/// struct Project { id: Option<i64>, name: String }
///
/// impl Model for Project {
///     fn table_def() -> TableDef {
///         TableDef::new("projects")
///             .column(ColumnDef::new("id", ColumnType::BigSerial).primary_key())
///             .column(ColumnDef::new("name", ColumnType::Text).not_null())
///     }
///
///     fn values(&self) -> Vec<(&'static str, SqlValue)> {
///         let mut values = vec![("name", self.name.clone().into())];
///         if let Some(id) = self.id {
///             values.push(("id", id.into()));
///         }
///         values
///     }
/// }
/// ```
pub trait Model: Send + Sync {
    /// Table this model maps to.
    fn table_def() -> TableDef;

    /// Column values to insert for this instance. Columns left out fall back
    /// to their database defaults.
    fn values(&self) -> Vec<(&'static str, SqlValue)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("projects").is_ok());
        assert!(validate_identifier("_audit_log2").is_ok());
        assert!(validate_identifier("2fast").is_err());
        assert!(validate_identifier("drop table;").is_err());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_reserved_words_are_quoted() {
        assert!(validate_identifier("user").is_ok());
        assert_eq!(quote_identifier("user"), r#""user""#);

        let order = ColumnDef::new("order", ColumnType::Integer).not_null();
        assert_eq!(order.ddl(), r#""order" INTEGER NOT NULL"#);
    }

    #[test]
    fn test_column_ddl() {
        let id = ColumnDef::new("id", ColumnType::BigSerial).primary_key();
        assert_eq!(id.ddl(), r#""id" BIGSERIAL PRIMARY KEY"#);

        let created = ColumnDef::new("created_at", ColumnType::Timestamp)
            .not_null()
            .default_sql("now()");
        assert_eq!(
            created.ddl(),
            r#""created_at" TIMESTAMPTZ NOT NULL DEFAULT now()"#
        );

        let email = ColumnDef::new("email", ColumnType::Text).unique();
        assert_eq!(email.ddl(), r#""email" TEXT UNIQUE"#);
    }

    #[test]
    fn test_table_rejects_duplicate_columns() {
        let table = TableDef::new("projects")
            .column(ColumnDef::new("name", ColumnType::Text))
            .column(ColumnDef::new("name", ColumnType::Text));

        let err = table.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate column 'name'"));
    }

    #[test]
    fn test_table_requires_columns() {
        assert!(TableDef::new("empty").validate().is_err());
    }

    #[test]
    fn test_create_sql() {
        let table = TableDef::new("projects")
            .column(ColumnDef::new("id", ColumnType::BigSerial).primary_key())
            .column(ColumnDef::new("meta", ColumnType::Json));

        assert_eq!(
            table.create_sql(r#""public"."projects""#),
            "CREATE TABLE IF NOT EXISTS \"public\".\"projects\" (\n    \"id\" BIGSERIAL PRIMARY KEY,\n    \"meta\" JSONB\n)"
        );
        assert_eq!(table.primary_key().len(), 1);
    }
}
