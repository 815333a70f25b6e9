//! SQL rendering of schema operations per database dialect
//!
//! Only [`Dialect::Sqlite`] is executed by this crate. PostgreSQL and Oracle
//! renderings are used to preview the statements a plan would send to those
//! servers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::operation::{AddColumn, ColumnType, CreateIndex, OnDelete, Operation, UpsertSingleton};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Sqlite,
    Postgres,
    Oracle,
}

impl Dialect {
    pub fn all_names() -> &'static [&'static str] {
        &["sqlite", "postgres", "oracle"]
    }

    /// Whether statements in this dialect can be executed by the bundled driver
    pub fn is_executable(&self) -> bool {
        matches!(self, Dialect::Sqlite)
    }

    pub fn render(&self, operation: &Operation) -> String {
        match operation {
            Operation::AddColumn(op) => self.render_add_column(op),
            Operation::CreateIndex(op) => self.render_create_index(op),
            Operation::UpsertSingleton(op) => self.render_upsert(op),
            Operation::Raw { sql } => sql.clone(),
        }
    }

    fn column_type(&self, column_type: ColumnType) -> String {
        match (self, column_type) {
            (_, ColumnType::Integer) => "INTEGER".to_string(),
            (Dialect::Oracle, ColumnType::Text) => "NCLOB".to_string(),
            (_, ColumnType::Text) => "TEXT".to_string(),
            (Dialect::Oracle, ColumnType::Varchar(n)) => format!("NVARCHAR2({})", n),
            (_, ColumnType::Varchar(n)) => format!("VARCHAR({})", n),
            (Dialect::Sqlite, ColumnType::Timestamp) => "TIMESTAMP".to_string(),
            (_, ColumnType::Timestamp) => "TIMESTAMP(6)".to_string(),
        }
    }

    fn render_add_column(&self, op: &AddColumn) -> String {
        let mut definition = format!(
            "{} {} DEFAULT NULL",
            op.column,
            self.column_type(op.column_type)
        );

        if let Some(fk) = &op.references {
            definition.push_str(" REFERENCES ");
            definition.push_str(&fk.table);
            if let Some(column) = &fk.column {
                definition.push_str(&format!("({})", column));
            }
            match fk.on_delete {
                OnDelete::NoAction => {}
                OnDelete::Cascade => definition.push_str(" ON DELETE CASCADE"),
                OnDelete::SetNull => definition.push_str(" ON DELETE SET NULL"),
            }
        }

        match self {
            Dialect::Oracle => format!("ALTER TABLE {} ADD ({})", op.table, definition),
            Dialect::Sqlite | Dialect::Postgres => {
                format!("ALTER TABLE {} ADD COLUMN {}", op.table, definition)
            }
        }
    }

    fn render_create_index(&self, op: &CreateIndex) -> String {
        format!(
            "CREATE {}INDEX {} ON {}({})",
            if op.unique { "UNIQUE " } else { "" },
            op.name,
            op.table,
            op.columns.join(", ")
        )
    }

    fn render_upsert(&self, op: &UpsertSingleton) -> String {
        let key = quote_literal(&op.key);
        let value = quote_literal(&op.value);
        match self {
            Dialect::Sqlite | Dialect::Postgres => format!(
                "INSERT INTO {table} ({k}, {v}) VALUES ({key}, {value}) \
                 ON CONFLICT ({k}) DO UPDATE SET {v} = excluded.{v}",
                table = op.table,
                k = op.key_column,
                v = op.value_column,
                key = key,
                value = value,
            ),
            Dialect::Oracle => format!(
                "MERGE INTO {table} dst USING (SELECT {key} AS {k}, {value} AS {v} FROM dual) src \
                 ON (dst.{k} = src.{k}) \
                 WHEN MATCHED THEN UPDATE SET dst.{v} = src.{v} \
                 WHEN NOT MATCHED THEN INSERT ({k}, {v}) VALUES (src.{k}, src.{v})",
                table = op.table,
                k = op.key_column,
                v = op.value_column,
                key = key,
                value = value,
            ),
        }
    }
}

/// Quote a string as a SQL literal, doubling embedded single quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Sqlite => write!(f, "sqlite"),
            Dialect::Postgres => write!(f, "postgres"),
            Dialect::Oracle => write!(f, "oracle"),
        }
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "oracle" => Ok(Dialect::Oracle),
            _ => Err(format!(
                "Unknown dialect '{}'. Valid dialects: {}",
                s,
                Self::all_names().join(", ")
            )),
        }
    }
}
