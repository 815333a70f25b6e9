//! Dialect-neutral schema operations
//!
//! An upgrade step is an ordered list of [`Operation`]s. The three structured
//! shapes cover what calendar store upgrades do most often: add a nullable
//! (optionally foreign-key) column, create an index, and set a value in a
//! name/value configuration table. Anything else travels as [`Operation::Raw`]
//! and is passed to the database untouched.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    AddColumn(AddColumn),
    CreateIndex(CreateIndex),
    UpsertSingleton(UpsertSingleton),
    Raw { sql: String },
}

impl Operation {
    pub fn raw(sql: impl Into<String>) -> Self {
        Operation::Raw { sql: sql.into() }
    }

    /// Short human-readable summary used in plans and logs
    pub fn summary(&self) -> String {
        match self {
            Operation::AddColumn(op) => format!("add column {}.{}", op.table, op.column),
            Operation::CreateIndex(op) => format!(
                "create {}index {} on {}({})",
                if op.unique { "unique " } else { "" },
                op.name,
                op.table,
                op.columns.join(", ")
            ),
            Operation::UpsertSingleton(op) => format!(
                "set {}.{} = '{}' where {} = '{}'",
                op.table, op.value_column, op.value, op.key_column, op.key
            ),
            Operation::Raw { sql } => format!("raw: {}", sql.trim()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Text,
    Varchar(u32),
    Timestamp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    #[default]
    NoAction,
    Cascade,
    SetNull,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    pub table: String,
    /// Referenced column; `None` refers to the primary key
    pub column: Option<String>,
    pub on_delete: OnDelete,
}

/// Add a nullable column defaulting to NULL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddColumn {
    pub table: String,
    pub column: String,
    pub column_type: ColumnType,
    pub references: Option<ForeignKey>,
}

impl AddColumn {
    pub fn new(table: impl Into<String>, column: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            column_type,
            references: None,
        }
    }

    pub fn references(mut self, table: impl Into<String>, on_delete: OnDelete) -> Self {
        self.references = Some(ForeignKey {
            table: table.into(),
            column: None,
            on_delete,
        });
        self
    }
}

impl From<AddColumn> for Operation {
    fn from(op: AddColumn) -> Self {
        Operation::AddColumn(op)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateIndex {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl CreateIndex {
    pub fn new(name: impl Into<String>, table: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

impl From<CreateIndex> for Operation {
    fn from(op: CreateIndex) -> Self {
        Operation::CreateIndex(op)
    }
}

/// Set the value of a single row in a name/value table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpsertSingleton {
    pub table: String,
    pub key_column: String,
    pub key: String,
    pub value_column: String,
    pub value: String,
}

impl UpsertSingleton {
    /// Row in a `NAME`/`VALUE` table, the layout calendar store control tables use
    pub fn name_value(table: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key_column: "NAME".to_string(),
            key: key.into(),
            value_column: "VALUE".to_string(),
            value: value.into(),
        }
    }
}

impl From<UpsertSingleton> for Operation {
    fn from(op: UpsertSingleton) -> Self {
        Operation::UpsertSingleton(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summaries() {
        let add: Operation = AddColumn::new("CALENDAR_HOME_METADATA", "DEFAULT_POLLS", ColumnType::Integer)
            .references("CALENDAR", OnDelete::SetNull)
            .into();
        assert_eq!(add.summary(), "add column CALENDAR_HOME_METADATA.DEFAULT_POLLS");

        let index: Operation = CreateIndex::new("IDX_A", "T", &["A", "B"]).unique().into();
        assert_eq!(index.summary(), "create unique index IDX_A on T(A, B)");

        let upsert: Operation = UpsertSingleton::name_value("CALENDARSERVER", "VERSION", "29").into();
        assert_eq!(
            upsert.summary(),
            "set CALENDARSERVER.VALUE = '29' where NAME = 'VERSION'"
        );

        assert_eq!(Operation::raw("  DROP TABLE X  ").summary(), "raw: DROP TABLE X");
    }

    #[test]
    fn test_serialize_tagged() {
        let op: Operation = CreateIndex::new("IDX_A", "T", &["A"]).into();
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["kind"], "create_index");
        assert_eq!(json["name"], "IDX_A");
    }
}
