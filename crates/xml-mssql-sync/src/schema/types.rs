//! Column model types.

use crate::typemap::{map_storage_type, LogicalType, StorageType};
use serde::{Deserialize, Serialize};

/// Foreign key target of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    /// Referenced table name.
    pub table: String,

    /// Referenced column name.
    pub column: String,
}

/// Column metadata derived from one schema record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,

    /// Declared logical type.
    pub logical_type: LogicalType,

    /// Whether the column allows NULL.
    pub nullable: bool,

    /// Whether the column is the table's primary key.
    pub primary_key: bool,

    /// Foreign key target, when the column is a foreign key.
    pub foreign_key: Option<ForeignKeyRef>,
}

impl ColumnDescriptor {
    /// Nullable, non-key column of the given type.
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            nullable: true,
            primary_key: false,
            foreign_key: None,
        }
    }

    /// Mark the column as the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark the column as NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Attach a foreign key reference.
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key = Some(ForeignKeyRef {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    /// Whether NULL is acceptable for this column. Primary keys never are.
    pub fn accepts_null(&self) -> bool {
        self.nullable && !self.primary_key
    }

    /// Column type emitted in DDL.
    pub fn storage_type(&self) -> StorageType {
        map_storage_type(self.logical_type, self.primary_key)
    }
}

/// Ordered column set of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnModel {
    columns: Vec<ColumnDescriptor>,
}

impl ColumnModel {
    pub fn new(columns: Vec<ColumnDescriptor>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column names in model order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// The first column flagged as primary key.
    pub fn primary_key(&self) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Table naming convention for a synchronization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableNaming {
    /// Physical table carries the configured name.
    #[default]
    Bare,
    /// Physical table is `<name>_clone`.
    Clone,
}

impl TableNaming {
    /// Physical table name for a logical table name.
    pub fn physical_name(&self, table: &str) -> String {
        match self {
            TableNaming::Bare => table.to_string(),
            TableNaming::Clone => format!("{}_clone", table),
        }
    }
}

/// A table to synchronize: its name, columns, and physical naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    /// Logical (configured) table name.
    pub table: String,

    /// Column model built from the schema document.
    pub model: ColumnModel,

    /// Naming convention applied to the physical table.
    pub naming: TableNaming,
}

impl SyncTarget {
    pub fn new(table: impl Into<String>, model: ColumnModel, naming: TableNaming) -> Self {
        Self {
            table: table.into(),
            model,
            naming,
        }
    }

    /// Name of the table as it exists in the database.
    pub fn physical_name(&self) -> String {
        self.naming.physical_name(&self.table)
    }

    /// Primary key column name, the match key for update-vs-insert.
    pub fn primary_key(&self) -> Option<&str> {
        self.model.primary_key().map(|c| c.name.as_str())
    }

    /// Stored procedure used by the bulk strategy.
    pub fn procedure_name(&self) -> String {
        format!("fullSync_{}", self.physical_name())
    }

    /// Table-valued parameter type used by the bulk strategy, one per table.
    ///
    /// A `fullSync_` procedure declared over a shared `dbo.CustomTableType`
    /// does not accept this type. Drop such a procedure so the next bulk run
    /// recreates it.
    pub fn table_type_name(&self) -> String {
        format!("CustomTableType_{}", self.table)
    }
}
