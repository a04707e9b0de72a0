//! Schema document parsing into a column model.
//!
//! A schema document is a root element holding one record per column:
//!
//! ```xml
//! <DocumentElement>
//!   <Students>
//!     <COLUMN_NAME>StudentID</COLUMN_NAME>
//!     <DATA_TYPE>int</DATA_TYPE>
//!     <IS_NULLABLE>NO</IS_NULLABLE>
//!     <IS_PRIMARY_KEY>true</IS_PRIMARY_KEY>
//!     <IS_FOREIGN_KEY>false</IS_FOREIGN_KEY>
//!   </Students>
//! </DocumentElement>
//! ```

mod types;

pub use types::*;

use crate::error::Result;
use crate::typemap::map_logical_type;
use crate::xml::{XmlDocument, XmlElement};
use std::path::Path;
use tracing::{debug, warn};

const COLUMN_NAME: &str = "COLUMN_NAME";
const DATA_TYPE: &str = "DATA_TYPE";
const IS_NULLABLE: &str = "IS_NULLABLE";
const IS_PRIMARY_KEY: &str = "IS_PRIMARY_KEY";
const IS_FOREIGN_KEY: &str = "IS_FOREIGN_KEY";
const FOREIGN_KEY_TABLE: &str = "FOREIGN_KEY_TABLE";
const FOREIGN_KEY_COLUMN: &str = "FOREIGN_KEY_COLUMN";

impl ColumnModel {
    /// Load a column model from a schema document on disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let doc = XmlDocument::load(path)?;
        Ok(Self::from_document(&doc))
    }

    /// Parse a column model from schema document text.
    pub fn from_xml(content: &str) -> Result<Self> {
        let doc = XmlDocument::parse(content)?;
        Ok(Self::from_document(&doc))
    }

    /// Build a column model from a parsed schema document.
    ///
    /// Missing fields read as empty strings; records without a column name
    /// are skipped.
    pub fn from_document(doc: &XmlDocument) -> Self {
        let mut columns = Vec::with_capacity(doc.records().len());

        for record in doc.records() {
            match column_from_record(record) {
                Some(column) => {
                    debug!(
                        "Column {}: {:?}, nullable={}, pk={}, fk={:?}",
                        column.name,
                        column.logical_type,
                        column.nullable,
                        column.primary_key,
                        column.foreign_key
                    );
                    columns.push(column);
                }
                None => warn!(
                    "Skipping <{}> in {}: empty {}",
                    record.name(),
                    doc.origin(),
                    COLUMN_NAME
                ),
            }
        }

        Self::new(columns)
    }
}

fn column_from_record(record: &XmlElement) -> Option<ColumnDescriptor> {
    let name = field(record, COLUMN_NAME);
    if name.is_empty() {
        return None;
    }

    let foreign_key = if is_literal(&field(record, IS_FOREIGN_KEY), "true") {
        Some(ForeignKeyRef {
            table: field(record, FOREIGN_KEY_TABLE),
            column: field(record, FOREIGN_KEY_COLUMN),
        })
    } else {
        None
    };

    Some(ColumnDescriptor {
        name,
        logical_type: map_logical_type(&field(record, DATA_TYPE)),
        nullable: !is_literal(&field(record, IS_NULLABLE), "no"),
        primary_key: is_literal(&field(record, IS_PRIMARY_KEY), "true"),
        foreign_key,
    })
}

fn field(record: &XmlElement, name: &str) -> String {
    record.child_text(name).trim().to_string()
}

fn is_literal(value: &str, literal: &str) -> bool {
    value.eq_ignore_ascii_case(literal)
}
