// Schema Management Module
//
// A schema is a named collection of tables. The query tree calls it the
// "database" a relation belongs to. Table names are matched ignoring ASCII
// case, like column names.

use std::collections::HashMap;
use super::table::Table;
use serde::{Serialize, Deserialize};

/// Data types a column can be declared with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Float,
    Text,
    Boolean,
    Date,
    Timestamp,
    Blob,
}

/// Represents a database schema, which is a collection of tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    /// Schema name
    name: String,
    /// Tables in this schema, keyed by lowercased table name
    tables: HashMap<String, Table>,
}

impl Schema {
    /// Create a new, empty schema
    pub fn new(name: String) -> Self {
        Schema {
            name,
            tables: HashMap::new(),
        }
    }

    /// Add a table to the schema
    pub(crate) fn add_table(&mut self, table: Table) -> Result<(), String> {
        let key = table.name().to_ascii_lowercase();

        if self.tables.contains_key(&key) {
            return Err(format!("Table {} already exists in schema {}", table.name(), self.name));
        }

        self.tables.insert(key, table);
        Ok(())
    }

    /// Get a table by name
    pub fn get_table(&self, table_name: &str) -> Option<&Table> {
        self.tables.get(&table_name.to_ascii_lowercase())
    }
}
