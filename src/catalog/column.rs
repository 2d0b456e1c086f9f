// Column Management Module
//
// This module defines the Column type that represents a table column.

use super::schema::DataType;
use serde::{Serialize, Deserialize};

/// Represents a column in a database table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    name: String,
    /// Declared data type
    data_type: DataType,
}

impl Column {
    /// Create a new column
    pub fn new(name: String, data_type: DataType) -> Self {
        Column { name, data_type }
    }

    /// Get the column name
    pub fn name(&self) -> &str {
        &self.name
    }
}
