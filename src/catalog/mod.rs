//! Catalog Management Module
//!
//! This module holds the table and column metadata the query tree resolves
//! relation handles against. Relations are looked up by schema (database)
//! and table name; the optimizer only ever reads from the catalog.

pub mod schema;
pub mod table;
pub mod column;

// Re-export key types
pub use self::schema::{DataType, Schema};
pub use self::table::Table;
pub use self::column::Column;

use std::collections::HashMap;

use crate::query::planner::error::{PlanError, PlanResult};
use crate::query::planner::node::RelationRef;

/// Name of the schema every catalog starts with
pub const DEFAULT_SCHEMA: &str = "public";

/// The Catalog is the central repository for all schema information
#[derive(Debug, Clone)]
pub struct Catalog {
    /// Schemas in the database
    schemas: HashMap<String, Schema>,
    /// Current schema name
    current_schema: String,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// Create a new catalog containing only the default schema
    pub fn new() -> Self {
        let mut schemas = HashMap::new();
        schemas.insert(DEFAULT_SCHEMA.to_string(), Schema::new(DEFAULT_SCHEMA.to_string()));

        Catalog {
            schemas,
            current_schema: DEFAULT_SCHEMA.to_string(),
        }
    }

    /// Get a schema by name
    pub fn get_schema(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    /// Name of the current schema
    pub fn current_schema(&self) -> &str {
        &self.current_schema
    }

    /// Create a new schema
    pub fn create_schema(&mut self, name: String) -> Result<(), String> {
        if self.schemas.contains_key(&name) {
            return Err(format!("Schema {} already exists", name));
        }

        let schema = Schema::new(name.clone());
        self.schemas.insert(name, schema);
        Ok(())
    }

    /// Create a table in the current schema
    pub fn create_table(&mut self, table: Table) -> Result<(), String> {
        let schema_name = self.current_schema.clone();
        self.create_table_in(&schema_name, table)
    }

    /// Create a table in a named schema
    pub fn create_table_in(&mut self, schema_name: &str, table: Table) -> Result<(), String> {
        match self.schemas.get_mut(schema_name) {
            Some(schema) => schema.add_table(table),
            None => Err(format!("Schema {} does not exist", schema_name)),
        }
    }

    /// Get a table from a named schema
    pub fn get_table_in(&self, schema_name: &str, table_name: &str) -> Option<&Table> {
        self.schemas.get(schema_name).and_then(|s| s.get_table(table_name))
    }

    /// Resolve a relation handle to its table definition.
    ///
    /// The relation's own database wins, then the query's default database,
    /// then the current schema.
    pub fn resolve(&self, relation: &RelationRef, default_database: Option<&str>) -> PlanResult<&Table> {
        let schema_name = relation
            .database()
            .or(default_database)
            .unwrap_or(&self.current_schema);

        self.get_table_in(schema_name, relation.table())
            .ok_or_else(|| PlanError::UnresolvableRelation(format!("{}.{}", schema_name, relation.table())))
    }
}
