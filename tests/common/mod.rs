#![allow(dead_code)]

use anyhow::Result;
use querytree::catalog::{Catalog, Column, DataType, Table};
use querytree::query::ast::{
    ColumnReference, Expression, FromItem, SelectColumn, SelectStatement, TableReference, Value,
};

fn column(name: &str, data_type: DataType) -> Column {
    Column::new(name.to_string(), data_type)
}

// Catalog with three chained tables: a <- b <- c
pub fn create_test_catalog() -> Result<Catalog> {
    let mut catalog = Catalog::new();
    catalog
        .create_table(Table::new(
            "a".to_string(),
            vec![column("id", DataType::Integer), column("x", DataType::Integer)],
        ))
        .map_err(anyhow::Error::msg)?;
    catalog
        .create_table(Table::new(
            "b".to_string(),
            vec![
                column("id", DataType::Integer),
                column("a_id", DataType::Integer),
                column("y", DataType::Integer),
            ],
        ))
        .map_err(anyhow::Error::msg)?;
    catalog
        .create_table(Table::new(
            "c".to_string(),
            vec![
                column("id", DataType::Integer),
                column("b_id", DataType::Integer),
                column("z", DataType::Text),
            ],
        ))
        .map_err(anyhow::Error::msg)?;
    Ok(catalog)
}

pub fn table(name: &str) -> FromItem {
    FromItem::Table(TableReference { name: name.to_string(), alias: None, database: None })
}

pub fn aliased_table(name: &str, alias: &str) -> FromItem {
    FromItem::Table(TableReference {
        name: name.to_string(),
        alias: Some(alias.to_string()),
        database: None,
    })
}

pub fn col(table: &str, name: &str) -> Expression {
    Expression::column(table, name)
}

pub fn int(value: i64) -> Expression {
    Expression::Literal(Value::Integer(value))
}

pub fn select_col(table: &str, name: &str) -> SelectColumn {
    SelectColumn::Column(ColumnReference::qualified(table, name))
}

pub fn select(columns: Vec<SelectColumn>, from: Vec<FromItem>) -> SelectStatement {
    SelectStatement {
        distinct: false,
        columns,
        from,
        joins: Vec::new(),
        where_clause: None,
        order_by: Vec::new(),
    }
}

pub fn with_where(mut statement: SelectStatement, predicate: Expression) -> SelectStatement {
    statement.where_clause = Some(Box::new(predicate));
    statement
}
