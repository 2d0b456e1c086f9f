use anyhow::Result;
use querytree::catalog::{Catalog, Column, DataType, Table};
use querytree::query::ast::{
    ColumnReference, Expression, FromItem, JoinClause, JoinConstraint, JoinType, SelectColumn, TableReference,
};
use querytree::query::planner::{Attribute, JoinCondition, JoinKind, NodeKind, PlanError, QueryTreeBuilder};

#[path = "../common/mod.rs"]
mod common;
use common::*;

#[test]
fn test_aliases_qualify_columns() -> Result<()> {
    let catalog = create_test_catalog()?;
    let statement = with_where(
        select(
            vec![SelectColumn::Aliased { column: ColumnReference::bare("x"), alias: "ax".to_string() }],
            vec![aliased_table("a", "t")],
        ),
        Expression::eq(Expression::Column(ColumnReference::bare("id")), int(3)),
    );

    let tree = QueryTreeBuilder::new(&catalog).build(&statement)?;
    let root = tree.node(tree.root().expect("root"))?;
    assert_eq!(root.kind, NodeKind::Project);
    assert!(root.owns_relation("t"));
    assert_eq!(root.attributes, vec![Attribute::new("t", "x").with_alias("ax").with_ordinal(0)]);
    assert_eq!(tree.to_query_string()?, "SELECT t.x AS ax FROM a AS t WHERE t.id = 3");
    Ok(())
}

#[test]
fn test_self_join_needs_aliases() -> Result<()> {
    let catalog = create_test_catalog()?;
    let statement = with_where(
        select(vec![select_col("p", "x")], vec![aliased_table("a", "p"), aliased_table("a", "q")]),
        Expression::eq(col("p", "id"), col("q", "x")),
    );

    let tree = QueryTreeBuilder::new(&catalog).build(&statement)?;
    let root = tree.node(tree.root().expect("root"))?;
    assert_eq!(root.kind, NodeKind::Restrict);
    let join = tree.node(root.left().expect("join"))?;
    assert_eq!(join.relation(0).map(|r| r.name()), Some("p"));
    assert_eq!(join.relation(1).map(|r| r.name()), Some("q"));
    Ok(())
}

#[test]
fn test_join_clauses_build_left_deep_chain() -> Result<()> {
    let catalog = create_test_catalog()?;
    let mut statement = select(vec![SelectColumn::Wildcard], vec![table("a")]);
    statement.joins.push(JoinClause {
        join_type: JoinType::Inner,
        item: table("b"),
        constraint: JoinConstraint::On(Expression::eq(col("a", "id"), col("b", "a_id"))),
    });
    statement.joins.push(JoinClause {
        join_type: JoinType::RightOuter,
        item: table("c"),
        constraint: JoinConstraint::Using(vec!["id".to_string()]),
    });

    let tree = QueryTreeBuilder::new(&catalog).build(&statement)?;
    let root = tree.node(tree.root().expect("root"))?;
    assert_eq!(root.kind, NodeKind::Project);

    let upper = tree.node(root.left().expect("upper join"))?;
    assert_eq!(upper.join_kind, JoinKind::RightOuter);
    assert_eq!(upper.join_condition, JoinCondition::Using);
    assert_eq!(upper.relation(1).map(|r| r.name()), Some("c"));

    let lower = tree.node(upper.left().expect("lower join"))?;
    assert_eq!(lower.join_kind, JoinKind::Inner);
    assert_eq!(lower.join_condition, JoinCondition::On);

    assert_eq!(
        tree.to_query_string()?,
        "SELECT * FROM a INNER JOIN b ON a.id = b.a_id RIGHT OUTER JOIN c USING (id)"
    );
    tree.check_invariants()?;
    Ok(())
}

#[test]
fn test_natural_join() -> Result<()> {
    let catalog = create_test_catalog()?;
    let mut statement = select(vec![SelectColumn::Wildcard], vec![table("b")]);
    statement.joins.push(JoinClause {
        join_type: JoinType::Inner,
        item: table("c"),
        constraint: JoinConstraint::Natural,
    });

    let tree = QueryTreeBuilder::new(&catalog).build(&statement)?;
    assert_eq!(tree.to_query_string()?, "SELECT * FROM b NATURAL INNER JOIN c");
    Ok(())
}

#[test]
fn test_order_by_adds_sort_root() -> Result<()> {
    let catalog = create_test_catalog()?;
    let mut statement = select(vec![select_col("c", "z")], vec![table("c")]);
    statement.order_by.push(ColumnReference::bare("id"));

    let tree = QueryTreeBuilder::new(&catalog).build(&statement)?;
    let root = tree.node(tree.root().expect("root"))?;
    assert_eq!(root.kind, NodeKind::Sort);
    assert_eq!(root.attributes, vec![Attribute::new("c", "id")]);
    assert_eq!(tree.to_query_string()?, "SELECT c.z FROM c ORDER BY c.id");
    Ok(())
}

#[test]
fn test_relations_resolve_in_named_database() -> Result<()> {
    let mut catalog = Catalog::new();
    catalog.create_schema("shop".to_string()).map_err(anyhow::Error::msg)?;
    catalog
        .create_table_in(
            "shop",
            Table::new(
                "orders".to_string(),
                vec![Column::new("total".to_string(), DataType::Float)],
            ),
        )
        .map_err(anyhow::Error::msg)?;

    let statement = select(
        vec![SelectColumn::Column(ColumnReference::bare("total"))],
        vec![FromItem::Table(TableReference {
            name: "orders".to_string(),
            alias: None,
            database: Some("shop".to_string()),
        })],
    );
    let tree = QueryTreeBuilder::new(&catalog).build(&statement)?;
    assert_eq!(tree.to_query_string()?, "SELECT orders.total FROM shop.orders");

    let unqualified = select(vec![SelectColumn::Wildcard], vec![table("orders")]);
    assert!(QueryTreeBuilder::new(&catalog).build(&unqualified).is_err());
    let tree = QueryTreeBuilder::new(&catalog).with_database("shop").build(&unqualified)?;
    assert_eq!(tree.database(), Some("shop"));
    Ok(())
}

#[test]
fn test_rejected_statements() -> Result<()> {
    let catalog = create_test_catalog()?;

    let no_from = select(vec![SelectColumn::Wildcard], Vec::new());
    assert!(matches!(
        QueryTreeBuilder::new(&catalog).build(&no_from),
        Err(PlanError::UnsupportedStatement(_))
    ));

    let mut inner = select(vec![select_col("b", "y")], vec![table("b")]);
    inner.distinct = true;
    let nested_distinct = select(vec![SelectColumn::Wildcard], vec![FromItem::Subquery(Box::new(inner))]);
    assert!(matches!(
        QueryTreeBuilder::new(&catalog).build(&nested_distinct),
        Err(PlanError::UnsupportedStatement(_))
    ));

    let ambiguous = select(vec![SelectColumn::Column(ColumnReference::bare("id"))], vec![table("a"), table("c")]);
    assert!(matches!(
        QueryTreeBuilder::new(&catalog).build(&ambiguous),
        Err(PlanError::AmbiguousColumn(_))
    ));

    let unknown_qualifier = select(vec![select_col("zz", "x")], vec![table("a")]);
    assert!(matches!(
        QueryTreeBuilder::new(&catalog).build(&unknown_qualifier),
        Err(PlanError::UnresolvableRelation(_))
    ));
    Ok(())
}
