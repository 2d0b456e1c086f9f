use anyhow::Result;
use querytree::query::ast::{Expression, FromItem, JoinClause, JoinConstraint, JoinType, SelectColumn, Value};
use querytree::query::planner::{
    heuristic_optimize, ChildSide, HeuristicOptimizer, JoinCondition, JoinKind, NodeKind, OptimizerConfig,
    QueryTree, QueryTreeBuilder, RelationRef,
};

#[path = "../common/mod.rs"]
mod common;
use common::*;

fn text(value: &str) -> Expression {
    Expression::Literal(Value::String(value.to_string()))
}

#[test]
fn test_join_predicate_becomes_on_condition() -> Result<()> {
    let catalog = create_test_catalog()?;
    let mut tree = QueryTree::new();
    let mut join = tree.new_node(NodeKind::Join);
    join.join_kind = JoinKind::Inner;
    join.join_predicate = Some(Expression::eq(col("a", "x"), col("b", "y")));
    let join = tree.insert_node(None, ChildSide::Root, join)?;
    tree.insert_relation(join, RelationRef::new("a"))?;
    tree.insert_relation(join, RelationRef::new("b"))?;

    heuristic_optimize(&mut tree, &catalog)?;

    let node = tree.node(join)?;
    assert_eq!(node.join_condition, JoinCondition::On);
    assert_eq!(node.join_kind, JoinKind::Inner);
    assert_eq!(node.relation_count(), 0);

    let left = tree.node(node.left().expect("left operand"))?;
    let right = tree.node(node.right().expect("right operand"))?;
    assert_eq!(left.kind, NodeKind::Project);
    assert!(left.owns_relation("a"));
    assert_eq!(right.kind, NodeKind::Project);
    assert!(right.owns_relation("b"));

    assert_eq!(tree.to_query_string()?, "SELECT * FROM a INNER JOIN b ON a.x = b.y");
    Ok(())
}

#[test]
fn test_conjunctive_restriction_splits_across_join() -> Result<()> {
    let catalog = create_test_catalog()?;
    let mut tree = QueryTree::new();
    let mut restrict = tree.new_node(NodeKind::Restrict);
    restrict.predicate = Some(Expression::and(
        Expression::eq(col("a", "x"), int(5)),
        Expression::eq(col("b", "y"), int(3)),
    ));
    let restrict = tree.insert_node(None, ChildSide::Root, restrict)?;
    let join = tree.new_node(NodeKind::Join);
    let join = tree.insert_node(Some(restrict), ChildSide::Left, join)?;
    tree.insert_relation(join, RelationRef::new("a"))?;
    tree.insert_relation(join, RelationRef::new("b"))?;

    heuristic_optimize(&mut tree, &catalog)?;

    // The emptied root restriction is pruned away
    assert!(!tree.contains(restrict));
    assert_eq!(tree.root(), Some(join));

    let join_node = tree.node(join)?;
    let left = tree.node(join_node.left().expect("left operand"))?;
    assert!(left.owns_relation("a"));
    assert_eq!(left.predicate.as_ref().map(|p| p.to_string()), Some("a.x = 5".to_string()));
    let right = tree.node(join_node.right().expect("right operand"))?;
    assert!(right.owns_relation("b"));
    assert_eq!(right.predicate.as_ref().map(|p| p.to_string()), Some("b.y = 3".to_string()));
    tree.check_invariants()?;
    Ok(())
}

#[test]
fn test_empty_project_under_join_is_pruned() -> Result<()> {
    let catalog = create_test_catalog()?;
    let mut tree = QueryTree::new();
    let mut join = tree.new_node(NodeKind::Join);
    join.join_kind = JoinKind::CrossProduct;
    let join = tree.insert_node(None, ChildSide::Root, join)?;
    let empty = tree.new_node(NodeKind::Project);
    let empty = tree.insert_node(Some(join), ChildSide::Left, empty)?;
    let mut leaf = tree.new_node(NodeKind::Restrict);
    leaf.predicate = Some(Expression::eq(col("a", "x"), int(1)));
    let leaf = tree.insert_node(Some(empty), ChildSide::Left, leaf)?;
    tree.insert_relation(leaf, RelationRef::new("a"))?;
    let mut right = tree.new_node(NodeKind::Project);
    right.add_relation(RelationRef::new("b"))?;
    tree.insert_node(Some(join), ChildSide::Right, right)?;

    heuristic_optimize(&mut tree, &catalog)?;

    assert!(!tree.contains(empty));
    assert_eq!(tree.node(join)?.left(), Some(leaf));
    assert_eq!(tree.node(leaf)?.parent(), Some(join));
    assert_eq!(tree.node(leaf)?.side(), ChildSide::Left);
    Ok(())
}

#[test]
fn test_distinct_statement_gets_distinct_root() -> Result<()> {
    let catalog = create_test_catalog()?;
    let mut statement = with_where(
        select(vec![select_col("a", "x"), select_col("b", "y")], vec![table("a"), table("b")]),
        Expression::eq(col("a", "id"), col("b", "a_id")),
    );
    statement.distinct = true;
    let mut tree = QueryTreeBuilder::new(&catalog).build(&statement)?;

    heuristic_optimize(&mut tree, &catalog)?;

    let root_id = tree.root().expect("root");
    let root = tree.node(root_id)?;
    assert_eq!(root.kind, NodeKind::Distinct);
    assert_eq!(root.child_count(), 1);
    let previous_root = tree.node(root.left().expect("wrapped root"))?;
    assert_eq!(previous_root.kind, NodeKind::Join);
    assert_eq!(previous_root.parent(), Some(root_id));
    assert_eq!(
        tree.to_query_string()?,
        "SELECT DISTINCT a.x, b.y FROM a INNER JOIN b ON a.id = b.a_id"
    );
    Ok(())
}

#[test]
fn test_subquery_boundary_is_respected() -> Result<()> {
    let catalog = create_test_catalog()?;
    let inner = select(vec![select_col("b", "y")], vec![table("b")]);
    let statement = with_where(
        select(vec![SelectColumn::Wildcard], vec![table("a"), FromItem::Subquery(Box::new(inner))]),
        Expression::and(
            Expression::eq(col("a", "x"), int(1)),
            Expression::eq(Expression::Column(querytree::query::ast::ColumnReference::bare("y")), int(2)),
        ),
    );
    let mut tree = QueryTreeBuilder::new(&catalog).build(&statement)?;

    heuristic_optimize(&mut tree, &catalog)?;

    let subquery = tree.find_subquery(tree.root().expect("root")).expect("subquery root");
    let subquery_node = tree.node(subquery)?;
    assert!(subquery_node.predicate.is_none());
    assert!(subquery_node.owns_relation("b"));
    assert_eq!(
        tree.to_query_string()?,
        "SELECT * FROM a CROSS JOIN (SELECT b.y FROM b) WHERE y = 2 AND a.x = 1"
    );
    tree.check_invariants()?;
    Ok(())
}

#[test]
fn test_three_way_cross_product_becomes_join_chain() -> Result<()> {
    let catalog = create_test_catalog()?;
    let predicate = Expression::and(
        Expression::eq(col("a", "id"), col("b", "a_id")),
        Expression::and(
            Expression::eq(col("b", "id"), col("c", "b_id")),
            Expression::eq(col("c", "z"), text("k")),
        ),
    );
    let statement = with_where(select(vec![select_col("a", "x")], vec![table("a"), table("b"), table("c")]), predicate);
    let mut tree = QueryTreeBuilder::new(&catalog).build(&statement)?;

    heuristic_optimize(&mut tree, &catalog)?;

    assert_eq!(
        tree.to_query_string()?,
        "SELECT a.x FROM a INNER JOIN b ON a.id = b.a_id INNER JOIN c ON b.id = c.b_id WHERE c.z = 'k'"
    );
    let root = tree.node(tree.root().expect("root"))?;
    assert_eq!(root.kind, NodeKind::Join);
    assert!(tree.has_hidden_attributes());
    tree.check_invariants()?;
    Ok(())
}

#[test]
fn test_filter_stays_above_outer_join() -> Result<()> {
    let catalog = create_test_catalog()?;
    let mut statement = select(vec![SelectColumn::Wildcard], vec![table("a")]);
    statement.joins.push(JoinClause {
        join_type: JoinType::LeftOuter,
        item: table("b"),
        constraint: JoinConstraint::On(Expression::eq(col("a", "id"), col("b", "a_id"))),
    });
    let statement = with_where(
        statement,
        Expression::and(Expression::eq(col("b", "y"), int(1)), Expression::eq(col("a", "x"), int(2))),
    );
    let mut tree = QueryTreeBuilder::new(&catalog).build(&statement)?;

    heuristic_optimize(&mut tree, &catalog)?;

    let root = tree.node(tree.root().expect("root"))?;
    assert_eq!(root.kind, NodeKind::Restrict);
    assert_eq!(root.predicate.as_ref().map(|p| p.to_string()), Some("b.y = 1".to_string()));
    assert_eq!(
        tree.to_query_string()?,
        "SELECT * FROM a LEFT OUTER JOIN b ON a.id = b.a_id WHERE b.y = 1 AND a.x = 2"
    );
    Ok(())
}

#[test]
fn test_disabled_pruning_keeps_empty_nodes() -> Result<()> {
    let catalog = create_test_catalog()?;
    let statement = with_where(
        select(vec![select_col("a", "x")], vec![table("a"), table("b")]),
        Expression::eq(col("a", "id"), col("b", "a_id")),
    );

    let mut pruned = QueryTreeBuilder::new(&catalog).build(&statement)?;
    heuristic_optimize(&mut pruned, &catalog)?;

    let mut unpruned = QueryTreeBuilder::new(&catalog).build(&statement)?;
    let config = OptimizerConfig { prune: false, ..OptimizerConfig::default() };
    HeuristicOptimizer::with_config(&catalog, config).optimize(&mut unpruned)?;

    assert!(unpruned.node_count() > pruned.node_count());
    assert_eq!(unpruned.to_query_string()?, pruned.to_query_string()?);
    Ok(())
}

#[test]
fn test_optimizing_twice_changes_nothing() -> Result<()> {
    let catalog = create_test_catalog()?;
    let statement = with_where(
        select(vec![select_col("b", "y")], vec![table("a"), table("b")]),
        Expression::and(
            Expression::eq(col("a", "id"), col("b", "a_id")),
            Expression::eq(col("a", "x"), int(7)),
        ),
    );
    let mut tree = QueryTreeBuilder::new(&catalog).build(&statement)?;
    heuristic_optimize(&mut tree, &catalog)?;
    let plan = tree.to_string();

    heuristic_optimize(&mut tree, &catalog)?;
    assert_eq!(tree.to_string(), plan);
    assert!(tree.heuristically_optimized());
    assert!(!tree.is_optimized());
    Ok(())
}

#[test]
fn test_natural_join_keeps_its_condition() -> Result<()> {
    let catalog = create_test_catalog()?;
    let mut statement = with_where(
        select(vec![SelectColumn::Wildcard], vec![table("b")]),
        Expression::eq(col("b", "y"), col("c", "b_id")),
    );
    statement.joins.push(JoinClause {
        join_type: JoinType::Inner,
        item: table("c"),
        constraint: JoinConstraint::Natural,
    });
    let mut tree = QueryTreeBuilder::new(&catalog).build(&statement)?;

    heuristic_optimize(&mut tree, &catalog)?;

    let conditions: Vec<JoinCondition> = tree
        .nodes()
        .filter(|n| n.kind == NodeKind::Join)
        .map(|n| n.join_condition)
        .collect();
    assert_eq!(conditions, vec![JoinCondition::Natural]);
    assert_eq!(tree.to_query_string()?, "SELECT * FROM b NATURAL INNER JOIN c WHERE b.y = c.b_id");
    tree.check_invariants()?;
    Ok(())
}

#[test]
fn test_where_equality_extends_on_condition() -> Result<()> {
    let catalog = create_test_catalog()?;
    let mut statement = with_where(
        select(vec![SelectColumn::Wildcard], vec![table("a")]),
        Expression::eq(col("a", "x"), col("b", "y")),
    );
    statement.joins.push(JoinClause {
        join_type: JoinType::Inner,
        item: table("b"),
        constraint: JoinConstraint::On(Expression::eq(col("a", "id"), col("b", "a_id"))),
    });
    let mut tree = QueryTreeBuilder::new(&catalog).build(&statement)?;

    heuristic_optimize(&mut tree, &catalog)?;

    assert_eq!(
        tree.to_query_string()?,
        "SELECT * FROM a INNER JOIN b ON a.id = b.a_id AND a.x = b.y"
    );
    let root = tree.node(tree.root().expect("root"))?;
    assert_eq!(root.kind, NodeKind::Join);
    Ok(())
}

#[test]
fn test_repeated_select_columns_survive_optimization() -> Result<()> {
    let catalog = create_test_catalog()?;
    let statement = with_where(
        select(
            vec![select_col("a", "x"), select_col("a", "x"), select_col("b", "y")],
            vec![table("a"), table("b")],
        ),
        Expression::eq(col("a", "id"), col("b", "a_id")),
    );
    let mut tree = QueryTreeBuilder::new(&catalog).build(&statement)?;
    assert_eq!(
        tree.to_query_string()?,
        "SELECT a.x, a.x, b.y FROM a CROSS JOIN b WHERE a.id = b.a_id"
    );

    heuristic_optimize(&mut tree, &catalog)?;

    assert_eq!(
        tree.to_query_string()?,
        "SELECT a.x, a.x, b.y FROM a INNER JOIN b ON a.id = b.a_id"
    );
    Ok(())
}
