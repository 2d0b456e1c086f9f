use anyhow::Result;
use querytree::query::ast::{Expression, Value};
use querytree::query::planner::{
    heuristic_optimize, to_query_string, ChildSide, JoinCondition, JoinKind, NodeKind, PlanError, QueryTree,
    QueryTreeBuilder, RelationRef,
};

#[path = "../common/mod.rs"]
mod common;
use common::*;

#[test]
fn test_rendering_is_stable_across_optimization() -> Result<()> {
    let catalog = create_test_catalog()?;
    let statement = with_where(
        select(vec![select_col("a", "x")], vec![table("a")]),
        Expression::eq(col("a", "x"), int(1)),
    );
    let mut tree = QueryTreeBuilder::new(&catalog).build(&statement)?;
    let before = tree.to_query_string()?;
    assert_eq!(before, "SELECT a.x FROM a WHERE a.x = 1");

    heuristic_optimize(&mut tree, &catalog)?;
    assert_eq!(tree.to_query_string()?, before);
    assert_eq!(tree.node_count(), 1);
    Ok(())
}

#[test]
fn test_literals_and_precedence() -> Result<()> {
    let catalog = create_test_catalog()?;
    let predicate = Expression::and(
        Expression::or(Expression::eq(col("c", "id"), int(1)), Expression::eq(col("c", "id"), int(2))),
        Expression::eq(col("c", "z"), Expression::Literal(Value::String("it's".to_string()))),
    );
    let statement = with_where(select(vec![select_col("c", "z")], vec![table("c")]), predicate);
    let tree = QueryTreeBuilder::new(&catalog).build(&statement)?;

    assert_eq!(
        to_query_string(&tree)?,
        "SELECT c.z FROM c WHERE (c.id = 1 OR c.id = 2) AND c.z = 'it''s'"
    );
    Ok(())
}

#[test]
fn test_right_nested_join_is_parenthesized() -> Result<()> {
    let mut tree = QueryTree::new();
    let mut outer = tree.new_node(NodeKind::Join);
    outer.join_kind = JoinKind::CrossProduct;
    let outer = tree.insert_node(None, ChildSide::Root, outer)?;
    tree.insert_relation(outer, RelationRef::new("a"))?;

    let mut inner = tree.new_node(NodeKind::Join);
    inner.join_kind = JoinKind::Inner;
    inner.join_condition = JoinCondition::On;
    inner.join_predicate = Some(Expression::eq(col("b", "id"), col("c", "b_id")));
    let inner = tree.insert_node(Some(outer), ChildSide::Right, inner)?;
    tree.insert_relation(inner, RelationRef::new("b"))?;
    tree.insert_relation(inner, RelationRef::new("c"))?;

    assert_eq!(
        tree.to_query_string()?,
        "SELECT * FROM a CROSS JOIN (b INNER JOIN c ON b.id = c.b_id)"
    );
    Ok(())
}

#[test]
fn test_set_operations_use_their_keyword() -> Result<()> {
    let mut tree = QueryTree::new();
    let mut union = tree.new_node(NodeKind::Join);
    union.join_kind = JoinKind::Union;
    let union = tree.insert_node(None, ChildSide::Root, union)?;
    tree.insert_relation(union, RelationRef::new("a"))?;
    tree.insert_relation(union, RelationRef::new("b"))?;

    assert_eq!(tree.to_query_string()?, "SELECT * FROM a UNION b");
    Ok(())
}

#[test]
fn test_broken_trees_fail_to_render() -> Result<()> {
    let empty = QueryTree::new();
    assert!(matches!(
        empty.to_query_string(),
        Err(PlanError::StructuralInvariantViolation(_))
    ));

    let mut half_join = QueryTree::new();
    let join = half_join.new_node(NodeKind::Join);
    let join = half_join.insert_node(None, ChildSide::Root, join)?;
    half_join.insert_relation(join, RelationRef::new("a"))?;
    assert!(matches!(
        half_join.to_query_string(),
        Err(PlanError::StructuralInvariantViolation(_))
    ));
    Ok(())
}

#[test]
fn test_plan_display_lists_every_node() -> Result<()> {
    let catalog = create_test_catalog()?;
    let statement = with_where(
        select(vec![select_col("a", "x")], vec![table("a"), table("b")]),
        Expression::eq(col("a", "id"), col("b", "a_id")),
    );
    let mut tree = QueryTreeBuilder::new(&catalog).build(&statement)?;
    heuristic_optimize(&mut tree, &catalog)?;

    let plan = tree.to_string();
    assert_eq!(plan.lines().count(), tree.node_count());
    assert!(plan.starts_with("Join["), "{}", plan);
    assert!(plan.contains("Inner/On"), "{}", plan);
    assert!(plan.contains("join=(a.id = b.a_id)"), "{}", plan);
    assert!(plan.contains("[a.id]"), "{}", plan);
    Ok(())
}
