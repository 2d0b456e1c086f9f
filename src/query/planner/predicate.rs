// Predicate Helpers
//
// Field reference extraction, conjunct splitting and rebuilding, and the
// per-relation reduction used when a filter is pushed onto the node that
// owns one relation.

use crate::query::ast::{ColumnReference, Expression, Operator};

use super::error::{PlanError, PlanResult};

/// Every column reference in `expr`, in left-to-right order
pub fn field_references(expr: &Expression) -> Vec<ColumnReference> {
    let mut refs = Vec::new();
    collect_field_references(expr, &mut refs);
    refs
}

fn collect_field_references(expr: &Expression, refs: &mut Vec<ColumnReference>) {
    match expr {
        Expression::Column(col_ref) => refs.push(col_ref.clone()),
        Expression::BinaryOp { left, right, .. } => {
            collect_field_references(left, refs);
            collect_field_references(right, refs);
        }
        Expression::UnaryOp { expr: sub_expr, .. } | Expression::IsNull { expr: sub_expr, .. } => {
            collect_field_references(sub_expr, refs);
        }
        Expression::Function { args, .. } => {
            for arg in args {
                collect_field_references(arg, refs);
            }
        }
        Expression::Literal(_) => {}
    }
}

/// Distinct relation qualifiers used by `expr`, in order of first use.
/// Unqualified columns are ignored.
pub fn referenced_relations(expr: &Expression) -> Vec<String> {
    let mut relations: Vec<String> = Vec::new();
    for col_ref in field_references(expr) {
        if let Some(table) = col_ref.table {
            if !relations.contains(&table) {
                relations.push(table);
            }
        }
    }
    relations
}

/// Whether any column in `expr` lacks a relation qualifier
pub fn has_unqualified_columns(expr: &Expression) -> bool {
    field_references(expr).iter().any(|c| c.table.is_none())
}

/// Whether `expr` contains an OR anywhere
pub fn contains_disjunction(expr: &Expression) -> bool {
    match expr {
        Expression::BinaryOp { op: Operator::Or, .. } => true,
        Expression::BinaryOp { left, right, .. } => contains_disjunction(left) || contains_disjunction(right),
        Expression::UnaryOp { expr: sub_expr, .. } | Expression::IsNull { expr: sub_expr, .. } => {
            contains_disjunction(sub_expr)
        }
        Expression::Function { args, .. } => args.iter().any(contains_disjunction),
        Expression::Column(_) | Expression::Literal(_) => false,
    }
}

/// Splits a predicate into a list of conjoined expressions.
/// e.g., A AND B AND C becomes [A, B, C]
pub fn split_conjunction(predicate: &Expression) -> Vec<Expression> {
    let mut conditions = Vec::new();
    split_conjunction_recursive(predicate, &mut conditions);
    conditions
}

fn split_conjunction_recursive(predicate: &Expression, conditions: &mut Vec<Expression>) {
    match predicate {
        Expression::BinaryOp { left, op: Operator::And, right } => {
            split_conjunction_recursive(left, conditions);
            split_conjunction_recursive(right, conditions);
        }
        _ => conditions.push(predicate.clone()),
    }
}

/// AND the conditions back together; `None` when there are none
pub fn build_conjunction(conditions: Vec<Expression>) -> Option<Expression> {
    let mut iter = conditions.into_iter().rev();
    let last = iter.next()?;
    Some(iter.fold(last, |acc, next| Expression::and(next, acc)))
}

/// AND `extra` onto an optional existing predicate
pub fn conjoin(existing: Option<Expression>, extra: Expression) -> Expression {
    match existing {
        Some(current) => Expression::and(current, extra),
        None => extra,
    }
}

/// Outcome of reducing a predicate to a single relation
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    /// Conjuncts that reference only the relation
    pub pushed: Option<Expression>,
    /// Everything else, in original order
    pub remainder: Option<Expression>,
}

/// Split `predicate` into the conjuncts that mention only `relation` and the
/// rest. A conjunct that mixes `relation` with another relation under an OR
/// cannot be separated and fails the whole reduction.
pub fn reduce_to_relation(predicate: &Expression, relation: &str) -> PlanResult<Reduction> {
    let mut pushed = Vec::new();
    let mut remainder = Vec::new();

    for conjunct in split_conjunction(predicate) {
        let relations = referenced_relations(&conjunct);
        let mentions = relations.iter().any(|r| r == relation);

        if mentions && relations.len() == 1 && !has_unqualified_columns(&conjunct) {
            pushed.push(conjunct);
        } else if mentions && relations.len() > 1 && contains_disjunction(&conjunct) {
            return Err(PlanError::UnsplittablePredicate {
                relation: relation.to_string(),
                predicate: conjunct.to_string(),
            });
        } else {
            remainder.push(conjunct);
        }
    }

    Ok(Reduction {
        pushed: build_conjunction(pushed),
        remainder: build_conjunction(remainder),
    })
}

/// The two relations an equality between columns of different relations
/// joins, e.g. `a.id = b.a_id`.
pub fn equi_join_relations(expr: &Expression) -> Option<(String, String)> {
    match expr {
        Expression::BinaryOp { left, op: Operator::Equals, right } => match (left.as_ref(), right.as_ref()) {
            (
                Expression::Column(ColumnReference { table: Some(l), .. }),
                Expression::Column(ColumnReference { table: Some(r), .. }),
            ) if l != r => Some((l.clone(), r.clone())),
            _ => None,
        },
        _ => None,
    }
}

/// Distinct column names used by a join predicate, for USING rendering
pub fn join_column_names(expr: &Expression) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for col_ref in field_references(expr) {
        if !names.contains(&col_ref.name) {
            names.push(col_ref.name);
        }
    }
    names
}
