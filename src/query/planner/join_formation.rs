// Join Formation Pass
//
// A Restrict node holding a join predicate over exactly two relations is a
// cross product in disguise. The predicate is moved into the lowest join
// whose two operands own those relations, turning it into an inner join or
// extending the ON condition of one.

use std::collections::HashSet;

use log::debug;

use crate::query::ast::Expression;

use super::error::PlanResult;
use super::node::{ChildSide, JoinCondition, JoinKind, NodeId, NodeKind, QueryNode};
use super::predicate::{has_unqualified_columns, referenced_relations};
use super::pushdown::RelocationPass;
use super::tree::QueryTree;

/// Promotes two-relation join predicates into the join that spans them
pub struct JoinFormation;

impl JoinFormation {
    /// The two relations a Restrict node's join predicate connects, if it
    /// names exactly two.
    fn join_pair(tree: &QueryTree, id: NodeId) -> Option<(String, String)> {
        let node = tree.get(id)?;
        if node.kind != NodeKind::Restrict {
            return None;
        }
        let predicate = node.join_predicate.as_ref()?;
        if has_unqualified_columns(predicate) {
            return None;
        }
        match referenced_relations(predicate).as_slice() {
            [a, b] => Some((a.clone(), b.clone())),
            _ => None,
        }
    }

    /// A join can take another equality when it has no predicate of its own
    /// yet, or when it is an inner ON join whose condition can be extended.
    /// NATURAL and USING joins carry implicit equalities and are never
    /// rewritten; outer joins would change meaning.
    fn accepts_predicate(node: &QueryNode) -> bool {
        match (node.join_kind, node.join_condition, &node.join_predicate) {
            (_, JoinCondition::Natural | JoinCondition::Using, _) => false,
            (JoinKind::Unknown | JoinKind::CrossProduct | JoinKind::Inner, _, None) => true,
            (JoinKind::Inner, _, Some(_)) => true,
            _ => false,
        }
    }

    /// Lowest eligible join in the scope of `source` whose operands own `a`
    /// and `b`, one each.
    fn spanning_join(tree: &QueryTree, source: NodeId, a: &str, b: &str) -> PlanResult<Option<NodeId>> {
        let scope = tree.scope_of(source)?;
        let regions = tree.filter_regions(scope);
        let source_region = regions.get(&source).copied();

        let found = tree.scope_post_order(scope).into_iter().find(|id| {
            let Some(node) = tree.get(*id) else { return false };
            let eligible = node.kind == NodeKind::Join
                && Self::accepts_predicate(node)
                && regions.get(id).copied() == source_region;
            eligible
                && ((tree.side_owns(*id, ChildSide::Left, a) && tree.side_owns(*id, ChildSide::Right, b))
                    || (tree.side_owns(*id, ChildSide::Left, b) && tree.side_owns(*id, ChildSide::Right, a)))
        });
        Ok(found)
    }
}

impl RelocationPass for JoinFormation {
    fn name(&self) -> &str {
        "join formation"
    }

    fn find(&self, tree: &QueryTree, visited: &HashSet<NodeId>) -> Option<NodeId> {
        let root = tree.root()?;
        tree.pre_order(root)
            .into_iter()
            .filter(|id| !visited.contains(id))
            .find(|id| Self::join_pair(tree, *id).is_some())
    }

    fn push(&self, tree: &mut QueryTree, source: NodeId) -> PlanResult<()> {
        let Some((a, b)) = Self::join_pair(tree, source) else { return Ok(()) };
        let Some(join) = Self::spanning_join(tree, source, &a, &b)? else {
            debug!("No join spans {} and {}; predicate stays on node {}", a, b, source);
            return Ok(());
        };

        let Some(predicate) = tree.node_mut(source)?.join_predicate.take() else { return Ok(()) };
        let join_node = tree.node_mut(join)?;
        join_node.join_predicate = Some(match join_node.join_predicate.take() {
            Some(existing) => Expression::and(existing, predicate),
            None => predicate,
        });
        join_node.join_kind = JoinKind::Inner;
        join_node.join_condition = JoinCondition::On;
        debug!("Moved join predicate on {} and {} from node {} into join {}", a, b, source, join);
        Ok(())
    }
}

/// Mark every join that carries a predicate as an ON join; an unknown or
/// cross-product kind becomes inner.
pub fn normalize_join_conditions(tree: &mut QueryTree) -> PlanResult<usize> {
    let Some(root) = tree.root() else { return Ok(0) };
    let mut count = 0;
    for id in tree.pre_order(root) {
        let node = tree.node_mut(id)?;
        if node.kind != NodeKind::Join || node.join_predicate.is_none() {
            continue;
        }
        if node.join_condition == JoinCondition::Undefined {
            node.join_condition = JoinCondition::On;
            count += 1;
        }
        if matches!(node.join_kind, JoinKind::Unknown | JoinKind::CrossProduct) {
            node.join_kind = JoinKind::Inner;
        }
    }
    Ok(count)
}
