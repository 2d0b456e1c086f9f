// Pruner
//
// Removes operator nodes that no longer do any work once the pushdown
// passes have emptied them.

use log::debug;

use super::error::PlanResult;
use super::node::{NodeId, NodeKind, QueryNode};
use super::tree::QueryTree;

/// A Project without attributes, or a Restrict without any predicate, that
/// owns no relation and has at most one child.
fn is_degenerate(node: &QueryNode) -> bool {
    let empty = match node.kind {
        NodeKind::Project => node.attributes.is_empty(),
        NodeKind::Restrict => node.predicate.is_none() && node.join_predicate.is_none(),
        _ => false,
    };
    empty && node.child_count() <= 1 && node.relation_count() == 0
}

/// Prune the whole tree. Returns the number of nodes removed.
pub fn prune(tree: &mut QueryTree) -> PlanResult<usize> {
    let Some(root) = tree.root() else { return Ok(0) };
    let removed = prune_from(tree, None, root)?;
    if removed > 0 {
        debug!("Pruned {} nodes", removed);
    }
    Ok(removed)
}

fn prune_from(tree: &mut QueryTree, prev: Option<NodeId>, id: NodeId) -> PlanResult<usize> {
    let mut current = id;
    let mut removed = 0;

    loop {
        let node = tree.node(current)?;
        if !is_degenerate(node) {
            break;
        }
        let subquery = node.subquery;
        let only_child = node.children().next();
        match only_child {
            Some(child) => {
                tree.replace_self(prev, current, Some(child))?;
                tree.remove_subtree(current)?;
                if subquery {
                    tree.node_mut(child)?.subquery = true;
                }
                debug!("Pruned node {}, promoted node {}", current, child);
                removed += 1;
                current = child;
            }
            None => {
                // A join operand slot or the root cannot be left empty
                let parent_is_join = match prev {
                    Some(p) => tree.node(p)?.kind == NodeKind::Join,
                    None => true,
                };
                if parent_is_join {
                    break;
                }
                tree.replace_self(prev, current, None)?;
                tree.remove_subtree(current)?;
                debug!("Pruned leaf node {}", current);
                return Ok(removed + 1);
            }
        }
    }

    let children: Vec<NodeId> = tree.node(current)?.children().collect();
    for child in children {
        removed += prune_from(tree, Some(current), child)?;
    }
    Ok(removed)
}
