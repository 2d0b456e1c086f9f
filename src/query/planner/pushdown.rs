// Pushdown Passes
//
// Restriction and projection pushdown share one loop: find the next node
// carrying something to place, push its items onto the nodes that own the
// referenced relations, and repeat until no unvisited source is left.

use std::collections::HashSet;

use log::{debug, trace, warn};

use crate::query::ast::Expression;

use super::error::{PlanError, PlanResult};
use super::node::{ChildSide, NodeId, NodeKind, QueryNode};
use super::predicate::{conjoin, reduce_to_relation};
use super::tree::QueryTree;

/// A pass that relocates items from a source node toward the leaves
pub trait RelocationPass {
    /// Name used in log messages
    fn name(&self) -> &str;

    /// First node, in pre-order, carrying items and not yet visited
    fn find(&self, tree: &QueryTree, visited: &HashSet<NodeId>) -> Option<NodeId>;

    /// Move what can be moved out of `source`
    fn push(&self, tree: &mut QueryTree, source: NodeId) -> PlanResult<()>;
}

/// Drive a relocation pass to its fixed point. Each source is pushed at most
/// once; the loop also stops after `limit` iterations, which defaults to one
/// more than the number of nodes in the tree. Returns the iterations run.
pub fn run_to_fixed_point<P: RelocationPass + ?Sized>(
    pass: &P,
    tree: &mut QueryTree,
    limit: Option<usize>,
) -> PlanResult<usize> {
    debug!("Running {} pass", pass.name());
    let mut visited = HashSet::new();
    let mut iterations = 0;

    while let Some(source) = pass.find(tree, &visited) {
        let cap = limit.unwrap_or_else(|| tree.node_count() + 1);
        if iterations >= cap {
            warn!("{} pass stopped after {} iterations", pass.name(), iterations);
            break;
        }
        trace!("{} pass pushing from node {}", pass.name(), source);
        pass.push(tree, source)?;
        visited.insert(source);
        iterations += 1;
    }

    debug!("{} pass finished after {} iterations", pass.name(), iterations);
    Ok(iterations)
}

fn first_unvisited<F>(tree: &QueryTree, visited: &HashSet<NodeId>, carries: F) -> Option<NodeId>
where
    F: Fn(&QueryNode) -> bool,
{
    let root = tree.root()?;
    tree.pre_order(root)
        .into_iter()
        .filter(|id| !visited.contains(id))
        .find(|id| tree.get(*id).is_some_and(&carries))
}

/// Moves filter conjuncts onto the Restrict or Project node that owns the
/// single relation they reference.
pub struct RestrictionPushdown;

impl RelocationPass for RestrictionPushdown {
    fn name(&self) -> &str {
        "restriction pushdown"
    }

    fn find(&self, tree: &QueryTree, visited: &HashSet<NodeId>) -> Option<NodeId> {
        first_unvisited(tree, visited, |n| n.predicate.is_some())
    }

    fn push(&self, tree: &mut QueryTree, source: NodeId) -> PlanResult<()> {
        let scope = tree.scope_of(source)?;
        let regions = tree.filter_regions(scope);
        let source_region = regions.get(&source).copied();

        let targets: Vec<NodeId> = tree
            .scope_pre_order(scope)
            .into_iter()
            .filter(|id| *id != source && regions.get(id).copied() == source_region)
            .filter(|id| {
                tree.get(*id).is_some_and(|n| {
                    matches!(n.kind, NodeKind::Restrict | NodeKind::Project) && n.relation_count() > 0
                })
            })
            .collect();

        for target in targets {
            let names: Vec<String> = tree.node(target)?.relations().map(|r| r.name().to_string()).collect();
            for name in names {
                let source_node = tree.node(source)?;
                if source_node.owns_relation(&name) {
                    continue;
                }
                let Some(predicate) = source_node.predicate.as_ref() else { return Ok(()) };

                let reduction = match reduce_to_relation(predicate, &name) {
                    Ok(reduction) => reduction,
                    Err(e @ PlanError::UnsplittablePredicate { .. }) => {
                        warn!("Leaving predicate on node {}: {}", source, e);
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                let Some(pushed) = reduction.pushed else { continue };

                tree.node_mut(source)?.predicate = reduction.remainder;
                place_restriction(tree, target, &name, pushed)?;
                debug!("Pushed restriction on {} from node {} to node {}", name, source, target);
            }
        }
        Ok(())
    }
}

/// AND `pushed` into a Restrict owner, or give a Project owner a new
/// Restrict child that takes over the relation.
fn place_restriction(
    tree: &mut QueryTree,
    target: NodeId,
    relation: &str,
    pushed: Expression,
) -> PlanResult<()> {
    let node = tree.node_mut(target)?;
    if node.kind == NodeKind::Restrict {
        node.predicate = Some(conjoin(node.predicate.take(), pushed));
        return Ok(());
    }

    let slot = node.relation_slot(relation).ok_or_else(|| {
        PlanError::StructuralInvariantViolation(format!("node {} does not own {}", target, relation))
    })?;
    let relation = node.take_relation(slot).ok_or_else(|| {
        PlanError::StructuralInvariantViolation(format!("relation slot {} of node {} is empty", slot, target))
    })?;
    let child = node.children().next();

    let mut restrict = tree.new_node(NodeKind::Restrict);
    restrict.predicate = Some(pushed);
    restrict.add_relation(relation)?;
    let restrict_id = tree.add_detached(restrict)?;

    if let Some(child) = child {
        let side = tree.node(child)?.side();
        tree.detach(target, side)?;
        tree.attach(restrict_id, ChildSide::Left, child)?;
    }
    tree.attach(target, ChildSide::Left, restrict_id)?;
    trace!("Created restrict node {} under project {}", restrict_id, target);
    Ok(())
}

/// Moves projected attributes onto the Restrict or Project node that owns
/// their relation.
pub struct ProjectionPushdown;

impl RelocationPass for ProjectionPushdown {
    fn name(&self) -> &str {
        "projection pushdown"
    }

    fn find(&self, tree: &QueryTree, visited: &HashSet<NodeId>) -> Option<NodeId> {
        first_unvisited(tree, visited, |n| {
            matches!(n.kind, NodeKind::Project | NodeKind::Restrict | NodeKind::Join) && !n.attributes.is_empty()
        })
    }

    fn push(&self, tree: &mut QueryTree, source: NodeId) -> PlanResult<()> {
        let scope = tree.scope_of(source)?;
        let targets: Vec<NodeId> = tree
            .scope_pre_order(scope)
            .into_iter()
            .filter(|id| *id != source)
            .filter(|id| {
                tree.get(*id).is_some_and(|n| {
                    matches!(n.kind, NodeKind::Restrict | NodeKind::Project) && n.relation_count() > 0
                })
            })
            .collect();

        for target in targets {
            if tree.node(source)?.attributes.is_empty() {
                break;
            }
            let names: Vec<String> = tree.node(target)?.relations().map(|r| r.name().to_string()).collect();
            for name in names {
                let source_node = tree.node_mut(source)?;
                if source_node.owns_relation(&name) {
                    continue;
                }
                let moved = source_node.take_attributes_of(&name);
                if moved.is_empty() {
                    continue;
                }
                let target_node = tree.node_mut(target)?;
                for attribute in moved {
                    target_node.add_attribute(attribute);
                }
                debug!("Pushed attributes of {} from node {} to node {}", name, source, target);
            }
        }
        Ok(())
    }
}
