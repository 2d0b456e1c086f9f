// Node Splitting Passes
//
// The builder produces "overloaded" nodes: a join that also filters, a join
// that also projects, a projection that also filters. Each pass here breaks
// one such combination into a parent/child pair so that the pushdown passes
// only ever move one kind of payload at a time.

use log::{debug, trace};

use crate::catalog::{Catalog, Table};

use super::error::{PlanError, PlanResult};
use super::node::{Attribute, ChildSide, NodeId, NodeKind, RelationRef};
use super::predicate::{field_references, has_unqualified_columns, referenced_relations};
use super::tree::QueryTree;

/// Runs the three splitting passes over a tree
pub struct NodeSplitter<'a> {
    catalog: &'a Catalog,
}

impl<'a> NodeSplitter<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        NodeSplitter { catalog }
    }

    /// Run every split once, in order. Returns the number of nodes split.
    pub fn split_all(&self, tree: &mut QueryTree) -> PlanResult<usize> {
        let mut count = self.split_restrict_with_join(tree)?;
        count += self.split_project_with_join(tree)?;
        count += self.split_restrict_with_project(tree)?;
        Ok(count)
    }

    /// Move the filter predicate of every join-like node into its own
    /// Restrict node, below the join when the filter only touches one of the
    /// join's inline relations and above it otherwise.
    pub fn split_restrict_with_join(&self, tree: &mut QueryTree) -> PlanResult<usize> {
        let Some(root) = tree.root() else { return Ok(0) };
        debug!("Splitting restrictions from joins");
        let mut count = 0;

        for id in tree.pre_order(root) {
            let node = tree.node(id)?;
            let Some(predicate) = node.predicate.as_ref() else { continue };
            if !node.is_join_like() {
                continue;
            }

            let relations = referenced_relations(predicate);
            let below = match relations.as_slice() {
                [only] if !has_unqualified_columns(predicate) => node
                    .relation_slot(only)
                    .filter(|slot| !node.join_kind.shields(ChildSide::from_slot(*slot))),
                _ => None,
            };

            match below {
                Some(slot) => self.split_below(tree, id, slot)?,
                None => split_above(tree, id)?,
            }
            count += 1;
        }
        Ok(count)
    }

    fn split_below(&self, tree: &mut QueryTree, id: NodeId, slot: usize) -> PlanResult<()> {
        let scope = tree.scope_of(id)?;
        let mut restrict = tree.new_node(NodeKind::Restrict);
        let side = ChildSide::from_slot(slot);

        let node = tree.node_mut(id)?;
        node.kind = NodeKind::Join;
        restrict.predicate = node.predicate.take();
        let relation = node.take_relation(slot).ok_or_else(|| {
            PlanError::StructuralInvariantViolation(format!("relation slot {} of node {} is empty", slot, id))
        })?;
        let moved = node.take_attributes_of(relation.name());

        let table = self.resolve(tree, &relation)?;
        for attribute in ordered_attributes(table, &relation, moved)? {
            restrict.add_attribute(attribute);
        }
        for attribute in hidden_join_columns(tree, scope, relation.name()) {
            restrict.add_attribute(attribute);
        }
        restrict.add_relation(relation)?;

        let restrict_id = tree.add_detached(restrict)?;
        if tree.node(id)?.child(side).is_some() {
            let existing = tree.detach(id, side)?;
            tree.attach(restrict_id, ChildSide::Left, existing)?;
        }
        tree.attach(id, side, restrict_id)?;
        debug!("Split restriction of join {} into node {} on the {}", id, restrict_id, side);
        Ok(())
    }

    /// Give every join operand that is still an inline relation its own
    /// Project node holding that relation's attributes.
    pub fn split_project_with_join(&self, tree: &mut QueryTree) -> PlanResult<usize> {
        let Some(root) = tree.root() else { return Ok(0) };
        debug!("Splitting projections from joins");
        let mut count = 0;

        for id in tree.pre_order(root) {
            let node = tree.node(id)?;
            if !node.is_join_like() {
                continue;
            }
            let sides: Vec<ChildSide> = [ChildSide::Left, ChildSide::Right]
                .into_iter()
                .filter(|side| {
                    node.child(*side).is_none() && side.slot().and_then(|s| node.relation(s)).is_some()
                })
                .collect();
            if sides.is_empty() {
                continue;
            }

            let wildcard = node.attributes.iter().find(|a| a.is_lone_wildcard()).cloned();
            let scope = tree.scope_of(id)?;

            for side in sides {
                let mut project = tree.new_node(NodeKind::Project);
                let node = tree.node_mut(id)?;
                node.kind = NodeKind::Join;
                let Some(relation) = side.slot().and_then(|s| node.take_relation(s)) else { continue };
                let moved = node.take_attributes_of(relation.name());

                if let Some(wildcard) = &wildcard {
                    project.add_attribute(wildcard.clone());
                }
                let table = self.resolve(tree, &relation)?;
                for attribute in ordered_attributes(table, &relation, moved)? {
                    project.add_attribute(attribute);
                }
                for attribute in hidden_join_columns(tree, scope, relation.name()) {
                    project.add_attribute(attribute);
                }
                project.add_relation(relation)?;

                let project_id = tree.insert_node(Some(id), side, project)?;
                trace!("Created project node {} on the {} of join {}", project_id, side, id);
                count += 1;
            }

            if wildcard.is_some() {
                tree.node_mut(id)?.attributes.retain(|a| !a.is_lone_wildcard());
            }
        }
        Ok(count)
    }

    /// Split every node that both projects and filters into a Project parent
    /// over a Restrict child that takes the filter, the relations and the
    /// children.
    pub fn split_restrict_with_project(&self, tree: &mut QueryTree) -> PlanResult<usize> {
        let Some(root) = tree.root() else { return Ok(0) };
        debug!("Splitting restrictions from projections");
        let mut count = 0;

        for id in tree.pre_order(root) {
            let node = tree.node(id)?;
            let composite = matches!(node.kind, NodeKind::Project | NodeKind::Restrict)
                && !node.attributes.is_empty()
                && node.predicate.is_some();
            if !composite {
                continue;
            }

            let mut restrict = tree.new_node(NodeKind::Restrict);
            let node = tree.node_mut(id)?;
            node.kind = NodeKind::Project;
            restrict.predicate = node.predicate.take();
            restrict.join_predicate = node.join_predicate.take();
            for relation in node.take_relations() {
                restrict.add_relation(relation)?;
            }
            let child = node.children().next();

            let restrict_id = tree.add_detached(restrict)?;
            if let Some(child) = child {
                let side = tree.node(child)?.side();
                tree.detach(id, side)?;
                tree.attach(restrict_id, ChildSide::Left, child)?;
            }
            tree.attach(id, ChildSide::Left, restrict_id)?;
            debug!("Split restriction of project {} into node {}", id, restrict_id);
            count += 1;
        }
        Ok(count)
    }

    fn resolve(&self, tree: &QueryTree, relation: &RelationRef) -> PlanResult<&'a Table> {
        self.catalog.resolve(relation, tree.database())
    }
}

/// Put a new Restrict node holding the predicate of `id` in its place and
/// hang `id` below it.
fn split_above(tree: &mut QueryTree, id: NodeId) -> PlanResult<()> {
    let mut restrict = tree.new_node(NodeKind::Restrict);
    let node = tree.node_mut(id)?;
    node.kind = NodeKind::Join;
    restrict.predicate = node.predicate.take();
    restrict.subquery = std::mem::take(&mut node.subquery);
    let parent = node.parent();

    let restrict_id = tree.add_detached(restrict)?;
    tree.replace_self(parent, id, Some(restrict_id))?;
    tree.attach(restrict_id, ChildSide::Left, id)?;
    debug!("Split restriction of join {} into node {} above it", id, restrict_id);
    Ok(())
}

/// Check attributes against the relation's table and order them by the
/// table's column order.
fn ordered_attributes(
    table: &Table,
    relation: &RelationRef,
    mut attributes: Vec<Attribute>,
) -> PlanResult<Vec<Attribute>> {
    for attribute in &attributes {
        if !attribute.is_wildcard() && !table.has_column(&attribute.column) {
            return Err(PlanError::ColumnNotFound(format!("{}.{}", relation.name(), attribute.column)));
        }
    }
    attributes.sort_by_key(|a| table.column_index(&a.column).map_or(0, |i| i + 1));
    Ok(attributes)
}

/// Hidden copies of the columns of `relation` used by join predicates in
/// the scope rooted at `scope`.
fn hidden_join_columns(tree: &QueryTree, scope: NodeId, relation: &str) -> Vec<Attribute> {
    let mut columns: Vec<Attribute> = Vec::new();
    for id in tree.scope_pre_order(scope) {
        let Some(join_predicate) = tree.get(id).and_then(|n| n.join_predicate.as_ref()) else { continue };
        for col_ref in field_references(join_predicate) {
            if col_ref.table.as_deref() != Some(relation) {
                continue;
            }
            let attribute = Attribute::new(relation, &col_ref.name).hidden();
            if !columns.iter().any(|c| c.same_reference(&attribute)) {
                columns.push(attribute);
            }
        }
    }
    columns
}
