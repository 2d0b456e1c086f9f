// Plan Serializer
//
// Renders a query tree back into SQL text. The whole statement is written
// into one String; nested sub-queries are written in place, parenthesized.

use std::fmt::Write;

use super::error::{PlanError, PlanResult};
use super::node::{Attribute, ChildSide, JoinCondition, NodeId, NodeKind};
use super::predicate::{build_conjunction, join_column_names, split_conjunction};
use super::tree::QueryTree;

/// Render `tree` as a SELECT statement
pub fn to_query_string(tree: &QueryTree) -> PlanResult<String> {
    let root = tree
        .root()
        .ok_or_else(|| PlanError::StructuralInvariantViolation("query tree is empty".to_string()))?;
    let mut out = String::new();
    QueryWriter { tree }.write_select(&mut out, root, true)?;
    Ok(out)
}

impl QueryTree {
    /// Render the tree as a SELECT statement
    pub fn to_query_string(&self) -> PlanResult<String> {
        to_query_string(self)
    }
}

struct QueryWriter<'a> {
    tree: &'a QueryTree,
}

// Writing into a String cannot fail
fn emit(out: &mut String, args: std::fmt::Arguments<'_>) {
    let _ = out.write_fmt(args);
}

impl QueryWriter<'_> {
    fn write_select(&self, out: &mut String, scope_root: NodeId, outermost: bool) -> PlanResult<()> {
        let nodes = self.tree.scope_pre_order(scope_root);

        let distinct = (outermost && self.tree.distinct())
            || nodes.iter().any(|id| self.tree.get(*id).is_some_and(|n| n.kind == NodeKind::Distinct));
        out.push_str("SELECT ");
        if distinct {
            out.push_str("DISTINCT ");
        }
        self.write_select_list(out, &nodes);

        let mark = out.len();
        out.push_str(" FROM ");
        if !self.write_source(out, scope_root, scope_root)? {
            out.truncate(mark);
        }

        let mut conjuncts = Vec::new();
        for id in &nodes {
            let node = self.tree.node(*id)?;
            if let Some(predicate) = &node.predicate {
                conjuncts.extend(split_conjunction(predicate));
            }
            if node.kind != NodeKind::Join {
                if let Some(join_predicate) = &node.join_predicate {
                    conjuncts.extend(split_conjunction(join_predicate));
                }
            }
        }
        if let Some(condition) = build_conjunction(conjuncts) {
            emit(out, format_args!(" WHERE {}", condition));
        }

        let sort_keys: Vec<&Attribute> = nodes
            .iter()
            .filter_map(|id| self.tree.get(*id))
            .filter(|n| n.kind == NodeKind::Sort)
            .flat_map(|n| n.attributes.iter())
            .collect();
        if !sort_keys.is_empty() {
            out.push_str(" ORDER BY ");
            write_list(out, sort_keys.iter().map(|a| a.to_string()));
        }
        Ok(())
    }

    /// Visible attributes of the scope in select-list order, or `*`
    fn write_select_list(&self, out: &mut String, nodes: &[NodeId]) {
        let mut attributes: Vec<&Attribute> = nodes
            .iter()
            .filter_map(|id| self.tree.get(*id))
            .filter(|n| matches!(n.kind, NodeKind::Project | NodeKind::Restrict | NodeKind::Join))
            .flat_map(|n| n.visible_attributes())
            .collect();
        attributes.sort_by_key(|a| a.ordinal.unwrap_or(usize::MAX));

        // Splitting hands a copy of a lone `*` to every join operand
        let mut wildcards: Vec<Option<usize>> = Vec::new();
        let mut rendered: Vec<String> = Vec::new();
        for attribute in attributes {
            if attribute.is_lone_wildcard() {
                if wildcards.contains(&attribute.ordinal) {
                    continue;
                }
                wildcards.push(attribute.ordinal);
            }
            rendered.push(attribute.to_string());
        }
        if rendered.is_empty() {
            out.push('*');
        } else {
            write_list(out, rendered.into_iter());
        }
    }

    /// Write the FROM source rooted at `id`. Returns false when the subtree
    /// holds no relation at all.
    fn write_source(&self, out: &mut String, id: NodeId, scope_root: NodeId) -> PlanResult<bool> {
        let node = self.tree.node(id)?;

        if id != scope_root && node.subquery {
            out.push('(');
            self.write_select(out, id, false)?;
            out.push(')');
            return Ok(true);
        }
        if node.is_join_like() {
            self.write_join(out, id, scope_root)?;
            return Ok(true);
        }

        let mut wrote = false;
        for relation in node.relations() {
            if wrote {
                out.push_str(", ");
            }
            emit(out, format_args!("{}", relation));
            wrote = true;
        }
        for child in node.children() {
            let mark = out.len();
            if wrote {
                out.push_str(", ");
            }
            if self.write_source(out, child, scope_root)? {
                wrote = true;
            } else {
                out.truncate(mark);
            }
        }
        Ok(wrote)
    }

    fn write_join(&self, out: &mut String, id: NodeId, scope_root: NodeId) -> PlanResult<()> {
        let node = self.tree.node(id)?;
        self.write_operand(out, id, ChildSide::Left, scope_root)?;

        out.push(' ');
        if node.join_condition == JoinCondition::Natural {
            out.push_str("NATURAL ");
        }
        out.push_str(node.join_kind.keyword());
        out.push(' ');

        self.write_operand(out, id, ChildSide::Right, scope_root)?;

        match (node.join_condition, &node.join_predicate) {
            (JoinCondition::Natural, _) => {}
            (JoinCondition::Using, Some(join_predicate)) => {
                out.push_str(" USING (");
                write_list(out, join_column_names(join_predicate).into_iter());
                out.push(')');
            }
            (_, Some(join_predicate)) => emit(out, format_args!(" ON {}", join_predicate)),
            (JoinCondition::On, None) => out.push_str(" ON TRUE"),
            _ => {}
        }
        Ok(())
    }

    fn write_operand(&self, out: &mut String, id: NodeId, side: ChildSide, scope_root: NodeId) -> PlanResult<()> {
        let node = self.tree.node(id)?;
        let missing = || {
            PlanError::StructuralInvariantViolation(format!("join node {} has no {} operand", id, side))
        };

        if let Some(child) = node.child(side) {
            let child_node = self.tree.node(child)?;
            let nested_join = side == ChildSide::Right && child_node.is_join_like() && !child_node.subquery;
            let mark = out.len();
            if nested_join {
                out.push('(');
            }
            if !self.write_source(out, child, scope_root)? {
                out.truncate(mark);
                return Err(missing());
            }
            if nested_join {
                out.push(')');
            }
            return Ok(());
        }

        match side.slot().and_then(|slot| node.relation(slot)) {
            Some(relation) => {
                emit(out, format_args!("{}", relation));
                Ok(())
            }
            None => Err(missing()),
        }
    }
}

fn write_list<I: Iterator<Item = String>>(out: &mut String, items: I) {
    for (i, item) in items.enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&item);
    }
}
