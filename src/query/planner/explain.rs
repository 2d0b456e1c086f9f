// Plan Display
//
// Indented, one-line-per-node rendering of a query tree for debugging and
// for the command-line front end.

use std::fmt;

use super::node::{NodeId, NodeKind};
use super::tree::QueryTree;

impl fmt::Display for QueryTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root() {
            Some(root) => self.fmt_node(f, root, 0),
            None => writeln!(f, "<empty query tree>"),
        }
    }
}

impl QueryTree {
    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, id: NodeId, depth: usize) -> fmt::Result {
        let Some(node) = self.get(id) else {
            return writeln!(f, "{}<missing node {}>", "  ".repeat(depth), id);
        };

        write!(f, "{}{}[{}]", "  ".repeat(depth), node.kind, node.id())?;
        if node.parent().is_some() {
            write!(f, " ({})", node.side())?;
        }
        if node.subquery {
            f.write_str(" subquery")?;
        }
        if node.kind == NodeKind::Join {
            write!(f, " {:?}/{:?}", node.join_kind, node.join_condition)?;
        }

        let relations: Vec<String> = node.relations().map(|r| r.to_string()).collect();
        if !relations.is_empty() {
            write!(f, " relations=({})", relations.join(", "))?;
        }
        if !node.attributes.is_empty() {
            let attributes: Vec<String> = node
                .attributes
                .iter()
                .map(|a| if a.hidden { format!("[{}]", a) } else { a.to_string() })
                .collect();
            write!(f, " attributes=({})", attributes.join(", "))?;
        }
        if let Some(predicate) = &node.predicate {
            write!(f, " where=({})", predicate)?;
        }
        if let Some(join_predicate) = &node.join_predicate {
            write!(f, " join=({})", join_predicate)?;
        }
        writeln!(f)?;

        for child in node.children() {
            self.fmt_node(f, child, depth + 1)?;
        }
        Ok(())
    }
}
