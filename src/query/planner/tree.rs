// Query Tree
//
// Arena of QueryNodes keyed by NodeId plus the tree-wide flags. All
// structural edits go through attach / detach / replace_self so that
// parent links and child sides never disagree.

use std::collections::HashMap;

use log::trace;

use super::error::{PlanError, PlanResult};
use super::node::{Attribute, ChildSide, NodeId, NodeKind, QueryNode, RelationRef};

/// A query plan tree
#[derive(Debug, Clone, Default)]
pub struct QueryTree {
    nodes: HashMap<NodeId, QueryNode>,
    root: Option<NodeId>,
    next_id: u32,
    heuristically_optimized: bool,
    cost_optimized: bool,
    database: Option<String>,
    distinct: bool,
}

impl QueryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&QueryNode> {
        self.nodes.get(&id)
    }

    pub fn node(&self, id: NodeId) -> PlanResult<&QueryNode> {
        self.nodes.get(&id).ok_or(PlanError::NodeNotFound(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> PlanResult<&mut QueryNode> {
        self.nodes.get_mut(&id).ok_or(PlanError::NodeNotFound(id))
    }

    /// Iterate over every node, in no particular order
    pub fn nodes(&self) -> impl Iterator<Item = &QueryNode> {
        self.nodes.values()
    }

    /// Hand out a fresh identity
    pub fn allocate_id(&mut self) -> NodeId {
        self.next_id += 1;
        NodeId(self.next_id)
    }

    /// Create a detached node with a fresh identity
    pub fn new_node(&mut self, kind: NodeKind) -> QueryNode {
        let id = self.allocate_id();
        QueryNode::new(id, kind)
    }

    /// Insert `node` under `parent` on `side`, or as the root when `parent`
    /// is `None`. Explicit identities are accepted as long as they are unused.
    pub fn insert_node(
        &mut self,
        parent: Option<NodeId>,
        side: ChildSide,
        node: QueryNode,
    ) -> PlanResult<NodeId> {
        match (parent, side) {
            (None, ChildSide::Root) => {
                if let Some(root) = self.root {
                    return Err(PlanError::StructuralInvariantViolation(format!(
                        "tree already has root {}",
                        root
                    )));
                }
                let id = self.add_detached(node)?;
                self.root = Some(id);
                Ok(id)
            }
            (None, side) => Err(PlanError::InvalidAttachment(format!(
                "node {} has no parent but was given side {}",
                node.id, side
            ))),
            (Some(parent), _) => {
                let id = self.add_detached(node)?;
                if let Err(e) = self.attach(parent, side, id) {
                    self.nodes.remove(&id);
                    return Err(e);
                }
                Ok(id)
            }
        }
    }

    /// Put a node into the arena without linking it anywhere
    pub(crate) fn add_detached(&mut self, mut node: QueryNode) -> PlanResult<NodeId> {
        let id = node.id;
        if self.nodes.contains_key(&id) {
            return Err(PlanError::StructuralInvariantViolation(format!(
                "node id {} is already in use",
                id
            )));
        }
        if node.left.is_some() || node.right.is_some() {
            return Err(PlanError::StructuralInvariantViolation(format!(
                "node {} must be inserted without children",
                id
            )));
        }
        node.parent = None;
        node.side = ChildSide::Root;
        self.next_id = self.next_id.max(id.0);
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Make a detached node the root. The tree must not have one.
    pub(crate) fn set_root(&mut self, id: NodeId) -> PlanResult<()> {
        if let Some(root) = self.root {
            return Err(PlanError::StructuralInvariantViolation(format!(
                "tree already has root {}",
                root
            )));
        }
        let node = self.node_mut(id)?;
        if node.parent.is_some() {
            return Err(PlanError::InvalidAttachment(format!(
                "node {} is attached and cannot become the root",
                id
            )));
        }
        node.side = ChildSide::Root;
        self.root = Some(id);
        Ok(())
    }

    /// Hang the free-standing `child` under `parent` on `side`
    pub fn attach(&mut self, parent: NodeId, side: ChildSide, child: NodeId) -> PlanResult<()> {
        if side == ChildSide::Root {
            return Err(PlanError::InvalidAttachment(format!(
                "cannot attach node {} under {} on the root side",
                child, parent
            )));
        }
        if parent == child {
            return Err(PlanError::StructuralInvariantViolation(format!(
                "node {} cannot be its own child",
                child
            )));
        }

        let child_node = self.node(child)?;
        if child_node.parent.is_some() || self.root == Some(child) {
            return Err(PlanError::StructuralInvariantViolation(format!(
                "node {} is already attached",
                child
            )));
        }

        let parent_node = self.node(parent)?;
        if parent_node.child(side).is_some() {
            return Err(PlanError::StructuralInvariantViolation(format!(
                "{} child of node {} is occupied",
                side, parent
            )));
        }
        if parent_node.kind != NodeKind::Join && parent_node.child_count() > 0 {
            return Err(PlanError::StructuralInvariantViolation(format!(
                "{} node {} can hold only one child",
                parent_node.kind, parent
            )));
        }

        if let Some(slot) = self.node_mut(parent)?.child_slot_mut(side) {
            *slot = Some(child);
        }
        let child_node = self.node_mut(child)?;
        child_node.parent = Some(parent);
        child_node.side = side;
        trace!("Attached node {} under {} ({})", child, parent, side);
        Ok(())
    }

    /// Unhook and return the child on `side` of `parent`. The child keeps its
    /// own subtree and stays in the arena as a free-standing fragment.
    pub fn detach(&mut self, parent: NodeId, side: ChildSide) -> PlanResult<NodeId> {
        if side == ChildSide::Root {
            return Err(PlanError::InvalidAttachment(format!(
                "node {} has no root-side child",
                parent
            )));
        }
        let child = self
            .node_mut(parent)?
            .child_slot_mut(side)
            .and_then(|slot| slot.take())
            .ok_or_else(|| {
                PlanError::StructuralInvariantViolation(format!(
                    "node {} has no {} child to detach",
                    parent, side
                ))
            })?;
        let child_node = self.node_mut(child)?;
        child_node.parent = None;
        child_node.side = ChildSide::Root;
        Ok(child)
    }

    /// Put `replacement` (or nothing) where `cur` sits under `prev`, or at the
    /// root when `prev` is `None`. `cur` is left detached; if `replacement`
    /// was a child of `cur` it is unhooked from it first.
    pub fn replace_self(
        &mut self,
        prev: Option<NodeId>,
        cur: NodeId,
        replacement: Option<NodeId>,
    ) -> PlanResult<()> {
        let side = match prev {
            Some(p) => {
                let parent = self.node(p)?;
                if parent.left == Some(cur) {
                    ChildSide::Left
                } else if parent.right == Some(cur) {
                    ChildSide::Right
                } else {
                    return Err(PlanError::StructuralInvariantViolation(format!(
                        "node {} is not a child of {}",
                        cur, p
                    )));
                }
            }
            None => {
                if self.root != Some(cur) {
                    return Err(PlanError::StructuralInvariantViolation(format!(
                        "node {} is not the root",
                        cur
                    )));
                }
                ChildSide::Root
            }
        };

        if let Some(r) = replacement {
            let r_parent = self.node(r)?.parent;
            if r_parent == Some(cur) {
                let r_side = self.node(r)?.side;
                self.detach(cur, r_side)?;
            } else if r_parent.is_some() || self.root == Some(r) {
                return Err(PlanError::StructuralInvariantViolation(format!(
                    "replacement node {} is attached elsewhere",
                    r
                )));
            }
        }

        match prev {
            Some(p) => {
                if let Some(slot) = self.node_mut(p)?.child_slot_mut(side) {
                    *slot = replacement;
                }
            }
            None => self.root = replacement,
        }

        let cur_node = self.node_mut(cur)?;
        cur_node.parent = None;
        cur_node.side = ChildSide::Root;

        if let Some(r) = replacement {
            let r_node = self.node_mut(r)?;
            r_node.parent = prev;
            r_node.side = side;
        }
        Ok(())
    }

    /// Destroy a node and everything below it
    pub fn remove_subtree(&mut self, id: NodeId) -> PlanResult<()> {
        let node = self.node(id)?;
        if let Some(parent) = node.parent {
            let side = node.side;
            if let Some(slot) = self.node_mut(parent)?.child_slot_mut(side) {
                *slot = None;
            }
        }
        if self.root == Some(id) {
            self.root = None;
        }

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children());
            }
        }
        Ok(())
    }

    pub fn insert_relation(&mut self, id: NodeId, relation: RelationRef) -> PlanResult<()> {
        self.node_mut(id)?.add_relation(relation)
    }

    pub fn insert_attribute(&mut self, id: NodeId, attribute: Attribute) -> PlanResult<()> {
        self.node_mut(id)?.add_attribute(attribute);
        Ok(())
    }

    pub fn set_database(&mut self, name: &str) {
        self.database = Some(name.to_string());
    }

    /// Default database relations are resolved in
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn set_distinct(&mut self, distinct: bool) {
        self.distinct = distinct;
    }

    pub fn distinct(&self) -> bool {
        self.distinct
    }

    pub fn heuristically_optimized(&self) -> bool {
        self.heuristically_optimized
    }

    pub fn cost_optimized(&self) -> bool {
        self.cost_optimized
    }

    pub(crate) fn mark_heuristically_optimized(&mut self) {
        self.heuristically_optimized = true;
    }

    pub(crate) fn mark_cost_optimized(&mut self) {
        self.cost_optimized = true;
    }

    /// Both optimization stages have run
    pub fn is_optimized(&self) -> bool {
        self.heuristically_optimized && self.cost_optimized
    }

    /// Pre-order, left-biased walk of the whole subtree rooted at `from`
    pub fn pre_order(&self, from: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(&id) {
                order.push(id);
                stack.extend(node.right);
                stack.extend(node.left);
            }
        }
        order
    }

    /// Pre-order walk of the query scope rooted at `scope_root`. Nested
    /// sub-query roots, and everything under them, are skipped.
    pub fn scope_pre_order(&self, scope_root: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![scope_root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else { continue };
            if id != scope_root && node.subquery {
                continue;
            }
            order.push(id);
            stack.extend(node.right);
            stack.extend(node.left);
        }
        order
    }

    /// Post-order walk of the query scope rooted at `scope_root`
    pub fn scope_post_order(&self, scope_root: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        self.collect_post_order(scope_root, scope_root, &mut order);
        order
    }

    fn collect_post_order(&self, id: NodeId, scope_root: NodeId, order: &mut Vec<NodeId>) {
        let Some(node) = self.nodes.get(&id) else { return };
        if id != scope_root && node.subquery {
            return;
        }
        for child in node.children() {
            self.collect_post_order(child, scope_root, order);
        }
        order.push(id);
    }

    /// Roots of every query scope: the tree root first, then each sub-query
    /// root in pre-order.
    pub fn scope_roots(&self) -> Vec<NodeId> {
        let Some(root) = self.root else { return Vec::new() };
        let mut roots = vec![root];
        roots.extend(
            self.pre_order(root)
                .into_iter()
                .filter(|id| *id != root && self.nodes.get(id).is_some_and(|n| n.subquery)),
        );
        roots
    }

    /// Nearest enclosing sub-query root of `id` (itself included), or the
    /// tree root.
    pub fn scope_of(&self, id: NodeId) -> PlanResult<NodeId> {
        let mut current = id;
        loop {
            let node = self.node(current)?;
            if node.subquery {
                return Ok(current);
            }
            match node.parent {
                Some(parent) => current = parent,
                None => return Ok(current),
            }
        }
    }

    /// First sub-query root strictly below `from`, in pre-order
    pub fn find_subquery(&self, from: NodeId) -> Option<NodeId> {
        self.pre_order(from)
            .into_iter()
            .skip(1)
            .find(|id| self.nodes.get(id).is_some_and(|n| n.subquery))
    }

    /// Filter region of every node in a scope. The null-supplying side of an
    /// outer join, and either side of a set operation, opens a new region;
    /// a filter may only move between nodes of one region.
    pub fn filter_regions(&self, scope_root: NodeId) -> HashMap<NodeId, NodeId> {
        let mut regions = HashMap::new();
        for id in self.scope_pre_order(scope_root) {
            let region = match self.nodes.get(&id).and_then(|n| n.parent.map(|p| (p, n.side))) {
                Some((parent, side)) if id != scope_root => {
                    let opens = self
                        .nodes
                        .get(&parent)
                        .is_some_and(|p| p.kind == NodeKind::Join && p.join_kind.shields(side));
                    if opens {
                        id
                    } else {
                        regions.get(&parent).copied().unwrap_or(scope_root)
                    }
                }
                _ => id,
            };
            regions.insert(id, region);
        }
        regions
    }

    /// Whether any node carries an attribute kept only for a join condition
    pub fn has_hidden_attributes(&self) -> bool {
        self.nodes.values().any(|n| n.has_hidden_attributes())
    }

    /// Whether the subtree under `id` owns `relation` inline somewhere,
    /// without looking inside nested sub-queries.
    pub fn subtree_owns(&self, id: NodeId, relation: &str) -> bool {
        let Some(node) = self.nodes.get(&id) else { return false };
        if node.subquery {
            return false;
        }
        node.owns_relation(relation) || node.children().any(|c| self.subtree_owns(c, relation))
    }

    /// Whether the operand on `side` of join `id` owns `relation`, either in
    /// the join's own slot for that side or in the child subtree.
    pub fn side_owns(&self, id: NodeId, side: ChildSide, relation: &str) -> bool {
        let Some(node) = self.nodes.get(&id) else { return false };
        let inline = side
            .slot()
            .and_then(|slot| node.relation(slot))
            .is_some_and(|r| r.matches(relation));
        inline || node.child(side).is_some_and(|c| self.subtree_owns(c, relation))
    }

    /// Check every structural invariant of the tree
    pub fn check_invariants(&self) -> PlanResult<()> {
        let violation = |msg: String| Err(PlanError::StructuralInvariantViolation(msg));

        if let Some(root) = self.root {
            let node = self.node(root)?;
            if node.parent.is_some() || node.side != ChildSide::Root {
                return violation(format!("root {} has a parent link", root));
            }
        }

        for node in self.nodes.values() {
            if node.kind != NodeKind::Join && node.child_count() > 1 {
                return violation(format!("{} node {} has two children", node.kind, node.id));
            }
            let relations: Vec<&RelationRef> = node.relations().collect();
            if relations.len() == 2 && relations[0].name() == relations[1].name() {
                return violation(format!("node {} holds relation {} twice", node.id, relations[0].name()));
            }
            if node.join_predicate.is_some()
                && !matches!(node.kind, NodeKind::Join | NodeKind::Restrict)
            {
                return violation(format!("{} node {} carries a join predicate", node.kind, node.id));
            }
            if node.kind == NodeKind::Distinct && (self.root != Some(node.id) || node.left.is_none() || node.right.is_some()) {
                return violation(format!("distinct node {} must be the root with one left child", node.id));
            }
            for side in [ChildSide::Left, ChildSide::Right] {
                if let Some(child) = node.child(side) {
                    let child_node = self.node(child)?;
                    if child_node.parent != Some(node.id) || child_node.side != side {
                        return violation(format!(
                            "node {} is held on the {} of {} but links elsewhere",
                            child, side, node.id
                        ));
                    }
                }
            }
            if let Some(parent) = node.parent {
                if self.node(parent)?.child(node.side) != Some(node.id) {
                    return violation(format!("parent {} does not hold node {}", parent, node.id));
                }
            }
        }
        Ok(())
    }
}
