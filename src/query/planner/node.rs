// Query Tree Node Model
//
// A query tree is a binary operator tree. Each node is tagged with a kind
// and may own a filter predicate, a join predicate, up to two inline
// relations and a list of projected attributes. Children and parents are
// referenced by NodeId; the nodes themselves live in the QueryTree arena.

use std::fmt;

use crate::query::ast::Expression;

use super::error::{PlanError, PlanResult};

/// Identity of a node, unique within its tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operator kind of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeKind {
    Restrict,
    Project,
    Join,
    Sort,
    Distinct,
    #[default]
    Undefined,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::Restrict => "Restrict",
            NodeKind::Project => "Project",
            NodeKind::Join => "Join",
            NodeKind::Sort => "Sort",
            NodeKind::Distinct => "Distinct",
            NodeKind::Undefined => "Undefined",
        };
        f.write_str(s)
    }
}

/// Which pointer of its parent holds a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChildSide {
    Left,
    Right,
    #[default]
    Root,
}

impl ChildSide {
    /// Relation slot paired with this side (slot 0 is the left operand)
    pub fn slot(&self) -> Option<usize> {
        match self {
            ChildSide::Left => Some(0),
            ChildSide::Right => Some(1),
            ChildSide::Root => None,
        }
    }

    /// Side paired with a relation slot
    pub fn from_slot(slot: usize) -> ChildSide {
        if slot == 0 { ChildSide::Left } else { ChildSide::Right }
    }
}

impl fmt::Display for ChildSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChildSide::Left => "left",
            ChildSide::Right => "right",
            ChildSide::Root => "root",
        };
        f.write_str(s)
    }
}

/// Join kinds, meaningful for Join nodes only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    #[default]
    Unknown,
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
    CrossProduct,
    Union,
    Intersect,
}

impl JoinKind {
    /// SQL keyword used when rendering a join of this kind
    pub fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Unknown => "JOIN",
            JoinKind::Inner => "INNER JOIN",
            JoinKind::LeftOuter => "LEFT OUTER JOIN",
            JoinKind::RightOuter => "RIGHT OUTER JOIN",
            JoinKind::FullOuter => "FULL OUTER JOIN",
            JoinKind::CrossProduct => "CROSS JOIN",
            JoinKind::Union => "UNION",
            JoinKind::Intersect => "INTERSECT",
        }
    }

    /// Whether rows produced under `side` of this join may be null-extended,
    /// or otherwise must not be filtered before the join runs.
    pub fn shields(&self, side: ChildSide) -> bool {
        match self {
            JoinKind::LeftOuter => side == ChildSide::Right,
            JoinKind::RightOuter => side == ChildSide::Left,
            JoinKind::FullOuter | JoinKind::Union | JoinKind::Intersect => true,
            _ => false,
        }
    }
}

/// How a join's predicate was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinCondition {
    #[default]
    Undefined,
    Natural,
    On,
    Using,
}

/// Handle to a relation described by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationRef {
    database: Option<String>,
    table: String,
    alias: Option<String>,
}

impl RelationRef {
    pub fn new(table: &str) -> Self {
        RelationRef {
            database: None,
            table: table.to_string(),
            alias: None,
        }
    }

    pub fn with_database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Name column references use to qualify this relation
    pub fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    /// Whether a column qualifier refers to this relation
    pub fn matches(&self, qualifier: &str) -> bool {
        self.name() == qualifier
    }
}

impl fmt::Display for RelationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(db) = &self.database {
            write!(f, "{}.", db)?;
        }
        f.write_str(&self.table)?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {}", alias)?;
        }
        Ok(())
    }
}

/// Projected attribute reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Relation name (alias or table); empty for a bare `*`
    pub table: String,
    pub column: String,
    pub alias: Option<String>,
    /// Carried for a join condition, not returned to the caller
    pub hidden: bool,
    /// Position in the original select list, if it came from one
    pub ordinal: Option<usize>,
}

impl Attribute {
    pub fn new(table: &str, column: &str) -> Self {
        Attribute {
            table: table.to_string(),
            column: column.to_string(),
            alias: None,
            hidden: false,
            ordinal: None,
        }
    }

    /// The unqualified `*`
    pub fn wildcard() -> Self {
        Attribute::new("", "*")
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn with_ordinal(mut self, ordinal: usize) -> Self {
        self.ordinal = Some(ordinal);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn is_wildcard(&self) -> bool {
        self.column == "*"
    }

    /// `*` with no relation qualifier
    pub fn is_lone_wildcard(&self) -> bool {
        self.is_wildcard() && self.table.is_empty()
    }

    /// Same relation, column and output alias
    pub fn same_reference(&self, other: &Attribute) -> bool {
        self.table == other.table && self.column == other.column && self.alias == other.alias
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.table.is_empty() {
            write!(f, "{}.", self.table)?;
        }
        f.write_str(&self.column)?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {}", alias)?;
        }
        Ok(())
    }
}

/// A node of the query tree
#[derive(Debug, Clone)]
pub struct QueryNode {
    pub(crate) id: NodeId,
    pub(crate) parent: Option<NodeId>,
    pub(crate) side: ChildSide,
    pub(crate) left: Option<NodeId>,
    pub(crate) right: Option<NodeId>,
    relations: [Option<RelationRef>; 2],

    pub kind: NodeKind,
    /// Root of a nested query; passes never cross this boundary
    pub subquery: bool,
    pub join_kind: JoinKind,
    pub join_condition: JoinCondition,
    pub predicate: Option<Expression>,
    pub join_predicate: Option<Expression>,
    pub attributes: Vec<Attribute>,
}

impl QueryNode {
    /// Create a detached node. Prefer `QueryTree::new_node`, which hands out
    /// a fresh identity.
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        QueryNode {
            id,
            parent: None,
            side: ChildSide::Root,
            left: None,
            right: None,
            relations: [None, None],
            kind,
            subquery: false,
            join_kind: JoinKind::Unknown,
            join_condition: JoinCondition::Undefined,
            predicate: None,
            join_predicate: None,
            attributes: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn side(&self) -> ChildSide {
        self.side
    }

    pub fn left(&self) -> Option<NodeId> {
        self.left
    }

    pub fn right(&self) -> Option<NodeId> {
        self.right
    }

    pub fn child(&self, side: ChildSide) -> Option<NodeId> {
        match side {
            ChildSide::Left => self.left,
            ChildSide::Right => self.right,
            ChildSide::Root => None,
        }
    }

    pub(crate) fn child_slot_mut(&mut self, side: ChildSide) -> Option<&mut Option<NodeId>> {
        match side {
            ChildSide::Left => Some(&mut self.left),
            ChildSide::Right => Some(&mut self.right),
            ChildSide::Root => None,
        }
    }

    /// Children in left, right order
    pub fn children(&self) -> impl Iterator<Item = NodeId> {
        self.left.into_iter().chain(self.right)
    }

    pub fn child_count(&self) -> usize {
        self.children().count()
    }

    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    /// Kind Join, or implicitly a join by holding two relations
    pub fn is_join_like(&self) -> bool {
        self.kind == NodeKind::Join || self.relation_count() == 2
    }

    pub fn relations(&self) -> impl Iterator<Item = &RelationRef> {
        self.relations.iter().flatten()
    }

    pub fn relation_count(&self) -> usize {
        self.relations().count()
    }

    pub fn relation(&self, slot: usize) -> Option<&RelationRef> {
        self.relations.get(slot).and_then(|r| r.as_ref())
    }

    /// Slot holding the relation named `name`
    pub fn relation_slot(&self, name: &str) -> Option<usize> {
        self.relations
            .iter()
            .position(|r| r.as_ref().is_some_and(|r| r.matches(name)))
    }

    pub fn owns_relation(&self, name: &str) -> bool {
        self.relation_slot(name).is_some()
    }

    /// Add a relation in the first free slot. A relation already present is
    /// ignored; a third distinct relation is rejected.
    pub fn add_relation(&mut self, relation: RelationRef) -> PlanResult<()> {
        if self.owns_relation(relation.name()) {
            return Ok(());
        }
        match self.relations.iter_mut().find(|r| r.is_none()) {
            Some(slot) => {
                *slot = Some(relation);
                Ok(())
            }
            None => Err(PlanError::StructuralInvariantViolation(format!(
                "node {} already holds two relations, cannot add {}",
                self.id,
                relation.name()
            ))),
        }
    }

    /// Place a relation in a specific slot
    pub fn set_relation(&mut self, slot: usize, relation: RelationRef) -> PlanResult<()> {
        let other = 1 - slot.min(1);
        if self.relation(other).is_some_and(|r| r.matches(relation.name())) {
            return Err(PlanError::StructuralInvariantViolation(format!(
                "node {} already holds relation {}",
                self.id,
                relation.name()
            )));
        }
        match self.relations.get_mut(slot) {
            Some(entry) if entry.is_none() => {
                *entry = Some(relation);
                Ok(())
            }
            Some(_) => Err(PlanError::StructuralInvariantViolation(format!(
                "relation slot {} of node {} is occupied",
                slot, self.id
            ))),
            None => Err(PlanError::StructuralInvariantViolation(format!(
                "relation slot {} out of range",
                slot
            ))),
        }
    }

    pub fn take_relation(&mut self, slot: usize) -> Option<RelationRef> {
        self.relations.get_mut(slot).and_then(|r| r.take())
    }

    pub fn take_relations(&mut self) -> Vec<RelationRef> {
        self.relations.iter_mut().filter_map(|r| r.take()).collect()
    }

    /// Append an attribute unless it repeats one already present. Hidden
    /// copies merge with any equal reference and a visible copy un-hides an
    /// existing hidden one; visible entries merge only at the same select-list
    /// position, so `SELECT a.x, a.x` keeps both.
    pub fn add_attribute(&mut self, attribute: Attribute) {
        let merges = |a: &Attribute| {
            a.same_reference(&attribute) && (a.hidden || attribute.hidden || a.ordinal == attribute.ordinal)
        };
        match self.attributes.iter_mut().find(|a| merges(&**a)) {
            Some(existing) => {
                if !attribute.hidden {
                    existing.hidden = false;
                    if existing.ordinal.is_none() {
                        existing.ordinal = attribute.ordinal;
                    }
                }
            }
            None => self.attributes.push(attribute),
        }
    }

    /// Remove and return the attributes qualified by `relation`
    pub fn take_attributes_of(&mut self, relation: &str) -> Vec<Attribute> {
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.attributes)
            .into_iter()
            .partition(|a| a.table == relation);
        self.attributes = kept;
        taken
    }

    pub fn visible_attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter().filter(|a| !a.hidden)
    }

    pub fn has_hidden_attributes(&self) -> bool {
        self.attributes.iter().any(|a| a.hidden)
    }
}
