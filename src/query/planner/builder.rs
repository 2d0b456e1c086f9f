// Query Tree Builder
//
// Turns a SELECT statement into the initial query tree. The tree is
// deliberately "overloaded": the top node both projects and filters, and a
// two-relation join also carries the select list. The optimizer's split
// passes take these apart.
//
// Shape of the result, top down:
//   Sort (ORDER BY)
//   Restrict nodes holding the join predicates found in WHERE
//   top node: the select list and the remaining WHERE conjuncts
//   left-deep chain of joins over the FROM items

use log::debug;

use crate::catalog::{Catalog, Table};
use crate::query::ast::{
    ColumnReference, Expression, FromItem, JoinConstraint, JoinType, SelectColumn, SelectStatement,
};

use super::error::{PlanError, PlanResult};
use super::node::{Attribute, ChildSide, JoinCondition, JoinKind, NodeId, NodeKind, RelationRef};
use super::predicate::{build_conjunction, equi_join_relations, split_conjunction};
use super::tree::QueryTree;

/// One operand of the join chain
enum Operand {
    Relation(RelationRef),
    Subtree(NodeId),
}

/// A FROM item joined onto everything before it
struct JoinStep {
    kind: JoinKind,
    constraint: JoinConstraint,
    operand: Operand,
}

/// Relations visible to the column references of one SELECT
struct Scope<'a> {
    relations: Vec<(RelationRef, &'a Table)>,
    has_subqueries: bool,
}

impl Scope<'_> {
    fn find(&self, name: &str) -> Option<&(RelationRef, &Table)> {
        self.relations.iter().find(|(r, _)| r.matches(name))
    }

    fn qualify_column(&self, column: &ColumnReference) -> PlanResult<ColumnReference> {
        match &column.table {
            Some(qualifier) => {
                let (_, table) = self
                    .find(qualifier)
                    .ok_or_else(|| PlanError::UnresolvableRelation(qualifier.clone()))?;
                if column.name != "*" && !table.has_column(&column.name) {
                    return Err(PlanError::ColumnNotFound(column.to_string()));
                }
                Ok(column.clone())
            }
            None => {
                let mut owners = self.relations.iter().filter(|(_, t)| t.has_column(&column.name));
                match (owners.next(), owners.next()) {
                    (Some((relation, _)), None) => Ok(ColumnReference::qualified(relation.name(), &column.name)),
                    (Some(_), Some(_)) => Err(PlanError::AmbiguousColumn(column.name.clone())),
                    (None, _) if self.has_subqueries => Ok(column.clone()),
                    (None, _) => Err(PlanError::ColumnNotFound(column.name.clone())),
                }
            }
        }
    }

    fn qualify(&self, expr: &Expression) -> PlanResult<Expression> {
        Ok(match expr {
            Expression::Column(column) => Expression::Column(self.qualify_column(column)?),
            Expression::Literal(value) => Expression::Literal(value.clone()),
            Expression::BinaryOp { left, op, right } => Expression::BinaryOp {
                left: Box::new(self.qualify(left)?),
                op: *op,
                right: Box::new(self.qualify(right)?),
            },
            Expression::UnaryOp { op, expr } => Expression::UnaryOp {
                op: *op,
                expr: Box::new(self.qualify(expr)?),
            },
            Expression::IsNull { expr, not } => Expression::IsNull {
                expr: Box::new(self.qualify(expr)?),
                not: *not,
            },
            Expression::Function { name, args } => Expression::Function {
                name: name.clone(),
                args: args.iter().map(|a| self.qualify(a)).collect::<PlanResult<Vec<_>>>()?,
            },
        })
    }
}

/// Builds query trees from SELECT statements
pub struct QueryTreeBuilder<'a> {
    catalog: &'a Catalog,
    database: Option<String>,
}

impl<'a> QueryTreeBuilder<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        QueryTreeBuilder { catalog, database: None }
    }

    /// Default database for relations that do not name one
    pub fn with_database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }

    /// Build the initial query tree for `statement`
    pub fn build(&self, statement: &SelectStatement) -> PlanResult<QueryTree> {
        let mut tree = QueryTree::new();
        if let Some(database) = &self.database {
            tree.set_database(database);
        }
        tree.set_distinct(statement.distinct);

        let top = self.build_select(&mut tree, statement)?;
        tree.set_root(top)?;
        debug!("Built query tree with {} nodes", tree.node_count());
        Ok(tree)
    }

    /// Build the fragment for one SELECT and return its (detached) top node
    fn build_select(&self, tree: &mut QueryTree, statement: &SelectStatement) -> PlanResult<NodeId> {
        let mut scope = Scope { relations: Vec::new(), has_subqueries: false };

        let mut items = statement.from.iter();
        let first = items
            .next()
            .ok_or_else(|| PlanError::UnsupportedStatement("SELECT without FROM".to_string()))?;
        let first = self.operand(tree, &mut scope, first)?;

        let mut steps = Vec::new();
        for item in items {
            steps.push(JoinStep {
                kind: JoinKind::CrossProduct,
                constraint: JoinConstraint::None,
                operand: self.operand(tree, &mut scope, item)?,
            });
        }
        for clause in &statement.joins {
            steps.push(JoinStep {
                kind: join_kind(clause.join_type),
                constraint: clause.constraint.clone(),
                operand: self.operand(tree, &mut scope, &clause.item)?,
            });
        }

        // Top node: a lone relation, a lone two-relation join, or a fresh
        // composite Project over the join chain.
        let single_join = steps.len() == 1
            && matches!(first, Operand::Relation(_))
            && matches!(steps[0].operand, Operand::Relation(_));
        let top = if steps.is_empty() {
            let mut project = tree.new_node(NodeKind::Project);
            match first {
                Operand::Relation(relation) => {
                    project.add_relation(relation)?;
                    tree.add_detached(project)?
                }
                Operand::Subtree(child) => {
                    let id = tree.add_detached(project)?;
                    tree.attach(id, ChildSide::Left, child)?;
                    id
                }
            }
        } else {
            let chain = self.build_join_chain(tree, &scope, first, steps)?;
            if single_join {
                chain
            } else {
                let project = tree.new_node(NodeKind::Project);
                let id = tree.add_detached(project)?;
                tree.attach(id, ChildSide::Left, chain)?;
                id
            }
        };

        for (ordinal, column) in statement.columns.iter().enumerate() {
            let attribute = match column {
                SelectColumn::Wildcard => Attribute::wildcard(),
                SelectColumn::Column(c) => attribute_of(&scope.qualify_column(c)?),
                SelectColumn::Aliased { column, alias } => {
                    attribute_of(&scope.qualify_column(column)?).with_alias(alias)
                }
            };
            tree.insert_attribute(top, attribute.with_ordinal(ordinal))?;
        }

        // WHERE: equalities between two relations become pending join
        // predicates, everything else filters at the top node.
        let mut join_groups: Vec<((String, String), Vec<Expression>)> = Vec::new();
        let mut residual = Vec::new();
        if let Some(where_clause) = &statement.where_clause {
            for conjunct in split_conjunction(&scope.qualify(where_clause)?) {
                match equi_join_relations(&conjunct) {
                    Some((a, b)) => {
                        let key = if a <= b { (a, b) } else { (b, a) };
                        match join_groups.iter_mut().find(|(k, _)| *k == key) {
                            Some((_, group)) => group.push(conjunct),
                            None => join_groups.push((key, vec![conjunct])),
                        }
                    }
                    None => residual.push(conjunct),
                }
            }
        }
        tree.node_mut(top)?.predicate = build_conjunction(residual);

        let mut current = top;
        for (_, group) in join_groups {
            let mut restrict = tree.new_node(NodeKind::Restrict);
            restrict.join_predicate = build_conjunction(group);
            let id = tree.add_detached(restrict)?;
            tree.attach(id, ChildSide::Left, current)?;
            current = id;
        }

        if !statement.order_by.is_empty() {
            let mut sort = tree.new_node(NodeKind::Sort);
            for key in &statement.order_by {
                sort.add_attribute(attribute_of(&scope.qualify_column(key)?));
            }
            let id = tree.add_detached(sort)?;
            tree.attach(id, ChildSide::Left, current)?;
            current = id;
        }

        Ok(current)
    }

    /// Resolve a FROM item into a join operand, registering its relation
    fn operand(&self, tree: &mut QueryTree, scope: &mut Scope<'a>, item: &FromItem) -> PlanResult<Operand> {
        match item {
            FromItem::Table(table_ref) => {
                let mut relation = RelationRef::new(&table_ref.name);
                if let Some(database) = &table_ref.database {
                    relation = relation.with_database(database);
                }
                if let Some(alias) = &table_ref.alias {
                    relation = relation.with_alias(alias);
                }
                if scope.find(relation.name()).is_some() {
                    return Err(PlanError::UnsupportedStatement(format!(
                        "relation {} appears twice; give it an alias",
                        relation.name()
                    )));
                }
                let table = self.catalog.resolve(&relation, tree.database())?;
                scope.relations.push((relation.clone(), table));
                Ok(Operand::Relation(relation))
            }
            FromItem::Subquery(statement) => {
                if statement.distinct {
                    return Err(PlanError::UnsupportedStatement(
                        "DISTINCT inside a nested query".to_string(),
                    ));
                }
                let id = self.build_select(tree, statement)?;
                tree.node_mut(id)?.subquery = true;
                scope.has_subqueries = true;
                Ok(Operand::Subtree(id))
            }
        }
    }

    /// Left-deep chain: the first join holds the first two operands, each
    /// later join takes the chain so far on its left.
    fn build_join_chain(
        &self,
        tree: &mut QueryTree,
        scope: &Scope<'a>,
        first: Operand,
        steps: Vec<JoinStep>,
    ) -> PlanResult<NodeId> {
        let mut left = first;
        let mut seen: Vec<String> = Vec::new();
        if let Operand::Relation(relation) = &left {
            seen.push(relation.name().to_string());
        }

        for step in steps {
            let mut join = tree.new_node(NodeKind::Join);
            join.join_kind = step.kind;

            match &step.constraint {
                JoinConstraint::None => {}
                JoinConstraint::On(condition) => {
                    join.join_predicate = Some(scope.qualify(condition)?);
                    join.join_condition = JoinCondition::On;
                }
                JoinConstraint::Natural => join.join_condition = JoinCondition::Natural,
                JoinConstraint::Using(columns) => {
                    let Operand::Relation(right) = &step.operand else {
                        return Err(PlanError::UnsupportedStatement(
                            "USING against a nested query".to_string(),
                        ));
                    };
                    join.join_predicate = using_predicate(scope, &seen, right, columns)?;
                    join.join_condition = JoinCondition::Using;
                }
            }
            if let Operand::Relation(relation) = &step.operand {
                seen.push(relation.name().to_string());
            }

            let id = tree.add_detached(join)?;
            place_operand(tree, id, ChildSide::Left, left)?;
            place_operand(tree, id, ChildSide::Right, step.operand)?;
            left = Operand::Subtree(id);
        }

        match left {
            Operand::Subtree(id) => Ok(id),
            Operand::Relation(_) => Err(PlanError::StructuralInvariantViolation(
                "join chain has no join node".to_string(),
            )),
        }
    }
}

fn place_operand(tree: &mut QueryTree, join: NodeId, side: ChildSide, operand: Operand) -> PlanResult<()> {
    match operand {
        Operand::Relation(relation) => {
            let slot = side.slot().unwrap_or(0);
            tree.node_mut(join)?.set_relation(slot, relation)
        }
        Operand::Subtree(child) => tree.attach(join, side, child),
    }
}

/// `USING (c1, c2)` as `l.c1 = r.c1 AND l.c2 = r.c2`, where `l` is the
/// earliest relation already joined that has the column.
fn using_predicate(
    scope: &Scope<'_>,
    seen: &[String],
    right: &RelationRef,
    columns: &[String],
) -> PlanResult<Option<Expression>> {
    let mut conditions = Vec::new();
    for column in columns {
        let left = seen
            .iter()
            .find(|name| scope.find(name).is_some_and(|(_, t)| t.has_column(column)))
            .ok_or_else(|| PlanError::ColumnNotFound(column.clone()))?;
        let right_has = scope.find(right.name()).is_some_and(|(_, t)| t.has_column(column));
        if !right_has {
            return Err(PlanError::ColumnNotFound(format!("{}.{}", right.name(), column)));
        }
        conditions.push(Expression::eq(
            Expression::column(left, column),
            Expression::column(right.name(), column),
        ));
    }
    Ok(build_conjunction(conditions))
}

fn attribute_of(column: &ColumnReference) -> Attribute {
    Attribute::new(column.table.as_deref().unwrap_or(""), &column.name)
}

fn join_kind(join_type: JoinType) -> JoinKind {
    match join_type {
        JoinType::Inner => JoinKind::Inner,
        JoinType::LeftOuter => JoinKind::LeftOuter,
        JoinType::RightOuter => JoinKind::RightOuter,
        JoinType::FullOuter => JoinKind::FullOuter,
        JoinType::Cross => JoinKind::CrossProduct,
    }
}
