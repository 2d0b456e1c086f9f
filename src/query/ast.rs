// Query Abstract Syntax Tree (AST)
//
// This module defines the statement and expression nodes a parser hands to
// the query tree builder. Text parsing itself lives outside this crate.

use std::fmt;
use serde::{Serialize, Deserialize};

/// SELECT statement representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectStatement {
    /// SELECT DISTINCT
    #[serde(default)]
    pub distinct: bool,
    /// Columns in SELECT clause
    pub columns: Vec<SelectColumn>,
    /// FROM clause items (comma separated, i.e. cross products)
    pub from: Vec<FromItem>,
    /// Explicit JOIN clauses following the FROM items
    #[serde(default)]
    pub joins: Vec<JoinClause>,
    /// WHERE clause (optional)
    #[serde(default)]
    pub where_clause: Option<Box<Expression>>,
    /// ORDER BY columns
    #[serde(default)]
    pub order_by: Vec<ColumnReference>,
}

/// Column in a SELECT statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectColumn {
    /// All columns (*)
    Wildcard,
    /// Regular column reference
    Column(ColumnReference),
    /// Column reference with an output alias
    Aliased {
        column: ColumnReference,
        alias: String,
    },
}

/// Column reference (could be qualified with table name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnReference {
    #[serde(default)]
    pub table: Option<String>,
    pub name: String,
}

impl ColumnReference {
    /// Create a qualified column reference
    pub fn qualified(table: &str, name: &str) -> Self {
        ColumnReference {
            table: Some(table.to_string()),
            name: name.to_string(),
        }
    }

    /// Create an unqualified column reference
    pub fn bare(name: &str) -> Self {
        ColumnReference {
            table: None,
            name: name.to_string(),
        }
    }
}

/// Table reference in FROM clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableReference {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    /// Database the table lives in, if not the default one
    #[serde(default)]
    pub database: Option<String>,
}

/// Item of a FROM clause or the right-hand side of a JOIN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FromItem {
    Table(TableReference),
    Subquery(Box<SelectStatement>),
}

/// JOIN types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
    Cross,
}

/// How a JOIN clause constrains its rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JoinConstraint {
    None,
    On(Expression),
    Using(Vec<String>),
    Natural,
}

/// JOIN clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub item: FromItem,
    pub constraint: JoinConstraint,
}

/// Expression in SQL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// Literal value
    Literal(Value),
    /// Column reference
    Column(ColumnReference),
    /// Binary operation (e.g., a + b, x = y)
    BinaryOp {
        left: Box<Expression>,
        op: Operator,
        right: Box<Expression>,
    },
    /// Unary operation (NOT, unary minus)
    UnaryOp {
        op: Operator,
        expr: Box<Expression>,
    },
    /// IS [NOT] NULL test
    IsNull {
        expr: Box<Expression>,
        not: bool,
    },
    /// Function call
    Function {
        name: String,
        args: Vec<Expression>,
    },
}

impl Expression {
    /// Shorthand for a qualified column expression
    pub fn column(table: &str, name: &str) -> Self {
        Expression::Column(ColumnReference::qualified(table, name))
    }

    /// Shorthand for a binary operation
    pub fn binary(left: Expression, op: Operator, right: Expression) -> Self {
        Expression::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// `left = right`
    pub fn eq(left: Expression, right: Expression) -> Self {
        Expression::binary(left, Operator::Equals, right)
    }

    /// `left AND right`
    pub fn and(left: Expression, right: Expression) -> Self {
        Expression::binary(left, Operator::And, right)
    }

    /// `left OR right`
    pub fn or(left: Expression, right: Expression) -> Self {
        Expression::binary(left, Operator::Or, right)
    }

    fn precedence(&self) -> u8 {
        match self {
            Expression::BinaryOp { op, .. } => op.precedence(),
            Expression::UnaryOp { op: Operator::Not, .. } => 3,
            Expression::IsNull { .. } => 4,
            _ => u8::MAX,
        }
    }
}

/// SQL values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
}

/// SQL operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    // Comparison
    Equals,
    NotEquals,
    LessThan,
    GreaterThan,
    LessEquals,
    GreaterEquals,
    // Logical
    And,
    Or,
    Not,
    // Arithmetic
    Plus,
    Minus,
    Multiply,
    Divide,
}

impl Operator {
    fn precedence(&self) -> u8 {
        match self {
            Operator::Or => 1,
            Operator::And => 2,
            Operator::Not => 3,
            Operator::Equals
            | Operator::NotEquals
            | Operator::LessThan
            | Operator::GreaterThan
            | Operator::LessEquals
            | Operator::GreaterEquals => 4,
            Operator::Plus | Operator::Minus => 5,
            Operator::Multiply | Operator::Divide => 6,
        }
    }

    fn is_associative(&self) -> bool {
        matches!(self, Operator::And | Operator::Or | Operator::Plus | Operator::Multiply)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Equals => "=",
            Operator::NotEquals => "<>",
            Operator::LessThan => "<",
            Operator::GreaterThan => ">",
            Operator::LessEquals => "<=",
            Operator::GreaterEquals => ">=",
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Not => "NOT",
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Boolean(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
        }
    }
}

impl fmt::Display for ColumnReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Writes `child`, parenthesized when it binds looser than its parent.
fn write_operand(
    f: &mut fmt::Formatter<'_>,
    child: &Expression,
    parent: &Operator,
    right_side: bool,
) -> fmt::Result {
    let needs_parens = if right_side && !parent.is_associative() {
        child.precedence() <= parent.precedence()
    } else {
        child.precedence() < parent.precedence()
    };
    if needs_parens {
        write!(f, "({})", child)
    } else {
        write!(f, "{}", child)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(v) => write!(f, "{}", v),
            Expression::Column(c) => write!(f, "{}", c),
            Expression::BinaryOp { left, op, right } => {
                write_operand(f, left, op, false)?;
                write!(f, " {} ", op)?;
                write_operand(f, right, op, true)
            }
            Expression::UnaryOp { op, expr } => {
                match op {
                    Operator::Not => f.write_str("NOT ")?,
                    other => write!(f, "{}", other)?,
                }
                if expr.precedence() < Operator::Not.precedence() || matches!(**expr, Expression::BinaryOp { .. }) {
                    write!(f, "({})", expr)
                } else {
                    write!(f, "{}", expr)
                }
            }
            Expression::IsNull { expr, not } => {
                if expr.precedence() <= 4 {
                    write!(f, "({})", expr)?;
                } else {
                    write!(f, "{}", expr)?;
                }
                f.write_str(if *not { " IS NOT NULL" } else { " IS NULL" })
            }
            Expression::Function { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}
