// Query Tree Errors
//
// Error type shared by the tree mutator, the builder and every rewrite pass.

use thiserror::Error;

use super::node::NodeId;

/// Errors that can occur while building, rewriting or rendering a query tree
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("Structural invariant violated: {0}")]
    StructuralInvariantViolation(String),
    #[error("Invalid attachment: {0}")]
    InvalidAttachment(String),
    #[error("Node {0} not found in query tree")]
    NodeNotFound(NodeId),
    #[error("Relation not found in catalog: {0}")]
    UnresolvableRelation(String),
    #[error("Predicate cannot be split for relation {relation}: {predicate}")]
    UnsplittablePredicate {
        relation: String,
        predicate: String,
    },
    #[error("Column not found: {0}")]
    ColumnNotFound(String),
    #[error("Ambiguous column reference: {0}")]
    AmbiguousColumn(String),
    #[error("Unsupported statement: {0}")]
    UnsupportedStatement(String),
}

/// Result type for query tree operations
pub type PlanResult<T> = Result<T, PlanError>;
