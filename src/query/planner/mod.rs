// Query Planner Module
//
// This module holds the query tree and the heuristic optimizer that
// rewrites it: node splitting, restriction and projection pushdown, join
// formation, pruning and rendering the tree back into SQL text.

pub mod error;
pub mod node;
pub mod tree;
pub mod predicate;
pub mod builder;
pub mod split;
pub mod pushdown;
pub mod join_formation;
pub mod prune;
pub mod optimizer;
pub mod serializer;
pub mod explain;

// Export key types
pub use self::builder::QueryTreeBuilder;
pub use self::error::{PlanError, PlanResult};
pub use self::node::{Attribute, ChildSide, JoinCondition, JoinKind, NodeId, NodeKind, QueryNode, RelationRef};
pub use self::optimizer::{cost_optimize, heuristic_optimize, HeuristicOptimizer, OptimizerConfig};
pub use self::serializer::to_query_string;
pub use self::tree::QueryTree;
