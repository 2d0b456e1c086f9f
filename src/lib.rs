// querytree: relational query-plan trees and a heuristic rewriter

pub mod catalog;
pub mod query;

// Re-export key items for convenient access
pub use catalog::Catalog;
pub use query::ast::SelectStatement;
pub use query::planner::{
    cost_optimize, heuristic_optimize, HeuristicOptimizer, OptimizerConfig, PlanError, PlanResult, QueryTree,
    QueryTreeBuilder,
};
