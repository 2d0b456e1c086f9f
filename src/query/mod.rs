// Query Module
//
// The statement model handed over by a parser and the planner that turns it
// into an optimized query tree.

pub mod ast;
pub mod planner;

// Export key public interfaces
pub use ast::SelectStatement;
pub use planner::{QueryTree, QueryTreeBuilder};
