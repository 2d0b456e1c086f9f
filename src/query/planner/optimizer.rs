// Query Optimizer Implementation
//
// Heuristic rewriting of a query tree: split overloaded nodes, push
// restrictions and projections toward the leaves, turn cross products with a
// matching join predicate into inner joins, prune what is left empty and
// finally wrap the tree in a Distinct node when the query asked for one.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;

use super::error::PlanResult;
use super::join_formation::{normalize_join_conditions, JoinFormation};
use super::node::{ChildSide, NodeKind};
use super::prune::prune;
use super::pushdown::{run_to_fixed_point, ProjectionPushdown, RelocationPass, RestrictionPushdown};
use super::split::NodeSplitter;
use super::tree::QueryTree;

/// Switches for the optional parts of heuristic optimization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Run the join formation pass
    pub form_joins: bool,
    /// Remove nodes left without work
    pub prune: bool,
    /// Iteration cap for each fixed-point pass. `None` means one more than
    /// the number of nodes in the tree.
    pub max_pass_iterations: Option<usize>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            form_joins: true,
            prune: true,
            max_pass_iterations: None,
        }
    }
}

/// The heuristic optimizer. Borrows the catalog used to resolve relations
/// while splitting nodes.
pub struct HeuristicOptimizer<'a> {
    catalog: &'a Catalog,
    config: OptimizerConfig,
}

impl<'a> HeuristicOptimizer<'a> {
    /// Create an optimizer with the default configuration
    pub fn new(catalog: &'a Catalog) -> Self {
        Self::with_config(catalog, OptimizerConfig::default())
    }

    pub fn with_config(catalog: &'a Catalog, config: OptimizerConfig) -> Self {
        HeuristicOptimizer { catalog, config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Rewrite `tree` in place. A tree that was already heuristically
    /// optimized is left alone.
    pub fn optimize(&self, tree: &mut QueryTree) -> PlanResult<()> {
        if tree.heuristically_optimized() {
            debug!("Query tree already heuristically optimized, skipping");
            return Ok(());
        }
        let nodes_before = tree.node_count();

        let splits = NodeSplitter::new(self.catalog).split_all(tree)?;
        debug!("Split {} overloaded nodes", splits);

        self.run_pass(&RestrictionPushdown, tree)?;
        self.run_pass(&ProjectionPushdown, tree)?;

        if self.config.form_joins {
            self.run_pass(&JoinFormation, tree)?;
            normalize_join_conditions(tree)?;
        }
        if self.config.prune {
            prune(tree)?;
        }
        wrap_distinct(tree)?;

        tree.mark_heuristically_optimized();
        info!(
            "Heuristic optimization finished: {} nodes before, {} after",
            nodes_before,
            tree.node_count()
        );
        Ok(())
    }

    fn run_pass(&self, pass: &dyn RelocationPass, tree: &mut QueryTree) -> PlanResult<usize> {
        run_to_fixed_point(pass, tree, self.config.max_pass_iterations)
    }
}

/// Put a Distinct node on top of the tree when the query asks for distinct
/// rows and the root is not one already.
fn wrap_distinct(tree: &mut QueryTree) -> PlanResult<()> {
    if !tree.distinct() {
        return Ok(());
    }
    let Some(root) = tree.root() else { return Ok(()) };
    if tree.node(root)?.kind == NodeKind::Distinct {
        return Ok(());
    }

    let distinct = tree.new_node(NodeKind::Distinct);
    let distinct = tree.add_detached(distinct)?;
    tree.replace_self(None, root, Some(distinct))?;
    tree.attach(distinct, ChildSide::Left, root)?;
    debug!("Wrapped query tree in Distinct node {}", distinct);
    Ok(())
}

/// Heuristically optimize `tree` with the default configuration
pub fn heuristic_optimize(tree: &mut QueryTree, catalog: &Catalog) -> PlanResult<()> {
    HeuristicOptimizer::new(catalog).optimize(tree)
}

/// Cost-based optimization is not performed; the tree is only marked so
/// callers can tell it went through this stage.
pub fn cost_optimize(tree: &mut QueryTree) -> PlanResult<()> {
    if !tree.cost_optimized() {
        tree.mark_cost_optimized();
        info!("Query tree marked cost optimized");
    }
    Ok(())
}
