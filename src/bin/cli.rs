use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;

use querytree::catalog::{Catalog, Table};
use querytree::query::ast::SelectStatement;
use querytree::query::planner::{HeuristicOptimizer, OptimizerConfig, QueryTree, QueryTreeBuilder};

#[derive(Parser)]
#[command(author, version, about = "qtree - build, optimize and print query trees")]
struct Cli {
    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the query tree, optimize it and print the rewritten SQL
    Optimize {
        /// JSON document with the tables and the statement
        file: PathBuf,

        /// Keep nodes that no longer do any work
        #[arg(long)]
        no_prune: bool,

        /// Leave cross products alone
        #[arg(long)]
        no_join_formation: bool,

        /// Iteration cap for each pushdown pass
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Print the query tree before the SQL
        #[arg(long)]
        plan: bool,
    },

    /// Build the query tree and print it as SQL without optimizing
    Sql {
        /// JSON document with the tables and the statement
        file: PathBuf,

        /// Print the query tree before the SQL
        #[arg(long)]
        plan: bool,
    },
}

/// Input document: the tables a statement may reference and the statement
#[derive(Deserialize)]
struct QueryDocument {
    /// Database the tables are created in and relations default to
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    tables: Vec<Table>,
    /// Optimizer settings; command-line flags override them
    #[serde(default)]
    optimizer: OptimizerConfig,
    statement: SelectStatement,
}

impl QueryDocument {
    fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn catalog(&self) -> Result<Catalog> {
        let mut catalog = Catalog::new();
        let schema = match &self.database {
            Some(name) => {
                if catalog.get_schema(name).is_none() {
                    catalog.create_schema(name.clone()).map_err(anyhow::Error::msg)?;
                }
                name.clone()
            }
            None => catalog.current_schema().to_string(),
        };
        for table in &self.tables {
            catalog
                .create_table_in(&schema, table.clone())
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("Failed to register table {}", table.name()))?;
        }
        Ok(catalog)
    }

    fn build(&self, catalog: &Catalog) -> Result<QueryTree> {
        let mut builder = QueryTreeBuilder::new(catalog);
        if let Some(database) = &self.database {
            builder = builder.with_database(database);
        }
        builder
            .build(&self.statement)
            .context("Failed to build the query tree")
    }
}

fn print_tree(tree: &QueryTree, plan: bool) -> Result<()> {
    if plan {
        print!("{}", tree);
        println!();
    }
    let sql = tree.to_query_string().context("Failed to render the query tree")?;
    println!("{}", sql);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Optimize { file, no_prune, no_join_formation, max_iterations, plan } => {
            let document = QueryDocument::load(&file)?;
            let catalog = document.catalog()?;
            let mut tree = document.build(&catalog)?;

            let mut config = document.optimizer.clone();
            if no_prune {
                config.prune = false;
            }
            if no_join_formation {
                config.form_joins = false;
            }
            if max_iterations.is_some() {
                config.max_pass_iterations = max_iterations;
            }

            HeuristicOptimizer::with_config(&catalog, config)
                .optimize(&mut tree)
                .context("Failed to optimize the query tree")?;
            print_tree(&tree, plan)?;
        }
        Commands::Sql { file, plan } => {
            let document = QueryDocument::load(&file)?;
            let catalog = document.catalog()?;
            let tree = document.build(&catalog)?;
            print_tree(&tree, plan)?;
        }
    }

    Ok(())
}
