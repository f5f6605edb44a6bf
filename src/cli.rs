use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "lineage", about = "Reconstruct parent/child links between agent tasks")]
pub struct Cli {
    /// Path to the SQLite database [default: ~/.lineage/lineage.db]
    #[arg(long, env = "LINEAGE_DB", global = true)]
    pub db: Option<String>,

    /// Path to the config file [default: ~/.lineage/config.toml]
    #[arg(long, env = "LINEAGE_CONFIG", global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Overrides for the `[matching]` config section.
#[derive(Args, Default)]
pub struct MatchArgs {
    /// Key bound in characters
    #[arg(long)]
    pub max_length: Option<usize>,
    /// Shortest shared prefix accepted for non-identical keys
    #[arg(long)]
    pub min_prefix: Option<usize>,
    /// Register a parent's full text when it quotes no sub-instructions
    #[arg(long, conflicts_with = "no_fallback")]
    pub fallback: bool,
    /// Never register full-text fallbacks
    #[arg(long)]
    pub no_fallback: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Import tasks from JSON Lines (one {id, instruction, workspace?, created_at?} per line)
    Import {
        /// Input file (omit to read from stdin)
        file: Option<String>,
    },

    /// Reconstruct parent links for all stored tasks and save them
    Rebuild {
        #[command(flatten)]
        matching: MatchArgs,
        /// Tie-break policy (none, longest, newest, workspace)
        #[arg(long)]
        tie_break: Option<String>,
        /// Output the pass result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show candidate parents for one task, before any tie-break
    Candidates {
        /// Task id
        id: String,
        #[command(flatten)]
        matching: MatchArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the sub-instructions quoted in a text
    Extract {
        /// Input file (omit to read from stdin)
        file: Option<String>,
    },

    /// Show stored links as a tree
    Tree {
        /// Root task for subtree
        #[arg(long)]
        root: Option<String>,
        /// Output links as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show task details
    Show {
        /// Task id
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
