//! Command-line interface built on clap.
//!
//! [`Cli`] carries the global flags; [`Command`] the subcommands
//! (`run`, `status`, `analyze`).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::skills::ModelTier;

/// Mailroom: processes every queued document through a fixed intake workflow.
#[derive(Debug, Parser)]
#[command(name = "mailroom", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the config file (defaults to ./mailroom.toml if present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Model tier for analysis, overriding the config file.
    #[arg(long, global = true)]
    pub model: Option<ModelArg>,

    /// Debug logging for this crate.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    pub json_logs: bool,
}

/// Model argument accepted on the command line, mapped to [`ModelTier`].
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModelArg {
    /// Fast and cheap.
    Haiku,
    /// Balanced.
    Sonnet,
    /// Most capable.
    Opus,
}

impl From<ModelArg> for ModelTier {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Haiku => ModelTier::Haiku,
            ModelArg::Sonnet => ModelTier::Sonnet,
            ModelArg::Opus => ModelTier::Opus,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Process the inbox once, or repeatedly with --cyclic.
    Run {
        /// Keep running, one cycle per interval, until Ctrl-C.
        #[arg(long)]
        cyclic: bool,

        /// Seconds between cycles in cyclic mode.
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Show configured locations and pending items.
    Status,

    /// Analyze a single file and print the result as JSON. Nothing is moved or saved.
    Analyze {
        file: PathBuf,
    },
}
