use std::path::PathBuf;
use clap::{ArgAction, Parser, Subcommand};

#[derive(Debug, Parser, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct CLI {
    /// Path to the config file. Defaults to `config.toml` in the user config directory
    #[clap(long, global = true, env = "RECON_TOOLS_CONFIG")]
    pub config: Option<PathBuf>,
    /// Directory holding the tool definitions. Overrides `definitions_dir` from the config
    #[clap(long, global = true, env = "RECON_TOOLS_DEFINITIONS")]
    pub definitions: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[clap(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub(crate) command: ToolsCommand,
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum ToolsCommand {
    /// Installs a tool and its dependencies, or `all` tools
    Install {
        /// Tool name or `all`
        name: String,
        /// Number of independent tools installed at the same time
        #[clap(short, long)]
        jobs: Option<usize>,
        /// Per-command timeout in seconds (0 disables it)
        #[clap(long)]
        timeout: Option<u64>,
        /// Print the outcomes as JSON
        #[clap(long)]
        json: bool,
    },
    /// Runs the uninstall commands of a tool, or of `all` tools. Dependencies are left alone
    Uninstall {
        /// Tool name or `all`
        name: String,
        /// Per-command timeout in seconds (0 disables it)
        #[clap(long)]
        timeout: Option<u64>,
        #[clap(long)]
        json: bool,
    },
    /// Uninstalls and then installs a tool again
    Reinstall {
        name: String,
        #[clap(short, long)]
        jobs: Option<usize>,
        #[clap(long)]
        timeout: Option<u64>,
        #[clap(long)]
        json: bool,
    },
    /// Lists every known tool and whether it is installed
    List {
        /// Print the status as JSON
        #[clap(long)]
        json: bool,
    },
    /// Output the location of an installed tool
    Which {
        name: String,
    },
}
