use crate::bridge::BridgeMode;
use crate::watch::WatchMode;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "livescope",
    version,
    about = "Route and dependency intelligence for TypeScript projects",
    after_help = r#"Examples:
  livescope routes --root .
  livescope routes --root . --all
  livescope expand --root . --file src/handlers.ts --function createUser
  livescope request --method match_route --params '{"method":"GET","path":"/users/42"}'
  livescope watch --root . --debounce-ms 100
  livescope serve --root . --bridge lsp
"#
)]
pub struct Args {
    /// Log filter used when RUST_LOG is unset (error|warn|info|debug|trace).
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(ClapArgs, Clone)]
pub struct ProjectArgs {
    /// Directory to start the tsconfig.json search from.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
    /// Compiler service implementation: in-process|lsp.
    #[arg(long, default_value = "in-process")]
    pub bridge: BridgeMode,
    /// Include files ignored by .gitignore.
    #[arg(long)]
    pub no_ignore: bool,
}

#[derive(ClapArgs, Clone)]
pub struct WatchArgs {
    /// File watch mode: auto|on|off.
    #[arg(long, default_value = "auto")]
    pub watch: WatchMode,
    /// Debounce window for file events and re-analysis, in milliseconds.
    #[arg(long)]
    pub debounce_ms: Option<u64>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the dominant router and its flattened routes.
    Routes {
        #[command(flatten)]
        project: ProjectArgs,
        /// Print every extracted router instead of only the dominant one.
        #[arg(long)]
        all: bool,
    },
    /// Expand a function's out-of-scope identifiers into their definitions.
    Expand {
        #[command(flatten)]
        project: ProjectArgs,
        /// Source file, absolute or relative to the project root.
        #[arg(long)]
        file: PathBuf,
        /// Function name, or the function's full source text.
        #[arg(long)]
        function: String,
        #[arg(long)]
        max_depth: Option<usize>,
    },
    /// Watch the project and print one JSON line per completed route analysis.
    Watch {
        #[command(flatten)]
        project: ProjectArgs,
        #[command(flatten)]
        watch: WatchArgs,
    },
    /// Run JSONL RPC server over stdin/stdout.
    Serve {
        #[command(flatten)]
        project: ProjectArgs,
        #[command(flatten)]
        watch: WatchArgs,
    },
    /// Run a single JSONL request and exit.
    Request {
        #[command(flatten)]
        project: ProjectArgs,
        #[arg(long)]
        method: String,
        #[arg(long, default_value = "{}")]
        params: String,
        #[arg(long, value_name = "PATH")]
        params_file: Option<PathBuf>,
        #[arg(long, default_value = "1")]
        id: String,
    },
}
