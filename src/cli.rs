//! CLI argument parsing via clap.

use clap::Parser;
use std::path::PathBuf;

/// Run an editor extension headless behind a terminal front end.
#[derive(Debug, Parser)]
#[command(name = "termhost", version)]
pub struct Args {
    /// Task to start with once the extension is active.
    pub task: Option<String>,

    /// Path to config file (default: ./termhost.toml or ~/.config/termhost/termhost.toml).
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Workspace directory the extension operates on.
    #[arg(short = 'w', long = "workspace")]
    pub workspace: Option<PathBuf>,

    /// Extension bundle directory. Without one, the built-in echo bundle runs.
    #[arg(short = 'e', long = "extension-path")]
    pub extension_path: Option<PathBuf>,

    /// Directory holding the extension's unpacked native binaries.
    #[arg(long = "bin-unpacked-path")]
    pub bin_unpacked_path: Option<PathBuf>,

    /// Record relayed message types in the diagnostic log.
    #[arg(long = "trace-bridge")]
    pub trace_bridge: bool,

    /// Load modules without handing them the intercepted console.
    #[arg(long = "no-module-hook")]
    pub no_module_hook: bool,

    /// Print the default configuration file and exit.
    #[arg(long = "print-config")]
    pub print_config: bool,

    /// Disable color output.
    #[arg(long = "no-color")]
    pub no_color: bool,
}
