//! CLI entry point for termhost.

mod app;
mod cli;

use clap::Parser;
use termhost::config::{default_config_template, load_config, Config};
use termhost::logging;

#[tokio::main]
async fn main() {
    let args = cli::Args::parse();

    if args.print_config {
        print!("{}", default_config_template());
        return;
    }

    // Load config.
    let mut config = match load_config(args.config.as_deref()) {
        Ok(loaded) => loaded.config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    apply_cli_overrides(&mut config, &args);

    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            eprintln!("error: cannot determine the current directory: {e}");
            std::process::exit(1);
        }
    };

    let log_guard = match logging::init(&config.log_dir(&cwd), &config.logging.level) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: diagnostic logging disabled: {e}");
            None
        }
    };

    let code = app::run(config, cwd, args.task.clone(), !args.no_color).await;
    drop(log_guard);
    if code != 0 {
        std::process::exit(code);
    }
}

/// Flags win over file and environment values.
fn apply_cli_overrides(config: &mut Config, args: &cli::Args) {
    if let Some(workspace) = &args.workspace {
        config.host.workspace = Some(workspace.clone());
    }
    if let Some(path) = &args.extension_path {
        config.host.extension_path = Some(path.clone());
    }
    if let Some(path) = &args.bin_unpacked_path {
        config.host.bin_unpacked_path = Some(path.clone());
    }
    if args.trace_bridge {
        config.bridge.log_traffic = true;
    }
    if args.no_module_hook {
        config.host.intercept_modules = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn flags_override_loaded_values() {
        let mut config = Config::default();
        config.host.workspace = Some(PathBuf::from("/from-file"));
        let args = cli::Args::parse_from([
            "termhost",
            "--workspace",
            "/from-flag",
            "--trace-bridge",
            "--no-module-hook",
        ]);
        apply_cli_overrides(&mut config, &args);
        assert_eq!(config.host.workspace, Some(PathBuf::from("/from-flag")));
        assert!(config.bridge.log_traffic);
        assert!(!config.host.intercept_modules);
        assert!(config.host.extension_path.is_none());
    }
}
