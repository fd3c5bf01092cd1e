//! Binary-local application wiring.
//!
//! `main.rs` parses arguments and loads configuration; this module starts
//! the host, then runs the select loop between stdin and the extension.

pub(crate) mod render;
pub(crate) mod session;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use termhost::config::Config;
use termhost::demo;
use termhost::host::{ExtensionHost, StaticModuleLoader, HOST_DIR};
use termhost::logs::LogService;
use termhost::protocol::WebviewMessage;
use tokio::io::{AsyncBufReadExt, BufReader};

use render::{RenderSink, Renderer};
use session::{Flow, Outbox, Session};

/// Run one interactive session and return the process exit code.
pub(crate) async fn run(config: Config, cwd: PathBuf, task: Option<String>, color: bool) -> i32 {
    let renderer: Arc<dyn RenderSink> = Arc::new(Renderer::new(color));

    let extension_path = match bundle_path(&config, &cwd) {
        Ok(path) => path,
        Err(err) => {
            renderer.error(&format!("failed to prepare the echo bundle: {err}"));
            return 1;
        }
    };

    let mut loader = StaticModuleLoader::new();
    demo::register(&mut loader, config.echo_options());
    let logs = Arc::new(LogService::new(config.logging.max_entries));
    let host = Arc::new(ExtensionHost::new(Arc::new(loader), logs));
    let mut backend_rx = host.backend_messages();

    let options = config.host_options(&cwd, extension_path);
    renderer.status(&format!(
        "Hosting {} in {}",
        options.extension_path.display(),
        options.workspace_path.display()
    ));
    if let Err(err) = host.start(options).await {
        renderer.error(&err.to_string());
        return 1;
    }

    let outbox: Outbox = {
        let host = Arc::clone(&host);
        Arc::new(move |message: WebviewMessage| host.post_to_backend(message))
    };
    let mut session = Session::new(outbox, Arc::clone(&renderer), config.autocomplete.max_visible);
    if let Some(task) = task {
        session.handle_input(&task).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    renderer.prompt();
    loop {
        tokio::select! {
            Some(message) = backend_rx.recv() => {
                session.handle_extension_message(&message);
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if session.handle_input(&line).await == Flow::Exit {
                        break;
                    }
                    renderer.prompt();
                }
                Ok(None) => break,
                Err(err) => {
                    renderer.error(&format!("failed to read input: {err}"));
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let report = host.stop().await;
    for error in &report.errors {
        renderer.warn(error);
    }
    0
}

/// Configured bundle, or the echo bundle written under the workspace.
fn bundle_path(config: &Config, cwd: &Path) -> std::io::Result<PathBuf> {
    if let Some(path) = &config.host.extension_path {
        return Ok(path.clone());
    }
    let root = config
        .host
        .workspace_dir(cwd)
        .join(HOST_DIR)
        .join("echo-bundle");
    demo::write_bundle(&root)?;
    Ok(root)
}
