//! Echo bundle linked into the binary.
//!
//! A small extension that behaves like an agent turn without calling a
//! model: every `newTask` produces a request indicator, a streamed reply and
//! a completion ask, so the whole relay and split pipeline can be exercised
//! without credentials.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::console::Console;
use crate::error::ExtensionError;
use crate::host::{
    Extension, HostContext, ModuleExports, ModuleScope, StaticModuleLoader, DEFAULT_ENTRY,
    MANIFEST_FILE,
};
use crate::logs::now_unix_millis;
use crate::protocol::{
    kinds, ChatMessage, ChatMessageType, ExtensionMessage, WebviewMessage, API_REQ_STARTED,
};

pub const BUNDLE_NAME: &str = "termhost-echo";
pub const FORMATTER_MODULE: &str = "echo/formatter";
pub const PING_COMMAND: &str = "echo.ping";

#[derive(Debug, Clone)]
pub struct EchoOptions {
    /// Characters added per streamed chunk.
    pub chunk_chars: usize,
    pub chunk_delay: Duration,
}

impl Default for EchoOptions {
    fn default() -> Self {
        Self {
            chunk_chars: 8,
            chunk_delay: Duration::from_millis(30),
        }
    }
}

/// Library module required by the entry module.
pub struct EchoFormatter {
    prefix: String,
}

impl EchoFormatter {
    pub fn format(&self, task: &str) -> String {
        format!("{}{}", self.prefix, task.trim())
    }
}

/// Register the bundle's modules with `loader`.
pub fn register(loader: &mut StaticModuleLoader, options: EchoOptions) {
    loader.register(FORMATTER_MODULE, |scope| {
        scope.console().debug(crate::console_args!["formatter ready"]);
        Ok(ModuleExports::Library(Arc::new(EchoFormatter {
            prefix: "Echo: ".to_string(),
        })))
    });
    loader.register(DEFAULT_ENTRY, move |scope: &ModuleScope| {
        let formatter = scope
            .require(FORMATTER_MODULE)
            .map_err(ExtensionError::from)?
            .library::<EchoFormatter>()
            .ok_or_else(|| ExtensionError::new("formatter module exported the wrong type"))?;
        scope.console().info(crate::console_args![format!(
            "{BUNDLE_NAME} loaded from {}",
            scope.specifier()
        )]);
        Ok(ModuleExports::Extension(Arc::new(EchoExtension {
            formatter,
            options: options.clone(),
            console: scope.console().clone(),
            tasks: Arc::new(Mutex::new(Vec::new())),
        })))
    });
}

/// Write a manifest for the echo bundle under `root`.
pub fn write_bundle(root: &Path) -> std::io::Result<PathBuf> {
    fs::create_dir_all(root)?;
    let manifest = json!({
        "name": BUNDLE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "main": DEFAULT_ENTRY,
        "capabilities": ["commands", "messaging", "globalState"],
    });
    let path = root.join(MANIFEST_FILE);
    fs::write(&path, format!("{manifest:#}"))?;
    Ok(path)
}

struct EchoExtension {
    formatter: Arc<EchoFormatter>,
    options: EchoOptions,
    console: Console,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

#[async_trait]
impl Extension for EchoExtension {
    async fn activate(&self, context: Arc<HostContext>) -> Result<(), ExtensionError> {
        let runtime = Handle::try_current()
            .map_err(|err| ExtensionError::new(format!("no async runtime: {err}")))?;

        context.register_command(PING_COMMAND, |args| {
            Ok(json!({ "pong": args.first().cloned().unwrap_or(Value::Null) }))
        });

        let clock = Arc::new(TsClock::default());
        let handler_context = Arc::clone(&context);
        let formatter = Arc::clone(&self.formatter);
        let options = self.options.clone();
        let tasks = Arc::clone(&self.tasks);
        let console = self.console.clone();
        context.on_message(move |message: &WebviewMessage| {
            match message.kind() {
                kinds::NEW_TASK => {
                    let task = message.text().unwrap_or_default().to_string();
                    console.log(crate::console_args![format!("new task: {task}")]);
                    let turn = runtime.spawn(run_turn(
                        Arc::clone(&handler_context),
                        Arc::clone(&formatter),
                        options.clone(),
                        Arc::clone(&clock),
                        task,
                    ));
                    let mut tasks = tasks.lock().unwrap_or_else(|p| p.into_inner());
                    tasks.retain(|handle| !handle.is_finished());
                    tasks.push(turn);
                }
                kinds::ASK_RESPONSE => answer_last_ask(&handler_context),
                kinds::CLEAR_TASK => {
                    handler_context.update_state(|state| state.cline_messages.clear());
                    handler_context.broadcast_state();
                }
                _ => {}
            }
            Ok(())
        });

        let running = Arc::clone(&self.tasks);
        context.push_subscription(move || {
            let mut tasks = running.lock().unwrap_or_else(|p| p.into_inner());
            for handle in tasks.drain(..) {
                handle.abort();
            }
            Ok(())
        });
        self.console.info(crate::console_args!["echo extension activated"]);
        Ok(())
    }

    async fn deactivate(&self) -> Result<(), ExtensionError> {
        self.console.info(crate::console_args!["echo extension deactivated"]);
        Ok(())
    }
}

/// Monotonic message timestamps in unix milliseconds.
#[derive(Default)]
struct TsClock {
    last: AtomicU64,
}

impl TsClock {
    fn next(&self) -> u64 {
        let now = now_unix_millis();
        let mut prev = self.last.load(Ordering::Acquire);
        loop {
            let next = now.max(prev + 1);
            match self
                .last
                .compare_exchange(prev, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Insert or replace by `ts` in the state snapshot, then announce it.
fn publish(context: &HostContext, message: ChatMessage) {
    context.update_state(|state| {
        match state
            .cline_messages
            .iter_mut()
            .find(|existing| existing.ts == message.ts)
        {
            Some(existing) => *existing = message.clone(),
            None => state.cline_messages.push(message.clone()),
        }
    });
    context.post_message(ExtensionMessage::message_updated(&message));
}

async fn run_turn(
    context: Arc<HostContext>,
    formatter: Arc<EchoFormatter>,
    options: EchoOptions,
    clock: Arc<TsClock>,
    task: String,
) {
    context.broadcast_state();

    let request_ts = clock.next();
    let request = json!({ "request": task });
    publish(
        &context,
        ChatMessage::say(request_ts, API_REQ_STARTED, request.to_string()),
    );

    let reply = formatter.format(&task);
    let chars: Vec<char> = reply.chars().collect();
    let reply_ts = clock.next();
    let step = options.chunk_chars.max(1);
    let mut end = 0;
    while end + step < chars.len() {
        end += step;
        let partial: String = chars[..end].iter().collect();
        publish(&context, ChatMessage::say(reply_ts, "text", partial).partial(true));
        tokio::time::sleep(options.chunk_delay).await;
    }
    publish(&context, ChatMessage::say(reply_ts, "text", reply).partial(false));

    let settled = json!({ "request": task, "cost": 0 });
    publish(
        &context,
        ChatMessage::say(request_ts, API_REQ_STARTED, settled.to_string()),
    );
    publish(
        &context,
        ChatMessage::ask(clock.next(), "completion_result", "").partial(false),
    );
    context.broadcast_state();
    tracing::debug!(task = %task, "echo turn finished");
}

fn answer_last_ask(context: &HostContext) {
    let mut answered = None;
    context.update_state(|state| {
        if let Some(ask) = state
            .cline_messages
            .iter_mut()
            .rev()
            .find(|message| message.kind == ChatMessageType::Ask && message.is_answered != Some(true))
        {
            ask.is_answered = Some(true);
            answered = Some(ask.clone());
        }
    });
    if let Some(message) = answered {
        context.post_message(ExtensionMessage::message_updated(&message));
    }
}
