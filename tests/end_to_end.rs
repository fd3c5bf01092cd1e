//! Host, bridge and transcript working together on the echo bundle.
//!
//! Only one host may be live per process, so every test takes `LOCK`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use termhost::demo::{self, EchoOptions};
use termhost::error::HostError;
use termhost::host::{ExtensionHost, HostOptions, HostState, StaticModuleLoader};
use termhost::logs::{LogFilter, LogLevel, LogService};
use termhost::protocol::{ChatMessageType, ExtensionMessage, UnifiedMessage, WebviewMessage};
use termhost::transcript::{is_message_complete, RenderCursor, StateConsumer, Transcript};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

static LOCK: Mutex<()> = Mutex::new(());

fn lock() -> MutexGuard<'static, ()> {
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct TempDir(PathBuf);

impl TempDir {
    fn new(tag: &str) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        let path = std::env::temp_dir().join(format!(
            "termhost-e2e-{tag}-{}-{nanos}",
            std::process::id()
        ));
        std::fs::create_dir_all(&path).expect("temp dir");
        Self(path)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

async fn start_echo(
    tmp: &TempDir,
    session: &str,
) -> (ExtensionHost, Arc<LogService>, UnboundedReceiver<ExtensionMessage>) {
    let bundle = tmp.0.join("bundle");
    demo::write_bundle(&bundle).expect("bundle");
    let mut loader = StaticModuleLoader::new();
    demo::register(
        &mut loader,
        EchoOptions {
            chunk_chars: 3,
            chunk_delay: Duration::from_millis(1),
        },
    );
    let logs = Arc::new(LogService::default());
    let host = ExtensionHost::new(Arc::new(loader), Arc::clone(&logs));
    let rx = host.backend_messages();

    let mut options = HostOptions::new(tmp.0.join("workspace"), bundle);
    options.session_name = session.to_string();
    options.global_storage_path = Some(tmp.0.join("global"));
    host.start(options).await.expect("start");
    (host, logs, rx)
}

/// Feed messages into the transcript until `done` holds, collecting every
/// entry the cursor commits along the way.
async fn pump_until(
    rx: &mut UnboundedReceiver<ExtensionMessage>,
    transcript: &mut Transcript,
    cursor: &mut RenderCursor,
    committed: &mut Vec<UnifiedMessage>,
    done: impl Fn(&Transcript) -> bool,
) {
    while !done(transcript) {
        let message = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("extension went quiet")
            .expect("bridge closed");
        transcript.apply_extension_message(&message);
        let unified = transcript.unified();
        committed.extend(cursor.advance(&unified).into_iter().cloned());
    }
}

fn has_completion_ask(transcript: &Transcript) -> bool {
    transcript
        .messages()
        .iter()
        .any(|message| message.ask.as_deref() == Some("completion_result"))
}

#[tokio::test]
async fn streamed_turn_commits_each_entry_once_and_only_when_final() {
    let _guard = lock();
    let tmp = TempDir::new("turn");
    let (host, _logs, mut rx) = start_echo(&tmp, "e2e-turn").await;

    let mut transcript = Transcript::new();
    let mut cursor = RenderCursor::new();
    let mut committed = Vec::new();

    host.post_to_backend(WebviewMessage::webview_did_launch())
        .expect("launch");
    host.post_to_backend(WebviewMessage::new_task("ping the bridge"))
        .expect("task");
    pump_until(
        &mut rx,
        &mut transcript,
        &mut cursor,
        &mut committed,
        has_completion_ask,
    )
    .await;

    // Everything before the unanswered completion ask is final.
    assert!(committed.iter().all(is_message_complete));
    let texts: Vec<String> = committed
        .iter()
        .filter_map(|entry| match entry {
            UnifiedMessage::Backend(message) if message.say.as_deref() == Some("text") => {
                message.text.clone()
            }
            _ => None,
        })
        .collect();
    assert_eq!(texts, vec!["Echo: ping the bridge".to_string()]);
    assert_eq!(transcript.static_len(), transcript.unified().len() - 1);

    host.post_to_backend(WebviewMessage::ask_response("yesButtonClicked", None))
        .expect("answer");
    pump_until(
        &mut rx,
        &mut transcript,
        &mut cursor,
        &mut committed,
        |transcript| transcript.static_len() == transcript.unified().len(),
    )
    .await;
    let last = committed.last().expect("committed ask");
    assert!(matches!(
        last,
        UnifiedMessage::Backend(message) if message.kind == ChatMessageType::Ask
    ));
    assert_eq!(committed.len(), transcript.unified().len());

    assert!(host.stop().await.is_clean());
}

#[tokio::test]
async fn extension_console_output_lands_in_the_log_service() {
    let _guard = lock();
    let tmp = TempDir::new("logs");
    let (host, logs, _rx) = start_echo(&tmp, "e2e-logs").await;

    let entries = logs.get_logs(&LogFilter {
        source: Some("extension".to_string()),
        ..LogFilter::default()
    });
    let messages: Vec<&str> = entries.iter().map(|entry| entry.message.as_str()).collect();
    assert!(messages.contains(&"echo extension activated"));
    assert!(messages.iter().any(|message| message.starts_with("termhost-echo loaded from")));
    assert!(entries
        .iter()
        .filter(|entry| entry.message == "formatter ready")
        .all(|entry| entry.level == LogLevel::Debug));

    host.stop().await;
    logs.clear();
    assert!(logs.is_empty());
}

#[tokio::test]
async fn commands_and_mode_changes_go_through_the_host() {
    let _guard = lock();
    let tmp = TempDir::new("mode");
    let (host, _logs, mut rx) = start_echo(&tmp, "e2e-mode").await;

    let context = host.context().expect("context");
    assert_eq!(
        context.execute_command(demo::PING_COMMAND, &[serde_json::json!(7)]),
        Ok(serde_json::json!({"pong": 7}))
    );

    let mut transcript = Transcript::new();
    let mut cursor = RenderCursor::new();
    let mut committed = Vec::new();
    host.post_to_backend(WebviewMessage::mode("architect"))
        .expect("mode");
    pump_until(&mut rx, &mut transcript, &mut cursor, &mut committed, |transcript| {
        transcript.mode() == Some("architect")
    })
    .await;
    host.stop().await;
}

#[tokio::test]
async fn stopped_host_rejects_messages_and_bridge_sends_are_no_ops() {
    let _guard = lock();
    let tmp = TempDir::new("stop");
    let (host, _logs, _rx) = start_echo(&tmp, "e2e-stop").await;
    let bridge = host.bridge().expect("bridge");

    let report = host.stop().await;
    assert!(report.is_clean(), "{:?}", report.errors);
    assert_eq!(host.state(), HostState::Deactivated);
    assert!(bridge.is_disposed());
    bridge.send_webview_message(WebviewMessage::new_task("late"));
    assert!(bridge.traffic().is_empty());
    assert!(matches!(
        host.post_to_backend(WebviewMessage::new_task("late")),
        Err(HostError::NotActive(HostState::Deactivated))
    ));
    assert!(host.stop().await.is_clean());
}
