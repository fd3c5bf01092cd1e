//! In-process message bridge between the terminal front end and the
//! extension host.
//!
//! The bridge is two independent topics: [`WebviewMessage`]s flow toward the
//! backend and [`ExtensionMessage`]s flow toward the front end. Each topic is
//! FIFO on its own; nothing orders one direction relative to the other.
//!
//! Endpoints are cheap clones holding the bridge:
//!
//! - [`FrontendChannel::send`] publishes to the backend topic, while
//!   [`FrontendChannel::on`] listens on the frontend topic.
//! - [`BackendChannel`] is the mirror image.
//!
//! After [`MessageBridge::dispose`] every `send` is a silent no-op.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::mpsc;

use crate::error::{BridgeError, ExtensionError};
use crate::protocol::{ExtensionMessage, WebviewMessage};

mod topic;
mod traffic;

pub use topic::{Handler, HandlerId};
pub use traffic::{Direction, TrafficLog, TrafficRecord, DEFAULT_TRAFFIC_CAPACITY};

use topic::Topic;

/// Anything that can cross the bridge.
pub trait BridgeMessage: Clone + Send + Sync + 'static {
    fn kind(&self) -> &str;
}

impl BridgeMessage for WebviewMessage {
    fn kind(&self) -> &str {
        WebviewMessage::kind(self)
    }
}

impl BridgeMessage for ExtensionMessage {
    fn kind(&self) -> &str {
        ExtensionMessage::kind(self)
    }
}

#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Record every message crossing the bridge. Off by default.
    pub log_traffic: bool,
    pub traffic_capacity: usize,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            log_traffic: false,
            traffic_capacity: DEFAULT_TRAFFIC_CAPACITY,
        }
    }
}

fn live_bridges() -> &'static Mutex<HashSet<String>> {
    static LIVE: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    LIVE.get_or_init(|| Mutex::new(HashSet::new()))
}

pub struct MessageBridge {
    name: String,
    to_backend: Topic<WebviewMessage>,
    to_frontend: Topic<ExtensionMessage>,
    traffic: Option<Arc<TrafficLog>>,
    disposed: AtomicBool,
}

impl MessageBridge {
    /// Open the bridge for one session name. A second bridge with the same
    /// name cannot be opened until the first is disposed.
    pub fn open(name: &str, options: BridgeOptions) -> Result<Arc<Self>, BridgeError> {
        {
            let mut live = live_bridges()
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !live.insert(name.to_string()) {
                return Err(BridgeError::AlreadyOpen(name.to_string()));
            }
        }
        let traffic = options
            .log_traffic
            .then(|| Arc::new(TrafficLog::new(options.traffic_capacity)));
        tracing::debug!(bridge = name, log_traffic = options.log_traffic, "bridge opened");
        Ok(Arc::new(Self {
            name: name.to_string(),
            to_backend: Topic::new(Direction::ToBackend, traffic.clone()),
            to_frontend: Topic::new(Direction::ToFrontend, traffic.clone()),
            traffic,
            disposed: AtomicBool::new(false),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frontend(self: &Arc<Self>) -> FrontendChannel {
        FrontendChannel {
            bridge: Arc::clone(self),
        }
    }

    pub fn backend(self: &Arc<Self>) -> BackendChannel {
        BackendChannel {
            bridge: Arc::clone(self),
        }
    }

    /// Front end → backend.
    pub fn send_webview_message(&self, message: WebviewMessage) {
        self.to_backend.send(message);
    }

    /// Backend → front end.
    pub fn send_extension_message(&self, message: ExtensionMessage) {
        self.to_frontend.send(message);
    }

    /// Recorded traffic, oldest first. Empty when logging is disabled.
    pub fn traffic(&self) -> Vec<TrafficRecord> {
        self.traffic
            .as_ref()
            .map(|log| log.snapshot())
            .unwrap_or_default()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Remove every handler on both endpoints and release the session name.
    /// Later calls do nothing.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.to_backend.dispose();
        self.to_frontend.dispose();
        live_bridges()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.name);
        tracing::debug!(bridge = %self.name, "bridge disposed");
    }
}

impl Drop for MessageBridge {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn boxed<M, F>(handler: F) -> Handler<M>
where
    F: Fn(&M) -> Result<(), ExtensionError> + Send + Sync + 'static,
{
    Arc::new(handler)
}

/// Terminal front end side of the bridge.
#[derive(Clone)]
pub struct FrontendChannel {
    bridge: Arc<MessageBridge>,
}

impl FrontendChannel {
    pub fn send(&self, message: WebviewMessage) {
        self.bridge.send_webview_message(message);
    }

    /// Listen for extension messages.
    pub fn on<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&ExtensionMessage) -> Result<(), ExtensionError> + Send + Sync + 'static,
    {
        self.bridge.to_frontend.on(boxed(handler))
    }

    pub fn off(&self, id: HandlerId) -> bool {
        self.bridge.to_frontend.off(id)
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ExtensionMessage> {
        self.bridge.to_frontend.subscribe()
    }
}

/// Extension host side of the bridge.
#[derive(Clone)]
pub struct BackendChannel {
    bridge: Arc<MessageBridge>,
}

impl BackendChannel {
    pub fn send(&self, message: ExtensionMessage) {
        self.bridge.send_extension_message(message);
    }

    /// Listen for front end messages.
    pub fn on<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&WebviewMessage) -> Result<(), ExtensionError> + Send + Sync + 'static,
    {
        self.bridge.to_backend.on(boxed(handler))
    }

    pub fn off(&self, id: HandlerId) -> bool {
        self.bridge.to_backend.off(id)
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<WebviewMessage> {
        self.bridge.to_backend.subscribe()
    }

    pub fn handler_count(&self) -> usize {
        self.bridge.to_backend.handler_count()
    }
}
