//! Headless runtime host for an editor extension bundle.
//!
//! Lifecycle: `created → activating → active → deactivating → deactivated`.
//! A failed start tears down whatever it had set up and ends in
//! `deactivated` with a [`StartupError`]. A `stop` that lands while
//! activating makes `start` stop waiting for the bundle and tear down; the
//! bundle's own activation keeps running detached, but nothing it sends is
//! delivered anymore. Dropping the `start` future releases everything it
//! acquired the same way.
//! Only one host may be live per process because it owns the ambient console.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};

mod bundle;
mod context;
mod loader;
mod memento;

pub use bundle::{
    normalize_specifier, resolve_bundle, Bundle, DEFAULT_ENTRY, MANIFEST_FILE,
    SUPPORTED_CAPABILITIES,
};
pub use context::{
    CommandHandler, Configuration, Disposable, HostContext, StoragePaths, GLOBAL_STATE_FILE,
    HOST_DIR,
};
pub use loader::{
    require, Extension, InterceptingLoader, ModuleExports, ModuleFactory, ModuleLoader,
    ModuleScope, StaticModuleLoader,
};
pub use memento::Memento;

use crate::bridge::{BridgeOptions, Handler, MessageBridge};
use crate::console::{self, Console};
use crate::error::{ExtensionError, HostError, StartupError};
use crate::logs::LogService;
use crate::protocol::{kinds, ExtensionMessage, WebviewMessage};

use context::ContextSeed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Created,
    Activating,
    Active,
    Deactivating,
    Deactivated,
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Deactivating => "deactivating",
            Self::Deactivated => "deactivated",
        })
    }
}

/// Inputs for [`ExtensionHost::start`].
#[derive(Debug, Clone)]
pub struct HostOptions {
    pub workspace_path: PathBuf,
    pub extension_path: PathBuf,
    pub bin_unpacked_path: Option<PathBuf>,
    /// Hand the intercepted console to every module loaded for the bundle.
    pub intercept_modules: bool,
    /// Name the bridge is registered under.
    pub session_name: String,
    pub bridge: BridgeOptions,
    /// Overrides `~/.termhost/global-storage`.
    pub global_storage_path: Option<PathBuf>,
    /// Initial extension settings keyed by section.
    pub settings: Map<String, Value>,
}

impl HostOptions {
    pub fn new(workspace_path: impl Into<PathBuf>, extension_path: impl Into<PathBuf>) -> Self {
        Self {
            workspace_path: workspace_path.into(),
            extension_path: extension_path.into(),
            bin_unpacked_path: None,
            intercept_modules: true,
            session_name: "default".to_string(),
            bridge: BridgeOptions::default(),
            global_storage_path: None,
            settings: Map::new(),
        }
    }
}

/// Failures collected while tearing down. Teardown never stops early.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    pub errors: Vec<String>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

static LIVE_HOST: AtomicBool = AtomicBool::new(false);

/// Whether some host currently owns the process-wide resources.
pub fn is_host_live() -> bool {
    LIVE_HOST.load(Ordering::Acquire)
}

/// Everything a start sets up, in order, so teardown can undo exactly that.
///
/// Dropping it runs the synchronous part of teardown, so an abandoned start
/// still releases the console and the live-host marker.
#[derive(Default)]
struct Running {
    live: bool,
    bridge: Option<Arc<MessageBridge>>,
    console_installed: bool,
    hook: Option<Arc<InterceptingLoader>>,
    context: Option<Arc<HostContext>>,
    extension: Option<Arc<dyn Extension>>,
}

impl Running {
    fn holding_live_marker() -> Self {
        Self {
            live: true,
            bridge: None,
            console_installed: false,
            hook: None,
            context: None,
            extension: None,
        }
    }

    /// Release everything except the extension itself, newest first. Each
    /// step runs at most once.
    fn release(&mut self, report: &mut TeardownReport) {
        if let Some(context) = self.context.take() {
            report.errors.extend(context.dispose_all());
        }
        if let Some(hook) = self.hook.take() {
            hook.disable();
        }
        if let Some(bridge) = self.bridge.take() {
            bridge.dispose();
        }
        if std::mem::take(&mut self.console_installed) {
            console::restore();
        }
        if std::mem::take(&mut self.live) {
            LIVE_HOST.store(false, Ordering::Release);
        }
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        let mut report = TeardownReport::default();
        self.release(&mut report);
        for error in &report.errors {
            tracing::warn!(error = %error, "teardown of abandoned host");
        }
    }
}

/// Moves the host to `deactivated` if `start` ends without reaching `active`,
/// including when its future is dropped.
struct StartGuard<'a> {
    host: &'a ExtensionHost,
    armed: bool,
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.host.set_state(HostState::Deactivated);
        }
    }
}

pub struct ExtensionHost {
    loader: Arc<dyn ModuleLoader>,
    logs: Arc<LogService>,
    state: watch::Sender<HostState>,
    running: Mutex<Option<Running>>,
    /// Teardown report of a start that a concurrent `stop` interrupted.
    interrupted: Mutex<TeardownReport>,
    pending_handlers: Mutex<Vec<Handler<ExtensionMessage>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ExtensionHost {
    pub fn new(loader: Arc<dyn ModuleLoader>, logs: Arc<LogService>) -> Self {
        Self {
            loader,
            logs,
            state: watch::channel(HostState::Created).0,
            running: Mutex::new(None),
            interrupted: Mutex::new(TeardownReport::default()),
            pending_handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> HostState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<HostState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: HostState) {
        let previous = self.state.send_replace(next);
        tracing::debug!(from = %previous, to = %next, "extension host state");
    }

    /// Move from `from` to `to` only if the host is still in `from`.
    fn transition(&self, from: HostState, to: HostState) -> bool {
        let moved = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if moved {
            tracing::debug!(from = %from, to = %to, "extension host state");
        }
        moved
    }

    pub fn logs(&self) -> &Arc<LogService> {
        &self.logs
    }

    pub fn context(&self) -> Option<Arc<HostContext>> {
        lock(&self.running)
            .as_ref()
            .and_then(|running| running.context.clone())
    }

    pub fn bridge(&self) -> Option<Arc<MessageBridge>> {
        lock(&self.running)
            .as_ref()
            .and_then(|running| running.bridge.clone())
    }

    /// Activate the bundle. Returns once activation settles.
    pub async fn start(&self, options: HostOptions) -> Result<(), StartupError> {
        {
            let state = self.state();
            if state != HostState::Created {
                return Err(StartupError::InvalidState(state));
            }
        }
        if LIVE_HOST
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StartupError::HostAlreadyRunning);
        }
        if !self.transition(HostState::Created, HostState::Activating) {
            LIVE_HOST.store(false, Ordering::Release);
            return Err(StartupError::InvalidState(self.state()));
        }
        // Declared after the guard so resources are released before the
        // state settles when the future is dropped.
        let mut guard = StartGuard {
            host: self,
            armed: true,
        };
        let mut running = Running::holding_live_marker();

        let err = match self.activate(&options, &mut running).await {
            Ok(()) => {
                let context = running.context.clone();
                *lock(&self.running) = Some(running);
                if self.transition(HostState::Activating, HostState::Active) {
                    guard.armed = false;
                    if let Some(context) = context {
                        context.broadcast_state();
                    }
                    tracing::info!(
                        extension = %options.extension_path.display(),
                        workspace = %options.workspace_path.display(),
                        "extension host active"
                    );
                    return Ok(());
                }
                // `stop` only takes over a running host it saw active.
                running = lock(&self.running).take().unwrap_or_default();
                StartupError::Stopped
            }
            Err(err) => err,
        };

        match err {
            StartupError::Stopped => tracing::info!("extension host stopped during activation"),
            _ => tracing::error!(error = %err, "extension host failed to start"),
        }
        let report = teardown(running).await;
        for error in &report.errors {
            tracing::warn!(error = %error, "teardown after failed start");
        }
        if matches!(err, StartupError::Stopped) {
            *lock(&self.interrupted) = report;
        }
        drop(guard);
        Err(err)
    }

    async fn activate(
        &self,
        options: &HostOptions,
        running: &mut Running,
    ) -> Result<(), StartupError> {
        let bundle = resolve_bundle(&options.extension_path)?;
        bundle.check_capabilities()?;
        if !self.loader.contains(&bundle.entry) {
            return Err(StartupError::EntryNotFound(bundle.entry.clone()));
        }

        let bridge = MessageBridge::open(&options.session_name, options.bridge.clone())?;
        running.bridge = Some(Arc::clone(&bridge));
        let frontend = bridge.frontend();
        for handler in lock(&self.pending_handlers).drain(..) {
            frontend.on(move |message: &ExtensionMessage| handler(message));
        }

        console::install(self.logs.clone());
        running.console_installed = true;

        let hook = Arc::new(InterceptingLoader::new(
            Arc::clone(&self.loader),
            options.intercept_modules,
        ));
        running.hook = Some(Arc::clone(&hook));

        let storage = StoragePaths::for_workspace(
            &options.workspace_path,
            &bundle.root,
            options.global_storage_path.as_deref(),
            options.bin_unpacked_path.as_deref(),
        );
        let context = Arc::new(HostContext::build(ContextSeed {
            bundle: &bundle,
            workspace: &options.workspace_path,
            storage,
            settings: options.settings.clone(),
            console: console::intercepted().unwrap_or_else(Console::ambient),
            backend: bridge.backend(),
        })?);
        running.context = Some(Arc::clone(&context));

        let chain: Arc<dyn ModuleLoader> = hook;
        let extension = match require(&chain, &bundle.entry) {
            Ok(ModuleExports::Extension(extension)) => extension,
            Ok(ModuleExports::Library(_)) => {
                return Err(StartupError::MissingActivate(bundle.entry.clone()))
            }
            Err(HostError::ModuleNotFound(specifier)) => {
                return Err(StartupError::EntryNotFound(specifier))
            }
            Err(err) => return Err(StartupError::ActivationFailed(err.to_string())),
        };

        let activation = {
            let extension = Arc::clone(&extension);
            let context = Arc::clone(&context);
            tokio::spawn(async move { extension.activate(context).await })
        };
        let mut state = self.state.subscribe();
        let joined = tokio::select! {
            joined = activation => joined,
            _ = state.wait_for(|state| *state != HostState::Activating) => {
                return Err(StartupError::Stopped);
            }
        };
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(StartupError::ActivationFailed(err.to_string())),
            Err(join) => {
                return Err(StartupError::ActivationFailed(format!(
                    "activation panicked: {join}"
                )))
            }
        }
        running.extension = Some(extension);
        Ok(())
    }

    /// Deliver a front end message to the extension.
    pub fn post_to_backend(&self, message: WebviewMessage) -> Result<(), HostError> {
        let state = self.state();
        if state != HostState::Active {
            return Err(HostError::NotActive(state));
        }
        let (bridge, context) = {
            let running = lock(&self.running);
            let running = running.as_ref().ok_or(HostError::NotActive(state))?;
            (running.bridge.clone(), running.context.clone())
        };
        let (Some(bridge), Some(context)) = (bridge, context) else {
            return Err(HostError::NotActive(state));
        };

        match message.kind() {
            kinds::WEBVIEW_DID_LAUNCH => context.broadcast_state(),
            kinds::MODE => {
                if let Some(mode) = message.text() {
                    let mode = mode.to_string();
                    context.update_state(|state| state.mode = mode);
                    context.broadcast_state();
                }
            }
            _ => {}
        }
        bridge.send_webview_message(message);
        Ok(())
    }

    /// Listen for every message the extension posts. Handlers registered
    /// before `start` are attached when the bridge opens, so they also see
    /// the initial state broadcast.
    pub fn on_backend_message<F>(&self, handler: F)
    where
        F: Fn(&ExtensionMessage) -> Result<(), ExtensionError> + Send + Sync + 'static,
    {
        match self.bridge() {
            Some(bridge) => {
                bridge.frontend().on(handler);
            }
            None => lock(&self.pending_handlers).push(Arc::new(handler)),
        }
    }

    /// Channel flavour of [`Self::on_backend_message`].
    pub fn backend_messages(&self) -> mpsc::UnboundedReceiver<ExtensionMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.on_backend_message(move |message: &ExtensionMessage| {
            // A dropped receiver only means nobody is listening anymore.
            let _ = tx.send(message.clone());
            Ok(())
        });
        rx
    }

    /// Tear everything down. Calling it again is a no-op.
    ///
    /// While activating, this waits for `start` to give up on the
    /// activation and finish its own teardown.
    pub async fn stop(&self) -> TeardownReport {
        let mut previous = HostState::Created;
        self.state.send_if_modified(|state| {
            previous = *state;
            match *state {
                HostState::Created => *state = HostState::Deactivated,
                HostState::Activating | HostState::Active => *state = HostState::Deactivating,
                HostState::Deactivating | HostState::Deactivated => return false,
            }
            true
        });
        tracing::debug!(from = %previous, "extension host stop requested");
        match previous {
            HostState::Created | HostState::Deactivating | HostState::Deactivated => {
                return TeardownReport::default()
            }
            HostState::Activating => {
                let mut state = self.state.subscribe();
                // The sender lives as long as `self`, so this only ends on a state change.
                let _ = state.wait_for(|state| *state == HostState::Deactivated).await;
                let report = std::mem::take(&mut *lock(&self.interrupted));
                tracing::info!(clean = report.is_clean(), "extension host stopped");
                return report;
            }
            HostState::Active => {}
        }
        let running = lock(&self.running).take();
        let report = match running {
            Some(running) => teardown(running).await,
            None => TeardownReport::default(),
        };
        for error in &report.errors {
            tracing::warn!(error = %error, "teardown step failed");
        }
        self.set_state(HostState::Deactivated);
        tracing::info!(clean = report.is_clean(), "extension host stopped");
        report
    }
}

/// Undo what `running` records, newest first. Every step runs.
async fn teardown(mut running: Running) -> TeardownReport {
    let mut report = TeardownReport::default();

    if let Some(extension) = running.extension.take() {
        match tokio::spawn(async move { extension.deactivate().await }).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => report.errors.push(format!("deactivate failed: {err}")),
            Err(join) => report.errors.push(format!("deactivate panicked: {join}")),
        }
    }
    running.release(&mut report);
    report
}
