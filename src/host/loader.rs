//! Module resolution for extension bundles.
//!
//! A [`ModuleLoader`] turns a specifier into [`ModuleExports`]. Every module
//! is instantiated with a [`ModuleScope`] carrying the console it logs
//! through and a way to `require` further modules. By default that console
//! follows the ambient surface, so installed interception applies to every
//! module. [`InterceptingLoader`] additionally hands modules the intercepted
//! console directly, covering transitive loads made through a scope.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::bundle::normalize_specifier;
use super::context::HostContext;
use crate::console::{self, Console};
use crate::error::{ExtensionError, HostError};

/// An activatable extension entry point.
#[async_trait]
pub trait Extension: Send + Sync {
    async fn activate(&self, context: Arc<HostContext>) -> Result<(), ExtensionError>;

    async fn deactivate(&self) -> Result<(), ExtensionError> {
        Ok(())
    }
}

/// What a module hands back when loaded.
#[derive(Clone)]
pub enum ModuleExports {
    Extension(Arc<dyn Extension>),
    Library(Arc<dyn Any + Send + Sync>),
}

impl ModuleExports {
    /// Downcast a library export.
    pub fn library<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Self::Library(value) => Arc::clone(value).downcast::<T>().ok(),
            Self::Extension(_) => None,
        }
    }
}

impl fmt::Debug for ModuleExports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extension(_) => f.write_str("ModuleExports::Extension"),
            Self::Library(_) => f.write_str("ModuleExports::Library"),
        }
    }
}

/// Environment a module is instantiated in.
pub struct ModuleScope {
    specifier: String,
    console: Console,
    loader: Arc<dyn ModuleLoader>,
}

impl ModuleScope {
    pub fn specifier(&self) -> &str {
        &self.specifier
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    /// Load a dependency through the same loader chain.
    pub fn require(&self, specifier: &str) -> Result<ModuleExports, HostError> {
        require(&self.loader, specifier)
    }

    fn with_console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }
}

pub trait ModuleLoader: Send + Sync {
    fn contains(&self, specifier: &str) -> bool;

    /// Instantiate `specifier` inside `scope`.
    fn load(&self, specifier: &str, scope: ModuleScope) -> Result<ModuleExports, HostError>;

    /// Console given to modules loaded through this loader.
    fn console(&self) -> Console {
        Console::ambient()
    }
}

/// Load `specifier` through `loader`, building its scope.
pub fn require(loader: &Arc<dyn ModuleLoader>, specifier: &str) -> Result<ModuleExports, HostError> {
    let specifier = normalize_specifier(specifier);
    let scope = ModuleScope {
        specifier: specifier.clone(),
        console: loader.console(),
        loader: Arc::clone(loader),
    };
    loader.load(&specifier, scope)
}

pub type ModuleFactory =
    Arc<dyn Fn(&ModuleScope) -> Result<ModuleExports, ExtensionError> + Send + Sync>;

/// Loader over modules linked into the binary.
#[derive(Default, Clone)]
pub struct StaticModuleLoader {
    factories: HashMap<String, ModuleFactory>,
}

impl StaticModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, specifier: &str, factory: F) -> &mut Self
    where
        F: Fn(&ModuleScope) -> Result<ModuleExports, ExtensionError> + Send + Sync + 'static,
    {
        self.factories
            .insert(normalize_specifier(specifier), Arc::new(factory));
        self
    }

    pub fn specifiers(&self) -> Vec<String> {
        let mut specifiers: Vec<String> = self.factories.keys().cloned().collect();
        specifiers.sort();
        specifiers
    }
}

impl ModuleLoader for StaticModuleLoader {
    fn contains(&self, specifier: &str) -> bool {
        self.factories.contains_key(&normalize_specifier(specifier))
    }

    fn load(&self, specifier: &str, scope: ModuleScope) -> Result<ModuleExports, HostError> {
        let factory = self
            .factories
            .get(specifier)
            .ok_or_else(|| HostError::ModuleNotFound(specifier.to_string()))?;
        match catch_unwind(AssertUnwindSafe(|| factory(&scope))) {
            Ok(Ok(exports)) => {
                tracing::trace!(module = specifier, "module loaded");
                Ok(exports)
            }
            Ok(Err(err)) => Err(HostError::ModuleLoad {
                specifier: specifier.to_string(),
                reason: err.to_string(),
            }),
            Err(_) => Err(HostError::ModuleLoad {
                specifier: specifier.to_string(),
                reason: "module initializer panicked".to_string(),
            }),
        }
    }
}

/// Decorator that hands every loaded module the intercepted console while
/// interception is installed. Disabling it makes it a pass-through to the
/// inner loader's console.
pub struct InterceptingLoader {
    inner: Arc<dyn ModuleLoader>,
    enabled: AtomicBool,
}

impl InterceptingLoader {
    pub fn new(inner: Arc<dyn ModuleLoader>, enabled: bool) -> Self {
        Self {
            inner,
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    fn intercepted(&self) -> Option<Console> {
        if self.is_enabled() {
            console::intercepted()
        } else {
            None
        }
    }
}

impl ModuleLoader for InterceptingLoader {
    fn contains(&self, specifier: &str) -> bool {
        self.inner.contains(specifier)
    }

    fn load(&self, specifier: &str, scope: ModuleScope) -> Result<ModuleExports, HostError> {
        let scope = match self.intercepted() {
            Some(console) => scope.with_console(console),
            None => scope,
        };
        self.inner.load(specifier, scope)
    }

    fn console(&self) -> Console {
        self.intercepted().unwrap_or_else(|| self.inner.console())
    }
}
