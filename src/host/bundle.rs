//! Extension bundle discovery and manifest checks.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StartupError;

/// Entry specifier used when the manifest has no `main`.
pub const DEFAULT_ENTRY: &str = "dist/extension.js";

/// Manifest file looked up at the bundle root.
pub const MANIFEST_FILE: &str = "package.json";

/// Capabilities the host context provides to extensions.
pub const SUPPORTED_CAPABILITIES: [&str; 5] = [
    "commands",
    "configuration",
    "storage",
    "messaging",
    "globalState",
];

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    name: Option<String>,
    version: Option<String>,
    main: Option<String>,
    #[serde(default)]
    capabilities: Vec<String>,
}

/// A resolved extension bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub root: PathBuf,
    pub name: String,
    pub version: Option<String>,
    /// Module specifier of the entry point, relative to the bundle root.
    pub entry: String,
    pub capabilities: Vec<String>,
}

impl Bundle {
    /// Fail on the first declared capability the host does not provide.
    pub fn check_capabilities(&self) -> Result<(), StartupError> {
        match self
            .capabilities
            .iter()
            .find(|capability| !SUPPORTED_CAPABILITIES.contains(&capability.as_str()))
        {
            Some(missing) => Err(StartupError::MissingCapability(missing.clone())),
            None => Ok(()),
        }
    }
}

/// Normalize an entry specifier: forward slashes, no leading `./`.
pub fn normalize_specifier(specifier: &str) -> String {
    let unified = specifier.trim().replace('\\', "/");
    let mut rest = unified.as_str();
    while let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped;
    }
    rest.to_string()
}

/// Resolve the bundle at `root`. The directory must exist; the manifest is
/// optional.
pub fn resolve_bundle(root: &Path) -> Result<Bundle, StartupError> {
    if !root.is_dir() {
        return Err(StartupError::BundleNotFound(root.to_path_buf()));
    }
    let manifest_path = root.join(MANIFEST_FILE);
    let manifest = if manifest_path.is_file() {
        let raw = fs::read_to_string(&manifest_path).map_err(|err| StartupError::InvalidManifest {
            path: manifest_path.clone(),
            reason: err.to_string(),
        })?;
        serde_json::from_str::<Manifest>(&raw).map_err(|err| StartupError::InvalidManifest {
            path: manifest_path.clone(),
            reason: err.to_string(),
        })?
    } else {
        Manifest::default()
    };

    let name = manifest.name.unwrap_or_else(|| {
        root.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "extension".to_string())
    });
    let entry = normalize_specifier(manifest.main.as_deref().unwrap_or(DEFAULT_ENTRY));
    tracing::debug!(bundle = %name, entry = %entry, root = %root.display(), "resolved extension bundle");
    Ok(Bundle {
        root: root.to_path_buf(),
        name,
        version: manifest.version,
        entry,
        capabilities: manifest.capabilities,
    })
}
