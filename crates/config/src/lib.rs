//! Configuration loading.
//!
//! Sources are merged in order, later ones overriding earlier ones:
//!
//! 1. built-in defaults,
//! 2. the configuration file (YAML, TOML or JSON, chosen by extension),
//! 3. `GRAFT_` prefixed environment variables, with `__` separating nested
//!    keys (`GRAFT_ASSETS__ROOT=./public`).

pub mod error;
mod settings;

pub use crate::settings::{AssetSettings, CollectionSpec, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_OUTPUT, Settings, schema};
use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Json, Toml, Yaml};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "GRAFT_";
pub const DEFAULT_FILE_NAME: &str = "graft.yaml";

/// Configuration file used when none is given: `graft.yaml` in the
/// platform configuration directory.
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "graft").map(|dirs| dirs.config_dir().join(DEFAULT_FILE_NAME))
}

/// Load and validate settings.
///
/// An explicit `path` must exist; the default location is optional.
pub fn load(path: Option<&Path>) -> Result<Settings> {
    let settings: Settings = figment(path)?.extract().map_err(|e| ErrorKind::Parse(e.to_string()))?;
    settings.validate()?;
    tracing::debug!(collections = settings.collections.len(), "Configuration loaded");
    Ok(settings)
}

/// The merged configuration sources, before extraction.
pub fn figment(path: Option<&Path>) -> Result<Figment> {
    let file = match path {
        Some(path) if !path.exists() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
        Some(path) => Some(path.to_path_buf()),
        None => default_path(),
    };
    let mut figment = Figment::new();
    if let Some(file) = file {
        tracing::debug!(path = %file.display(), "Reading configuration file");
        figment = match file.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => figment.merge(Yaml::file(&file)),
            Some("toml") => figment.merge(Toml::file(&file)),
            Some("json") => figment.merge(Json::file(&file)),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(file)),
        };
    }
    Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
}
