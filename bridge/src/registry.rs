//! Loader for the static alias registry document.
//!
//! The registry maps client-facing aliases to optional display names and
//! carries an optional external base URL. It is read from disk on every
//! request so edits take effect without a restart.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Audience {
    pub alias: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub base: Option<String>,
    pub audiences: Vec<Audience>,
}

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("could not read registry: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse registry: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("registry: audience.alias required")]
    MissingAlias,
}

/// Loads and validates the registry. Fails fast with a descriptive error
/// when `audiences` is missing or any entry lacks an alias.
pub async fn load(path: &Path) -> Result<Registry, RegistryError> {
    let raw = tokio::fs::read_to_string(path).await?;
    let registry: Registry = serde_json::from_str(&raw)?;

    if registry.audiences.iter().any(|a| a.alias.trim().is_empty()) {
        return Err(RegistryError::MissingAlias);
    }

    Ok(registry)
}
