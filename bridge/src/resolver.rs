//! Turns raw request input into an ordered, de-duplicated alias list.

use crate::registry::{self, RegistryError};
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error("alias is required")]
    MissingAlias,

    #[error("registry has no audiences")]
    EmptyRegistry,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Splits a comma-separated alias list: trims whitespace, drops empty
/// segments, lowercases, and de-duplicates preserving first occurrence.
pub fn split_aliases(input: &str) -> Vec<String> {
    let mut aliases: Vec<String> = Vec::new();
    for part in input.split(',') {
        let alias = part.trim().to_ascii_lowercase();
        if alias.is_empty() || aliases.contains(&alias) {
            continue;
        }
        aliases.push(alias);
    }
    aliases
}

/// Resolves request input into the alias list to fetch. The sentinel `all`
/// (case-insensitive) expands to the registry's audience list; anything
/// else is treated as a comma-separated list. The registry is only
/// consulted for `all`.
pub async fn resolve(input: &str, registry_path: &Path) -> Result<Vec<String>, ResolveError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ResolveError::MissingAlias);
    }

    if input.eq_ignore_ascii_case("all") {
        let registry = registry::load(registry_path).await?;
        let mut aliases: Vec<String> = Vec::new();
        for audience in &registry.audiences {
            let alias = audience.alias.trim().to_ascii_lowercase();
            if !aliases.contains(&alias) {
                aliases.push(alias);
            }
        }
        if aliases.is_empty() {
            return Err(ResolveError::EmptyRegistry);
        }
        return Ok(aliases);
    }

    let aliases = split_aliases(input);
    if aliases.is_empty() {
        return Err(ResolveError::MissingAlias);
    }
    Ok(aliases)
}
