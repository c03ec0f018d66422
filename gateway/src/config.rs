use serde::Deserialize;
use std::fs::File;
use std::path::PathBuf;

#[derive(Deserialize, Debug)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct BridgeConfig {
    /// The single upstream URL; everything is query-string RPC against it.
    pub url: String,
    /// Shared secret sent with every upstream call.
    pub token: String,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    pub bridge: BridgeConfig,
    /// Credential for privileged operations (cache flush). When absent,
    /// those operations are always refused.
    pub proxy_key: Option<String>,
    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("registry.json")
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
}
