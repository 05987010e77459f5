//! Layered configuration: built-in defaults, then `Chainplan.toml`, then
//! `CHAINPLAN_*` environment variables.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chainplan_deploy::{NetworkConfig, client::rpc::DEFAULT_PROXY_ARTIFACT};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

/// The default name for the chainplan configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "Chainplan.toml";

/// The network used when none is selected.
pub const DEFAULT_NETWORK: &str = "development";

/// Endpoint of the development network when the configuration has none.
pub const DEFAULT_DEVELOPMENT_RPC_URL: &str = "http://127.0.0.1:8545";

const ENV_PREFIX: &str = "CHAINPLAN_";

/// Environment variables read by the CLI itself rather than the config.
const CLI_ENV_KEYS: &[&str] = &[
    "verbosity",
    "config",
    "network",
    "plan",
    "ledger",
    "verify_skipped",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainplanConfig {
    /// Directory holding the compiled contract artifacts.
    pub artifacts_dir: PathBuf,
    /// Directory holding one ledger file per network.
    pub ledger_dir: PathBuf,
    /// Artifact deployed in front of proxied contracts.
    pub proxy_artifact: String,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
}

impl Default for ChainplanConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("build/contracts"),
            ledger_dir: PathBuf::from("deployments"),
            proxy_artifact: DEFAULT_PROXY_ARTIFACT.to_string(),
            networks: BTreeMap::new(),
        }
    }
}

impl ChainplanConfig {
    /// Load the configuration, layering `path` and the environment over the
    /// defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No configuration file, using defaults");
        }

        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__").ignore(CLI_ENV_KEYS))
            .extract()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;

        tracing::debug!(
            path = %path.display(),
            networks = ?config.networks.keys().collect::<Vec<_>>(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Connection settings of `name`.
    ///
    /// The development network falls back to a local node when it is not
    /// configured.
    pub fn network(&self, name: &str) -> Result<NetworkConfig> {
        if let Some(network) = self.networks.get(name) {
            return Ok(network.clone());
        }
        if name == DEFAULT_NETWORK {
            let rpc_url = Url::parse(DEFAULT_DEVELOPMENT_RPC_URL)?;
            return Ok(NetworkConfig::new(rpc_url));
        }

        let known: Vec<&str> = self.networks.keys().map(String::as_str).collect();
        anyhow::bail!(
            "Unknown network `{}` (configured: {})",
            name,
            if known.is_empty() {
                "none".to_string()
            } else {
                known.join(", ")
            }
        )
    }

    /// Default ledger file of `network`.
    pub fn ledger_path(&self, network: &str) -> PathBuf {
        self.ledger_dir.join(format!("{network}.json"))
    }
}
