//! Deployment configuration.
//!
//! Layers, lowest priority first: built-in defaults, a TOML file, `HUBDEPLOY_*`
//! environment variables. The binary applies its command line flags on top.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    chain::ChainClient,
    error::DeployError,
    manifest::DEFAULT_MANIFEST_PATH,
    plan::{HubPlanParams, InitMode, Role},
};

/// The default name for the configuration file.
pub const DEFAULT_CONFIG_FILENAME: &str = "hubdeploy.toml";

/// Prefix of the environment variables overriding configuration keys. Nested keys are
/// separated by a double underscore, e.g. `HUBDEPLOY_HUB__TREASURY_FEE_BPS`.
pub const ENV_PREFIX: &str = "HUBDEPLOY_";

/// Default JSON-RPC endpoint (a local dev node).
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

/// Upper bound of a basis-point value.
const BPS_MAX: u16 = 10_000;

/// Explicit role addresses. Unset roles fall back to the node's accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountsConfig {
    /// Sender of every creation. Defaults to the node's first account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployer: Option<Address>,
    /// Defaults to the node's second account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub governance: Option<Address>,
    /// Defaults to the node's third account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treasury: Option<Address>,
    /// Defaults to the deployer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_admin: Option<Address>,
}

/// Configuration of a deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// JSON-RPC endpoint of the target chain.
    pub rpc_url: String,
    /// Directory holding the compiled contract artifacts.
    pub artifacts_dir: PathBuf,
    /// Where the address manifest is written.
    pub manifest_path: PathBuf,
    /// Maximum wait for a single receipt, in seconds.
    pub confirmation_timeout_secs: u64,
    /// Interval between two receipt lookups, in milliseconds.
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub accounts: AccountsConfig,
    #[serde(default)]
    pub hub: HubPlanParams,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            artifacts_dir: PathBuf::from("artifacts"),
            manifest_path: PathBuf::from(DEFAULT_MANIFEST_PATH),
            confirmation_timeout_secs: 120,
            poll_interval_ms: 1_000,
            accounts: AccountsConfig::default(),
            hub: HubPlanParams::default(),
        }
    }
}

impl DeployConfig {
    /// The layered figment: defaults, then `path` (or [`DEFAULT_CONFIG_FILENAME`] if it
    /// exists), then the environment.
    pub fn figment(path: Option<&Path>) -> Figment {
        let file = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILENAME));

        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Read the configuration layers without validating the result.
    ///
    /// An explicitly given `path` must exist. The default file is optional. Callers
    /// adding their own overrides validate once those are applied.
    pub fn extract(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            if !path.exists() {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
        }

        let config: Self = Self::figment(path)
            .extract()
            .context("Failed to load configuration")?;

        tracing::debug!(?config, "Configuration loaded");
        Ok(config)
    }

    /// Load and validate the configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = Self::extract(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// The parsed RPC endpoint.
    pub fn rpc_url(&self) -> Result<Url> {
        Url::parse(&self.rpc_url).with_context(|| format!("Invalid RPC URL: {}", self.rpc_url))
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reject configurations that cannot produce a working deployment.
    pub fn validate(&self) -> Result<()> {
        self.rpc_url()?;
        if self.hub.treasury_fee_bps > BPS_MAX {
            anyhow::bail!(
                "Treasury fee of {} bps exceeds {} bps",
                self.hub.treasury_fee_bps,
                BPS_MAX
            );
        }
        if self.confirmation_timeout_secs == 0 {
            anyhow::bail!("Confirmation timeout must be positive");
        }
        if self.poll_interval_ms == 0 {
            anyhow::bail!("Poll interval must be positive");
        }

        // A transparent proxy never forwards calls from its admin, so the deployer
        // cannot initialize the hub through it.
        if self.hub.init_mode == InitMode::SeparateCall {
            match (self.accounts.deployer, self.accounts.proxy_admin) {
                (_, None) => anyhow::bail!(
                    "Init mode `{}` requires a proxy admin distinct from the deployer",
                    InitMode::SeparateCall
                ),
                (Some(deployer), Some(admin)) if deployer == admin => anyhow::bail!(
                    "Init mode `{}` requires a proxy admin distinct from the deployer",
                    InitMode::SeparateCall
                ),
                _ => {}
            }
        }

        Ok(())
    }

    /// Resolve every role, asking the chain for its accounts only if some role is unset.
    pub async fn roles<C: ChainClient>(&self, chain: &C) -> Result<Roles, DeployError> {
        let accounts = &self.accounts;
        let fully_configured = accounts.deployer.is_some()
            && accounts.governance.is_some()
            && accounts.treasury.is_some();

        let node_accounts = if fully_configured {
            Vec::new()
        } else {
            chain
                .accounts()
                .await
                .map_err(|e| DeployError::RolesUnavailable(e.to_string()))?
        };

        self.resolve_roles(&node_accounts)
    }

    /// Resolve every role against the node's account list.
    pub fn resolve_roles(&self, node_accounts: &[Address]) -> Result<Roles, DeployError> {
        let pick = |configured: Option<Address>, index: usize, role: Role| {
            configured
                .or_else(|| node_accounts.get(index).copied())
                .ok_or_else(|| {
                    DeployError::RolesUnavailable(format!(
                        "no {role} address configured and the node exposes {} accounts, need at least {}",
                        node_accounts.len(),
                        Roles::MIN_NODE_ACCOUNTS
                    ))
                })
        };

        let deployer = pick(self.accounts.deployer, 0, Role::Deployer)?;
        let roles = Roles {
            deployer,
            governance: pick(self.accounts.governance, 1, Role::Governance)?,
            treasury: pick(self.accounts.treasury, 2, Role::Treasury)?,
            proxy_admin: self.accounts.proxy_admin.unwrap_or(deployer),
        };

        if self.hub.init_mode == InitMode::SeparateCall && roles.proxy_admin == roles.deployer {
            return Err(DeployError::RolesUnavailable(format!(
                "init mode `{}` requires a proxy admin distinct from the deployer {}",
                InitMode::SeparateCall,
                roles.deployer
            )));
        }

        tracing::info!(
            deployer = %roles.deployer,
            governance = %roles.governance,
            treasury = %roles.treasury,
            proxy_admin = %roles.proxy_admin,
            "Resolved account roles"
        );

        Ok(roles)
    }
}

/// Concrete address of every [`Role`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roles {
    pub deployer: Address,
    pub governance: Address,
    pub treasury: Address,
    pub proxy_admin: Address,
}

impl Roles {
    /// Node accounts needed when no role is configured: deployer, governance, treasury.
    pub const MIN_NODE_ACCOUNTS: usize = 3;

    pub fn address(&self, role: Role) -> Address {
        match role {
            Role::Deployer => self.deployer,
            Role::Governance => self.governance,
            Role::Treasury => self.treasury,
            Role::ProxyAdmin => self.proxy_admin,
        }
    }
}
