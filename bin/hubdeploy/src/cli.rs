use std::path::PathBuf;

use alloy_core::primitives::Address;
use clap::Parser;
use hubdeploy_core::{DeployConfig, InitMode};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "hubdeploy")]
#[command(
    author,
    version,
    about = "Deploy the hub protocol contracts and write their addresses to a manifest"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "HUBDEPLOY_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a TOML configuration file.
    ///
    /// If not provided, `hubdeploy.toml` is loaded from the working directory when it exists.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// The URL of the JSON-RPC endpoint holding the deployment accounts.
    #[arg(long, alias = "rpc")]
    pub rpc_url: Option<String>,

    /// Where to write the address manifest.
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,

    /// Directory containing the compiled contract artifacts.
    #[arg(short, long)]
    pub artifacts: Option<PathBuf>,

    /// How the hub proxy gets initialized (proxy-constructor or separate-call).
    #[arg(long)]
    pub init_mode: Option<InitMode>,

    /// Admin of the hub proxy. Defaults to the deployer.
    #[arg(long)]
    pub proxy_admin: Option<Address>,

    /// Treasury fee, in basis points.
    #[arg(long)]
    pub treasury_fee_bps: Option<u16>,

    /// Save the effective configuration to this path before deploying.
    #[arg(long)]
    pub save_config: Option<PathBuf>,

    /// Print the deployment plan as JSON and exit.
    #[arg(long)]
    pub print_plan: bool,

    /// Run the deployment against an in-memory chain. No manifest file is written.
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    /// Apply the command line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut DeployConfig) {
        if let Some(rpc_url) = &self.rpc_url {
            config.rpc_url = rpc_url.clone();
        }
        if let Some(manifest) = &self.manifest {
            config.manifest_path = manifest.clone();
        }
        if let Some(artifacts) = &self.artifacts {
            config.artifacts_dir = artifacts.clone();
        }
        if let Some(init_mode) = self.init_mode {
            config.hub.init_mode = init_mode;
        }
        if let Some(proxy_admin) = self.proxy_admin {
            config.accounts.proxy_admin = Some(proxy_admin);
        }
        if let Some(bps) = self.treasury_fee_bps {
            config.hub.treasury_fee_bps = bps;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_loaded_values() {
        let cli = Cli::parse_from([
            "hubdeploy",
            "--rpc-url",
            "http://localhost:9545",
            "--init-mode",
            "separate-call",
            "--treasury-fee-bps",
            "100",
        ]);

        let mut config = DeployConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.rpc_url, "http://localhost:9545");
        assert_eq!(config.hub.init_mode, InitMode::SeparateCall);
        assert_eq!(config.hub.treasury_fee_bps, 100);
        assert_eq!(config.manifest_path, DeployConfig::default().manifest_path);
    }

    #[test]
    fn test_proxy_admin_flag_completes_separate_call_config() {
        let mut config = DeployConfig::default();
        config.hub.init_mode = InitMode::SeparateCall;
        assert!(config.validate().is_err());

        let cli = Cli::parse_from([
            "hubdeploy",
            "--proxy-admin",
            "0x00000000000000000000000000000000000000ad",
        ]);
        cli.apply(&mut config);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_flags_default_to_a_real_run() {
        let cli = Cli::parse_from(["hubdeploy"]);
        assert!(!cli.dry_run);
        assert!(!cli.print_plan);
        assert_eq!(cli.verbosity, LevelFilter::INFO);
    }
}
