//! hubdeploy deploys the hub protocol contracts in one pass and records their addresses.

mod cli;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use cli::Cli;
use hubdeploy_core::{
    AbortSignal, ArtifactFactory, DeployConfig, HubDeployer, RpcChainClient, SimulatedChain,
};

/// Accounts of the in-memory chain: deployer, governance, treasury.
const DRY_RUN_ACCOUNTS: usize = 3;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    // Command line flags are the last layer, so validation waits for them.
    let mut config = DeployConfig::extract(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    if let Some(path) = &cli.save_config {
        config.save_to_file(path)?;
    }

    let deployer = HubDeployer::new(config);

    if cli.print_plan {
        println!("{}", serde_json::to_string_pretty(&deployer.plan())?);
        return Ok(ExitCode::SUCCESS);
    }

    let factory = ArtifactFactory::open(&deployer.config.artifacts_dir)?;

    // Ctrl-C stops the run between two transactions.
    let (abort_handle, abort) = AbortSignal::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the pending transaction...");
            abort_handle.abort();
        }
    });

    let report = if cli.dry_run {
        tracing::info!("Dry run against an in-memory chain");
        let chain = SimulatedChain::with_dev_accounts(DRY_RUN_ACCOUNTS);
        deployer
            .without_manifest_file()
            .deploy(&chain, &factory, abort)
            .await
    } else {
        let chain = RpcChainClient::new(
            deployer.config.rpc_url()?,
            deployer.config.poll_interval(),
        )?;
        let chain_id = chain.chain_id().await?;

        tracing::info!(
            rpc_url = %chain.url(),
            chain_id,
            manifest = %deployer.config.manifest_path.display(),
            "Deploying hub protocol..."
        );

        deployer.deploy(&chain, &factory, abort).await
    };

    println!("{}", report.render());

    if cli.dry_run {
        if let Some(manifest) = &report.manifest {
            println!("{}", manifest.to_json()?);
        }
    }

    Ok(ExitCode::from(report.exit_code()))
}
