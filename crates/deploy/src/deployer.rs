use std::path::PathBuf;

use crate::{
    chain::ChainClient,
    config::DeployConfig,
    contracts::ContractFactory,
    error::DeployError,
    manifest::Manifest,
    orchestrator::{AbortSignal, DeploymentOrchestrator},
    plan::DeploymentPlan,
    registrar::WhitelistRegistrar,
    report::RunReport,
};

/// Top-level deployer of the hub protocol.
///
/// A run validates the plan, resolves the account roles, creates every contract, writes
/// the manifest, then whitelists the modules. The manifest only exists once every
/// creation has been confirmed at its predicted address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubDeployer {
    pub config: DeployConfig,
    /// Whether the manifest is written to [`DeployConfig::manifest_path`].
    write_manifest: bool,
}

impl HubDeployer {
    pub fn new(config: DeployConfig) -> Self {
        Self {
            config,
            write_manifest: true,
        }
    }

    /// Keep the manifest in the report instead of writing it to disk.
    pub fn without_manifest_file(mut self) -> Self {
        self.write_manifest = false;
        self
    }

    /// The plan this deployer executes.
    pub fn plan(&self) -> DeploymentPlan {
        DeploymentPlan::hub(&self.config.hub)
    }

    /// Deploy the hub protocol.
    pub async fn deploy<C, F>(&self, chain: &C, factory: &F, abort: AbortSignal) -> RunReport
    where
        C: ChainClient,
        F: ContractFactory,
    {
        self.deploy_plan(&self.plan(), chain, factory, abort).await
    }

    /// Deploy an arbitrary plan with this deployer's settings.
    pub async fn deploy_plan<C, F>(
        &self,
        plan: &DeploymentPlan,
        chain: &C,
        factory: &F,
        abort: AbortSignal,
    ) -> RunReport
    where
        C: ChainClient,
        F: ContractFactory,
    {
        let mut report = RunReport::default();

        if let Err(err) = self.run(plan, chain, factory, abort, &mut report).await {
            tracing::error!(error = %err, "Deployment failed");
            report.failure = Some(err);
        } else {
            tracing::info!("Deployment complete");
        }

        report
    }

    async fn run<C, F>(
        &self,
        plan: &DeploymentPlan,
        chain: &C,
        factory: &F,
        abort: AbortSignal,
        report: &mut RunReport,
    ) -> Result<(), DeployError>
    where
        C: ChainClient,
        F: ContractFactory,
    {
        plan.validate()?;

        let roles = self.config.roles(chain).await?;
        let timeout = self.config.confirmation_timeout();

        let record = DeploymentOrchestrator::new(chain, factory, &roles)
            .with_confirmation_timeout(timeout)
            .with_abort_signal(abort.clone())
            .run(plan, report)
            .await?;

        let manifest = Manifest::from_record(&record)?;
        if self.write_manifest {
            let path: PathBuf = self.config.manifest_path.clone();
            manifest
                .write(&path)
                .map_err(|e| DeployError::Manifest(format!("{e:#}")))?;
            report.manifest_path = Some(path);
        }
        report.manifest = Some(manifest);

        WhitelistRegistrar::new(chain, &roles)
            .with_confirmation_timeout(timeout)
            .with_abort_signal(abort)
            .run(plan, &record, report)
            .await
    }
}
