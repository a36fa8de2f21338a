//! Post-deployment whitelisting.
//!
//! Best effort: a failed entry is recorded and the pass moves on to the next one. The
//! run only fails once every category has been processed.

use std::time::Duration;

use alloy_core::{dyn_abi::DynSolValue, primitives::Address};

use crate::{
    chain::{ChainClient, Confirmation},
    config::Roles,
    contracts::encode_call,
    error::{ChainError, DeployError},
    orchestrator::{AbortSignal, DEFAULT_CONFIRMATION_TIMEOUT, DeploymentRecord},
    plan::{DeploymentPlan, WhitelistCategory},
    report::{EntryStatus, RunReport, WhitelistOutcome},
};

/// Issues the whitelist transactions of a plan.
#[derive(Debug)]
pub struct WhitelistRegistrar<'a, C> {
    chain: &'a C,
    roles: &'a Roles,
    confirmation_timeout: Duration,
    abort: AbortSignal,
}

impl<'a, C: ChainClient> WhitelistRegistrar<'a, C> {
    pub fn new(chain: &'a C, roles: &'a Roles) -> Self {
        Self {
            chain,
            roles,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            abort: AbortSignal::never(),
        }
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn with_abort_signal(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    /// Whitelist every entry of every category of `plan`, in order.
    ///
    /// Returns [`DeployError::WhitelistIncomplete`] if any entry failed or was skipped.
    pub async fn run(
        &self,
        plan: &DeploymentPlan,
        record: &DeploymentRecord,
        report: &mut RunReport,
    ) -> Result<(), DeployError> {
        let (mut failed, mut skipped) = (0, 0);

        for category in &plan.whitelist {
            let target = record.address_of(&category.target);
            let signer = self.roles.address(category.signer);

            tracing::info!(
                category = %category.kind,
                target = %category.target,
                entries = category.entries.len(),
                "Whitelisting..."
            );

            for label in &category.entries {
                let module = record.address_of(label);

                let (tx, status) = if self.abort.is_aborted() {
                    skipped += 1;
                    (None, EntryStatus::Skipped)
                } else {
                    match self.whitelist(category, target, signer, label, module).await {
                        Ok(confirmation) => (Some(confirmation.tx), EntryStatus::Whitelisted),
                        Err(reason) => {
                            failed += 1;
                            tracing::warn!(
                                category = %category.kind,
                                label = %label,
                                error = %reason,
                                "Whitelist entry failed, continuing"
                            );
                            (None, EntryStatus::Failed(reason))
                        }
                    }
                };

                report.whitelist.push(WhitelistOutcome {
                    category: category.kind,
                    label: label.clone(),
                    module: module.unwrap_or_default(),
                    tx,
                    status,
                });
            }
        }

        if failed + skipped > 0 {
            return Err(DeployError::WhitelistIncomplete { failed, skipped });
        }

        tracing::info!(entries = report.whitelist.len(), "Whitelisting complete");
        Ok(())
    }

    /// One authorization transaction. Errors are returned as the reason to record.
    async fn whitelist(
        &self,
        category: &WhitelistCategory,
        target: Option<Address>,
        signer: Address,
        label: &str,
        module: Option<Address>,
    ) -> Result<Confirmation, String> {
        let target = target
            .ok_or_else(|| format!("whitelist holder `{}` was not deployed", category.target))?;
        let module = module.ok_or_else(|| format!("`{label}` was not deployed"))?;

        let data = encode_call(
            &category.signature,
            &[DynSolValue::Address(module), DynSolValue::Bool(true)],
        );

        let pending = self
            .chain
            .submit_call(signer, target, data)
            .await
            .map_err(|e| e.to_string())?;
        let confirmation = self
            .chain
            .await_confirmation(&pending, self.confirmation_timeout)
            .await
            .map_err(|e| e.to_string())?;

        if !confirmation.success {
            return Err(ChainError::rejected(format!("transaction {} reverted", confirmation.tx))
                .to_string());
        }

        tracing::debug!(label, module = %module, tx = %confirmation.tx, "Whitelisted");
        Ok(confirmation)
    }
}
