//! Sequential plan execution.
//!
//! The deployer nonce is read once, before the first step. Every deployer-signed step is
//! assigned its nonce up front and every creation its predicted address, then the steps
//! run one at a time: submit, wait for the receipt, check the realized address. Nothing
//! is ever in flight concurrently, so the nonce stream cannot reorder.

use std::{collections::HashMap, time::Duration};

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, Bytes},
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::{
    chain::{ChainClient, Confirmation},
    config::Roles,
    contracts::{ContractFactory, encode_call},
    error::DeployError,
    plan::{Arg, CallSpec, DeploymentPlan, PlanError, PlanStep, Slot, StepAction},
    predictor::Account,
    report::{RunReport, StepOutcome, StepStatus},
};

/// Default bound on the wait for a single receipt.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Read side of the abort flag, checked between two transactions.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

/// Write side of the abort flag.
#[derive(Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortSignal {
    pub fn new() -> (AbortHandle, AbortSignal) {
        let (tx, rx) = watch::channel(false);
        (AbortHandle { tx }, AbortSignal { rx })
    }

    /// A signal that is never raised.
    pub fn never() -> Self {
        Self::new().1
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }
}

impl AbortHandle {
    /// Ask the run to stop before its next transaction.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

/// A contract created by the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedContract {
    pub label: String,
    pub contract: String,
    pub address: Address,
    pub tx: B256,
    pub nonce: u64,
}

/// What a completed run produced, in plan order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub deployer: Account,
    pub contracts: Vec<DeployedContract>,
    /// Every address that was baked into a contract before it existed.
    pub predictions: Vec<(String, Address)>,
}

impl DeploymentRecord {
    pub fn address_of(&self, label: &str) -> Option<Address> {
        self.contracts
            .iter()
            .find(|contract| contract.label == label)
            .map(|contract| contract.address)
    }
}

/// Nonce and predicted address assigned to a step before the run starts.
#[derive(Debug, Clone, Copy)]
struct Scheduled {
    nonce: Option<u64>,
    predicted: Option<Address>,
}

/// Result of a successfully executed step.
struct Executed {
    confirmation: Confirmation,
    realized: Option<Address>,
}

/// Runs a [`DeploymentPlan`] against a chain.
#[derive(Debug)]
pub struct DeploymentOrchestrator<'a, C, F> {
    chain: &'a C,
    factory: &'a F,
    roles: &'a Roles,
    confirmation_timeout: Duration,
    abort: AbortSignal,
}

impl<'a, C, F> DeploymentOrchestrator<'a, C, F>
where
    C: ChainClient,
    F: ContractFactory,
{
    pub fn new(chain: &'a C, factory: &'a F, roles: &'a Roles) -> Self {
        Self {
            chain,
            factory,
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

    /// Execute every step of `plan` in order.
    ///
    /// The outcome of each step is written into `report` as the run progresses. The
    /// first failure stops the run; confirmed transactions are not rolled back.
    pub async fn run(
        &self,
        plan: &DeploymentPlan,
        report: &mut RunReport,
    ) -> Result<DeploymentRecord, DeployError> {
        plan.validate()?;

        let start_nonce = self
            .chain
            .nonce(self.roles.deployer)
            .await
            .map_err(DeployError::NonceUnavailable)?;
        let account = Account::new(self.roles.deployer, start_nonce);

        let schedule = Self::schedule(plan, &account);
        let predictions: HashMap<&str, Address> = plan
            .steps
            .iter()
            .zip(&schedule)
            .filter_map(|(step, scheduled)| Some((step.label.as_str(), scheduled.predicted?)))
            .collect();

        tracing::info!(
            deployer = %account.address,
            start_nonce,
            steps = plan.steps.len(),
            "Starting deployment..."
        );

        report.steps = plan
            .steps
            .iter()
            .zip(&schedule)
            .enumerate()
            .map(|(i, (step, scheduled))| StepOutcome {
                position: i + 1,
                label: step.label.clone(),
                action: match &step.action {
                    StepAction::Create { contract, .. } => contract.clone(),
                    StepAction::Call { call, .. } => call.signature.clone(),
                },
                nonce: scheduled.nonce,
                predicted: scheduled.predicted,
                realized: None,
                tx: None,
                status: StepStatus::NotReached,
            })
            .collect();

        let mut realized: HashMap<&str, Address> = HashMap::new();
        let mut contracts = Vec::new();

        for (i, (step, scheduled)) in plan.steps.iter().zip(&schedule).enumerate() {
            if self.abort.is_aborted() {
                tracing::warn!(position = i + 1, label = %step.label, "Deployment aborted");
                return Err(DeployError::Aborted {
                    position: i + 1,
                    label: step.label.clone(),
                });
            }

            let result = self
                .execute(step, scheduled, &predictions, &realized)
                .await;

            let outcome = &mut report.steps[i];
            match result {
                Ok(executed) => {
                    outcome.tx = Some(executed.confirmation.tx);
                    outcome.realized = executed.realized;
                    outcome.status = StepStatus::Confirmed;

                    if let (Some(address), StepAction::Create { contract, .. }) =
                        (executed.realized, &step.action)
                    {
                        realized.insert(step.label.as_str(), address);
                        contracts.push(DeployedContract {
                            label: step.label.clone(),
                            contract: contract.clone(),
                            address,
                            tx: executed.confirmation.tx,
                            nonce: scheduled.nonce.unwrap_or_default(),
                        });
                    }
                }
                Err(err) => {
                    if let DeployError::PredictionMismatch { realized, .. } = &err {
                        outcome.realized = Some(*realized);
                    }
                    outcome.status = StepStatus::Failed(err.to_string());
                    tracing::error!(label = %step.label, error = %err, "Step failed");
                    return Err(err);
                }
            }
        }

        tracing::info!(contracts = contracts.len(), "All contracts deployed");

        // Plan order, restricted to addresses used before their contract existed.
        let predictions = plan
            .steps
            .iter()
            .zip(&schedule)
            .filter_map(|(step, scheduled)| {
                let address = scheduled.predicted?;
                Self::is_referenced_as_prediction(plan, &step.label)
                    .then(|| (step.label.clone(), address))
            })
            .collect();

        Ok(DeploymentRecord {
            deployer: account,
            contracts,
            predictions,
        })
    }

    /// Assign nonces to deployer-signed steps and predicted addresses to creations.
    fn schedule(plan: &DeploymentPlan, account: &Account) -> Vec<Scheduled> {
        plan.steps
            .iter()
            .zip(plan.schedule())
            .map(|(step, offset)| {
                let nonce = offset.and_then(|k| account.nonce_at(k).ok());
                let predicted = offset
                    .filter(|_| step.is_creation())
                    .and_then(|k| account.predict(k).ok());
                Scheduled { nonce, predicted }
            })
            .collect()
    }

    fn is_referenced_as_prediction(plan: &DeploymentPlan, label: &str) -> bool {
        plan.steps.iter().any(|step| {
            step.slots()
                .iter()
                .any(|slot| matches!(slot, Slot::Predicted(target) if target == label))
        })
    }

    async fn execute(
        &self,
        step: &PlanStep,
        scheduled: &Scheduled,
        predictions: &HashMap<&str, Address>,
        realized: &HashMap<&str, Address>,
    ) -> Result<Executed, DeployError> {
        let resolver = Resolver {
            step: &step.label,
            roles: self.roles,
            predictions,
            realized,
        };

        match &step.action {
            StepAction::Create {
                contract,
                libraries,
                args,
            } => {
                let libraries = libraries
                    .iter()
                    .map(|link| Ok((link.name.clone(), resolver.address(&link.address)?)))
                    .collect::<Result<Vec<_>, DeployError>>()?;
                let args = resolver.args(args)?;
                let init_code = self
                    .factory
                    .init_code(contract, &libraries, &args)
                    .map_err(|source| DeployError::Encoding {
                        label: step.label.clone(),
                        source,
                    })?;

                let predicted = scheduled.predicted.ok_or_else(|| {
                    DeployError::InvalidPlan(PlanError::NotACreation {
                        step: step.label.clone(),
                        target: step.label.clone(),
                    })
                })?;

                tracing::info!(
                    label = %step.label,
                    contract = %contract,
                    nonce = scheduled.nonce,
                    predicted = %predicted,
                    "Deploying contract..."
                );

                let confirmation = self
                    .send(&step.label, self.roles.deployer, None, init_code)
                    .await?;
                let address =
                    confirmation
                        .contract_address
                        .ok_or_else(|| DeployError::MissingContractAddress {
                            label: step.label.clone(),
                        })?;

                if address != predicted {
                    return Err(DeployError::PredictionMismatch {
                        label: step.label.clone(),
                        predicted,
                        realized: address,
                    });
                }

                tracing::info!(label = %step.label, address = %address, "Contract deployed");

                Ok(Executed {
                    confirmation,
                    realized: Some(address),
                })
            }
            StepAction::Call {
                target,
                signer,
                call,
            } => {
                let to = resolver.address(target)?;
                let from = self.roles.address(*signer);
                let data = resolver.call_data(call)?;

                tracing::info!(
                    label = %step.label,
                    to = %to,
                    signer = %signer,
                    function = %call.signature,
                    "Calling contract..."
                );

                let confirmation = self.send(&step.label, from, Some(to), data).await?;

                Ok(Executed {
                    confirmation,
                    realized: None,
                })
            }
        }
    }

    /// Submit one transaction and block until it is mined and successful.
    async fn send(
        &self,
        label: &str,
        from: Address,
        to: Option<Address>,
        data: Bytes,
    ) -> Result<Confirmation, DeployError> {
        let pending = match to {
            None => self.chain.submit_create(from, data).await,
            Some(to) => self.chain.submit_call(from, to, data).await,
        }
        .map_err(|e| DeployError::from_chain(label, e))?;

        let confirmation = self
            .chain
            .await_confirmation(&pending, self.confirmation_timeout)
            .await
            .map_err(|e| DeployError::from_chain(label, e))?;

        if !confirmation.success {
            return Err(DeployError::TransactionRejected {
                label: label.to_string(),
                reason: format!("transaction {} reverted", confirmation.tx),
            });
        }

        Ok(confirmation)
    }
}

/// Turns plan arguments into concrete ABI values for one step.
struct Resolver<'r> {
    step: &'r str,
    roles: &'r Roles,
    predictions: &'r HashMap<&'r str, Address>,
    realized: &'r HashMap<&'r str, Address>,
}

impl Resolver<'_> {
    fn address(&self, slot: &Slot) -> Result<Address, DeployError> {
        match slot {
            Slot::Predicted(label) => self.lookup(self.predictions, label),
            Slot::Realized(label) => self.lookup(self.realized, label),
            Slot::Role(role) => Ok(self.roles.address(*role)),
            Slot::Fixed(address) => Ok(*address),
        }
    }

    fn lookup(
        &self,
        addresses: &HashMap<&str, Address>,
        label: &str,
    ) -> Result<Address, DeployError> {
        addresses.get(label).copied().ok_or_else(|| {
            DeployError::InvalidPlan(PlanError::UnknownReference {
                step: self.step.to_string(),
                target: label.to_string(),
            })
        })
    }

    fn args(&self, args: &[Arg]) -> Result<Vec<DynSolValue>, DeployError> {
        args.iter().map(|arg| self.value(arg)).collect()
    }

    fn value(&self, arg: &Arg) -> Result<DynSolValue, DeployError> {
        Ok(match arg {
            Arg::Address(slot) => DynSolValue::Address(self.address(slot)?),
            Arg::Uint(value) => DynSolValue::Uint(*value, 256),
            Arg::Bool(value) => DynSolValue::Bool(*value),
            Arg::String(value) => DynSolValue::String(value.clone()),
            Arg::Bytes(value) => DynSolValue::Bytes(value.to_vec()),
            Arg::Call(call) => DynSolValue::Bytes(self.call_data(call)?.to_vec()),
        })
    }

    fn call_data(&self, call: &CallSpec) -> Result<Bytes, DeployError> {
        Ok(encode_call(&call.signature, &self.args(&call.args)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chain::SimulatedChain,
        contracts::ArtifactError,
        plan::Role,
        predictor::predict,
    };

    /// Factory whose init code is the contract name followed by the encoded arguments.
    struct NameFactory;

    impl ContractFactory for NameFactory {
        fn init_code(
            &self,
            contract: &str,
            libraries: &[(String, Address)],
            args: &[DynSolValue],
        ) -> Result<Bytes, ArtifactError> {
            let mut code = contract.as_bytes().to_vec();
            for (_, address) in libraries {
                code.extend_from_slice(address.as_slice());
            }
            code.extend(crate::contracts::encode_params(args));
            Ok(code.into())
        }
    }

    fn roles(chain: &SimulatedChain) -> Roles {
        Roles {
            deployer: chain.account(0).expect("dev account"),
            governance: chain.account(1).expect("dev account"),
            treasury: chain.account(2).expect("dev account"),
            proxy_admin: chain.account(0).expect("dev account"),
        }
    }

    fn two_step_plan() -> DeploymentPlan {
        DeploymentPlan::new(
            vec![
                PlanStep::create("impl", "Impl", vec![Arg::predicted("satellite")]),
                PlanStep::create("satellite", "Satellite", vec![Arg::realized("impl")]),
            ],
            vec![],
        )
    }

    #[tokio::test]
    async fn test_predicted_address_is_baked_into_constructor() {
        let chain = SimulatedChain::with_dev_accounts(3);
        let roles = roles(&chain);
        let chain = chain.with_nonce(roles.deployer, 3);
        let mut report = RunReport::default();

        let record = DeploymentOrchestrator::new(&chain, &NameFactory, &roles)
            .run(&two_step_plan(), &mut report)
            .await
            .expect("deployment should succeed");

        let satellite = predict(roles.deployer, 4);
        assert_eq!(record.address_of("satellite"), Some(satellite));
        assert_eq!(record.predictions, vec![("satellite".to_string(), satellite)]);

        let impl_code = chain
            .code_at(predict(roles.deployer, 3))
            .expect("impl deployed");
        assert_eq!(&impl_code[impl_code.len() - 20..], satellite.as_slice());

        assert!(
            report
                .steps
                .iter()
                .all(|step| step.status == StepStatus::Confirmed)
        );
        assert_eq!(report.steps[1].nonce, Some(4));
    }

    #[tokio::test]
    async fn test_foreign_transaction_is_caught_as_mismatch() {
        let chain = SimulatedChain::with_dev_accounts(3);
        let roles = roles(&chain);
        let mut report = RunReport::default();

        // Someone else consumes nonce 0 after the plan was scheduled.
        struct Interfering<'c>(&'c SimulatedChain);

        impl ChainClient for Interfering<'_> {
            async fn accounts(&self) -> Result<Vec<Address>, crate::error::ChainError> {
                self.0.accounts().await
            }

            async fn nonce(&self, account: Address) -> Result<u64, crate::error::ChainError> {
                let nonce = self.0.nonce(account).await?;
                self.0
                    .submit_call(account, Address::ZERO, Bytes::new())
                    .await?;
                Ok(nonce)
            }

            async fn submit_create(
                &self,
                from: Address,
                init_code: Bytes,
            ) -> Result<crate::chain::PendingTx, crate::error::ChainError> {
                self.0.submit_create(from, init_code).await
            }

            async fn submit_call(
                &self,
                from: Address,
                to: Address,
                data: Bytes,
            ) -> Result<crate::chain::PendingTx, crate::error::ChainError> {
                self.0.submit_call(from, to, data).await
            }

            async fn await_confirmation(
                &self,
                pending: &crate::chain::PendingTx,
                timeout: Duration,
            ) -> Result<Confirmation, crate::error::ChainError> {
                self.0.await_confirmation(pending, timeout).await
            }
        }

        let err = DeploymentOrchestrator::new(&Interfering(&chain), &NameFactory, &roles)
            .run(&two_step_plan(), &mut report)
            .await
            .expect_err("drifted nonce must be detected");

        match err {
            DeployError::PredictionMismatch {
                label,
                predicted,
                realized,
            } => {
                assert_eq!(label, "impl");
                assert_eq!(predicted, predict(roles.deployer, 0));
                assert_eq!(realized, predict(roles.deployer, 1));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(report.steps[0].status, StepStatus::Failed(_)));
        assert_eq!(report.steps[1].status, StepStatus::NotReached);
    }

    #[tokio::test]
    async fn test_call_step_signed_by_other_role_keeps_deployer_nonces() {
        let chain = SimulatedChain::with_dev_accounts(3);
        let roles = roles(&chain);
        let mut plan = two_step_plan();
        plan.steps.insert(
            1,
            PlanStep::call(
                "configure",
                Slot::realized("impl"),
                Role::Governance,
                CallSpec::new("configure(address)", vec![Arg::role(Role::Treasury)]),
            ),
        );
        let mut report = RunReport::default();

        let record = DeploymentOrchestrator::new(&chain, &NameFactory, &roles)
            .run(&plan, &mut report)
            .await
            .expect("deployment should succeed");

        assert_eq!(
            record.address_of("satellite"),
            Some(predict(roles.deployer, 1))
        );
        let calls = chain.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].from, roles.governance);
        assert_eq!(calls[0].to, predict(roles.deployer, 0));
        assert_eq!(report.steps[1].nonce, None);
    }

    #[tokio::test]
    async fn test_abort_stops_before_first_step() {
        let chain = SimulatedChain::with_dev_accounts(3);
        let roles = roles(&chain);
        let (handle, signal) = AbortSignal::new();
        handle.abort();
        let mut report = RunReport::default();

        let err = DeploymentOrchestrator::new(&chain, &NameFactory, &roles)
            .with_abort_signal(signal)
            .run(&two_step_plan(), &mut report)
            .await
            .expect_err("aborted run must fail");

        assert!(matches!(err, DeployError::Aborted { position: 1, .. }));
        assert!(chain.code_at(predict(roles.deployer, 0)).is_none());
    }

    #[tokio::test]
    async fn test_invalid_plan_sends_nothing() {
        let chain = SimulatedChain::with_dev_accounts(3);
        let roles = roles(&chain);
        let plan = DeploymentPlan::new(
            vec![PlanStep::create("a", "A", vec![Arg::realized("a")])],
            vec![],
        );
        let mut report = RunReport::default();

        let err = DeploymentOrchestrator::new(&chain, &NameFactory, &roles)
            .run(&plan, &mut report)
            .await
            .expect_err("self reference must be rejected");

        assert!(matches!(err, DeployError::InvalidPlan(_)));
        assert_eq!(chain.nonce(roles.deployer).await, Ok(0));
    }
}
