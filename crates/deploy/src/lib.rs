//! hubdeploy-core - Deployment library for the hub protocol.
//!
//! This crate deploys the hub protocol's interdependent contracts in a fixed order,
//! pre-computing the addresses of contracts that must be referenced before they exist,
//! and records the result in an address manifest.

pub mod chain;
pub mod contracts;
pub mod plan;
pub mod predictor;

mod config;
pub use config::{
    AccountsConfig, DEFAULT_CONFIG_FILENAME, DEFAULT_RPC_URL, DeployConfig, ENV_PREFIX, Roles,
};

mod deployer;
pub use deployer::HubDeployer;

mod error;
pub use error::{ChainError, DeployError, WhitelistEntryFailed};

mod manifest;
pub use manifest::{DEFAULT_MANIFEST_PATH, Manifest};

mod orchestrator;
pub use orchestrator::{
    AbortHandle, AbortSignal, DEFAULT_CONFIRMATION_TIMEOUT, DeployedContract,
    DeploymentOrchestrator, DeploymentRecord,
};

mod registrar;
pub use registrar::WhitelistRegistrar;

mod report;
pub use report::{
    EXIT_DEPLOYMENT_FAILED, EXIT_SUCCESS, EXIT_WHITELIST_INCOMPLETE, EntryStatus, RunReport,
    StepOutcome, StepStatus, WhitelistOutcome,
};

pub use chain::{ChainClient, Confirmation, PendingTx, RpcChainClient, SimulatedChain};
pub use contracts::{ArtifactError, ArtifactFactory, ContractFactory};
pub use plan::{DeploymentPlan, HubPlanParams, InitMode, PlanError, PlanStep, Role};
pub use predictor::{Account, predict};
