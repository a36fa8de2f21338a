//! Error taxonomy for a deployment run.
//!
//! Contract-creation errors abort the run as soon as they happen. Whitelist errors are
//! recorded per entry and only surface in aggregate once the whole pass has completed.

use std::time::Duration;

use alloy_core::primitives::{Address, B256};

use crate::{contracts::ArtifactError, plan::PlanError, plan::WhitelistCategoryKind};

/// Errors returned by a [`ChainClient`](crate::ChainClient).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// The node refused the transaction, or the transaction was mined but reverted.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    /// The receipt did not show up before the polling deadline.
    #[error("transaction {tx} not confirmed within {waited:?}")]
    Timeout { tx: B256, waited: Duration },

    /// The endpoint could not be reached or answered with garbage.
    #[error("rpc transport error: {0}")]
    Transport(String),
}

impl ChainError {
    pub fn rejected(e: impl std::fmt::Display) -> Self {
        Self::Rejected(e.to_string())
    }

    pub fn transport(e: impl std::fmt::Display) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Fatal errors of a deployment run.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// A contract landed at an address other than the one baked into earlier contracts.
    #[error("address mismatch for `{label}`: predicted {predicted}, realized {realized}")]
    PredictionMismatch {
        label: String,
        predicted: Address,
        realized: Address,
    },

    #[error("transaction for `{label}` rejected: {reason}")]
    TransactionRejected { label: String, reason: String },

    #[error("confirmation of `{label}` (tx {tx}) timed out after {waited:?}")]
    ConfirmationTimeout {
        label: String,
        tx: B256,
        waited: Duration,
    },

    #[error("receipt for `{label}` carries no contract address")]
    MissingContractAddress { label: String },

    #[error("invalid deployment plan: {0}")]
    InvalidPlan(#[from] PlanError),

    #[error("failed to build payload for `{label}`: {source}")]
    Encoding {
        label: String,
        #[source]
        source: ArtifactError,
    },

    #[error("failed to read deployer nonce: {0}")]
    NonceUnavailable(#[source] ChainError),

    #[error("failed to resolve account roles: {0}")]
    RolesUnavailable(String),

    /// The run was cancelled between two steps. Confirmed transactions stay confirmed.
    #[error("run aborted before step {position} (`{label}`)")]
    Aborted { position: usize, label: String },

    #[error("failed to write manifest: {0}")]
    Manifest(String),

    /// Raised once the whitelist pass is over and at least one entry failed or was
    /// skipped by an abort.
    #[error("{failed} whitelist entries failed, {skipped} skipped")]
    WhitelistIncomplete { failed: usize, skipped: usize },
}

impl DeployError {
    /// Map a chain failure of the step labelled `label` into the run taxonomy.
    pub(crate) fn from_chain(label: &str, err: ChainError) -> Self {
        match err {
            ChainError::Timeout { tx, waited } => Self::ConfirmationTimeout {
                label: label.to_string(),
                tx,
                waited,
            },
            ChainError::Rejected(reason) | ChainError::Transport(reason) => {
                Self::TransactionRejected {
                    label: label.to_string(),
                    reason,
                }
            }
        }
    }
}

/// A single whitelist authorization that did not go through.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("whitelisting `{label}` ({module}) as {category} failed: {reason}")]
pub struct WhitelistEntryFailed {
    pub category: WhitelistCategoryKind,
    pub label: String,
    pub module: Address,
    pub reason: String,
}
