//! Chain access.
//!
//! The deployment core only talks to the chain through [`ChainClient`]. Two clients ship
//! with the crate: [`RpcChainClient`] for a JSON-RPC node holding the signing accounts,
//! and [`SimulatedChain`], an in-memory chain used for dry runs and tests.

mod memory;
mod rpc;

use std::{future::Future, time::Duration};

use alloy_core::primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};

pub use memory::{RecordedCall, SimulatedChain};
pub use rpc::{DEFAULT_POLL_INTERVAL, RpcChainClient};

use crate::error::ChainError;

/// A submitted, not yet confirmed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTx {
    pub hash: B256,
    pub from: Address,
}

/// Receipt of a confirmed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub tx: B256,
    /// Set for contract creations.
    pub contract_address: Option<Address>,
    /// `false` if the transaction was mined but reverted.
    pub success: bool,
}

/// Everything the deployment needs from a chain.
///
/// Implementations do not retry submissions. Only the read-only confirmation polling
/// may be repeated, and it is bounded by the timeout given to
/// [`await_confirmation`](Self::await_confirmation).
pub trait ChainClient: Send + Sync {
    /// Accounts the endpoint can sign for, in the node's order.
    fn accounts(&self) -> impl Future<Output = Result<Vec<Address>, ChainError>> + Send;

    /// Next nonce of `account`, counting pending transactions.
    fn nonce(&self, account: Address) -> impl Future<Output = Result<u64, ChainError>> + Send;

    /// Send a contract creation transaction.
    fn submit_create(
        &self,
        from: Address,
        init_code: Bytes,
    ) -> impl Future<Output = Result<PendingTx, ChainError>> + Send;

    /// Send a call to an existing contract.
    fn submit_call(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> impl Future<Output = Result<PendingTx, ChainError>> + Send;

    /// Wait until `pending` is mined, or fail with [`ChainError::Timeout`].
    fn await_confirmation(
        &self,
        pending: &PendingTx,
        timeout: Duration,
    ) -> impl Future<Output = Result<Confirmation, ChainError>> + Send;
}
