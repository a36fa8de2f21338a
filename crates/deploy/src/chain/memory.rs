//! In-memory chain.
//!
//! Applies the canonical creation rule and tracks one nonce per account. Every
//! transaction is mined as soon as it is submitted. Used by `--dry-run` and by tests.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use alloy_core::primitives::{Address, B256, Bytes, keccak256};

use super::{ChainClient, Confirmation, PendingTx};
use crate::{error::ChainError, predictor};

/// A call recorded by the simulated chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
}

#[derive(Debug, Default)]
struct State {
    nonces: HashMap<Address, u64>,
    code: HashMap<Address, Bytes>,
    receipts: HashMap<B256, Confirmation>,
    calls: Vec<RecordedCall>,
}

impl State {
    /// Consume the next nonce of `from` and return it with the transaction hash.
    fn next_tx(&mut self, from: Address) -> (u64, B256) {
        let nonce = self.nonces.entry(from).or_default();
        let used = *nonce;
        *nonce += 1;

        let mut preimage = from.to_vec();
        preimage.extend_from_slice(&used.to_be_bytes());
        (used, keccak256(preimage))
    }
}

/// [`ChainClient`] backed by process memory.
#[derive(Debug)]
pub struct SimulatedChain {
    accounts: Vec<Address>,
    state: Mutex<State>,
}

impl SimulatedChain {
    pub fn new(accounts: Vec<Address>) -> Self {
        Self {
            accounts,
            state: Mutex::new(State::default()),
        }
    }

    /// A chain with `count` deterministic, unfunded-but-usable accounts.
    pub fn with_dev_accounts(count: usize) -> Self {
        let accounts = (0..count)
            .map(|i| {
                let hash = keccak256(format!("hubdeploy dev account {i}"));
                Address::from_slice(&hash[12..])
            })
            .collect();
        Self::new(accounts)
    }

    /// Start `account` at `nonce`, as if it had already sent that many transactions.
    pub fn with_nonce(self, account: Address, nonce: u64) -> Self {
        self.lock().nonces.insert(account, nonce);
        self
    }

    pub fn account(&self, index: usize) -> Option<Address> {
        self.accounts.get(index).copied()
    }

    /// Init code stored at `address` by a creation, if any.
    pub fn code_at(&self, address: Address) -> Option<Bytes> {
        self.lock().code.get(&address).cloned()
    }

    /// Every call sent so far, in submission order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ChainClient for SimulatedChain {
    async fn accounts(&self) -> Result<Vec<Address>, ChainError> {
        Ok(self.accounts.clone())
    }

    async fn nonce(&self, account: Address) -> Result<u64, ChainError> {
        Ok(self.lock().nonces.get(&account).copied().unwrap_or_default())
    }

    async fn submit_create(&self, from: Address, init_code: Bytes) -> Result<PendingTx, ChainError> {
        if init_code.is_empty() {
            return Err(ChainError::rejected("contract creation without init code"));
        }

        let mut state = self.lock();
        let (nonce, hash) = state.next_tx(from);
        let address = predictor::predict(from, nonce);

        state.code.insert(address, init_code);
        state.receipts.insert(
            hash,
            Confirmation {
                tx: hash,
                contract_address: Some(address),
                success: true,
            },
        );

        Ok(PendingTx { hash, from })
    }

    async fn submit_call(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<PendingTx, ChainError> {
        let mut state = self.lock();
        let (_, hash) = state.next_tx(from);

        state.calls.push(RecordedCall { from, to, data });
        state.receipts.insert(
            hash,
            Confirmation {
                tx: hash,
                contract_address: None,
                success: true,
            },
        );

        Ok(PendingTx { hash, from })
    }

    async fn await_confirmation(
        &self,
        pending: &PendingTx,
        timeout: Duration,
    ) -> Result<Confirmation, ChainError> {
        self.lock()
            .receipts
            .get(&pending.hash)
            .copied()
            .ok_or(ChainError::Timeout {
                tx: pending.hash,
                waited: timeout,
            })
    }
}
