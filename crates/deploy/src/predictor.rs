//! Contract address prediction.
//!
//! A contract created by a plain `CREATE` transaction lands at the low 20 bytes of
//! `keccak256(rlp([sender, nonce]))`. Knowing the deployer's nonce is therefore enough to
//! know where every one of its future contracts will live, which is what lets a contract
//! be constructed with the address of a contract that does not exist yet.

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};

/// Compute the address of the contract created by `sender` with the given `nonce`.
pub fn predict(sender: Address, nonce: u64) -> Address {
    sender.create(nonce)
}

/// Returned when asking for the 0-th future transaction of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("transaction offsets are 1-indexed, got 0")]
pub struct ZeroOffset;

/// A sending account and the nonce it had when the run started.
///
/// The nonce is read from the chain once. Every later nonce is derived from it by
/// counting the account's own transactions, never by asking the chain again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub start_nonce: u64,
}

impl Account {
    pub fn new(address: Address, start_nonce: u64) -> Self {
        Self {
            address,
            start_nonce,
        }
    }

    /// Nonce of the `offset`-th transaction sent from now (1-indexed).
    pub fn nonce_at(&self, offset: u64) -> Result<u64, ZeroOffset> {
        if offset == 0 {
            return Err(ZeroOffset);
        }
        Ok(self.start_nonce + offset - 1)
    }

    /// Address of the contract created by the `offset`-th transaction sent from now.
    pub fn predict(&self, offset: u64) -> Result<Address, ZeroOffset> {
        Ok(predict(self.address, self.nonce_at(offset)?))
    }
}
