//! JSON-RPC chain client.
//!
//! Transactions are sent with `eth_sendTransaction`, so the node must hold the keys of
//! every role account (a dev node such as anvil or a hardhat node does).

use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use super::{ChainClient, Confirmation, PendingTx};
use crate::error::ChainError;

/// Default timeout for a single RPC request.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between two receipt lookups.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Create an HTTP client configured for JSON-RPC requests.
fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Parse a quantity (`0x`-prefixed hex) into a u64.
fn parse_quantity(s: &str) -> Result<u64, ChainError> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| ChainError::transport(format!("invalid quantity {s:?}: {e}")))
}

/// Deserialize an optional u64 from a hex string (with 0x prefix).
fn deserialize_opt_u64_from_hex<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Deserialize::deserialize(deserializer)?;
    s.map(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16))
        .transpose()
        .map_err(serde::de::Error::custom)
}

/// The fields of a transaction receipt the deployment looks at.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Receipt {
    transaction_hash: B256,
    #[serde(default)]
    contract_address: Option<Address>,
    /// Missing on pre-Byzantium receipts, which cannot report a revert.
    #[serde(default, deserialize_with = "deserialize_opt_u64_from_hex")]
    status: Option<u64>,
}

impl From<Receipt> for Confirmation {
    fn from(receipt: Receipt) -> Self {
        Self {
            tx: receipt.transaction_hash,
            contract_address: receipt.contract_address,
            success: receipt.status != Some(0),
        }
    }
}

/// Outcome of a single receipt lookup.
#[derive(Debug)]
enum Poll {
    NotMined,
    Failed(ChainError),
}

/// [`ChainClient`] over Ethereum JSON-RPC.
#[derive(Debug, Clone)]
pub struct RpcChainClient {
    client: reqwest::Client,
    url: Url,
    poll_interval: Duration,
}

impl RpcChainClient {
    pub fn new(url: Url, poll_interval: Duration) -> Result<Self, anyhow::Error> {
        Ok(Self {
            client: create_client()?,
            url,
            poll_interval,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Chain id reported by the endpoint.
    pub async fn chain_id(&self) -> Result<u64, ChainError> {
        let id: String = self.call("eth_chainId", vec![]).await?;
        parse_quantity(&id)
    }

    /// Make a JSON-RPC call and deserialize the result.
    ///
    /// An `error` member in the response is a [`ChainError::Rejected`]. Anything that
    /// prevents reading a response is a [`ChainError::Transport`].
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, ChainError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
                "id": 1
            }))
            .send()
            .await
            .map_err(|e| ChainError::transport(format!("failed to send {method} request: {e}")))?;

        let mut result: Value = response
            .json()
            .await
            .map_err(|e| ChainError::transport(format!("failed to parse {method} response: {e}")))?;

        if let Some(error) = result.get("error") {
            return Err(ChainError::rejected(
                error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown"),
            ));
        }

        let result_value = result
            .get_mut("result")
            .map(Value::take)
            .ok_or_else(|| ChainError::transport(format!("no result in {method} response")))?;

        serde_json::from_value(result_value).map_err(|e| {
            ChainError::transport(format!("failed to deserialize {method} result: {e}"))
        })
    }

    async fn send_transaction(&self, from: Address, tx: Value) -> Result<PendingTx, ChainError> {
        let hash: B256 = self.call("eth_sendTransaction", vec![tx]).await?;
        tracing::debug!(%hash, %from, "Transaction submitted");

        Ok(PendingTx { hash, from })
    }

    async fn poll_receipt(&self, hash: B256) -> Result<Confirmation, Poll> {
        let receipt: Option<Receipt> = self
            .call("eth_getTransactionReceipt", vec![serde_json::json!(hash)])
            .await
            .map_err(Poll::Failed)?;

        receipt.map(Confirmation::from).ok_or(Poll::NotMined)
    }
}

impl ChainClient for RpcChainClient {
    async fn accounts(&self) -> Result<Vec<Address>, ChainError> {
        self.call("eth_accounts", vec![]).await
    }

    async fn nonce(&self, account: Address) -> Result<u64, ChainError> {
        let nonce: String = self
            .call(
                "eth_getTransactionCount",
                vec![serde_json::json!(account), serde_json::json!("pending")],
            )
            .await?;
        parse_quantity(&nonce)
    }

    async fn submit_create(&self, from: Address, init_code: Bytes) -> Result<PendingTx, ChainError> {
        self.send_transaction(from, serde_json::json!({ "from": from, "data": init_code }))
            .await
    }

    async fn submit_call(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<PendingTx, ChainError> {
        self.send_transaction(
            from,
            serde_json::json!({ "from": from, "to": to, "data": data }),
        )
        .await
    }

    async fn await_confirmation(
        &self,
        pending: &PendingTx,
        timeout: Duration,
    ) -> Result<Confirmation, ChainError> {
        let hash = pending.hash;
        let interval = self.poll_interval.max(Duration::from_millis(1));
        let attempts = (timeout.as_millis() / interval.as_millis()).max(1) as usize;

        let backoff = ConstantBuilder::default()
            .with_delay(interval)
            .with_max_times(attempts);

        // Transport hiccups while polling are retried like a missing receipt.
        let polling = (|| self.poll_receipt(hash))
            .retry(backoff)
            .notify(|e: &Poll, _| {
                if let Poll::Failed(e) = e {
                    tracing::trace!(error = %e, %hash, "Receipt lookup failed, retrying...");
                }
            });

        match tokio::time::timeout(timeout, polling).await {
            Ok(Ok(confirmation)) if !confirmation.success => Err(ChainError::rejected(format!(
                "transaction {hash} reverted"
            ))),
            Ok(Ok(confirmation)) => Ok(confirmation),
            Ok(Err(Poll::Failed(e))) => Err(e),
            Ok(Err(Poll::NotMined)) | Err(_) => Err(ChainError::Timeout {
                tx: hash,
                waited: timeout,
            }),
        }
    }
}
