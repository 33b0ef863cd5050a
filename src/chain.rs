//! Single-chain transaction plumbing.
//!
//! [`ChainClient`] is the seam between the orchestration layers and an
//! EVM node: submit a contract call with an up-front gas estimate, poll
//! for its receipt, and run read-only calls. Receipt polling is
//! three-valued (not mined yet / mined successfully / mined but
//! reverted), bounded by a deadline, and checks a cancellation token at
//! every suspension point.

use std::time::Duration;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, B256, Bytes, TxHash};
use alloy::providers::Provider;
use alloy::rpc::types::{Log, TransactionReceipt, TransactionRequest};
use alloy::transports::{RpcError, TransportErrorKind};
use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Interval between receipt polls.
pub const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(4);

/// How long to keep polling for a receipt before giving up.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(600);

/// Errors from submitting or confirming a transaction on one chain.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("gas estimation failed: {0}")]
    Estimation(#[source] RpcError<TransportErrorKind>),
    #[error("transaction submission failed: {0}")]
    Submission(#[source] RpcError<TransportErrorKind>),
    #[error("read call failed: {0}")]
    Call(#[source] RpcError<TransportErrorKind>),
    #[error("receipt lookup failed: {0}")]
    ReceiptLookup(#[source] RpcError<TransportErrorKind>),
    #[error("transaction {tx_hash} was mined but reverted")]
    TransactionFailed { tx_hash: TxHash },
    #[error("transaction {tx_hash} not mined within {waited:?}")]
    ReceiptTimeout { tx_hash: TxHash, waited: Duration },
    #[error("chain operation cancelled")]
    Cancelled,
}

/// Submits and confirms contract calls on one chain.
///
/// One implementation per chain connection; orchestration code holds it
/// behind `Arc<dyn ChainClient>` so tests can substitute scripted
/// chains.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Estimates gas for the call, then submits it with that estimate.
    ///
    /// Estimation and submission failures surface unmodified; there is
    /// no retry at this layer. `note` is a human-readable label carried
    /// into logs.
    async fn estimate_and_send(
        &self,
        contract: Address,
        calldata: &Bytes,
        note: &str,
    ) -> Result<TxHash, ChainError>;

    /// Polls the node until the transaction is mined.
    ///
    /// An absent receipt keeps polling; a receipt with a failure status
    /// is [`ChainError::TransactionFailed`], distinct from not-yet-mined.
    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TransactionReceipt, ChainError>;

    /// Read-only `eth_call` against the given contract.
    async fn call(&self, contract: Address, calldata: &Bytes) -> Result<Bytes, ChainError>;
}

/// Returns the first receipt log whose topic-0 matches `topic0`.
///
/// `None` means the event is absent from a receipt that does exist;
/// callers must treat that differently from a missing receipt.
pub fn find_log(receipt: &TransactionReceipt, topic0: B256) -> Option<&Log> {
    receipt
        .inner
        .logs()
        .iter()
        .find(|log| log.inner.data.topics().first() == Some(&topic0))
}

/// [`ChainClient`] backed by an alloy provider.
#[derive(Clone)]
pub struct RpcChainClient<P>
where
    P: Provider + Clone,
{
    provider: P,
    /// Account that owns tokens and signs transactions.
    owner: Address,
    poll_interval: Duration,
    receipt_timeout: Duration,
    cancel: CancellationToken,
}

impl<P> RpcChainClient<P>
where
    P: Provider + Clone,
{
    pub fn new(provider: P, owner: Address, cancel: CancellationToken) -> Self {
        Self {
            provider,
            owner,
            poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
            cancel,
        }
    }

    pub fn with_receipt_polling(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.receipt_timeout = timeout;
        self
    }
}

#[async_trait]
impl<P> ChainClient for RpcChainClient<P>
where
    P: Provider + Clone,
{
    async fn estimate_and_send(
        &self,
        contract: Address,
        calldata: &Bytes,
        note: &str,
    ) -> Result<TxHash, ChainError> {
        let tx = TransactionRequest::default()
            .with_from(self.owner)
            .with_to(contract)
            .with_input(calldata.clone());

        let gas = self
            .provider
            .estimate_gas(tx.clone())
            .await
            .map_err(ChainError::Estimation)?;

        trace!(%contract, gas, note, "Estimated gas for contract call");

        let pending = self
            .provider
            .send_transaction(tx.with_gas_limit(gas))
            .await
            .map_err(ChainError::Submission)?;

        let tx_hash = *pending.tx_hash();
        info!(%tx_hash, %contract, note, "Submitted contract call");

        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TransactionReceipt, ChainError> {
        let started = Instant::now();

        loop {
            if self.cancel.is_cancelled() {
                return Err(ChainError::Cancelled);
            }

            let receipt = self
                .provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(ChainError::ReceiptLookup)?;

            match receipt {
                Some(receipt) if receipt.status() => {
                    debug!(%tx_hash, block = ?receipt.block_number, "Transaction mined");
                    return Ok(receipt);
                }
                Some(_) => return Err(ChainError::TransactionFailed { tx_hash }),
                None => {}
            }

            let waited = started.elapsed();
            if waited >= self.receipt_timeout {
                return Err(ChainError::ReceiptTimeout { tx_hash, waited });
            }

            tokio::select! {
                () = self.cancel.cancelled() => return Err(ChainError::Cancelled),
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn call(&self, contract: Address, calldata: &Bytes) -> Result<Bytes, ChainError> {
        let tx = TransactionRequest::default()
            .with_from(self.owner)
            .with_to(contract)
            .with_input(calldata.clone());

        self.provider.call(tx).await.map_err(ChainError::Call)
    }
}
