//! Shared test fixtures: scripted chain clients, receipt/log builders,
//! and campaign data encoders.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use alloy::consensus::{Eip658Value, Receipt, ReceiptEnvelope, ReceiptWithBloom};
use alloy::primitives::{Address, Bytes, TxHash, U256, address, keccak256};
use alloy::rpc::types::{Log, TransactionReceipt};
use alloy::sol_types::{SolEvent, SolValue};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::bindings::IMessageTransmitter;
use crate::chain::{ChainClient, ChainError};
use crate::usdc::Usdc;

/// Builds a mined receipt carrying the given logs.
pub(crate) fn receipt_with_logs(
    tx_hash: TxHash,
    success: bool,
    logs: Vec<Log>,
) -> TransactionReceipt {
    let receipt = Receipt {
        status: Eip658Value::Eip658(success),
        cumulative_gas_used: 0,
        logs,
    };

    TransactionReceipt {
        inner: ReceiptEnvelope::Legacy(ReceiptWithBloom {
            receipt,
            logs_bloom: Default::default(),
        }),
        transaction_hash: tx_hash,
        transaction_index: Some(0),
        block_hash: None,
        block_number: Some(1),
        gas_used: 0,
        effective_gas_price: 0,
        blob_gas_used: None,
        blob_gas_price: None,
        from: Address::ZERO,
        to: None,
        contract_address: None,
    }
}

/// Builds a `MessageSent(bytes)` log carrying `message`.
pub(crate) fn message_sent_log(message: &Bytes) -> Log {
    let event = IMessageTransmitter::MessageSent {
        message: message.clone(),
    };

    Log {
        inner: alloy::primitives::Log {
            address: Address::ZERO,
            data: event.encode_log_data(),
        },
        block_hash: None,
        block_number: None,
        block_timestamp: None,
        transaction_hash: None,
        transaction_index: None,
        log_index: None,
        removed: false,
    }
}

/// One recorded `estimate_and_send` invocation.
#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub(crate) contract: Address,
    pub(crate) calldata: Bytes,
    #[allow(dead_code)]
    pub(crate) note: String,
}

/// Raw campaign fields for scripting `getCampaignData` responses.
#[derive(Debug, Clone)]
pub(crate) struct TestCampaign {
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) target: Decimal,
    pub(crate) current: Decimal,
    pub(crate) deadline_minutes: i64,
    pub(crate) contribution: Decimal,
    pub(crate) status: String,
    pub(crate) proposer: Address,
}

impl TestCampaign {
    pub(crate) fn new() -> Self {
        Self {
            title: "Community well".to_owned(),
            description: "Clean water for the village".to_owned(),
            target: dec!(1000),
            current: dec!(400),
            deadline_minutes: 30,
            contribution: dec!(25),
            status: "Active".to_owned(),
            proposer: address!("0x00000000000000000000000000000000000000AA"),
        }
    }

    pub(crate) fn with_target(mut self, target: Decimal) -> Self {
        self.target = target;
        self
    }

    pub(crate) fn with_current(mut self, current: Decimal) -> Self {
        self.current = current;
        self
    }

    pub(crate) fn with_contribution(mut self, contribution: Decimal) -> Self {
        self.contribution = contribution;
        self
    }

    pub(crate) fn with_deadline_minutes(mut self, deadline_minutes: i64) -> Self {
        self.deadline_minutes = deadline_minutes;
        self
    }

    pub(crate) fn with_proposer(mut self, proposer: Address) -> Self {
        self.proposer = proposer;
        self
    }
}

fn to_base_units(value: Decimal) -> U256 {
    Usdc::from(value).to_base_units().unwrap()
}

/// ABI-encodes a `getCampaignData` return for the given records.
///
/// Deadlines are offset half a minute past the requested whole-minute
/// mark so the later floor division still lands on the requested value.
pub(crate) fn encode_campaign_batch(records: &[TestCampaign]) -> Bytes {
    let now = Utc::now().timestamp();

    let titles: Vec<String> = records.iter().map(|r| r.title.clone()).collect();
    let descriptions: Vec<String> = records.iter().map(|r| r.description.clone()).collect();
    let targets: Vec<U256> = records.iter().map(|r| to_base_units(r.target)).collect();
    let currents: Vec<U256> = records.iter().map(|r| to_base_units(r.current)).collect();
    let deadlines: Vec<U256> = records
        .iter()
        .map(|r| U256::from((now + r.deadline_minutes * 60 + 30).unsigned_abs()))
        .collect();
    let contributions: Vec<U256> = records
        .iter()
        .map(|r| to_base_units(r.contribution))
        .collect();
    let statuses: Vec<String> = records.iter().map(|r| r.status.clone()).collect();
    let proposers: Vec<Address> = records.iter().map(|r| r.proposer).collect();

    Bytes::from(
        (
            titles,
            descriptions,
            targets,
            currents,
            deadlines,
            contributions,
            statuses,
            proposers,
        )
            .abi_encode_params(),
    )
}

/// Scripted [`ChainClient`]: records submissions, mints deterministic
/// transaction hashes, serves queued view-call responses, and attaches a
/// configurable `MessageSent` log to every receipt.
pub(crate) struct MockChainClient {
    submissions: Mutex<Vec<RecordedCall>>,
    submission_notes: Mutex<HashMap<TxHash, String>>,
    view_responses: Mutex<VecDeque<Bytes>>,
    view_calls: AtomicUsize,
    message_sent_payload: Option<Bytes>,
    reverting_note: Option<&'static str>,
    next_tx: AtomicU64,
}

impl MockChainClient {
    pub(crate) fn new() -> Self {
        Self {
            submissions: Mutex::new(Vec::new()),
            submission_notes: Mutex::new(HashMap::new()),
            view_responses: Mutex::new(VecDeque::new()),
            view_calls: AtomicUsize::new(0),
            message_sent_payload: None,
            reverting_note: None,
            next_tx: AtomicU64::new(1),
        }
    }

    /// Attaches a `MessageSent(bytes)` log with this payload to every
    /// receipt this chain returns.
    pub(crate) fn with_message_sent_log(mut self, message: &Bytes) -> Self {
        self.message_sent_payload = Some(message.clone());
        self
    }

    /// Makes the submission with this note revert when its receipt is
    /// awaited.
    pub(crate) fn with_reverting_note(mut self, note: &'static str) -> Self {
        self.reverting_note = Some(note);
        self
    }

    /// Queues a `getCampaignData` response for one campaign.
    pub(crate) fn with_campaign_response(self, campaign: &TestCampaign) -> Self {
        self.with_campaign_batch_response(std::slice::from_ref(campaign))
    }

    /// Queues a `getCampaignData` response for several campaigns.
    pub(crate) fn with_campaign_batch_response(self, campaigns: &[TestCampaign]) -> Self {
        self.view_responses
            .lock()
            .unwrap()
            .push_back(encode_campaign_batch(campaigns));
        self
    }

    /// Queues a `getCampaigns` response.
    pub(crate) fn with_campaign_list_response(self, addresses: &[Address]) -> Self {
        self.view_responses
            .lock()
            .unwrap()
            .push_back(Bytes::from(addresses.to_vec().abi_encode()));
        self
    }

    pub(crate) fn submissions(&self) -> Vec<RecordedCall> {
        self.submissions.lock().unwrap().clone()
    }

    pub(crate) fn view_call_count(&self) -> usize {
        self.view_calls.load(Ordering::SeqCst)
    }

    fn receipt_logs(&self) -> Vec<Log> {
        self.message_sent_payload
            .as_ref()
            .map(|payload| vec![message_sent_log(payload)])
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn estimate_and_send(
        &self,
        contract: Address,
        calldata: &Bytes,
        note: &str,
    ) -> Result<TxHash, ChainError> {
        self.submissions.lock().unwrap().push(RecordedCall {
            contract,
            calldata: calldata.clone(),
            note: note.to_owned(),
        });

        let nonce = self.next_tx.fetch_add(1, Ordering::SeqCst);
        let tx_hash = TxHash::from(keccak256(nonce.to_be_bytes()));
        self.submission_notes
            .lock()
            .unwrap()
            .insert(tx_hash, note.to_owned());

        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TransactionReceipt, ChainError> {
        let note = self.submission_notes.lock().unwrap().get(&tx_hash).cloned();

        if let (Some(reverting), Some(note)) = (self.reverting_note, note) {
            if note == reverting {
                return Err(ChainError::TransactionFailed { tx_hash });
            }
        }

        Ok(receipt_with_logs(tx_hash, true, self.receipt_logs()))
    }

    async fn call(&self, _contract: Address, _calldata: &Bytes) -> Result<Bytes, ChainError> {
        self.view_calls.fetch_add(1, Ordering::SeqCst);
        let response = self.view_responses.lock().unwrap().pop_front();
        Ok(response.expect("unexpected view call: no scripted response left"))
    }
}
