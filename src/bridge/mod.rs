//! Cross-chain transfer orchestration.
//!
//! One [`TransferOrchestrator`] drives a single directional transfer
//! through five ordered steps: approve the token messenger, burn on the
//! source chain, retrieve the emitted message bytes from the burn
//! receipt, fetch the attestation signature, and submit both to the
//! destination chain's message transmitter. Step transitions are the
//! only externally visible state changes and are published on a watch
//! channel as [`TransferSession`] snapshots.
//!
//! A failed step halts the session. Prior on-chain effects are not
//! rolled back: a burn without a mint leaves the session holding the
//! message bytes, hash and (possibly) attestation for diagnosis.

mod endpoint;

pub use endpoint::ChainEndpoint;

use alloy::primitives::{Address, B256, Bytes, TxHash, keccak256};
use alloy::sol_types::SolEvent;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::attestation::{AttestationError, AttestationPoller};
use crate::bindings::IMessageTransmitter;
use crate::chain::{ChainError, find_log};
use crate::usdc::{AmountError, Usdc};

/// The ordered steps of one transfer session.
///
/// The orchestrator drives the first five. `FinalizeOnDestination` is
/// the follow-on campaign-contract call recorded on the same session by
/// the coordinator when a bridge feeds a deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStep {
    ApproveTokens,
    BurnTokens,
    RetrieveMessage,
    FetchSignature,
    TransferFunds,
    FinalizeOnDestination,
}

impl TransferStep {
    pub const ORDERED: [Self; 6] = [
        Self::ApproveTokens,
        Self::BurnTokens,
        Self::RetrieveMessage,
        Self::FetchSignature,
        Self::TransferFunds,
        Self::FinalizeOnDestination,
    ];

    fn index(self) -> usize {
        match self {
            Self::ApproveTokens => 0,
            Self::BurnTokens => 1,
            Self::RetrieveMessage => 2,
            Self::FetchSignature => 3,
            Self::TransferFunds => 4,
            Self::FinalizeOnDestination => 5,
        }
    }

    fn initial_description(self) -> &'static str {
        match self {
            Self::ApproveTokens => "Approving messenger contract to withdraw",
            Self::BurnTokens => "Depositing tokens for burn",
            Self::RetrieveMessage => "Retrieving message bytes from logs",
            Self::FetchSignature => "Fetching attestation signature",
            Self::TransferFunds => "Transferring the funds to the destination chain",
            Self::FinalizeOnDestination => "Submitting the campaign contract call",
        }
    }
}

impl std::fmt::Display for TransferStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ApproveTokens => "approve tokens",
            Self::BurnTokens => "burn tokens",
            Self::RetrieveMessage => "retrieve message",
            Self::FetchSignature => "fetch signature",
            Self::TransferFunds => "transfer funds",
            Self::FinalizeOnDestination => "finalize on destination",
        };
        f.write_str(name)
    }
}

/// Observable state of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

/// State, human description, and (on success) correlating transaction
/// or message hash for one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepStatus {
    pub state: StepState,
    pub description: String,
    pub reference: Option<String>,
}

impl StepStatus {
    fn pending(step: TransferStep) -> Self {
        Self {
            state: StepState::Pending,
            description: step.initial_description().to_owned(),
            reference: None,
        }
    }
}

/// Invalid step transitions. Step ordering is strict: a step may only
/// start once every earlier step has succeeded, and a failed step
/// freezes the session.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("step '{step}' cannot start before '{predecessor}' has succeeded")]
    PredecessorNotSucceeded {
        step: TransferStep,
        predecessor: TransferStep,
    },
    #[error("step '{step}' has already started")]
    AlreadyStarted { step: TransferStep },
    #[error("step '{step}' is not in progress")]
    NotInProgress { step: TransferStep },
    #[error("session already failed at step '{step}'")]
    Halted { step: TransferStep },
}

/// One run of the orchestrator for one direction.
///
/// Created when a bridge action is invoked, mutated strictly in step
/// order, and discarded once terminal. Sessions are in-memory only;
/// there is no resume across process restarts.
#[derive(Debug, Clone)]
pub struct TransferSession {
    pub source: String,
    pub destination: String,
    pub amount: Usdc,
    pub recipient: Address,
    steps: [StepStatus; 6],
    pub message_bytes: Option<Bytes>,
    pub message_hash: Option<B256>,
    pub attestation: Option<Bytes>,
}

impl TransferSession {
    pub fn new(source: String, destination: String, amount: Usdc, recipient: Address) -> Self {
        Self {
            source,
            destination,
            amount,
            recipient,
            steps: TransferStep::ORDERED.map(StepStatus::pending),
            message_bytes: None,
            message_hash: None,
            attestation: None,
        }
    }

    pub fn step(&self, step: TransferStep) -> &StepStatus {
        &self.steps[step.index()]
    }

    pub fn steps(&self) -> impl Iterator<Item = (TransferStep, &StepStatus)> {
        TransferStep::ORDERED.iter().map(|step| (*step, self.step(*step)))
    }

    fn failed_step(&self) -> Option<TransferStep> {
        TransferStep::ORDERED
            .into_iter()
            .find(|step| self.step(*step).state == StepState::Failed)
    }

    pub(crate) fn begin(&mut self, step: TransferStep) -> Result<(), SessionError> {
        if let Some(failed) = self.failed_step() {
            return Err(SessionError::Halted { step: failed });
        }

        if self.step(step).state != StepState::Pending {
            return Err(SessionError::AlreadyStarted { step });
        }

        for predecessor in &TransferStep::ORDERED[..step.index()] {
            if self.step(*predecessor).state != StepState::Succeeded {
                return Err(SessionError::PredecessorNotSucceeded {
                    step,
                    predecessor: *predecessor,
                });
            }
        }

        self.steps[step.index()].state = StepState::InProgress;
        Ok(())
    }

    pub(crate) fn succeed(
        &mut self,
        step: TransferStep,
        description: String,
        reference: Option<String>,
    ) -> Result<(), SessionError> {
        let status = &mut self.steps[step.index()];
        if status.state != StepState::InProgress {
            return Err(SessionError::NotInProgress { step });
        }

        status.state = StepState::Succeeded;
        status.description = description;
        status.reference = reference;
        Ok(())
    }

    pub(crate) fn fail(&mut self, step: TransferStep, reason: String) -> Result<(), SessionError> {
        let status = &mut self.steps[step.index()];
        if status.state != StepState::InProgress {
            return Err(SessionError::NotInProgress { step });
        }

        status.state = StepState::Failed;
        status.description = reason;
        Ok(())
    }
}

/// Errors from one transfer session.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("bridge amount must be positive, got {0}")]
    NonPositiveAmount(Usdc),
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("MessageSent event not found in burn transaction {tx_hash}")]
    MessageNotFound { tx_hash: TxHash },
    #[error("failed to decode MessageSent event: {0}")]
    EventDecode(#[from] alloy::sol_types::Error),
    #[error("attestation error: {0}")]
    Attestation(#[from] AttestationError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Outcome of a completed transfer, including the final session for the
/// caller to extend or render.
#[derive(Debug)]
pub struct CompletedTransfer {
    pub burn_tx: TxHash,
    pub receive_tx: TxHash,
    pub message_hash: B256,
    pub session: TransferSession,
}

/// Drives one directional transfer end to end.
///
/// Owns one endpoint per chain and the attestation poller; each
/// coordinator action constructs its own orchestrator, so no locking is
/// needed around the session.
pub struct TransferOrchestrator {
    source: ChainEndpoint,
    destination: ChainEndpoint,
    attestation: AttestationPoller,
    session: TransferSession,
    updates: watch::Sender<TransferSession>,
}

impl TransferOrchestrator {
    pub fn new(
        source: ChainEndpoint,
        destination: ChainEndpoint,
        attestation: AttestationPoller,
        amount: Usdc,
        recipient: Address,
    ) -> Self {
        let session = TransferSession::new(
            source.name.clone(),
            destination.name.clone(),
            amount,
            recipient,
        );
        let (updates, _) = watch::channel(session.clone());

        Self {
            source,
            destination,
            attestation,
            session,
            updates,
        }
    }

    /// Subscribes to session snapshots; one is published per step
    /// transition.
    pub fn subscribe(&self) -> watch::Receiver<TransferSession> {
        self.updates.subscribe()
    }

    pub fn session(&self) -> &TransferSession {
        &self.session
    }

    fn publish(&self) {
        self.updates.send_replace(self.session.clone());
    }

    fn begin(&mut self, step: TransferStep) -> Result<(), TransferError> {
        self.session.begin(step)?;
        info!(%step, source = %self.source.name, destination = %self.destination.name, "Step started");
        self.publish();
        Ok(())
    }

    fn succeed(
        &mut self,
        step: TransferStep,
        description: String,
        reference: Option<String>,
    ) -> Result<(), TransferError> {
        self.session.succeed(step, description, reference)?;
        info!(%step, "Step succeeded");
        self.publish();
        Ok(())
    }

    fn halt(&mut self, step: TransferStep, err: TransferError) -> TransferError {
        warn!(%step, error = %err, "Step failed, halting session");
        let _ = self.session.fail(step, err.to_string());
        self.publish();
        err
    }

    /// Executes the five bridge steps in order.
    ///
    /// The first failure freezes the session and is returned to the
    /// caller; nothing is compensated.
    pub async fn run(mut self) -> Result<CompletedTransfer, TransferError> {
        let amount = self.session.amount.to_base_units()?;
        if amount.is_zero() {
            return Err(TransferError::NonPositiveAmount(self.session.amount));
        }
        let recipient = self.session.recipient;

        info!(
            amount = %self.session.amount,
            source = %self.source.name,
            destination = %self.destination.name,
            %recipient,
            "Starting bridge transfer"
        );

        // Step 1: approve the token messenger to pull the burn amount.
        self.begin(TransferStep::ApproveTokens)?;
        let approve_tx = match self
            .source
            .approve_usdc(self.source.token_messenger, amount, "USDC approval for bridge")
            .await
        {
            Ok(tx_hash) => tx_hash,
            Err(err) => return Err(self.halt(TransferStep::ApproveTokens, err.into())),
        };
        self.succeed(
            TransferStep::ApproveTokens,
            format!("Approval has been confirmed: {approve_tx}"),
            Some(approve_tx.to_string()),
        )?;

        // Step 2: burn on the source chain. Irreversible once mined.
        self.begin(TransferStep::BurnTokens)?;
        let (burn_tx, burn_receipt) = match self
            .source
            .deposit_for_burn(amount, self.destination.domain, recipient)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.halt(TransferStep::BurnTokens, err.into())),
        };
        self.succeed(
            TransferStep::BurnTokens,
            format!("Burn has been confirmed: {burn_tx}"),
            Some(burn_tx.to_string()),
        )?;

        // Step 3: pull the message bytes out of the burn receipt.
        self.begin(TransferStep::RetrieveMessage)?;
        let Some(log) = find_log(&burn_receipt, IMessageTransmitter::MessageSent::SIGNATURE_HASH)
        else {
            return Err(self.halt(
                TransferStep::RetrieveMessage,
                TransferError::MessageNotFound { tx_hash: burn_tx },
            ));
        };
        let event = match IMessageTransmitter::MessageSent::decode_log(log.as_ref()) {
            Ok(event) => event,
            Err(err) => {
                return Err(self.halt(TransferStep::RetrieveMessage, TransferError::EventDecode(err)));
            }
        };
        let message = event.message.clone();
        let message_hash = keccak256(&message);
        self.session.message_bytes = Some(message.clone());
        self.session.message_hash = Some(message_hash);
        self.succeed(
            TransferStep::RetrieveMessage,
            "Message has been retrieved".to_owned(),
            Some(message_hash.to_string()),
        )?;

        // Step 4: wait out the attestation service.
        self.begin(TransferStep::FetchSignature)?;
        let attestation = match self.attestation.await_attestation(message_hash).await {
            Ok(signature) => signature,
            Err(err) => return Err(self.halt(TransferStep::FetchSignature, err.into())),
        };
        self.session.attestation = Some(attestation.clone());
        self.succeed(
            TransferStep::FetchSignature,
            "Attestation signature retrieved".to_owned(),
            None,
        )?;

        // Step 5: mint on the destination chain.
        self.begin(TransferStep::TransferFunds)?;
        let receive_tx = match self
            .destination
            .receive_message(message, attestation)
            .await
        {
            Ok(tx_hash) => tx_hash,
            Err(err) => return Err(self.halt(TransferStep::TransferFunds, err.into())),
        };
        self.succeed(
            TransferStep::TransferFunds,
            format!("USDC transferred to destination chain: {receive_tx}"),
            Some(receive_tx.to_string()),
        )?;

        info!(%burn_tx, %receive_tx, %message_hash, "Bridge transfer complete");

        Ok(CompletedTransfer {
            burn_tx,
            receive_tx,
            message_hash,
            session: self.session,
        })
    }
}
