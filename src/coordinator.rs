//! Campaign actions: fund, refund, and withdraw, either locally or
//! composed with a bridge transfer.
//!
//! Each action takes one authoritative campaign projection snapshot,
//! evaluates its preconditions against that snapshot before any
//! transaction is submitted, runs the contract calls (optionally around
//! a [`TransferOrchestrator`] leg), and returns the refreshed
//! projection. Each invocation owns its orchestrator instance
//! exclusively; nothing here is shared between concurrent actions.

use alloy::primitives::{Address, Bytes, TxHash};
use alloy::sol_types::SolCall;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::attestation::AttestationPoller;
use crate::bindings::ICampaignManager;
use crate::bridge::{
    ChainEndpoint, CompletedTransfer, SessionError, TransferOrchestrator, TransferSession,
    TransferStep,
};
use crate::campaign::{Campaign, ProjectionError, RawCampaignBatch, project_all};
use crate::chain::{ChainClient, ChainError};
use crate::usdc::{AmountError, Usdc};

/// Precondition violations, checked against the projection snapshot
/// before any transaction is submitted.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Precondition {
    #[error("campaign has ended ({minutes_remaining} minutes remaining)")]
    CampaignEnded { minutes_remaining: i64 },
    #[error("withdrawal can only happen after the campaign has ended ({minutes_remaining} minutes remaining)")]
    CampaignStillActive { minutes_remaining: i64 },
    #[error("wallet has not contributed any USDC, refund cannot be processed")]
    NoContribution,
    #[error("campaign does not hold any USDC")]
    EmptyCampaign,
    #[error("only the campaign creator {creator} can withdraw funds")]
    NotCreator { creator: Address },
}

/// Errors from one campaign action.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error("precondition violated: {0}")]
    Precondition(#[from] Precondition),
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("bridge transfer failed: {0}")]
    Transfer(#[from] crate::bridge::TransferError),
    #[error("projection error: {0}")]
    Projection(#[from] ProjectionError),
    #[error("failed to decode campaign manager response: {0}")]
    Abi(#[from] alloy::sol_types::Error),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("campaign manager returned no data for campaign {campaign}")]
    CampaignDataMissing { campaign: Address },
}

/// Explicit wallet identity for one coordinator instance.
///
/// Connect/disconnect lifecycle belongs to the wallet collaborator;
/// actions here only need the resolved address.
#[derive(Debug, Clone, Copy)]
pub struct WalletSession {
    pub address: Address,
}

/// Reads all campaigns tracked by a manager contract and projects them.
pub async fn list_campaigns(
    client: &dyn ChainClient,
    campaign_manager: Address,
) -> Result<Vec<Campaign>, ActionError> {
    let calldata = Bytes::from(ICampaignManager::getCampaignsCall {}.abi_encode());
    let raw = client.call(campaign_manager, &calldata).await?;
    let addresses = ICampaignManager::getCampaignsCall::abi_decode_returns(&raw)?;

    if addresses.is_empty() {
        return Ok(Vec::new());
    }

    let batch = fetch_campaign_batch(client, campaign_manager, addresses.clone()).await?;
    Ok(project_all(&batch, &addresses, Utc::now())?)
}

async fn fetch_campaign_batch(
    client: &dyn ChainClient,
    campaign_manager: Address,
    campaigns: Vec<Address>,
) -> Result<RawCampaignBatch, ActionError> {
    let calldata = Bytes::from(ICampaignManager::getCampaignDataCall { campaigns }.abi_encode());
    let raw = client.call(campaign_manager, &calldata).await?;
    let decoded = ICampaignManager::getCampaignDataCall::abi_decode_returns(&raw)?;
    Ok(RawCampaignBatch::from(decoded))
}

/// Drives fund/refund/withdraw for one campaign on behalf of one wallet.
pub struct CampaignActionCoordinator {
    /// Chain hosting the campaign manager.
    app_chain: ChainEndpoint,
    /// Chain USDC is bridged from (fund) or back to (refund/withdraw).
    foreign_chain: ChainEndpoint,
    attestation: AttestationPoller,
    campaign_manager: Address,
    campaign: Address,
    wallet: WalletSession,
    transfer_updates: watch::Sender<Option<TransferSession>>,
}

impl CampaignActionCoordinator {
    pub fn new(
        app_chain: ChainEndpoint,
        foreign_chain: ChainEndpoint,
        attestation: AttestationPoller,
        campaign_manager: Address,
        campaign: Address,
        wallet: WalletSession,
    ) -> Self {
        let (transfer_updates, _) = watch::channel(None);

        Self {
            app_chain,
            foreign_chain,
            attestation,
            campaign_manager,
            campaign,
            wallet,
            transfer_updates,
        }
    }

    /// Latest bridge session snapshot for this coordinator, if a bridge
    /// leg has started.
    pub fn transfer_updates(&self) -> watch::Receiver<Option<TransferSession>> {
        self.transfer_updates.subscribe()
    }

    /// Fetches and projects the current campaign state.
    pub async fn refresh(&self) -> Result<Campaign, ActionError> {
        let addresses = vec![self.campaign];
        let batch = fetch_campaign_batch(
            self.app_chain.client.as_ref(),
            self.campaign_manager,
            addresses.clone(),
        )
        .await?;

        let mut projected = project_all(&batch, &addresses, Utc::now())?;
        projected.pop().ok_or(ActionError::CampaignDataMissing {
            campaign: self.campaign,
        })
    }

    /// Deposits USDC into the campaign from the app-chain wallet.
    pub async fn fund(&self, amount_input: &str) -> Result<Campaign, ActionError> {
        // Input validation happens before any network or contract call.
        let amount = Usdc::parse_user_input(amount_input)?;

        let snapshot = self.refresh().await?;
        Self::check_fund(&snapshot)?;

        let deposit_tx = self.deposit_local(amount).await?;
        info!(%deposit_tx, amount = %amount, campaign = %self.campaign, "Campaign funded");

        self.refresh().await
    }

    /// Bridges USDC from the foreign chain to the wallet on the app
    /// chain, then deposits it into the campaign.
    pub async fn fund_via_bridge(&self, amount_input: &str) -> Result<Campaign, ActionError> {
        let amount = Usdc::parse_user_input(amount_input)?;

        let snapshot = self.refresh().await?;
        Self::check_fund(&snapshot)?;

        let completed = self
            .bridge(
                self.foreign_chain.clone(),
                self.app_chain.clone(),
                amount,
                self.wallet.address,
            )
            .await?;

        let mut session = completed.session;
        session.begin(TransferStep::FinalizeOnDestination)?;
        self.publish_session(&session);

        match self.deposit_local(amount).await {
            Ok(deposit_tx) => {
                session.succeed(
                    TransferStep::FinalizeOnDestination,
                    format!("USDC deposited to campaign. Confirmed at {deposit_tx}"),
                    Some(deposit_tx.to_string()),
                )?;
                self.publish_session(&session);
                info!(%deposit_tx, amount = %amount, "Bridged funds deposited to campaign");
            }
            Err(err) => {
                warn!(error = %err, "Campaign deposit after bridge failed");
                let _ = session.fail(TransferStep::FinalizeOnDestination, err.to_string());
                self.publish_session(&session);
                return Err(err);
            }
        }

        self.refresh().await
    }

    /// Refunds this wallet's contribution on the app chain.
    pub async fn refund(&self) -> Result<Campaign, ActionError> {
        let snapshot = self.refresh().await?;
        Self::check_refund(&snapshot)?;

        let refund_tx = self.refund_local().await?;
        info!(%refund_tx, campaign = %self.campaign, "Contribution refunded");

        self.refresh().await
    }

    /// Refunds locally, then bridges the refunded contribution back to
    /// the wallet on the foreign chain.
    ///
    /// The bridged amount is the contribution recorded in the snapshot
    /// taken before the refund; the post-refund projection reads zero.
    pub async fn refund_via_bridge(&self) -> Result<Campaign, ActionError> {
        let snapshot = self.refresh().await?;
        Self::check_refund(&snapshot)?;

        let refund_tx = self.refund_local().await?;
        info!(%refund_tx, campaign = %self.campaign, "Contribution refunded, bridging back");

        self.bridge(
            self.app_chain.clone(),
            self.foreign_chain.clone(),
            snapshot.user_contribution,
            self.wallet.address,
        )
        .await?;

        self.refresh().await
    }

    /// Withdraws the raised funds to the creator wallet on the app
    /// chain. Creator-only, and only after the deadline has passed.
    pub async fn withdraw(&self) -> Result<Campaign, ActionError> {
        let snapshot = self.refresh().await?;
        self.check_withdraw(&snapshot)?;

        let withdraw_tx = self.withdraw_local().await?;
        info!(%withdraw_tx, campaign = %self.campaign, "Campaign funds withdrawn");

        self.refresh().await
    }

    /// Withdraws locally, then bridges the raised amount back to the
    /// wallet on the foreign chain.
    pub async fn withdraw_via_bridge(&self) -> Result<Campaign, ActionError> {
        let snapshot = self.refresh().await?;
        self.check_withdraw(&snapshot)?;

        let withdraw_tx = self.withdraw_local().await?;
        info!(%withdraw_tx, campaign = %self.campaign, "Funds withdrawn, bridging back");

        self.bridge(
            self.app_chain.clone(),
            self.foreign_chain.clone(),
            snapshot.current_amount,
            self.wallet.address,
        )
        .await?;

        self.refresh().await
    }

    fn check_fund(snapshot: &Campaign) -> Result<(), Precondition> {
        if snapshot.deadline_minutes_remaining < 1 {
            return Err(Precondition::CampaignEnded {
                minutes_remaining: snapshot.deadline_minutes_remaining,
            });
        }
        Ok(())
    }

    fn check_refund(snapshot: &Campaign) -> Result<(), Precondition> {
        if snapshot.user_contribution <= Usdc::ZERO {
            return Err(Precondition::NoContribution);
        }
        if snapshot.current_amount <= Usdc::ZERO {
            return Err(Precondition::EmptyCampaign);
        }
        Ok(())
    }

    fn check_withdraw(&self, snapshot: &Campaign) -> Result<(), Precondition> {
        if snapshot.current_amount <= Usdc::ZERO {
            return Err(Precondition::EmptyCampaign);
        }
        if snapshot.deadline_minutes_remaining >= 0 {
            return Err(Precondition::CampaignStillActive {
                minutes_remaining: snapshot.deadline_minutes_remaining,
            });
        }
        if snapshot.creator != self.wallet.address {
            return Err(Precondition::NotCreator {
                creator: snapshot.creator,
            });
        }
        Ok(())
    }

    /// Approves the campaign contract for the deposit amount, then
    /// deposits through the manager. Both transactions are awaited.
    async fn deposit_local(&self, amount: Usdc) -> Result<TxHash, ActionError> {
        let units = amount.to_base_units()?;

        self.app_chain
            .approve_usdc(self.campaign, units, "USDC approval for campaign deposit")
            .await?;

        let calldata = Bytes::from(
            ICampaignManager::depositCall {
                amount: units,
                campaign: self.campaign,
            }
            .abi_encode(),
        );
        self.submit_manager_call(calldata, "campaign deposit").await
    }

    async fn refund_local(&self) -> Result<TxHash, ActionError> {
        let calldata = Bytes::from(
            ICampaignManager::refundCall {
                campaign: self.campaign,
            }
            .abi_encode(),
        );
        self.submit_manager_call(calldata, "campaign refund").await
    }

    async fn withdraw_local(&self) -> Result<TxHash, ActionError> {
        let calldata = Bytes::from(
            ICampaignManager::withdrawCall {
                campaign: self.campaign,
            }
            .abi_encode(),
        );
        self.submit_manager_call(calldata, "campaign withdraw").await
    }

    async fn submit_manager_call(
        &self,
        calldata: Bytes,
        note: &str,
    ) -> Result<TxHash, ActionError> {
        let tx_hash = self
            .app_chain
            .client
            .estimate_and_send(self.campaign_manager, &calldata, note)
            .await?;
        self.app_chain.client.wait_for_receipt(tx_hash).await?;
        Ok(tx_hash)
    }

    async fn bridge(
        &self,
        source: ChainEndpoint,
        destination: ChainEndpoint,
        amount: Usdc,
        recipient: Address,
    ) -> Result<CompletedTransfer, ActionError> {
        let orchestrator = TransferOrchestrator::new(
            source,
            destination,
            self.attestation.clone(),
            amount,
            recipient,
        );

        let forwarder = self.forward_updates(orchestrator.subscribe());
        let result = orchestrator.run().await;

        // The orchestrator (and its watch sender) is gone now, so the
        // forwarder drains and exits; wait for it before publishing the
        // terminal snapshot.
        let _ = forwarder.await;

        let completed = result?;
        self.publish_session(&completed.session);
        Ok(completed)
    }

    fn forward_updates(
        &self,
        mut updates: watch::Receiver<TransferSession>,
    ) -> tokio::task::JoinHandle<()> {
        let sink = self.transfer_updates.clone();
        tokio::spawn(async move {
            sink.send_replace(Some(updates.borrow_and_update().clone()));
            while updates.changed().await.is_ok() {
                let snapshot = updates.borrow_and_update().clone();
                sink.send_replace(Some(snapshot));
            }
        })
    }

    fn publish_session(&self, session: &TransferSession) {
        self.transfer_updates.send_replace(Some(session.clone()));
    }
}
