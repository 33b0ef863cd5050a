//! Command-line interface: campaign listing and the fund / refund /
//! withdraw actions, locally or via the bridge.

use std::sync::Arc;

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::providers::ProviderBuilder;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::attestation::AttestationPoller;
use crate::bridge::{ChainEndpoint, StepState, TransferSession};
use crate::campaign::Campaign;
use crate::chain::RpcChainClient;
use crate::config::{ChainCtx, Ctx, Env};
use crate::coordinator::{CampaignActionCoordinator, WalletSession, list_campaigns};

#[derive(Debug, Parser)]
#[command(name = "crowdfund-bridge")]
#[command(about = "Fund, refund, and withdraw USDC crowdfunding campaigns across chains")]
#[command(version)]
pub struct Cli {
    #[clap(flatten)]
    pub env: Env,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List all campaigns tracked by the campaign manager
    Campaigns,
    /// Show one campaign projection
    Show {
        #[arg(long)]
        campaign: Address,
    },
    /// Deposit USDC into a campaign
    Fund {
        #[arg(long)]
        campaign: Address,
        /// USDC amount, e.g. "100" or "12.50"
        #[arg(long)]
        amount: String,
        /// Bridge the amount in from the foreign chain first
        #[arg(long)]
        via_bridge: bool,
    },
    /// Refund this wallet's contribution
    Refund {
        #[arg(long)]
        campaign: Address,
        /// Bridge the refunded amount back to the foreign chain
        #[arg(long)]
        via_bridge: bool,
    },
    /// Withdraw the raised funds (creator only, after the deadline)
    Withdraw {
        #[arg(long)]
        campaign: Address,
        /// Bridge the withdrawn amount back to the foreign chain
        #[arg(long)]
        via_bridge: bool,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let ctx = Ctx::load_files(&cli.env.config, &cli.env.secrets)?;
    crate::config::setup_tracing(&ctx.log_level);
    run_command(ctx, cli.command).await
}

async fn connect_endpoint(
    chain: &ChainCtx,
    wallet: &EthereumWallet,
    owner: Address,
    ctx: &Ctx,
    cancel: CancellationToken,
) -> anyhow::Result<ChainEndpoint> {
    let provider = ProviderBuilder::new()
        .wallet(wallet.clone())
        .connect(chain.rpc_url.as_str())
        .await?;

    let client = RpcChainClient::new(provider, owner, cancel)
        .with_receipt_polling(ctx.receipt_poll_interval, ctx.receipt_timeout);

    Ok(ChainEndpoint {
        name: chain.name.clone(),
        usdc: chain.usdc,
        token_messenger: chain.token_messenger,
        message_transmitter: chain.message_transmitter,
        domain: chain.domain,
        client: Arc::new(client),
    })
}

pub async fn run_command(ctx: Ctx, command: Commands) -> anyhow::Result<()> {
    let signer = ctx.signer()?;
    let owner = signer.address();
    let wallet = EthereumWallet::from(signer);
    let cancel = CancellationToken::new();

    let app_chain = connect_endpoint(&ctx.app_chain, &wallet, owner, &ctx, cancel.clone()).await?;

    if let Commands::Campaigns = command {
        let campaigns = list_campaigns(app_chain.client.as_ref(), ctx.campaign_manager).await?;
        if campaigns.is_empty() {
            println!("No campaigns found.");
        }
        for campaign in campaigns {
            println!("{}", render_campaign(&campaign));
        }
        return Ok(());
    }

    let foreign_chain =
        connect_endpoint(&ctx.foreign_chain, &wallet, owner, &ctx, cancel.clone()).await?;
    let attestation = AttestationPoller::new(ctx.attestation_api_base.clone(), cancel.clone())?
        .with_polling(ctx.attestation_poll_interval, ctx.attestation_max_attempts);

    let campaign_address = match &command {
        Commands::Show { campaign }
        | Commands::Fund { campaign, .. }
        | Commands::Refund { campaign, .. }
        | Commands::Withdraw { campaign, .. } => *campaign,
        Commands::Campaigns => unreachable!("handled above"),
    };

    let coordinator = CampaignActionCoordinator::new(
        app_chain,
        foreign_chain,
        attestation,
        ctx.campaign_manager,
        campaign_address,
        WalletSession { address: owner },
    );

    spawn_transfer_logger(&coordinator);

    let refreshed = match command {
        Commands::Campaigns => unreachable!("handled above"),
        Commands::Show { .. } => coordinator.refresh().await?,
        Commands::Fund {
            amount, via_bridge, ..
        } => {
            if via_bridge {
                coordinator.fund_via_bridge(&amount).await?
            } else {
                coordinator.fund(&amount).await?
            }
        }
        Commands::Refund { via_bridge, .. } => {
            if via_bridge {
                coordinator.refund_via_bridge().await?
            } else {
                coordinator.refund().await?
            }
        }
        Commands::Withdraw { via_bridge, .. } => {
            if via_bridge {
                coordinator.withdraw_via_bridge().await?
            } else {
                coordinator.withdraw().await?
            }
        }
    };

    println!("{}", render_campaign(&refreshed));
    Ok(())
}

/// Logs each observed bridge step transition.
fn spawn_transfer_logger(coordinator: &CampaignActionCoordinator) {
    let mut updates = coordinator.transfer_updates();
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot: Option<TransferSession> = updates.borrow_and_update().clone();
            if let Some(session) = snapshot {
                for (step, status) in session.steps() {
                    if status.state != StepState::Pending {
                        info!(%step, state = ?status.state, description = %status.description, "Bridge step");
                    }
                }
            }
        }
    });
}

fn render_campaign(campaign: &Campaign) -> String {
    let deadline = if campaign.has_ended() {
        "Campaign ended".to_owned()
    } else {
        format!("{} minutes left", campaign.deadline_minutes_remaining)
    };

    format!(
        "{} ({})\n  {}\n  status: {} | {}\n  target: {} USDC | raised: {} USDC | your contribution: {} USDC\n  creator: {}",
        campaign.title,
        campaign.contract_address,
        campaign.description,
        campaign.status,
        deadline,
        campaign.target_amount,
        campaign.current_amount,
        campaign.user_contribution,
        campaign.creator,
    )
}
