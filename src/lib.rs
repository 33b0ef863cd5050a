//! USDC crowdfunding campaign actions with cross-chain bridging.
//!
//! The core is the [`bridge::TransferOrchestrator`], which drives a
//! burn-and-mint transfer through five ordered, observable steps, and
//! the [`coordinator::CampaignActionCoordinator`], which composes it
//! with campaign-manager contract calls for fund / refund / withdraw
//! flows. Campaign state is read through the projection in
//! [`campaign`].

pub mod attestation;
mod bindings;
pub mod bridge;
pub mod campaign;
pub mod chain;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod usdc;

pub use bridge::{StepState, TransferOrchestrator, TransferSession, TransferStep};
pub use campaign::{Campaign, CampaignStatus};
pub use coordinator::CampaignActionCoordinator;
pub use usdc::Usdc;

#[cfg(test)]
pub(crate) mod test_utils;
