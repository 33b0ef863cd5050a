//! Single-chain bridge operations.

use std::fmt;
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, FixedBytes, TxHash, U256};
use alloy::rpc::types::TransactionReceipt;
use alloy::sol_types::SolCall;
use tracing::info;

use crate::bindings::{IERC20, IMessageTransmitter, ITokenMessenger};
use crate::chain::{ChainClient, ChainError};

/// One chain's bridge-facing contract surface plus its client.
///
/// The same endpoint type serves as source and destination; a transfer
/// direction is just an ordered pair of endpoints.
#[derive(Clone)]
pub struct ChainEndpoint {
    pub name: String,
    pub usdc: Address,
    pub token_messenger: Address,
    pub message_transmitter: Address,
    /// Bridge-protocol domain identifier, distinct from the chain id.
    pub domain: u32,
    pub client: Arc<dyn ChainClient>,
}

impl fmt::Debug for ChainEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainEndpoint")
            .field("name", &self.name)
            .field("usdc", &self.usdc)
            .field("token_messenger", &self.token_messenger)
            .field("message_transmitter", &self.message_transmitter)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl ChainEndpoint {
    /// Approves `spender` to pull `amount` of USDC and waits for the
    /// approval to be mined.
    pub(crate) async fn approve_usdc(
        &self,
        spender: Address,
        amount: U256,
        note: &str,
    ) -> Result<TxHash, ChainError> {
        let calldata = Bytes::from(IERC20::approveCall { spender, amount }.abi_encode());

        let tx_hash = self.client.estimate_and_send(self.usdc, &calldata, note).await?;
        self.client.wait_for_receipt(tx_hash).await?;

        Ok(tx_hash)
    }

    /// Burns USDC on this chain for minting on `destination_domain`.
    ///
    /// Returns the burn receipt; the caller scans it for the
    /// `MessageSent` event.
    pub(crate) async fn deposit_for_burn(
        &self,
        amount: U256,
        destination_domain: u32,
        recipient: Address,
    ) -> Result<(TxHash, TransactionReceipt), ChainError> {
        let recipient_bytes32 = FixedBytes::<32>::left_padding_from(recipient.as_slice());

        info!(%amount, destination_domain, %recipient, "Depositing USDC for burn");

        let calldata = Bytes::from(
            ITokenMessenger::depositForBurnCall {
                amount,
                destinationDomain: destination_domain,
                mintRecipient: recipient_bytes32,
                burnToken: self.usdc,
            }
            .abi_encode(),
        );

        let tx_hash = self
            .client
            .estimate_and_send(self.token_messenger, &calldata, "depositForBurn")
            .await?;
        let receipt = self.client.wait_for_receipt(tx_hash).await?;

        Ok((tx_hash, receipt))
    }

    /// Submits the attested message to mint USDC on this chain.
    pub(crate) async fn receive_message(
        &self,
        message: Bytes,
        attestation: Bytes,
    ) -> Result<TxHash, ChainError> {
        let calldata = Bytes::from(
            IMessageTransmitter::receiveMessageCall {
                message,
                attestation,
            }
            .abi_encode(),
        );

        let tx_hash = self
            .client
            .estimate_and_send(self.message_transmitter, &calldata, "receiveMessage")
            .await?;
        self.client.wait_for_receipt(tx_hash).await?;

        Ok(tx_hash)
    }
}
