//! Attestation service polling.
//!
//! After a burn is mined, the off-chain attestation service is polled
//! with the keccak hash of the emitted message until it reports the
//! attestation as complete. Only a `pending` status retries; transport
//! errors, non-2xx responses and malformed bodies fail the call, and the
//! retry itself is bounded.

use std::time::Duration;

use alloy::primitives::{B256, Bytes};
use backon::Retryable;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Interval between attestation polls.
pub const DEFAULT_ATTESTATION_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Maximum polls before the attestation wait is abandoned.
pub const DEFAULT_ATTESTATION_MAX_ATTEMPTS: usize = 90;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from polling the attestation service.
#[derive(Debug, thiserror::Error)]
pub enum AttestationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("attestation service returned HTTP {status}")]
    Status { status: u16 },
    #[error("failed to parse attestation response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("attestation response missing the attestation field")]
    MissingAttestation,
    #[error("invalid attestation hex: {0}")]
    HexDecode(#[from] alloy::hex::FromHexError),
    #[error("attestation pending: {status}")]
    Pending { status: String },
    #[error("attestation not complete after {attempts} attempts")]
    Timeout { attempts: usize },
    #[error("attestation polling cancelled")]
    Cancelled,
}

#[derive(Deserialize, Debug)]
struct AttestationBody {
    status: String,
    attestation: Option<String>,
}

/// Polls `GET {base}/attestations/{message_hash}` until complete.
#[derive(Clone)]
pub struct AttestationPoller {
    http_client: reqwest::Client,
    api_base: Url,
    poll_interval: Duration,
    max_attempts: usize,
    cancel: CancellationToken,
}

impl AttestationPoller {
    pub fn new(api_base: Url, cancel: CancellationToken) -> Result<Self, AttestationError> {
        let http_client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

        Ok(Self {
            http_client,
            api_base,
            poll_interval: DEFAULT_ATTESTATION_POLL_INTERVAL,
            max_attempts: DEFAULT_ATTESTATION_MAX_ATTEMPTS,
            cancel,
        })
    }

    pub fn with_polling(mut self, poll_interval: Duration, max_attempts: usize) -> Self {
        self.poll_interval = poll_interval;
        self.max_attempts = max_attempts;
        self
    }

    /// Blocks until the service reports the attestation for
    /// `message_hash` as complete, and returns the signature bytes.
    pub async fn await_attestation(&self, message_hash: B256) -> Result<Bytes, AttestationError> {
        let url = format!(
            "{}/attestations/{message_hash}",
            self.api_base.as_str().trim_end_matches('/')
        );

        info!(%url, "Polling attestation service");

        let backoff = backon::ConstantBuilder::default()
            .with_delay(self.poll_interval)
            .with_max_times(self.max_attempts);

        let fetch_attestation = || async { self.fetch_once(&url).await };

        fetch_attestation
            .retry(backoff)
            .when(|err| matches!(err, AttestationError::Pending { .. }))
            .notify(|err, dur| match err {
                AttestationError::Pending { status } => {
                    debug!(%status, ?dur, "Attestation pending, retrying");
                }
                err => warn!(?err, ?dur, "Attestation error"),
            })
            .await
            .map_err(|err| match err {
                AttestationError::Pending { .. } => AttestationError::Timeout {
                    attempts: self.max_attempts,
                },
                other => other,
            })
    }

    async fn fetch_once(&self, url: &str) -> Result<Bytes, AttestationError> {
        if self.cancel.is_cancelled() {
            return Err(AttestationError::Cancelled);
        }

        let response = self.http_client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(AttestationError::Status {
                status: response.status().as_u16(),
            });
        }

        let text = response.text().await?;
        let body: AttestationBody = serde_json::from_str(&text)?;

        if body.status != "complete" {
            return Err(AttestationError::Pending {
                status: body.status,
            });
        }

        let attestation_hex = body
            .attestation
            .ok_or(AttestationError::MissingAttestation)?;
        let stripped = attestation_hex
            .strip_prefix("0x")
            .unwrap_or(&attestation_hex);

        Ok(Bytes::from(alloy::hex::decode(stripped)?))
    }
}
