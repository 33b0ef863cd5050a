//! Campaign data projection.
//!
//! The campaign manager contract returns raw parallel arrays, one entry
//! per campaign address. This module decodes them into typed
//! [`Campaign`] records: amounts descaled to USDC, the absolute
//! on-chain deadline converted to signed minutes remaining against a
//! caller-supplied wall-clock instant. Projections are rebuilt whole on
//! every refresh; nothing here is persisted or partially mutated.

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};

use crate::bindings::ICampaignManager;
use crate::usdc::{AmountError, Usdc};

/// On-chain campaign status string, mirrored as an enum.
///
/// Advisory only: `deadline_minutes_remaining` is authoritative for
/// deadline gating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CampaignStatus {
    Active,
    Ended,
    Other(String),
}

impl From<&str> for CampaignStatus {
    fn from(raw: &str) -> Self {
        match raw {
            "Active" => Self::Active,
            "Ended" => Self::Ended,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => f.write_str("Active"),
            Self::Ended => f.write_str("Ended"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

/// Typed projection of one on-chain campaign record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Campaign {
    pub title: String,
    pub description: String,
    pub contract_address: Address,
    pub target_amount: Usdc,
    pub current_amount: Usdc,
    pub user_contribution: Usdc,
    /// Signed whole minutes until the deadline; negative once the
    /// campaign has ended. Recomputed on every projection build.
    pub deadline_minutes_remaining: i64,
    pub status: CampaignStatus,
    pub creator: Address,
}

impl Campaign {
    pub fn has_ended(&self) -> bool {
        self.deadline_minutes_remaining < 0
    }
}

/// One campaign's raw on-chain fields.
#[derive(Debug, Clone)]
pub struct RawCampaignRecord {
    pub title: String,
    pub description: String,
    pub target_amount: U256,
    pub current_amount: U256,
    /// Unix-seconds deadline timestamp.
    pub deadline: U256,
    pub user_contribution: U256,
    pub status: String,
    pub proposer: Address,
}

/// The parallel arrays returned by `getCampaignData`.
#[derive(Debug, Clone, Default)]
pub struct RawCampaignBatch {
    pub title: Vec<String>,
    pub description: Vec<String>,
    pub target_amount: Vec<U256>,
    pub current_amount: Vec<U256>,
    pub deadline: Vec<U256>,
    pub user_contribution: Vec<U256>,
    pub status: Vec<String>,
    pub proposer: Vec<Address>,
}

impl From<ICampaignManager::getCampaignDataReturn> for RawCampaignBatch {
    fn from(ret: ICampaignManager::getCampaignDataReturn) -> Self {
        Self {
            title: ret.title,
            description: ret.description,
            target_amount: ret.targetAmount,
            current_amount: ret.currentAmount,
            deadline: ret.deadline,
            user_contribution: ret.userContribution,
            status: ret.status,
            proposer: ret.proposer,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("campaign data field '{field}' has {actual} entries, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("deadline {value} does not fit a unix timestamp")]
    DeadlineOverflow { value: U256 },
    #[error(transparent)]
    Amount(#[from] AmountError),
}

/// Signed whole minutes between `now` and the deadline.
///
/// Floor division, so any elapsed fraction of a minute past the
/// deadline already reads as negative.
fn minutes_remaining(deadline_secs: u64, now: DateTime<Utc>) -> i64 {
    let deadline_millis = i128::from(deadline_secs) * 1000;
    let diff = deadline_millis - i128::from(now.timestamp_millis());

    // Minutes fit i64 for any u64-seconds deadline.
    diff.div_euclid(60_000) as i64
}

/// Projects one raw record into a [`Campaign`].
///
/// Pure: deterministic for a fixed `now`.
pub fn project_one(
    record: &RawCampaignRecord,
    contract_address: Address,
    now: DateTime<Utc>,
) -> Result<Campaign, ProjectionError> {
    let deadline_secs: u64 = record
        .deadline
        .try_into()
        .map_err(|_| ProjectionError::DeadlineOverflow {
            value: record.deadline,
        })?;

    Ok(Campaign {
        title: record.title.clone(),
        description: record.description.clone(),
        contract_address,
        target_amount: Usdc::from_base_units(record.target_amount)?,
        current_amount: Usdc::from_base_units(record.current_amount)?,
        user_contribution: Usdc::from_base_units(record.user_contribution)?,
        deadline_minutes_remaining: minutes_remaining(deadline_secs, now),
        status: CampaignStatus::from(record.status.as_str()),
        creator: record.proposer,
    })
}

/// Projects a whole batch, element-wise.
///
/// Fails atomically: any array whose length differs from the address
/// count yields an error and no partial list.
pub fn project_all(
    batch: &RawCampaignBatch,
    addresses: &[Address],
    now: DateTime<Utc>,
) -> Result<Vec<Campaign>, ProjectionError> {
    let expected = addresses.len();

    let check = |field: &'static str, actual: usize| -> Result<(), ProjectionError> {
        if actual == expected {
            Ok(())
        } else {
            Err(ProjectionError::LengthMismatch {
                field,
                expected,
                actual,
            })
        }
    };

    check("title", batch.title.len())?;
    check("description", batch.description.len())?;
    check("targetAmount", batch.target_amount.len())?;
    check("currentAmount", batch.current_amount.len())?;
    check("deadline", batch.deadline.len())?;
    check("userContribution", batch.user_contribution.len())?;
    check("status", batch.status.len())?;
    check("proposer", batch.proposer.len())?;

    addresses
        .iter()
        .enumerate()
        .map(|(i, address)| {
            let record = RawCampaignRecord {
                title: batch.title[i].clone(),
                description: batch.description[i].clone(),
                target_amount: batch.target_amount[i],
                current_amount: batch.current_amount[i],
                deadline: batch.deadline[i],
                user_contribution: batch.user_contribution[i],
                status: batch.status[i].clone(),
                proposer: batch.proposer[i],
            };
            project_one(&record, *address, now)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;
    use chrono::TimeDelta;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;

    const CAMPAIGN: Address = address!("0x00000000000000000000000000000000000000C1");
    const CREATOR: Address = address!("0x00000000000000000000000000000000000000C2");

    fn fixed_now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn record(deadline_secs: i64) -> RawCampaignRecord {
        RawCampaignRecord {
            title: "Community well".to_owned(),
            description: "Clean water for the village".to_owned(),
            target_amount: U256::from(1_000_000_000u64),
            current_amount: U256::from(400_000_000u64),
            deadline: U256::from(deadline_secs as u64),
            user_contribution: U256::from(25_000_000u64),
            status: "Active".to_owned(),
            proposer: CREATOR,
        }
    }

    #[test]
    fn project_one_descales_amounts_and_computes_minutes() {
        let now = fixed_now();
        let deadline = now.timestamp() + 30 * 60;

        let campaign = project_one(&record(deadline), CAMPAIGN, now).unwrap();

        assert_eq!(Decimal::from(campaign.target_amount), dec!(1000));
        assert_eq!(Decimal::from(campaign.current_amount), dec!(400));
        assert_eq!(Decimal::from(campaign.user_contribution), dec!(25));
        assert_eq!(campaign.deadline_minutes_remaining, 30);
        assert_eq!(campaign.status, CampaignStatus::Active);
        assert_eq!(campaign.creator, CREATOR);
        assert!(!campaign.has_ended());
    }

    #[test]
    fn elapsed_deadline_projects_negative_minutes() {
        let now = fixed_now();
        let deadline = now.timestamp() - 5 * 60;

        let campaign = project_one(&record(deadline), CAMPAIGN, now).unwrap();

        assert_eq!(campaign.deadline_minutes_remaining, -5);
        assert!(campaign.has_ended());
    }

    #[test]
    fn fractional_overrun_already_reads_negative() {
        let now = fixed_now();
        // 30 seconds past the deadline floors to -1 minutes.
        let deadline = now.timestamp() - 30;

        let campaign = project_one(&record(deadline), CAMPAIGN, now).unwrap();

        assert_eq!(campaign.deadline_minutes_remaining, -1);
    }

    #[test]
    fn project_one_is_deterministic_for_fixed_now() {
        let now = fixed_now();
        let raw = record(now.timestamp() + 600);

        let first = project_one(&raw, CAMPAIGN, now).unwrap();
        let second = project_one(&raw, CAMPAIGN, now).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn unknown_status_is_preserved() {
        let now = fixed_now();
        let mut raw = record(now.timestamp() + 600);
        raw.status = "Paused".to_owned();

        let campaign = project_one(&raw, CAMPAIGN, now).unwrap();

        assert_eq!(campaign.status, CampaignStatus::Other("Paused".to_owned()));
    }

    fn batch_of(records: &[RawCampaignRecord]) -> RawCampaignBatch {
        RawCampaignBatch {
            title: records.iter().map(|r| r.title.clone()).collect(),
            description: records.iter().map(|r| r.description.clone()).collect(),
            target_amount: records.iter().map(|r| r.target_amount).collect(),
            current_amount: records.iter().map(|r| r.current_amount).collect(),
            deadline: records.iter().map(|r| r.deadline).collect(),
            user_contribution: records.iter().map(|r| r.user_contribution).collect(),
            status: records.iter().map(|r| r.status.clone()).collect(),
            proposer: records.iter().map(|r| r.proposer).collect(),
        }
    }

    #[test]
    fn project_all_matches_input_length() {
        let now = fixed_now();
        let records = vec![record(now.timestamp() + 60), record(now.timestamp() - 60)];
        let addresses = [CAMPAIGN, CREATOR];

        let campaigns = project_all(&batch_of(&records), &addresses, now).unwrap();

        assert_eq!(campaigns.len(), 2);
        assert_eq!(campaigns[0].contract_address, CAMPAIGN);
        assert_eq!(campaigns[1].contract_address, CREATOR);
    }

    #[test]
    fn project_all_fails_atomically_on_length_mismatch() {
        let now = fixed_now();
        let records = vec![record(now.timestamp() + 60), record(now.timestamp() + 120)];
        let mut batch = batch_of(&records);
        batch.deadline.pop();

        let err = project_all(&batch, &[CAMPAIGN, CREATOR], now).unwrap_err();

        assert!(
            matches!(
                err,
                ProjectionError::LengthMismatch {
                    field: "deadline",
                    expected: 2,
                    actual: 1,
                }
            ),
            "got: {err:?}"
        );
    }

    proptest! {
        #[test]
        fn minutes_remaining_negative_iff_deadline_before_now(offset_secs in -86_400i64..86_400) {
            let now = fixed_now();
            let deadline = now.timestamp() + offset_secs;

            let campaign = project_one(&record(deadline), CAMPAIGN, now).unwrap();

            let deadline_instant = now + TimeDelta::seconds(offset_secs);
            prop_assert_eq!(
                campaign.deadline_minutes_remaining < 0,
                deadline_instant < now
            );
        }
    }
}
