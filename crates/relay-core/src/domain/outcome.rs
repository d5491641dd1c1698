//! Delivery outcome model: transport result codes, inbound confirmations,
//! the append-only outcome log entry and the ledger settlement result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::balance::Credits;
use super::ids::{JobId, OutcomeId, OwnerId};

/// Result code attached to a confirmation by the transport.
///
/// Raw values follow the handset convention: `-1` is OK, small positive
/// integers are the generic/radio/PDU/service failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    Ok,
    GenericFailure,
    RadioOff,
    NullPdu,
    NoService,
    Other(i32),
}

impl ResultCode {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            -1 => ResultCode::Ok,
            1 => ResultCode::GenericFailure,
            2 => ResultCode::RadioOff,
            3 => ResultCode::NullPdu,
            4 => ResultCode::NoService,
            other => ResultCode::Other(other),
        }
    }

    /// Everything but `Ok` is a delivery failure.
    pub fn status(self) -> DeliveryStatus {
        match self {
            ResultCode::Ok => DeliveryStatus::Delivered,
            _ => DeliveryStatus::Failed,
        }
    }
}

/// Terminal status recorded in the outcome log.
///
/// (`sent` is a claimed-record state, see `ClaimState::Sent`, not a log status.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Failed,
}

/// Inbound event from the transport, once per dispatched job (redelivery possible).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub job_id: JobId,
    pub owner: OwnerId,
    pub destination: String,
    pub result: ResultCode,
}

/// One immutable entry of the delivery log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub id: OutcomeId,
    pub job_id: JobId,
    pub owner: OwnerId,
    pub destination: String,
    pub status: DeliveryStatus,
    pub timestamp: DateTime<Utc>,
}

impl DeliveryOutcome {
    pub fn from_confirmation(
        id: OutcomeId,
        confirmation: &Confirmation,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            job_id: confirmation.job_id,
            owner: confirmation.owner.clone(),
            destination: confirmation.destination.clone(),
            status: confirmation.result.status(),
            timestamp,
        }
    }
}

/// What the ledger transaction did with one confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Delivered: balance credited, record deleted, outcome appended.
    Credited { balance: Credits },

    /// Failed: outcome appended, record kept and marked failed.
    RecordedFailure,

    /// The record is already terminal (deleted or failed). Nothing changed.
    AlreadySettled,

    /// The owner never claimed this job. Nothing changed.
    UnknownJob,
}

impl Settlement {
    /// Did this settlement mutate the store?
    pub fn is_applied(self) -> bool {
        matches!(
            self,
            Settlement::Credited { .. } | Settlement::RecordedFailure
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(-1, ResultCode::Ok, DeliveryStatus::Delivered)]
    #[case(1, ResultCode::GenericFailure, DeliveryStatus::Failed)]
    #[case(2, ResultCode::RadioOff, DeliveryStatus::Failed)]
    #[case(3, ResultCode::NullPdu, DeliveryStatus::Failed)]
    #[case(4, ResultCode::NoService, DeliveryStatus::Failed)]
    #[case(0, ResultCode::Other(0), DeliveryStatus::Failed)]
    fn raw_codes_map_to_status(
        #[case] raw: i32,
        #[case] code: ResultCode,
        #[case] status: DeliveryStatus,
    ) {
        assert_eq!(ResultCode::from_raw(raw), code);
        assert_eq!(code.status(), status);
    }

    #[test]
    fn delivery_status_serializes_as_log_names() {
        let s = serde_json::to_string(&DeliveryStatus::Delivered).unwrap();
        assert_eq!(s, "\"delivered\"");

        let s = serde_json::to_string(&DeliveryStatus::Failed).unwrap();
        assert_eq!(s, "\"failed\"");
    }

    #[test]
    fn only_credit_and_failure_are_applied() {
        assert!(Settlement::Credited { balance: Credits::from_paise(16) }.is_applied());
        assert!(Settlement::RecordedFailure.is_applied());
        assert!(!Settlement::AlreadySettled.is_applied());
        assert!(!Settlement::UnknownJob.is_applied());
    }
}
