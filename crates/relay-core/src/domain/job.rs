//! Job model: pool documents, owner-scoped claimed records and claim batches.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{JobId, OwnerId};
use super::state::ClaimState;

/// A job as created by an external producer, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJob {
    pub destination: String,
    pub payload: String,
}

impl NewJob {
    pub fn new(destination: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            payload: payload.into(),
        }
    }
}

/// One outbound text message job.
///
/// Invariant: lives in exactly one place at a time, either the shared pool
/// (`owner == None`) or one owner's claimed set (`owner == Some(..)`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub destination: String,
    pub payload: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerId>,

    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: JobId, new_job: NewJob, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            destination: new_job.destination,
            payload: new_job.payload,
            owner: None,
            created_at,
        }
    }

    /// The copy written into `owner`'s namespace by the claim transaction.
    pub fn claimed_by(mut self, owner: &OwnerId) -> Self {
        self.owner = Some(owner.clone());
        self
    }
}

/// A job record inside an owner's claimed set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimedJob {
    pub job: Job,
    pub state: ClaimState,
    pub claimed_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

impl ClaimedJob {
    pub fn new(job: Job, claimed_at: DateTime<Utc>) -> Self {
        Self {
            job,
            state: ClaimState::Claimed,
            claimed_at,
            sent_at: None,
        }
    }

    pub fn mark_sent(&mut self, at: DateTime<Utc>) {
        // 確認が先に届いて Failed になっている場合は上書きしない
        if self.state == ClaimState::Claimed {
            self.state = ClaimState::Sent;
            self.sent_at = Some(at);
        }
    }

    pub fn mark_failed(&mut self) {
        self.state = ClaimState::Failed;
    }
}

/// Why a claim round returned fewer jobs than the store might have had.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimShortfall {
    /// The claim deadline expired mid-round.
    TimedOut,

    /// The store reported an error mid-round.
    StoreUnavailable(String),
}

impl fmt::Display for ClaimShortfall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimShortfall::TimedOut => write!(f, "claim timed out"),
            ClaimShortfall::StoreUnavailable(reason) => write!(f, "store unavailable: {reason}"),
        }
    }
}

/// Jobs returned by one claim round, in claim order.
///
/// Owned by the dispatch loop that requested it and dropped after the run.
#[derive(Debug, Clone)]
pub struct ClaimBatch {
    owner: OwnerId,
    jobs: Vec<Job>,
    shortfall: Option<ClaimShortfall>,
}

impl ClaimBatch {
    pub fn new(owner: OwnerId, jobs: Vec<Job>) -> Self {
        Self {
            owner,
            jobs,
            shortfall: None,
        }
    }

    pub fn empty(owner: OwnerId) -> Self {
        Self::new(owner, Vec::new())
    }

    pub fn with_shortfall(mut self, shortfall: ClaimShortfall) -> Self {
        self.shortfall = Some(shortfall);
        self
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn shortfall(&self) -> Option<&ClaimShortfall> {
        self.shortfall.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn job() -> Job {
        Job::new(
            JobId::from_ulid(Ulid::new()),
            NewJob::new("9000000001", "A"),
            Utc::now(),
        )
    }

    #[test]
    fn claimed_copy_carries_owner() {
        let owner = OwnerId::new("U1");
        let claimed = job().claimed_by(&owner);
        assert_eq!(claimed.owner, Some(owner));
    }

    #[test]
    fn sent_mark_does_not_resurrect_failed_record() {
        let mut record = ClaimedJob::new(job(), Utc::now());
        record.mark_failed();
        record.mark_sent(Utc::now());
        assert_eq!(record.state, ClaimState::Failed);
        assert!(record.sent_at.is_none());
    }

    #[test]
    fn pool_job_omits_owner_in_json() {
        let v = serde_json::to_value(job()).unwrap();
        assert!(v.get("owner").is_none());
        assert_eq!(v["destination"], "9000000001");
    }
}
