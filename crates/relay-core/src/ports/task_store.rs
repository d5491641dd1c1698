//! TaskStore port - 共有ジョブプールと owner ごとの claimed set
//!
//! 必要なプリミティブは 3 つだけ:
//! - point read（`get`）
//! - 件数上限付き scan（`scan_pool`）
//! - 複数ドキュメントの atomic トランザクション（`claim_batch` / `claim_one` / `mark_sent`）
//!
//! # 設計原則
//! - pool の変更は claim トランザクション経由のみ
//! - claim = 「owner の namespace へ書き込み + pool から削除」を 1 トランザクションで行う
//! - トランザクションあたりのドキュメント数に上限があるストアは `transaction_doc_limit` で申告する

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ClaimedJob, Job, JobId, NewJob, OwnerId, StoreError};

/// Documents one claimed job touches inside a transaction (pool delete + owner write).
pub const DOCS_PER_CLAIM: usize = 2;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Add a job to the shared pool. Job creation is a producer concern;
    /// the core only uses this for seeding.
    async fn insert(&self, job: NewJob) -> Result<JobId, StoreError>;

    /// Point read of a pool job.
    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Non-transactional scan of up to `limit` pool job ids, in insertion order.
    async fn scan_pool(&self, limit: usize) -> Result<Vec<JobId>, StoreError>;

    /// One transaction: take up to `max` pool jobs in insertion order, move
    /// them into `owner`'s claimed set, commit.
    async fn claim_batch(
        &self,
        owner: &OwnerId,
        max: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Job>, StoreError>;

    /// One transaction for one job. `Ok(None)` when the job is no longer in
    /// the pool (another claimer won).
    async fn claim_one(
        &self,
        owner: &OwnerId,
        id: JobId,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError>;

    /// Record that the job was handed to the transport.
    async fn mark_sent(
        &self,
        owner: &OwnerId,
        id: JobId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// The owner's claimed records (claimed, sent or failed), oldest first.
    async fn claimed(&self, owner: &OwnerId) -> Result<Vec<ClaimedJob>, StoreError>;

    /// Maximum documents per transaction, if the store has such a limit.
    fn transaction_doc_limit(&self) -> Option<usize> {
        None
    }
}
