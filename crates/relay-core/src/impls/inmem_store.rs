//! InMemoryStore - 開発・テスト用の共有ストア
//!
//! # 実装詳細
//! - 全状態を 1 つの `tokio::sync::Mutex` に入れ、ロック区間 = 1 トランザクションとして扱う
//! - ロックは await を跨がない（latency の擬似 sleep はロック取得前）
//! - `TaskStore` と `Ledger` の両方を実装する（本番でも同じドキュメントストアに載る想定）
//!
//! # テスト用のつまみ
//! - `with_transaction_doc_limit`: トランザクションあたりのドキュメント上限
//! - `set_available(false)`: ストア障害
//! - `set_latency`: ネットワーク往復の遅延（claim のタイムアウト検証用）

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};

use crate::domain::{
    ClaimedJob, Credits, DeliveryOutcome, DeliveryStatus, Job, JobId, NewJob, OwnerId,
    Settlement, StoreError,
};
use crate::ports::{
    Clock, DOCS_PER_CLAIM, IdGenerator, Ledger, SystemClock, TaskStore, UlidGenerator,
};

/// Claimed records live in the owner's namespace.
type ClaimKey = (OwnerId, JobId);

struct InMemoryStoreState {
    /// Pool order (insertion order = claim order).
    pool: VecDeque<JobId>,

    /// Pool documents.
    pool_docs: HashMap<JobId, Job>,

    /// Owner-scoped claimed records.
    claimed: HashMap<ClaimKey, ClaimedJob>,

    /// Records deleted by a delivered confirmation.
    // 本番ストアではドキュメントの不在 + outcome log で冪等性を判定する（この set は増え続ける）
    delivered: HashSet<ClaimKey>,

    balances: HashMap<OwnerId, Credits>,

    /// Append-only delivery log.
    outcomes: Vec<DeliveryOutcome>,
}

impl InMemoryStoreState {
    fn new() -> Self {
        Self {
            pool: VecDeque::new(),
            pool_docs: HashMap::new(),
            claimed: HashMap::new(),
            delivered: HashSet::new(),
            balances: HashMap::new(),
            outcomes: Vec::new(),
        }
    }

    /// Write the owner's copy. Caller has already removed the job from the pool.
    fn record_claim(&mut self, owner: &OwnerId, job: Job, now: DateTime<Utc>) -> Job {
        let job = job.claimed_by(owner);
        self.claimed
            .insert((owner.clone(), job.id), ClaimedJob::new(job.clone(), now));
        job
    }

    fn check_limit(limit: Option<usize>, touched: usize) -> Result<(), StoreError> {
        match limit {
            Some(limit) if touched > limit => {
                Err(StoreError::TransactionTooLarge { touched, limit })
            }
            _ => Ok(()),
        }
    }
}

pub struct InMemoryStore {
    state: Mutex<InMemoryStoreState>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    transaction_doc_limit: Option<usize>,
    available: AtomicBool,
    latency_ms: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(InMemoryStoreState::new()),
            ids: Arc::new(UlidGenerator::new(Arc::clone(&clock))),
            clock,
            transaction_doc_limit: None,
            available: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
        }
    }

    pub fn with_transaction_doc_limit(mut self, limit: usize) -> Self {
        self.transaction_doc_limit = Some(limit);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Insert several jobs, returning their ids in pool order.
    pub async fn seed(
        &self,
        jobs: impl IntoIterator<Item = NewJob>,
    ) -> Result<Vec<JobId>, StoreError> {
        let mut ids = Vec::new();
        for job in jobs {
            ids.push(self.insert(job).await?);
        }
        Ok(ids)
    }

    /// Pool jobs in claim order.
    pub async fn pool(&self) -> Vec<Job> {
        let state = self.state.lock().await;
        state
            .pool
            .iter()
            .filter_map(|id| state.pool_docs.get(id).cloned())
            .collect()
    }

    pub async fn pool_len(&self) -> usize {
        self.state.lock().await.pool.len()
    }

    /// Simulated round trip, then the transaction lock.
    async fn enter(&self) -> Result<MutexGuard<'_, InMemoryStoreState>, StoreError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store is offline".to_string()));
        }
        Ok(self.state.lock().await)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn insert(&self, new_job: NewJob) -> Result<JobId, StoreError> {
        let id = self.ids.generate_job_id();
        let job = Job::new(id, new_job, self.clock.now());
        let mut state = self.enter().await?;
        state.pool_docs.insert(id, job);
        state.pool.push_back(id);
        Ok(id)
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let state = self.enter().await?;
        Ok(state.pool_docs.get(&id).cloned())
    }

    async fn scan_pool(&self, limit: usize) -> Result<Vec<JobId>, StoreError> {
        let state = self.enter().await?;
        Ok(state.pool.iter().take(limit).copied().collect())
    }

    async fn claim_batch(
        &self,
        owner: &OwnerId,
        max: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Job>, StoreError> {
        let mut state = self.enter().await?;
        let take = max.min(state.pool.len());
        InMemoryStoreState::check_limit(self.transaction_doc_limit, take * DOCS_PER_CLAIM)?;

        let mut jobs = Vec::with_capacity(take);
        while jobs.len() < take {
            let Some(id) = state.pool.pop_front() else {
                break;
            };
            // pool と pool_docs は常に同期している
            let Some(job) = state.pool_docs.remove(&id) else {
                continue;
            };
            jobs.push(state.record_claim(owner, job, now));
        }
        Ok(jobs)
    }

    async fn claim_one(
        &self,
        owner: &OwnerId,
        id: JobId,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError> {
        InMemoryStoreState::check_limit(self.transaction_doc_limit, DOCS_PER_CLAIM)?;
        let mut state = self.enter().await?;
        let Some(job) = state.pool_docs.remove(&id) else {
            return Ok(None);
        };
        state.pool.retain(|pooled| *pooled != id);
        Ok(Some(state.record_claim(owner, job, now)))
    }

    async fn mark_sent(
        &self,
        owner: &OwnerId,
        id: JobId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let key = (owner.clone(), id);
        let mut state = self.enter().await?;
        if let Some(record) = state.claimed.get_mut(&key) {
            record.mark_sent(now);
            return Ok(());
        }
        // 確認が先に届いて削除済みなら問題なし
        if state.delivered.contains(&key) {
            Ok(())
        } else {
            Err(StoreError::NotFound(id))
        }
    }

    async fn claimed(&self, owner: &OwnerId) -> Result<Vec<ClaimedJob>, StoreError> {
        let state = self.enter().await?;
        let mut records: Vec<ClaimedJob> = state
            .claimed
            .iter()
            .filter(|((claimer, _), _)| claimer == owner)
            .map(|(_, record)| record.clone())
            .collect();
        records.sort_by_key(|record| (record.claimed_at, record.job.id));
        Ok(records)
    }

    fn transaction_doc_limit(&self) -> Option<usize> {
        self.transaction_doc_limit
    }
}

#[async_trait]
impl Ledger for InMemoryStore {
    async fn settle(
        &self,
        outcome: DeliveryOutcome,
        credit: Credits,
    ) -> Result<Settlement, StoreError> {
        let key = (outcome.owner.clone(), outcome.job_id);
        let mut guard = self.enter().await?;
        let state = &mut *guard;

        let Some(record) = state.claimed.get_mut(&key) else {
            // delivered は記録ごと削除されるので、再送された確認はここに来る
            if state.delivered.contains(&key) {
                return Ok(Settlement::AlreadySettled);
            }
            return Ok(Settlement::UnknownJob);
        };
        if !record.state.is_settleable() {
            return Ok(Settlement::AlreadySettled);
        }

        match outcome.status {
            DeliveryStatus::Delivered => {
                state.claimed.remove(&key);
                let balance = state.balances.entry(outcome.owner.clone()).or_default();
                *balance = *balance + credit;
                let balance = *balance;
                state.delivered.insert(key);
                state.outcomes.push(outcome);
                Ok(Settlement::Credited { balance })
            }
            DeliveryStatus::Failed => {
                record.mark_failed();
                state.outcomes.push(outcome);
                Ok(Settlement::RecordedFailure)
            }
        }
    }

    async fn balance(&self, owner: &OwnerId) -> Result<Credits, StoreError> {
        let state = self.enter().await?;
        Ok(state.balances.get(owner).copied().unwrap_or_default())
    }

    async fn outcomes(&self, owner: &OwnerId) -> Result<Vec<DeliveryOutcome>, StoreError> {
        let state = self.enter().await?;
        Ok(state
            .outcomes
            .iter()
            .filter(|outcome| &outcome.owner == owner)
            .cloned()
            .collect())
    }
}
