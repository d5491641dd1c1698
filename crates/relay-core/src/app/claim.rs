//! ClaimProtocol - 共有プールから最大 N 件を atomic に claim する
//!
//! # フロー
//! 1. ストアが 1 トランザクションで足りるなら `claim_batch`（読み取り→owner へ書き込み→pool から削除）
//! 2. トランザクションのドキュメント上限に収まらないなら分割:
//!    `scan_pool` で候補を拾い、候補ごとに `claim_one` トランザクション。
//!    他の worker に先を越された候補は `None` で返るのでスキップ（エラーではない）
//! 3. 全体を 1 つの締め切りで囲む。締め切りを過ぎたらそこまでに claim できた分を返す
//!
//! 呼び出し側は「タイムアウト」と「件数が少なかった」を同じように扱う。
//! 理由は `ClaimBatch::shortfall` に残るので、空バッチのときだけ run の終端理由になる。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, timeout_at};

use crate::domain::{ClaimBatch, ClaimShortfall, Job, OwnerId, StoreError};
use crate::ports::{Clock, DOCS_PER_CLAIM, TaskStore};

pub struct ClaimProtocol {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl ClaimProtocol {
    pub fn new(store: Arc<dyn TaskStore>, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self {
            store,
            clock,
            timeout,
        }
    }

    /// Claim up to `max` jobs for `owner`. Never fails: store trouble shows up
    /// as a short (possibly empty) batch with a recorded shortfall.
    pub async fn claim(&self, owner: &OwnerId, max: usize) -> ClaimBatch {
        if max == 0 {
            return ClaimBatch::empty(owner.clone());
        }
        let deadline = Instant::now() + self.timeout;

        let fits_one_transaction = self
            .store
            .transaction_doc_limit()
            .is_none_or(|limit| max * DOCS_PER_CLAIM <= limit);

        let batch = if fits_one_transaction {
            self.claim_in_one_transaction(owner, max, deadline).await
        } else {
            self.claim_one_by_one(owner, max, deadline).await
        };

        match batch.shortfall() {
            Some(shortfall) => tracing::warn!(
                owner = %owner,
                claimed = batch.len(),
                shortfall = %shortfall,
                "claim round ended early"
            ),
            None => tracing::debug!(owner = %owner, claimed = batch.len(), "claim round finished"),
        }
        batch
    }

    /// The job at the head of the pool, without claiming it.
    ///
    /// Scan then point read; another worker may claim it in between, in which
    /// case this returns `None`.
    pub async fn peek_next(&self) -> Result<Option<Job>, StoreError> {
        let Some(id) = self.store.scan_pool(1).await?.into_iter().next() else {
            return Ok(None);
        };
        self.store.get(id).await
    }

    async fn claim_in_one_transaction(
        &self,
        owner: &OwnerId,
        max: usize,
        deadline: Instant,
    ) -> ClaimBatch {
        let now = self.clock.now();
        match timeout_at(deadline, self.store.claim_batch(owner, max, now)).await {
            Ok(Ok(jobs)) => ClaimBatch::new(owner.clone(), jobs),
            // ストアが実際の件数で上限を判定した場合は分割に切り替える
            Ok(Err(StoreError::TransactionTooLarge { touched, limit })) => {
                tracing::debug!(touched, limit, "batch claim too large, splitting");
                self.claim_one_by_one(owner, max, deadline).await
            }
            Ok(Err(err)) => ClaimBatch::empty(owner.clone())
                .with_shortfall(ClaimShortfall::StoreUnavailable(err.to_string())),
            Err(_) => ClaimBatch::empty(owner.clone()).with_shortfall(ClaimShortfall::TimedOut),
        }
    }

    async fn claim_one_by_one(&self, owner: &OwnerId, max: usize, deadline: Instant) -> ClaimBatch {
        let candidates = match timeout_at(deadline, self.store.scan_pool(max)).await {
            Ok(Ok(candidates)) => candidates,
            Ok(Err(err)) => {
                return ClaimBatch::empty(owner.clone())
                    .with_shortfall(ClaimShortfall::StoreUnavailable(err.to_string()));
            }
            Err(_) => {
                return ClaimBatch::empty(owner.clone()).with_shortfall(ClaimShortfall::TimedOut);
            }
        };

        let mut jobs = Vec::with_capacity(candidates.len());
        for id in candidates {
            let now = self.clock.now();
            match timeout_at(deadline, self.store.claim_one(owner, id, now)).await {
                Ok(Ok(Some(job))) => jobs.push(job),
                Ok(Ok(None)) => {
                    tracing::debug!(job_id = %id, "candidate already claimed by another worker");
                }
                Ok(Err(err)) => {
                    return ClaimBatch::new(owner.clone(), jobs)
                        .with_shortfall(ClaimShortfall::StoreUnavailable(err.to_string()));
                }
                Err(_) => {
                    return ClaimBatch::new(owner.clone(), jobs)
                        .with_shortfall(ClaimShortfall::TimedOut);
                }
            }
        }
        ClaimBatch::new(owner.clone(), jobs)
    }
}
