//! Dispatcher - claim 済みバッチを順番に送信する
//!
//! # フロー
//! 1. `SmsSender::check_ready()`（権限なしならここで打ち切り、1 通も送らない）
//! 2. job ごとに: cancel 確認 → 検証 → `send` → `mark_sent` → progress 通知
//! 3. 送信と送信の間は `interval` だけ待つ（待機中も cancel に反応する）
//!
//! # エラーの扱い
//! - 不正なレコード（宛先・本文）: warn してスキップ。claimed record はそのまま残る
//! - transport の拒否: その job だけ failed としてカウント
//! - 致命的エラー（権限・送信手段なし）: 残りを送らずに打ち切り
//! - `mark_sent` の失敗: warn のみ（送信自体は済んでいる）

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::domain::{ClaimBatch, Job, OutboundSms, OwnerId, Progress, SendError};
use crate::ports::{Clock, SmsSender, TaskStore};

/// Why a dispatch pass stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEnd {
    /// Every job in the batch was attempted.
    Exhausted,
    Cancelled,
    /// A fatal send error; the remaining jobs were not attempted.
    Aborted(SendError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub progress: Progress,
    pub end: DispatchEnd,
}

pub struct Dispatcher {
    store: Arc<dyn TaskStore>,
    sender: Arc<dyn SmsSender>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn TaskStore>,
        sender: Arc<dyn SmsSender>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            sender,
            clock,
            interval,
        }
    }

    /// Send every job of `batch` in order, calling `on_progress` once per attempt.
    pub async fn dispatch<F>(
        &self,
        batch: &ClaimBatch,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> DispatchReport
    where
        F: FnMut(Progress),
    {
        let mut progress = Progress::new(batch.len());

        if let Err(err) = self.sender.check_ready() {
            tracing::error!(error = %err, "send capability missing, nothing dispatched");
            return DispatchReport {
                progress,
                end: DispatchEnd::Aborted(err),
            };
        }

        for (index, job) in batch.jobs().iter().enumerate() {
            if index > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
            if cancel.is_cancelled() {
                tracing::info!(sent = progress.sent, total = progress.total, "dispatch cancelled");
                return DispatchReport {
                    progress,
                    end: DispatchEnd::Cancelled,
                };
            }

            match self.send_one(job, batch.owner()).await {
                Ok(()) => progress.record_sent(),
                Err(err) if err.is_fatal() => {
                    tracing::error!(
                        job_id = %job.id,
                        error = %err,
                        "fatal send error, aborting run"
                    );
                    progress.record_failed();
                    on_progress(progress);
                    return DispatchReport {
                        progress,
                        end: DispatchEnd::Aborted(err),
                    };
                }
                Err(err) => {
                    tracing::warn!(job_id = %job.id, error = %err, "job skipped");
                    progress.record_failed();
                }
            }
            on_progress(progress);
        }

        DispatchReport {
            progress,
            end: DispatchEnd::Exhausted,
        }
    }

    async fn send_one(&self, job: &Job, owner: &OwnerId) -> Result<(), SendError> {
        let sms = OutboundSms::for_job(job, owner)?;
        let token = self.sender.send(&sms).await?;
        tracing::debug!(job_id = %job.id, segments = token.segments, "handed to transport");

        if let Err(err) = self.store.mark_sent(owner, job.id, self.clock.now()).await {
            tracing::warn!(job_id = %job.id, error = %err, "failed to mark job as sent");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ClaimState, NewJob};
    use crate::impls::{InMemoryStore, SimulatedSender};
    use crate::ports::SystemClock;
    use tokio::sync::mpsc;

    struct Fixture {
        store: Arc<InMemoryStore>,
        sender: Arc<SimulatedSender>,
        dispatcher: Dispatcher,
        batch: ClaimBatch,
        _confirmations: mpsc::Receiver<crate::domain::Confirmation>,
    }

    async fn fixture(jobs: Vec<NewJob>) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        store.seed(jobs.clone()).await.unwrap();
        let owner = OwnerId::new("U1");
        let claimed = store
            .claim_batch(&owner, jobs.len(), chrono::Utc::now())
            .await
            .unwrap();

        let (tx, rx) = mpsc::channel(64);
        let sender = Arc::new(SimulatedSender::new(tx));
        let dispatcher = Dispatcher::new(
            Arc::clone(&store) as Arc<dyn TaskStore>,
            Arc::clone(&sender) as Arc<dyn SmsSender>,
            Arc::new(SystemClock),
            Duration::from_millis(1500),
        );
        Fixture {
            store,
            sender,
            dispatcher,
            batch: ClaimBatch::new(owner, claimed),
            _confirmations: rx,
        }
    }

    fn jobs(n: usize) -> Vec<NewJob> {
        (0..n)
            .map(|i| NewJob::new(format!("90000000{i:02}"), format!("hello {i}")))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn one_progress_callback_per_job() {
        let f = fixture(jobs(4)).await;
        let mut seen = Vec::new();

        let report = f
            .dispatcher
            .dispatch(&f.batch, &CancellationToken::new(), |p| seen.push(p))
            .await;

        assert_eq!(report.end, DispatchEnd::Exhausted);
        assert_eq!(seen.len(), 4);
        assert!(seen.windows(2).all(|w| w[0].sent <= w[1].sent));
        let last = seen[3];
        assert_eq!((last.sent, last.total), (4, 4));
        assert_eq!(f.sender.send_calls(), 4);

        let claimed = f.store.claimed(f.batch.owner()).await.unwrap();
        assert!(claimed.iter().all(|r| r.state == ClaimState::Sent));
    }

    #[tokio::test(start_paused = true)]
    async fn sends_are_spaced_by_interval() {
        let f = fixture(jobs(3)).await;
        let started = tokio::time::Instant::now();

        f.dispatcher
            .dispatch(&f.batch, &CancellationToken::new(), |_| {})
            .await;

        assert!(started.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_further_sends() {
        let f = fixture(jobs(5)).await;
        let cancel = CancellationToken::new();

        let report = f
            .dispatcher
            .dispatch(&f.batch, &cancel, |p| {
                if p.sent == 2 {
                    cancel.cancel();
                }
            })
            .await;

        assert_eq!(report.end, DispatchEnd::Cancelled);
        assert_eq!(report.progress.sent, 2);
        assert!(f.sender.send_calls() <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_job_is_skipped_and_stays_claimed() {
        let f = fixture(vec![
            NewJob::new("12ab", "bad number"),
            NewJob::new("9000000001", "  "),
            NewJob::new("9000000002", "ok"),
        ])
        .await;

        let report = f
            .dispatcher
            .dispatch(&f.batch, &CancellationToken::new(), |_| {})
            .await;

        assert_eq!(report.end, DispatchEnd::Exhausted);
        assert_eq!(report.progress.sent, 1);
        assert_eq!(report.progress.failed, 2);
        assert_eq!(f.sender.send_calls(), 1);

        let states: Vec<ClaimState> = f
            .store
            .claimed(f.batch.owner())
            .await
            .unwrap()
            .iter()
            .map(|r| r.state)
            .collect();
        assert_eq!(states.iter().filter(|s| **s == ClaimState::Claimed).count(), 2);
        assert_eq!(states.iter().filter(|s| **s == ClaimState::Sent).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_permission_fails_before_any_send() {
        let f = fixture(jobs(2)).await;
        f.sender.set_permission(false);
        let mut callbacks = 0;

        let report = f
            .dispatcher
            .dispatch(&f.batch, &CancellationToken::new(), |_| callbacks += 1)
            .await;

        assert_eq!(report.end, DispatchEnd::Aborted(SendError::PermissionDenied));
        assert_eq!(report.progress.attempted, 0);
        assert_eq!(callbacks, 0);
        assert_eq!(f.sender.send_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn permission_revoked_mid_run_aborts_remaining_jobs() {
        let f = fixture(jobs(4)).await;
        let sender = Arc::clone(&f.sender);

        let report = f
            .dispatcher
            .dispatch(&f.batch, &CancellationToken::new(), |_| {
                sender.set_permission(false)
            })
            .await;

        assert_eq!(report.end, DispatchEnd::Aborted(SendError::PermissionDenied));
        assert_eq!(report.progress.sent, 1);
        assert_eq!(report.progress.failed, 1);
        assert_eq!(f.sender.send_calls(), 2);
    }
}
