//! Worker - 1 owner 分の run を駆動する
//!
//! # run のフロー
//! 1. `check_ready()`（送信できないなら claim しない。ジョブを claimed のまま放置しないため）
//! 2. Claiming: `ClaimProtocol::claim(owner, claim_batch_size)`
//! 3. 空バッチなら EmptyPool（ストア障害なら Failed）
//! 4. Dispatching: `Dispatcher::dispatch` で順番に送信し、進捗を `RunSnapshot` に反映
//! 5. 終端状態を 1 回だけ書き込む
//!
//! Worker あたり同時に走る run は 1 つだけ。配送確認は run とは独立に
//! `ConfirmationHandler` が処理する。

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::domain::{
    ClaimedJob, Confirmation, Credits, DeliveryOutcome, Job, OwnerId, Progress, RelayError, RunId,
    RunPhase, StoreError, TerminalState,
};
use crate::ports::{Clock, IdGenerator, Ledger, RunObserver, SmsSender, TaskStore};

use super::claim::ClaimProtocol;
use super::confirm::ConfirmationHandler;
use super::dispatch::{DispatchEnd, Dispatcher};
use super::status::{self, RunSnapshot};

/// Everything a worker is wired from. Assembled by `WorkerBuilder`.
pub(crate) struct WorkerParts {
    pub store: Arc<dyn TaskStore>,
    pub ledger: Arc<dyn Ledger>,
    pub sender: Arc<dyn SmsSender>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub config: RelayConfig,
}

struct WorkerInner {
    store: Arc<dyn TaskStore>,
    ledger: Arc<dyn Ledger>,
    sender: Arc<dyn SmsSender>,
    ids: Arc<dyn IdGenerator>,
    config: RelayConfig,
    claim: ClaimProtocol,
    dispatcher: Dispatcher,
    confirmations: Arc<ConfirmationHandler>,

    /// The active run, if any.
    active: Mutex<Option<(RunId, CancellationToken)>>,

    status: watch::Sender<RunSnapshot>,
}

/// Cheap to clone; clones share the same run slot.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<WorkerInner>,
}

impl Worker {
    pub(crate) fn from_parts(parts: WorkerParts) -> Self {
        let WorkerParts {
            store,
            ledger,
            sender,
            clock,
            ids,
            config,
        } = parts;

        let claim = ClaimProtocol::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.claim_timeout(),
        );
        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            Arc::clone(&sender),
            Arc::clone(&clock),
            config.send_interval(),
        );
        let confirmations = Arc::new(ConfirmationHandler::new(
            Arc::clone(&ledger),
            clock,
            Arc::clone(&ids),
            config.credit(),
        ));
        let (status, _) = watch::channel(RunSnapshot::idle());

        Self {
            inner: Arc::new(WorkerInner {
                store,
                ledger,
                sender,
                ids,
                config,
                claim,
                dispatcher,
                confirmations,
                active: Mutex::new(None),
                status,
            }),
        }
    }

    /// Begin a claim-and-dispatch run for `owner`.
    pub async fn start(&self, owner: OwnerId) -> Result<RunHandle, RelayError> {
        if owner.is_blank() {
            return Err(RelayError::MissingOwner);
        }

        let mut active = self.inner.active.lock().await;
        if active.is_some() {
            return Err(RelayError::AlreadyRunning);
        }

        let run_id = self.inner.ids.generate_run_id();
        let cancel = CancellationToken::new();
        *active = Some((run_id, cancel.clone()));
        self.inner
            .status
            .send_replace(RunSnapshot::started(run_id, owner.clone()));
        let snapshots = self.inner.status.subscribe();
        drop(active);

        tracing::info!(run_id = %run_id, owner = %owner, "run started");
        let inner = Arc::clone(&self.inner);
        let join = tokio::spawn(inner.run(run_id, owner, cancel.clone()));

        Ok(RunHandle {
            run_id,
            cancel,
            join,
            snapshots,
        })
    }

    /// Request cancellation of the active run. Returns `false` when idle.
    pub async fn cancel(&self) -> bool {
        match &*self.inner.active.lock().await {
            Some((run_id, token)) => {
                tracing::info!(run_id = %run_id, "cancel requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner.active.lock().await.is_some()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.inner.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.inner.status.subscribe()
    }

    /// Attach a passive observer to the live run, or to the next one started
    /// when the worker is idle or its last run has finished.
    pub fn observe(&self, observer: Arc<dyn RunObserver>) -> JoinHandle<()> {
        status::observe(self.subscribe(), observer)
    }

    pub fn confirmation_handler(&self) -> Arc<ConfirmationHandler> {
        Arc::clone(&self.inner.confirmations)
    }

    /// Spawn the confirmation listener for this worker's ledger.
    pub fn listen_confirmations(
        &self,
        confirmations: mpsc::Receiver<Confirmation>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let handler = self.confirmation_handler();
        tokio::spawn(async move { handler.listen(confirmations, shutdown).await })
    }

    /// The job at the head of the pool, without claiming it.
    pub async fn peek_next(&self) -> Result<Option<Job>, StoreError> {
        self.inner.claim.peek_next().await
    }

    pub async fn balance(&self, owner: &OwnerId) -> Result<Credits, StoreError> {
        self.inner.ledger.balance(owner).await
    }

    pub async fn outcomes(&self, owner: &OwnerId) -> Result<Vec<DeliveryOutcome>, StoreError> {
        self.inner.ledger.outcomes(owner).await
    }

    /// Jobs still in `owner`'s claimed set. Nothing recovers these automatically.
    pub async fn claimed(&self, owner: &OwnerId) -> Result<Vec<ClaimedJob>, StoreError> {
        self.inner.store.claimed(owner).await
    }
}

impl WorkerInner {
    async fn run(
        self: Arc<Self>,
        run_id: RunId,
        owner: OwnerId,
        cancel: CancellationToken,
    ) -> TerminalState {
        let terminal = self.execute(&owner, &cancel).await;

        match &terminal {
            TerminalState::Failed { reason } => {
                tracing::error!(run_id = %run_id, owner = %owner, reason = %reason, "run failed");
            }
            other => {
                tracing::info!(run_id = %run_id, owner = %owner, terminal = %other, "run finished");
            }
        }

        // 終端状態の書き込みと run slot の解放は同じロック区間で行う
        let mut active = self.active.lock().await;
        self.status.send_modify(|snapshot| {
            snapshot.phase = RunPhase::Finished {
                terminal: terminal.clone(),
            };
        });
        if matches!(&*active, Some((id, _)) if *id == run_id) {
            *active = None;
        }
        terminal
    }

    async fn execute(&self, owner: &OwnerId, cancel: &CancellationToken) -> TerminalState {
        if let Err(err) = self.sender.check_ready() {
            return TerminalState::Failed {
                reason: err.to_string(),
            };
        }

        let batch = self.claim.claim(owner, self.config.claim_batch_size).await;
        if batch.is_empty() {
            return match batch.shortfall() {
                Some(shortfall) => TerminalState::Failed {
                    reason: shortfall.to_string(),
                },
                None => TerminalState::EmptyPool,
            };
        }
        if cancel.is_cancelled() {
            return TerminalState::Cancelled { sent: 0 };
        }

        self.status.send_modify(|snapshot| {
            snapshot.phase = RunPhase::Dispatching;
            snapshot.progress = Progress::new(batch.len());
        });

        let report = self
            .dispatcher
            .dispatch(&batch, cancel, |progress| {
                self.status
                    .send_modify(|snapshot| snapshot.progress = progress);
            })
            .await;

        match report.end {
            DispatchEnd::Exhausted => TerminalState::Completed {
                sent: report.progress.sent,
            },
            DispatchEnd::Cancelled => TerminalState::Cancelled {
                sent: report.progress.sent,
            },
            DispatchEnd::Aborted(err) => TerminalState::Failed {
                reason: err.to_string(),
            },
        }
    }
}

/// Handle to one run.
#[derive(Debug)]
pub struct RunHandle {
    run_id: RunId,
    cancel: CancellationToken,
    join: JoinHandle<TerminalState>,
    snapshots: watch::Receiver<RunSnapshot>,
}

impl RunHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Stop after the in-flight send. Already-sent jobs are not rolled back.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.snapshots.clone()
    }

    /// Attach a passive observer to this run only.
    pub fn observe(&self, observer: Arc<dyn RunObserver>) -> JoinHandle<()> {
        status::observe_run(self.subscribe(), self.run_id, observer)
    }

    pub async fn wait(self) -> TerminalState {
        match self.join.await {
            Ok(terminal) => terminal,
            Err(err) => TerminalState::Failed {
                reason: format!("run task aborted: {err}"),
            },
        }
    }
}
