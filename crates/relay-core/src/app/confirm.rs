//! ConfirmationHandler - 配送確認を ledger に反映する
//!
//! 確認は run とは独立に、いつ・何回届いてもよい。冪等性は ledger 側
//! （claimed record の状態）で保証されるので、ここでは outcome を組み立てて
//! `Ledger::settle` に渡すだけ。
//!
//! 連続失敗は handler インスタンスごとに数える（プロセス全体の static にはしない）。

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::{Confirmation, Credits, DeliveryOutcome, Settlement, StoreError};
use crate::ports::{Clock, IdGenerator, Ledger};

/// Shown to the operator once delivery has failed twice in a row.
pub const REPEATED_FAILURE_HINT: &str = "Please check your SIM plan, active balance and network.";

const HINT_AFTER_FAILURES: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationReport {
    pub settlement: Settlement,

    /// The log entry, if the settlement appended one.
    pub outcome: Option<DeliveryOutcome>,

    pub failure_streak: u32,
    pub hint: Option<&'static str>,
}

pub struct ConfirmationHandler {
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    credit: Credits,
    failure_streak: AtomicU32,
}

impl ConfirmationHandler {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        credit: Credits,
    ) -> Self {
        Self {
            ledger,
            clock,
            ids,
            credit,
            failure_streak: AtomicU32::new(0),
        }
    }

    pub async fn handle(
        &self,
        confirmation: Confirmation,
    ) -> Result<ConfirmationReport, StoreError> {
        let outcome = DeliveryOutcome::from_confirmation(
            self.ids.generate_outcome_id(),
            &confirmation,
            self.clock.now(),
        );
        let settlement = self.ledger.settle(outcome.clone(), self.credit).await?;

        let failure_streak = match settlement {
            Settlement::Credited { balance } => {
                tracing::info!(
                    job_id = %confirmation.job_id,
                    owner = %confirmation.owner,
                    balance = %balance,
                    "delivery confirmed"
                );
                self.failure_streak.store(0, Ordering::SeqCst);
                0
            }
            Settlement::RecordedFailure => {
                let streak = self.failure_streak.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::warn!(
                    job_id = %confirmation.job_id,
                    owner = %confirmation.owner,
                    result = ?confirmation.result,
                    streak,
                    "delivery failed"
                );
                streak
            }
            Settlement::AlreadySettled => {
                tracing::debug!(job_id = %confirmation.job_id, "duplicate confirmation ignored");
                self.failure_streak.load(Ordering::SeqCst)
            }
            Settlement::UnknownJob => {
                tracing::warn!(
                    job_id = %confirmation.job_id,
                    owner = %confirmation.owner,
                    "confirmation for a job this owner never claimed"
                );
                self.failure_streak.load(Ordering::SeqCst)
            }
        };

        let hint = (settlement == Settlement::RecordedFailure
            && failure_streak >= HINT_AFTER_FAILURES)
            .then_some(REPEATED_FAILURE_HINT);

        Ok(ConfirmationReport {
            settlement,
            outcome: settlement.is_applied().then_some(outcome),
            failure_streak,
            hint,
        })
    }

    /// Current consecutive delivery failures.
    pub fn failure_streak(&self) -> u32 {
        self.failure_streak.load(Ordering::SeqCst)
    }

    /// Drain confirmations until the channel closes or `shutdown` fires.
    ///
    /// A store error on one confirmation is logged and the loop keeps going.
    pub async fn listen(
        &self,
        mut confirmations: mpsc::Receiver<Confirmation>,
        shutdown: CancellationToken,
    ) {
        loop {
            let confirmation = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = confirmations.recv() => match next {
                    Some(confirmation) => confirmation,
                    None => break,
                },
            };

            let job_id = confirmation.job_id;
            match self.handle(confirmation).await {
                Ok(report) => {
                    if let Some(hint) = report.hint {
                        tracing::warn!(streak = report.failure_streak, "{hint}");
                    }
                }
                Err(err) => {
                    tracing::error!(
                        job_id = %job_id,
                        error = %err,
                        "failed to settle confirmation"
                    );
                }
            }
        }
        tracing::debug!("confirmation listener stopped");
    }
}
