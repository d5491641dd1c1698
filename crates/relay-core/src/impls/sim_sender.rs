//! SimulatedSender - 開発用の送信プリミティブ
//!
//! 本物の transport の代わりに、送信を記録して一定時間後に Confirmation を
//! チャネルへ流します。配送結果は `DeliveryPlan` で決めます。

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use crate::domain::{Confirmation, OutboundSms, ResultCode, SendError};
use crate::ports::{ConfirmationToken, SmsSender};

/// Which deliveries the simulated network confirms as failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryPlan {
    DeliverAll,
    FailAll,
    /// Every n-th send (1-based) fails delivery.
    FailEvery(usize),
}

impl DeliveryPlan {
    fn result_for(&self, nth: usize) -> ResultCode {
        let failed = match self {
            DeliveryPlan::DeliverAll => false,
            DeliveryPlan::FailAll => true,
            DeliveryPlan::FailEvery(n) => *n > 0 && nth % n == 0,
        };
        if failed {
            ResultCode::GenericFailure
        } else {
            ResultCode::Ok
        }
    }
}

pub struct SimulatedSender {
    confirmations: mpsc::Sender<Confirmation>,
    plan: DeliveryPlan,
    confirm_after: Duration,
    redeliver: bool,
    permission: AtomicBool,
    rejected: HashSet<String>,
    sends: AtomicUsize,
    sent: Mutex<Vec<OutboundSms>>,
}

impl SimulatedSender {
    pub fn new(confirmations: mpsc::Sender<Confirmation>) -> Self {
        Self {
            confirmations,
            plan: DeliveryPlan::DeliverAll,
            confirm_after: Duration::from_millis(200),
            redeliver: false,
            permission: AtomicBool::new(true),
            rejected: HashSet::new(),
            sends: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn with_plan(mut self, plan: DeliveryPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_confirm_after(mut self, delay: Duration) -> Self {
        self.confirm_after = delay;
        self
    }

    /// Emit every confirmation twice, as some transports do.
    pub fn with_redelivery(mut self) -> Self {
        self.redeliver = true;
        self
    }

    /// The transport refuses this destination synchronously.
    pub fn reject_destination(mut self, destination: impl Into<String>) -> Self {
        self.rejected.insert(destination.into());
        self
    }

    pub fn set_permission(&self, granted: bool) {
        self.permission.store(granted, Ordering::SeqCst);
    }

    /// Number of `send` calls, including ones that failed locally.
    pub fn send_calls(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    /// Messages accepted by the transport, in send order.
    pub async fn sent(&self) -> Vec<OutboundSms> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl SmsSender for SimulatedSender {
    fn check_ready(&self) -> Result<(), SendError> {
        if self.permission.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SendError::PermissionDenied)
        }
    }

    async fn send(&self, sms: &OutboundSms) -> Result<ConfirmationToken, SendError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        self.check_ready()?;
        if self.rejected.contains(&sms.destination) {
            return Err(SendError::Rejected(format!(
                "destination {} refused",
                sms.destination
            )));
        }

        let nth = {
            let mut sent = self.sent.lock().await;
            sent.push(sms.clone());
            sent.len()
        };

        let confirmation = Confirmation {
            job_id: sms.job_id,
            owner: sms.owner.clone(),
            destination: sms.destination.clone(),
            result: self.plan.result_for(nth),
        };
        let copies = if self.redeliver { 2 } else { 1 };
        let tx = self.confirmations.clone();
        let delay = self.confirm_after;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            for _ in 0..copies {
                if tx.send(confirmation.clone()).await.is_err() {
                    tracing::debug!(job_id = %confirmation.job_id, "confirmation channel closed");
                    break;
                }
            }
        });

        Ok(ConfirmationToken {
            job_id: sms.job_id,
            segments: sms.segments().len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobId, OwnerId};
    use ulid::Ulid;

    fn sms(destination: &str) -> OutboundSms {
        OutboundSms {
            job_id: JobId::from_ulid(Ulid::new()),
            owner: OwnerId::new("U1"),
            destination: destination.to_string(),
            payload: "x".repeat(200),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn confirms_asynchronously_with_plan_result() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = SimulatedSender::new(tx).with_plan(DeliveryPlan::FailEvery(2));

        let first = sms("9000000001");
        let second = sms("9000000002");
        let token = sender.send(&first).await.unwrap();
        sender.send(&second).await.unwrap();
        assert_eq!(token.segments, 2);

        let mut confirmations = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        confirmations.sort_by_key(|c| c.destination.clone());
        assert_eq!(confirmations[0].job_id, first.job_id);
        assert_eq!(confirmations[0].result, ResultCode::Ok);
        assert_eq!(confirmations[1].job_id, second.job_id);
        assert_eq!(confirmations[1].result, ResultCode::GenericFailure);
    }

    #[tokio::test(start_paused = true)]
    async fn redelivery_emits_duplicate_confirmations() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = SimulatedSender::new(tx).with_redelivery();

        let sms = sms("9000000001");
        sender.send(&sms).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().job_id, sms.job_id);
        assert_eq!(rx.recv().await.unwrap().job_id, sms.job_id);
    }

    #[tokio::test]
    async fn local_errors_do_not_confirm() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = SimulatedSender::new(tx).reject_destination("9000000009");

        let err = sender.send(&sms("9000000009")).await.unwrap_err();
        assert!(matches!(err, SendError::Rejected(_)));

        sender.set_permission(false);
        assert_eq!(sender.check_ready(), Err(SendError::PermissionDenied));
        assert_eq!(
            sender.send(&sms("9000000001")).await.unwrap_err(),
            SendError::PermissionDenied
        );

        assert_eq!(sender.send_calls(), 2);
        assert!(sender.sent().await.is_empty());
        drop(sender);
        assert!(rx.recv().await.is_none());
    }
}
