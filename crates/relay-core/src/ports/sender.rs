//! SmsSender port - 送信プリミティブ
//!
//! `send` の成功は「transport に渡した」だけを意味します。
//! 配送結果は後から Confirmation として非同期に届きます。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{JobId, OutboundSms, SendError};

/// Returned by a successful send; ties the later confirmation to the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationToken {
    pub job_id: JobId,
    pub segments: usize,
}

#[async_trait]
pub trait SmsSender: Send + Sync {
    /// Cheap capability check (permission granted, radio available).
    ///
    /// A fatal error here fails the run before any job is claimed.
    fn check_ready(&self) -> Result<(), SendError>;

    async fn send(&self, sms: &OutboundSms) -> Result<ConfirmationToken, SendError>;
}
