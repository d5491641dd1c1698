//! State - claimed job の状態
//!
//! # 状態遷移
//! - pool → Claimed（claim トランザクション）
//! - Claimed → Sent（dispatch loop が送信成功時に記録）
//! - Claimed/Sent → 削除（delivered 確認: balance 加算と同一トランザクション）
//! - Claimed/Sent → Failed（failed 確認: 記録は残して調査用にする）

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimState {
    /// Moved out of the shared pool, not yet handed to the transport.
    Claimed,

    /// Handed to the transport; waiting for a delivery confirmation.
    Sent,

    /// Delivery confirmed as failed. Kept for inspection.
    Failed,
}

impl ClaimState {
    /// Can a delivery confirmation still settle this record?
    ///
    /// `Claimed` is accepted too: the confirmation may race ahead of the `sent` mark.
    pub fn is_settleable(self) -> bool {
        matches!(self, ClaimState::Claimed | ClaimState::Sent)
    }
}
