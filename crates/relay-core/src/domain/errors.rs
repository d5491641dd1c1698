//! Errors - エラー型と分類
//!
//! - `StoreError`: 共有ストアの障害（タイムアウト・不可用・トランザクション制限）
//! - `SendError`: 送信プリミティブのローカルエラー（配送失敗ではない）
//! - `RelayError`: run 制御面（start/cancel）が返すエラー

use thiserror::Error;

use super::ids::JobId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("transaction would touch {touched} documents, limit is {limit}")]
    TransactionTooLarge { touched: usize, limit: usize },

    #[error("job not found: {0}")]
    NotFound(JobId),
}

/// Local failure raised synchronously by the send primitive.
///
/// A delivery failure is *not* a `SendError`; it arrives later as a confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("send permission denied")]
    PermissionDenied,

    #[error("send capability unavailable: {0}")]
    Unavailable(String),

    #[error("malformed destination: {0:?}")]
    MalformedDestination(String),

    #[error("empty payload")]
    EmptyPayload,

    #[error("transport rejected message: {0}")]
    Rejected(String),
}

impl SendError {
    /// Fatal errors mean no job in the batch can be sent; the run fails fast.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SendError::PermissionDenied | SendError::Unavailable(_))
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("owner id is empty")]
    MissingOwner,

    #[error("a run is already active on this worker")]
    AlreadyRunning,
}
