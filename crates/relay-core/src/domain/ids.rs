//! Domain identifiers (strongly-typed IDs).
//!
//! ULID ベースの ID を Phantom type パターンで型付けしています。
//! - **時刻でソート可能**: 生成順 = 辞書順なので、pool の挿入順序キーとしてそのまま使える
//! - **分散生成可能**: 複数の worker インスタンスが調整なしで生成できる
//!
//! `OwnerId` だけは外部（アカウント側）から与えられる文字列なので ULID ではありません。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"job-", "run-", "outcome-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// `T` は PhantomData で、実行時にはメモリを消費しませんが、
/// コンパイル時に型安全性を提供します（JobId と RunId は混同できない）。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Job {}

impl IdMarker for Job {
    fn prefix() -> &'static str {
        "job-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Run {}

impl IdMarker for Run {
    fn prefix() -> &'static str {
        "run-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Outcome {}

impl IdMarker for Outcome {
    fn prefix() -> &'static str {
        "outcome-"
    }
}

/// Identifier of a message job (store-assigned).
pub type JobId = Id<Job>;

/// Identifier of one claim+dispatch run of a worker.
pub type RunId = Id<Run>;

/// Identifier of a delivery log entry.
pub type OutcomeId = Id<Outcome>;

/// Identifier of the user a job is claimed for (the account key, e.g. a mobile number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blank owners are rejected at `start` time.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let ulid1 = Ulid::new();
        let ulid2 = Ulid::new();
        let ulid3 = Ulid::new();

        let job = JobId::from_ulid(ulid1);
        let run = RunId::from_ulid(ulid2);
        let outcome = OutcomeId::from_ulid(ulid3);

        assert_eq!(job.as_ulid(), ulid1);
        assert_eq!(run.as_ulid(), ulid2);
        assert_eq!(outcome.as_ulid(), ulid3);

        assert!(job.to_string().starts_with("job-"));
        assert!(run.to_string().starts_with("run-"));
        assert!(outcome.to_string().starts_with("outcome-"));
    }

    #[test]
    fn ulid_ids_are_sortable() {
        let id1 = JobId::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = JobId::from_ulid(Ulid::new());

        assert!(id1 < id2);
    }

    #[test]
    fn job_id_serializes_without_prefix() {
        let job_id = JobId::from_ulid(Ulid::new());

        let serialized = serde_json::to_string(&job_id).unwrap();
        let deserialized: JobId = serde_json::from_str(&serialized).unwrap();

        assert_eq!(job_id, deserialized);
        assert!(!serialized.contains("job-"));
    }

    #[test]
    fn blank_owner_is_detected() {
        assert!(OwnerId::new("").is_blank());
        assert!(OwnerId::new("   ").is_blank());
        assert!(!OwnerId::new("9000000001").is_blank());
        assert_eq!(serde_json::to_string(&OwnerId::new("U1")).unwrap(), "\"U1\"");
    }
}
