//! Ledger port - balance と delivery log
//!
//! `settle` は「balance 加算・claimed record の削除/failed 化・log 追記」を
//! 1 トランザクションで行う。冪等性（同じ job の確認が 2 回届いても二重加算しない）は
//! claimed record の状態で判定するので、ストア側の責務です。

use async_trait::async_trait;

use crate::domain::{Credits, DeliveryOutcome, OwnerId, Settlement, StoreError};

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Apply one delivery outcome atomically.
    ///
    /// - `Delivered` on a settleable record: credit `credit`, delete the record, append `outcome`.
    /// - `Failed` on a settleable record: mark it failed, append `outcome`.
    /// - Anything else: no change (`AlreadySettled` / `UnknownJob`).
    async fn settle(
        &self,
        outcome: DeliveryOutcome,
        credit: Credits,
    ) -> Result<Settlement, StoreError>;

    async fn balance(&self, owner: &OwnerId) -> Result<Credits, StoreError>;

    /// The owner's delivery log, in append order.
    async fn outcomes(&self, owner: &OwnerId) -> Result<Vec<DeliveryOutcome>, StoreError>;
}
