//! WorkerBuilder - Worker の構築とワイヤリング
//!
//! # Fail-fast 設計
//! - store / ledger / sender のどれかが未設定なら build() で BuildError
//! - 設定値の検証（claim_batch_size >= 1 など）も build() 時に行う
//! - clock と id generator は省略可（SystemClock / UlidGenerator）

use std::sync::Arc;

use crate::config::{ConfigError, RelayConfig};
use crate::impls::InMemoryStore;
use crate::ports::{Clock, IdGenerator, Ledger, SmsSender, SystemClock, TaskStore, UlidGenerator};

use super::worker::{Worker, WorkerParts};

/// # 使用例
/// ```ignore
/// let worker = WorkerBuilder::new()
///     .in_memory(store)
///     .sender(sender)
///     .config(config)
///     .build()?;
/// ```
#[derive(Default)]
pub struct WorkerBuilder {
    store: Option<Arc<dyn TaskStore>>,
    ledger: Option<Arc<dyn Ledger>>,
    sender: Option<Arc<dyn SmsSender>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    config: RelayConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing component: {0}. Set it on the builder before build().")]
    Missing(&'static str),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

impl WorkerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Use one in-memory store as both task store and ledger.
    pub fn in_memory(self, store: Arc<InMemoryStore>) -> Self {
        self.store(store.clone()).ledger(store)
    }

    pub fn sender(mut self, sender: Arc<dyn SmsSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Worker, BuildError> {
        let store = self.store.ok_or(BuildError::Missing("task store"))?;
        let ledger = self.ledger.ok_or(BuildError::Missing("ledger"))?;
        let sender = self.sender.ok_or(BuildError::Missing("sender"))?;
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));

        Ok(Worker::from_parts(WorkerParts {
            store,
            ledger,
            sender,
            clock,
            ids,
            config: self.config,
        }))
    }
}
