//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryStore**: TaskStore + Ledger
//! - **SimulatedSender**: 遅延付きで Confirmation を返す送信プリミティブ
//! - **TracingObserver**: 進捗を tracing に流す RunObserver

pub mod inmem_store;
pub mod sim_sender;
pub mod tracing_observer;

pub use self::inmem_store::InMemoryStore;
pub use self::sim_sender::{DeliveryPlan, SimulatedSender};
pub use self::tracing_observer::TracingObserver;
