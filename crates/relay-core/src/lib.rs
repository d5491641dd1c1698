//! relay-core
//!
//! Core building blocks for the SMS relay worker: claim jobs from a shared
//! pool, send them at a fixed pace and settle delivery confirmations into a
//! per-owner balance.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, job, claim state, message, outcome, balance, progress, errors）
//! - **ports**: 抽象化レイヤー（TaskStore, Ledger, SmsSender, RunObserver, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（builder, worker, claim, dispatch, confirm, status）
//! - **impls**: 実装（InMemoryStore, SimulatedSender, TracingObserver など開発用）
//! - **config**: RelayConfig（TOML + 既定値）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
