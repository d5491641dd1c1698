//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。外部システム（共有ドキュメントストア、
//! SMS transport、UI）へのインターフェースを trait として定義します。

pub mod clock;
pub mod id_generator;
pub mod ledger;
pub mod observer;
pub mod sender;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::ledger::Ledger;
pub use self::observer::RunObserver;
pub use self::sender::{ConfirmationToken, SmsSender};
pub use self::task_store::{DOCS_PER_CLAIM, TaskStore};
