//! App - アプリケーション層
//!
//! ports を組み合わせて claim → dispatch → confirm の流れを実装します。
//!
//! # 主要コンポーネント
//! - **WorkerBuilder**: Worker の構築とワイヤリング（fail-fast）
//! - **Worker / RunHandle**: run の開始・キャンセル・状態
//! - **ClaimProtocol**: 共有プールからの atomic な batch claim
//! - **Dispatcher**: レート制限付きの順次送信
//! - **ConfirmationHandler**: 配送確認の冪等な反映
//! - **status**: RunSnapshot と observer への配信

pub mod builder;
pub mod claim;
pub mod confirm;
pub mod dispatch;
pub mod status;
pub mod worker;

pub use self::builder::{BuildError, WorkerBuilder};
pub use self::claim::ClaimProtocol;
pub use self::confirm::{ConfirmationHandler, ConfirmationReport, REPEATED_FAILURE_HINT};
pub use self::dispatch::{DispatchEnd, DispatchReport, Dispatcher};
pub use self::status::{RunSnapshot, observe};
pub use self::worker::{RunHandle, Worker};
