//! RunObserver port - 進捗の受動的な購読者（UI や log sink）
//!
//! Observer はコア状態を一切変更しない。dispatch loop からは切り離されていて、
//! 途中で attach/detach しても run に影響しない（`app::status::observe` 参照）。

use crate::domain::{Progress, TerminalState};

pub trait RunObserver: Send + Sync {
    fn on_progress(&self, progress: Progress);

    fn on_terminal(&self, state: &TerminalState);
}
