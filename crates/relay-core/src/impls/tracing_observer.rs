//! TracingObserver - 進捗をログに流す observer（通知テキスト "Sent n/total" の代わり）

use crate::domain::{Progress, TerminalState};
use crate::ports::RunObserver;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RunObserver for TracingObserver {
    fn on_progress(&self, progress: Progress) {
        tracing::info!(
            sent = progress.sent,
            failed = progress.failed,
            total = progress.total,
            "{progress}"
        );
    }

    fn on_terminal(&self, state: &TerminalState) {
        match state {
            TerminalState::Failed { reason } => tracing::error!(reason = %reason, "run failed"),
            TerminalState::EmptyPool => tracing::info!("no jobs available"),
            other => tracing::info!(terminal = %other, "run finished"),
        }
    }
}
