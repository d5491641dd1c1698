//! Status - run の現在状態と observer への配信
//!
//! Worker は `watch` チャネルに `RunSnapshot` を書き込むだけで、誰が見ているかは知らない。
//! observer は 1 つの run だけを追いかける。進行中の run に attach した場合は
//! 最初に現在のスナップショットを受け取り、以降は変化があったときだけ通知される
//! （途中の更新はまとめられることがある）。前の run の終端状態は配信しない。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::domain::{OwnerId, Progress, RunId, RunPhase, TerminalState};
use crate::ports::RunObserver;

/// Point-in-time view of a worker's run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerId>,

    #[serde(flatten)]
    pub phase: RunPhase,

    pub progress: Progress,
}

impl RunSnapshot {
    /// Before the first run.
    pub fn idle() -> Self {
        Self {
            run_id: None,
            owner: None,
            phase: RunPhase::Idle,
            progress: Progress::default(),
        }
    }

    pub fn started(run_id: RunId, owner: OwnerId) -> Self {
        Self {
            run_id: Some(run_id),
            owner: Some(owner),
            phase: RunPhase::Claiming,
            progress: Progress::default(),
        }
    }

    pub fn terminal(&self) -> Option<&TerminalState> {
        match &self.phase {
            RunPhase::Finished { terminal } => Some(terminal),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.terminal().is_some()
    }
}

/// Feed `observer` with the next run that is live on this channel.
///
/// A finished run that is still on the channel when attaching (or an idle
/// worker) is skipped; the observer waits for the next `start`. A run that is
/// already in progress is followed from its current snapshot.
pub fn observe(
    mut snapshots: watch::Receiver<RunSnapshot>,
    observer: Arc<dyn RunObserver>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let stale = {
            let current = snapshots.borrow_and_update();
            if current.is_finished() {
                current.run_id
            } else {
                None
            }
        };
        let run_id = loop {
            let run_id = snapshots.borrow_and_update().run_id;
            match run_id {
                Some(id) if Some(id) != stale => break id,
                _ => {}
            }
            if snapshots.changed().await.is_err() {
                return;
            }
        };
        follow(snapshots, run_id, observer).await;
    })
}

/// Feed `observer` with one run's snapshots until its terminal state.
///
/// Attaching after the run finished still delivers the last progress and the
/// terminal state.
pub fn observe_run(
    snapshots: watch::Receiver<RunSnapshot>,
    run_id: RunId,
    observer: Arc<dyn RunObserver>,
) -> JoinHandle<()> {
    tokio::spawn(follow(snapshots, run_id, observer))
}

async fn follow(
    mut snapshots: watch::Receiver<RunSnapshot>,
    run_id: RunId,
    observer: Arc<dyn RunObserver>,
) {
    let mut last: Option<Progress> = None;
    loop {
        let snapshot = snapshots.borrow_and_update().clone();
        if snapshot.run_id != Some(run_id) {
            tracing::debug!(run_id = %run_id, "run superseded before observer caught up");
            break;
        }

        if last != Some(snapshot.progress) {
            observer.on_progress(snapshot.progress);
            last = Some(snapshot.progress);
        }
        if let Some(terminal) = snapshot.terminal() {
            observer.on_terminal(terminal);
            break;
        }

        if snapshots.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use ulid::Ulid;

    #[derive(Default)]
    struct Recorder {
        progress: Mutex<Vec<Progress>>,
        terminal: Mutex<Vec<TerminalState>>,
    }

    impl RunObserver for Recorder {
        fn on_progress(&self, progress: Progress) {
            self.progress.lock().unwrap().push(progress);
        }

        fn on_terminal(&self, state: &TerminalState) {
            self.terminal.lock().unwrap().push(state.clone());
        }
    }

    fn running(run_id: RunId, sent: usize, total: usize) -> RunSnapshot {
        let mut snapshot = RunSnapshot::started(run_id, OwnerId::new("U1"));
        snapshot.phase = RunPhase::Dispatching;
        snapshot.progress = Progress {
            attempted: sent,
            sent,
            failed: 0,
            total,
        };
        snapshot
    }

    #[tokio::test]
    async fn late_observer_receives_current_snapshot_first() {
        let run_id = RunId::from_ulid(Ulid::new());
        let (tx, rx) = watch::channel(running(run_id, 2, 5));
        let recorder = Arc::new(Recorder::default());

        let handle = observe(rx, recorder.clone());
        tokio::task::yield_now().await;

        let mut finished = running(run_id, 5, 5);
        finished.phase = RunPhase::Finished {
            terminal: TerminalState::Completed { sent: 5 },
        };
        tx.send(finished).unwrap();
        handle.await.unwrap();

        let progress = recorder.progress.lock().unwrap().clone();
        assert_eq!(progress.first().map(|p| p.sent), Some(2));
        assert_eq!(progress.last().map(|p| p.sent), Some(5));
        assert_eq!(
            *recorder.terminal.lock().unwrap(),
            vec![TerminalState::Completed { sent: 5 }]
        );
    }

    #[tokio::test]
    async fn observer_stops_when_worker_drops() {
        let (tx, rx) = watch::channel(RunSnapshot::idle());
        let recorder = Arc::new(Recorder::default());

        let handle = observe(rx, recorder.clone());
        drop(tx);
        handle.await.unwrap();

        assert!(recorder.terminal.lock().unwrap().is_empty());
    }

    fn finished(run_id: RunId, sent: usize) -> RunSnapshot {
        let mut snapshot = running(run_id, sent, sent);
        snapshot.phase = RunPhase::Finished {
            terminal: TerminalState::Completed { sent },
        };
        snapshot
    }

    #[tokio::test]
    async fn previous_terminal_is_skipped_until_next_run() {
        let first = RunId::from_ulid(Ulid::new());
        let second = RunId::from_ulid(Ulid::new());
        let (tx, rx) = watch::channel(finished(first, 1));
        let recorder = Arc::new(Recorder::default());

        let handle = observe(rx, recorder.clone());
        tokio::task::yield_now().await;
        assert!(recorder.terminal.lock().unwrap().is_empty());

        tx.send(running(second, 0, 3)).unwrap();
        tokio::task::yield_now().await;
        tx.send(finished(second, 3)).unwrap();
        handle.await.unwrap();

        assert_eq!(
            *recorder.terminal.lock().unwrap(),
            vec![TerminalState::Completed { sent: 3 }]
        );
    }

    #[tokio::test]
    async fn next_run_finishing_before_observer_wakes_is_still_reported() {
        let first = RunId::from_ulid(Ulid::new());
        let (tx, rx) = watch::channel(finished(first, 1));
        let recorder = Arc::new(Recorder::default());

        let handle = observe(rx, recorder.clone());
        tokio::task::yield_now().await;

        // 途中の更新はまとめられて終端だけが見える
        tx.send(finished(RunId::from_ulid(Ulid::new()), 2)).unwrap();
        handle.await.unwrap();

        assert_eq!(
            *recorder.terminal.lock().unwrap(),
            vec![TerminalState::Completed { sent: 2 }]
        );
    }

    #[tokio::test]
    async fn run_observer_attached_after_finish_gets_terminal() {
        let run_id = RunId::from_ulid(Ulid::new());
        let (_tx, rx) = watch::channel(finished(run_id, 4));
        let recorder = Arc::new(Recorder::default());

        observe_run(rx, run_id, recorder.clone()).await.unwrap();

        assert_eq!(
            *recorder.terminal.lock().unwrap(),
            vec![TerminalState::Completed { sent: 4 }]
        );
    }

    #[test]
    fn snapshot_json_is_flat() {
        let v = serde_json::to_value(running(RunId::from_ulid(Ulid::new()), 1, 3)).unwrap();
        assert_eq!(v["phase"], "dispatching");
        assert_eq!(v["owner"], "U1");
        assert_eq!(v["progress"]["sent"], 1);
    }
}
