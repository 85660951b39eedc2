//! Stage completion gates.
//!
//! Each pipeline stage of a frame owns a [`StageCell`] that it resolves
//! exactly once; any number of [`StageGate`]s can await the outcome.
//! The cell is built on a `watch` channel, so waiting never consumes
//! the result and late subscribers see terminal states immediately.
//!
//! Dropping a cell that was never resolved broadcasts [`StageState::Failed`].
//! That is the property the ordering chain relies on: a worker that
//! faults or dies mid-frame *releases* every successor waiting on its
//! transmitted gate instead of hanging them forever.

use tokio::sync::watch;

/// Outcome of one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Pending,
    Done,
    Failed,
}

// ── StageCell ────────────────────────────────────────────────────

/// Resolving half of a stage gate. Not cloneable: exactly one owner
/// resolves the stage.
#[derive(Debug)]
pub struct StageCell {
    tx: watch::Sender<StageState>,
}

impl StageCell {
    /// A fresh pending stage and a gate observing it.
    pub fn new() -> (Self, StageGate) {
        let (tx, rx) = watch::channel(StageState::Pending);
        (Self { tx }, StageGate { rx })
    }

    /// Mark the stage completed. No-op if already resolved.
    pub fn complete(&self) {
        self.resolve(StageState::Done);
    }

    /// Mark the stage failed. No-op if already resolved.
    pub fn fail(&self) {
        self.resolve(StageState::Failed);
    }

    /// A gate observing this cell.
    pub fn gate(&self) -> StageGate {
        StageGate {
            rx: self.tx.subscribe(),
        }
    }

    fn resolve(&self, terminal: StageState) {
        // First terminal state wins.
        self.tx.send_if_modified(|state| {
            if *state == StageState::Pending {
                *state = terminal;
                true
            } else {
                false
            }
        });
    }
}

impl Drop for StageCell {
    fn drop(&mut self) {
        // An abandoned stage counts as failed so waiters are released.
        self.resolve(StageState::Failed);
    }
}

// ── StageGate ────────────────────────────────────────────────────

/// Awaitable view of a stage outcome.
#[derive(Debug, Clone)]
pub struct StageGate {
    rx: watch::Receiver<StageState>,
}

impl StageGate {
    /// A gate that is already [`StageState::Done`] — seeds the head of
    /// the ordering chain.
    pub fn open() -> Self {
        let (tx, rx) = watch::channel(StageState::Done);
        // Keep the channel alive without a cell; receivers of a dropped
        // sender still observe the last value.
        drop(tx);
        Self { rx }
    }

    /// Wait until the stage resolves and return the terminal state.
    pub async fn wait(&mut self) -> StageState {
        let state = *self.rx.borrow();
        if state != StageState::Pending {
            return state;
        }
        match self.rx.wait_for(|s| *s != StageState::Pending).await {
            Ok(state) => *state,
            // Sender dropped without resolving: Drop marks Failed first,
            // so this arm is unreachable in practice; treat as failed.
            Err(_) => StageState::Failed,
        }
    }

    /// Current state without waiting.
    pub fn state(&self) -> StageState {
        *self.rx.borrow()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_releases_waiter() {
        let (cell, mut gate) = StageCell::new();
        let waiter = tokio::spawn(async move { gate.wait().await });
        tokio::task::yield_now().await;
        cell.complete();
        assert_eq!(waiter.await.unwrap(), StageState::Done);
    }

    #[tokio::test]
    async fn first_resolution_wins() {
        let (cell, mut gate) = StageCell::new();
        cell.fail();
        cell.complete();
        assert_eq!(gate.wait().await, StageState::Failed);
    }

    #[tokio::test]
    async fn dropping_unresolved_cell_fails_the_stage() {
        let (cell, mut gate) = StageCell::new();
        drop(cell);
        assert_eq!(gate.wait().await, StageState::Failed);
    }

    #[tokio::test]
    async fn dropping_completed_cell_keeps_done() {
        let (cell, mut gate) = StageCell::new();
        cell.complete();
        drop(cell);
        assert_eq!(gate.wait().await, StageState::Done);
    }

    #[tokio::test]
    async fn open_gate_is_immediately_done() {
        let mut gate = StageGate::open();
        assert_eq!(gate.state(), StageState::Done);
        assert_eq!(gate.wait().await, StageState::Done);
    }

    #[tokio::test]
    async fn late_subscriber_sees_terminal_state() {
        let (cell, _gate) = StageCell::new();
        cell.complete();
        let mut late = cell.gate();
        assert_eq!(late.wait().await, StageState::Done);
    }
}
