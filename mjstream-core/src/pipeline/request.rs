//! One admitted frame request.

use crate::pipeline::signal::{StageCell, StageGate};
use crate::wire::Tick;

/// An admitted tick travelling through a worker's pipeline.
///
/// The `predecessor` gate observes the *globally* previous admitted
/// request's transmitted stage — not the same worker's prior frame.
/// Transmission must not begin before that gate resolves, which is
/// what serializes wire order across concurrently-finishing workers.
///
/// All three stage cells auto-fail on drop, so abandoning a request
/// (worker fault, cancellation) can never strand a successor.
#[derive(Debug)]
pub struct FrameRequest {
    pub frame_id: u64,
    /// Client animation clock at admission, milliseconds.
    pub frame_time_ms: f64,
    /// Clock-hand animation time, milliseconds.
    pub circle_time_ms: f64,

    /// The previous admitted request's transmitted gate.
    pub predecessor: StageGate,

    pub rendered: StageCell,
    pub compressed: StageCell,
    pub transmitted: StageCell,
}

impl FrameRequest {
    /// Build a request chained behind `predecessor`, returning it
    /// together with its own transmitted gate (the next link's
    /// predecessor).
    pub fn chain(tick: Tick, predecessor: StageGate) -> (Self, StageGate) {
        let (rendered, _) = StageCell::new();
        let (compressed, _) = StageCell::new();
        let (transmitted, transmitted_gate) = StageCell::new();

        (
            Self {
                frame_id: tick.frame_id,
                frame_time_ms: tick.frame_time,
                circle_time_ms: tick.circle_time,
                predecessor,
                rendered,
                compressed,
                transmitted,
            },
            transmitted_gate,
        )
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::signal::StageState;

    fn tick(id: u64) -> Tick {
        Tick {
            frame_id: id,
            frame_time: id as f64 * 16.0,
            circle_time: id as f64 * 16.0,
        }
    }

    #[tokio::test]
    async fn chain_links_transmitted_gates() {
        let (first, first_gate) = FrameRequest::chain(tick(1), StageGate::open());
        let (second, _) = FrameRequest::chain(tick(2), first_gate);

        // Second's predecessor resolves when first transmits.
        let mut pred = second.predecessor.clone();
        assert_eq!(pred.state(), StageState::Pending);
        first.transmitted.complete();
        assert_eq!(pred.wait().await, StageState::Done);
    }

    #[tokio::test]
    async fn dropped_request_releases_successor() {
        let (first, first_gate) = FrameRequest::chain(tick(1), StageGate::open());
        let (second, _) = FrameRequest::chain(tick(2), first_gate);

        drop(first); // worker died mid-frame
        let mut pred = second.predecessor.clone();
        assert_eq!(pred.wait().await, StageState::Failed);
    }
}
