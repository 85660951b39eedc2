//! Client-side frame reassembly.
//!
//! Tile segments of different frames decode concurrently and can finish
//! in any order. The [`JitterBuffer`] groups arrivals by frame id and
//! reports a terminal event per frame exactly once: completed when the
//! fourth tile lands, failed on the first decode error, superseded when
//! a frame resolves after a newer one has already been displayed.
//!
//! Entries are accounted to the last arrival: a failed frame's entry
//! stays (marked) until all of its tiles have been seen, then is
//! purged, so late tiles of a dead frame are discarded silently rather
//! than resurrecting it. Entries whose remaining tiles will never come
//! are dropped once the display watermark moves past them.

use std::collections::HashMap;

use image::RgbImage;
use tracing::debug;

use crate::error::StreamError;
use crate::spec::SEGMENTS_PER_FRAME;
use crate::wire::SegmentHeader;

/// One decoded tile with the header that positions it.
#[derive(Debug, Clone)]
pub struct DecodedSegment {
    pub header: SegmentHeader,
    pub bitmap: RgbImage,
}

/// Terminal outcome of one frame's reassembly.
#[derive(Debug)]
pub enum JitterEvent {
    /// All tiles arrived; `segments` position themselves via
    /// `segment_x`/`segment_y`.
    Completed {
        frame_id: u64,
        segments: Vec<DecodedSegment>,
    },
    /// At least one tile failed to decode. Reported once per frame.
    Failed { frame_id: u64 },
    /// The frame resolved, but a newer frame was already displayed.
    Superseded { frame_id: u64 },
}

// ── JitterBuffer ─────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Entry {
    /// Arrivals still expected, successes and failures alike.
    pending: usize,
    segments: Vec<DecodedSegment>,
    failed: bool,
}

/// Reorders per-tile decode results into whole-frame events.
#[derive(Debug, Default)]
pub struct JitterBuffer {
    entries: HashMap<u64, Entry>,
    last_displayed: Option<u64>,
}

impl JitterBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames currently mid-reassembly.
    pub fn open_frames(&self) -> usize {
        self.entries.len()
    }

    /// Record that a frame was handed to the display. Frames at or
    /// below this id will resolve as superseded from now on.
    ///
    /// Entries behind the watermark are purged here: a frame whose
    /// remaining tiles were never sent (transmit failed mid-frame)
    /// would otherwise sit in the map forever waiting for them.
    pub fn mark_displayed(&mut self, frame_id: u64) {
        if self.last_displayed.is_none_or(|d| frame_id > d) {
            self.last_displayed = Some(frame_id);
            self.entries.retain(|&id, _| id > frame_id);
        }
    }

    /// Feed one tile's decode result. Returns the frame's terminal
    /// event if this arrival resolved it, `None` otherwise.
    pub fn on_segment(
        &mut self,
        frame_id: u64,
        segment: Result<DecodedSegment, StreamError>,
    ) -> Option<JitterEvent> {
        let entry = self.entries.entry(frame_id).or_insert_with(|| Entry {
            pending: SEGMENTS_PER_FRAME,
            segments: Vec::with_capacity(SEGMENTS_PER_FRAME),
            failed: false,
        });
        entry.pending -= 1;

        let event = match segment {
            Ok(segment) if !entry.failed => {
                entry.segments.push(segment);
                if entry.segments.len() == SEGMENTS_PER_FRAME {
                    let segments = std::mem::take(&mut entry.segments);
                    Some(self.terminal(frame_id, JitterEvent::Completed { frame_id, segments }))
                } else {
                    None
                }
            }
            // A tile of an already-failed frame: discard quietly.
            Ok(_) => None,
            Err(error) => {
                debug!(frame = frame_id, %error, "tile decode failed");
                if entry.failed {
                    None
                } else {
                    entry.failed = true;
                    entry.segments.clear();
                    Some(self.terminal(frame_id, JitterEvent::Failed { frame_id }))
                }
            }
        };

        // Purge once every tile of the frame is accounted for.
        if self.entries.get(&frame_id).is_some_and(|e| e.pending == 0) {
            self.entries.remove(&frame_id);
        }
        event
    }

    /// Downgrade a terminal event to `Superseded` when the display has
    /// moved past this frame.
    fn terminal(&self, frame_id: u64, event: JitterEvent) -> JitterEvent {
        if self.last_displayed.is_some_and(|d| frame_id <= d) {
            JitterEvent::Superseded { frame_id }
        } else {
            event
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(index: usize) -> DecodedSegment {
        DecodedSegment {
            header: SegmentHeader {
                segment_x: (index as f64) * 10.0,
                segment_y: 0.0,
                ..Default::default()
            },
            bitmap: RgbImage::new(4, 4),
        }
    }

    #[test]
    fn completes_on_fourth_tile_out_of_order() {
        let mut buffer = JitterBuffer::new();

        for index in [2usize, 0, 3] {
            assert!(buffer.on_segment(7, Ok(segment(index))).is_none());
        }
        match buffer.on_segment(7, Ok(segment(1))) {
            Some(JitterEvent::Completed { frame_id, segments }) => {
                assert_eq!(frame_id, 7);
                assert_eq!(segments.len(), SEGMENTS_PER_FRAME);
            }
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(buffer.open_frames(), 0);
    }

    #[test]
    fn interleaved_frames_complete_independently() {
        let mut buffer = JitterBuffer::new();

        for index in 0..3 {
            assert!(buffer.on_segment(1, Ok(segment(index))).is_none());
            assert!(buffer.on_segment(2, Ok(segment(index))).is_none());
        }
        assert!(matches!(
            buffer.on_segment(2, Ok(segment(3))),
            Some(JitterEvent::Completed { frame_id: 2, .. })
        ));
        assert!(matches!(
            buffer.on_segment(1, Ok(segment(3))),
            Some(JitterEvent::Completed { frame_id: 1, .. })
        ));
    }

    #[test]
    fn failure_reported_exactly_once() {
        let mut buffer = JitterBuffer::new();

        assert!(buffer.on_segment(3, Ok(segment(0))).is_none());
        assert!(matches!(
            buffer.on_segment(3, Err(StreamError::Codec("bad tile".into()))),
            Some(JitterEvent::Failed { frame_id: 3 })
        ));
        // Remaining tiles, success or failure, stay silent.
        assert!(buffer.on_segment(3, Ok(segment(2))).is_none());
        assert!(
            buffer
                .on_segment(3, Err(StreamError::Codec("bad tile".into())))
                .is_none()
        );

        // All four arrivals accounted: the entry is gone and the id is
        // free for reuse.
        assert_eq!(buffer.open_frames(), 0);
        for index in 0..3 {
            assert!(buffer.on_segment(3, Ok(segment(index))).is_none());
        }
        assert!(matches!(
            buffer.on_segment(3, Ok(segment(3))),
            Some(JitterEvent::Completed { frame_id: 3, .. })
        ));
    }

    #[test]
    fn late_completion_is_superseded() {
        let mut buffer = JitterBuffer::new();
        buffer.mark_displayed(5);

        for index in 0..3 {
            assert!(buffer.on_segment(4, Ok(segment(index))).is_none());
        }
        assert!(matches!(
            buffer.on_segment(4, Ok(segment(3))),
            Some(JitterEvent::Superseded { frame_id: 4 })
        ));

        // A newer frame still completes normally.
        for index in 0..3 {
            assert!(buffer.on_segment(6, Ok(segment(index))).is_none());
        }
        assert!(matches!(
            buffer.on_segment(6, Ok(segment(3))),
            Some(JitterEvent::Completed { frame_id: 6, .. })
        ));
    }

    #[test]
    fn stale_partial_entries_are_purged_on_display() {
        let mut buffer = JitterBuffer::new();

        // Frame 1 loses its last two tiles server-side; they will
        // never arrive.
        buffer.on_segment(1, Ok(segment(0)));
        buffer.on_segment(1, Ok(segment(1)));
        assert_eq!(buffer.open_frames(), 1);

        // Later frames complete and display normally; the orphaned
        // entry must not outlive the watermark passing it.
        for id in 2..=50u64 {
            for index in 0..3 {
                assert!(buffer.on_segment(id, Ok(segment(index))).is_none());
            }
            assert!(matches!(
                buffer.on_segment(id, Ok(segment(3))),
                Some(JitterEvent::Completed { .. })
            ));
            buffer.mark_displayed(id);
        }
        assert_eq!(buffer.open_frames(), 0, "stale partial entry leaked");
    }

    #[test]
    fn displayed_watermark_never_regresses() {
        let mut buffer = JitterBuffer::new();
        buffer.mark_displayed(9);
        buffer.mark_displayed(4);

        for index in 0..3 {
            buffer.on_segment(9, Ok(segment(index)));
        }
        assert!(matches!(
            buffer.on_segment(9, Ok(segment(3))),
            Some(JitterEvent::Superseded { frame_id: 9 })
        ));
    }
}
