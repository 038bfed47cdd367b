//! Composition plan types.
//!
//! A `CompositionPlan` is the handoff from planning to rendering. Source
//! ranges are in exact media time; destination ranges are whole frames at
//! the plan's frame rate.

use serde::{Deserialize, Serialize};

use revunk_common::time::{FrameRate, MediaTime, TimeRange};

use crate::project::BeatIndex;

/// One of the two render layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Base,
    Overlay,
}

impl Layer {
    /// The layer this one ping-pongs with.
    pub fn other(self) -> Self {
        match self {
            Self::Base => Self::Overlay,
            Self::Overlay => Self::Base,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::Base => 0,
            Self::Overlay => 1,
        }
    }
}

/// Half-open frame range `[start, end)` on the destination timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: i64,
    pub end: i64,
}

impl FrameRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> i64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether two ranges share at least one frame.
    pub fn overlaps(&self, other: &FrameRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A contiguous source range placed on one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Export beat this segment renders.
    pub beat_index: BeatIndex,
    pub source: TimeRange,
    pub destination: FrameRange,
    pub layer: Layer,
}

/// A destination window where two layers cross-fade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub overlap: FrameRange,
    pub outgoing: Layer,
    pub incoming: Layer,
    /// Fade the audio streams across the overlap.
    pub audio: bool,
    /// Fade the video streams across the overlap.
    pub video: bool,
}

/// Ordered segments and transitions for one export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionPlan {
    pub frame_rate: FrameRate,
    /// Segments in destination order.
    pub segments: Vec<Segment>,
    /// Transitions in destination order.
    pub transitions: Vec<Transition>,
    /// Length of the destination timeline.
    pub duration_frames: i64,
}

impl CompositionPlan {
    /// Number of layers the plan occupies (one unless it crossfades).
    pub fn layer_count(&self) -> usize {
        self.segments
            .iter()
            .map(|segment| segment.layer.index() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Destination start of `segment` as media time.
    pub fn destination_offset(&self, segment: &Segment) -> MediaTime {
        self.frame_rate.time_for(segment.destination.start)
    }

    /// Destination duration of a frame range as media time.
    pub fn frames_to_time(&self, frames: i64) -> MediaTime {
        self.frame_rate.time_for(frames)
    }

    /// Total destination duration.
    pub fn duration(&self) -> MediaTime {
        self.frame_rate.time_for(self.duration_frames)
    }

    /// Segments placed on `layer`, in destination order.
    pub fn segments_on(&self, layer: Layer) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(move |segment| segment.layer == layer)
    }

    /// The transition whose overlap begins at `frame`, if any.
    pub fn transition_starting_at(&self, frame: i64) -> Option<&Transition> {
        self.transitions
            .iter()
            .find(|transition| transition.overlap.start == frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(beat_index: BeatIndex, start: i64, end: i64, layer: Layer) -> Segment {
        Segment {
            beat_index,
            source: TimeRange::new(MediaTime::ZERO, MediaTime::from_millis(500)),
            destination: FrameRange::new(start, end),
            layer,
        }
    }

    #[test]
    fn test_layer_ping_pong() {
        assert_eq!(Layer::Base.other(), Layer::Overlay);
        assert_eq!(Layer::Overlay.other(), Layer::Base);
    }

    #[test]
    fn test_frame_range_overlap() {
        let a = FrameRange::new(0, 15);
        assert!(a.overlaps(&FrameRange::new(10, 20)));
        assert!(!a.overlaps(&FrameRange::new(15, 30)));
        assert_eq!(a.len(), 15);
    }

    #[test]
    fn test_layer_count() {
        let mut plan = CompositionPlan {
            frame_rate: FrameRate::fps(30),
            segments: vec![segment(1, 0, 15, Layer::Base), segment(2, 15, 30, Layer::Base)],
            transitions: Vec::new(),
            duration_frames: 30,
        };
        assert_eq!(plan.layer_count(), 1);

        plan.segments[1].layer = Layer::Overlay;
        assert_eq!(plan.layer_count(), 2);
        assert_eq!(plan.segments_on(Layer::Overlay).count(), 1);
    }

    #[test]
    fn test_destination_offset_in_media_time() {
        let plan = CompositionPlan {
            frame_rate: FrameRate::fps(30),
            segments: vec![segment(3, 15, 30, Layer::Base)],
            transitions: Vec::new(),
            duration_frames: 30,
        };
        assert_eq!(
            plan.destination_offset(&plan.segments[0]),
            MediaTime::from_millis(500)
        );
        assert_eq!(plan.duration(), MediaTime::from_millis(1000));
    }
}
