//! Project description types.
//!
//! A `ProjectDescription` is what one edit script says: which clip to cut,
//! how its beats are laid out in time, and which beats to export in what
//! order. It is built once per parse and read-only afterwards.

use serde::{Deserialize, Serialize};

use revunk_common::error::{RevunkError, RevunkResult};
use revunk_common::time::MediaTime;

/// 1-based ordinal position in the source clip's tempo grid.
pub type BeatIndex = u32;

/// The parsed edit script.
///
/// Required fields are optional here: the parser is permissive and
/// validation happens when something needs them (see [`Self::timing`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectDescription {
    /// Path or identifier of the source clip (`video:`).
    pub source_reference: Option<String>,

    /// Base tempo in beats per minute (`bpm:`).
    pub base_tempo_bpm: Option<f64>,

    /// Time of beat 1 absent other anchors (`downbeat:`).
    pub downbeat_time: Option<MediaTime>,

    /// Constant shift applied to every resolved beat time (`offset:`).
    pub time_offset: Option<MediaTime>,

    /// Beat anchors in declaration order.
    pub anchors: Vec<Anchor>,

    /// Tempo changes in declaration order.
    pub tempo_changes: Vec<TempoChange>,

    /// Crossfade policy used by `x`-marked export entries.
    pub default_crossfade: Option<CrossfadePolicy>,

    /// Beats to render, in render order. Repeats and reordering are legal.
    pub export_beats: Vec<BeatEdit>,
}

/// A declared correspondence between a beat and a source-clip time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub beat_index: BeatIndex,
    pub kind: AnchorKind,
}

/// How an anchor pins its beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "time", rename_all = "snake_case")]
pub enum AnchorKind {
    /// The beat lands exactly at this time.
    Absolute(MediaTime),
    /// The tempo-computed time plus this delta.
    Relative(MediaTime),
}

/// Tempo in force from `beat_index` until superseded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoChange {
    pub beat_index: BeatIndex,
    pub bpm: f64,
}

/// Merged `crossfade:` section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossfadePolicy {
    pub duration_secs: f64,
    pub applies_to_audio: bool,
    pub applies_to_video: bool,
}

/// How an export entry joins the entry after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BeatTransition {
    #[default]
    Cut,
    Crossfade,
}

/// One entry of the export list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatEdit {
    pub beat_index: BeatIndex,
    /// Join to the *next* entry.
    pub transition: BeatTransition,
}

impl BeatEdit {
    pub fn cut(beat_index: BeatIndex) -> Self {
        Self {
            beat_index,
            transition: BeatTransition::Cut,
        }
    }

    pub fn crossfade(beat_index: BeatIndex) -> Self {
        Self {
            beat_index,
            transition: BeatTransition::Crossfade,
        }
    }
}

/// The fields a beat timing solver cannot do without.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingFields {
    pub base_tempo_bpm: f64,
    pub downbeat_time: MediaTime,
    pub time_offset: MediaTime,
}

impl ProjectDescription {
    /// Tempo and downbeat, or `MissingField` naming the first one absent.
    pub fn timing(&self) -> RevunkResult<TimingFields> {
        let base_tempo_bpm = self
            .base_tempo_bpm
            .ok_or_else(|| RevunkError::missing_field("bpm"))?;
        let downbeat_time = self
            .downbeat_time
            .ok_or_else(|| RevunkError::missing_field("downbeat"))?;
        Ok(TimingFields {
            base_tempo_bpm,
            downbeat_time,
            time_offset: self.time_offset.unwrap_or(MediaTime::ZERO),
        })
    }

    /// The source reference, or `MissingField("video")`.
    pub fn source(&self) -> RevunkResult<&str> {
        self.source_reference
            .as_deref()
            .ok_or_else(|| RevunkError::missing_field("video"))
    }

    /// Whether any export entry asks for a crossfade.
    pub fn has_crossfades(&self) -> bool {
        self.export_beats
            .iter()
            .any(|edit| edit.transition == BeatTransition::Crossfade)
    }
}
