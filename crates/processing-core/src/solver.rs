//! Beat timing solver: beat index to source-clip time.
//!
//! # Algorithm
//!
//! 1. An anchor declared at the queried beat wins: Absolute anchors return
//!    their time, Relative anchors add their delta to the tempo time.
//! 2. Otherwise extrapolate from the nearest Absolute anchor, preferring the
//!    closest one before the beat, then the closest one after it.
//! 3. With no Absolute anchors, beat 1 lands on the downbeat.
//!
//! Extrapolation uses the tempo in force at the *queried* beat. Each beat is
//! computed independently from an integer beat delta, so there is no drift
//! from accumulating beat durations.

use std::collections::BTreeMap;
use std::ops::Bound;

use revunk_common::error::{RevunkError, RevunkResult};
use revunk_common::time::{MediaTime, TimeRange};
use revunk_project_model::project::{
    Anchor, AnchorKind, BeatIndex, ProjectDescription, TempoChange, TimingFields,
};

/// A beat resolved to its source time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedBeat {
    pub beat_index: BeatIndex,
    pub source_time: MediaTime,
}

/// Resolves beats against a project's anchors and tempo schedule.
///
/// Lookup tables are built once at construction; queries are `O(log n)`.
#[derive(Debug, Clone)]
pub struct BeatTimingSolver {
    base_tempo_bpm: f64,
    downbeat_time: MediaTime,
    time_offset: MediaTime,
    /// Every anchor by beat; a later declaration replaces an earlier one.
    anchors: BTreeMap<BeatIndex, AnchorKind>,
    /// Absolute anchors only, for nearest-anchor lookup.
    absolute: BTreeMap<BeatIndex, MediaTime>,
    tempo_changes: BTreeMap<BeatIndex, f64>,
}

impl BeatTimingSolver {
    pub fn new(timing: TimingFields, anchors: &[Anchor], tempo_changes: &[TempoChange]) -> Self {
        let mut by_beat = BTreeMap::new();
        for anchor in anchors {
            if by_beat.insert(anchor.beat_index, anchor.kind).is_some() {
                tracing::warn!(
                    beat_index = anchor.beat_index,
                    "Duplicate anchor, keeping the last declaration"
                );
            }
        }

        let absolute = by_beat
            .iter()
            .filter_map(|(&beat, kind)| match kind {
                AnchorKind::Absolute(time) => Some((beat, *time)),
                AnchorKind::Relative(_) => None,
            })
            .collect();

        let tempo_changes = tempo_changes
            .iter()
            .map(|change| (change.beat_index, change.bpm))
            .collect();

        Self {
            base_tempo_bpm: timing.base_tempo_bpm,
            downbeat_time: timing.downbeat_time,
            time_offset: timing.time_offset,
            anchors: by_beat,
            absolute,
            tempo_changes,
        }
    }

    /// Build a solver, failing with `MissingField` if tempo or downbeat is absent.
    pub fn from_project(project: &ProjectDescription) -> RevunkResult<Self> {
        let timing = project.timing()?;
        Ok(Self::new(timing, &project.anchors, &project.tempo_changes))
    }

    /// Fail with `UnresolvedTempo` if the base tempo or any tempo change is
    /// not a finite positive number.
    pub fn validate_tempo(&self) -> RevunkResult<()> {
        if !is_usable_tempo(self.base_tempo_bpm) {
            return Err(RevunkError::UnresolvedTempo {
                bpm: self.base_tempo_bpm,
                beat_index: None,
            });
        }
        if let Some((&beat, &bpm)) = self
            .tempo_changes
            .iter()
            .find(|(_, bpm)| !is_usable_tempo(**bpm))
        {
            return Err(RevunkError::UnresolvedTempo {
                bpm,
                beat_index: Some(beat),
            });
        }
        Ok(())
    }

    /// Tempo in force at `beat`.
    pub fn bpm_at(&self, beat: BeatIndex) -> f64 {
        self.tempo_changes
            .range(..=beat)
            .next_back()
            .map(|(_, &bpm)| bpm)
            .unwrap_or(self.base_tempo_bpm)
    }

    /// Source time of `beat`, before the constant time offset.
    ///
    /// Fails with `TimeOutOfRange` if the time does not fit in `MediaTime`.
    pub fn time_for(&self, beat: BeatIndex) -> RevunkResult<MediaTime> {
        let time = match self.anchors.get(&beat) {
            Some(AnchorKind::Absolute(time)) => Some(*time),
            Some(AnchorKind::Relative(delta)) => self
                .base_time(beat)
                .and_then(|base| base.checked_add(*delta)),
            None => self.base_time(beat),
        };
        time.ok_or(RevunkError::TimeOutOfRange { beat_index: beat })
    }

    /// Source time of `beat` with the time offset applied.
    pub fn source_time(&self, beat: BeatIndex) -> RevunkResult<MediaTime> {
        self.time_for(beat)?
            .checked_add(self.time_offset)
            .ok_or(RevunkError::TimeOutOfRange { beat_index: beat })
    }

    /// Resolve `beat` to its source time, offset included.
    pub fn resolve(&self, beat: BeatIndex) -> RevunkResult<ResolvedBeat> {
        Ok(ResolvedBeat {
            beat_index: beat,
            source_time: self.source_time(beat)?,
        })
    }

    /// Source range covered by `beat`: from its time to the next beat's.
    ///
    /// Any overflow, including at the next beat, is reported against `beat`.
    pub fn source_range(&self, beat: BeatIndex) -> RevunkResult<TimeRange> {
        let out_of_range = |_| RevunkError::TimeOutOfRange { beat_index: beat };
        let start = self.resolve(beat).map_err(out_of_range)?;
        let end = self.resolve(beat.saturating_add(1)).map_err(out_of_range)?;
        if end.source_time.checked_sub(start.source_time).is_none() {
            return Err(RevunkError::TimeOutOfRange { beat_index: beat });
        }
        Ok(TimeRange::new(start.source_time, end.source_time))
    }

    fn base_time(&self, beat: BeatIndex) -> Option<MediaTime> {
        let bpm = self.bpm_at(beat);

        if let Some((&prev, &time)) = self.absolute.range(..beat).next_back() {
            return time.checked_add(MediaTime::try_from_beats(i64::from(beat - prev), bpm)?);
        }

        if let Some((&next, &time)) = self
            .absolute
            .range((Bound::Excluded(beat), Bound::Unbounded))
            .next()
        {
            return time.checked_sub(MediaTime::try_from_beats(i64::from(next - beat), bpm)?);
        }

        self.downbeat_time
            .checked_add(MediaTime::try_from_beats(i64::from(beat) - 1, bpm)?)
    }
}

fn is_usable_tempo(bpm: f64) -> bool {
    bpm.is_finite() && bpm > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(bpm: f64, downbeat_secs: f64) -> TimingFields {
        TimingFields {
            base_tempo_bpm: bpm,
            downbeat_time: MediaTime::from_secs_f64(downbeat_secs),
            time_offset: MediaTime::ZERO,
        }
    }

    fn absolute(beat_index: BeatIndex, secs: f64) -> Anchor {
        Anchor {
            beat_index,
            kind: AnchorKind::Absolute(MediaTime::from_secs_f64(secs)),
        }
    }

    fn assert_close(actual: MediaTime, expected_secs: f64) {
        let diff = (actual.as_secs_f64() - expected_secs).abs();
        assert!(diff < 1e-3, "expected {expected_secs}s, got {actual}");
    }

    #[test]
    fn test_constant_tempo_from_downbeat() {
        let solver = BeatTimingSolver::new(timing(120.0, 0.0), &[], &[]);
        assert_eq!(solver.time_for(1).unwrap(), MediaTime::ZERO);
        assert_eq!(solver.time_for(5).unwrap(), MediaTime::from_secs_f64(2.0));
    }

    #[test]
    fn test_anchor_then_tempo_change() {
        let solver = BeatTimingSolver::new(
            timing(100.0, 0.0),
            &[absolute(32, 15.9)],
            &[TempoChange {
                beat_index: 33,
                bpm: 90.0,
            }],
        );
        assert_eq!(solver.time_for(32).unwrap(), MediaTime::from_secs_f64(15.9));
        assert_close(solver.time_for(33).unwrap(), 16.5667);
    }

    #[test]
    fn test_extrapolates_backwards_from_later_anchor() {
        let solver = BeatTimingSolver::new(timing(120.0, 0.0), &[absolute(10, 20.0)], &[]);
        assert_eq!(solver.time_for(8).unwrap(), MediaTime::from_secs_f64(19.0));
    }

    #[test]
    fn test_nearest_previous_anchor_wins() {
        let solver = BeatTimingSolver::new(
            timing(60.0, 0.0),
            &[absolute(1, 0.0), absolute(10, 100.0)],
            &[],
        );
        assert_eq!(solver.time_for(12).unwrap(), MediaTime::from_secs_f64(102.0));
        assert_eq!(solver.time_for(5).unwrap(), MediaTime::from_secs_f64(4.0));
    }

    #[test]
    fn test_relative_anchor_adds_delta() {
        let solver = BeatTimingSolver::new(
            timing(120.0, 1.0),
            &[Anchor {
                beat_index: 3,
                kind: AnchorKind::Relative(MediaTime::from_millis(40)),
            }],
            &[],
        );
        assert_eq!(solver.time_for(3).unwrap(), MediaTime::from_millis(2040));
        assert_eq!(solver.time_for(4).unwrap(), MediaTime::from_millis(2500));
    }

    #[test]
    fn test_duplicate_anchor_last_wins() {
        let solver = BeatTimingSolver::new(
            timing(120.0, 0.0),
            &[absolute(4, 3.0), absolute(4, 5.0)],
            &[],
        );
        assert_eq!(solver.time_for(4).unwrap(), MediaTime::from_secs_f64(5.0));
    }

    #[test]
    fn test_tempo_evaluated_at_target_beat() {
        let solver = BeatTimingSolver::new(
            timing(120.0, 0.0),
            &[],
            &[TempoChange {
                beat_index: 5,
                bpm: 60.0,
            }],
        );
        assert_eq!(solver.bpm_at(4), 120.0);
        assert_eq!(solver.bpm_at(5), 60.0);
        assert_eq!(solver.time_for(5).unwrap(), MediaTime::from_secs_f64(4.0));
    }

    #[test]
    fn test_offset_applies_to_source_time_only() {
        let fields = TimingFields {
            time_offset: MediaTime::from_millis(250),
            ..timing(120.0, 0.0)
        };
        let solver = BeatTimingSolver::new(fields, &[], &[]);
        assert_eq!(solver.time_for(2).unwrap(), MediaTime::from_millis(500));
        assert_eq!(solver.source_time(2).unwrap(), MediaTime::from_millis(750));
        let range = solver.source_range(2).unwrap();
        assert_eq!(range.duration(), MediaTime::from_millis(500));
    }

    #[test]
    fn test_resolve_includes_offset() {
        let fields = TimingFields {
            time_offset: MediaTime::from_millis(-100),
            ..timing(120.0, 1.0)
        };
        let solver = BeatTimingSolver::new(fields, &[absolute(9, 20.0)], &[]);
        let resolved = solver.resolve(9).unwrap();
        assert_eq!(resolved.beat_index, 9);
        assert_eq!(resolved.source_time, MediaTime::from_millis(19_900));
        assert_eq!(solver.resolve(1).unwrap().source_time, MediaTime::from_millis(15_900));
    }

    #[test]
    fn test_overflowing_times_are_errors() {
        let solver = BeatTimingSolver::new(timing(20.0, 0.0), &[], &[]);
        assert!(matches!(
            solver.time_for(4_000_000_000),
            Err(RevunkError::TimeOutOfRange {
                beat_index: 4_000_000_000
            })
        ));

        let anchor = Anchor {
            beat_index: 1,
            kind: AnchorKind::Absolute(MediaTime::from_nanos(i64::MAX - 10)),
        };
        let solver = BeatTimingSolver::new(timing(120.0, 0.0), &[anchor], &[]);
        assert!(solver.time_for(1).is_ok());
        assert!(matches!(
            solver.source_range(1),
            Err(RevunkError::TimeOutOfRange { beat_index: 1 })
        ));
    }

    #[test]
    fn test_validate_tempo() {
        let solver = BeatTimingSolver::new(timing(0.0, 0.0), &[], &[]);
        assert!(matches!(
            solver.validate_tempo(),
            Err(RevunkError::UnresolvedTempo {
                beat_index: None,
                ..
            })
        ));

        let solver = BeatTimingSolver::new(
            timing(120.0, 0.0),
            &[],
            &[TempoChange {
                beat_index: 9,
                bpm: -1.0,
            }],
        );
        assert!(matches!(
            solver.validate_tempo(),
            Err(RevunkError::UnresolvedTempo {
                beat_index: Some(9),
                ..
            })
        ));
    }

    #[test]
    fn test_from_project_requires_timing() {
        let project = ProjectDescription {
            base_tempo_bpm: Some(120.0),
            ..Default::default()
        };
        assert!(matches!(
            BeatTimingSolver::from_project(&project),
            Err(RevunkError::MissingField { field: "downbeat" })
        ));
    }
}
