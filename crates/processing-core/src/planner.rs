//! Timeline planner: export list to composition plan.
//!
//! # Algorithm
//!
//! 1. **Resolve** each export entry to one beat of source time and round its
//!    destination length to whole frames.
//! 2. **Walk** the export list once, keeping an active and an inactive layer.
//!    A cut places the entry on the active layer at the cursor.
//! 3. A crossfade places the *next* entry early on the inactive layer so the
//!    two overlap by the fade length, emits a `Transition` over the overlap,
//!    and swaps layers. When the walk reaches that next entry it is already
//!    placed and only its own join is processed, so crossfades can chain.
//!
//! Fades are capped at 45% of the shorter adjoining beat. Two fades that
//! touch the same beat therefore never cover all of it, which keeps segments
//! sharing a layer disjoint.

use revunk_common::error::{RevunkError, RevunkResult};
use revunk_common::time::{FrameRate, MediaTime, TimeRange};
use revunk_project_model::plan::{CompositionPlan, FrameRange, Layer, Segment, Transition};
use revunk_project_model::project::{
    BeatEdit, BeatTransition, CrossfadePolicy, ProjectDescription,
};

use crate::solver::BeatTimingSolver;

/// Configuration for the timeline planner.
#[derive(Debug, Clone, Copy)]
pub struct PlannerConfig {
    /// Destination frame grid.
    pub frame_rate: FrameRate,

    /// Largest fade as a percentage of the shorter adjoining beat.
    pub max_fade_percent: i64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            frame_rate: FrameRate::default(),
            max_fade_percent: 45,
        }
    }
}

/// An export entry resolved to source time and destination length.
#[derive(Debug, Clone, Copy)]
struct ResolvedEntry {
    edit: BeatEdit,
    source: TimeRange,
    frames: i64,
}

/// The timeline planner.
pub struct TimelinePlanner {
    config: PlannerConfig,
}

impl TimelinePlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Planner on `frame_rate` with the default fade cap.
    pub fn with_frame_rate(frame_rate: FrameRate) -> Self {
        Self::new(PlannerConfig {
            frame_rate,
            ..PlannerConfig::default()
        })
    }

    /// Plan a project.
    ///
    /// Fails with `MissingField`, then `UnresolvedTempo`, then `EmptyExport`,
    /// before any layer is assigned.
    pub fn plan(&self, project: &ProjectDescription) -> RevunkResult<CompositionPlan> {
        project.source()?;
        let solver = BeatTimingSolver::from_project(project)?;
        solver.validate_tempo()?;
        if project.export_beats.is_empty() {
            return Err(RevunkError::EmptyExport);
        }

        let entries = self.resolve_entries(&solver, &project.export_beats)?;
        let plan = self.assign_layers(&entries, project.default_crossfade)?;

        tracing::debug!(
            segments = plan.segments.len(),
            transitions = plan.transitions.len(),
            duration_frames = plan.duration_frames,
            frame_rate = %plan.frame_rate,
            "Planned composition"
        );

        Ok(plan)
    }

    fn resolve_entries(
        &self,
        solver: &BeatTimingSolver,
        edits: &[BeatEdit],
    ) -> RevunkResult<Vec<ResolvedEntry>> {
        edits
            .iter()
            .map(|edit| {
                let source = solver.source_range(edit.beat_index)?;
                let frames = self.config.frame_rate.frames_for(source.duration());
                if frames <= 0 {
                    return Err(RevunkError::EmptyBeat {
                        beat_index: edit.beat_index,
                    });
                }
                Ok(ResolvedEntry {
                    edit: *edit,
                    source,
                    frames,
                })
            })
            .collect()
    }

    fn assign_layers(
        &self,
        entries: &[ResolvedEntry],
        policy: Option<CrossfadePolicy>,
    ) -> RevunkResult<CompositionPlan> {
        let mut segments: Vec<Segment> = Vec::with_capacity(entries.len());
        let mut transitions: Vec<Transition> = Vec::new();
        let mut active = Layer::Base;
        let mut cursor: i64 = 0;
        let mut placed_early: Option<usize> = None;

        for (index, entry) in entries.iter().enumerate() {
            if placed_early == Some(index) {
                placed_early = None;
            } else {
                let placed = segment(entry, cursor, active)?;
                cursor = placed.destination.end;
                segments.push(placed);
            }

            let Some(next) = entries.get(index + 1) else {
                continue;
            };
            let fade = match (entry.edit.transition, policy) {
                (BeatTransition::Crossfade, Some(policy)) => {
                    self.fade_frames(&policy, entry.frames, next.frames)
                }
                _ => 0,
            };
            let Some(policy) = policy.filter(|_| fade > 0) else {
                continue;
            };

            let incoming = active.other();
            let start = cursor - fade;
            let placed = segment(next, start, incoming)?;
            transitions.push(Transition {
                overlap: FrameRange::new(start, cursor),
                outgoing: active,
                incoming,
                audio: policy.applies_to_audio,
                video: policy.applies_to_video,
            });

            active = incoming;
            cursor = placed.destination.end;
            segments.push(placed);
            placed_early = Some(index + 1);
        }

        Ok(CompositionPlan {
            frame_rate: self.config.frame_rate,
            segments,
            transitions,
            duration_frames: cursor,
        })
    }

    /// Fade length in frames, capped by both adjoining beats and floored at zero.
    ///
    /// A policy that fades neither medium yields zero.
    fn fade_frames(&self, policy: &CrossfadePolicy, outgoing: i64, incoming: i64) -> i64 {
        let fades_something = policy.applies_to_audio || policy.applies_to_video;
        if !fades_something || !policy.duration_secs.is_finite() {
            return 0;
        }
        let requested = self
            .config
            .frame_rate
            .frames_for(MediaTime::from_secs_f64(policy.duration_secs));
        let percent = i128::from(self.config.max_fade_percent.clamp(0, 100));
        let ceiling = (i128::from(outgoing.min(incoming)) * percent / 100) as i64;
        requested.min(ceiling).max(0)
    }
}

/// Place `entry` at `start`, failing if its end frame overflows.
fn segment(entry: &ResolvedEntry, start: i64, layer: Layer) -> RevunkResult<Segment> {
    let end = start
        .checked_add(entry.frames)
        .ok_or(RevunkError::TimeOutOfRange {
            beat_index: entry.edit.beat_index,
        })?;
    Ok(Segment {
        beat_index: entry.edit.beat_index,
        source: entry.source,
        destination: FrameRange::new(start, end),
        layer,
    })
}

/// Plan `project` on the `frame_rate` grid.
pub fn plan(project: &ProjectDescription, frame_rate: FrameRate) -> RevunkResult<CompositionPlan> {
    TimelinePlanner::with_frame_rate(frame_rate).plan(project)
}
