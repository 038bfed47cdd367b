//! Beat-grid estimation from a visual metronome.
//!
//! Some source clips carry an on-screen 4x4 grid whose lit cell steps once
//! per beat. Given the mean luminance of each cell over time, this module
//! counts the steps, estimates the tempo and suggests anchors.
//!
//! # Algorithm
//!
//! 1. A sample is a **hit** when its brightest cell is well above the median.
//! 2. The first hit is beat 1; each change of lit cell is one more beat and
//!    records a `(beat, time)` event.
//! 3. **Tempo** is 60 over the mean interval between events.
//! 4. Every 16th event (one full lap of the grid) becomes a suggested anchor.

use serde::{Deserialize, Serialize};

use revunk_common::error::{RevunkError, RevunkResult};
use revunk_common::time::MediaTime;
use revunk_project_model::format::format_script;
use revunk_project_model::project::BeatIndex;

use crate::auto_beats::{self, AutoExportOptions};

/// Cells in the metronome grid.
pub const GRID_CELLS: usize = 16;

/// Where the metronome grid sits in the frame, as fractions of width/height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCalibration {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Default for GridCalibration {
    fn default() -> Self {
        Self {
            x: 0.38,
            y: 0.04,
            w: 0.24,
            h: 0.24,
        }
    }
}

/// Mean luminance of each grid cell at one instant, row-major.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSample {
    pub time: MediaTime,
    pub cells: [f64; GRID_CELLS],
}

/// A detected beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatEvent {
    pub beat_index: BeatIndex,
    pub time: MediaTime,
}

/// Configuration for grid detection.
#[derive(Debug, Clone)]
pub struct GridConfig {
    /// Brightest cell over median needed for a hit.
    pub hit_ratio: f64,

    /// Fewest events accepted for a tempo estimate.
    pub min_events: usize,

    /// Events between suggested anchors.
    pub anchor_every: usize,

    /// Most anchors suggested.
    pub max_anchors: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            hit_ratio: 1.8,
            min_events: 8,
            anchor_every: 16,
            max_anchors: 4,
        }
    }
}

/// Result of grid estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridEstimate {
    pub bpm: f64,
    pub events: Vec<BeatEvent>,
    pub anchors: Vec<BeatEvent>,
}

impl GridEstimate {
    /// Highest beat index seen.
    pub fn last_beat(&self) -> BeatIndex {
        self.events.last().map(|e| e.beat_index).unwrap_or(0)
    }
}

/// Incremental beat counter over a stream of samples.
#[derive(Debug, Clone)]
pub struct BeatCounter {
    hit_ratio: f64,
    last_cell: Option<usize>,
    beat: BeatIndex,
}

impl BeatCounter {
    pub fn new(hit_ratio: f64) -> Self {
        Self {
            hit_ratio,
            last_cell: None,
            beat: 0,
        }
    }

    /// Feed one sample; returns an event when the lit cell changes.
    pub fn push(&mut self, sample: &GridSample) -> Option<BeatEvent> {
        let cell = hit_cell(&sample.cells, self.hit_ratio)?;
        if self.last_cell == Some(cell) {
            return None;
        }

        self.beat += 1;
        self.last_cell = Some(cell);
        Some(BeatEvent {
            beat_index: self.beat,
            time: sample.time,
        })
    }
}

/// Index of the lit cell, or `None` if nothing stands out.
fn hit_cell(cells: &[f64; GRID_CELLS], hit_ratio: f64) -> Option<usize> {
    let mut sorted = *cells;
    sorted.sort_by(f64::total_cmp);
    let median = sorted[GRID_CELLS / 2];
    let max = sorted[GRID_CELLS - 1];
    if max / median.max(0.001) <= hit_ratio {
        return None;
    }
    cells.iter().position(|&value| value == max)
}

/// The grid detector.
pub struct BeatGridDetector {
    config: GridConfig,
}

impl BeatGridDetector {
    pub fn new(config: GridConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(GridConfig::default())
    }

    pub fn counter(&self) -> BeatCounter {
        BeatCounter::new(self.config.hit_ratio)
    }

    /// Beat events in time order.
    pub fn detect_events(&self, samples: &[GridSample]) -> Vec<BeatEvent> {
        let mut counter = self.counter();
        samples.iter().filter_map(|s| counter.push(s)).collect()
    }

    /// Estimate tempo and anchors from samples.
    pub fn estimate(&self, samples: &[GridSample]) -> RevunkResult<GridEstimate> {
        self.estimate_from_events(self.detect_events(samples))
    }

    /// Estimate tempo and anchors from already detected events.
    pub fn estimate_from_events(&self, events: Vec<BeatEvent>) -> RevunkResult<GridEstimate> {
        if events.len() < self.config.min_events.max(2) {
            return Err(RevunkError::NotEnoughBeats {
                found: events.len(),
                required: self.config.min_events.max(2),
            });
        }

        let span = events[events.len() - 1].time - events[0].time;
        let mean_interval = span.as_secs_f64() / (events.len() - 1) as f64;
        let bpm = 60.0 / mean_interval;
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(RevunkError::UnresolvedTempo {
                bpm,
                beat_index: None,
            });
        }

        let anchors = events
            .iter()
            .step_by(self.config.anchor_every.max(1))
            .take(self.config.max_anchors)
            .copied()
            .collect();

        tracing::debug!(events = events.len(), bpm, "Estimated beat grid");

        Ok(GridEstimate {
            bpm,
            events,
            anchors,
        })
    }
}

/// Render an edit script for a detected grid.
pub fn emit_script(video_name: &str, estimate: &GridEstimate, calibration: &GridCalibration) -> String {
    let mut lines: Vec<String> = vec![format!("video: {video_name}"), String::new()];
    lines.push(format!("bpm: {:.3}", estimate.bpm));
    if let Some(first) = estimate.events.first() {
        lines.push(format!("downbeat: {:.3}", first.time.as_secs_f64()));
    }

    lines.push(String::new());
    lines.push("# visual grid calibration".to_string());
    lines.push("grid:".to_string());
    lines.push(format!("  x {:.4}", calibration.x));
    lines.push(format!("  y {:.4}", calibration.y));
    lines.push(format!("  w {:.4}", calibration.w));
    lines.push(format!("  h {:.4}", calibration.h));

    lines.push(String::new());
    lines.push("# auto-detected from visual grid".to_string());
    lines.push("anchor:".to_string());
    for anchor in &estimate.anchors {
        lines.push(format!(
            "  {} {:.3}",
            anchor.beat_index,
            anchor.time.as_secs_f64()
        ));
    }

    let beats = auto_beats::generate(&AutoExportOptions {
        start_beat: 1,
        end_beat: estimate.last_beat().max(1),
        ..AutoExportOptions::default()
    });
    let row: Vec<String> = beats.iter().map(|b| b.to_string()).collect();
    lines.push(String::new());
    lines.push("export:".to_string());
    lines.push(format!("  {}", row.join(" ")));

    format_script(&lines.join("\n"))
}
