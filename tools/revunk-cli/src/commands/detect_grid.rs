//! Estimate tempo and anchors from a metronome grid burned into a video.

use std::path::{Path, PathBuf};

use revunk_processing_core::grid::{emit_script, BeatGridDetector, GridCalibration};
use revunk_render_engine::grid_sampler::detect_grid;

pub fn run(video: PathBuf, grid: Option<Vec<f64>>, emit_revunk: bool) -> anyhow::Result<()> {
    let calibration = match grid.as_deref() {
        None => GridCalibration::default(),
        Some(&[x, y, w, h]) => GridCalibration { x, y, w, h },
        Some(_) => return Err(anyhow::anyhow!("--grid takes exactly four values: x y w h")),
    };

    println!("Detecting grid in: {}", video.display());
    let detector = BeatGridDetector::with_defaults();
    let estimate = detect_grid(&video, &calibration, &detector)?;

    println!("  Beats: {}", estimate.events.len());
    println!("  BPM: {:.3}", estimate.bpm);
    for anchor in &estimate.anchors {
        println!(
            "  Anchor: beat {} at {:.3}s",
            anchor.beat_index,
            anchor.time.as_secs_f64()
        );
    }

    if emit_revunk {
        let video_name = video
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| video.display().to_string());
        let script_path = auto_script_path(&video);
        std::fs::write(&script_path, emit_script(&video_name, &estimate, &calibration))?;
        println!("\nWrote script: {}", script_path.display());
    }
    Ok(())
}

/// `clip.mov` becomes `clip.auto.revunk.txt`.
fn auto_script_path(video: &Path) -> PathBuf {
    video.with_extension("auto.revunk.txt")
}
