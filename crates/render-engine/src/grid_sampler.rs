//! Metronome grid sampling through ffmpeg.
//!
//! The calibrated grid region is cropped, box-filtered down to 4x4 grey
//! pixels and streamed as raw bytes, one 16-byte frame per sample.

use std::io::{BufReader, Read};
use std::path::Path;

use revunk_common::error::{RevunkError, RevunkResult};
use revunk_common::time::MediaTime;
use revunk_processing_core::grid::{
    BeatGridDetector, GridCalibration, GridEstimate, GridSample, GRID_CELLS,
};

use crate::process::PipedChild;

/// Sampling rate of the grid, in frames per second.
pub const SAMPLE_FPS: i64 = 20;

/// ffmpeg arguments that stream the grid region of `video` as raw grey cells.
pub(crate) fn sampler_args(video: &Path, calibration: &GridCalibration) -> Vec<String> {
    let filter = format!(
        "fps={SAMPLE_FPS},crop=iw*{w}:ih*{h}:iw*{x}:ih*{y},scale=4:4:flags=area,format=gray",
        w = calibration.w,
        h = calibration.h,
        x = calibration.x,
        y = calibration.y,
    );
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-nostats".to_string(),
        "-i".to_string(),
        video.display().to_string(),
        "-an".to_string(),
        "-vf".to_string(),
        filter,
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "gray".to_string(),
        "pipe:1".to_string(),
    ]
}

/// Turn the `n`th raw 16-byte frame into a sample.
pub(crate) fn sample_from_frame(n: i64, frame: &[u8; GRID_CELLS]) -> GridSample {
    let mut cells = [0.0; GRID_CELLS];
    for (cell, byte) in cells.iter_mut().zip(frame) {
        *cell = f64::from(*byte);
    }
    GridSample {
        time: MediaTime::from_millis(n * 1000 / SAMPLE_FPS),
        cells,
    }
}

/// Detect beats from the metronome grid burned into `video`.
///
/// Samples are fed to the beat counter as they stream out of ffmpeg.
pub fn detect_grid(
    video: &Path,
    calibration: &GridCalibration,
    detector: &BeatGridDetector,
) -> RevunkResult<GridEstimate> {
    if !video.exists() {
        return Err(RevunkError::FileNotFound {
            path: video.to_path_buf(),
        });
    }

    let args = sampler_args(video, calibration);
    tracing::debug!(args = ?args, "Sampling metronome grid");
    let mut child = PipedChild::spawn("ffmpeg", &args)?;

    let mut reader = BufReader::new(child.take_stdout()?);
    let mut counter = detector.counter();
    let mut events = Vec::new();
    let mut frame = [0u8; GRID_CELLS];
    let mut n: i64 = 0;
    loop {
        // An early return drops `child`, which kills and reaps ffmpeg.
        match reader.read_exact(&mut frame) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        }
        if let Some(event) = counter.push(&sample_from_frame(n, &frame)) {
            tracing::trace!(beat = event.beat_index, time = %event.time, "Grid beat");
            events.push(event);
        }
        n += 1;
    }
    child.finish("grid sampling")?;

    tracing::info!(samples = n, events = events.len(), "Sampled metronome grid");
    detector.estimate_from_events(events)
}
