//! Export configuration and job management.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use revunk_common::config::ExportDefaults;
use revunk_common::error::{RevunkError, RevunkResult};
use revunk_common::time::FrameRate;
use revunk_project_model::parser::parse_script;
use revunk_project_model::plan::CompositionPlan;
use revunk_project_model::sidecar::MetadataSidecar;

use crate::cache::PlanCache;
use crate::ffmpeg::FfmpegBackend;
use crate::reopen::sidecar_path_for;
use crate::sources::fingerprint_file;

/// Output container and codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportFormat {
    #[serde(rename = "mp4-h264")]
    Mp4H264,
    #[serde(rename = "mp4-h265")]
    Mp4H265,
    #[serde(rename = "webm")]
    Webm,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4H264 | Self::Mp4H265 => "mp4",
            Self::Webm => "webm",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = RevunkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp4" | "mp4-h264" | "h264" => Ok(Self::Mp4H264),
            "mp4-h265" | "h265" | "hevc" => Ok(Self::Mp4H265),
            "webm" => Ok(Self::Webm),
            other => Err(RevunkError::config(format!(
                "Unknown export format '{other}' (expected mp4-h264, mp4-h265, or webm)"
            ))),
        }
    }
}

/// Encoder settings for one export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    pub format: ExportFormat,
    pub frame_rate: FrameRate,
    /// Video bitrate in kbps.
    pub video_bitrate_kbps: u32,
    /// Audio bitrate in kbps.
    pub audio_bitrate_kbps: u32,
}

impl ExportConfig {
    pub fn from_defaults(defaults: &ExportDefaults) -> RevunkResult<Self> {
        Ok(Self {
            format: defaults.format.parse()?,
            frame_rate: FrameRate::fps(defaults.frame_rate),
            video_bitrate_kbps: defaults.video_bitrate_kbps,
            audio_bitrate_kbps: defaults.audio_bitrate_kbps,
        })
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: ExportFormat::Mp4H264,
            frame_rate: FrameRate::default(),
            video_bitrate_kbps: 8000,
            audio_bitrate_kbps: 192,
        }
    }
}

/// An export job ready to be rendered.
#[derive(Debug, Clone)]
pub struct ExportJob {
    /// Edit script to export.
    pub script_path: PathBuf,

    /// Output file path.
    pub output_path: PathBuf,

    /// Export configuration.
    pub config: ExportConfig,
}

impl ExportJob {
    /// Job writing to the default output path for `script_path`.
    pub fn new(script_path: impl Into<PathBuf>, config: ExportConfig) -> Self {
        let script_path = script_path.into();
        let output_path = default_output_path(&script_path, config.format);
        Self {
            script_path,
            output_path,
            config,
        }
    }
}

/// What a backend is asked to render.
#[derive(Debug, Clone)]
pub struct CompositionRequest {
    pub source_path: PathBuf,
    pub plan: Arc<CompositionPlan>,
    pub output_path: PathBuf,
    pub config: ExportConfig,
}

/// Progress callback for export rendering.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send>;

/// Export progress report.
#[derive(Debug, Clone)]
pub struct ExportProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,

    /// Frames rendered so far.
    pub frames_rendered: u64,

    /// Total frames to render.
    pub total_frames: u64,

    /// Estimated time remaining in seconds.
    pub eta_secs: f64,

    /// Current stage.
    pub stage: ExportStage,
}

/// Stages of the export process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Preparing,
    Rendering,
    Finalizing,
    Complete,
    Failed,
}

/// Trait for composition backends.
///
/// A backend receives one complete plan and either produces the output file
/// or fails; it performs no retries.
pub trait CompositionBackend: Send {
    /// Render the plan to `request.output_path`.
    fn compose(
        &mut self,
        request: &CompositionRequest,
        progress: Option<ProgressCallback>,
    ) -> RevunkResult<()>;

    /// Check if this backend is available on the system.
    fn is_available(&self) -> bool;

    /// Backend name.
    fn name(&self) -> &str;
}

/// Result of a successful export.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub output_path: PathBuf,
    pub sidecar_path: PathBuf,
    pub plan: Arc<CompositionPlan>,
}

/// Default output for a script: `.txt` then `.revunk`/`.vunkle` removed,
/// and `.revunk.out.<ext>` appended for the format's container.
pub fn default_output_path(script_path: &Path, format: ExportFormat) -> PathBuf {
    let mut base = script_path.to_path_buf();
    if base.extension() == Some(OsStr::new("txt")) {
        base.set_extension("");
    }
    if matches!(
        base.extension().and_then(OsStr::to_str),
        Some("revunk" | "vunkle")
    ) {
        base.set_extension("");
    }
    base.set_extension(format!("revunk.out.{}", format.extension()));
    base
}

/// Resolve the script's `video:` reference against the script's directory.
pub fn resolve_source_path(script_path: &Path, reference: &str) -> PathBuf {
    let reference = Path::new(reference);
    if reference.is_absolute() {
        return reference.to_path_buf();
    }
    match script_path.parent() {
        Some(dir) => dir.join(reference),
        None => reference.to_path_buf(),
    }
}

/// Export a script with the ffmpeg backend.
pub async fn export_project(
    job: ExportJob,
    cache: &PlanCache,
    progress: Option<ProgressCallback>,
) -> RevunkResult<ExportOutcome> {
    export_project_with(job, Box::new(FfmpegBackend::new()), cache, progress).await
}

/// Export a script with the given backend.
///
/// This is the main entry point for rendering: parse, plan, compose, then
/// fingerprint the source and write the metadata sidecar.
pub async fn export_project_with(
    job: ExportJob,
    mut backend: Box<dyn CompositionBackend>,
    cache: &PlanCache,
    progress: Option<ProgressCallback>,
) -> RevunkResult<ExportOutcome> {
    tracing::info!(
        script = %job.script_path.display(),
        output = %job.output_path.display(),
        format = ?job.config.format,
        frame_rate = %job.config.frame_rate,
        "Starting export"
    );

    if !job.script_path.exists() {
        return Err(RevunkError::FileNotFound {
            path: job.script_path.clone(),
        });
    }
    let text = std::fs::read_to_string(&job.script_path)?;
    let project = parse_script(&text)?;

    let source_path = resolve_source_path(&job.script_path, project.source()?);
    if !source_path.exists() {
        return Err(RevunkError::FileNotFound { path: source_path });
    }

    let plan = cache.get_or_plan(&project, job.config.frame_rate)?;
    tracing::info!(
        segments = plan.segments.len(),
        transitions = plan.transitions.len(),
        layers = plan.layer_count(),
        duration_secs = plan.duration().as_secs_f64(),
        "Composition planned"
    );

    if !backend.is_available() {
        return Err(RevunkError::unsupported(format!(
            "Composition backend '{}' is not available",
            backend.name()
        )));
    }
    tracing::info!(backend = backend.name(), "Using composition backend");

    if let Some(parent) = job.output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    if let Some(cb) = &progress {
        cb(ExportProgress {
            progress: 0.0,
            frames_rendered: 0,
            total_frames: plan.duration_frames.max(0) as u64,
            eta_secs: 0.0,
            stage: ExportStage::Preparing,
        });
    }

    let request = CompositionRequest {
        source_path: source_path.clone(),
        plan: Arc::clone(&plan),
        output_path: job.output_path.clone(),
        config: job.config.clone(),
    };
    tokio::task::spawn_blocking(move || backend.compose(&request, progress))
        .await
        .map_err(|e| RevunkError::Other(anyhow::Error::new(e)))??;

    let fingerprint = fingerprint_file(&source_path)?;
    let mut sidecar = MetadataSidecar::new(text, vec![fingerprint]);
    sidecar.notes.push(format!(
        "{} segments, {} crossfades at {} fps",
        plan.segments.len(),
        plan.transitions.len(),
        plan.frame_rate
    ));

    let sidecar_path = sidecar_path_for(&job.output_path);
    std::fs::write(&sidecar_path, sidecar.to_text())?;
    tracing::info!(sidecar = %sidecar_path.display(), "Wrote metadata sidecar");

    Ok(ExportOutcome {
        output_path: job.output_path,
        sidecar_path,
        plan,
    })
}
