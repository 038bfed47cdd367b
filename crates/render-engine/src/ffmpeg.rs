//! FFmpeg composition backend.
//!
//! Renders a `CompositionPlan` with one `ffmpeg` invocation. Each segment is
//! trimmed out of the source and retimed to start at zero, then segments are
//! joined in destination order: `concat` on cuts, `xfade` and `acrossfade`
//! over each transition for the media it applies to.

use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::time::Instant;

use revunk_common::error::{RevunkError, RevunkResult};
use revunk_common::time::{FrameRate, MediaTime};
use revunk_project_model::plan::{CompositionPlan, Segment, Transition};

use crate::export::{
    CompositionBackend, CompositionRequest, ExportConfig, ExportFormat, ExportProgress,
    ExportStage, ProgressCallback,
};
use crate::process::PipedChild;
use crate::sources::probe_has_audio;

/// Renders plans by shelling out to `ffmpeg`.
#[derive(Debug, Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Self {
        Self
    }
}

/// One `ffmpeg` run that renders a request's plan.
#[derive(Debug, Clone)]
struct FfmpegInvocation {
    args: Vec<String>,
    frame_rate: FrameRate,
    total_frames: i64,
}

impl FfmpegInvocation {
    fn for_request(request: &CompositionRequest, with_audio: bool) -> RevunkResult<Self> {
        let plan = &request.plan;
        if plan.segments.is_empty() {
            return Err(RevunkError::render("Composition plan has no segments"));
        }

        let filter = build_filter_graph(plan, with_audio);
        tracing::debug!(
            filter_len = filter.len(),
            with_audio,
            "Built composition filter graph"
        );

        let mut args: Vec<String> = [
            "-y",
            "-hide_banner",
            "-loglevel",
            "error",
            "-nostats",
            "-progress",
            "pipe:1",
            "-i",
        ]
        .iter()
        .map(|arg| arg.to_string())
        .collect();
        args.push(request.source_path.display().to_string());
        args.push("-filter_complex".to_string());
        args.push(filter);
        args.push("-map".to_string());
        args.push("[vout]".to_string());
        if with_audio {
            args.push("-map".to_string());
            args.push("[aout]".to_string());
        }
        args.push("-r".to_string());
        args.push(plan.frame_rate.to_string());
        args.extend(encoder_args(&request.config, with_audio));
        args.push(request.output_path.display().to_string());

        Ok(Self {
            args,
            frame_rate: plan.frame_rate,
            total_frames: plan.duration_frames.max(0),
        })
    }

    fn run(&self, progress: Option<ProgressCallback>) -> RevunkResult<()> {
        tracing::debug!(args = ?self.args, "Running ffmpeg");
        let mut child = PipedChild::spawn("ffmpeg", &self.args)?;
        tracing::info!(
            pid = child.id(),
            total_frames = self.total_frames,
            "ffmpeg process started"
        );

        let report = |update: ExportProgress| {
            if let Some(cb) = &progress {
                cb(update);
            }
        };
        let mut tracker = ProgressTracker::new(self.frame_rate, self.total_frames);
        let mut reader = BufReader::new(child.take_stdout()?);
        let mut line = String::new();
        loop {
            line.clear();
            // An early return drops `child`, which kills and reaps ffmpeg.
            let bytes = reader
                .read_line(&mut line)
                .map_err(|e| RevunkError::render(format!("Failed reading ffmpeg progress: {e}")))?;
            if bytes == 0 {
                break;
            }
            if let Some((key, value)) = line.trim().split_once('=') {
                if let Some(update) = tracker.observe(key, value) {
                    report(update);
                }
            }
        }

        if let Err(err) = child.finish("export") {
            report(tracker.report(ExportStage::Failed));
            return Err(err);
        }
        report(tracker.report(ExportStage::Complete));

        tracing::info!(elapsed_secs = tracker.elapsed_secs(), "ffmpeg finished");
        Ok(())
    }
}

impl CompositionBackend for FfmpegBackend {
    fn compose(
        &mut self,
        request: &CompositionRequest,
        progress: Option<ProgressCallback>,
    ) -> RevunkResult<()> {
        let with_audio = probe_has_audio(&request.source_path);
        FfmpegInvocation::for_request(request, with_audio)?.run(progress)
    }

    fn is_available(&self) -> bool {
        tool_runs("ffmpeg")
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

fn secs(time: MediaTime) -> String {
    format!("{:.6}", time.as_secs_f64())
}

/// Build the `-filter_complex` graph for a plan.
///
/// Outputs `[vout]`, plus `[aout]` when `with_audio` is set.
pub(crate) fn build_filter_graph(plan: &CompositionPlan, with_audio: bool) -> String {
    let rate = plan.frame_rate;
    let mut chains: Vec<String> = Vec::new();

    for (index, segment) in plan.segments.iter().enumerate() {
        let start = segment_source_start(segment);
        let duration = secs(plan.frames_to_time(segment.destination.len()));
        chains.push(format!(
            "[0:v]trim=start={start}:duration={duration},setpts=PTS-STARTPTS,fps={rate},format=yuv420p[v{index}]"
        ));
        if with_audio {
            chains.push(format!(
                "[0:a]atrim=start={start}:duration={duration},asetpts=PTS-STARTPTS[a{index}]"
            ));
        }
    }

    let mut video = "v0".to_string();
    let mut audio = "a0".to_string();
    for index in 1..plan.segments.len() {
        let incoming = &plan.segments[index];
        let transition = plan
            .transition_starting_at(incoming.destination.start)
            .filter(|t| t.incoming == incoming.layer);

        let next_video = format!("vj{index}");
        chains.push(join_stream(
            plan,
            &video,
            &format!("v{index}"),
            &next_video,
            transition.filter(|t| t.video),
            transition,
            Medium::Video,
        ));
        video = next_video;

        if with_audio {
            let next_audio = format!("aj{index}");
            chains.push(join_stream(
                plan,
                &audio,
                &format!("a{index}"),
                &next_audio,
                transition.filter(|t| t.audio),
                transition,
                Medium::Audio,
            ));
            audio = next_audio;
        }
    }

    chains.push(format!("[{video}]null[vout]"));
    if with_audio {
        chains.push(format!("[{audio}]anull[aout]"));
    }
    chains.join(";")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Medium {
    Video,
    Audio,
}

/// Join `incoming` onto the accumulated stream `acc`.
///
/// `fade` is the transition if it applies to this medium; `overlap` is the
/// transition regardless of medium, so a medium that does not fade still
/// cuts at the overlap start and stays in sync with the one that does.
fn join_stream(
    plan: &CompositionPlan,
    acc: &str,
    incoming: &str,
    out: &str,
    fade: Option<&Transition>,
    overlap: Option<&Transition>,
    medium: Medium,
) -> String {
    let concat = match medium {
        Medium::Video => "concat=n=2:v=1:a=0",
        Medium::Audio => "concat=n=2:v=0:a=1",
    };

    if let Some(transition) = fade {
        let duration = secs(plan.frames_to_time(transition.overlap.len()));
        return match medium {
            Medium::Video => format!(
                "[{acc}][{incoming}]xfade=transition=fade:duration={duration}:offset={offset}[{out}]",
                offset = secs(plan.frames_to_time(transition.overlap.start)),
            ),
            Medium::Audio => {
                format!("[{acc}][{incoming}]acrossfade=d={duration}:c1=tri:c2=tri[{out}]")
            }
        };
    }

    if let Some(transition) = overlap {
        let cut_at = secs(plan.frames_to_time(transition.overlap.start));
        let (trim, setpts) = match medium {
            Medium::Video => ("trim", "setpts"),
            Medium::Audio => ("atrim", "asetpts"),
        };
        return format!(
            "[{acc}]{trim}=duration={cut_at},{setpts}=PTS-STARTPTS[{out}c];[{out}c][{incoming}]{concat}[{out}]"
        );
    }

    format!("[{acc}][{incoming}]{concat}[{out}]")
}

fn segment_source_start(segment: &Segment) -> String {
    if segment.source.start.is_negative() {
        tracing::warn!(
            beat_index = segment.beat_index,
            start = %segment.source.start,
            "Beat starts before the source clip, clamping to zero"
        );
        return secs(MediaTime::ZERO);
    }
    secs(segment.source.start)
}

/// Encoder arguments for the configured format. Audio settings are only
/// emitted when the plan carries an audio stream.
fn encoder_args(config: &ExportConfig, with_audio: bool) -> Vec<String> {
    let (video_codec, audio_codec, tuning): (&str, &str, &[&str]) = match config.format {
        ExportFormat::Mp4H264 => (
            "libx264",
            "aac",
            &["-preset", "medium", "-profile:v", "high", "-movflags", "+faststart"],
        ),
        ExportFormat::Mp4H265 => (
            "libx265",
            "aac",
            &["-preset", "medium", "-tag:v", "hvc1", "-movflags", "+faststart"],
        ),
        ExportFormat::Webm => ("libvpx-vp9", "libopus", &["-row-mt", "1"]),
    };

    let mut args = vec![
        "-c:v".to_string(),
        video_codec.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-b:v".to_string(),
        format!("{}k", config.video_bitrate_kbps.max(1000)),
    ];
    if with_audio {
        args.push("-c:a".to_string());
        args.push(audio_codec.to_string());
        args.push("-b:a".to_string());
        args.push(format!("{}k", config.audio_bitrate_kbps.max(64)));
    } else {
        args.push("-an".to_string());
    }
    args.extend(tuning.iter().map(|arg| arg.to_string()));
    args
}

/// Whether `binary -version` runs and exits cleanly.
pub(crate) fn tool_runs(binary: &str) -> bool {
    Command::new(binary)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Counts rendered output frames of a plan from ffmpeg `-progress` lines.
#[derive(Debug)]
struct ProgressTracker {
    frame_rate: FrameRate,
    total_frames: i64,
    frames_rendered: i64,
    started: Instant,
}

impl ProgressTracker {
    fn new(frame_rate: FrameRate, total_frames: i64) -> Self {
        Self {
            frame_rate,
            total_frames: total_frames.max(0),
            frames_rendered: 0,
            started: Instant::now(),
        }
    }

    /// Feed one `key=value` line. Each `progress=` line closes a block and
    /// yields a report.
    fn observe(&mut self, key: &str, value: &str) -> Option<ExportProgress> {
        match key {
            "frame" => {
                if let Ok(frame) = value.parse::<i64>() {
                    self.advance(frame);
                }
                None
            }
            // ffmpeg reports microseconds under both keys.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    let out_time = MediaTime::from_nanos(us.saturating_mul(1_000));
                    self.advance(self.frame_rate.frames_for(out_time));
                }
                None
            }
            "progress" if value == "end" => Some(self.report(ExportStage::Finalizing)),
            "progress" => Some(self.report(ExportStage::Rendering)),
            _ => None,
        }
    }

    fn advance(&mut self, frames: i64) {
        self.frames_rendered = self.frames_rendered.max(frames.min(self.total_frames));
    }

    fn report(&self, stage: ExportStage) -> ExportProgress {
        let done = matches!(stage, ExportStage::Finalizing | ExportStage::Complete);
        let frames_rendered = if done {
            self.total_frames
        } else {
            self.frames_rendered
        };
        let progress = if done {
            1.0
        } else if self.total_frames == 0 {
            0.0
        } else {
            frames_rendered as f64 / self.total_frames as f64
        };

        let elapsed = self.elapsed_secs();
        let eta_secs = if progress > 0.0 && progress < 1.0 {
            elapsed / progress - elapsed
        } else {
            0.0
        };

        ExportProgress {
            progress,
            frames_rendered: frames_rendered as u64,
            total_frames: self.total_frames as u64,
            eta_secs,
            stage,
        }
    }

    fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use revunk_processing_core::planner::plan;
    use revunk_project_model::parser::parse_script;

    fn plan_for(script: &str) -> CompositionPlan {
        plan(&parse_script(script).unwrap(), FrameRate::fps(30)).unwrap()
    }

    const HEADER: &str = "video: a.mov\nbpm: 120\ndownbeat: 0\n";

    #[test]
    fn test_cut_only_graph_uses_concat() {
        let plan = plan_for(&format!("{HEADER}export:\n  1 3\n"));
        let graph = build_filter_graph(&plan, true);
        assert!(graph.contains(
            "[0:v]trim=start=0.000000:duration=0.500000,setpts=PTS-STARTPTS,fps=30,format=yuv420p[v0]"
        ));
        assert!(graph.contains("[0:a]atrim=start=1.000000:duration=0.500000,asetpts=PTS-STARTPTS[a1]"));
        assert!(graph.contains("[v0][v1]concat=n=2:v=1:a=0[vj1]"));
        assert!(graph.contains("[a0][a1]concat=n=2:v=0:a=1[aj1]"));
        assert!(graph.ends_with("[vj1]null[vout];[aj1]anull[aout]"));
        assert!(!graph.contains("xfade"));
    }

    #[test]
    fn test_crossfade_graph_uses_xfade_at_overlap() {
        let plan = plan_for(&format!(
            "{HEADER}crossfade:\n  audio 0.1\n  video 0.1\nexport:\n  1 2x1 3\n"
        ));
        let graph = build_filter_graph(&plan, true);
        assert!(graph.contains("[v0][v1]concat=n=2:v=1:a=0[vj1]"));
        assert!(graph.contains(
            "[vj1][v2]xfade=transition=fade:duration=0.100000:offset=0.900000[vj2]"
        ));
        assert!(graph.contains("[aj1][a2]acrossfade=d=0.100000:c1=tri:c2=tri[aj2]"));
    }

    #[test]
    fn test_video_only_crossfade_cuts_audio_at_overlap() {
        let plan = plan_for(&format!("{HEADER}crossfade:\n  video 0.1\nexport:\n  1x1 2\n"));
        let graph = build_filter_graph(&plan, true);
        assert!(graph.contains("xfade=transition=fade:duration=0.100000:offset=0.400000[vj1]"));
        assert!(graph.contains(
            "[a0]atrim=duration=0.400000,asetpts=PTS-STARTPTS[aj1c];[aj1c][a1]concat=n=2:v=0:a=1[aj1]"
        ));
        assert!(!graph.contains("acrossfade"));
    }

    #[test]
    fn test_graph_without_audio() {
        let plan = plan_for(&format!("{HEADER}export:\n  1 2\n"));
        let graph = build_filter_graph(&plan, false);
        assert!(!graph.contains("[0:a]"));
        assert!(!graph.contains("aout"));
    }

    #[test]
    fn test_encoder_args_follow_format() {
        let mut config = ExportConfig::default();
        let args = encoder_args(&config, true);
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"aac".to_string()));
        assert!(args.contains(&"192k".to_string()));

        config.format = ExportFormat::Webm;
        let args = encoder_args(&config, false);
        assert!(args.contains(&"libvpx-vp9".to_string()));
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"libopus".to_string()));
    }

    #[test]
    fn test_invocation_follows_plan() {
        let request = CompositionRequest {
            source_path: PathBuf::from("/m/a.mov"),
            plan: Arc::new(plan_for(&format!("{HEADER}export:\n  1 2 3\n"))),
            output_path: PathBuf::from("/m/a.revunk.out.mp4"),
            config: ExportConfig::default(),
        };

        let silent = FfmpegInvocation::for_request(&request, false).unwrap();
        assert_eq!(silent.total_frames, 45);
        assert!(!silent.args.contains(&"[aout]".to_string()));
        assert_eq!(silent.args.last().map(String::as_str), Some("/m/a.revunk.out.mp4"));
        let rate = silent.args.iter().position(|arg| arg == "-r").unwrap();
        assert_eq!(silent.args[rate + 1], "30");

        let with_audio = FfmpegInvocation::for_request(&request, true).unwrap();
        assert!(with_audio.args.contains(&"[aout]".to_string()));
    }

    #[test]
    fn test_invocation_rejects_empty_plan() {
        let request = CompositionRequest {
            source_path: PathBuf::from("/m/a.mov"),
            plan: Arc::new(CompositionPlan {
                frame_rate: FrameRate::fps(30),
                segments: Vec::new(),
                transitions: Vec::new(),
                duration_frames: 0,
            }),
            output_path: PathBuf::from("/m/a.revunk.out.mp4"),
            config: ExportConfig::default(),
        };
        assert!(FfmpegInvocation::for_request(&request, true).is_err());
    }

    #[test]
    fn test_progress_tracker_counts_plan_frames() {
        let mut tracker = ProgressTracker::new(FrameRate::fps(30), 90);
        assert!(tracker.observe("frame", "45").is_none());
        let report = tracker.observe("progress", "continue").unwrap();
        assert!((report.progress - 0.5).abs() < 1e-9);
        assert_eq!(report.frames_rendered, 45);
        assert_eq!(report.total_frames, 90);
        assert_eq!(report.stage, ExportStage::Rendering);

        // Output time converts through the plan's frame rate.
        tracker.observe("out_time_us", "2000000");
        assert_eq!(tracker.observe("progress", "continue").unwrap().frames_rendered, 60);

        tracker.observe("out_time_us", "N/A");
        tracker.observe("frame", "500");
        assert_eq!(tracker.report(ExportStage::Failed).frames_rendered, 90);

        let end = tracker.observe("progress", "end").unwrap();
        assert_eq!(end.stage, ExportStage::Finalizing);
        assert_eq!(end.progress, 1.0);
    }
}
