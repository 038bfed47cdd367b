//! Render a script to video.

use std::path::PathBuf;

use revunk_common::config::AppConfig;
use revunk_common::time::FrameRate;
use revunk_render_engine::cache::PlanCache;
use revunk_render_engine::export::{export_project, ExportConfig, ExportJob, ExportProgress};

pub async fn run(
    config: &AppConfig,
    script: PathBuf,
    output: Option<PathBuf>,
    fps: Option<u32>,
    format: Option<String>,
) -> anyhow::Result<()> {
    println!("Exporting script: {}", script.display());

    let mut export_config = ExportConfig::from_defaults(&config.export)?;
    if let Some(fps) = fps {
        export_config.frame_rate = FrameRate::fps(fps);
    }
    if let Some(format) = format {
        export_config.format = format.parse()?;
    }

    let mut job = ExportJob::new(script, export_config);
    if let Some(output) = output {
        job.output_path = output;
    }

    println!("  Output: {}", job.output_path.display());
    println!("  Format: {:?}", job.config.format);
    println!("  Frame rate: {}", job.config.frame_rate);

    let progress_cb: Box<dyn Fn(ExportProgress) + Send> = Box::new(|p| {
        print!(
            "\r  Progress: {:.1}% ({}/{} frames, ETA: {:.0}s)  ",
            p.progress * 100.0,
            p.frames_rendered,
            p.total_frames,
            p.eta_secs,
        );
    });

    let cache = PlanCache::new();
    let outcome = export_project(job, &cache, Some(progress_cb)).await?;

    println!("\nExport complete: {}", outcome.output_path.display());
    println!("  Metadata: {}", outcome.sidecar_path.display());
    println!(
        "  {} segments, {} crossfades",
        outcome.plan.segments.len(),
        outcome.plan.transitions.len()
    );
    Ok(())
}
