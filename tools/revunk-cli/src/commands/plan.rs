//! Print the composition plan for a script.

use std::path::PathBuf;

use revunk_common::config::AppConfig;
use revunk_common::time::FrameRate;
use revunk_processing_core::planner::TimelinePlanner;
use revunk_project_model::parser::parse_script;

pub fn run(config: &AppConfig, script: PathBuf, fps: Option<u32>) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&script)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", script.display()))?;
    let project = parse_script(&text)?;

    let frame_rate = FrameRate::fps(fps.unwrap_or(config.export.frame_rate));
    let plan = TimelinePlanner::with_frame_rate(frame_rate).plan(&project)?;

    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
