//! Recover the script behind an exported file.

use std::path::PathBuf;

use revunk_common::config::AppConfig;
use revunk_render_engine::reopen::reopen_project;

pub fn run(config: &AppConfig, exported: PathBuf) -> anyhow::Result<()> {
    println!("Opening export: {}", exported.display());

    let reopened = reopen_project(&exported, &config.relink.search_dirs)?;

    println!(
        "  Exported by: {} {}",
        reopened.sidecar.engine, reopened.sidecar.engine_version
    );
    if let Some(created_at) = reopened.sidecar.created_at {
        println!("  Created: {created_at}");
    }
    match &reopened.relinked_source {
        Some(source) => println!("  Source: {}", source.display()),
        None => println!("  Source: not found, keeping the recorded path"),
    }

    println!("\nRecovered script: {}", reopened.script_path.display());
    Ok(())
}
