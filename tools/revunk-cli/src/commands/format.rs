//! Align the export block of a script.

use std::path::PathBuf;

use revunk_project_model::format::format_script;

pub fn run(script: PathBuf, in_place: bool) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&script)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", script.display()))?;
    let formatted = format_script(&text);

    if in_place {
        if formatted != text {
            std::fs::write(&script, &formatted)?;
            tracing::info!(script = %script.display(), "Formatted script");
        }
    } else {
        print!("{formatted}");
    }
    Ok(())
}
