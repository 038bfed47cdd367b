//! Reopening a project from an exported file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use revunk_common::error::{RevunkError, RevunkResult};
use revunk_project_model::sidecar::{relink_video_line, MetadataSidecar, SIDECAR_EXTENSION};

use crate::sources::find_source;

/// Suffix appended to an exported file's name for the recovered script.
pub const RECOVERED_SCRIPT_SUFFIX: &str = ".revunk.txt";

/// A project recovered from an export.
#[derive(Debug, Clone)]
pub struct ReopenedProject {
    /// Where the recovered script was written.
    pub script_path: PathBuf,
    /// Recovered script text, relinked when a source was found.
    pub project_text: String,
    /// Source file the `video:` line now points at, if relinked.
    pub relinked_source: Option<PathBuf>,
    pub sidecar: MetadataSidecar,
}

/// Sidecar path for an exported file: its extension replaced.
pub fn sidecar_path_for(exported: &Path) -> PathBuf {
    exported.with_extension(SIDECAR_EXTENSION)
}

/// Recovered script path for an exported file: its name plus `.revunk.txt`.
pub fn recovered_script_path(exported: &Path) -> PathBuf {
    let mut name: OsString = exported.as_os_str().to_owned();
    name.push(RECOVERED_SCRIPT_SUFFIX);
    PathBuf::from(name)
}

/// Read the sidecar written next to `exported`.
pub fn read_sidecar(exported: &Path) -> RevunkResult<MetadataSidecar> {
    let path = sidecar_path_for(exported);
    if !path.exists() {
        return Err(RevunkError::MetadataNotFound { path });
    }
    let text = std::fs::read_to_string(&path)?;
    Ok(MetadataSidecar::from_text(&text))
}

/// Recover the project behind `exported` and write it next to the export.
///
/// The export's own directory is searched for a moved source first, then
/// `search_dirs`.
pub fn reopen_project(exported: &Path, search_dirs: &[PathBuf]) -> RevunkResult<ReopenedProject> {
    let sidecar = read_sidecar(exported)?;

    let export_dir = match exported.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut dirs = vec![export_dir];
    dirs.extend(search_dirs.iter().cloned());

    let relinked_source = if sidecar.sources.is_empty() {
        None
    } else {
        find_source(&sidecar.sources, &dirs)
    };

    let project_text = match &relinked_source {
        Some(source) => relink_video_line(&sidecar.project_text, &source.display().to_string()),
        None => {
            if !sidecar.sources.is_empty() {
                tracing::warn!(
                    exported = %exported.display(),
                    "No matching source found, keeping the recorded video path"
                );
            }
            sidecar.project_text.clone()
        }
    };

    let script_path = recovered_script_path(exported);
    std::fs::write(&script_path, &project_text)?;
    tracing::info!(
        script = %script_path.display(),
        relinked = relinked_source.is_some(),
        "Recovered project"
    );

    Ok(ReopenedProject {
        script_path,
        project_text,
        relinked_source,
        sidecar,
    })
}
