//! Metadata sidecar written next to every export.
//!
//! The sidecar records which source clip an export was cut from and the
//! exact edit script that produced it, so the project can be reopened from
//! the exported file alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// File header line.
pub const SIDECAR_HEADER: &str = "# metadata.revunk.txt";

/// Suffix replacing the export's extension.
pub const SIDECAR_EXTENSION: &str = "metadata.revunk.txt";

/// Bytes of source content hashed for a fingerprint.
pub const FINGERPRINT_PREFIX_BYTES: usize = 1024 * 1024;

/// Hex characters kept from the digest.
pub const FINGERPRINT_HEX_LEN: usize = 16;

const INDENT: &str = "  ";

/// Identifies a source clip independently of its path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFingerprint {
    pub original_name: String,
    pub file_size: u64,
    pub duration_secs: f64,
    /// Leading hex digits of the SHA-256 of the first MiB. Empty when unknown.
    pub sha256_prefix: String,
}

impl SourceFingerprint {
    /// Whether a candidate file with `size` and content hash `prefix` is this source.
    pub fn matches(&self, size: u64, prefix: &str) -> bool {
        self.file_size == size && (self.sha256_prefix.is_empty() || self.sha256_prefix == prefix)
    }
}

/// Hash the leading bytes of a source clip.
///
/// Only the first [`FINGERPRINT_PREFIX_BYTES`] are read so large clips are
/// cheap to identify.
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let limit = bytes.len().min(FINGERPRINT_PREFIX_BYTES);
    let digest = Sha256::digest(&bytes[..limit]);
    digest
        .iter()
        .take(FINGERPRINT_HEX_LEN / 2)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// The sidecar document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataSidecar {
    pub engine: String,
    pub engine_version: String,
    pub created_at: Option<DateTime<Utc>>,
    pub sources: Vec<SourceFingerprint>,
    /// Edit script exactly as it was exported.
    pub project_text: String,
    pub notes: Vec<String>,
}

impl MetadataSidecar {
    /// A sidecar stamped with this engine and the current time.
    pub fn new(project_text: impl Into<String>, sources: Vec<SourceFingerprint>) -> Self {
        Self {
            engine: "revunk".to_string(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Some(Utc::now()),
            sources,
            project_text: project_text.into(),
            notes: Vec::new(),
        }
    }

    /// Render the sidecar text.
    pub fn to_text(&self) -> String {
        let mut lines: Vec<String> = vec![
            SIDECAR_HEADER.to_string(),
            format!("engine: {}", self.engine),
            format!("engine-version: {}", self.engine_version),
        ];
        if let Some(created_at) = self.created_at {
            lines.push(format!("created-at: {}", created_at.to_rfc3339()));
        }

        lines.push(String::new());
        lines.push("sources:".to_string());
        for source in &self.sources {
            lines.push(format!("{INDENT}- name: {}", source.original_name));
            lines.push(format!("{INDENT}  size: {}", source.file_size));
            lines.push(format!("{INDENT}  duration: {:.3}", source.duration_secs));
            lines.push(format!("{INDENT}  sha256-prefix: {}", source.sha256_prefix));
        }

        lines.push(String::new());
        lines.push("project:".to_string());
        for line in self.project_text.split('\n') {
            lines.push(format!("{INDENT}{line}"));
        }

        if !self.notes.is_empty() {
            lines.push(String::new());
            lines.push("notes:".to_string());
            for note in &self.notes {
                lines.push(format!("{INDENT}- {note}"));
            }
        }

        let mut text = lines.join("\n");
        text.push('\n');
        text
    }

    /// Read a sidecar back.
    ///
    /// Unknown lines are skipped. A file without a `project:` block yields an
    /// empty project text. Blank lines inside the project block are kept
    /// even when their indent has been stripped; trailing ones are dropped.
    pub fn from_text(text: &str) -> Self {
        let mut sidecar = Self {
            engine: String::new(),
            engine_version: String::new(),
            created_at: None,
            sources: Vec::new(),
            project_text: String::new(),
            notes: Vec::new(),
        };

        let mut lines = text.lines().peekable();
        while let Some(line) = lines.next() {
            match line {
                "sources:" => {
                    while let Some(entry) = lines.next_if(|l| l.starts_with(INDENT)) {
                        parse_source_line(&mut sidecar.sources, entry.trim());
                    }
                }
                "project:" => {
                    let mut project: Vec<&str> = Vec::new();
                    let mut blanks = 0;
                    // A blank line that lost its indent stays in the block
                    // only if more indented lines follow it.
                    while let Some(entry) =
                        lines.next_if(|l| l.starts_with(INDENT) || l.trim().is_empty())
                    {
                        match entry.strip_prefix(INDENT) {
                            Some(content) => {
                                project.extend(std::iter::repeat("").take(blanks));
                                blanks = 0;
                                project.push(content);
                            }
                            None => blanks += 1,
                        }
                    }
                    sidecar.project_text = project.join("\n");
                }
                "notes:" => {
                    while let Some(entry) = lines.next_if(|l| l.starts_with(INDENT)) {
                        let note = entry.trim_start();
                        let note = note.strip_prefix("- ").unwrap_or(note);
                        sidecar.notes.push(note.to_string());
                    }
                }
                _ => {
                    if let Some((key, value)) = line.split_once(": ") {
                        match key {
                            "engine" => sidecar.engine = value.to_string(),
                            "engine-version" => sidecar.engine_version = value.to_string(),
                            "created-at" => {
                                sidecar.created_at = DateTime::parse_from_rfc3339(value)
                                    .ok()
                                    .map(|t| t.with_timezone(&Utc));
                            }
                            _ => {}
                        }
                    }
                }
            }
        }

        sidecar
    }
}

fn parse_source_line(sources: &mut Vec<SourceFingerprint>, entry: &str) {
    if let Some(name) = entry.strip_prefix("- name:") {
        sources.push(SourceFingerprint {
            original_name: name.trim().to_string(),
            file_size: 0,
            duration_secs: 0.0,
            sha256_prefix: String::new(),
        });
        return;
    }

    let (Some(source), Some((key, value))) = (sources.last_mut(), entry.split_once(':')) else {
        return;
    };
    let value = value.trim();
    match key {
        "size" => source.file_size = value.parse().unwrap_or(0),
        "duration" => source.duration_secs = value.parse().unwrap_or(0.0),
        "sha256-prefix" => source.sha256_prefix = value.to_string(),
        _ => {}
    }
}

/// Point the script's `video:` line at `path`, keeping every other line.
///
/// A script without a `video:` line gets one prepended.
pub fn relink_video_line(project_text: &str, path: &str) -> String {
    let mut replaced = false;
    let lines: Vec<String> = project_text
        .split('\n')
        .map(|line| {
            let trimmed = line.trim_start();
            if !replaced && trimmed.starts_with("video:") {
                replaced = true;
                let indent = &line[..line.len() - trimmed.len()];
                format!("{indent}video: {path}")
            } else {
                line.to_string()
            }
        })
        .collect();

    let text = lines.join("\n");
    if replaced {
        text
    } else {
        format!("video: {path}\n{text}")
    }
}
