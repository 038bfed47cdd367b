//! Source fingerprints from files and source rediscovery.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;

use revunk_common::error::{RevunkError, RevunkResult};
use revunk_project_model::sidecar::{
    fingerprint_bytes, SourceFingerprint, FINGERPRINT_PREFIX_BYTES,
};

/// Fingerprint the file at `path`.
///
/// Duration comes from ffprobe and is zero when ffprobe is unavailable.
pub fn fingerprint_file(path: &Path) -> RevunkResult<SourceFingerprint> {
    if !path.exists() {
        return Err(RevunkError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let file_size = std::fs::metadata(path)?.len();
    let sha256_prefix = hash_file_prefix(path)?;
    let duration_secs = probe_duration_secs(path).unwrap_or_else(|| {
        tracing::warn!(path = %path.display(), "Could not probe source duration");
        0.0
    });

    Ok(SourceFingerprint {
        original_name: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        file_size,
        duration_secs,
        sha256_prefix,
    })
}

/// Hash the leading bytes of a file.
pub fn hash_file_prefix(path: &Path) -> RevunkResult<String> {
    let mut prefix = Vec::with_capacity(FINGERPRINT_PREFIX_BYTES);
    File::open(path)?
        .take(FINGERPRINT_PREFIX_BYTES as u64)
        .read_to_end(&mut prefix)?;
    Ok(fingerprint_bytes(&prefix))
}

/// Container duration in seconds as reported by ffprobe.
pub fn probe_duration_secs(path: &Path) -> Option<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let raw = String::from_utf8(output.stdout).ok()?;
    let duration = raw.lines().next()?.trim().parse::<f64>().ok()?;
    (duration.is_finite() && duration >= 0.0).then_some(duration)
}

/// Whether the file has at least one audio stream.
pub fn probe_has_audio(path: &Path) -> bool {
    Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "a",
            "-show_entries",
            "stream=index",
            "-of",
            "csv=p=0",
        ])
        .arg(path)
        .output()
        .map(|output| {
            output.status.success() && output.stdout.iter().any(|b| !b.is_ascii_whitespace())
        })
        .unwrap_or(false)
}

/// First file in `search_dirs` matching any of `fingerprints`.
///
/// Directories are searched in order, non-recursively, with entries in name
/// order. A file matches on byte size and, when the fingerprint records
/// one, on content hash.
pub fn find_source(fingerprints: &[SourceFingerprint], search_dirs: &[PathBuf]) -> Option<PathBuf> {
    for dir in search_dirs {
        let Ok(entries) = std::fs::read_dir(dir) else {
            tracing::debug!(dir = %dir.display(), "Skipping unreadable search directory");
            continue;
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();

        for path in files {
            let Ok(size) = std::fs::metadata(&path).map(|m| m.len()) else {
                continue;
            };
            if !fingerprints.iter().any(|fp| fp.file_size == size) {
                continue;
            }

            let hash = match hash_file_prefix(&path) {
                Ok(hash) => hash,
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "Could not hash candidate");
                    continue;
                }
            };
            if fingerprints.iter().any(|fp| fp.matches(size, &hash)) {
                tracing::info!(path = %path.display(), "Found matching source");
                return Some(path);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("revunk_test_sources_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn fingerprint_of(bytes: &[u8], name: &str) -> SourceFingerprint {
        SourceFingerprint {
            original_name: name.to_string(),
            file_size: bytes.len() as u64,
            duration_secs: 0.0,
            sha256_prefix: fingerprint_bytes(bytes),
        }
    }

    #[test]
    fn test_hash_file_prefix_matches_bytes() {
        let dir = test_dir("hash");
        let path = dir.join("clip.mov");
        std::fs::write(&path, b"not really a movie").unwrap();
        assert_eq!(
            hash_file_prefix(&path).unwrap(),
            fingerprint_bytes(b"not really a movie")
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_fingerprint_missing_file() {
        let err = fingerprint_file(Path::new("/nonexistent/revunk/clip.mov")).unwrap_err();
        assert!(matches!(err, RevunkError::FileNotFound { .. }));
    }

    #[test]
    fn test_find_source_requires_matching_hash() {
        let dir = test_dir("find_hash");
        std::fs::write(dir.join("a_decoy.mov"), b"BBBBBBBB").unwrap();
        std::fs::write(dir.join("b_renamed.mov"), b"AAAAAAAA").unwrap();

        let found = find_source(&[fingerprint_of(b"AAAAAAAA", "clip.mov")], &[dir.clone()]);
        assert_eq!(found, Some(dir.join("b_renamed.mov")));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_find_source_size_only_when_hash_unknown() {
        let dir = test_dir("find_size");
        std::fs::write(dir.join("b.mov"), b"12345").unwrap();
        std::fs::write(dir.join("a.mov"), b"67890").unwrap();

        let mut fingerprint = fingerprint_of(b"12345", "clip.mov");
        fingerprint.sha256_prefix.clear();
        let found = find_source(&[fingerprint], &[dir.clone()]);
        assert_eq!(found, Some(dir.join("a.mov")));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_find_source_searches_dirs_in_order() {
        let first = test_dir("order_first");
        let second = test_dir("order_second");
        std::fs::write(second.join("clip.mov"), b"payload").unwrap();

        let missing = first.join("does-not-exist");
        let found = find_source(
            &[fingerprint_of(b"payload", "clip.mov")],
            &[missing, first.clone(), second.clone()],
        );
        assert_eq!(found, Some(second.join("clip.mov")));

        std::fs::remove_dir_all(&first).ok();
        std::fs::remove_dir_all(&second).ok();
    }
}
