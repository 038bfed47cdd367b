//! Edit-script parser.
//!
//! The script is line-oriented:
//!
//! ```text
//! video: clip.mov
//! bpm: 100
//! downbeat: 00:00:01.5
//!
//! anchor:
//!   32 00:00:15.9
//!
//! tempo:
//!   33 90
//!
//! crossfade:
//!   audio 0.3
//!   video 0.3
//!
//! export:
//!   1 2x1 3 3 4
//! ```
//!
//! Parsing is tolerant: unknown keys, unknown sections and malformed section
//! rows are skipped. The only hard failure is a timestamp with more than
//! three `:`-separated fields.

use revunk_common::error::{RevunkError, RevunkResult};
use revunk_common::time::MediaTime;

use crate::project::{
    Anchor, AnchorKind, BeatEdit, BeatIndex, CrossfadePolicy, ProjectDescription, TempoChange,
};

/// Sections that govern the rows following their header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Anchor,
    Tempo,
    Crossfade,
    Export,
    /// A header we do not interpret (e.g. `grid:`); its rows are ignored.
    Unknown,
}

impl Section {
    fn from_header(name: &str) -> Self {
        match name {
            "anchor" => Self::Anchor,
            "tempo" => Self::Tempo,
            "crossfade" => Self::Crossfade,
            "export" => Self::Export,
            _ => Self::Unknown,
        }
    }
}

/// Classification of one trimmed, non-blank, non-comment line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineKind<'a> {
    /// `name:` on its own.
    Header(&'a str),
    /// `key: value` where `key` is a plain identifier.
    KeyValue(&'a str, &'a str),
    /// Anything else: a row of the open section.
    Row,
}

/// Classify a trimmed line.
///
/// A row like `32 00:00:15.9` contains colons too; it is told apart from
/// `key: value` because the text before its first colon is not an identifier.
pub(crate) fn classify_line(line: &str) -> LineKind<'_> {
    if let Some(name) = line.strip_suffix(':') {
        if is_identifier(name) {
            return LineKind::Header(name);
        }
    }

    if let Some((key, value)) = line.split_once(':') {
        let key = key.trim();
        if is_identifier(key) {
            return LineKind::KeyValue(key, value.trim());
        }
    }

    LineKind::Row
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Parse an edit script into a project description.
pub fn parse_script(text: &str) -> RevunkResult<ProjectDescription> {
    let mut project = ProjectDescription::default();
    let mut section: Option<Section> = None;

    for (line_no, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match classify_line(line) {
            LineKind::Header(name) => {
                section = Some(Section::from_header(name));
            }
            LineKind::KeyValue(key, value) => {
                section = None;
                apply_field(&mut project, key, value)?;
            }
            LineKind::Row => match section {
                Some(Section::Anchor) => parse_anchor_row(&mut project, line)?,
                Some(Section::Tempo) => parse_tempo_row(&mut project, line),
                Some(Section::Crossfade) => parse_crossfade_row(&mut project, line),
                Some(Section::Export) => parse_export_row(&mut project, line),
                Some(Section::Unknown) => {}
                None => {
                    tracing::debug!(line = line_no + 1, "Ignoring row outside any section");
                }
            },
        }
    }

    tracing::debug!(
        anchors = project.anchors.len(),
        tempo_changes = project.tempo_changes.len(),
        export_beats = project.export_beats.len(),
        "Parsed edit script"
    );

    Ok(project)
}

fn apply_field(project: &mut ProjectDescription, key: &str, value: &str) -> RevunkResult<()> {
    match key {
        "video" => project.source_reference = Some(value.to_string()),
        "bpm" => project.base_tempo_bpm = value.parse::<f64>().ok(),
        "downbeat" => project.downbeat_time = Some(parse_time(value)?),
        "offset" => project.time_offset = Some(parse_time(value)?),
        _ => tracing::debug!(key, "Ignoring unknown field"),
    }
    Ok(())
}

fn parse_anchor_row(project: &mut ProjectDescription, line: &str) -> RevunkResult<()> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if let [beat, time] = parts.as_slice() {
        if let Some(beat_index) = parse_beat_index(beat) {
            project.anchors.push(Anchor {
                beat_index,
                kind: AnchorKind::Absolute(parse_time(time)?),
            });
        }
    }
    Ok(())
}

fn parse_tempo_row(project: &mut ProjectDescription, line: &str) {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if let [beat, bpm] = parts.as_slice() {
        if let (Some(beat_index), Ok(bpm)) = (parse_beat_index(beat), bpm.parse::<f64>()) {
            project.tempo_changes.push(TempoChange { beat_index, bpm });
        }
    }
}

fn parse_crossfade_row(project: &mut ProjectDescription, line: &str) {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let [medium, duration] = parts.as_slice() else {
        return;
    };
    let Ok(duration_secs) = duration.parse::<f64>() else {
        return;
    };

    let existing = project.default_crossfade.unwrap_or(CrossfadePolicy {
        duration_secs,
        applies_to_audio: false,
        applies_to_video: false,
    });
    project.default_crossfade = Some(CrossfadePolicy {
        duration_secs,
        applies_to_audio: existing.applies_to_audio || *medium == "audio",
        applies_to_video: existing.applies_to_video || *medium == "video",
    });
}

fn parse_export_row(project: &mut ProjectDescription, line: &str) {
    for token in line.split_whitespace() {
        if let Some(edit) = parse_export_token(token) {
            project.export_beats.push(edit);
        }
    }
}

/// `7` is a cut after beat 7; `7x1` crossfades into the next entry.
///
/// The integer after `x` is required by the token shape but not otherwise
/// interpreted.
fn parse_export_token(token: &str) -> Option<BeatEdit> {
    match token.split_once('x') {
        None => parse_beat_index(token).map(BeatEdit::cut),
        Some((beat, suffix)) => {
            suffix.parse::<u64>().ok()?;
            parse_beat_index(beat).map(BeatEdit::crossfade)
        }
    }
}

fn parse_beat_index(token: &str) -> Option<BeatIndex> {
    token.parse::<BeatIndex>().ok().filter(|beat| *beat >= 1)
}

/// Parse `ss`, `mm:ss`, or `hh:mm:ss` (fractional seconds allowed).
///
/// Fields that are not numbers count as zero. Fails on a wrong field count
/// or a value that is not finite or does not fit in `MediaTime`.
pub fn parse_time(text: &str) -> RevunkResult<MediaTime> {
    let fields: Vec<f64> = text
        .trim()
        .split(':')
        .map(|field| field.trim().parse::<f64>().unwrap_or(0.0))
        .collect();

    let seconds = match fields.as_slice() {
        [s] => *s,
        [m, s] => m * 60.0 + s,
        [h, m, s] => h * 3600.0 + m * 60.0 + s,
        _ => return Err(RevunkError::malformed_time(text)),
    };

    MediaTime::try_from_secs_f64(seconds).ok_or_else(|| RevunkError::malformed_time(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::BeatTransition;

    #[test]
    fn test_basic_file_parsing() {
        let text = "\
video: test.mov
downbeat: 00:00:01.500
bpm: 120

export:
  1  2  3  4
  5  6
";
        let project = parse_script(text).unwrap();
        assert_eq!(project.source_reference.as_deref(), Some("test.mov"));
        assert_eq!(project.base_tempo_bpm, Some(120.0));
        assert_eq!(project.downbeat_time, Some(MediaTime::from_millis(1500)));
        let beats: Vec<u32> = project.export_beats.iter().map(|e| e.beat_index).collect();
        assert_eq!(beats, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_anchors_and_tempo() {
        let text = "\
downbeat: 0
bpm: 100

anchor:
  32 00:00:15.9

tempo:
  33 90
";
        let project = parse_script(text).unwrap();
        assert_eq!(project.anchors.len(), 1);
        assert_eq!(project.anchors[0].beat_index, 32);
        assert_eq!(
            project.anchors[0].kind,
            AnchorKind::Absolute(MediaTime::from_millis(15_900))
        );
        assert_eq!(project.tempo_changes[0].beat_index, 33);
        assert_eq!(project.tempo_changes[0].bpm, 90.0);
    }

    #[test]
    fn test_crossfade_rows_merge_flags() {
        let text = "crossfade:\n  audio 0.5\n  video 0.3\n";
        let fade = parse_script(text).unwrap().default_crossfade.unwrap();
        assert!(fade.applies_to_audio);
        assert!(fade.applies_to_video);
        assert!((fade.duration_secs - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_export_tokens_mark_transitions() {
        let project = parse_script("export:\n  1 2x1 3 4x 5y2 0 -1\n").unwrap();
        let edits: Vec<(u32, BeatTransition)> = project
            .export_beats
            .iter()
            .map(|e| (e.beat_index, e.transition))
            .collect();
        assert_eq!(
            edits,
            vec![
                (1, BeatTransition::Cut),
                (2, BeatTransition::Crossfade),
                (3, BeatTransition::Cut),
            ]
        );
    }

    #[test]
    fn test_key_value_line_closes_section() {
        let text = "export:\n  1 2\nbpm: 90\n  3\n";
        let project = parse_script(text).unwrap();
        assert_eq!(project.base_tempo_bpm, Some(90.0));
        assert_eq!(project.export_beats.len(), 2);
    }

    #[test]
    fn test_unknown_section_rows_are_ignored() {
        let text = "grid:\n  x 0.3800\n  y 0.0400\nexport:\n  1\n";
        let project = parse_script(text).unwrap();
        assert_eq!(project.export_beats, vec![BeatEdit::cut(1)]);
    }

    #[test]
    fn test_comments_and_blank_lines_skipped() {
        let text = "# a remix\n\n   # indented comment\nvideo: a.mov\n";
        let project = parse_script(text).unwrap();
        assert_eq!(project.source_reference.as_deref(), Some("a.mov"));
    }

    #[test]
    fn test_parse_time_field_counts() {
        assert_eq!(parse_time("90").unwrap(), MediaTime::from_secs_f64(90.0));
        assert_eq!(parse_time("1:30").unwrap(), MediaTime::from_secs_f64(90.0));
        assert_eq!(parse_time("01:00:02.5").unwrap(), MediaTime::from_secs_f64(3602.5));
        assert!(matches!(
            parse_time("1:2:3:4"),
            Err(RevunkError::MalformedTime { .. })
        ));
    }

    #[test]
    fn test_parse_time_tolerates_garbage_fields() {
        assert_eq!(parse_time("abc").unwrap(), MediaTime::ZERO);
        assert_eq!(parse_time("x:10").unwrap(), MediaTime::from_secs_f64(10.0));
    }

    #[test]
    fn test_malformed_downbeat_fails_parse() {
        let err = parse_script("downbeat: 1:2:3:4\n").unwrap_err();
        assert!(matches!(err, RevunkError::MalformedTime { token } if token == "1:2:3:4"));
    }

    #[test]
    fn test_malformed_anchor_time_fails_parse() {
        let err = parse_script("bpm: 120\n\nanchor:\n  32 00:00:15.9\n  48 1:2:3:4\n").unwrap_err();
        assert!(matches!(err, RevunkError::MalformedTime { token } if token == "1:2:3:4"));
    }

    #[test]
    fn test_out_of_range_time_is_malformed() {
        let err = parse_script("video: a.mov\nbpm: 120\ndownbeat: 1e12\nexport:\n  2\n").unwrap_err();
        assert!(matches!(err, RevunkError::MalformedTime { token } if token == "1e12"));
        assert!(matches!(parse_time("inf"), Err(RevunkError::MalformedTime { .. })));
        assert!(matches!(parse_time("nan"), Err(RevunkError::MalformedTime { .. })));
    }

    #[test]
    fn test_unparseable_bpm_is_left_unset() {
        let project = parse_script("bpm: fast\n").unwrap();
        assert_eq!(project.base_tempo_bpm, None);
    }

    #[test]
    fn test_classify_line() {
        assert_eq!(classify_line("export:"), LineKind::Header("export"));
        assert_eq!(classify_line("bpm: 120"), LineKind::KeyValue("bpm", "120"));
        assert_eq!(
            classify_line("downbeat: 00:00:01.5"),
            LineKind::KeyValue("downbeat", "00:00:01.5")
        );
        assert_eq!(classify_line("32 00:00:15.9"), LineKind::Row);
        assert_eq!(classify_line("1 2x1 3"), LineKind::Row);
    }
}
