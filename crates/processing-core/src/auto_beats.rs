//! Automatic export-list generation.
//!
//! Picks evenly strided beats from a range so a freshly detected clip has a
//! playable `export:` row before anyone edits it by hand.

use revunk_project_model::project::BeatIndex;

/// Options for the auto export-list generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoExportOptions {
    /// First beat, inclusive.
    pub start_beat: BeatIndex,
    /// Last beat, exclusive.
    pub end_beat: BeatIndex,
    /// Roughly how many beats to pick.
    pub target_beats: u32,
    /// Smallest gap between picked beats.
    pub min_stride: u32,
}

impl Default for AutoExportOptions {
    fn default() -> Self {
        Self {
            start_beat: 1,
            end_beat: 17,
            target_beats: 16,
            min_stride: 1,
        }
    }
}

/// Beats `start, start + stride, ...` below `end`.
///
/// The stride is the range divided by the target count, raised to
/// `min_stride` and to at least one.
pub fn generate(options: &AutoExportOptions) -> Vec<BeatIndex> {
    if options.end_beat <= options.start_beat {
        return Vec::new();
    }

    let total = options.end_beat - options.start_beat;
    let stride = (total / options.target_beats.max(1))
        .max(options.min_stride)
        .max(1);

    (options.start_beat..options.end_beat)
        .step_by(stride as usize)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(start_beat: u32, end_beat: u32, target_beats: u32, min_stride: u32) -> AutoExportOptions {
        AutoExportOptions {
            start_beat,
            end_beat,
            target_beats,
            min_stride,
        }
    }

    #[test]
    fn test_even_stride() {
        assert_eq!(generate(&options(1, 17, 4, 1)), vec![1, 5, 9, 13]);
    }

    #[test]
    fn test_min_stride_wins() {
        assert_eq!(generate(&options(1, 9, 8, 3)), vec![1, 4, 7]);
    }

    #[test]
    fn test_empty_range() {
        assert!(generate(&options(10, 10, 4, 1)).is_empty());
        assert!(generate(&options(10, 3, 4, 1)).is_empty());
    }

    #[test]
    fn test_zero_target_and_stride() {
        assert_eq!(generate(&options(1, 4, 0, 0)), vec![1]);
        assert_eq!(generate(&options(1, 4, 10, 0)), vec![1, 2, 3]);
    }

    #[test]
    fn test_default_covers_sixteen_beats() {
        assert_eq!(generate(&AutoExportOptions::default()).len(), 16);
    }
}
