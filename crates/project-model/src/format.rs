//! Edit-script formatter.
//!
//! Reflows `export:` rows into left-aligned columns and leaves every other
//! line as written. Formatting is idempotent.

use crate::parser::{classify_line, LineKind};

/// Indent used for export rows.
const ROW_INDENT: &str = "  ";

/// Format an edit script.
///
/// The whole document is trimmed and ends with exactly one newline. Inside an
/// `export:` block each token is padded on the right to the widest token of the
/// block. A block ends at a blank line or at the next header or `key: value`
/// line; comment lines inside a block are kept in place.
pub fn format_script(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<&str>> = Vec::new();
    let mut in_export = false;

    for line in text.trim().lines() {
        let trimmed = line.trim();

        if !in_export {
            out.push(line.to_string());
            in_export = classify_line(trimmed) == LineKind::Header("export");
            continue;
        }

        if trimmed.is_empty() {
            flush_rows(&mut rows, &mut out);
            in_export = false;
            out.push(line.to_string());
        } else if trimmed.starts_with('#') {
            flush_rows(&mut rows, &mut out);
            out.push(line.to_string());
        } else {
            match classify_line(trimmed) {
                LineKind::Row => rows.push(trimmed.split_whitespace().collect()),
                kind => {
                    flush_rows(&mut rows, &mut out);
                    in_export = kind == LineKind::Header("export");
                    out.push(line.to_string());
                }
            }
        }
    }
    flush_rows(&mut rows, &mut out);

    let mut formatted = out.join("\n").trim_end().to_string();
    formatted.push('\n');
    formatted
}

fn flush_rows(rows: &mut Vec<Vec<&str>>, out: &mut Vec<String>) {
    let width = rows
        .iter()
        .flatten()
        .map(|token| token.chars().count())
        .max()
        .unwrap_or(0);

    for row in rows.drain(..) {
        let cells: Vec<String> = row
            .iter()
            .map(|token| format!("{token:<width$}"))
            .collect();
        let line = format!("{ROW_INDENT}{}", cells.join(" "));
        out.push(line.trim_end().to_string());
    }
}
