//! Revunk Project Model
//!
//! Defines the core data contracts for Revunk projects:
//! - **Project:** The parsed edit script (source, tempo, anchors, export list)
//! - **Parser / Format:** The line-oriented edit-script text and its formatter
//! - **Plan:** The composition plan handed to a render backend
//! - **Sidecar:** Metadata written next to an export for reopen and relink
//!
//! Everything here is pure data and text; file access lives in the
//! render engine.

pub mod format;
pub mod parser;
pub mod plan;
pub mod project;
pub mod sidecar;

pub use format::format_script;
pub use parser::{parse_script, parse_time};
pub use plan::*;
pub use project::*;
pub use sidecar::*;
