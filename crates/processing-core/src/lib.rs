//! Revunk Processing Core
//!
//! Turns a parsed edit script into something renderable:
//! - **Solver:** Resolve any beat index to an exact source-clip time
//! - **Planner:** Lay export beats onto a two-layer frame timeline
//! - **Grid:** Estimate tempo and anchors from a visual metronome
//! - **Auto Beats:** Pick an evenly strided export list
//!
//! This crate is pure computation with no I/O or platform dependencies.
//! All inputs are data; all outputs are data.

pub mod auto_beats;
pub mod grid;
pub mod planner;
pub mod solver;

pub use grid::BeatGridDetector;
pub use planner::{plan, TimelinePlanner};
pub use solver::BeatTimingSolver;
