pub mod detect_grid;
pub mod export;
pub mod format;
pub mod open;
pub mod plan;
