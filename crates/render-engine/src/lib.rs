//! Revunk Render Engine
//!
//! Offline pipeline that turns a project script and its source clip into
//! an exported remix, plus the metadata sidecar that lets the export be
//! reopened later.
//!
//! # Pipeline Architecture
//!
//! ```text
//! song.revunk.txt ──┐
//!                   ├── Parse + Plan (cached)
//! frame rate ───────┘         │
//!                             ├── Trim segments
//! source.mov ─────────────────┘         │
//!                                       ├── Cut / Crossfade join
//!                                       ▼
//!                                 Encode (H.264)
//!                                       │
//!                       ┌───────────────┴───────────────┐
//!                       ▼                               ▼
//!              song.revunk.out.mp4      song.revunk.out.metadata.revunk.txt
//! ```

pub mod cache;
pub mod export;
pub mod ffmpeg;
pub mod grid_sampler;
mod process;
pub mod reopen;
pub mod sources;

pub use export::*;
