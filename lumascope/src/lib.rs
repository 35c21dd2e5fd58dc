// THEORY:
// This file is the main entry point for the `lumascope` library crate. It exposes
// two independent real-time pipelines behind a small public API:
//
// - The video pipeline turns each camera frame into a binary "bright" mask, diffs
//   it against the previous mask, and reports the centroid of newly-bright pixels.
// - The audio pipeline runs an identical bandpass filter over both channels of a
//   stereo stream and renders the filtered window as an X/Y (Lissajous) trace.
//
// The numeric work lives in `core_modules` and is completely synchronous. The
// `pipeline` module wraps it in per-tick state structs, and `runtime` drives those
// structs from periodic tick sources on tokio tasks. Device I/O is abstracted
// behind the collaborator traits in `sources`; the core never knows which
// acquisition strategy produced its frames or samples.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod runtime;
pub mod sources;

pub use config::{AudioConfig, AudioSettings, LumascopeConfig, VideoConfig, VideoSettings};
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{AudioPipeline, SkipReason, TickOutcome, VideoAnalysis, VideoPipeline};
pub use runtime::{PipelineController, PipelineHandle, TickSource, TickStats, Ticker};
