//! Core library for the hearing-assist application.
//!
//! Captured microphone audio runs through a fixed cascade of six peaking
//! filters and a gain stage before reaching the default output device. The
//! [`PipelineController`] owns that graph's lifecycle and applies volume and
//! per-band gain changes to it while audio keeps flowing.

pub mod config;
pub mod error;
pub mod filter;
pub mod gain;
pub mod graph;
pub mod host;
pub mod param;
pub mod pipeline;
pub mod settings;

pub use config::{AppConfig, AudioConfig};
pub use error::{HearingError, Result};
pub use filter::{Band, BandFilter, FilterBank, FilterCascade};
pub use gain::{volume_to_multiplier, GainStage};
pub use graph::{GraphNode, SignalGraph};
pub use host::{AudioHost, CaptureConstraints, CaptureSession, CpalHost, OutputSession};
pub use param::SharedParam;
pub use pipeline::{PipelineController, PipelineState, ResourceUsage};
pub use settings::{AudioSettings, BandGains};
