//! Core utilities shared by every Vesper crate.
//!
//! - Error types and result aliases
//! - Logging initialization
//! - Wall-clock timer and the deterministic simulation clock
//! - Renderer configuration (`vesper.toml`)

pub mod config;
mod error;
mod logging;
mod timer;

pub use config::{
    LightingConfig, RenderConfig, RenderMode, RendererConfig, SsrConfig, WaterConfig,
    WindowConfig,
};
pub use error::{Error, Result};
pub use logging::{init_logging, init_logging_with};
pub use timer::{SimulationClock, Timer, wrapped_phase};
