#![deny(unsafe_code)]
//! Headless EGL contexts and off-screen surfaces for LibCarna.
//!
//! `libEGL` is loaded at runtime, so this crate builds on machines without
//! a GPU; only creating an [`OffscreenContext`] needs a driver.

pub mod config;
pub mod context;
pub mod error;
pub mod surface;

pub use config::ContextConfig;
pub use context::{live_context_count, ContextState, DisplaySource, OffscreenContext};
pub use error::EglError;
pub use surface::Surface;
