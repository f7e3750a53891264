//! Renders a single static triangle to a head-mounted display using Direct3D 11.
//!
//! The headset runtime and the graphics device sit behind the [`hmd`] and [`gpu`] traits;
//! [`app::run`] drives them through setup, the frame loop and teardown. On Windows the
//! [`win32`], [`d3d11`] and [`openxr_hmd`] modules provide the real implementations.

pub mod app;
pub mod config;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod gpu;
pub mod hmd;
pub mod math;
pub mod scene;
pub mod targets;

#[cfg(windows)]
pub mod d3d11;
#[cfg(windows)]
pub mod openxr_hmd;
#[cfg(windows)]
pub mod win32;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
