//! # unmuddle common library
//!
//! Shared code for the unmuddle workspace:
//! - Error types
//! - Configuration loading (TOML file, environment, compiled defaults)
//! - Pen-clock to wall-clock conversion

pub mod config;
pub mod error;
pub mod time;

pub use error::{Error, Result};
pub use time::{TimeSync, WallClock};
