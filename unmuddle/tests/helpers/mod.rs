//! Test Helper Utilities
//!
//! Shared utilities for testing unmuddle

pub mod dump_builder;
pub mod fake_tools;

// Re-export commonly used items
pub use dump_builder::DumpBuilder;
pub use fake_tools::{Call, FakeTools};
