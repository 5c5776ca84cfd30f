//! Service modules for the reconciliation pipeline
//!
//! - `artifact_scanner`: walks the capture roots and classifies what it finds
//! - `tools`: external programs the pipeline delegates rendering and audio to

pub mod artifact_scanner;
pub mod tools;

pub use artifact_scanner::{ArtifactDescriptor, ArtifactScanner, AudioArtifact, PageArtifact};
pub use tools::{Collaborators, ExternalTools, ToolError, ToolKind, ToolOutcome, ToolRequirements};
