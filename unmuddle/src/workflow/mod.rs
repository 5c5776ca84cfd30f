//! Reconciliation workflow
//!
//! - `reconciler`: joins artifacts against the page index and picks destinations
//! - `layout`: orders notebook pages and builds merge requests
//! - `pipeline`: runs a dump directory end to end

pub mod layout;
pub mod pipeline;
pub mod reconciler;

// Re-exports for convenience
pub use layout::{AggregationRequest, OutputLayoutBuilder};
pub use pipeline::{Pipeline, PipelineOptions, PipelineReport, Produced};
pub use reconciler::{AudioPlacement, NotebookAccumulator, PagePlacement, PageSide, Reconciler};
