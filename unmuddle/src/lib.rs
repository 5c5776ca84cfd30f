//! unmuddle library interface
//!
//! Reorganizes a pen dump (page strokes, page list, audio sessions) into
//! per-notebook folders, tying each recording to the page it was made on.
//! Exposes public APIs for integration testing.

pub mod address;
pub mod error;
pub mod page_index;
pub mod services;
pub mod workflow;

pub use crate::address::{AddressError, PageAddress};
pub use crate::error::{PipelineError, PipelineResult};
pub use crate::page_index::{PageIndex, PageIndexError, PageRecord};
