//! Combined notebook documents
//!
//! Pages are placed in the order they were found on disk. Before merging a
//! notebook they are re-ordered by page number, read back from the file name.

use crate::workflow::reconciler::{with_extension, NotebookAccumulator};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

/// File stem of a notebook's combined document
pub const COMBINED_DOCUMENT_STEM: &str = "all_pages";

static PAGE_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"page-([0-9]+)").expect("static regex"));

static TRAILING_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9]+)$").expect("static regex"));

/// Request to merge a notebook's pages into one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationRequest {
    pub notebook: String,
    /// Page documents in page-number order
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
}

/// Page number embedded in a page document path
///
/// Reads `page-<n>` from the file name, else trailing digits of the file stem;
/// anything unparseable sorts as page 0.
pub fn page_number_of(path: &Path) -> u64 {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if let Some(caps) = PAGE_NUMBER_RE.captures(&name) {
        return caps[1].parse().unwrap_or(0);
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    TRAILING_NUMBER_RE
        .captures(&stem)
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(0)
}

/// Sort page documents by page number (stable; ties keep prior order)
pub fn order_pages(pages: &mut [PathBuf]) {
    pages.sort_by_cached_key(|path| page_number_of(path));
}

/// Builds merge requests for notebooks
#[derive(Debug, Clone)]
pub struct OutputLayoutBuilder {
    document_extension: String,
}

impl OutputLayoutBuilder {
    pub fn new(document_extension: &str) -> Self {
        Self {
            document_extension: document_extension.to_string(),
        }
    }

    /// Merge request for one notebook, `None` when there is nothing to merge
    ///
    /// A notebook with fewer than two pages produces no combined document. The
    /// output sits next to the first page.
    pub fn combined_document(&self, notebook: NotebookAccumulator) -> Option<AggregationRequest> {
        let name = notebook.notebook().to_string();
        let mut inputs = notebook.into_pages();
        if inputs.len() < 2 {
            return None;
        }

        order_pages(&mut inputs);

        let dir = inputs[0].parent().map(Path::to_path_buf).unwrap_or_default();
        let output = with_extension(&dir.join(COMBINED_DOCUMENT_STEM), &self.document_extension);

        Some(AggregationRequest {
            notebook: name,
            inputs,
            output,
        })
    }
}
