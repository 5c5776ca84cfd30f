//! Artifact placement
//!
//! Joins classified artifacts against the page index and decides where each
//! one lands in the output tree:
//!
//! ```text
//! notebook-<id>/page-<n>.pdf
//! notebook-<id>/page-<n>-recording_<stamp>_<secs>.<ext>
//! other_recordings/recording_<stamp>_<secs>.<ext>
//! ```
//!
//! A recording whose address is unknown, or known but not in the index, goes
//! to `other_recordings/`. That is the normal outcome for sessions recorded
//! away from paper, not an error.

use crate::page_index::{PageIndex, PageRecord};
use crate::services::artifact_scanner::{AudioArtifact, PageArtifact};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;
use unmuddle_common::WallClock;

/// Directory for recordings that could not be tied to a page
pub const ORPHAN_DIR: &str = "other_recordings";

/// Which page background the renderer should use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSide {
    Left,
    Right,
}

impl PageSide {
    /// Odd page numbers are right-hand pages
    pub fn for_page(number: u32) -> Self {
        if number % 2 > 0 {
            PageSide::Right
        } else {
            PageSide::Left
        }
    }

    /// Background image file name
    pub fn background_file(self) -> &'static str {
        match self {
            PageSide::Left => "left.png",
            PageSide::Right => "right.png",
        }
    }
}

/// Where a page document goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePlacement {
    pub source_path: PathBuf,
    pub record: PageRecord,
    /// Full output path including the document extension
    pub destination: PathBuf,
    pub side: PageSide,
}

/// Where a recording goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPlacement {
    pub source_path: PathBuf,
    /// Output path without extension; the extension depends on transcoding
    pub destination_stem: PathBuf,
    pub timestamp: WallClock,
    /// Page the recording was tied to, `None` when orphaned
    pub page: Option<PageRecord>,
}

impl AudioPlacement {
    pub fn is_orphaned(&self) -> bool {
        self.page.is_none()
    }

    /// Output path with the given extension appended
    pub fn destination(&self, extension: &str) -> PathBuf {
        with_extension(&self.destination_stem, extension)
    }
}

/// Page documents produced for one notebook, in discovery order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotebookAccumulator {
    notebook: String,
    pages: Vec<PathBuf>,
}

impl NotebookAccumulator {
    pub fn new(notebook: impl Into<String>) -> Self {
        Self {
            notebook: notebook.into(),
            pages: Vec::new(),
        }
    }

    pub fn push(&mut self, page: PathBuf) {
        self.pages.push(page);
    }

    pub fn notebook(&self) -> &str {
        &self.notebook
    }

    pub fn pages(&self) -> &[PathBuf] {
        &self.pages
    }

    pub fn into_pages(self) -> Vec<PathBuf> {
        self.pages
    }
}

/// Placement state for one run
///
/// Owns the per-notebook accumulators; notebooks keep the order in which
/// their first page was placed.
pub struct Reconciler {
    output_root: PathBuf,
    document_extension: String,
    notebooks: Vec<NotebookAccumulator>,
    positions: HashMap<String, usize>,
}

impl Reconciler {
    pub fn new(output_root: impl Into<PathBuf>, document_extension: &str) -> Self {
        Self {
            output_root: output_root.into(),
            document_extension: document_extension.to_string(),
            notebooks: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Place a page artifact and record it in its notebook
    ///
    /// `None` only if the address is no longer in the index, which the scanner
    /// already filters out.
    pub fn place_page(&mut self, artifact: &PageArtifact, index: &PageIndex) -> Option<PagePlacement> {
        let record = index.get(&artifact.address)?;

        let file_name = format!("page-{}.{}", record.number, self.document_extension);
        let destination = self.notebook_dir(&record.notebook).join(file_name);

        self.accumulator(&record.notebook).push(destination.clone());

        debug!(
            source = %artifact.source_path.display(),
            destination = %destination.display(),
            "Placed page"
        );

        Some(PagePlacement {
            source_path: artifact.source_path.clone(),
            record: record.clone(),
            destination,
            side: PageSide::for_page(record.number),
        })
    }

    /// Place a recording next to its page, or under `other_recordings/`
    pub fn place_audio(
        &self,
        artifact: &AudioArtifact,
        duration_secs: u64,
        index: &PageIndex,
    ) -> AudioPlacement {
        let recording = format!("recording_{}_{}", artifact.timestamp.stamp(), duration_secs);

        let page = artifact
            .resolved_address
            .as_ref()
            .and_then(|address| index.get(address));

        let destination_stem = match page {
            Some(record) => self
                .notebook_dir(&record.notebook)
                .join(format!("page-{}-{}", record.number, recording)),
            None => self.output_root.join(ORPHAN_DIR).join(recording),
        };

        debug!(
            source = %artifact.source_path.display(),
            destination = %destination_stem.display(),
            orphaned = page.is_none(),
            "Placed recording"
        );

        AudioPlacement {
            source_path: artifact.source_path.clone(),
            destination_stem,
            timestamp: artifact.timestamp,
            page: page.cloned(),
        }
    }

    /// Accumulators in first-placement order
    pub fn notebooks(&self) -> &[NotebookAccumulator] {
        &self.notebooks
    }

    pub fn into_notebooks(self) -> Vec<NotebookAccumulator> {
        self.notebooks
    }

    fn notebook_dir(&self, notebook: &str) -> PathBuf {
        self.output_root.join(format!("notebook-{}", notebook))
    }

    fn accumulator(&mut self, notebook: &str) -> &mut NotebookAccumulator {
        let position = match self.positions.get(notebook) {
            Some(&position) => position,
            None => {
                self.notebooks.push(NotebookAccumulator::new(notebook));
                let position = self.notebooks.len() - 1;
                self.positions.insert(notebook.to_string(), position);
                position
            }
        };
        &mut self.notebooks[position]
    }
}

/// Append `.<extension>` without touching dots already in the file name
pub(crate) fn with_extension(path: &Path, extension: &str) -> PathBuf {
    let mut raw = OsString::from(path.as_os_str());
    raw.push(".");
    raw.push(extension);
    PathBuf::from(raw)
}
