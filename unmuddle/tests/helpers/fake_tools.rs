//! In-process stand-in for the external tools
//!
//! Records every call and writes a small placeholder file at each destination
//! so file-time stamping has something to act on.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use unmuddle::services::{Collaborators, ToolOutcome};
use unmuddle::workflow::PageSide;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Render { source: PathBuf, dest: PathBuf, side: PageSide },
    Duration(PathBuf),
    Transcode { source: PathBuf, dest: PathBuf },
    Merge { inputs: Vec<PathBuf>, dest: PathBuf },
    Thumbnail { document: PathBuf, dest: PathBuf, size: u32 },
}

#[derive(Default)]
pub struct FakeTools {
    calls: RefCell<Vec<Call>>,
    /// Reported by every duration probe
    pub duration: Option<u64>,
    /// When set, every render fails without writing output
    pub fail_renders: bool,
}

impl FakeTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duration(mut self, seconds: u64) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn failing_renders(mut self) -> Self {
        self.fail_renders = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl Collaborators for FakeTools {
    fn render_page(&self, source: &Path, dest: &Path, side: PageSide) -> ToolOutcome {
        self.record(Call::Render {
            source: source.to_path_buf(),
            dest: dest.to_path_buf(),
            side,
        });
        if self.fail_renders {
            return ToolOutcome::Failed("renderer exited with 1".to_string());
        }
        fs::write(dest, b"%PDF-1.4").unwrap();
        ToolOutcome::Succeeded
    }

    fn audio_duration(&self, source: &Path) -> Option<u64> {
        self.record(Call::Duration(source.to_path_buf()));
        self.duration
    }

    fn transcode_audio(&self, source: &Path, dest: &Path) -> ToolOutcome {
        self.record(Call::Transcode {
            source: source.to_path_buf(),
            dest: dest.to_path_buf(),
        });
        fs::write(dest, b"OggS").unwrap();
        ToolOutcome::Succeeded
    }

    fn merge_documents(&self, inputs: &[PathBuf], dest: &Path) -> ToolOutcome {
        self.record(Call::Merge {
            inputs: inputs.to_vec(),
            dest: dest.to_path_buf(),
        });
        fs::write(dest, b"%PDF-1.4").unwrap();
        ToolOutcome::Succeeded
    }

    fn render_thumbnail(&self, document: &Path, dest: &Path, size: u32) -> ToolOutcome {
        self.record(Call::Thumbnail {
            document: document.to_path_buf(),
            dest: dest.to_path_buf(),
            size,
        });
        fs::write(dest, b"\x89PNG").unwrap();
        ToolOutcome::Succeeded
    }
}
