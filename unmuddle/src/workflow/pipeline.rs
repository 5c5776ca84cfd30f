//! Pipeline orchestration
//!
//! Runs one dump directory through the whole reconciliation:
//! 1. Locate inputs (offset, page list, capture roots)
//! 2. Load the time offset and build the page index
//! 3. Page walk: render each page, stamp its mtime, optional thumbnail
//! 4. Audio walk: place each recording, transcode or copy, stamp its mtime
//! 5. Optional: merge each notebook's pages into one document
//!
//! Strictly sequential. The page index and notebook accumulators live in this
//! run's context only and are passed down by reference.

use crate::error::{PipelineError, PipelineResult};
use crate::page_index::{PageIndex, PAGE_LIST_FILE};
use crate::services::artifact_scanner::{ArtifactDescriptor, ArtifactScanner};
use crate::services::tools::{Collaborators, ToolOutcome};
use crate::workflow::layout::{AggregationRequest, OutputLayoutBuilder};
use crate::workflow::reconciler::{with_extension, AudioPlacement, PagePlacement, Reconciler};
use std::fs::{File, FileTimes};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use unmuddle_common::config::DEFAULT_THUMBNAIL_SIZE;
use unmuddle_common::time::TIME_OFFSET_FILE;
use unmuddle_common::{TimeSync, WallClock};

/// Extension of rendered page documents
pub const DOCUMENT_EXTENSION: &str = "pdf";

/// Extension of transcoded recordings
pub const TRANSCODED_AUDIO_EXTENSION: &str = "ogg";

/// Extension of recordings copied as-is
pub const RAW_AUDIO_EXTENSION: &str = "aac";

/// Capture root holding page stroke files
pub const PAGE_DATA_DIR: &str = "data";

/// Capture root holding audio sessions
pub const USER_DATA_DIR: &str = "userdata";

/// Directory (next to a document) receiving its thumbnail
pub const THUMBNAIL_DIR: &str = "thumbnails";

/// Features requested for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Copy recordings as AAC instead of transcoding
    pub keep_aac: bool,
    /// Merge each notebook into `all_pages.pdf`
    pub combine_notebooks: bool,
    /// Render PNG thumbnails of produced documents
    pub thumbnails: bool,
    /// Maximum thumbnail dimension
    pub thumbnail_size: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            keep_aac: false,
            combine_notebooks: false,
            thumbnails: false,
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
        }
    }
}

/// Paths inside a dump directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpLayout {
    pub time_offset: PathBuf,
    pub page_list: PathBuf,
    pub page_root: PathBuf,
    pub audio_root: PathBuf,
}

impl DumpLayout {
    /// Locate and check every required input under `input`
    pub fn locate(input: &Path) -> PipelineResult<Self> {
        let layout = Self {
            time_offset: input.join(TIME_OFFSET_FILE),
            page_list: input.join(PAGE_LIST_FILE),
            page_root: input.join(PAGE_DATA_DIR),
            audio_root: input.join(USER_DATA_DIR),
        };

        let missing = |what: &'static str, path: &Path| PipelineError::MissingInput {
            what,
            path: path.to_path_buf(),
        };

        if !layout.time_offset.is_file() {
            return Err(missing("time offset", &layout.time_offset));
        }
        if !layout.page_list.is_file() {
            return Err(missing("page list", &layout.page_list));
        }
        if !layout.page_root.is_dir() {
            return Err(missing("page data directory", &layout.page_root));
        }
        if !layout.audio_root.is_dir() {
            return Err(missing("user data directory", &layout.audio_root));
        }

        Ok(layout)
    }
}

/// An output the pipeline asked a collaborator to produce
///
/// `path` is recorded whatever the outcome; `outcome` says whether the
/// collaborator reported success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Produced<P> {
    pub placement: P,
    pub path: PathBuf,
    pub outcome: ToolOutcome,
}

/// Everything a run produced
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub pages: Vec<Produced<PagePlacement>>,
    pub recordings: Vec<Produced<AudioPlacement>>,
    pub notebooks: Vec<Produced<AggregationRequest>>,
    /// Thumbnails attempted, with their outcome
    pub thumbnails: Vec<(PathBuf, ToolOutcome)>,
}

impl PipelineReport {
    pub fn orphaned_recordings(&self) -> usize {
        self.recordings
            .iter()
            .filter(|r| r.placement.is_orphaned())
            .count()
    }

    /// Collaborator calls that reported failure
    pub fn tool_failures(&self) -> usize {
        let pages = self.pages.iter().filter(|p| !p.outcome.is_success()).count();
        let recordings = self.recordings.iter().filter(|r| !r.outcome.is_success()).count();
        let notebooks = self.notebooks.iter().filter(|n| !n.outcome.is_success()).count();
        let thumbnails = self.thumbnails.iter().filter(|(_, o)| !o.is_success()).count();
        pages + recordings + notebooks + thumbnails
    }
}

/// One reconciliation run
pub struct Pipeline<'a> {
    options: PipelineOptions,
    tools: &'a dyn Collaborators,
}

impl<'a> Pipeline<'a> {
    pub fn new(options: PipelineOptions, tools: &'a dyn Collaborators) -> Self {
        Self { options, tools }
    }

    /// Reorganize the dump at `input` into `output`
    pub fn run(&self, input: &Path, output: &Path) -> PipelineResult<PipelineReport> {
        let dump = DumpLayout::locate(input)?;

        let time = TimeSync::load(&dump.time_offset)?;
        let index = PageIndex::load(&dump.page_list, &time)?;

        let scanner = ArtifactScanner::new(&dump.page_root, &dump.audio_root);
        let mut reconciler = Reconciler::new(output, DOCUMENT_EXTENSION);
        let mut report = PipelineReport::default();

        for artifact in scanner.artifacts(&index, &time) {
            match artifact {
                ArtifactDescriptor::Page(page) => {
                    if let Some(placement) = reconciler.place_page(&page, &index) {
                        self.produce_page(placement, &mut report)?;
                    }
                }
                ArtifactDescriptor::Audio(audio) => {
                    let duration = self.tools.audio_duration(&audio.source_path).unwrap_or(0);
                    let placement = reconciler.place_audio(&audio, duration, &index);
                    self.produce_recording(placement, &mut report)?;
                }
            }
        }

        if self.options.combine_notebooks {
            let builder = OutputLayoutBuilder::new(DOCUMENT_EXTENSION);
            for notebook in reconciler.into_notebooks() {
                if let Some(request) = builder.combined_document(notebook) {
                    self.produce_combined(request, &mut report)?;
                }
            }
        }

        info!(
            pages = report.pages.len(),
            recordings = report.recordings.len(),
            orphaned = report.orphaned_recordings(),
            notebooks = report.notebooks.len(),
            tool_failures = report.tool_failures(),
            "Reconciliation complete"
        );

        Ok(report)
    }

    fn produce_page(&self, placement: PagePlacement, report: &mut PipelineReport) -> PipelineResult<()> {
        ensure_parent(&placement.destination)?;

        info!(
            source = %placement.source_path.display(),
            destination = %placement.destination.display(),
            "Converting page"
        );
        let outcome = self
            .tools
            .render_page(&placement.source_path, &placement.destination, placement.side);
        log_failure(&outcome, &placement.destination);

        stamp_mtime(&placement.destination, placement.record.timestamp);

        if self.options.thumbnails {
            self.produce_thumbnail(&placement.destination, report)?;
        }

        report.pages.push(Produced {
            path: placement.destination.clone(),
            placement,
            outcome,
        });
        Ok(())
    }

    fn produce_recording(
        &self,
        placement: AudioPlacement,
        report: &mut PipelineReport,
    ) -> PipelineResult<()> {
        ensure_parent(&placement.destination_stem)?;

        let (path, outcome) = if self.options.keep_aac {
            let path = placement.destination(RAW_AUDIO_EXTENSION);
            std::fs::copy(&placement.source_path, &path)
                .map_err(|e| PipelineError::io(&path, e))?;
            (path, ToolOutcome::Succeeded)
        } else {
            let path = placement.destination(TRANSCODED_AUDIO_EXTENSION);
            info!(
                source = %placement.source_path.display(),
                destination = %path.display(),
                "Transcoding recording"
            );
            let outcome = self.tools.transcode_audio(&placement.source_path, &path);
            log_failure(&outcome, &path);
            (path, outcome)
        };

        stamp_mtime(&path, placement.timestamp);

        report.recordings.push(Produced {
            placement,
            path,
            outcome,
        });
        Ok(())
    }

    fn produce_combined(
        &self,
        request: AggregationRequest,
        report: &mut PipelineReport,
    ) -> PipelineResult<()> {
        ensure_parent(&request.output)?;

        info!(
            notebook = %request.notebook,
            pages = request.inputs.len(),
            "Generating notebook pdf"
        );
        let outcome = self.tools.merge_documents(&request.inputs, &request.output);
        log_failure(&outcome, &request.output);

        if self.options.thumbnails {
            self.produce_thumbnail(&request.output, report)?;
        }

        report.notebooks.push(Produced {
            path: request.output.clone(),
            placement: request,
            outcome,
        });
        Ok(())
    }

    fn produce_thumbnail(&self, document: &Path, report: &mut PipelineReport) -> PipelineResult<()> {
        let dest = thumbnail_path(document);
        ensure_parent(&dest)?;

        let outcome = self
            .tools
            .render_thumbnail(document, &dest, self.options.thumbnail_size);
        log_failure(&outcome, &dest);

        report.thumbnails.push((dest, outcome));
        Ok(())
    }
}

/// `<dir>/thumbnails/<file name>.png` for a document at `<dir>/<file name>`
pub fn thumbnail_path(document: &Path) -> PathBuf {
    let dir = document.parent().unwrap_or_else(|| Path::new(""));
    let name = document.file_name().unwrap_or_default();
    with_extension(&dir.join(THUMBNAIL_DIR).join(name), "png")
}

fn ensure_parent(path: &Path) -> PipelineResult<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            std::fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))
        }
        _ => Ok(()),
    }
}

fn log_failure(outcome: &ToolOutcome, path: &Path) {
    if let ToolOutcome::Failed(reason) = outcome {
        warn!(destination = %path.display(), reason = %reason, "External tool failed");
    }
}

/// Set access and modification time; a missing output is logged, not fatal
fn stamp_mtime(path: &Path, when: WallClock) {
    let time = when.system_time();
    let result = File::options()
        .write(true)
        .open(path)
        .and_then(|file| file.set_times(FileTimes::new().set_accessed(time).set_modified(time)));

    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "Could not set file time");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_path() {
        assert_eq!(
            thumbnail_path(Path::new("out/notebook-N1/page-2.pdf")),
            PathBuf::from("out/notebook-N1/thumbnails/page-2.pdf.png")
        );
    }

    #[test]
    fn test_locate_reports_first_missing_input() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join(TIME_OFFSET_FILE), "0").unwrap();

        match DumpLayout::locate(temp.path()) {
            Err(PipelineError::MissingInput { what, path }) => {
                assert_eq!(what, "page list");
                assert_eq!(path, temp.path().join(PAGE_LIST_FILE));
            }
            other => panic!("Expected MissingInput, got {:?}", other),
        }
    }

    #[test]
    fn test_locate_requires_capture_roots() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join(TIME_OFFSET_FILE), "0").unwrap();
        std::fs::write(temp.path().join(PAGE_LIST_FILE), "<root/>").unwrap();
        std::fs::create_dir(temp.path().join(PAGE_DATA_DIR)).unwrap();

        assert!(matches!(
            DumpLayout::locate(temp.path()),
            Err(PipelineError::MissingInput { what: "user data directory", .. })
        ));

        std::fs::create_dir(temp.path().join(USER_DATA_DIR)).unwrap();
        let layout = DumpLayout::locate(temp.path()).unwrap();
        assert_eq!(layout.audio_root, temp.path().join(USER_DATA_DIR));
    }

    #[test]
    fn test_stamp_mtime_sets_modified() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("page-1.pdf");
        std::fs::write(&path, b"%PDF").unwrap();

        let when = TimeSync::new(0).to_wall_clock(1_500_000_000_000i64);
        stamp_mtime(&path, when);

        let modified = std::fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(modified, when.system_time());
    }

    #[test]
    fn test_report_counts_failures() {
        let mut report = PipelineReport::default();
        report.thumbnails.push((PathBuf::from("a.png"), ToolOutcome::Succeeded));
        report
            .thumbnails
            .push((PathBuf::from("b.png"), ToolOutcome::Failed("exit 1".to_string())));
        assert_eq!(report.tool_failures(), 1);
        assert_eq!(report.orphaned_recordings(), 0);
    }
}
