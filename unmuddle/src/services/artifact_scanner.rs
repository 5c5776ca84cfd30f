//! Capture tree scanner
//!
//! Walks the two capture roots of a dump and classifies what it finds:
//! - `data/**/<p1.p2.p3.p4>/**/*.stf` become page artifacts
//! - `userdata/**/<session id>/*.aac` become audio artifacts
//!
//! Both walks are lazy and single-pass. Entries that cannot be classified are
//! dropped with a log line; nothing here aborts a scan.

use crate::address::{self, PageAddress};
use crate::page_index::PageIndex;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use unmuddle_common::{TimeSync, WallClock};
use walkdir::{DirEntry, WalkDir};

/// Companion record holding the session start time
pub const SESSION_INFO_FILE: &str = "session.info";

/// Companion record holding the packed address of the first page written
pub const SESSION_PAGES_FILE: &str = "session.pages";

/// Bytes skipped in `session.info` before the big-endian start time
pub const SESSION_TIME_OFFSET: usize = 16;

/// Directory name carrying a dotted page address (prefix match)
static PAGE_DIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+\.[0-9]+\.[0-9]+\.[0-9]+").expect("static regex"));

/// Directory name carrying a 16-hex-digit session id (prefix match)
static SESSION_DIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-f]{16}").expect("static regex"));

/// Page stroke file found under an addressed directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageArtifact {
    pub source_path: PathBuf,
    pub address: PageAddress,
}

/// Audio recording found under a session directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    pub source_path: PathBuf,
    /// Session directory id, not interpreted further
    pub session_id: Option<String>,
    /// Session start time
    pub timestamp: WallClock,
    /// First page written during the session, when the record decodes
    pub resolved_address: Option<PageAddress>,
}

/// Classified capture artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactDescriptor {
    Page(PageArtifact),
    Audio(AudioArtifact),
}

/// Capture tree scanner
pub struct ArtifactScanner {
    page_root: PathBuf,
    audio_root: PathBuf,
    page_extension: String,
    audio_extension: String,
    ignore_patterns: Vec<String>,
}

impl ArtifactScanner {
    /// Create a scanner for the given page and audio roots
    ///
    /// Ignores system files like .DS_Store, Thumbs.db, .git.
    pub fn new(page_root: impl Into<PathBuf>, audio_root: impl Into<PathBuf>) -> Self {
        Self {
            page_root: page_root.into(),
            audio_root: audio_root.into(),
            page_extension: "stf".to_string(),
            audio_extension: "aac".to_string(),
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
            ],
        }
    }

    /// Override the page source extension (without dot)
    pub fn with_page_extension(mut self, ext: &str) -> Self {
        self.page_extension = ext.to_string();
        self
    }

    /// Override the audio source extension (without dot)
    pub fn with_audio_extension(mut self, ext: &str) -> Self {
        self.audio_extension = ext.to_string();
        self
    }

    /// Page walk followed by audio walk
    pub fn artifacts<'a>(
        &'a self,
        index: &'a PageIndex,
        time: &'a TimeSync,
    ) -> impl Iterator<Item = ArtifactDescriptor> + 'a {
        self.page_artifacts(index)
            .map(ArtifactDescriptor::Page)
            .chain(self.audio_artifacts(time).map(ArtifactDescriptor::Audio))
    }

    /// Page stroke files whose directory address is in the index
    pub fn page_artifacts<'a>(
        &'a self,
        index: &'a PageIndex,
    ) -> impl Iterator<Item = PageArtifact> + 'a {
        let suffix = format!(".{}", self.page_extension);

        self.walk_files(&self.page_root)
            .filter(move |entry| has_suffix(entry, &suffix))
            .filter_map(move |entry| {
                let path = entry.into_path();
                let Some(text) = deepest_match(&self.page_root, &path, &PAGE_DIR_RE) else {
                    debug!(path = %path.display(), "Page file outside an addressed directory");
                    return None;
                };

                let address = match text.parse::<PageAddress>() {
                    Ok(address) => address,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping page file");
                        return None;
                    }
                };

                if !index.contains(&address) {
                    warn!(
                        path = %path.display(),
                        %address,
                        "Page address not in page list, skipping"
                    );
                    return None;
                }

                Some(PageArtifact {
                    source_path: path,
                    address,
                })
            })
    }

    /// Audio recordings with their session time and (optional) page address
    pub fn audio_artifacts<'a>(
        &'a self,
        time: &'a TimeSync,
    ) -> impl Iterator<Item = AudioArtifact> + 'a {
        let suffix = format!(".{}", self.audio_extension);

        self.walk_files(&self.audio_root)
            .filter(move |entry| has_suffix(entry, &suffix))
            .filter_map(move |entry| {
                let path = entry.into_path();
                let dir = path.parent().unwrap_or(self.audio_root.as_path());

                let pen_time = match read_session_time(&dir.join(SESSION_INFO_FILE)) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(
                            path = %path.display(),
                            error = %e,
                            "No readable session.info, skipping recording"
                        );
                        return None;
                    }
                };

                let resolved_address = match address::decode_file(&dir.join(SESSION_PAGES_FILE)) {
                    Ok(address) => Some(address),
                    Err(e) => {
                        debug!(path = %path.display(), reason = %e, "Recording has no page address");
                        None
                    }
                };

                let session_id = deepest_match(&self.audio_root, &path, &SESSION_DIR_RE);

                Some(AudioArtifact {
                    session_id,
                    timestamp: time.to_wall_clock(pen_time),
                    resolved_address,
                    source_path: path,
                })
            })
    }

    /// Files under `root`, skipping ignored entries and logging walk errors
    fn walk_files<'a>(&'a self, root: &Path) -> impl Iterator<Item = DirEntry> + 'a {
        WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| !self.is_ignored(e))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Error accessing entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
    }

    /// Ignore patterns match whole file names only
    fn is_ignored(&self, entry: &DirEntry) -> bool {
        let file_name = entry.file_name().to_string_lossy();
        self.ignore_patterns
            .iter()
            .any(|pattern| file_name == pattern.as_str())
    }
}

/// Read the pen start time from a `session.info` record
pub fn read_session_time(path: &Path) -> std::io::Result<u64> {
    let mut file = File::open(path)?;
    let mut record = [0u8; SESSION_TIME_OFFSET + 8];
    file.read_exact(&mut record)?;

    let mut raw = [0u8; 8];
    raw.copy_from_slice(&record[SESSION_TIME_OFFSET..]);
    Ok(u64::from_be_bytes(raw))
}

fn has_suffix(entry: &DirEntry, suffix: &str) -> bool {
    entry.file_name().to_string_lossy().ends_with(suffix)
}

/// Deepest directory segment between `root` and `path` matching `pattern`
fn deepest_match(root: &Path, path: &Path, pattern: &Regex) -> Option<String> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .parent()?
        .components()
        .filter_map(|c| {
            let segment = c.as_os_str().to_string_lossy();
            pattern.find(&segment).map(|m| m.as_str().to_string())
        })
        .last()
}
