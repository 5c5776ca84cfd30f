//! Page index built from `written_page_list.xml`
//!
//! The page list groups pages under `lsp` (notebook) elements:
//!
//! ```xml
//! <lsp guid="0bf11a726d11f3c1">
//!   <page pageaddress="1.2.3.4" page="2" end_time="1316441900453"/>
//! </lsp>
//! ```
//!
//! Pages without an address cannot be joined against anything on disk and are
//! skipped. A bad page number or end time aborts the whole build: a partially
//! indexed notebook would silently misplace pages.

use crate::address::PageAddress;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use unmuddle_common::{TimeSync, WallClock};

/// File name of the page list inside a dump directory
pub const PAGE_LIST_FILE: &str = "written_page_list.xml";

/// Notebook id used when an `lsp` element carries no `guid`
pub const UNKNOWN_NOTEBOOK: &str = "unknown";

/// Page index errors
#[derive(Debug, Error)]
pub enum PageIndexError {
    /// Page list file does not exist
    #[error("Page list not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Page list could not be read
    #[error("I/O error reading page list: {0}")]
    Io(#[from] std::io::Error),

    /// Page list is not well-formed XML
    #[error("Page list is not valid XML: {0}")]
    Xml(#[from] roxmltree::Error),

    /// A page number or end time is missing or not an integer
    #[error("Page {address} has invalid {attribute} attribute: {value:?}")]
    InvalidAttribute {
        address: String,
        attribute: &'static str,
        value: Option<String>,
    },
}

/// Metadata for one written page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    /// Owning notebook id (opaque)
    pub notebook: String,
    /// Page number within the notebook
    pub number: u32,
    /// When the page was last written
    pub timestamp: WallClock,
}

/// Address-keyed page directory
#[derive(Debug, Default)]
pub struct PageIndex {
    pages: HashMap<PageAddress, PageRecord>,
}

impl PageIndex {
    /// Read and index a page list file
    pub fn load(path: &Path, time: &TimeSync) -> Result<Self, PageIndexError> {
        if !path.is_file() {
            return Err(PageIndexError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let index = Self::build(&text, time)?;
        info!(pages = index.len(), path = %path.display(), "Parsed page list");
        Ok(index)
    }

    /// Index page list XML text
    ///
    /// Later pages with an address already seen replace the earlier record.
    pub fn build(xml: &str, time: &TimeSync) -> Result<Self, PageIndexError> {
        let doc = roxmltree::Document::parse(xml)?;
        let mut pages = HashMap::new();

        let notebooks = doc
            .root_element()
            .descendants()
            .skip(1)
            .filter(|n| n.has_tag_name("lsp"));

        for lsp in notebooks {
            let notebook = lsp.attribute("guid").unwrap_or(UNKNOWN_NOTEBOOK);

            for page in lsp.children().filter(|n| n.has_tag_name("page")) {
                let raw_address = match page.attribute("pageaddress") {
                    Some(a) if !a.is_empty() => a,
                    _ => {
                        debug!(notebook, "Skipping page without address");
                        continue;
                    }
                };

                let number: u32 = parse_attribute(&page, raw_address, "page")?;
                let end_time: i64 = parse_attribute(&page, raw_address, "end_time")?;

                let address = match raw_address.parse::<PageAddress>() {
                    Ok(address) => address,
                    Err(e) => {
                        warn!(notebook, error = %e, "Skipping page with unusable address");
                        continue;
                    }
                };

                let record = PageRecord {
                    notebook: notebook.to_string(),
                    number,
                    timestamp: time.to_wall_clock(end_time),
                };

                if let Some(previous) = pages.insert(address, record) {
                    debug!(
                        %address,
                        previous_notebook = %previous.notebook,
                        previous_number = previous.number,
                        "Duplicate page address, keeping later entry"
                    );
                }
            }
        }

        Ok(Self { pages })
    }

    /// Look up the record for an address
    pub fn get(&self, address: &PageAddress) -> Option<&PageRecord> {
        self.pages.get(address)
    }

    /// Whether an address is indexed
    pub fn contains(&self, address: &PageAddress) -> bool {
        self.pages.contains_key(address)
    }

    /// Number of indexed pages
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

fn parse_attribute<T: std::str::FromStr>(
    page: &roxmltree::Node<'_, '_>,
    address: &str,
    attribute: &'static str,
) -> Result<T, PageIndexError> {
    let raw = page.attribute(attribute);
    raw.and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| PageIndexError::InvalidAttribute {
            address: address.to_string(),
            attribute,
            value: raw.map(str::to_string),
        })
}
