//! Synthetic pen dump directories
//!
//! Builds the on-disk layout the dump tool produces:
//!
//! ```text
//! <root>/time_offset
//! <root>/written_page_list.xml
//! <root>/data/<p1.p2.p3.p4>/<file>.stf
//! <root>/userdata/<16 hex>/{session.info, session.pages, audio-0.aac}
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use unmuddle::address::{self, PageAddress};

pub struct DumpBuilder {
    dir: TempDir,
    offset: i64,
    notebooks: Vec<(String, Vec<String>)>,
}

impl DumpBuilder {
    pub fn new(offset: i64) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            offset,
            notebooks: Vec::new(),
        }
    }

    /// Declare a page in the page list
    pub fn page(mut self, notebook: &str, address: &str, number: u32, end_time: i64) -> Self {
        let entry = format!(
            r#"<page pageaddress="{}" page="{}" end_time="{}"/>"#,
            address, number, end_time
        );
        match self.notebooks.iter_mut().find(|(id, _)| id == notebook) {
            Some((_, pages)) => pages.push(entry),
            None => self.notebooks.push((notebook.to_string(), vec![entry])),
        }
        self
    }

    /// Add a raw page-list entry (for malformed input tests)
    pub fn raw_page_entry(mut self, notebook: &str, entry: &str) -> Self {
        match self.notebooks.iter_mut().find(|(id, _)| id == notebook) {
            Some((_, pages)) => pages.push(entry.to_string()),
            None => self.notebooks.push((notebook.to_string(), vec![entry.to_string()])),
        }
        self
    }

    /// Write a stroke file under `data/<address>/`
    pub fn stroke_file(self, address: &str, name: &str) -> Self {
        let dir = self.root().join("data").join(address);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), b"stroke data").unwrap();
        self
    }

    /// Write an audio session; `address` of `None` omits `session.pages`
    pub fn session(self, id: &str, pen_time: u64, address: Option<&str>) -> Self {
        let dir = self.root().join("userdata").join(id);
        fs::create_dir_all(&dir).unwrap();

        let mut info = vec![0u8; 16];
        info.extend_from_slice(&pen_time.to_be_bytes());
        fs::write(dir.join("session.info"), info).unwrap();

        if let Some(address) = address {
            let address: PageAddress = address.parse().unwrap();
            fs::write(dir.join("session.pages"), address::encode(&address)).unwrap();
        }

        fs::write(dir.join("audio-0.aac"), b"aac frames").unwrap();
        self
    }

    /// Write everything that is still pending and return the dump root
    pub fn build(self) -> BuiltDump {
        let root = self.root().to_path_buf();
        fs::create_dir_all(root.join("data")).unwrap();
        fs::create_dir_all(root.join("userdata")).unwrap();
        fs::write(root.join("time_offset"), format!("{}\n", self.offset)).unwrap();

        let mut xml = String::from("<written_page_list>\n");
        for (id, pages) in &self.notebooks {
            xml.push_str(&format!("  <lsp guid=\"{}\">\n", id));
            for page in pages {
                xml.push_str(&format!("    {}\n", page));
            }
            xml.push_str("  </lsp>\n");
        }
        xml.push_str("</written_page_list>\n");
        fs::write(root.join("written_page_list.xml"), xml).unwrap();

        BuiltDump {
            output: root.join("out"),
            input: root,
            _dir: self.dir,
        }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }
}

/// A dump on disk plus an output directory next to it
pub struct BuiltDump {
    pub input: PathBuf,
    pub output: PathBuf,
    _dir: TempDir,
}
