//! Pen clock to wall clock conversion
//!
//! The pen stamps everything in milliseconds relative to a device-specific
//! reference point. The dump tool writes the difference between that clock and
//! Unix-epoch milliseconds into a `time_offset` file, which is loaded once per
//! run and never recomputed.

use crate::{Error, Result};
use chrono::{DateTime, Local, TimeZone};
use std::fmt;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// File name of the offset record inside a dump directory
pub const TIME_OFFSET_FILE: &str = "time_offset";

/// Format used for timestamps embedded in output file names
pub const STAMP_FORMAT: &str = "%Y-%m-%d_%H:%M";

/// Wall-clock instant with one-second resolution
///
/// Only [`TimeSync::to_wall_clock`] creates these, so every wall-clock value in
/// the pipeline has passed through the same offset correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WallClock(i64);

impl WallClock {
    /// Seconds since the Unix epoch
    pub fn unix_seconds(self) -> i64 {
        self.0
    }

    /// Instant in the local time zone, `None` when outside chrono's range
    pub fn to_local(self) -> Option<DateTime<Local>> {
        Local.timestamp_opt(self.0, 0).earliest()
    }

    /// File-name stamp (`YYYY-MM-DD_HH:MM`, local time)
    ///
    /// Falls back to the raw second count for instants chrono cannot represent.
    pub fn stamp(self) -> String {
        match self.to_local() {
            Some(local) => local.format(STAMP_FORMAT).to_string(),
            None => self.0.to_string(),
        }
    }

    /// Equivalent `SystemTime`, used when stamping file modification times
    pub fn system_time(self) -> SystemTime {
        let span = Duration::from_secs(self.0.unsigned_abs());
        let shifted = if self.0 >= 0 {
            UNIX_EPOCH.checked_add(span)
        } else {
            UNIX_EPOCH.checked_sub(span)
        };
        shifted.unwrap_or(UNIX_EPOCH)
    }
}

impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Converts pen timestamps to wall-clock time using a fixed offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSync {
    offset: i64,
}

impl TimeSync {
    /// Create a converter for a known offset (pen milliseconds)
    pub fn new(offset: i64) -> Self {
        Self { offset }
    }

    /// Load the offset from a `time_offset` file
    ///
    /// The file holds a single decimal integer, surrounding whitespace allowed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::NotFound(path.to_path_buf()));
        }

        let raw = std::fs::read_to_string(path)?;
        let offset = raw.trim().parse::<i64>().map_err(|e| {
            Error::InvalidInput(format!(
                "time offset in {} is not an integer ({:?}): {}",
                path.display(),
                raw.trim(),
                e
            ))
        })?;

        tracing::debug!(offset, path = %path.display(), "Loaded pen time offset");
        Ok(Self::new(offset))
    }

    /// Offset in pen milliseconds
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Convert a pen timestamp to wall-clock seconds
    ///
    /// Computes `(device_time + offset) / 1000` with floor division. Total over
    /// both `i64` and `u64` inputs; no sanity filtering is applied here.
    pub fn to_wall_clock(&self, device_time: impl Into<i128>) -> WallClock {
        let millis = device_time.into() + i128::from(self.offset);
        // |u64::MAX + i64::MAX| / 1000 fits comfortably in i64
        WallClock(millis.div_euclid(1000) as i64)
    }
}
