//! Page addresses and the packed `session.pages` record
//!
//! A page address is four integers (`p1.p2.p3.p4`). On disk it shows up twice:
//! as a dotted directory name under `data/`, and packed into the first record
//! of an audio session's `session.pages` file.
//!
//! The packed layout was worked out by inspecting dumps; there is no vendor
//! documentation. After a 6-byte header, 8 payload bytes (big-endian):
//!
//! ```text
//! byte   0   1   2 | 3   4 | 5  | 6          | 7
//!        p1 (24)   | p2    | p3 | p3lo|p4hi | p4lo
//! ```
//!
//! Byte 6 is shared: its upper nibble holds the low 4 bits of `p3`, its lower
//! nibble the high 4 bits of `p4`.

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Bytes skipped before the packed payload
pub const HEADER_LEN: usize = 6;

/// Packed payload length
pub const PAYLOAD_LEN: usize = 8;

/// Minimum record length accepted by [`decode`]
pub const RECORD_LEN: usize = HEADER_LEN + PAYLOAD_LEN;

/// Exclusive upper bounds of each component
pub const P1_LIMIT: u32 = 1 << 24;
pub const P2_LIMIT: u32 = 1 << 16;
pub const P3_LIMIT: u32 = 1 << 12;
pub const P4_LIMIT: u32 = 1 << 12;

/// Address decoding/parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Packed record too short or unreadable
    #[error("Malformed address record: {0}")]
    Malformed(String),

    /// Dotted text is not four in-range integers
    #[error("Invalid page address {0:?}")]
    InvalidText(String),
}

/// Four-component page address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageAddress {
    p1: u32,
    p2: u16,
    p3: u16,
    p4: u16,
}

impl PageAddress {
    /// Build an address, rejecting components outside their bit widths
    pub fn new(p1: u32, p2: u32, p3: u32, p4: u32) -> Option<Self> {
        if p1 >= P1_LIMIT || p2 >= P2_LIMIT || p3 >= P3_LIMIT || p4 >= P4_LIMIT {
            return None;
        }
        Some(Self {
            p1,
            p2: p2 as u16,
            p3: p3 as u16,
            p4: p4 as u16,
        })
    }

    /// Components as `(p1, p2, p3, p4)`
    pub fn components(&self) -> (u32, u32, u32, u32) {
        (
            self.p1,
            u32::from(self.p2),
            u32::from(self.p3),
            u32::from(self.p4),
        )
    }
}

impl fmt::Display for PageAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.p1, self.p2, self.p3, self.p4)
    }
}

impl FromStr for PageAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AddressError::InvalidText(s.to_string());

        let mut parts = [0u32; 4];
        let mut fields = s.split('.');
        for slot in parts.iter_mut() {
            let field = fields.next().ok_or_else(invalid)?;
            if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            *slot = field.parse().map_err(|_| invalid())?;
        }
        if fields.next().is_some() {
            return Err(invalid());
        }

        Self::new(parts[0], parts[1], parts[2], parts[3]).ok_or_else(invalid)
    }
}

/// Decode a packed address record
///
/// Anything beyond the first [`RECORD_LEN`] bytes is ignored.
pub fn decode(blob: &[u8]) -> Result<PageAddress, AddressError> {
    if blob.len() < RECORD_LEN {
        return Err(AddressError::Malformed(format!(
            "need {} bytes, got {}",
            RECORD_LEN,
            blob.len()
        )));
    }

    let b = &blob[HEADER_LEN..RECORD_LEN];

    let p1 = u32::from_be_bytes([0, b[0], b[1], b[2]]);
    let p2 = u16::from_be_bytes([b[3], b[4]]);
    let shared = b[6];
    let p3 = (u16::from(b[5]) << 4) | u16::from(shared >> 4);
    let p4 = (u16::from(shared & 0x0F) << 8) | u16::from(b[7]);

    Ok(PageAddress { p1, p2, p3, p4 })
}

/// Read and decode the first record of a `session.pages` file
///
/// Missing or truncated files are reported as [`AddressError::Malformed`];
/// callers treat that as "address unknown".
pub fn decode_file(path: &Path) -> Result<PageAddress, AddressError> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| AddressError::Malformed(format!("{}: {}", path.display(), e)))?;

    let mut record = [0u8; RECORD_LEN];
    file.read_exact(&mut record)
        .map_err(|e| AddressError::Malformed(format!("{}: {}", path.display(), e)))?;

    decode(&record)
}

/// Pack an address into a record with a zeroed header
pub fn encode(address: &PageAddress) -> [u8; RECORD_LEN] {
    let mut record = [0u8; RECORD_LEN];
    let b = &mut record[HEADER_LEN..];

    let p1 = address.p1.to_be_bytes();
    b[0..3].copy_from_slice(&p1[1..4]);
    b[3..5].copy_from_slice(&address.p2.to_be_bytes());
    b[5] = (address.p3 >> 4) as u8;
    b[6] = (((address.p3 & 0x0F) as u8) << 4) | ((address.p4 >> 8) as u8 & 0x0F);
    b[7] = (address.p4 & 0xFF) as u8;

    record
}
