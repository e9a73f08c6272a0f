//! Embedded database archive access.
//!
//! The attribute databases ship inside the binary as a gzipped tar with
//! one CSV per database at `databases/<name>.csv`. Extraction is bounded
//! per file so a corrupt or hostile archive cannot balloon memory.

use std::io::Read;

use flate2::read::GzDecoder;
use tar::Archive;

use crate::error::{DalleError, Result};

/// The embedded attribute databases.
pub static EMBEDDED_DATABASES: &[u8] = include_bytes!("../assets/databases.tar.gz");

/// Per-file decompressed size cap.
pub const MAX_DECOMPRESSED_BYTES: u64 = 5 * 1024 * 1024;

/// Read the named database CSV out of the embedded archive and return its
/// lines, header row included.
pub fn read_database_csv(name: &str) -> Result<Vec<String>> {
    read_csv_from(EMBEDDED_DATABASES, name)
}

/// Read `databases/<name>.csv` out of an arbitrary gzipped tar.
///
/// Line endings are normalized to `\n` and trailing blank lines dropped.
pub fn read_csv_from(archive: &[u8], name: &str) -> Result<Vec<String>> {
    let needle = format!("databases/{name}.csv");
    let mut tar = Archive::new(GzDecoder::new(archive));
    for entry in tar.entries()? {
        let mut entry = entry?;
        let path = entry.path()?;
        if path.to_string_lossy() != needle.as_str() {
            continue;
        }
        let mut buf = String::new();
        let read = entry
            .by_ref()
            .take(MAX_DECOMPRESSED_BYTES + 1)
            .read_to_string(&mut buf)?;
        if read as u64 > MAX_DECOMPRESSED_BYTES {
            return Err(DalleError::ArchiveTooLarge {
                name: needle,
                limit: MAX_DECOMPRESSED_BYTES,
            });
        }
        let mut lines: Vec<String> = buf.replace("\r\n", "\n").split('\n').map(String::from).collect();
        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        return Ok(lines);
    }
    Err(DalleError::not_found(format!("archive entry {needle}")))
}
