//! Scanfile writing.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use dirscan_core::Entry;

use crate::HEADER;
use crate::error::ScanfileError;
use crate::record::format_record;

/// Writes a scanfile header followed by one record per entry.
///
/// Entries must be written parents first, as yielded by a walk.
#[derive(Debug)]
pub struct ScanfileWriter<W: Write> {
    out: W,
    file: PathBuf,
    records: u64,
}

impl ScanfileWriter<BufWriter<File>> {
    /// Create or truncate the scanfile at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, ScanfileError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| ScanfileError::io(path, e))?;
        Self::new(BufWriter::new(file), path)
    }
}

impl<W: Write> ScanfileWriter<W> {
    /// Write the header to `out`. `file` names the destination in errors.
    pub fn new(mut out: W, file: impl Into<PathBuf>) -> Result<Self, ScanfileError> {
        let file = file.into();
        out.write_all(HEADER.as_bytes())
            .map_err(|e| ScanfileError::io(&file, e))?;
        Ok(Self {
            out,
            file,
            records: 0,
        })
    }

    /// Append the record for `entry` found at `relpath`.
    pub fn write_entry(&mut self, relpath: &Path, entry: &Entry) -> Result<(), ScanfileError> {
        let line = format_record(entry, relpath)?;
        writeln!(self.out, "{line}").map_err(|e| ScanfileError::io(&self.file, e))?;
        self.records += 1;
        Ok(())
    }

    /// Number of records written so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W, ScanfileError> {
        self.out
            .flush()
            .map_err(|e| ScanfileError::io(&self.file, e))?;
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirscan_core::{Children, EntryType, RecordFields};

    #[test]
    fn test_writer_emits_header() {
        let writer = ScanfileWriter::new(Vec::new(), "mem").unwrap();
        let out = writer.finish().unwrap();
        assert_eq!(out, b"#!ds:v1\n");
    }

    #[test]
    fn test_writer_records() {
        let fields = RecordFields {
            entry_type: EntryType::Directory,
            size: 0,
            mode: 0o755,
            uid: 1,
            gid: 2,
            mtime: 16.0,
            payload: Default::default(),
        };
        let dir = Entry::from_record("d", "", &fields, Children::new()).unwrap();

        let mut writer = ScanfileWriter::new(Vec::new(), "mem").unwrap();
        writer.write_entry(Path::new("."), &dir).unwrap();
        writer.write_entry(Path::new("sub"), &dir).unwrap();
        assert_eq!(writer.records(), 2);

        let out = String::from_utf8(writer.finish().unwrap()).unwrap();
        assert_eq!(out, "#!ds:v1\nd,0,755,1,2,10,,.\nd,0,755,1,2,10,,./sub\n");
    }
}
