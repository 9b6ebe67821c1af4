use std::{
    fs::{File, OpenOptions},
    io::{self, Seek, SeekFrom, Write},
    path::Path,
};

use log::debug;
use tempfile::NamedTempFile;

use super::Record;
use crate::error::Error;

/// Appends framed [Record]s to a log. Existing bytes are never rewritten.
pub struct LogWriter {
    file: File,
    end: u64,
}

impl LogWriter {
    /// Creates a new log at path, truncating any prior content.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = File::create(path)?;
        Ok(Self { file, end: 0 })
    }

    /// Opens the log at path for appending, creating it if need be.
    pub fn append_to(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let end = file.metadata()?.len();
        Ok(Self { file, end })
    }

    /// Appends a new [Record], returns the new end of log offset.
    pub fn append(&mut self, record: &Record) -> Result<u64, Error> {
        let frame = record.encode()?;
        self.file.write_all(&frame)?;
        self.end += frame.len() as u64;
        Ok(self.end)
    }

    /// Current end of log offset.
    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        self.file.flush()?;
        Ok(())
    }
}

/// Discards the log prefix [0, offset): the remaining tail is copied
/// next to the log, then renamed in place.
pub fn compact(path: impl AsRef<Path>, offset: u64) -> Result<(), Error> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut input = File::open(path)?;
    let len = input.metadata()?.len();
    if offset > len {
        return Err(Error::OffsetOutOfBounds { offset, len });
    }

    let mut temp = NamedTempFile::new_in(dir)?;

    input.seek(SeekFrom::Start(offset))?;
    let copied = io::copy(&mut input, temp.as_file_mut())?;
    temp.as_file().sync_all()?;
    drop(input);

    temp.persist(path).map_err(|e| Error::Io(e.error))?;

    debug!(
        "{}: compacted {} -> {} bytes",
        path.display(),
        len,
        copied
    );
    Ok(())
}
