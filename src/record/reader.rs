use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::Path,
};

use super::{parse_frame, Record, RecordKind, FRAME_SIZE};
use crate::error::Error;

/// Where to start reading from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LogPosition {
    /// Physical end of file
    End,
    /// Byte offset, must be a record boundary
    Offset(u64),
}

/// Reads framed [Record]s from a log, in either direction.
pub struct LogReader {
    file: File,
    len: u64,
}

impl LogReader {
    /// Opens the log located at path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }

    /// Log size in bytes, when opened.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn resolve(&self, position: LogPosition) -> Result<u64, Error> {
        let offset = match position {
            LogPosition::End => self.len,
            LogPosition::Offset(offset) => offset,
        };
        if offset > self.len {
            return Err(Error::OffsetOutOfBounds {
                offset,
                len: self.len,
            });
        }
        Ok(offset)
    }

    fn read_frame(&mut self, offset: u64) -> Result<[u8; FRAME_SIZE], Error> {
        let mut buf = [0u8; FRAME_SIZE];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_payload(&mut self, offset: u64, len: u32) -> Result<Vec<u8>, Error> {
        let mut payload = vec![0u8; len as usize];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut payload)?;
        Ok(payload)
    }

    /// Returns the [Record] ending right at position, and the offset
    /// where it starts (to continue the backward traversal).
    /// Returns None when position is the start of file.
    pub fn read_preceding(&mut self, position: LogPosition) -> Result<Option<(Record, u64)>, Error> {
        let end = self.resolve(position)?;
        if end == 0 {
            return Ok(None);
        }

        if end < 2 * FRAME_SIZE as u64 {
            return Err(Error::TruncatedRecord(end));
        }

        let trailer = self.read_frame(end - FRAME_SIZE as u64)?;
        let (tag, len) = parse_frame(&trailer, true);

        let size = len as u64 + 2 * FRAME_SIZE as u64;
        let start = end.checked_sub(size).ok_or(Error::TruncatedRecord(end))?;

        let header = self.read_frame(start)?;
        if parse_frame(&header, false) != (tag, len) {
            return Err(Error::CorruptRecord(start));
        }

        let kind = RecordKind::try_from(tag)?;
        let payload = self.read_payload(start + FRAME_SIZE as u64, len)?;
        let record = Record::decode(kind, &payload)?;

        Ok(Some((record, start)))
    }

    /// Returns the [Record] starting right at offset, and the offset
    /// where it ends (to continue the forward traversal).
    /// Returns None when offset is the end of file.
    pub fn read_following(&mut self, offset: u64) -> Result<Option<(Record, u64)>, Error> {
        let start = self.resolve(LogPosition::Offset(offset))?;
        if start == self.len {
            return Ok(None);
        }

        if self.len - start < 2 * FRAME_SIZE as u64 {
            return Err(Error::TruncatedRecord(start));
        }

        let header = self.read_frame(start)?;
        let (tag, len) = parse_frame(&header, false);

        let end = start + len as u64 + 2 * FRAME_SIZE as u64;
        if end > self.len {
            return Err(Error::TruncatedRecord(start));
        }

        let trailer = self.read_frame(end - FRAME_SIZE as u64)?;
        if parse_frame(&trailer, true) != (tag, len) {
            return Err(Error::CorruptRecord(start));
        }

        let kind = RecordKind::try_from(tag)?;
        let payload = self.read_payload(start + FRAME_SIZE as u64, len)?;
        let record = Record::decode(kind, &payload)?;

        Ok(Some((record, end)))
    }
}
