// reader.rs

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::dtype::{DType, Value};
use crate::error::{Result, TbkError};
use crate::header::{Header, HEADER_SIZE};

/// Byte offset of `row` in a file whose records are `record_width` bytes,
/// or `None` if it does not fit in a `u64`.
///
/// Every read path goes through here.
#[inline]
pub fn row_offset(row: u64, record_width: usize) -> Option<u64> {
    row.checked_mul(record_width as u64)?
        .checked_add(HEADER_SIZE as u64)
}

/// A read-only handle on a finalized file.
///
/// The header is decoded and checked against the file size once, on open.
/// Each handle owns its own file descriptor, so any number of readers can
/// be open on the same file at once.
#[derive(Debug)]
pub struct Reader<R: Read + Seek = File> {
    inner: R,
    header: Header,
    path: Option<PathBuf>,
    buf: Vec<u8>,
}

impl Reader<File> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let reader = Self::with_path(file, Some(path.to_path_buf()))?;
        debug!(
            "Opened {} ({}, {} records)",
            path.display(),
            reader.header.dtype,
            reader.header.record_count
        );
        Ok(reader)
    }
}

impl<R: Read + Seek> Reader<R> {
    pub fn from_reader(inner: R) -> Result<Self> {
        Self::with_path(inner, None)
    }

    fn with_path(mut inner: R, path: Option<PathBuf>) -> Result<Self> {
        inner.seek(SeekFrom::Start(0))?;
        let header = Header::read_from(&mut inner).map_err(|e| match e {
            TbkError::Format { reason, .. } => TbkError::format(path.clone(), reason),
            other => other,
        })?;
        if !header.is_finalized() {
            return Err(TbkError::format(path, "file was never finalized"));
        }

        let size = inner.seek(SeekFrom::End(0))?;
        let width = header.dtype.width() as u64;
        let Some(expected) = row_offset(header.record_count as u64, header.dtype.width()) else {
            return Err(TbkError::format(
                path,
                format!(
                    "record count {} of {} bytes overflows the file size",
                    header.record_count, width
                ),
            ));
        };
        if size != expected {
            return Err(TbkError::format(
                path,
                format!(
                    "header says {} records of {} bytes ({} bytes total) but file is {} bytes",
                    header.record_count, width, expected, size
                ),
            ));
        }

        Ok(Self {
            inner,
            buf: vec![0u8; header.dtype.width()],
            header,
            path,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn dtype(&self) -> DType {
        self.header.dtype
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of records in the body.
    pub fn len(&self) -> u64 {
        self.header.record_count as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_row(&self, row: i64) -> Result<u64> {
        if row < 0 || row >= self.header.record_count {
            return Err(TbkError::OutOfRange {
                row,
                record_count: self.header.record_count,
            });
        }
        Ok(row as u64)
    }

    /// Offset of an in-range row. The file size was checked on open, so
    /// this only fails if the header changed underneath us.
    fn offset(&self, row: u64) -> Result<u64> {
        row_offset(row, self.header.dtype.width()).ok_or_else(|| {
            TbkError::format(self.path.clone(), format!("offset of row {} overflows", row))
        })
    }

    /// Read and decode the record at `row`.
    pub fn read_row(&mut self, row: i64) -> Result<Value> {
        let row = self.check_row(row)?;
        let offset = self.offset(row)?;
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.read_exact(&mut self.buf)?;
        self.header.dtype.decode(&self.buf)
    }

    /// Read the contiguous rows `start..=end` with a single read.
    ///
    /// An inverted range (`end < start`) yields no rows.
    pub fn read_rows(&mut self, start: i64, end: i64) -> Result<Vec<Value>> {
        let first = self.check_row(start)?;
        let last = self.check_row(end)?;
        if last < first {
            return Ok(Vec::new());
        }
        let width = self.header.dtype.width();
        let n = (last - first + 1) as usize;
        let mut bytes = vec![0u8; n * width];
        let offset = self.offset(first)?;
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.read_exact(&mut bytes)?;
        bytes
            .chunks_exact(width)
            .map(|record| self.header.dtype.decode(record))
            .collect()
    }
}
