// writer.rs

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::dtype::{DType, Value};
use crate::error::{Result, TbkError};
use crate::header::{patch_record_count, Header, HEADER_SIZE};

/// An append-only writer session for one file.
///
/// The header goes out first with an unfinalized record count; records are
/// streamed in input order; [`Writer::finalize`] patches the count in place
/// and closes the destination. A session that fails part way leaves its
/// partial file on disk.
pub struct Writer<W: Write + Seek = BufWriter<File>> {
    /// `None` once finalized.
    inner: Option<W>,
    /// Where the records are going, for error messages.
    label: PathBuf,
    header: Header,
    n_records: u64,
    buf: Vec<u8>,
}

impl<W: Write + Seek> std::fmt::Debug for Writer<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("label", &self.label)
            .field("dtype", &self.header.dtype)
            .field("n_records", &self.n_records)
            .field("finalized", &self.inner.is_none())
            .finish()
    }
}

impl Writer<BufWriter<File>> {
    /// Create (or truncate) `path` and write a fresh header.
    pub fn create(path: impl AsRef<Path>, dtype: DType, index_path: &str) -> Result<Self> {
        let path = path.as_ref();
        dtype.check()?;
        let file = File::create(path)?;
        Self::from_writer(BufWriter::new(file), path, dtype, index_path)
    }

    /// Like [`Writer::create`] but fails if `path` already exists, so two
    /// sessions can never target the same destination.
    pub fn create_new(path: impl AsRef<Path>, dtype: DType, index_path: &str) -> Result<Self> {
        let path = path.as_ref();
        dtype.check()?;
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        Self::from_writer(BufWriter::new(file), path, dtype, index_path)
    }
}

impl<W: Write + Seek> Writer<W> {
    /// Start a session on an arbitrary seekable sink.
    ///
    /// Fails before writing anything if `dtype` has no valid layout.
    pub fn from_writer(
        mut inner: W,
        label: impl Into<PathBuf>,
        dtype: DType,
        index_path: &str,
    ) -> Result<Self> {
        dtype.check()?;
        let label = label.into();
        let header = Header::new(dtype, index_path);
        inner.write_all(&header.encode())?;
        debug!(
            "Opened {} for writing ({}, index {})",
            label.display(),
            dtype,
            header.index_path
        );
        Ok(Self {
            inner: Some(inner),
            label,
            buf: vec![0u8; dtype.width()],
            header,
            n_records: 0,
        })
    }

    pub fn dtype(&self) -> DType {
        self.header.dtype
    }

    /// Records appended so far.
    pub fn len(&self) -> u64 {
        self.n_records
    }

    pub fn is_empty(&self) -> bool {
        self.n_records == 0
    }

    pub fn is_finalized(&self) -> bool {
        self.inner.is_none()
    }

    fn sink(&mut self) -> Result<&mut W> {
        match self.inner.as_mut() {
            Some(inner) => Ok(inner),
            None => Err(TbkError::FileAlreadyFinalized(self.label.clone())),
        }
    }

    /// Append one already-encoded record.
    pub fn append_bytes(&mut self, record: &[u8]) -> Result<()> {
        let dtype = self.header.dtype;
        if record.len() != dtype.width() {
            return Err(TbkError::Encode {
                dtype: dtype.to_string(),
                value: format!("{} bytes", record.len()),
                reason: format!("records are {} bytes wide", dtype.width()),
            });
        }
        self.sink()?.write_all(record)?;
        self.n_records += 1;
        Ok(())
    }

    /// Encode and append one value.
    pub fn append(&mut self, value: &Value) -> Result<()> {
        if self.inner.is_none() {
            return Err(TbkError::FileAlreadyFinalized(self.label.clone()));
        }
        let mut buf = std::mem::take(&mut self.buf);
        let result = self
            .header
            .dtype
            .encode(value, &mut buf)
            .and_then(|_| self.append_bytes(&buf));
        self.buf = buf;
        result
    }

    /// Parse, encode and append one text field.
    pub fn append_str(&mut self, text: &str) -> Result<()> {
        let value = self.header.dtype.parse_value(text)?;
        self.append(&value)
    }

    /// Patch the header's record count and close the destination.
    ///
    /// The count is derived from the bytes actually written after the
    /// header, not from the number of `append` calls.
    pub fn finalize(&mut self) -> Result<Header> {
        let mut inner = self
            .inner
            .take()
            .ok_or_else(|| TbkError::FileAlreadyFinalized(self.label.clone()))?;
        inner.flush()?;
        let body = inner.stream_position()? - HEADER_SIZE as u64;
        let width = self.header.dtype.width() as u64;
        if body % width != 0 {
            return Err(TbkError::format(
                Some(self.label.clone()),
                format!("body of {} bytes is not a multiple of {}", body, width),
            ));
        }
        let count = (body / width) as i64;
        patch_record_count(&mut inner, count)?;
        inner.flush()?;
        drop(inner);

        self.header.record_count = count;
        info!("Finalized {} with {} records", self.label.display(), count);
        Ok(self.header.clone())
    }
}
