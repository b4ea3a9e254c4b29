// header.rs

//! The fixed 8192-byte file header.
//!
//! | field          | offset | width |
//! |----------------|--------|-------|
//! | magic `tbk`    | 0      | 3     |
//! | version (i32)  | 3      | 4     |
//! | dtype tag (i64)| 7      | 8     |
//! | record count   | 15     | 8     |
//! | index path     | 23     | 8169  |
//!
//! All integers are little-endian. The record count is `-1` until the
//! writer finalizes the file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::warn;

use crate::dtype::DType;
use crate::error::{Result, TbkError};

pub const MAGIC: &[u8; 3] = b"tbk";
pub const VERSION: i32 = 1;
pub const HEADER_SIZE: usize = 8192;
pub const INDEX_PATH_CAPACITY: usize = HEADER_SIZE - OFFSET_INDEX_PATH;
pub const UNFINALIZED: i64 = -1;

const OFFSET_VERSION: usize = 3;
const OFFSET_DTYPE: usize = 7;
pub(crate) const OFFSET_RECORD_COUNT: usize = 15;
const OFFSET_INDEX_PATH: usize = 23;

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub version: i32,
    pub dtype: DType,
    /// Number of records in the body, or [`UNFINALIZED`].
    pub record_count: i64,
    /// Path of the coordinate index this file's rows line up with.
    pub index_path: String,
}

impl Header {
    /// A fresh, unfinalized header. Index paths longer than
    /// [`INDEX_PATH_CAPACITY`] bytes are truncated.
    pub fn new(dtype: DType, index_path: impl Into<String>) -> Self {
        let mut index_path = index_path.into();
        if index_path.len() > INDEX_PATH_CAPACITY {
            let mut cut = INDEX_PATH_CAPACITY;
            while !index_path.is_char_boundary(cut) {
                cut -= 1;
            }
            warn!(
                "Index path is {} bytes, truncated to {}",
                index_path.len(),
                cut
            );
            index_path.truncate(cut);
        }
        Self {
            version: VERSION,
            dtype,
            record_count: UNFINALIZED,
            index_path,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.record_count != UNFINALIZED
    }

    /// Serialize to exactly [`HEADER_SIZE`] bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_SIZE];
        buf[..OFFSET_VERSION].copy_from_slice(MAGIC);
        buf[OFFSET_VERSION..OFFSET_DTYPE].copy_from_slice(&self.version.to_le_bytes());
        buf[OFFSET_DTYPE..OFFSET_RECORD_COUNT].copy_from_slice(&self.dtype.tag().to_le_bytes());
        buf[OFFSET_RECORD_COUNT..OFFSET_INDEX_PATH]
            .copy_from_slice(&self.record_count.to_le_bytes());
        let path = self.index_path.as_bytes();
        let n = path.len().min(INDEX_PATH_CAPACITY);
        buf[OFFSET_INDEX_PATH..OFFSET_INDEX_PATH + n].copy_from_slice(&path[..n]);
        buf
    }

    /// Parse a header from its first [`HEADER_SIZE`] bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(TbkError::format(
                None,
                format!(
                    "header is {} bytes, expected {}",
                    bytes.len(),
                    HEADER_SIZE
                ),
            ));
        }
        if &bytes[..OFFSET_VERSION] != MAGIC {
            return Err(TbkError::format(
                None,
                format!("bad magic {:?}", &bytes[..OFFSET_VERSION]),
            ));
        }
        let version = i32::from_le_bytes(field(bytes, OFFSET_VERSION));
        if version != VERSION {
            return Err(TbkError::format(
                None,
                format!("unsupported version {}", version),
            ));
        }
        let tag = i64::from_le_bytes(field(bytes, OFFSET_DTYPE));
        let dtype = DType::from_tag(tag)?;
        let record_count = i64::from_le_bytes(field(bytes, OFFSET_RECORD_COUNT));
        if record_count < UNFINALIZED {
            return Err(TbkError::format(
                None,
                format!("negative record count {}", record_count),
            ));
        }

        let raw = &bytes[OFFSET_INDEX_PATH..HEADER_SIZE];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let index_path = String::from_utf8_lossy(&raw[..end]).into_owned();

        Ok(Self {
            version,
            dtype,
            record_count,
            index_path,
        })
    }

    /// Read and decode the header from the start of `reader`.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = vec![0u8; HEADER_SIZE];
        reader.read_exact(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                TbkError::format(None, "file is shorter than the header")
            } else {
                TbkError::IOError(e)
            }
        })?;
        Self::decode(&buf)
    }
}

fn field<const N: usize>(bytes: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[at..at + N]);
    out
}

/// Overwrite only the record-count field of an already written header.
///
/// The stream position is restored afterwards, so this can be called on a
/// file that is still open for appending.
pub fn patch_record_count<F: Write + Seek>(file: &mut F, count: i64) -> Result<()> {
    let position = file.stream_position()?;
    file.seek(SeekFrom::Start(OFFSET_RECORD_COUNT as u64))?;
    file.write_all(&count.to_le_bytes())?;
    file.seek(SeekFrom::Start(position))?;
    Ok(())
}

/// Decode the header of the file at `path` without touching the body.
pub fn read_header(path: impl AsRef<Path>) -> Result<Header> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    Header::read_from(&mut file).map_err(|e| match e {
        TbkError::Format { reason, .. } => TbkError::format(Some(path.to_path_buf()), reason),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    #[test]
    fn test_layout() {
        let header = Header::new(DType::FloatInt, "idx.gz");
        let bytes = header.encode();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[..3], b"tbk");
        assert_eq!(&bytes[3..7], &1i32.to_le_bytes());
        assert_eq!(&bytes[7..15], &31i64.to_le_bytes());
        assert_eq!(&bytes[15..23], &(-1i64).to_le_bytes());
        assert_eq!(&bytes[23..29], b"idx.gz");
        assert!(bytes[29..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_round_trip() {
        let mut header = Header::new(DType::Str(10), "/data/idx.gz");
        header.record_count = 42;
        let decoded = Header::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
        assert!(decoded.is_finalized());
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = Header::new(DType::Int, "idx.gz").encode();
        bytes[0] = b'x';
        assert!(matches!(
            Header::decode(&bytes),
            Err(TbkError::Format { .. })
        ));
    }

    #[test]
    fn test_bad_version() {
        let mut bytes = Header::new(DType::Int, "idx.gz").encode();
        bytes[3..7].copy_from_slice(&1.0f32.to_le_bytes());
        assert!(matches!(
            Header::decode(&bytes),
            Err(TbkError::Format { .. })
        ));
    }

    #[test]
    fn test_unknown_dtype() {
        let mut bytes = Header::new(DType::Int, "idx.gz").encode();
        bytes[7..15].copy_from_slice(&99i64.to_le_bytes());
        assert!(matches!(
            Header::decode(&bytes),
            Err(TbkError::UnsupportedDType(99))
        ));
    }

    #[test]
    fn test_short_header() {
        let mut cursor = Cursor::new(vec![0u8; 100]);
        assert!(matches!(
            Header::read_from(&mut cursor),
            Err(TbkError::Format { .. })
        ));
    }

    #[test]
    fn test_patch_record_count() {
        let header = Header::new(DType::Double, "sites.idx.gz");
        let mut cursor = Cursor::new(header.encode());
        cursor.seek(SeekFrom::End(0)).unwrap();
        cursor.write_all(&1.5f64.to_le_bytes()).unwrap();

        patch_record_count(&mut cursor, 1).unwrap();
        assert_eq!(cursor.position(), (HEADER_SIZE + 8) as u64);

        let decoded = Header::decode(cursor.get_ref()).unwrap();
        assert_eq!(decoded.record_count, 1);
        assert_eq!(decoded.dtype, DType::Double);
        assert_eq!(decoded.index_path, "sites.idx.gz");
    }

    #[test]
    fn test_long_path_truncates() {
        let path = "a".repeat(INDEX_PATH_CAPACITY + 100);
        let header = Header::new(DType::Int, path);
        assert_eq!(header.index_path.len(), INDEX_PATH_CAPACITY);
        let bytes = header.encode();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(Header::decode(&bytes).unwrap().index_path.len(), INDEX_PATH_CAPACITY);
    }

    proptest! {
        #[test]
        fn prop_fixed_width(len in 0usize..=INDEX_PATH_CAPACITY) {
            let header = Header::new(DType::Float, "p".repeat(len));
            let bytes = header.encode();
            prop_assert_eq!(bytes.len(), HEADER_SIZE);
            prop_assert_eq!(Header::decode(&bytes).unwrap().index_path.len(), len);
        }
    }
}
