// index/mod.rs

//! Coordinate resolution: mapping a genomic interval to row indices.
//!
//! A coordinate index is a position-sorted, tab-separated file with the
//! columns `seqname, start, end, row_index` (optionally gzip-compressed).
//! Query code only depends on the [`CoordinateResolver`] trait; [`SiteIndex`]
//! is the in-memory implementation used by the CLI.

mod binning;

pub use binning::{calc_level_sizes, calc_offsets_from_levels, HierarchicalBins};

use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter};
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Result, TbkError};
use crate::io::{BoxedRead, InputStream};

/// One line of a coordinate index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexRecord {
    pub seqname: String,
    /// 0-based, inclusive.
    pub start: u32,
    /// 0-based, exclusive.
    pub end: u32,
    pub row_index: i64,
}

impl IndexRecord {
    /// Half-open overlap with [start, end). Empty records cover `start`.
    pub fn overlaps(&self, start: u32, end: u32) -> bool {
        let self_end = self.end.max(self.start.saturating_add(1));
        self.start < end && self_end > start
    }
}

/// Anything that can turn an interval into the ordered index records
/// overlapping it.
pub trait CoordinateResolver {
    /// Records overlapping [start, end) on `seqname`, in the order rows
    /// should be reported.
    fn resolve(&self, seqname: &str, start: u32, end: u32) -> Result<Vec<IndexRecord>>;
}

impl CoordinateResolver for [IndexRecord] {
    fn resolve(&self, seqname: &str, start: u32, end: u32) -> Result<Vec<IndexRecord>> {
        Ok(self
            .iter()
            .filter(|r| r.seqname == seqname && r.overlaps(start, end))
            .cloned()
            .collect())
    }
}

impl CoordinateResolver for Vec<IndexRecord> {
    fn resolve(&self, seqname: &str, start: u32, end: u32) -> Result<Vec<IndexRecord>> {
        self.as_slice().resolve(seqname, start, end)
    }
}

/// Resolve the index path stored in the header of `tbk_path`.
///
/// A relative path that does not exist from the working directory is
/// tried next to the `.tbk` file. If neither exists the stored path is
/// returned unchanged so the open error names it.
pub fn locate_index(tbk_path: &Path, stored: &str) -> PathBuf {
    let stored_path = Path::new(stored);
    if stored_path.is_absolute() || stored_path.exists() {
        return stored_path.to_path_buf();
    }
    if let Some(dir) = tbk_path.parent() {
        let beside = dir.join(stored_path);
        if beside.exists() {
            debug!("Found index {} next to {}", beside.display(), tbk_path.display());
            return beside;
        }
    }
    stored_path.to_path_buf()
}

/// Streaming reader over the lines of a coordinate index.
///
/// A leading header line (one whose `start` column is not a number) is
/// skipped.
pub struct IndexRecords {
    records: StringRecordsIntoIter<BoxedRead>,
    path: PathBuf,
    /// Records seen so far.
    n_seen: u64,
    /// Physical line of the current record, for error messages.
    line: u64,
}

impl IndexRecords {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = InputStream::new(path).reader()?;
        let reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .comment(Some(b'#'))
            .flexible(true)
            .from_reader(stream);
        Ok(Self {
            records: reader.into_records(),
            path: path.to_path_buf(),
            n_seen: 0,
            line: 0,
        })
    }

    fn parse(&self, record: &StringRecord) -> Result<IndexRecord> {
        if record.len() < 4 {
            return Err(TbkError::format(
                Some(self.path.clone()),
                format!(
                    "line {}: expected 4 columns (seqname, start, end, row_index), found {}",
                    self.line,
                    record.len()
                ),
            ));
        }
        Ok(IndexRecord {
            seqname: self.column(record, 0, "seqname")?.to_string(),
            start: self.coordinate(record, 1, "start")?,
            end: self.coordinate(record, 2, "end")?,
            row_index: self.number(record, 3, "row_index")?,
        })
    }

    fn column<'r>(&self, record: &'r StringRecord, i: usize, name: &str) -> Result<&'r str> {
        match record.get(i).map(str::trim) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(TbkError::format(
                Some(self.path.clone()),
                format!("line {}: empty {} column", self.line, name),
            )),
        }
    }

    fn number(&self, record: &StringRecord, i: usize, name: &str) -> Result<i64> {
        self.column(record, i, name)?.parse::<i64>().map_err(|e| {
            TbkError::format(
                Some(self.path.clone()),
                format!("line {}: bad {} column: {}", self.line, name, e),
            )
        })
    }

    fn coordinate(&self, record: &StringRecord, i: usize, name: &str) -> Result<u32> {
        u32::try_from(self.number(record, i, name)?).map_err(|_| {
            TbkError::format(
                Some(self.path.clone()),
                format!("line {}: {} column out of range", self.line, name),
            )
        })
    }
}

impl Iterator for IndexRecords {
    type Item = Result<IndexRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) => return Some(Err(e.into())),
            };
            self.n_seen += 1;
            self.line = record.position().map_or(self.n_seen, |p| p.line());
            let is_header = self.n_seen == 1
                && record
                    .get(1)
                    .map_or(false, |start| start.trim().parse::<u32>().is_err());
            if is_header {
                continue;
            }
            return Some(self.parse(&record));
        }
    }
}

/// A coordinate index held in memory and binned for overlap queries.
#[derive(Debug, Default)]
pub struct SiteIndex {
    path: Option<PathBuf>,
    bins: HierarchicalBins,
    /// seqname -> bin id -> records in that bin
    sequences: FxHashMap<String, FxHashMap<u32, Vec<IndexRecord>>>,
    n_records: usize,
}

impl SiteIndex {
    /// Load every record of the index file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let records = IndexRecords::open(path)?.collect::<Result<Vec<_>>>()?;
        let mut index = Self::from_records(records);
        index.path = Some(path.to_path_buf());
        info!(
            "Loaded {} index records over {} sequences from {}",
            index.n_records,
            index.sequences.len(),
            path.display()
        );
        Ok(index)
    }

    pub fn from_records(records: impl IntoIterator<Item = IndexRecord>) -> Self {
        let mut index = Self::default();
        for record in records {
            index.add_record(record);
        }
        index
    }

    pub fn add_record(&mut self, record: IndexRecord) {
        let bin_id = self.bins.region_to_bin(record.start, record.end);
        self.sequences
            .entry(record.seqname.clone())
            .or_default()
            .entry(bin_id)
            .or_default()
            .push(record);
        self.n_records += 1;
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.n_records
    }

    pub fn is_empty(&self) -> bool {
        self.n_records == 0
    }
}

impl CoordinateResolver for SiteIndex {
    /// Overlapping records sorted by row index.
    fn resolve(&self, seqname: &str, start: u32, end: u32) -> Result<Vec<IndexRecord>> {
        let Some(seq_bins) = self.sequences.get(seqname) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<IndexRecord> = self
            .bins
            .region_to_bins(start, end)
            .into_iter()
            .filter_map(|bin_id| seq_bins.get(&bin_id))
            .flatten()
            .filter(|r| r.overlaps(start, end))
            .cloned()
            .collect();
        hits.sort_by_key(|r| r.row_index);
        debug!(
            "{}:{}-{} resolved to {} records",
            seqname,
            start,
            end,
            hits.len()
        );
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_utils::{write_index, TestDir};

    fn record(seqname: &str, start: u32, end: u32, row_index: i64) -> IndexRecord {
        IndexRecord {
            seqname: seqname.to_string(),
            start,
            end,
            row_index,
        }
    }

    #[test]
    fn test_locate_index() {
        let test_dir = TestDir::new("locate_index").expect("Failed to create test dir");
        let tbk_path = test_dir.path().join("beta.tbk");
        let beside = test_dir.path().join("locate_idx_beside.tsv");
        std::fs::write(&beside, "chr1\t0\t1\t0\n").unwrap();

        assert_eq!(locate_index(&tbk_path, "locate_idx_beside.tsv"), beside);
        let absolute = beside.to_string_lossy().into_owned();
        assert_eq!(locate_index(&tbk_path, &absolute), beside);
        assert_eq!(
            locate_index(&tbk_path, "locate_idx_missing.tsv"),
            PathBuf::from("locate_idx_missing.tsv")
        );
    }

    fn make_records() -> Vec<IndexRecord> {
        vec![
            record("chr1", 100, 102, 0),
            record("chr1", 150, 152, 1),
            record("chr1", 250, 252, 2),
            record("chr1", 200_000, 200_002, 3),
            record("chr1", 1_000, 5_000_000, 4),
            record("chr2", 100, 102, 5),
        ]
    }

    #[test]
    fn test_resolve_matches_linear_scan() {
        let index = SiteIndex::from_records(make_records());
        let linear = make_records();
        for (seqname, start, end) in [
            ("chr1", 0, 200),
            ("chr1", 101, 151),
            ("chr1", 200, 250),
            ("chr1", 190_000, 300_000),
            ("chr1", 4_999_999, 5_000_000),
            ("chr2", 0, 1_000_000),
            ("chr3", 0, 1_000_000),
        ] {
            assert_eq!(
                index.resolve(seqname, start, end).unwrap(),
                linear.resolve(seqname, start, end).unwrap(),
                "{}:{}-{}",
                seqname,
                start,
                end
            );
        }
    }

    #[test]
    fn test_resolve_orders_by_row() {
        let index = SiteIndex::from_records(make_records());
        let rows: Vec<i64> = index
            .resolve("chr1", 0, 300_000)
            .unwrap()
            .into_iter()
            .map(|r| r.row_index)
            .collect();
        assert_eq!(rows, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_open_plain_and_gzip() {
        let test_dir = TestDir::new("index_open").expect("Failed to create test dir");
        for name in ["idx.tsv", "idx.tsv.gz"] {
            let path = test_dir.path().join(name);
            write_index(&path, &make_records()).unwrap();
            let index = SiteIndex::open(&path).unwrap();
            assert_eq!(index.len(), 6);
            assert_eq!(index.path(), Some(path.as_path()));
            let hits = index.resolve("chr2", 100, 101).unwrap();
            assert_eq!(hits, vec![record("chr2", 100, 102, 5)]);
        }
    }

    #[test]
    fn test_header_line_skipped() {
        let test_dir = TestDir::new("index_header").expect("Failed to create test dir");
        let path = test_dir.path().join("idx.tsv");
        std::fs::write(&path, "seqname\tstart\tend\tindex\nchr1\t10\t12\t0\n").unwrap();
        let records: Vec<IndexRecord> = IndexRecords::open(&path)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records, vec![record("chr1", 10, 12, 0)]);
    }

    #[test]
    fn test_error_reports_physical_line() {
        let test_dir = TestDir::new("index_error_line").expect("Failed to create test dir");
        let path = test_dir.path().join("idx.tsv");
        std::fs::write(
            &path,
            "# built by pack\n# second comment\nchr1\t10\t12\t0\nchr1\tx\t22\t1\n",
        )
        .unwrap();
        let result: Result<Vec<IndexRecord>> = IndexRecords::open(&path).unwrap().collect();
        match result {
            Err(TbkError::Format { reason, .. }) => {
                assert!(reason.starts_with("line 4:"), "{}", reason)
            }
            other => panic!("expected a format error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_line() {
        let test_dir = TestDir::new("index_malformed").expect("Failed to create test dir");
        let path = test_dir.path().join("idx.tsv");
        std::fs::write(&path, "chr1\t10\t12\t0\nchr1\t20\n").unwrap();
        let result: Result<Vec<IndexRecord>> = IndexRecords::open(&path).unwrap().collect();
        assert!(matches!(result, Err(TbkError::Format { .. })));
    }
}
