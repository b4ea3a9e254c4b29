// query.rs

//! Interval queries over one or many files.
//!
//! All three query shapes resolve coordinates through a
//! [`CoordinateResolver`] and then read rows with [`Reader`]. `Ok(None)`
//! means the interval matched no index records.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::debug;

use crate::dtype::Value;
use crate::error::{Result, TbkError};
use crate::index::{CoordinateResolver, IndexRecord};
use crate::io::InputStream;
use crate::reader::Reader;

/// One output row: a coordinate, an optional sample label, and its value.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRow {
    pub seqname: String,
    pub start: u32,
    pub end: u32,
    pub sample: Option<String>,
    pub value: Value,
}

impl QueryRow {
    fn new(record: &IndexRecord, sample: Option<String>, value: Value) -> Self {
        Self {
            seqname: record.seqname.clone(),
            start: record.start,
            end: record.end,
            sample,
            value,
        }
    }
}

/// A genomic interval, 0-based half-open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub seqname: String,
    pub start: u32,
    pub end: u32,
}

impl Region {
    pub fn new(seqname: impl Into<String>, start: u32, end: u32) -> Self {
        Self {
            seqname: seqname.into(),
            start,
            end,
        }
    }
}

impl fmt::Display for Region {
    /// 1-based inclusive, like tabix.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.seqname, self.start + 1, self.end)
    }
}

impl FromStr for Region {
    type Err = TbkError;

    /// Parse `seqname:start-end` with 1-based inclusive coordinates (tabix's
    /// region syntax) into a 0-based half-open region.
    fn from_str(region: &str) -> Result<Self> {
        let invalid = |reason: &str| TbkError::InvalidRegion {
            region: region.to_string(),
            reason: reason.to_string(),
        };

        let (seqname, coords) = region
            .rsplit_once(':')
            .ok_or_else(|| invalid("expected seqname:start-end"))?;
        if seqname.is_empty() {
            return Err(invalid("empty seqname"));
        }
        let (start, end) = coords
            .split_once('-')
            .ok_or_else(|| invalid("expected start-end"))?;
        let tabix_start: u32 = start
            .replace(',', "")
            .parse()
            .map_err(|_| invalid("invalid start coordinate"))?;
        let tabix_end: u32 = end
            .replace(',', "")
            .parse()
            .map_err(|_| invalid("invalid end coordinate"))?;

        // Convert to 0-based exclusive coordinates
        let start = tabix_start
            .checked_sub(1)
            .ok_or_else(|| invalid("start coordinate must be greater than 0"))?;
        if tabix_end <= start {
            return Err(invalid("end must not be before start"));
        }
        Ok(Region::new(seqname, start, tabix_end))
    }
}

/// Read `seqname, start, end` lines (0-based half-open, BED style) from a
/// possibly gzipped regions file.
pub fn read_regions(path: impl AsRef<Path>) -> Result<Vec<Region>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(InputStream::new(path).reader()?);

    let mut regions = Vec::new();
    for (line_no, record) in reader.records().enumerate() {
        let record = record?;
        let invalid = |reason: &str| TbkError::InvalidRegion {
            region: format!("{}:{}", path.display(), line_no + 1),
            reason: reason.to_string(),
        };
        let seqname = record.get(0).ok_or_else(|| invalid("missing seqname"))?;
        let start: u32 = record
            .get(1)
            .ok_or_else(|| invalid("missing start"))?
            .trim()
            .parse()
            .map_err(|_| invalid("invalid start coordinate"))?;
        let end: u32 = record
            .get(2)
            .ok_or_else(|| invalid("missing end"))?
            .trim()
            .parse()
            .map_err(|_| invalid("invalid end coordinate"))?;
        regions.push(Region::new(seqname, start, end));
    }
    Ok(regions)
}

/// The label a file gets in multi-sample output: its file name without `.tbk`.
pub fn sample_name(path: impl AsRef<Path>) -> String {
    let path = path.as_ref();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    match name.strip_suffix(".tbk") {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => name,
    }
}

fn is_contiguous(records: &[IndexRecord]) -> bool {
    records
        .windows(2)
        .all(|w| w[0].row_index.checked_add(1) == Some(w[1].row_index))
}

/// Values of every site overlapping `region` in one file.
///
/// Contiguous row runs are read in a single pass; otherwise each row is
/// read on its own, in resolver order.
pub fn query_interval<R, C>(
    reader: &mut Reader<R>,
    resolver: &C,
    region: &Region,
) -> Result<Option<Vec<QueryRow>>>
where
    R: std::io::Read + std::io::Seek,
    C: CoordinateResolver + ?Sized,
{
    let records = resolver.resolve(&region.seqname, region.start, region.end)?;
    debug!("{} resolved to {} rows", region, records.len());
    let (Some(first), Some(last)) = (records.first(), records.last()) else {
        return Ok(None);
    };

    let values = if is_contiguous(&records) {
        reader.read_rows(first.row_index, last.row_index)?
    } else {
        records
            .iter()
            .map(|r| reader.read_row(r.row_index))
            .collect::<Result<Vec<_>>>()?
    };

    Ok(Some(
        records
            .iter()
            .zip(values)
            .map(|(record, value)| QueryRow::new(record, None, value))
            .collect(),
    ))
}

/// Open every file and check that their values have a common shape.
fn open_samples<P: AsRef<Path>>(files: &[P]) -> Result<Vec<(String, Reader)>> {
    let readers = files
        .iter()
        .map(|f| Ok::<_, TbkError>((sample_name(f), Reader::open(f)?)))
        .collect::<Result<Vec<_>>>()?;

    if let Some((first_name, first)) = readers.first() {
        let pair = first.dtype().is_pair();
        if let Some((name, other)) = readers.iter().find(|(_, r)| r.dtype().is_pair() != pair) {
            return Err(TbkError::QueryUnsupported(format!(
                "cannot mix composite and scalar files in one query ({} is {}, {} is {})",
                first_name,
                first.dtype(),
                name,
                other.dtype()
            )));
        }
    }
    Ok(readers)
}

/// The value of a single site across many files.
///
/// The region must resolve to at most one index record; more than one is
/// [`TbkError::QueryUnsupported`]. Rows come back in `files` order.
pub fn query_site_samples<P, C>(
    files: &[P],
    resolver: &C,
    region: &Region,
) -> Result<Option<Vec<QueryRow>>>
where
    P: AsRef<Path>,
    C: CoordinateResolver + ?Sized,
{
    let records = resolver.resolve(&region.seqname, region.start, region.end)?;
    let record = match records.as_slice() {
        [] => return Ok(None),
        [record] => record,
        _ => {
            return Err(TbkError::QueryUnsupported(format!(
                "{} covers {} sites; multi-sample queries take a single site",
                region,
                records.len()
            )))
        }
    };

    let mut rows = Vec::with_capacity(files.len());
    for (sample, mut reader) in open_samples(files)? {
        let value = reader.read_row(record.row_index)?;
        rows.push(QueryRow::new(record, Some(sample), value));
    }
    Ok(Some(rows))
}

/// Values of many sites across many files, one row per (site, file) pair.
///
/// Sites are reported in the order their regions were given, then resolver
/// order within a region; files in `files` order within a site.
pub fn query_sites_samples<P, C>(
    files: &[P],
    resolver: &C,
    regions: &[Region],
) -> Result<Option<Vec<QueryRow>>>
where
    P: AsRef<Path>,
    C: CoordinateResolver + ?Sized,
{
    let mut records = Vec::new();
    for region in regions {
        records.extend(resolver.resolve(&region.seqname, region.start, region.end)?);
    }
    debug!(
        "{} regions resolved to {} rows",
        regions.len(),
        records.len()
    );
    if records.is_empty() {
        return Ok(None);
    }

    let mut readers = open_samples(files)?;
    let mut rows = Vec::with_capacity(records.len() * readers.len());
    for record in &records {
        for (sample, reader) in readers.iter_mut() {
            let value = reader.read_row(record.row_index)?;
            rows.push(QueryRow::new(record, Some(sample.clone()), value));
        }
    }
    Ok(Some(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use crate::index::SiteIndex;
    use crate::test_utils::test_utils::{write_values, TestDir};

    fn record(seqname: &str, start: u32, end: u32, row_index: i64) -> IndexRecord {
        IndexRecord {
            seqname: seqname.to_string(),
            start,
            end,
            row_index,
        }
    }

    #[test]
    fn test_parse_region() {
        let region: Region = "chr1:101-200".parse().unwrap();
        assert_eq!(region, Region::new("chr1", 100, 200));
        assert_eq!(region.to_string(), "chr1:101-200");
        assert_eq!(
            "chr17:7,661,779-7,687,538".parse::<Region>().unwrap(),
            Region::new("chr17", 7_661_778, 7_687_538)
        );
        for bad in ["chr1", "chr1:100", "chr1:0-10", "chr1:a-10", ":1-2", "chr1:10-5"] {
            assert!(
                matches!(bad.parse::<Region>(), Err(TbkError::InvalidRegion { .. })),
                "{}",
                bad
            );
        }
    }

    #[test]
    fn test_sample_name() {
        assert_eq!(sample_name("/data/GSM1234.tbk"), "GSM1234");
        assert_eq!(sample_name("beta.values"), "beta.values");
    }

    #[test]
    fn test_single_row_and_no_match() {
        let test_dir = TestDir::new("query_single").expect("Failed to create test dir");
        let path = test_dir.path().join("scores.tbk");
        let values: Vec<Value> = (0..10).map(|i| Value::Float(i as f32 * 0.5 + 1.0)).collect();
        write_values(&path, DType::Float, &values).unwrap();

        let index = SiteIndex::from_records(vec![record("chr1", 100, 200, 5)]);
        let mut reader = Reader::open(&path).unwrap();

        let rows = query_interval(&mut reader, &index, &Region::new("chr1", 100, 200))
            .unwrap()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, Value::Float(3.5));
        assert_eq!((rows[0].start, rows[0].end), (100, 200));

        let none = query_interval(&mut reader, &index, &Region::new("chr1", 9000, 9100)).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_contiguous_and_scattered_rows() {
        let test_dir = TestDir::new("query_rows").expect("Failed to create test dir");
        let path = test_dir.path().join("counts.tbk");
        let values: Vec<Value> = (0..6).map(Value::Int).collect();
        write_values(&path, DType::Int, &values).unwrap();
        let mut reader = Reader::open(&path).unwrap();

        let contiguous = vec![
            record("chr1", 10, 11, 1),
            record("chr1", 20, 21, 2),
            record("chr1", 30, 31, 3),
        ];
        let rows = query_interval(&mut reader, &contiguous, &Region::new("chr1", 0, 100))
            .unwrap()
            .unwrap();
        let got: Vec<Value> = rows.into_iter().map(|r| r.value).collect();
        assert_eq!(got, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);

        let scattered = vec![
            record("chr1", 10, 11, 4),
            record("chr1", 20, 21, 0),
            record("chr1", 30, 31, 5),
        ];
        let rows = query_interval(&mut reader, &scattered, &Region::new("chr1", 0, 100))
            .unwrap()
            .unwrap();
        let got: Vec<(u32, Value)> = rows.into_iter().map(|r| (r.start, r.value)).collect();
        assert_eq!(
            got,
            vec![(10, Value::Int(4)), (20, Value::Int(0)), (30, Value::Int(5))]
        );

        let out_of_range = vec![record("chr1", 10, 11, 6)];
        assert!(matches!(
            query_interval(&mut reader, &out_of_range, &Region::new("chr1", 0, 100)),
            Err(TbkError::OutOfRange { row: 6, .. })
        ));
    }

    #[test]
    fn test_site_samples() {
        let test_dir = TestDir::new("query_site_samples").expect("Failed to create test dir");
        let mut files = Vec::new();
        for (name, v) in [("a", 1.0), ("b", 2.0), ("c", 3.0)] {
            let path = test_dir.path().join(format!("{}.tbk", name));
            let values = vec![Value::Double(0.0), Value::Double(0.0), Value::Double(v)];
            write_values(&path, DType::Double, &values).unwrap();
            files.push(path);
        }
        let index = vec![record("chr1", 10, 12, 2), record("chr1", 20, 22, 1)];

        let rows = query_site_samples(&files, &index, &Region::new("chr1", 10, 11))
            .unwrap()
            .unwrap();
        let got: Vec<(String, Value)> = rows
            .into_iter()
            .map(|r| (r.sample.unwrap(), r.value))
            .collect();
        assert_eq!(
            got,
            vec![
                ("a".to_string(), Value::Double(1.0)),
                ("b".to_string(), Value::Double(2.0)),
                ("c".to_string(), Value::Double(3.0)),
            ]
        );

        assert!(matches!(
            query_site_samples(&files, &index, &Region::new("chr1", 0, 100)),
            Err(TbkError::QueryUnsupported(_))
        ));
        assert!(query_site_samples(&files, &index, &Region::new("chr2", 0, 100))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_sites_samples() {
        let test_dir = TestDir::new("query_sites_samples").expect("Failed to create test dir");
        let a = test_dir.path().join("a.tbk");
        let b = test_dir.path().join("b.tbk");
        write_values(&a, DType::Int, &[Value::Int(10), Value::Int(11), Value::Int(12)]).unwrap();
        // Different scalar dtypes may be mixed.
        write_values(
            &b,
            DType::Float,
            &[Value::Float(0.5), Value::Float(1.5), Value::Float(2.5)],
        )
        .unwrap();
        let index = vec![
            record("chr1", 10, 12, 0),
            record("chr1", 20, 22, 1),
            record("chr2", 5, 7, 2),
        ];
        let regions = vec![Region::new("chr2", 0, 10), Region::new("chr1", 15, 25)];

        let rows = query_sites_samples(&[&a, &b], &index, &regions)
            .unwrap()
            .unwrap();
        let got: Vec<(String, u32, String, Value)> = rows
            .into_iter()
            .map(|r| (r.seqname, r.start, r.sample.unwrap(), r.value))
            .collect();
        assert_eq!(
            got,
            vec![
                ("chr2".into(), 5, "a".into(), Value::Int(12)),
                ("chr2".into(), 5, "b".into(), Value::Float(2.5)),
                ("chr1".into(), 20, "a".into(), Value::Int(11)),
                ("chr1".into(), 20, "b".into(), Value::Float(1.5)),
            ]
        );

        let nowhere = vec![Region::new("chrX", 0, 10)];
        assert!(query_sites_samples(&[&a, &b], &index, &nowhere)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_sites_samples_repeated_rows() {
        let test_dir = TestDir::new("query_repeated_rows").expect("Failed to create test dir");
        let a = test_dir.path().join("a.tbk");
        let b = test_dir.path().join("b.tbk");
        write_values(&a, DType::Int, &[Value::Int(10), Value::Int(11), Value::Int(12)]).unwrap();
        write_values(&b, DType::Int, &[Value::Int(20), Value::Int(21), Value::Int(22)]).unwrap();
        // Two coordinates share row 2 and the rows are out of order.
        let index = vec![
            record("chr1", 10, 12, 2),
            record("chr1", 20, 22, 0),
            record("chr1", 30, 32, 2),
        ];

        let rows = query_sites_samples(&[&a, &b], &index, &[Region::new("chr1", 0, 100)])
            .unwrap()
            .unwrap();
        let got: Vec<(u32, Value)> = rows.into_iter().map(|r| (r.start, r.value)).collect();
        assert_eq!(
            got,
            vec![
                (10, Value::Int(12)),
                (10, Value::Int(22)),
                (20, Value::Int(10)),
                (20, Value::Int(20)),
                (30, Value::Int(12)),
                (30, Value::Int(22)),
            ]
        );
    }

    #[test]
    fn test_contiguity_at_row_limit() {
        let last = vec![record("chr1", 0, 1, i64::MAX - 1), record("chr1", 1, 2, i64::MAX)];
        assert!(is_contiguous(&last));
        let wrapped = vec![record("chr1", 0, 1, i64::MAX), record("chr1", 1, 2, i64::MIN)];
        assert!(!is_contiguous(&wrapped));
    }

    #[test]
    fn test_mixed_shapes_rejected() {
        let test_dir = TestDir::new("query_mixed").expect("Failed to create test dir");
        let scalar = test_dir.path().join("scalar.tbk");
        let pair = test_dir.path().join("pair.tbk");
        write_values(&scalar, DType::Float, &[Value::Float(0.5)]).unwrap();
        write_values(&pair, DType::FloatInt, &[Value::FloatInt(0.5, 10)]).unwrap();
        let index = vec![record("chr1", 10, 12, 0)];

        assert!(matches!(
            query_site_samples(&[&scalar, &pair], &index, &Region::new("chr1", 10, 11)),
            Err(TbkError::QueryUnsupported(_))
        ));
    }

    #[test]
    fn test_read_regions() {
        let test_dir = TestDir::new("query_regions").expect("Failed to create test dir");
        let path = test_dir.path().join("regions.bed");
        std::fs::write(&path, "# sites\nchr1\t10\t12\nchr2\t5\t7\tname\n").unwrap();
        assert_eq!(
            read_regions(&path).unwrap(),
            vec![Region::new("chr1", 10, 12), Region::new("chr2", 5, 7)]
        );
        std::fs::write(&path, "chr1\tten\t12\n").unwrap();
        assert!(matches!(
            read_regions(&path),
            Err(TbkError::InvalidRegion { .. })
        ));
    }
}
