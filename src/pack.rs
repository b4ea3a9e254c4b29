// pack.rs

//! Conveniences built on [`Writer`]: packing an in-memory column, a
//! BED-like table with one file per column, and values keyed by coordinate
//! aligned to an existing index.

use std::path::{Component, Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::dtype::{DType, Value};
use crate::error::{Result, TbkError};
use crate::header::Header;
use crate::index::{IndexRecord, IndexRecords};
use crate::io::{InputStream, OutputStream};
use crate::writer::Writer;

/// Rows read before choosing a dtype for columns without one.
pub const INFER_ROWS: usize = 1000;

/// Text fields treated as absent values in numeric columns.
const NA_FIELDS: [&str; 4] = ["", "NA", "nan", "."];

/// Pack a sequence of values into `dest` and finalize it.
pub fn pack_values<I>(
    dest: impl AsRef<Path>,
    dtype: DType,
    index_path: &str,
    values: I,
) -> Result<Header>
where
    I: IntoIterator<Item = Value>,
{
    let mut writer = Writer::create(dest, dtype, index_path)?;
    for value in values {
        writer.append(&value)?;
    }
    writer.finalize()
}

/// A column to pack, 1-based like `cut -f`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub column: usize,
    /// `None` infers a numeric type from the first rows.
    pub dtype: Option<DType>,
}

impl ColumnSpec {
    pub fn new(column: usize, dtype: Option<DType>) -> Self {
        Self { column, dtype }
    }
}

#[derive(Debug, Clone)]
pub struct PackOptions {
    pub columns: Vec<ColumnSpec>,
    /// The first non-comment line names the columns.
    pub has_header: bool,
    pub comment: Option<u8>,
    /// Index path recorded in every output header. Defaults to the sidecar.
    pub index_path: Option<String>,
    pub outdir: PathBuf,
    /// Outputs are named `<basename>_<column name>.tbk`.
    pub basename: String,
    /// Also write a `seqname, start, end, row_index` index here.
    pub index_sidecar: Option<PathBuf>,
    /// Overwrite existing outputs.
    pub force: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            columns: vec![ColumnSpec::new(4, None)],
            has_header: false,
            comment: Some(b'#'),
            index_path: None,
            outdir: PathBuf::from("."),
            basename: "out".to_string(),
            index_sidecar: None,
            force: false,
        }
    }
}

impl PackOptions {
    pub fn columns(mut self, columns: Vec<ColumnSpec>) -> Self {
        self.columns = columns;
        self
    }

    pub fn has_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn comment(mut self, comment: Option<u8>) -> Self {
        self.comment = comment;
        self
    }

    pub fn index_path(mut self, index_path: impl Into<String>) -> Self {
        self.index_path = Some(index_path.into());
        self
    }

    pub fn outdir(mut self, outdir: impl Into<PathBuf>) -> Self {
        self.outdir = outdir.into();
        self
    }

    pub fn basename(mut self, basename: impl Into<String>) -> Self {
        self.basename = basename.into();
        self
    }

    pub fn index_sidecar(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_sidecar = Some(path.into());
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    fn recorded_index_path(&self) -> Result<String> {
        match (&self.index_path, &self.index_sidecar) {
            (Some(path), _) => Ok(path.clone()),
            (None, Some(sidecar)) => Ok(sidecar.to_string_lossy().into_owned()),
            (None, None) => Err("No index path given: set an index path or an index sidecar".into()),
        }
    }
}

fn is_na(field: &str) -> bool {
    NA_FIELDS.contains(&field.trim())
}

/// A header name can become part of an output file name only if it is a
/// single plain path component.
fn is_file_name_safe(name: &str) -> bool {
    if name.is_empty() || name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Numeric columns read NA-like fields as the missing sentinel.
fn parse_field(dtype: DType, field: &str) -> Result<Value> {
    match dtype {
        DType::Char | DType::Str(_) => dtype.parse_value(field),
        _ if is_na(field) => Ok(dtype.missing_value()),
        _ => dtype.parse_value(field),
    }
}

/// Pack columns of a tab-separated table whose first three columns are
/// `seqname, start, end`. Returns the paths written, in `columns` order.
///
/// `progress` is called with the number of rows packed so far.
pub fn pack_table(
    input: impl AsRef<Path>,
    options: &PackOptions,
    mut progress: impl FnMut(u64),
) -> Result<Vec<PathBuf>> {
    let input = input.as_ref();
    if options.columns.is_empty() {
        return Err("No columns to pack".into());
    }
    if let Some(bad) = options.columns.iter().find(|c| c.column == 0) {
        return Err(format!("Column numbers are 1-based, got {}", bad.column).into());
    }
    let index_path = options.recorded_index_path()?;

    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(options.has_header)
        .comment(options.comment)
        .flexible(true)
        .from_reader(InputStream::new(input).reader()?);
    let names: Vec<String> = if options.has_header {
        let headers = reader.headers()?.clone();
        options
            .columns
            .iter()
            .map(|c| match headers.get(c.column - 1).map(str::trim) {
                Some(name) if is_file_name_safe(name) => name.to_string(),
                Some(name) => {
                    if !name.is_empty() {
                        warn!(
                            "Column {} name {:?} is not usable in a file name, using col{}",
                            c.column, name, c.column
                        );
                    }
                    format!("col{}", c.column)
                }
                None => format!("col{}", c.column),
            })
            .collect()
    } else {
        options
            .columns
            .iter()
            .map(|c| format!("col{}", c.column))
            .collect()
    };

    let mut records = reader.into_records();
    let mut head = Vec::with_capacity(INFER_ROWS);
    for record in records.by_ref().take(INFER_ROWS) {
        head.push(record?);
    }

    let dtypes = options
        .columns
        .iter()
        .map(|c| match c.dtype {
            Some(dtype) => Ok(dtype),
            None => infer_column(&head, c.column),
        })
        .collect::<Result<Vec<_>>>()?;

    let outputs: Vec<PathBuf> = names
        .iter()
        .map(|name| {
            options
                .outdir
                .join(format!("{}_{}.tbk", options.basename, name))
        })
        .collect();
    if let Some(existing) = outputs.iter().find(|p| p.exists() && !options.force) {
        return Err(format!(
            "Output file {} exists. Use --force to overwrite.",
            existing.display()
        )
        .into());
    }

    let mut writers = Vec::with_capacity(outputs.len());
    for ((path, name), dtype) in outputs.iter().zip(&names).zip(&dtypes) {
        info!("Packing {} column {:?} as {}", input.display(), name, dtype);
        writers.push(Writer::create(path, *dtype, &index_path)?);
    }

    let mut sidecar = match &options.index_sidecar {
        Some(path) => Some(
            csv::WriterBuilder::new()
                .delimiter(b'\t')
                .has_headers(false)
                .from_writer(OutputStream::new(Some(path)).writer()?),
        ),
        None => None,
    };

    let mut row: u64 = 0;
    for record in head.into_iter().map(Ok).chain(records) {
        let record: StringRecord = record?;
        let line = record.position().map_or(row + 1, |p| p.line());
        for ((spec, writer), name) in options.columns.iter().zip(&mut writers).zip(&names) {
            let field = record.get(spec.column - 1).ok_or_else(|| {
                TbkError::format(
                    Some(input.to_path_buf()),
                    format!("line {}: no column {} ({})", line, spec.column, name),
                )
            })?;
            let value = parse_field(writer.dtype(), field)?;
            writer.append(&value)?;
        }
        if let Some(sidecar) = sidecar.as_mut() {
            sidecar.serialize(coordinates(input, &record, line, row as i64)?)?;
        }
        row += 1;
        if row % 10_000 == 0 {
            progress(row);
        }
    }

    for writer in writers.iter_mut() {
        writer.finalize()?;
    }
    if let Some(mut sidecar) = sidecar {
        sidecar.flush()?;
    }
    progress(row);
    debug!("Packed {} rows into {} files", row, outputs.len());
    Ok(outputs)
}

fn infer_column(head: &[StringRecord], column: usize) -> Result<DType> {
    let samples: Vec<&str> = head
        .iter()
        .filter_map(|r| r.get(column - 1))
        .filter(|f| !is_na(f))
        .collect();
    if samples.is_empty() {
        warn!("Column {} has no values to infer from, using float", column);
        return Ok(DType::Float);
    }
    DType::infer(&samples)
}

fn coordinates(input: &Path, record: &StringRecord, line: u64, row_index: i64) -> Result<IndexRecord> {
    let bad = |reason: &str| {
        TbkError::format(
            Some(input.to_path_buf()),
            format!("line {}: {}", line, reason),
        )
    };
    let (Some(seqname), Some(start), Some(end)) = (record.get(0), record.get(1), record.get(2))
    else {
        return Err(bad("expected seqname, start and end columns"));
    };
    Ok(IndexRecord {
        seqname: seqname.trim().to_string(),
        start: start.trim().parse().map_err(|_| bad("bad start column"))?,
        end: end.trim().parse().map_err(|_| bad("bad end column"))?,
        row_index,
    })
}

/// Pack `entries` in the row order of the index at `index_path`.
///
/// Index records with no entry get the dtype's missing value; entries whose
/// coordinates are not in the index are dropped.
pub fn pack_aligned<I>(
    index_path: impl AsRef<Path>,
    entries: I,
    dtype: DType,
    dest: impl AsRef<Path>,
) -> Result<Header>
where
    I: IntoIterator<Item = ((String, u32, u32), Value)>,
{
    let index_path = index_path.as_ref();
    let mut lookup: FxHashMap<(String, u32, u32), Value> = entries.into_iter().collect();
    let n_entries = lookup.len();

    let mut writer = Writer::create(dest, dtype, &index_path.to_string_lossy())?;
    let missing = dtype.missing_value();
    let mut n_filled = 0u64;
    for record in IndexRecords::open(index_path)? {
        let record = record?;
        match lookup.remove(&(record.seqname, record.start, record.end)) {
            Some(value) => writer.append(&value)?,
            None => {
                writer.append(&missing)?;
                n_filled += 1;
            }
        }
    }
    if !lookup.is_empty() {
        warn!(
            "{} of {} entries are not in {}",
            lookup.len(),
            n_entries,
            index_path.display()
        );
    }
    debug!("{} index records had no value", n_filled);
    writer.finalize()
}
