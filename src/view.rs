// view.rs

use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;

use tracing::{debug, info};

use crate::display::DisplayOptions;
use crate::error::Result;
use crate::index::{locate_index, IndexRecords};
use crate::query::sample_name;
use crate::reader::Reader;

/// How a [`view`] run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewSummary {
    /// Lines written, not counting the column-name line.
    pub records: u64,
    /// The sink refused a write or flush and the walk stopped early.
    pub sink_closed: bool,
}

/// Walk the coordinate index from start to end, writing
/// `seqname, start, end, value` for each record's row of `tbk_path`.
///
/// `index_path` defaults to the path stored in the file header, looked up
/// next to `tbk_path` when it is relative and missing. A sink that
/// stops accepting output ends the walk cleanly with
/// [`ViewSummary::sink_closed`] set; read and format errors still fail.
pub fn view<W: Write>(
    tbk_path: impl AsRef<Path>,
    index_path: Option<&Path>,
    options: &DisplayOptions,
    out: &mut W,
) -> Result<ViewSummary> {
    let tbk_path = tbk_path.as_ref();
    let mut reader = Reader::open(tbk_path)?;
    let index_path = match index_path {
        Some(path) => path.to_path_buf(),
        None => locate_index(tbk_path, &reader.header().index_path),
    };
    let records = IndexRecords::open(&index_path)?;
    info!(
        "Viewing {} through {}",
        tbk_path.display(),
        index_path.display()
    );

    let mut summary = ViewSummary {
        records: 0,
        sink_closed: false,
    };

    if options.header {
        let name = sample_name(tbk_path);
        let columns = if reader.dtype().is_pair() {
            format!("seqname\tstart\tend\t{}_1\t{}_2\n", name, name)
        } else {
            format!("seqname\tstart\tend\t{}\n", name)
        };
        if let Err(e) = out.write_all(columns.as_bytes()) {
            debug!("Output closed before the first line: {}", e);
            summary.sink_closed = true;
            return Ok(summary);
        }
    }

    // Re-usable line buffer
    let mut line = String::new();
    for record in records {
        let record = record?;
        let value = reader.read_row(record.row_index)?;

        line.clear();
        let _ = write!(line, "{}\t{}\t{}\t", record.seqname, record.start, record.end);
        options.format_value(&value, &mut line);
        line.push('\n');

        if let Err(e) = out.write_all(line.as_bytes()) {
            debug!("Output closed after {} records: {}", summary.records, e);
            summary.sink_closed = true;
            return Ok(summary);
        }
        summary.records += 1;
    }

    if let Err(e) = out.flush() {
        debug!("Output closed while flushing: {}", e);
        summary.sink_closed = true;
    }
    Ok(summary)
}
