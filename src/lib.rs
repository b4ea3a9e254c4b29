//! Fixed-width binary value store for genomic sites.
//!
//! A `.tbk` file is an 8192-byte header followed by equal-width records.
//! Row *i* of the file holds the value for row *i* of an external
//! coordinate index, so lookups are a seek and a read.

pub mod display;
pub mod dtype;
pub mod error;
pub mod header;
pub mod index;
pub mod io;
pub mod pack;
pub mod query;
pub mod reader;
pub mod view;
pub mod writer;

pub use display::{DisplayOptions, MissingPolicy};
pub use dtype::{DType, Value};
pub use error::{Result, TbkError};
pub use header::{read_header, Header, HEADER_SIZE};
pub use index::{locate_index, CoordinateResolver, IndexRecord, IndexRecords, SiteIndex};
pub use pack::{pack_aligned, pack_table, pack_values, ColumnSpec, PackOptions};
pub use query::{
    query_interval, query_site_samples, query_sites_samples, sample_name, QueryRow, Region,
};
pub use reader::{row_offset, Reader};
pub use view::{view, ViewSummary};
pub use writer::Writer;

#[cfg(test)]
pub(crate) mod test_utils;
