// bin/commands/query.rs

use clap::Args;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use tbkstore::display::write_rows;
use tbkstore::error::TbkError;
use tbkstore::header::read_header;
use tbkstore::index::{locate_index, SiteIndex};
use tbkstore::io::OutputStream;
use tbkstore::query::{
    query_interval, query_site_samples, query_sites_samples, read_regions, Region,
};
use tbkstore::reader::Reader;
use tracing::info;

use super::DisplayArgs;

#[derive(Args)]
pub struct QueryArgs {
    /// Input .tbk files. More than one file queries a single site across
    /// samples.
    #[arg(value_name = "FILE", required = true, num_args = 1..)]
    pub files: Vec<PathBuf>,

    /// The query region, in the format seqname:start-end where start and end are
    /// 1-based inclusive coordinates (like tabix's region argument).
    #[arg(
        short,
        long,
        value_name = "chr17:7661779-7687538",
        required_unless_present = "regions"
    )]
    pub region: Option<String>,

    /// BED file of sites (seqname, start, end; 0-based) to look up in every file.
    #[arg(long, value_name = "regions.bed", conflicts_with = "region")]
    pub regions: Option<PathBuf>,

    /// Coordinate index. Defaults to the index path stored in the first file.
    #[arg(short, long, value_name = "idx.gz")]
    pub index: Option<PathBuf>,

    /// Output file.
    #[arg(short, long, value_name = "values.tsv")]
    pub output: Option<String>,

    #[command(flatten)]
    pub display: DisplayArgs,
}

pub fn run(args: QueryArgs) -> Result<(), TbkError> {
    let duration_start = Instant::now();

    let first = args.files.first().ok_or("No input files given.")?;
    let index_path = match args.index {
        Some(path) => path,
        None => locate_index(first, &read_header(first)?.index_path),
    };
    let index = SiteIndex::open(&index_path)?;

    let rows = if let Some(regions_file) = &args.regions {
        let regions = read_regions(regions_file)?;
        info!(
            "Querying {} regions from {} in {} files",
            regions.len(),
            regions_file.display(),
            args.files.len()
        );
        query_sites_samples(&args.files, &index, &regions)?
    } else {
        let region: Region = args.region.as_deref().ok_or("No region given.")?.parse()?;
        if args.files.len() == 1 {
            info!("Query region {} in {}", region, first.display());
            let mut reader = Reader::open(first)?;
            query_interval(&mut reader, &index, &region)?
        } else {
            info!("Query site {} in {} files", region, args.files.len());
            query_site_samples(&args.files, &index, &region)?
        }
    };

    // Builder output file, possibly compressed
    let output_stream = OutputStream::builder()
        .filepath(args.output)
        .buffer_size(256 * 1024)
        .build();
    let mut output_writer = output_stream.writer()?;

    match rows {
        Some(rows) => {
            info!("{} rows found.", rows.len());
            write_rows(&rows, &args.display.options(), &mut output_writer)?;
        }
        None => info!("No index records overlap the query."),
    }
    output_writer.flush()?;

    info!("Query completed in {:?}", duration_start.elapsed());
    Ok(())
}
