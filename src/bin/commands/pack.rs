// bin/commands/pack.rs

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;
use tbkstore::dtype::DType;
use tbkstore::error::TbkError;
use tbkstore::pack::{pack_table, ColumnSpec, PackOptions};
use tracing::info;

#[derive(Args)]
pub struct PackArgs {
    /// Input TSV/BED file (seqname, start, end, values...), optionally gzipped.
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Columns to pack, 1-based and comma-separated.
    #[arg(short, long, value_delimiter = ',', default_value = "4")]
    pub cols: Vec<usize>,

    /// Data type per column (int, float, double, char, string:N, float.int,
    /// float.float, or auto). A single type applies to every column.
    #[arg(short = 't', long, value_delimiter = ',', default_value = "auto")]
    pub dtype: Vec<String>,

    /// Index path recorded in the output headers. Defaults to --index-out.
    #[arg(short, long, value_name = "idx.gz")]
    pub index: Option<String>,

    /// Also write the coordinate index (seqname, start, end, row) here.
    #[arg(short = 'x', long, value_name = "idx.gz")]
    pub index_out: Option<PathBuf>,

    /// Output directory.
    #[arg(short, long, default_value = ".")]
    pub outdir: PathBuf,

    /// Output files are named <basename>_<column>.tbk.
    #[arg(short, long, default_value = "out")]
    pub basename: String,

    /// The first line names the columns.
    #[arg(long)]
    pub header: bool,

    /// Comment character to skip lines starting with this
    #[arg(long, default_value = "#")]
    pub comment: char,

    /// Force overwrite of output files if they exist
    #[arg(short = 'f', long)]
    pub force: bool,
}

fn parse_dtype(name: &str) -> Result<Option<DType>, TbkError> {
    if name.eq_ignore_ascii_case("auto") {
        Ok(None)
    } else {
        DType::from_str(name).map(Some)
    }
}

fn column_specs(cols: &[usize], dtypes: &[String]) -> Result<Vec<ColumnSpec>, TbkError> {
    let dtypes = dtypes
        .iter()
        .map(|d| parse_dtype(d))
        .collect::<Result<Vec<_>, _>>()?;
    match dtypes.as_slice() {
        [dtype] => Ok(cols.iter().map(|&c| ColumnSpec::new(c, *dtype)).collect()),
        _ if dtypes.len() == cols.len() => Ok(cols
            .iter()
            .zip(dtypes.iter().copied())
            .map(|(&c, dtype)| ColumnSpec::new(c, dtype))
            .collect()),
        _ => Err(format!(
            "Got {} columns but {} data types; give one type or one per column.",
            cols.len(),
            dtypes.len()
        )
        .into()),
    }
}

pub fn run(args: PackArgs) -> Result<(), TbkError> {
    // For timing the pack operation
    let start = Instant::now();

    let mut options = PackOptions::default()
        .columns(column_specs(&args.cols, &args.dtype)?)
        .has_header(args.header)
        .comment(Some(args.comment as u8))
        .outdir(&args.outdir)
        .basename(&args.basename)
        .force(args.force);
    options.index_path = args.index;
    options.index_sidecar = args.index_out;

    info!("Packing {} into {}", args.input.display(), args.outdir.display());

    let pb = ProgressBar::new_spinner().with_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} rows ({per_sec})")?,
    );
    let outputs = pack_table(&args.input, &options, |rows| pb.set_position(rows))?;
    pb.finish_with_message("Packing complete!");

    for path in &outputs {
        info!("Wrote {}", path.display());
    }
    info!("Packed {} files in {:?}", outputs.len(), start.elapsed());
    Ok(())
}
