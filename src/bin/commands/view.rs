// bin/commands/view.rs

use clap::Args;
use std::path::PathBuf;
use std::time::Instant;
use tbkstore::error::TbkError;
use tbkstore::io::OutputStream;
use tbkstore::view::view;
use tracing::info;

use super::DisplayArgs;

#[derive(Args)]
pub struct ViewArgs {
    /// Input .tbk file.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Coordinate index. Defaults to the index path stored in the file.
    #[arg(short, long, value_name = "idx.gz")]
    pub index: Option<PathBuf>,

    /// Output file.
    #[arg(short, long, value_name = "values.tsv")]
    pub output: Option<String>,

    #[command(flatten)]
    pub display: DisplayArgs,
}

pub fn run(args: ViewArgs) -> Result<(), TbkError> {
    let start = Instant::now();
    let mut output_writer = OutputStream::new(args.output).writer()?;

    let summary = view(
        &args.file,
        args.index.as_deref(),
        &args.display.options(),
        &mut output_writer,
    )?;

    if summary.sink_closed {
        info!("Output closed after {} records", summary.records);
    } else {
        info!("Viewed {} records in {:?}", summary.records, start.elapsed());
    }
    Ok(())
}
