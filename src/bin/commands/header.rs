// bin/commands/header.rs

use clap::Args;
use std::io::Write;
use std::path::{Path, PathBuf};
use tbkstore::error::TbkError;
use tbkstore::header::read_header;
use tbkstore::io::OutputStream;

#[derive(Args)]
pub struct HeaderArgs {
    /// Input .tbk files.
    #[arg(value_name = "FILE", required = true, num_args = 1..)]
    pub files: Vec<PathBuf>,
}

pub fn run(args: HeaderArgs) -> Result<(), TbkError> {
    let mut out = OutputStream::new(None::<&Path>).writer()?;
    writeln!(out, "file\tversion\tdtype\ttag\trecords\tindex")?;
    for file in &args.files {
        let header = read_header(file)?;
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}",
            file.display(),
            header.version,
            header.dtype,
            header.dtype.tag(),
            header.record_count,
            header.index_path
        )?;
    }
    out.flush()?;
    Ok(())
}
