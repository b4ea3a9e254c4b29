// bin/commands/mod.rs

pub mod header;
pub mod pack;
pub mod query;
pub mod view;

use clap::Args;
use tbkstore::display::{DisplayOptions, MissingPolicy};

/// Text rendering flags shared by `query` and `view`.
#[derive(Args)]
pub struct DisplayArgs {
    /// Print this in place of missing (-1) values, e.g. "." or "NA".
    #[arg(long, value_name = "MARKER")]
    pub na: Option<String>,

    /// Digits after the decimal point for float values.
    #[arg(short, long, default_value_t = 6)]
    pub precision: usize,

    /// Do not print the column-name line.
    #[arg(long)]
    pub no_header: bool,
}

impl DisplayArgs {
    pub fn options(&self) -> DisplayOptions {
        let missing = match &self.na {
            Some(marker) => MissingPolicy::Marker(marker.clone()),
            None => MissingPolicy::Literal,
        };
        DisplayOptions::default()
            .precision(self.precision)
            .missing(missing)
            .header(!self.no_header)
    }
}
