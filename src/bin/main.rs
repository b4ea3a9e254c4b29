#[cfg(feature = "cli")]
mod commands;

#[cfg(feature = "cli")]
mod cli {
    use crate::commands::{header, pack, query, view};
    use clap::Parser;
    use tbkstore::error::TbkError;
    use tracing_subscriber::EnvFilter;

    #[derive(Parser)]
    #[command(author, version, about, long_about = None)]
    pub struct Cli {
        /// Log debug messages (overrides RUST_LOG).
        #[arg(short, long, global = true)]
        verbose: bool,

        #[command(subcommand)]
        command: Commands,
    }

    #[derive(clap::Subcommand)]
    enum Commands {
        /// Pack columns of a BED-like table into .tbk files.
        Pack(pack::PackArgs),
        /// Look up values for a region in one or more .tbk files.
        Query(query::QueryArgs),
        /// Print every value of a .tbk file alongside its coordinates.
        View(view::ViewArgs),
        /// Print the header fields of .tbk files.
        Header(header::HeaderArgs),
    }

    fn init_logging(verbose: bool) {
        let filter = if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
        };
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    pub fn run() -> Result<(), TbkError> {
        let cli = Cli::parse();
        init_logging(cli.verbose);
        match cli.command {
            Commands::Pack(args) => pack::run(args),
            Commands::Query(args) => query::run(args),
            Commands::View(args) => view::run(args),
            Commands::Header(args) => header::run(args),
        }
    }
}

fn main() {
    #[cfg(feature = "cli")]
    if let Err(e) = cli::run() {
        // Downstream closed early, e.g. `tbk view x.tbk | head`.
        if e.is_broken_pipe() {
            std::process::exit(0);
        }
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("CLI feature not enabled. Please rebuild with --features cli");
        std::process::exit(1);
    }
}
