use std::io;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "castor", about = "The Castor chess engine, speaking UCI on stdin/stdout")]
struct Args {
    /// Transposition table size in MiB.
    #[arg(long, default_value_t = 64)]
    hash_mib: usize,

    /// Log filter, overriding RUST_LOG (e.g. `castor_search=debug`).
    #[arg(long)]
    log: Option<String>,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let filter = match &args.log {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::from_default_env(),
    };

    // Stdout belongs to the UCI protocol; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    castor_engine::uci::run(args.hash_mib)
}
