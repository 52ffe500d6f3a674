use std::process;

use clap::Parser;

#[macro_use]
extern crate log;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// Parse command line arguments and run the deduplication pipeline.
fn main() {
    // ----------------------------- Run CLI Parser
    let cli = parser::Cli::parse();

    // ----------------------------- Init logger.
    logger::init(cli.verbose + u8::from(!cli.quiet));

    // ----------------------------- Serialize command line arguments
    cli.serialize();

    // ----------------------------- Validate front-end arguments
    if let Err(e) = cli.validate() {
        error!("{e}");
        process::exit(1);
    }

    // ----------------------------- Run
    if let Err(e) = dedupe::run(&cli) {
        error!("{e:?}");
        process::exit(1);
    }
}
