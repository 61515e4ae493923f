#![forbid(unsafe_code)]

//! dirtop CLI entry point.

use clap::Parser;
use clap::error::ErrorKind;

mod cli_app;

fn main() {
    let args = match cli_app::Cli::try_parse() {
        Ok(args) => args,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            return;
        }
        Err(err) => {
            // Invalid invocation exits 1 (clap's own default would be 2).
            let _ = err.print();
            std::process::exit(1);
        }
    };
    if let Err(e) = cli_app::run(&args) {
        eprintln!("dirtop: {e}");
        std::process::exit(e.exit_code());
    }
}
