//! tw - tasks and waits
//!
//! A terminal task tracker where tasks can be blocked by other tasks or by
//! waits: external conditions that resolve at a time or by hand.

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tw::cli::Cli;
use tw::output::emit_error;

fn main() {
    // Tracing is opt-in via RUST_LOG and goes to stderr so --json stays clean.
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|raw| {
            let raw = raw.trim();
            if raw.is_empty() || raw.len() > 4096 {
                return None;
            }
            EnvFilter::try_new(raw).ok()
        })
        .unwrap_or_else(|| EnvFilter::new("off"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();
    let command = cli.command.name();
    let json = cli.json;
    if let Err(err) = cli.run() {
        let _ = emit_error(command, &err, json);
        std::process::exit(err.exit_code());
    }
}
