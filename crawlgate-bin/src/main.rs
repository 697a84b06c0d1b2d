//! `crawlgate` validates per-domain throttling configurations and simulates
//! how a crawler's requests would be spread out by the rate limiter.
//!
//! The binary is a thin wrapper around `crawlgate-lib`.
//!
//! Check a configuration file:
//! ```sh
//! crawlgate check crawlgate.toml
//! ```
//!
//! Send 10 concurrent requests to each configured domain:
//! ```sh
//! crawlgate simulate --config crawlgate.toml --requests 10
//! ```
//!
//! Give up on requests that cannot be sent within two seconds:
//! ```sh
//! crawlgate simulate --timeout 2s --format markdown example.com docs.rs
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]
#![deny(missing_docs)]

use std::io::{self, ErrorKind};

use anyhow::{Error, Result};
use clap::Parser;
use formatters::log::init_logging;

mod commands;
mod formatters;
mod options;
mod verbosity;

use crate::options::{Command, CrawlgateOptions};

/// A C-like enum that can be cast to `i32` and used as process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    // NOTE: exit code 1 is used for any `Result::Err` bubbled up to `main()`
    // using the `?` operator.
    #[allow(unused)]
    UnexpectedFailure = 1,
    ConfigFile = 3,
}

fn main() -> Result<()> {
    // std::process::exit doesn't guarantee that all destructors will be run,
    // therefore we wrap the main code in another function to ensure that.
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

/// Parse the options, set up logging and the runtime, and run the command
fn run_main() -> Result<i32> {
    let opts = CrawlgateOptions::parse();
    init_logging(&opts.verbose);

    let exit_code = match &opts.command {
        Command::Check(check) => commands::check(check),
        Command::Simulate(simulate) => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(commands::simulate(simulate))
        }
    };

    match exit_code {
        Ok(code) => Ok(code as i32),
        Err(e) if Some(ErrorKind::BrokenPipe) == underlying_io_error_kind(&e) => {
            Ok(ExitCode::Success as i32)
        }
        Err(e) => Err(e),
    }
}

/// Check if the given error can be traced back to an `io::ErrorKind`
fn underlying_io_error_kind(error: &Error) -> Option<io::ErrorKind> {
    for cause in error.chain() {
        if let Some(io_error) = cause.downcast_ref::<io::Error>() {
            return Some(io_error.kind());
        }
    }
    None
}
