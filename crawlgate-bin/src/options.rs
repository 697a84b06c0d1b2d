use crate::verbosity::Verbosity;
use anyhow::{Error, anyhow};
use clap::builder::PossibleValuesParser;
use clap::{Args, Parser, Subcommand, builder::TypedValueParser};
use std::{path::PathBuf, str::FromStr, time::Duration};
use strum::{Display, VariantNames};

pub(crate) const CRAWLGATE_CONFIG_FILE: &str = "crawlgate.toml";

const DEFAULT_REQUESTS: &str = "5";

/// The format to use for the per-domain statistics report
#[derive(Debug, Default, Clone, Copy, Display, VariantNames, PartialEq, Eq)]
#[non_exhaustive]
#[strum(serialize_all = "snake_case")]
pub(crate) enum StatsFormat {
    #[default]
    Compact,
    Json,
    Markdown,
}

impl FromStr for StatsFormat {
    type Err = Error;

    fn from_str(format: &str) -> Result<Self, Self::Err> {
        match format.to_lowercase().as_str() {
            "compact" | "string" => Ok(StatsFormat::Compact),
            "json" => Ok(StatsFormat::Json),
            "markdown" | "md" => Ok(StatsFormat::Markdown),
            _ => Err(anyhow!("Unknown format {format}")),
        }
    }
}

/// crawlgate throttles crawlers on a per-domain basis using token buckets.
///
/// Use `check` to validate a throttling configuration and `simulate` to see
/// how a burst of requests would be spread out over time.
#[derive(Parser, Debug)]
#[command(version, about, next_display_order = None)]
pub(crate) struct CrawlgateOptions {
    #[clap(flatten)]
    pub(crate) verbose: Verbosity,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Validate a configuration file and print the effective limits
    Check(CheckOptions),
    /// Send concurrent requests through the limiter and report the delays
    Simulate(SimulateOptions),
}

#[derive(Args, Debug)]
pub(crate) struct CheckOptions {
    /// Configuration file to validate (TOML, or JSON with a `.json` extension)
    #[arg(value_name = "CONFIG")]
    pub(crate) config_file: PathBuf,
}

#[derive(Args, Debug)]
pub(crate) struct SimulateOptions {
    /// Domains to send requests to.
    ///
    /// Defaults to the domains listed in the configuration file.
    #[arg(value_name = "DOMAIN")]
    pub(crate) domains: Vec<String>,

    /// Configuration file to use
    ///
    /// Without one, every domain is limited to 1 request per second.
    #[arg(short, long = "config")]
    pub(crate) config_file: Option<PathBuf>,

    /// Number of concurrent requests per domain
    #[arg(
        short = 'n',
        long,
        default_value = DEFAULT_REQUESTS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub(crate) requests: u32,

    /// Give up on a request if it cannot be sent within this time,
    /// e.g. `500ms` or `2s`
    #[arg(long, value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub(crate) timeout: Option<Duration>,

    /// Output format of the statistics report
    #[arg(
        short,
        long,
        default_value = "compact",
        value_parser = PossibleValuesParser::new(StatsFormat::VARIANTS)
            .map(|s| s.parse::<StatsFormat>().unwrap())
    )]
    pub(crate) format: StatsFormat,
}
