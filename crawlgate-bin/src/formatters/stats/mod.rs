mod compact;
mod json;
mod markdown;

pub(crate) use compact::Compact;
pub(crate) use json::Json;
pub(crate) use markdown::Markdown;

use anyhow::Result;
use crawlgate_lib::StatsMap;

/// Trait for formatting per-domain statistics in different output formats
pub(crate) trait StatsFormatter {
    /// Format the statistics, or return `None` if there is nothing to report
    fn format(&self, stats: &StatsMap) -> Result<Option<String>>;
}
