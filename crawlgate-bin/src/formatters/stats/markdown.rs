use anyhow::Result;
use std::fmt::{self, Display};

use crawlgate_lib::StatsMap;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Segment},
};

use super::StatsFormatter;

struct MarkdownStats<'a> {
    stats: &'a StatsMap,
}

impl Display for MarkdownStats<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## Per-domain Statistics")?;
        writeln!(f)?;
        writeln!(f, "{}", stats_table(self.stats))?;

        Ok(())
    }
}

#[derive(Tabled)]
struct StatsTableEntry {
    #[tabled(rename = "Domain")]
    domain: String,
    #[tabled(rename = "Requests")]
    requests: u64,
    #[tabled(rename = "Delayed")]
    delayed: u64,
    #[tabled(rename = "Delay Rate")]
    delay_rate: String,
    #[tabled(rename = "Avg Wait")]
    avg_wait: String,
}

fn stats_table(stats: &StatsMap) -> String {
    let entries: Vec<StatsTableEntry> = stats
        .sorted()
        .into_iter()
        .map(|(domain, stats)| StatsTableEntry {
            domain,
            requests: stats.total_requests,
            delayed: stats.delayed_requests,
            delay_rate: format!("{:.1}%", stats.delay_rate() * 100.0),
            avg_wait: format!("{}ms", stats.avg_wait_time().as_millis()),
        })
        .collect();

    Table::new(entries)
        .with(Modify::new(Segment::all()).with(Alignment::left()))
        .with(Style::markdown())
        .to_string()
}

pub(crate) struct Markdown;

impl Markdown {
    pub(crate) const fn new() -> Self {
        Self
    }
}

impl StatsFormatter for Markdown {
    fn format(&self, stats: &StatsMap) -> Result<Option<String>> {
        if stats.is_empty() {
            return Ok(None);
        }
        Ok(Some(MarkdownStats { stats }.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatters::stats::test_stats;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_markdown_table() {
        let table = stats_table(&test_stats::sample());
        let expected = "\
| Domain         | Requests | Delayed | Delay Rate | Avg Wait |
|----------------|----------|---------|------------|----------|
| api.github.com | 4        | 2       | 50.0%      | 1500ms   |
| docs.rs        | 3        | 0       | 0.0%       | 0ms      |";
        assert_eq!(table, expected);
    }

    #[test]
    fn test_markdown_format() {
        let output = Markdown::new()
            .format(&test_stats::sample())
            .unwrap()
            .unwrap();
        assert!(output.starts_with("## Per-domain Statistics\n\n| Domain"));
        assert_eq!(Markdown::new().format(&StatsMap::default()).unwrap(), None);
    }
}
