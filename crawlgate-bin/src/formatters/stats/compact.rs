use anyhow::Result;
use std::fmt::{self, Display};

use crawlgate_lib::StatsMap;

use super::StatsFormatter;

struct CompactStats<'a> {
    stats: &'a StatsMap,
}

impl Display for CompactStats<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sorted = self.stats.sorted();

        writeln!(f, "📊 Per-domain Statistics")?;
        writeln!(f, "{}", "─".repeat(60))?;

        let domain_width = sorted
            .iter()
            .map(|(domain, _)| domain.len())
            .max()
            .unwrap_or(0)
            .max(8)
            + 2;

        for (domain, stats) in sorted {
            writeln!(
                f,
                "{:<width$} │ {:>6} reqs │ {:>6} delayed ({:>5.1}%) │ {:>7}ms avg wait",
                domain,
                stats.total_requests,
                stats.delayed_requests,
                stats.delay_rate() * 100.0,
                stats.avg_wait_time().as_millis(),
                width = domain_width
            )?;
        }

        Ok(())
    }
}

pub(crate) struct Compact;

impl Compact {
    pub(crate) const fn new() -> Self {
        Self
    }
}

impl StatsFormatter for Compact {
    fn format(&self, stats: &StatsMap) -> Result<Option<String>> {
        if stats.is_empty() {
            return Ok(None);
        }
        Ok(Some(CompactStats { stats }.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatters::stats::test_stats;

    #[test]
    fn test_compact_format() {
        let output = Compact::new().format(&test_stats::sample()).unwrap().unwrap();
        let lines: Vec<_> = output.lines().collect();

        assert_eq!(lines[0], "📊 Per-domain Statistics");
        // Busiest domain first
        assert!(lines[2].starts_with("api.github.com"));
        assert!(lines[2].contains("4 reqs"));
        assert!(lines[2].contains("2 delayed ( 50.0%)"));
        assert!(lines[2].contains("1500ms avg wait"));
        assert!(lines[3].starts_with("docs.rs"));
    }

    #[test]
    fn test_compact_format_empty() {
        assert_eq!(Compact::new().format(&StatsMap::default()).unwrap(), None);
    }
}
