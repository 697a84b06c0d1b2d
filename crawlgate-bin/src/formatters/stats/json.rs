use anyhow::{Context, Result};
use serde_json::json;

use super::StatsFormatter;
use crawlgate_lib::StatsMap;

pub(crate) struct Json;

impl Json {
    pub(crate) const fn new() -> Self {
        Self
    }
}

impl StatsFormatter for Json {
    /// Format domain stats as JSON object
    fn format(&self, stats: &StatsMap) -> Result<Option<String>> {
        let output = json!({
            "domain_statistics": stats
        });

        serde_json::to_string_pretty(&output)
            .map(Some)
            .context("Cannot format domain stats as JSON")
    }
}
