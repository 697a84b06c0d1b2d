use std::fmt::{self, Display};
use std::io::{self, Write};

use anyhow::Result;
use crawlgate_lib::{ConfigFile, LimitConfig};

use crate::ExitCode;
use crate::options::CheckOptions;

/// The limits a configuration file puts into effect
struct EffectiveLimits<'a> {
    config: &'a ConfigFile,
}

impl Display for EffectiveLimits<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut domains: Vec<_> = self.config.domains.iter().collect();
        domains.sort_by_key(|(domain, _)| domain.as_str());

        let width = domains
            .iter()
            .map(|(domain, _)| domain.len())
            .max()
            .unwrap_or(0)
            .max("(default)".len());

        write_limit(f, "(default)", &self.config.default_config, width)?;
        for (domain, config) in domains {
            write_limit(f, domain, config, width)?;
        }
        Ok(())
    }
}

fn write_limit(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    config: &LimitConfig,
    width: usize,
) -> fmt::Result {
    writeln!(
        f,
        "{name:<width$}  {} req/s, burst {}",
        config.rate_per_second(),
        config.burst_capacity()
    )
}

/// Validate the configuration file and print the limits it defines
pub(crate) fn check(opts: &CheckOptions) -> Result<ExitCode> {
    let Some(config) = super::load_config(&opts.config_file) else {
        return Ok(ExitCode::ConfigFile);
    };

    let mut stdout = io::stdout().lock();
    writeln!(
        stdout,
        "✅ `{}` is valid (version {}, {} domain(s))",
        opts.config_file.display(),
        config.version,
        config.domains.len()
    )?;
    write!(stdout, "{}", EffectiveLimits { config: &config })?;

    Ok(ExitCode::Success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_effective_limits() {
        let config = ConfigFile::from_toml_str(
            r#"
            version = "1"

            [default_config]
            requests_per_second = 1.0
            burst_capacity = 1

            [domains."docs.rs"]
            requests_per_second = 10.0
            burst_capacity = 5

            [domains."api.github.com"]
            requests_per_second = 0.5
            burst_capacity = 2
            "#,
        )
        .unwrap();

        let expected = "\
(default)       1 req/s, burst 1
api.github.com  0.5 req/s, burst 2
docs.rs         10 req/s, burst 5
";
        assert_eq!(EffectiveLimits { config: &config }.to_string(), expected);
    }
}
