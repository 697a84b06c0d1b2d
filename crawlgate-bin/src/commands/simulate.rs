use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use crawlgate_lib::{ConfigFile, LimitConfig, RateLimitError, RateLimiter, WaitContext};
use futures::future::join_all;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::ExitCode;
use crate::formatters::get_stats_formatter;
use crate::options::{CRAWLGATE_CONFIG_FILE, SimulateOptions};

/// Send `--requests` concurrent requests to every domain and print how the
/// limiter spread them out
pub(crate) async fn simulate(opts: &SimulateOptions) -> Result<ExitCode> {
    let config = match config_path(opts) {
        Some(path) => match super::load_config(&path) {
            Some(config) => Some(config),
            None => return Ok(ExitCode::ConfigFile),
        },
        None => None,
    };

    let domains = domains(opts, config.as_ref())?;
    let limiter = match &config {
        Some(config) => {
            RateLimiter::from_config(config).context("Cannot create rate limiter")?
        }
        None => RateLimiter::new(HashMap::new(), LimitConfig::CONSERVATIVE),
    };

    let shutdown = CancellationToken::new();
    let ctrl_c = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl-C, cancelling pending requests");
                shutdown.cancel();
            }
        })
    };

    info!(
        "Simulating {} request(s) to each of {} domain(s)",
        opts.requests,
        domains.len()
    );
    let failures = run_requests(&limiter, &domains, opts, &shutdown).await;
    ctrl_c.abort();

    for (domain, errors) in &failures {
        if let Some(first) = errors.first() {
            warn!(
                "{} of {} request(s) to {domain} gave up: {first}",
                errors.len(),
                opts.requests
            );
        }
    }

    let formatter = get_stats_formatter(opts.format);
    if let Some(output) = formatter.format(&limiter.get_all_stats())? {
        println!("{output}");
    }

    limiter.close()?;
    Ok(ExitCode::Success)
}

/// Issue all requests concurrently and collect the failed ones per domain
async fn run_requests(
    limiter: &RateLimiter,
    domains: &[String],
    opts: &SimulateOptions,
    shutdown: &CancellationToken,
) -> HashMap<String, Vec<RateLimitError>> {
    let requests = domains.iter().flat_map(move |domain| {
        (0..opts.requests).map(move |_| async move {
            let mut ctx = WaitContext::default().with_cancellation(shutdown.child_token());
            if let Some(timeout) = opts.timeout {
                ctx = ctx.with_timeout(timeout);
            }
            (domain, limiter.wait(domain, &ctx).await)
        })
    });

    let mut failures: HashMap<String, Vec<RateLimitError>> = HashMap::new();
    for (domain, result) in join_all(requests).await {
        if let Err(e) = result {
            failures.entry(domain.clone()).or_default().push(e);
        }
    }
    failures
}

/// The explicit `--config` file, or `crawlgate.toml` in the working
/// directory if it exists
fn config_path(opts: &SimulateOptions) -> Option<PathBuf> {
    opts.config_file.clone().or_else(|| {
        let default_config = PathBuf::from(CRAWLGATE_CONFIG_FILE);
        default_config.is_file().then_some(default_config)
    })
}

/// Domains from the command line, falling back to the configured ones
fn domains(opts: &SimulateOptions, config: Option<&ConfigFile>) -> Result<Vec<String>> {
    if !opts.domains.is_empty() {
        return Ok(opts.domains.clone());
    }

    let mut configured: Vec<_> = config
        .map(|config| config.domains.keys().cloned().collect())
        .unwrap_or_default();
    if configured.is_empty() {
        bail!("No domains to simulate: pass them as arguments or configure them in a config file");
    }
    configured.sort();
    Ok(configured)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{Command, CrawlgateOptions};
    use clap::Parser;
    use pretty_assertions::assert_eq;

    fn simulate_options(args: &[&str]) -> SimulateOptions {
        let args = ["crawlgate", "simulate"].iter().chain(args).copied();
        match CrawlgateOptions::parse_from(args).command {
            Command::Simulate(opts) => opts,
            Command::Check(_) => unreachable!(),
        }
    }

    fn config() -> ConfigFile {
        ConfigFile::from_toml_str(
            r#"
            version = "1"

            [default_config]
            requests_per_second = 1.0
            burst_capacity = 1

            [domains."b.example"]
            requests_per_second = 2.0
            burst_capacity = 2

            [domains."a.example"]
            requests_per_second = 2.0
            burst_capacity = 2
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_domains_from_arguments_take_precedence() {
        let opts = simulate_options(&["z.example"]);
        assert_eq!(domains(&opts, Some(&config())).unwrap(), vec!["z.example"]);
    }

    #[test]
    fn test_domains_from_config_are_sorted() {
        let opts = simulate_options(&[]);
        assert_eq!(
            domains(&opts, Some(&config())).unwrap(),
            vec!["a.example", "b.example"]
        );
    }

    #[test]
    fn test_no_domains() {
        let opts = simulate_options(&[]);
        assert!(domains(&opts, None).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_requests_reports_timeouts() {
        let opts = simulate_options(&["--requests", "3", "--timeout", "1500ms", "a.example"]);
        let limiter = RateLimiter::new(HashMap::new(), LimitConfig::CONSERVATIVE);

        let failures =
            run_requests(&limiter, &opts.domains, &opts, &CancellationToken::new()).await;

        // At 1 req/s the third request would have to wait 2s
        assert_eq!(failures["a.example"].len(), 1);
        assert!(failures["a.example"][0].is_deadline_exceeded());

        let stats = limiter.get_stats("a.example").unwrap();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.delayed_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_requests_honors_shutdown() {
        let opts = simulate_options(&["--requests", "3", "a.example"]);
        let limiter = RateLimiter::new(HashMap::new(), LimitConfig::CONSERVATIVE);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let failures = run_requests(&limiter, &opts.domains, &opts, &shutdown).await;
        assert_eq!(failures["a.example"].len(), 3);
        assert!(failures["a.example"].iter().all(RateLimitError::is_cancelled));
    }
}
