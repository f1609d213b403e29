use crate::server::{AppState, serve};
use anyhow::Context;
use clap::ArgMatches;
use colored::Colorize;
use sitewalk_core::report::{ReportData, ReportFormat, generate_report, write_report};
use sitewalk_core::resolve::{ResolveOptions, execute_resolve};
use sitewalk_scanner::{Resolver, ResolverConfig};
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Install the global tracing subscriber, honoring `RUST_LOG` when set.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // A subscriber may already be installed when embedded in tests
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

// Helper functions for resolve handler

/// Load URLs from either a file or the `--url` arguments
pub fn load_urls_from_source(
    urls: &[&Url],
    hosts_file: Option<&PathBuf>,
) -> Result<Vec<String>, String> {
    if let Some(hosts_file_path) = hosts_file {
        load_urls_from_file(hosts_file_path)
    } else if !urls.is_empty() {
        Ok(urls.iter().map(|url| url.as_str().to_string()).collect())
    } else {
        Err("Either --url or --hosts-file must be provided".to_string())
    }
}

/// Load and parse URLs from a file; blank lines and `#` comments are skipped
pub fn load_urls_from_file(path: &PathBuf) -> Result<Vec<String>, String> {
    let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    let content = fs::read_to_string(&expanded)
        .map_err(|e| format!("Failed to read hosts file {}: {}", path.display(), e))?;

    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_url_line)
        .collect();

    if urls.is_empty() {
        return Err(format!("No valid URLs found in {}", path.display()));
    }

    Ok(urls)
}

/// Parse a single line as a URL, trying to add https:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    if let Ok(url) = Url::parse(line)
        && matches!(url.scheme(), "http" | "https")
    {
        return Some(line.to_string());
    }

    let with_scheme = format!("https://{}", line);
    if let Ok(url) = Url::parse(&with_scheme)
        && url.host_str().is_some_and(|host| host.contains('.') || host == "localhost")
    {
        return Some(with_scheme);
    }

    eprintln!("{} Skipping invalid URL '{}'", "⚠".yellow(), line);
    None
}

/// Read the shared resolver flags into a config
pub fn resolver_config_from_args(args: &ArgMatches) -> ResolverConfig {
    let defaults = ResolverConfig::default();
    ResolverConfig {
        concurrency: args
            .get_one::<usize>("concurrency")
            .copied()
            .unwrap_or(defaults.concurrency),
        timeout_secs: args
            .get_one::<u64>("timeout")
            .copied()
            .unwrap_or(defaults.timeout_secs),
        max_depth: args
            .get_one::<usize>("max-depth")
            .copied()
            .unwrap_or(defaults.max_depth),
        user_agent: defaults.user_agent,
    }
}

pub async fn handle_resolve(sub_matches: &ArgMatches) -> anyhow::Result<()> {
    let url_args: Vec<&Url> = sub_matches
        .get_many::<Url>("url")
        .map(|values| values.collect())
        .unwrap_or_default();
    let hosts_file = sub_matches.get_one::<PathBuf>("hosts-file");
    let output = sub_matches.get_one::<PathBuf>("output");
    let format_name = sub_matches
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("text");
    let format = ReportFormat::from_str(format_name)
        .with_context(|| format!("Unsupported report format '{}'", format_name))?;
    let no_progress = sub_matches.get_flag("no-progress");

    let urls = load_urls_from_source(&url_args, hosts_file).map_err(anyhow::Error::msg)?;
    let config = resolver_config_from_args(sub_matches);

    eprintln!("\n🗺️  Resolving {} sitemap(s)", urls.len());
    eprintln!("Concurrency: {}", config.concurrency);
    eprintln!("Max depth: {}", config.max_depth);
    eprintln!("Timeout: {}s\n", config.timeout_secs);

    let mut options = ResolveOptions::new(urls.clone());
    options.resolver = config;
    options.deadline_secs = sub_matches.get_one::<u64>("deadline").copied();
    options.show_progress_bars = !no_progress;

    let result = execute_resolve(options, None)
        .await
        .context("Resolution failed")?;

    let data = ReportData::new(&urls, &result);
    let report = generate_report(&data, &format).context("Failed to render report")?;
    write_report(&report, output.map(PathBuf::as_path)).context("Failed to write report")?;

    if let Some(path) = output {
        eprintln!(
            "{} Report written to {}",
            "✓".green().bold(),
            path.display().to_string().bright_white()
        );
    }

    Ok(())
}

pub async fn handle_serve(sub_matches: &ArgMatches) -> anyhow::Result<()> {
    let addr = sub_matches
        .get_one::<SocketAddr>("bind")
        .copied()
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 5000)));
    let config = resolver_config_from_args(sub_matches);

    let resolver =
        Resolver::from_config(&config).context("Failed to build the sitemap resolver")?;
    let state = AppState {
        resolver: Arc::new(resolver),
        deadline_secs: sub_matches.get_one::<u64>("deadline").copied(),
    };

    info!(
        "Fetch concurrency {}, timeout {}s, max depth {}",
        config.concurrency, config.timeout_secs, config.max_depth
    );
    serve(addr, state).await
}
