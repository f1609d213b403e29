use indicatif::{ProgressBar, ProgressStyle};
use sitewalk_scanner::error::{Result, ScanError};
use sitewalk_scanner::{ResolutionResult, Resolver, ResolverConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;
use url::Url;

/// Options for configuring a resolve operation
pub struct ResolveOptions {
    pub urls: Vec<String>,
    pub resolver: ResolverConfig,
    /// Give up on the whole resolution after this many seconds
    pub deadline_secs: Option<u64>,
    pub show_progress_bars: bool,
}

impl ResolveOptions {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            resolver: ResolverConfig::default(),
            deadline_secs: None,
            show_progress_bars: false,
        }
    }
}

/// Callback for reporting resolve progress
pub use sitewalk_scanner::ProgressCallback as ResolveProgressCallback;

/// Extract the host component from a URL
pub fn extract_url_host(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Extract the path component from a URL
pub fn extract_url_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| {
            let path = u.path().to_string();
            if path.is_empty() || path == "/" {
                "/".to_string()
            } else {
                path
            }
        })
        .unwrap_or_else(|| url.to_string())
}

/// Run `urls` through an existing resolver, honoring an optional overall
/// deadline. Bad entries are reported per reference in the result.
pub async fn run_resolver(
    resolver: &Resolver,
    urls: &[String],
    deadline_secs: Option<u64>,
) -> Result<ResolutionResult> {
    match deadline_secs {
        Some(secs) => {
            resolver
                .resolve_with_deadline(urls, Duration::from_secs(secs))
                .await
        }
        None => Ok(resolver.resolve(urls).await),
    }
}

/// Execute a resolve with the given options
/// Returns the resolution result
pub async fn execute_resolve(
    options: ResolveOptions,
    progress_callback: Option<ResolveProgressCallback>,
) -> Result<ResolutionResult> {
    let ResolveOptions {
        urls,
        resolver: config,
        deadline_secs,
        show_progress_bars,
    } = options;

    let progress_bar = if show_progress_bars {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .map_err(|e| ScanError::Other(e.to_string()))?,
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message("Starting resolution...");
        Some(Arc::new(pb))
    } else {
        None
    };

    let fetched_count = Arc::new(AtomicUsize::new(0));

    let mut resolver = Resolver::from_config(&config)?;
    if progress_bar.is_some() || progress_callback.is_some() {
        let pb_clone = progress_bar.clone();
        let callback_clone = progress_callback.clone();
        let count_clone = fetched_count.clone();
        resolver = resolver.with_progress_callback(Arc::new(move |url: String| {
            let count = count_clone.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(ref pb) = pb_clone {
                pb.set_message(format!("Fetching... {} sitemaps requested ({})", count, extract_url_path(&url)));
            }
            if let Some(ref callback) = callback_clone {
                callback(url);
            }
        }));
    }

    info!(
        "Resolving {} root sitemap(s) with concurrency {} and max depth {}",
        urls.len(),
        config.concurrency,
        config.max_depth
    );

    let outcome = run_resolver(&resolver, &urls, deadline_secs).await;

    if let Some(ref pb) = progress_bar {
        let total = fetched_count.load(Ordering::Relaxed);
        match outcome {
            Ok(ref result) => pb.finish_with_message(format!(
                "Resolution complete! {} sitemaps requested, {} urlsets found",
                total,
                result.leaves.len()
            )),
            Err(_) => pb.abandon_with_message(format!(
                "Resolution stopped after {} sitemaps requested",
                total
            )),
        }
    }

    outcome
}
