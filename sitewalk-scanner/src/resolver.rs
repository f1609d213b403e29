use crate::classifier::{DocumentClassifier, SitemapNode, XmlClassifier};
use crate::error::{Result, ScanError};
use crate::fetcher::{DEFAULT_USER_AGENT, Fetcher, HttpFetcher};
use crate::result::{Diagnostic, DiagnosticKind, ResolutionResult, ResolveStats};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

pub type ProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Tunables for building a resolver backed by [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Maximum number of fetches in flight across the whole call tree
    pub concurrency: usize,
    pub timeout_secs: u64,
    /// Deepest index nesting followed below a root reference
    pub max_depth: usize,
    pub user_agent: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            concurrency: 32,
            timeout_secs: 10,
            max_depth: 16,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Expands sitemap references into the set of urlset documents they reach.
///
/// Every reference is fetched, classified and either emitted as a leaf or
/// expanded into its children. Every reference is resolved on its own tokio
/// task, so siblings fetch and classify in parallel across the runtime's
/// workers; a single semaphore shared by the whole call tree bounds how many
/// fetches are in flight at once. A permit is only held for the duration of
/// one fetch, so nesting depth can never exhaust the pool.
///
/// Failures are isolated to the reference that caused them: they are logged,
/// recorded as a [`Diagnostic`] and contribute no leaves. A resolution as a
/// whole never fails.
pub struct Resolver {
    fetcher: Arc<dyn Fetcher>,
    classifier: Arc<dyn DocumentClassifier>,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    max_depth: usize,
    progress_callback: Option<ProgressCallback>,
}

/// One level of the chain of index documents above a reference.
struct Ancestor {
    url: String,
    depth: usize,
    parent: Option<Arc<Ancestor>>,
}

impl Ancestor {
    fn contains(&self, url: &str) -> bool {
        let mut current = Some(self);
        while let Some(ancestor) = current {
            if ancestor.url == url {
                return true;
            }
            current = ancestor.parent.as_deref();
        }
        false
    }
}

/// State shared by every task of one `resolve` call.
///
/// Each step runs as its own task, so the collaborators are held here by
/// `Arc` rather than borrowed from the resolver.
struct Walk {
    fetcher: Arc<dyn Fetcher>,
    classifier: Arc<dyn DocumentClassifier>,
    semaphore: Arc<Semaphore>,
    max_depth: usize,
    progress_callback: Option<ProgressCallback>,
    diagnostics: Mutex<Vec<Diagnostic>>,
    fetched: AtomicUsize,
    indexes: AtomicUsize,
    unrecognized: AtomicUsize,
}

impl Walk {
    fn new(resolver: &Resolver) -> Self {
        Self {
            fetcher: Arc::clone(&resolver.fetcher),
            classifier: Arc::clone(&resolver.classifier),
            semaphore: Arc::clone(&resolver.semaphore),
            max_depth: resolver.max_depth,
            progress_callback: resolver.progress_callback.clone(),
            diagnostics: Mutex::new(Vec::new()),
            fetched: AtomicUsize::new(0),
            indexes: AtomicUsize::new(0),
            unrecognized: AtomicUsize::new(0),
        }
    }

    fn record(&self, diagnostic: Diagnostic) {
        // A poisoned lock still holds every diagnostic recorded so far
        let mut diagnostics = match self.diagnostics.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        diagnostics.push(diagnostic);
    }

    fn take_parts(&self) -> (Vec<Diagnostic>, ResolveStats) {
        let diagnostics = match self.diagnostics.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        let stats = ResolveStats {
            fetched: self.fetched.load(Ordering::Relaxed),
            indexes: self.indexes.load(Ordering::Relaxed),
            unrecognized: self.unrecognized.load(Ordering::Relaxed),
            failed: diagnostics.len(),
        };
        (diagnostics, stats)
    }

    /// Spawn one task per reference and union their leaves.
    ///
    /// Dropping the returned future drops the `JoinSet`, which aborts every
    /// task it spawned and, through them, the rest of the subtree.
    fn resolve_many(
        self: &Arc<Self>,
        references: Vec<String>,
        parent: Option<Arc<Ancestor>>,
    ) -> BoxFuture<'static, BTreeSet<String>> {
        let walk = Arc::clone(self);
        async move {
            let mut steps = JoinSet::new();
            for reference in references {
                steps.spawn(Arc::clone(&walk).resolve_one(reference, parent.clone()));
            }

            let mut leaves = BTreeSet::new();
            while let Some(joined) = steps.join_next().await {
                match joined {
                    Ok(found) => leaves.extend(found),
                    Err(e) => warn!("Resolution task did not complete: {}", e),
                }
            }
            leaves
        }
        .boxed()
    }

    fn resolve_one(
        self: Arc<Self>,
        reference: String,
        parent: Option<Arc<Ancestor>>,
    ) -> BoxFuture<'static, BTreeSet<String>> {
        async move {
            let depth = parent.as_ref().map_or(0, |p| p.depth + 1);

            if let Some(ref ancestor) = parent
                && ancestor.contains(&reference)
            {
                warn!("Skipping {}: already being resolved by an ancestor index", reference);
                self.record(Diagnostic::new(
                    &reference,
                    DiagnosticKind::Cycle,
                    format!("{} is referenced by its own index chain", reference),
                ));
                return BTreeSet::new();
            }

            if depth > self.max_depth {
                warn!("Skipping {}: nesting depth {} exceeds {}", reference, depth, self.max_depth);
                self.record(Diagnostic::new(
                    &reference,
                    DiagnosticKind::DepthLimit,
                    format!("nesting depth {} exceeds limit of {}", depth, self.max_depth),
                ));
                return BTreeSet::new();
            }

            let step = AssertUnwindSafe(self.fetch_and_classify(&reference))
                .catch_unwind()
                .await;

            let node = match step {
                Ok(Ok(node)) => node,
                Ok(Err(e)) => {
                    warn!("Error processing {}: {}", reference, e);
                    self.record(Diagnostic::from_error(&reference, &e));
                    return BTreeSet::new();
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    warn!("Unexpected failure processing {}: {}", reference, message);
                    self.record(Diagnostic::new(&reference, DiagnosticKind::Internal, message));
                    return BTreeSet::new();
                }
            };

            match node {
                SitemapNode::Index { children } => {
                    self.indexes.fetch_add(1, Ordering::Relaxed);
                    debug!("{} is an index of {} sitemap(s)", reference, children.len());
                    let ancestor = Arc::new(Ancestor {
                        url: reference,
                        depth,
                        parent,
                    });
                    self.resolve_many(children, Some(ancestor)).await
                }
                SitemapNode::Leaf { url } => BTreeSet::from([url]),
                SitemapNode::Unrecognized => {
                    self.unrecognized.fetch_add(1, Ordering::Relaxed);
                    debug!("{} is neither a sitemap index nor a urlset", reference);
                    BTreeSet::new()
                }
            }
        }
        .boxed()
    }

    async fn fetch_and_classify(&self, reference: &str) -> Result<SitemapNode> {
        validate_reference(reference)?;

        let body = {
            let _permit = self
                .semaphore
                .acquire()
                .await
                .map_err(|e| ScanError::Other(format!("Fetch pool closed: {}", e)))?;

            if let Some(ref callback) = self.progress_callback {
                callback(reference.to_string());
            }

            self.fetcher.fetch(reference).await?
        };
        self.fetched.fetch_add(1, Ordering::Relaxed);

        self.classifier.classify(reference, &body)
    }
}

impl Resolver {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        let config = ResolverConfig::default();
        Self {
            fetcher,
            classifier: Arc::new(XmlClassifier),
            semaphore: Arc::new(Semaphore::new(config.concurrency)),
            concurrency: config.concurrency,
            max_depth: config.max_depth,
            progress_callback: None,
        }
    }

    /// Build a resolver that fetches over HTTP with the given settings.
    pub fn from_config(config: &ResolverConfig) -> Result<Self> {
        let fetcher = HttpFetcher::with_timeout(config.timeout_secs, &config.user_agent)?;
        Ok(Self::new(Arc::new(fetcher))
            .with_concurrency(config.concurrency)
            .with_max_depth(config.max_depth))
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn DocumentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        self.semaphore = Arc::new(Semaphore::new(concurrency));
        self.concurrency = concurrency;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Resolve `references` into the urlset documents reachable from them.
    ///
    /// Duplicate references are each fetched; a leaf reached more than once
    /// appears once in the result.
    pub async fn resolve(&self, references: &[String]) -> ResolutionResult {
        if references.is_empty() {
            return ResolutionResult::new();
        }

        info!("Resolving {} sitemap reference(s)", references.len());
        let start = Instant::now();

        let walk = Arc::new(Walk::new(self));
        let leaves = walk.resolve_many(references.to_vec(), None).await;
        let (diagnostics, stats) = walk.take_parts();

        let result = ResolutionResult {
            leaves,
            diagnostics,
            stats,
            elapsed: start.elapsed(),
        };

        info!(
            "Resolution complete. {} leaves, {} documents fetched, {} failures in {:?}",
            result.leaves.len(),
            result.stats.fetched,
            result.stats.failed,
            result.elapsed
        );
        result
    }

    /// Like [`Resolver::resolve`], but gives up once `deadline` has elapsed.
    ///
    /// In-flight fetches are dropped when the deadline passes and no partial
    /// result is returned.
    pub async fn resolve_with_deadline(
        &self,
        references: &[String],
        deadline: Duration,
    ) -> Result<ResolutionResult> {
        tokio::time::timeout(deadline, self.resolve(references))
            .await
            .map_err(|_| {
                warn!("Resolution exceeded deadline of {:?}", deadline);
                ScanError::DeadlineExceeded(deadline.as_secs())
            })
    }
}

/// Check that a reference is an absolute http(s) URL before it is fetched.
pub fn validate_reference(reference: &str) -> Result<()> {
    let parsed = Url::parse(reference)
        .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", reference, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ScanError::InvalidUrl(format!(
            "{}: unsupported scheme '{}'",
            reference, scheme
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panic: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panic: {}", message)
    } else {
        "panic with non-string payload".to_string()
    }
}
