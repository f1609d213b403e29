// Tests for the sitemap resolver against an in-memory fetcher

use async_trait::async_trait;
use sitewalk_scanner::classifier::{DocumentClassifier, SitemapNode};
use sitewalk_scanner::error::{Result, ScanError};
use sitewalk_scanner::{DiagnosticKind, Fetcher, Resolver};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
enum Reply {
    Body(String),
    Fail,
    Panic,
}

/// Serves canned documents, optionally after a delay, and counts fetches.
#[derive(Default)]
struct MockFetcher {
    replies: HashMap<String, Reply>,
    delay: Option<Duration>,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockFetcher {
    fn new() -> Self {
        Self::default()
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn leaf(mut self, url: &str) -> Self {
        self.replies
            .insert(url.to_string(), Reply::Body("<urlset/>".to_string()));
        self
    }

    fn index(mut self, url: &str, children: &[&str]) -> Self {
        let mut xml = String::from(
            r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#,
        );
        for child in children {
            xml.push_str(&format!("<sitemap><loc>{}</loc></sitemap>", child));
        }
        xml.push_str("</sitemapindex>");
        self.replies.insert(url.to_string(), Reply::Body(xml));
        self
    }

    fn body(mut self, url: &str, body: &str) -> Self {
        self.replies
            .insert(url.to_string(), Reply::Body(body.to_string()));
        self
    }

    fn failing(mut self, url: &str) -> Self {
        self.replies.insert(url.to_string(), Reply::Fail);
        self
    }

    fn panicking(mut self, url: &str) -> Self {
        self.replies.insert(url.to_string(), Reply::Panic);
        self
    }

    fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert(0) += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.replies.get(url).cloned() {
            Some(Reply::Body(body)) => Ok(body.into_bytes()),
            Some(Reply::Fail) => Err(ScanError::transport(url, "connection refused")),
            Some(Reply::Panic) => panic!("fetcher blew up on {}", url),
            None => Err(ScanError::transport(url, "HTTP 404 Not Found")),
        }
    }
}

fn refs(urls: &[&str]) -> Vec<String> {
    urls.iter().map(|u| u.to_string()).collect()
}

fn set(urls: &[&str]) -> BTreeSet<String> {
    urls.iter().map(|u| u.to_string()).collect()
}

const A: &str = "https://example.com/a.xml";
const B: &str = "https://example.com/b.xml";
const C1: &str = "https://example.com/c1.xml";
const C2: &str = "https://example.com/c2.xml";
const C3: &str = "https://example.com/c3.xml";
const INDEX: &str = "https://example.com/sitemap_index.xml";
const BAD: &str = "https://down.example.com/sitemap.xml";

// ============================================================================
// Basic shapes
// ============================================================================

#[tokio::test]
async fn test_resolve_empty_input_returns_empty_set() {
    let fetcher = Arc::new(MockFetcher::new());
    let resolver = Resolver::new(fetcher.clone());

    let result = resolver.resolve(&[]).await;

    assert!(result.leaves.is_empty());
    assert!(result.diagnostics.is_empty());
    assert_eq!(fetcher.total_calls(), 0);
}

#[tokio::test]
async fn test_resolve_single_leaf_returns_itself() {
    let fetcher = Arc::new(MockFetcher::new().leaf(A));
    let resolver = Resolver::new(fetcher);

    let result = resolver.resolve(&refs(&[A])).await;

    assert_eq!(result.leaves, set(&[A]));
    assert_eq!(result.stats.fetched, 1);
}

#[tokio::test]
async fn test_resolve_expands_multiple_levels() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .index(INDEX, &[C1, C2])
            .leaf(C1)
            .index(C2, &[C3])
            .leaf(C3),
    );
    let resolver = Resolver::new(fetcher.clone());

    let result = resolver.resolve(&refs(&[INDEX])).await;

    assert_eq!(result.leaves, set(&[C1, C3]));
    assert_eq!(result.stats.indexes, 2);
    assert_eq!(result.stats.fetched, 4);
    assert!(result.diagnostics.is_empty());
}

#[tokio::test]
async fn test_resolve_leaf_is_the_urlset_address_not_its_entries() {
    let urlset = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
            <url><loc>https://example.com/page-1</loc></url>
            <url><loc>https://example.com/page-2</loc></url>
        </urlset>"#;
    let fetcher = Arc::new(MockFetcher::new().body(A, urlset));
    let resolver = Resolver::new(fetcher);

    let result = resolver.resolve(&refs(&[A])).await;

    assert_eq!(result.leaves, set(&[A]));
}

#[tokio::test]
async fn test_resolve_empty_index_contributes_nothing() {
    let fetcher = Arc::new(MockFetcher::new().index(INDEX, &[]));
    let resolver = Resolver::new(fetcher);

    let result = resolver.resolve(&refs(&[INDEX])).await;

    assert!(result.leaves.is_empty());
    assert!(result.diagnostics.is_empty());
    assert_eq!(result.stats.indexes, 1);
}

// ============================================================================
// Error isolation
// ============================================================================

#[tokio::test]
async fn test_transport_failure_contributes_nothing() {
    let fetcher = Arc::new(MockFetcher::new().failing(BAD));
    let resolver = Resolver::new(fetcher);

    let result = resolver.resolve(&refs(&[BAD])).await;

    assert!(result.leaves.is_empty());
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].kind, DiagnosticKind::Transport);
    assert_eq!(result.diagnostics[0].url, BAD);
}

#[tokio::test]
async fn test_transport_failure_does_not_affect_siblings() {
    let fetcher = Arc::new(MockFetcher::new().failing(BAD).leaf(A));
    let resolver = Resolver::new(fetcher);

    let result = resolver.resolve(&refs(&[BAD, A])).await;

    assert_eq!(result.leaves, set(&[A]));
    assert_eq!(result.stats.failed, 1);
}

#[tokio::test]
async fn test_failing_child_keeps_rest_of_subtree() {
    let fetcher = Arc::new(MockFetcher::new().index(INDEX, &[C1, BAD, C2]).leaf(C1).leaf(C2));
    let resolver = Resolver::new(fetcher);

    let result = resolver.resolve(&refs(&[INDEX])).await;

    assert_eq!(result.leaves, set(&[C1, C2]));
    assert_eq!(result.diagnostics_of(DiagnosticKind::Transport).len(), 1);
}

#[tokio::test]
async fn test_malformed_document_is_isolated() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .body(B, "<urlset><url></urlset>")
            .leaf(A),
    );
    let resolver = Resolver::new(fetcher);

    let result = resolver.resolve(&refs(&[B, A])).await;

    assert_eq!(result.leaves, set(&[A]));
    let malformed = result.diagnostics_of(DiagnosticKind::MalformedDocument);
    assert_eq!(malformed.len(), 1);
    assert_eq!(malformed[0].url, B);
}

#[tokio::test]
async fn test_unrecognized_root_is_not_a_failure() {
    let fetcher = Arc::new(MockFetcher::new().body(B, "<foo><bar/></foo>").leaf(A));
    let resolver = Resolver::new(fetcher);

    let result = resolver.resolve(&refs(&[B, A])).await;

    assert_eq!(result.leaves, set(&[A]));
    assert!(result.diagnostics.is_empty());
    assert_eq!(result.stats.unrecognized, 1);
    assert_eq!(result.stats.failed, 0);
}

#[tokio::test]
async fn test_panicking_fetcher_is_contained() {
    let fetcher = Arc::new(MockFetcher::new().panicking(B).leaf(A));
    let resolver = Resolver::new(fetcher);

    let result = resolver.resolve(&refs(&[B, A])).await;

    assert_eq!(result.leaves, set(&[A]));
    let internal = result.diagnostics_of(DiagnosticKind::Internal);
    assert_eq!(internal.len(), 1);
    assert!(internal[0].message.contains("fetcher blew up"));
}

struct ExplodingClassifier;

impl DocumentClassifier for ExplodingClassifier {
    fn classify(&self, reference: &str, _bytes: &[u8]) -> Result<SitemapNode> {
        if reference == B {
            panic!("classifier bug");
        }
        Ok(SitemapNode::Leaf {
            url: reference.to_string(),
        })
    }
}

#[tokio::test]
async fn test_panicking_classifier_is_contained() {
    let fetcher = Arc::new(MockFetcher::new().leaf(A).leaf(B));
    let resolver = Resolver::new(fetcher).with_classifier(Arc::new(ExplodingClassifier));

    let result = resolver.resolve(&refs(&[A, B])).await;

    assert_eq!(result.leaves, set(&[A]));
    assert_eq!(result.diagnostics_of(DiagnosticKind::Internal).len(), 1);
}

#[tokio::test]
async fn test_invalid_url_is_not_fetched() {
    let fetcher = Arc::new(MockFetcher::new().leaf(A));
    let resolver = Resolver::new(fetcher.clone());

    let result = resolver.resolve(&refs(&["not a url", A])).await;

    assert_eq!(result.leaves, set(&[A]));
    assert_eq!(result.diagnostics_of(DiagnosticKind::InvalidUrl).len(), 1);
    assert_eq!(fetcher.calls_to("not a url"), 0);
}

#[tokio::test]
async fn test_blank_reference_is_isolated() {
    let fetcher = Arc::new(MockFetcher::new().leaf(A));
    let resolver = Resolver::new(fetcher.clone());

    let result = resolver.resolve(&refs(&["", A])).await;

    assert_eq!(result.leaves, set(&[A]));
    let invalid = result.diagnostics_of(DiagnosticKind::InvalidUrl);
    assert_eq!(invalid.len(), 1);
    assert_eq!(invalid[0].url, "");
    assert_eq!(fetcher.total_calls(), 1);
}

#[tokio::test]
async fn test_every_reference_failing_still_returns_result() {
    let fetcher = Arc::new(MockFetcher::new().failing(A).failing(B));
    let resolver = Resolver::new(fetcher);

    let result = resolver.resolve(&refs(&[A, B])).await;

    assert!(result.leaves.is_empty());
    assert_eq!(result.diagnostics.len(), 2);
}

// ============================================================================
// Cycles, depth and duplicates
// ============================================================================

#[tokio::test]
async fn test_mutual_index_cycle_terminates() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .index(A, &[B, C1])
            .index(B, &[A])
            .leaf(C1),
    );
    let resolver = Resolver::new(fetcher.clone());

    let result = resolver.resolve(&refs(&[A])).await;

    assert_eq!(result.leaves, set(&[C1]));
    let cycles = result.diagnostics_of(DiagnosticKind::Cycle);
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].url, A);
    assert_eq!(fetcher.calls_to(A), 1);
}

#[tokio::test]
async fn test_same_child_in_sibling_branches_is_not_a_cycle() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .index(INDEX, &[A, B])
            .index(A, &[C1])
            .index(B, &[C1])
            .leaf(C1),
    );
    let resolver = Resolver::new(fetcher.clone());

    let result = resolver.resolve(&refs(&[INDEX])).await;

    assert_eq!(result.leaves, set(&[C1]));
    assert!(result.diagnostics.is_empty());
    assert_eq!(fetcher.calls_to(C1), 2);
}

#[tokio::test]
async fn test_max_depth_stops_deep_chains() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .index(INDEX, &[A])
            .index(A, &[B])
            .index(B, &[C1])
            .leaf(C1),
    );
    let resolver = Resolver::new(fetcher.clone()).with_max_depth(2);

    let result = resolver.resolve(&refs(&[INDEX])).await;

    assert!(result.leaves.is_empty());
    let limited = result.diagnostics_of(DiagnosticKind::DepthLimit);
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].url, C1);
    assert_eq!(fetcher.calls_to(C1), 0);
}

#[tokio::test]
async fn test_duplicate_input_is_fetched_twice_but_reported_once() {
    let fetcher = Arc::new(MockFetcher::new().leaf(A));
    let resolver = Resolver::new(fetcher.clone());

    let result = resolver.resolve(&refs(&[A, A])).await;

    assert_eq!(result.leaves, set(&[A]));
    assert_eq!(fetcher.calls_to(A), 2);
    assert_eq!(result.stats.fetched, 2);
}

#[tokio::test]
async fn test_resolve_is_idempotent() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .index(INDEX, &[C1, C2, BAD])
            .leaf(C1)
            .index(C2, &[C3])
            .leaf(C3),
    );
    let resolver = Resolver::new(fetcher);

    let first = resolver.resolve(&refs(&[INDEX, A])).await;
    let second = resolver.resolve(&refs(&[INDEX, A])).await;

    assert_eq!(first.leaves, second.leaves);
    assert_eq!(first.leaves, set(&[C1, C3]));
    assert_eq!(first.diagnostics.len(), second.diagnostics.len());
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_siblings_are_fetched_concurrently() {
    let urls: Vec<String> = (0..10)
        .map(|i| format!("https://example.com/part-{}.xml", i))
        .collect();
    let mut fetcher = MockFetcher::new().with_delay(Duration::from_millis(100));
    for url in &urls {
        fetcher = fetcher.leaf(url);
    }
    let resolver = Resolver::new(Arc::new(fetcher));

    let start = tokio::time::Instant::now();
    let result = resolver.resolve(&urls).await;
    let elapsed = start.elapsed();

    assert_eq!(result.leaves.len(), 10);
    assert!(
        elapsed < Duration::from_millis(200),
        "10 x 100ms siblings took {:?}, expected close to a single fetch",
        elapsed
    );
}

#[tokio::test(start_paused = true)]
async fn test_nested_levels_fan_out_concurrently() {
    // Two levels of five children each: 1 + 5 + 25 fetches, three round trips
    let mut fetcher = MockFetcher::new().with_delay(Duration::from_millis(100));
    let mut mid = Vec::new();
    for i in 0..5 {
        let index = format!("https://example.com/index-{}.xml", i);
        let mut leaves = Vec::new();
        for j in 0..5 {
            let leaf = format!("https://example.com/leaf-{}-{}.xml", i, j);
            fetcher = fetcher.leaf(&leaf);
            leaves.push(leaf);
        }
        let children: Vec<&str> = leaves.iter().map(String::as_str).collect();
        fetcher = fetcher.index(&index, &children);
        mid.push(index);
    }
    let mid_refs: Vec<&str> = mid.iter().map(String::as_str).collect();
    fetcher = fetcher.index(INDEX, &mid_refs);
    let resolver = Resolver::new(Arc::new(fetcher));

    let start = tokio::time::Instant::now();
    let result = resolver.resolve(&refs(&[INDEX])).await;
    let elapsed = start.elapsed();

    assert_eq!(result.leaves.len(), 25);
    assert!(
        elapsed < Duration::from_millis(400),
        "three levels took {:?}, expected about three round trips",
        elapsed
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_limit_caps_in_flight_fetches() {
    let urls: Vec<String> = (0..6)
        .map(|i| format!("https://example.com/part-{}.xml", i))
        .collect();
    let mut fetcher = MockFetcher::new().with_delay(Duration::from_millis(100));
    for url in &urls {
        fetcher = fetcher.leaf(url);
    }
    let fetcher = Arc::new(fetcher);
    let resolver = Resolver::new(fetcher.clone()).with_concurrency(2);

    let start = tokio::time::Instant::now();
    let result = resolver.resolve(&urls).await;
    let elapsed = start.elapsed();

    assert_eq!(result.leaves.len(), 6);
    assert_eq!(fetcher.max_in_flight.load(Ordering::SeqCst), 2);
    assert!(elapsed >= Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_deep_tree_with_single_permit_does_not_deadlock() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .with_delay(Duration::from_millis(10))
            .index(INDEX, &[A, B])
            .index(A, &[C1, C2])
            .index(B, &[C3])
            .leaf(C1)
            .leaf(C2)
            .leaf(C3),
    );
    let resolver = Resolver::new(fetcher).with_concurrency(1);

    let result = resolver.resolve(&refs(&[INDEX])).await;

    assert_eq!(result.leaves, set(&[C1, C2, C3]));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_exceeded_is_reported() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .with_delay(Duration::from_secs(30))
            .leaf(A),
    );
    let resolver = Resolver::new(fetcher);

    let result = resolver
        .resolve_with_deadline(&refs(&[A]), Duration::from_secs(5))
        .await;

    assert!(matches!(result, Err(ScanError::DeadlineExceeded(5))));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_stops_work_below_the_root() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .with_delay(Duration::from_secs(30))
            .index(INDEX, &[C1])
            .leaf(C1),
    );
    let resolver = Resolver::new(fetcher.clone());

    let result = resolver
        .resolve_with_deadline(&refs(&[INDEX]), Duration::from_secs(5))
        .await;
    assert!(matches!(result, Err(ScanError::DeadlineExceeded(5))));

    // Long after the index fetch would have finished, its child was never requested
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(fetcher.calls_to(INDEX), 1);
    assert_eq!(fetcher.calls_to(C1), 0);
}

/// Spends its time on the calling thread, like parsing a very large urlset.
struct BusyClassifier {
    work: Duration,
}

impl DocumentClassifier for BusyClassifier {
    fn classify(&self, reference: &str, _bytes: &[u8]) -> Result<SitemapNode> {
        std::thread::sleep(self.work);
        Ok(SitemapNode::Leaf {
            url: reference.to_string(),
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_classification_runs_in_parallel_across_workers() {
    let urls: Vec<String> = (0..8)
        .map(|i| format!("https://example.com/large-{}.xml", i))
        .collect();
    let mut fetcher = MockFetcher::new();
    for url in &urls {
        fetcher = fetcher.leaf(url);
    }
    let resolver = Resolver::new(Arc::new(fetcher)).with_classifier(Arc::new(BusyClassifier {
        work: Duration::from_millis(200),
    }));

    let start = std::time::Instant::now();
    let result = resolver.resolve(&urls).await;
    let elapsed = start.elapsed();

    assert_eq!(result.leaves.len(), 8);
    assert!(
        elapsed < Duration::from_millis(800),
        "8 x 200ms classifications took {:?} on 8 workers, expected them to overlap",
        elapsed
    );
}

#[tokio::test]
async fn test_progress_callback_sees_every_fetch() {
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();

    let fetcher = Arc::new(MockFetcher::new().index(INDEX, &[C1, C2]).leaf(C1).leaf(C2));
    let resolver = Resolver::new(fetcher).with_progress_callback(Arc::new(move |url| {
        seen_clone.lock().unwrap().push(url);
    }));

    resolver.resolve(&refs(&[INDEX])).await;

    let mut seen = seen.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, vec![C1.to_string(), C2.to_string(), INDEX.to_string()]);
}
