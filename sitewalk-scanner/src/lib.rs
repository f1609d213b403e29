pub mod classifier;
pub mod error;
pub mod fetcher;
pub mod resolver;
pub mod result;

pub use classifier::{DocumentClassifier, SitemapNode, XmlClassifier};
pub use error::ScanError;
pub use fetcher::{Fetcher, HttpFetcher};
pub use resolver::{ProgressCallback, Resolver, ResolverConfig};
pub use result::{Diagnostic, DiagnosticKind, ResolutionResult, ResolveStats};
