use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Failed to fetch {url}: {cause}")]
    Transport { url: String, cause: String },

    #[error("Malformed sitemap document: {0}")]
    MalformedDocument(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Resolution did not finish within {0} seconds")]
    DeadlineExceeded(u64),

    #[error("Other error: {0}")]
    Other(String),
}

impl ScanError {
    pub fn transport(url: &str, cause: impl std::fmt::Display) -> Self {
        ScanError::Transport {
            url: url.to_string(),
            cause: cause.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
