use failure::Fail;

/// A fetch that reached the origin: either the file's bytes or a clean miss.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    Found(Vec<u8>),
    NotFound,
}

/// A fetch that failed before producing an answer (transport error, timeout,
/// unexpected HTTP status). Callers treat this the same as a miss but get the
/// chance to log it.
#[derive(Debug, Fail)]
#[fail(display = "failed to fetch {}: {}", url, reason)]
pub struct FetchError {
    pub url: String,
    pub reason: String,
}

impl FetchError {
    pub fn new(url: &str, reason: String) -> Self {
        FetchError {
            url: url.to_string(),
            reason,
        }
    }
}

/// Retrieves file bytes from a remote origin. A single call performs a single
/// blocking read; there are no retries.
pub trait DataFetcher {
    fn fetch(&self, url: &str) -> Result<FetchResult, FetchError>;
}
