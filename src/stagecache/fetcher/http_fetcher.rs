use super::{DataFetcher, FetchError, FetchResult};
use failure::Error;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::time::Duration;

/// Fetches files from the remote origin with a plain blocking GET.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Builds a fetcher whose requests are abandoned after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpFetcher { client })
    }
}

impl DataFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::new(url, e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(FetchResult::NotFound);
        }
        if !status.is_success() {
            return Err(FetchError::new(url, format!("unexpected status {}", status)));
        }

        let bytes = response
            .bytes()
            .map_err(|e| FetchError::new(url, e.to_string()))?;
        Ok(FetchResult::Found(bytes.to_vec()))
    }
}
