use super::{DataFetcher, FetchError, FetchResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Serves fetches out of a URL → bytes map. Used in tests as a stand-in for a
/// remote origin; counts how many fetches were actually performed.
#[derive(Default)]
pub struct InMemoryFetcher {
    data: HashMap<String, Vec<u8>>,
    fetch_count: AtomicUsize,
}

impl InMemoryFetcher {
    pub fn new() -> Self {
        InMemoryFetcher::default()
    }

    pub fn insert(&mut self, url: &str, data: &[u8]) {
        self.data.insert(url.to_string(), data.to_vec());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

impl DataFetcher for InMemoryFetcher {
    fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        match self.data.get(url) {
            Some(data) => Ok(FetchResult::Found(data.clone())),
            None => Ok(FetchResult::NotFound),
        }
    }
}
