mod data_fetcher;
mod http_fetcher;
mod in_memory_fetcher;

pub use self::data_fetcher::{DataFetcher, FetchError, FetchResult};
pub use self::http_fetcher::HttpFetcher;
pub use self::in_memory_fetcher::InMemoryFetcher;
