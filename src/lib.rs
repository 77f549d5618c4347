#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

mod stagecache;

pub use crate::stagecache::fetcher::{
    DataFetcher, FetchError, FetchResult, HttpFetcher, InMemoryFetcher,
};
pub use crate::stagecache::{
    Action, Config, InvalidPathError, PathResolver, Resolved, StageCache, WriteError,
};
