mod config;
pub mod fetcher;
mod offload;
mod resolver;
mod stream;

pub use self::config::Config;
pub use self::offload::WriteError;
pub use self::resolver::{InvalidPathError, PathResolver, Resolved};
pub use self::stream::{Action, StageCache};
