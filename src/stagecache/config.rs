use failure::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Provides the properties of the fetcher that can be configured. Includes sensible
/// defaults for the absent values. Configuration is read once at construction;
/// changing it requires building a new `StageCache`.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Config {
    pub remote_instance: Option<String>,
    pub offload: Option<bool>,
    pub directory_path: Option<PathBuf>,
    pub base_url: Option<String>,
    pub fetch_timeout_seconds: Option<u64>,
    pub debug: Option<bool>,
}

impl Config {
    /// Reads a configuration file (TOML, INI, ...) from disk.
    pub fn from_file(path: &Path) -> Result<Config, Error> {
        let mut settings = config::Config::default();
        settings.merge(config::File::from(path))?;
        let config = settings.try_into::<Config>()?;
        Ok(config)
    }

    /// The base URL of the remote origin that missing public files are loaded from,
    /// usually the production instance. Required.
    pub fn remote_instance(&self) -> Option<&str> {
        self.remote_instance.as_deref()
    }

    /// Whether missing files are copied ("offloaded") into local storage so that the
    /// webserver can serve them directly afterwards. When false, requests for missing
    /// files are answered with a redirect to the remote origin instead.
    pub fn offload(&self) -> bool {
        self.offload.unwrap_or(false)
    }

    /// The local public-file storage root. Required.
    pub fn directory_path(&self) -> Option<&Path> {
        self.directory_path.as_deref()
    }

    /// The URL prefix under which files in local storage are served.
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or("/files")
    }

    /// How long a single outbound fetch may take before it is abandoned.
    /// There are no retries; a timed-out fetch is treated as a miss.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds.unwrap_or(30))
    }

    /// Whether to show additional logging info.
    pub fn debug(&self) -> bool {
        self.debug.unwrap_or(false)
    }
}
