use super::fetcher::{DataFetcher, FetchResult, HttpFetcher};
use super::{offload, Config, PathResolver, Resolved};
use failure::{err_msg, Error};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// What to do for a requested logical path.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// The file is present in local storage; serve it directly.
    ServeLocal,
    /// The file is absent and offloading is disabled; redirect to the origin.
    RedirectRemote(String),
    /// The file is absent; fetch it once from the origin and persist it locally.
    FetchAndOffload {
        remote_url: String,
        local_path: PathBuf,
    },
}

/// Read-through access to public files which may only exist on a remote origin.
///
/// Local storage is checked first. A missing file is either answered with the
/// origin URL (so the caller can redirect) or, when offloading is enabled,
/// fetched once and persisted so the webserver serves it directly from then on.
pub struct StageCache<F: DataFetcher = HttpFetcher> {
    resolver: PathResolver,
    fetcher: F,
    offload: bool,
    in_flight: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl StageCache<HttpFetcher> {
    /// Constructs a StageCache instance using a given Config.
    pub fn with_config(config: Config) -> Result<Self, Error> {
        let fetcher = HttpFetcher::with_timeout(config.fetch_timeout())?;
        Self::with_fetcher(config, fetcher)
    }
}

impl<F: DataFetcher> StageCache<F> {
    /// Constructs a StageCache with an injected fetcher. Configuration is read
    /// once here; changes require constructing a new instance.
    pub fn with_fetcher(config: Config, fetcher: F) -> Result<Self, Error> {
        let remote_instance = config
            .remote_instance()
            .ok_or_else(|| err_msg("missing required config value: remote_instance"))?;
        let root = config
            .directory_path()
            .ok_or_else(|| err_msg("missing required config value: directory_path"))?;

        Ok(StageCache {
            resolver: PathResolver::new(root.to_path_buf(), remote_instance, config.base_url()),
            fetcher,
            offload: config.offload(),
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Picks the action for an already-resolved path. Pure: no I/O beyond the
    /// existence probe, no retries, nothing is cached.
    pub fn decide(&self, resolved: &Resolved) -> Action {
        if self.resolver.exists(&resolved.local_path) {
            return Action::ServeLocal;
        }
        if !self.offload {
            return Action::RedirectRemote(resolved.remote_url.clone());
        }
        Action::FetchAndOffload {
            remote_url: resolved.remote_url.clone(),
            local_path: resolved.local_path.clone(),
        }
    }

    /// Returns the URL a request for `logical` should be answered with: the
    /// local serving URL when the file is (or has just been made) available in
    /// local storage, the remote origin URL otherwise.
    pub fn resolve_external_url(&self, logical: &str) -> Result<String, Error> {
        let resolved = self.resolver.resolve(logical)?;
        match self.decide(&resolved) {
            Action::ServeLocal => Ok(self.resolver.local_url(logical)?),
            Action::RedirectRemote(remote_url) => Ok(remote_url),
            Action::FetchAndOffload {
                remote_url,
                local_path,
            } => {
                if self.ensure_local(&remote_url, &local_path) {
                    Ok(self.resolver.local_url(logical)?)
                } else {
                    // Could not offload; let the origin answer this request.
                    Ok(remote_url)
                }
            }
        }
    }

    /// Opens the file for reading, fetching it from the origin first when it is
    /// missing and the offload policy permits.
    pub fn open_for_read(&self, logical: &str) -> Result<fs::File, Error> {
        let resolved = self.resolver.resolve(logical)?;
        match self.decide(&resolved) {
            Action::ServeLocal => Ok(fs::File::open(&resolved.local_path)?),
            Action::RedirectRemote(_) => Err(err_msg(format!(
                "{:?} is not available locally and offloading is disabled",
                logical
            ))),
            Action::FetchAndOffload {
                remote_url,
                local_path,
            } => {
                if self.ensure_local(&remote_url, &local_path) {
                    Ok(fs::File::open(&local_path)?)
                } else {
                    Err(err_msg(format!(
                        "{:?} could not be offloaded from {}",
                        logical, remote_url
                    )))
                }
            }
        }
    }

    /// Fetches the file from the origin and persists it at `local_path`.
    /// Returns whether the file is present in local storage afterwards.
    ///
    /// Concurrent calls for the same path serialize on a per-path gate and
    /// re-check existence after acquiring it, so only one of them performs the
    /// fetch. Fetch and write failures are demoted to a miss: the caller falls
    /// back to the remote URL and a later request tries again.
    fn ensure_local(&self, remote_url: &str, local_path: &Path) -> bool {
        let gate = {
            let mut in_flight = self.in_flight.lock().unwrap();
            in_flight
                .entry(local_path.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let present = {
            let _guard = gate.lock().unwrap();

            if self.resolver.exists(local_path) {
                // Another caller offloaded it while we waited on the gate.
                true
            } else {
                self.fetch_and_offload(remote_url, local_path)
            }
        };

        self.release(local_path, gate);
        present
    }

    fn fetch_and_offload(&self, remote_url: &str, local_path: &Path) -> bool {
        let data = match self.fetcher.fetch(remote_url) {
            Ok(FetchResult::Found(data)) => data,
            Ok(FetchResult::NotFound) => {
                debug!("{} does not exist on the remote origin", remote_url);
                return false;
            }
            Err(e) => {
                warn!("{}", e);
                return false;
            }
        };

        match offload::offload(local_path, &data) {
            Ok(()) => true,
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    /// Drops the in-flight entry once no other caller holds it.
    fn release(&self, local_path: &Path, gate: Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().unwrap();
        drop(gate);
        if let Some(entry) = in_flight.get(local_path) {
            if Arc::strong_count(entry) == 1 {
                in_flight.remove(local_path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::fetcher::{FetchError, InMemoryFetcher};
    use super::*;

    /// A fetcher whose origin is unreachable: every fetch dies in transport.
    struct FailingFetcher;

    impl DataFetcher for FailingFetcher {
        fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
            Err(FetchError::new(url, "connection reset by peer".to_string()))
        }
    }

    fn config(root: &Path, offload: bool) -> Config {
        Config {
            remote_instance: Some("https://prod.example.com".to_string()),
            offload: Some(offload),
            directory_path: Some(root.to_path_buf()),
            ..Config::default()
        }
    }

    fn remote_url(root: &Path, logical: &str) -> String {
        format!(
            "https://prod.example.com{}/{}",
            root.to_string_lossy(),
            logical
        )
    }

    #[test]
    fn existing_file_is_served_locally_regardless_of_offload_flag() {
        for offload in &[false, true] {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("present.txt"), b"data").unwrap();

            let cache =
                StageCache::with_fetcher(config(dir.path(), *offload), InMemoryFetcher::new())
                    .unwrap();
            let resolved = cache.resolver().resolve("present.txt").unwrap();

            assert_eq!(cache.decide(&resolved), Action::ServeLocal);
            assert_eq!(
                cache.resolve_external_url("present.txt").unwrap(),
                "/files/present.txt"
            );
        }
    }

    #[test]
    fn missing_file_without_offload_redirects_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = InMemoryFetcher::new();
        fetcher.insert(&remote_url(dir.path(), "img.png"), b"bytes");

        let cache = StageCache::with_fetcher(config(dir.path(), false), fetcher).unwrap();
        let resolved = cache.resolver().resolve("img.png").unwrap();

        assert_eq!(
            cache.decide(&resolved),
            Action::RedirectRemote(resolved.remote_url.clone())
        );
        assert_eq!(
            cache.resolve_external_url("img.png").unwrap(),
            resolved.remote_url
        );
        assert!(!dir.path().join("img.png").exists());
    }

    #[test]
    fn missing_file_with_offload_is_fetched_once_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let logical = "sites/default/files/img.png";
        let mut fetcher = InMemoryFetcher::new();
        fetcher.insert(&remote_url(dir.path(), logical), b"image bytes");

        let cache = StageCache::with_fetcher(config(dir.path(), true), fetcher).unwrap();

        assert_eq!(
            cache.resolve_external_url(logical).unwrap(),
            "/files/sites/default/files/img.png"
        );
        assert_eq!(
            std::fs::read(dir.path().join(logical)).unwrap(),
            b"image bytes"
        );

        // The next decision for the same path serves the local copy.
        let resolved = cache.resolver().resolve(logical).unwrap();
        assert_eq!(cache.decide(&resolved), Action::ServeLocal);
    }

    #[test]
    fn remote_miss_falls_back_to_the_remote_url() {
        let dir = tempfile::tempdir().unwrap();
        let cache =
            StageCache::with_fetcher(config(dir.path(), true), InMemoryFetcher::new()).unwrap();
        let resolved = cache.resolver().resolve("gone.png").unwrap();

        assert_eq!(
            cache.resolve_external_url("gone.png").unwrap(),
            resolved.remote_url
        );
        assert!(!dir.path().join("gone.png").exists());
    }

    #[test]
    fn fetch_errors_fall_back_to_the_remote_url() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StageCache::with_fetcher(config(dir.path(), true), FailingFetcher).unwrap();
        let resolved = cache.resolver().resolve("img.png").unwrap();

        assert_eq!(
            cache.resolve_external_url("img.png").unwrap(),
            resolved.remote_url
        );
        assert!(!dir.path().join("img.png").exists());
        assert!(cache.open_for_read("img.png").is_err());
    }

    #[test]
    fn write_failures_fall_back_to_the_remote_url() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the parent directory should go makes the offload fail.
        std::fs::write(dir.path().join("sites"), b"in the way").unwrap();

        let logical = "sites/img.png";
        let mut fetcher = InMemoryFetcher::new();
        fetcher.insert(&remote_url(dir.path(), logical), b"bytes");
        let cache = StageCache::with_fetcher(config(dir.path(), true), fetcher).unwrap();
        let resolved = cache.resolver().resolve(logical).unwrap();

        assert_eq!(
            cache.resolve_external_url(logical).unwrap(),
            resolved.remote_url
        );
        assert_eq!(cache.fetcher().fetch_count(), 1);
        assert!(!dir.path().join(logical).exists());
    }

    #[test]
    fn open_for_read_fetches_when_permitted() {
        use std::io::Read;

        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = InMemoryFetcher::new();
        fetcher.insert(&remote_url(dir.path(), "doc.pdf"), b"pdf bytes");

        let cache = StageCache::with_fetcher(config(dir.path(), true), fetcher).unwrap();

        let mut contents = Vec::new();
        cache
            .open_for_read("doc.pdf")
            .unwrap()
            .read_to_end(&mut contents)
            .unwrap();
        assert_eq!(contents, b"pdf bytes");
    }

    #[test]
    fn open_for_read_fails_when_offload_is_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let cache =
            StageCache::with_fetcher(config(dir.path(), false), InMemoryFetcher::new()).unwrap();

        assert!(cache.open_for_read("missing.txt").is_err());
        assert!(!dir.path().join("missing.txt").exists());
    }

    #[test]
    fn traversal_paths_are_rejected_before_any_io() {
        let dir = tempfile::tempdir().unwrap();
        let cache =
            StageCache::with_fetcher(config(dir.path(), true), InMemoryFetcher::new()).unwrap();

        let err = cache.resolve_external_url("../../etc/passwd").unwrap_err();
        assert!(err.downcast_ref::<super::super::InvalidPathError>().is_some());
        assert_eq!(cache.fetcher.fetch_count(), 0);
    }

    #[test]
    fn missing_remote_instance_fails_construction() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), true);
        config.remote_instance = None;

        assert!(StageCache::with_fetcher(config, InMemoryFetcher::new()).is_err());
    }

    #[test]
    fn concurrent_requests_for_one_path_fetch_once() {
        let dir = tempfile::tempdir().unwrap();
        let logical = "big/asset.bin";
        let mut fetcher = InMemoryFetcher::new();
        fetcher.insert(&remote_url(dir.path(), logical), &[42u8; 4096]);

        let cache =
            Arc::new(StageCache::with_fetcher(config(dir.path(), true), fetcher).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.resolve_external_url(logical).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), "/files/big/asset.bin");
        }

        assert_eq!(cache.fetcher.fetch_count(), 1);
        assert_eq!(std::fs::read(dir.path().join(logical)).unwrap(), [42u8; 4096]);
        assert!(cache.in_flight.lock().unwrap().is_empty());
    }
}
