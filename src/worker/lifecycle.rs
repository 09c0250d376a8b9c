//! Worker lifecycle: install, activate, then answer fetches.

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use reqwest::Method;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::WorkerConfig;
use crate::error::WorkerError;

use super::network::Network;
use super::request::{Request, RequestKey, Response};
use super::storage::CacheStorage;

/// Lifecycle phase of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Parsed,
  Installing,
  Installed,
  Activating,
  Activated,
  /// Install failed; this worker will never control anything
  Redundant,
}

impl WorkerState {
  fn as_str(self) -> &'static str {
    match self {
      Self::Parsed => "parsed",
      Self::Installing => "installing",
      Self::Installed => "installed",
      Self::Activating => "activating",
      Self::Activated => "activated",
      Self::Redundant => "redundant",
    }
  }
}

impl fmt::Display for WorkerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Stored in the bucket at install time
  Cache,
  /// Cache miss, forwarded to the network
  Network,
  /// Worker not in control yet, request went straight to the network
  Uncontrolled,
}

/// Response handed back by [`OfflineWorker::fetch`].
#[derive(Debug, Clone)]
pub struct FetchResult {
  pub response: Response,
  pub source: ResponseSource,
  /// When the response was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl FetchResult {
  fn from_cache(response: Response, cached_at: DateTime<Utc>) -> Self {
    Self {
      response,
      source: ResponseSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  fn from_network(response: Response, source: ResponseSource) -> Self {
    Self {
      response,
      source,
      cached_at: None,
    }
  }
}

/// Cache-first request handler backed by a single bucket.
///
/// The bucket is filled once from the manifest during [`install`](Self::install)
/// and never written to afterwards. Lookups ignore query strings.
pub struct OfflineWorker<S: CacheStorage, N: Network> {
  storage: Arc<S>,
  network: N,
  /// Bucket this worker reads from
  bucket: String,
  /// Unversioned bucket name, recorded with every bucket this worker opens
  cache_name: String,
  origin: Url,
  manifest: Vec<String>,
  evict_stale_buckets: bool,
  state: WorkerState,
  skip_waiting: bool,
  clients_claimed: bool,
}

impl<S: CacheStorage, N: Network> OfflineWorker<S, N> {
  pub fn new(config: &WorkerConfig, storage: Arc<S>, network: N) -> Result<Self, WorkerError> {
    let origin = Url::parse(&config.origin).map_err(|source| WorkerError::InvalidUrl {
      input: config.origin.clone(),
      source,
    })?;

    Ok(Self {
      storage,
      network,
      bucket: config.bucket_name(),
      cache_name: config.cache_name.clone(),
      origin,
      manifest: config.manifest.clone(),
      evict_stale_buckets: config.evict_stale_buckets,
      state: WorkerState::Parsed,
      skip_waiting: false,
      clients_claimed: false,
    })
  }

  pub fn state(&self) -> WorkerState {
    self.state
  }

  pub fn bucket(&self) -> &str {
    &self.bucket
  }

  pub fn controls_clients(&self) -> bool {
    self.state == WorkerState::Activated && self.clients_claimed
  }

  /// Resolve a path or absolute URL against the worker origin.
  pub fn resolve(&self, target: &str) -> Result<Url, WorkerError> {
    self
      .origin
      .join(target)
      .map_err(|source| WorkerError::InvalidUrl {
        input: target.to_string(),
        source,
      })
  }

  /// Pick up a bucket filled by a previous run.
  ///
  /// Returns true, and moves to `Installed`, when every manifest entry is
  /// already stored.
  pub fn restore(&mut self) -> Result<bool, WorkerError> {
    self.expect_state(WorkerState::Parsed, "restore")?;

    if !self.storage.has_bucket(&self.bucket).map_err(WorkerError::storage)? {
      return Ok(false);
    }

    for path in &self.manifest {
      let key = RequestKey::from_url(&self.resolve(path)?);
      if self
        .storage
        .match_request(&self.bucket, &key)
        .map_err(WorkerError::storage)?
        .is_none()
      {
        debug!(bucket = %self.bucket, path = %path, "bucket incomplete, install needed");
        return Ok(false);
      }
    }

    self.state = WorkerState::Installed;
    self.skip_waiting = true;
    debug!(bucket = %self.bucket, "restored installed worker");
    Ok(true)
  }

  /// Open the bucket and store every manifest entry.
  ///
  /// All entries are fetched before anything is written. A network error or
  /// a non-OK status on any of them fails the install and leaves the bucket
  /// without entries; the worker then becomes `Redundant`.
  pub async fn install(&mut self) -> Result<(), WorkerError> {
    self.expect_state(WorkerState::Parsed, "install")?;
    self.state = WorkerState::Installing;

    match self.populate().await {
      Ok(count) => {
        self.state = WorkerState::Installed;
        self.skip_waiting();
        info!(bucket = %self.bucket, entries = count, "worker installed");
        Ok(())
      }
      Err(e) => {
        self.state = WorkerState::Redundant;
        warn!(bucket = %self.bucket, error = %e, "worker install failed");
        Err(e)
      }
    }
  }

  async fn populate(&self) -> Result<usize, WorkerError> {
    self
      .storage
      .open_bucket(&self.bucket, &self.cache_name)
      .map_err(WorkerError::storage)?;

    let urls = self
      .manifest
      .iter()
      .map(|path| self.resolve(path))
      .collect::<Result<Vec<_>, _>>()?;

    let entries = try_join_all(urls.into_iter().map(|url| async move {
      let response = self.network.fetch(&Request::get(url.clone())).await?;
      if !response.is_ok() {
        return Err(WorkerError::Install {
          url,
          status: response.status,
        });
      }
      Ok::<_, WorkerError>((RequestKey::from_url(&url), response))
    }))
    .await?;

    self
      .storage
      .put_all(&self.bucket, &entries)
      .map_err(WorkerError::storage)?;

    Ok(entries.len())
  }

  /// Become active as soon as installed instead of waiting for older
  /// workers to release their clients.
  fn skip_waiting(&mut self) {
    self.skip_waiting = true;
  }

  /// Take control of every client and, when enabled, drop buckets left by
  /// other versions.
  pub fn activate(&mut self) -> Result<(), WorkerError> {
    self.expect_state(WorkerState::Installed, "activate")?;
    if !self.skip_waiting {
      return Err(WorkerError::InvalidState {
        action: "activate",
        state: "waiting",
      });
    }
    self.state = WorkerState::Activating;

    if self.evict_stale_buckets {
      if let Err(e) = self.evict_stale() {
        // Stay installed so activation can be retried
        self.state = WorkerState::Installed;
        return Err(e);
      }
    }

    self.clients_claimed = true;
    self.state = WorkerState::Activated;
    info!(bucket = %self.bucket, "worker activated");
    Ok(())
  }

  /// Only buckets opened under the same cache name are candidates; a bucket
  /// whose name merely shares the prefix belongs to someone else.
  fn evict_stale(&self) -> Result<(), WorkerError> {
    let names = self
      .storage
      .buckets_for(&self.cache_name)
      .map_err(WorkerError::storage)?;

    for name in names {
      if name != self.bucket {
        self
          .storage
          .delete_bucket(&name)
          .map_err(WorkerError::storage)?;
        info!(bucket = %name, "evicted stale bucket");
      }
    }

    Ok(())
  }

  /// Answer a request: stored response if the bucket has one for this URL
  /// (query string ignored), the network's response otherwise.
  ///
  /// Network errors on a miss are returned as-is, without retry.
  pub async fn fetch(&self, request: &Request) -> Result<FetchResult, WorkerError> {
    if !self.controls_clients() {
      debug!(url = %request.url, state = %self.state, "uncontrolled request");
      let response = self.network.fetch(request).await?;
      return Ok(FetchResult::from_network(
        response,
        ResponseSource::Uncontrolled,
      ));
    }

    if request.method == Method::GET {
      let key = RequestKey::from_url(&request.url);
      if let Some(entry) = self
        .storage
        .match_request(&self.bucket, &key)
        .map_err(WorkerError::storage)?
      {
        debug!(url = %request.url, "cache hit");
        return Ok(FetchResult::from_cache(entry.response, entry.cached_at));
      }
    }

    debug!(url = %request.url, "cache miss");
    let response = self.network.fetch(request).await?;
    Ok(FetchResult::from_network(response, ResponseSource::Network))
  }

  fn expect_state(&self, expected: WorkerState, action: &'static str) -> Result<(), WorkerError> {
    if self.state == expected {
      Ok(())
    } else {
      Err(WorkerError::InvalidState {
        action,
        state: self.state.as_str(),
      })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::Database;
  use crate::worker::network::HttpNetwork;
  use crate::worker::storage::SqliteStorage;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;

  /// Network answering from a path table, 404 for anything else.
  #[derive(Default)]
  struct FakeNetwork {
    routes: HashMap<String, (u16, &'static str)>,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
  }

  impl FakeNetwork {
    fn with_routes(routes: &[(&str, u16, &'static str)]) -> Self {
      Self {
        routes: routes
          .iter()
          .map(|(path, status, body)| (path.to_string(), (*status, *body)))
          .collect(),
        ..Self::default()
      }
    }

    fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, WorkerError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.seen.lock().unwrap().push(request.url.to_string());

      let (status, body) = self
        .routes
        .get(request.url.path())
        .copied()
        .unwrap_or((404, "not found"));

      Ok(Response {
        status,
        headers: Vec::new(),
        body: body.as_bytes().to_vec(),
      })
    }
  }

  fn healthy_network() -> FakeNetwork {
    FakeNetwork::with_routes(&[
      ("/favicon.webp", 200, "icon-bytes"),
      ("/sw.js", 200, "worker-source"),
      ("/about", 200, "X"),
    ])
  }

  fn storage() -> Arc<SqliteStorage> {
    Arc::new(SqliteStorage::new(Arc::new(Database::open_in_memory().unwrap())))
  }

  fn worker<N: Network>(
    config: &WorkerConfig,
    storage: Arc<SqliteStorage>,
    network: N,
  ) -> OfflineWorker<SqliteStorage, N> {
    OfflineWorker::new(config, storage, network).unwrap()
  }

  async fn active_worker(storage: Arc<SqliteStorage>) -> OfflineWorker<SqliteStorage, FakeNetwork> {
    let mut worker = worker(&WorkerConfig::default(), storage, healthy_network());
    worker.install().await.unwrap();
    worker.activate().unwrap();
    worker
  }

  #[tokio::test]
  async fn test_install_stores_manifest() {
    let storage = storage();
    let mut worker = worker(&WorkerConfig::default(), Arc::clone(&storage), healthy_network());

    worker.install().await.unwrap();

    assert_eq!(worker.state(), WorkerState::Installed);
    assert_eq!(storage.entry_count("account").unwrap(), 2);
    assert_eq!(worker.network.calls(), 2);
  }

  #[tokio::test]
  async fn test_cached_asset_ignores_query_string() {
    let worker = active_worker(storage()).await;
    let calls_after_install = worker.network.calls();

    let url = worker.resolve("/favicon.webp?v=2").unwrap();
    let result = worker.fetch(&Request::get(url)).await.unwrap();

    assert_eq!(result.source, ResponseSource::Cache);
    assert_eq!(result.response.body, b"icon-bytes");
    assert!(result.cached_at.is_some());
    assert_eq!(worker.network.calls(), calls_after_install);
  }

  #[tokio::test]
  async fn test_miss_falls_through_to_network() {
    let worker = active_worker(storage()).await;

    let url = worker.resolve("/about").unwrap();
    let result = worker.fetch(&Request::get(url)).await.unwrap();

    assert_eq!(result.source, ResponseSource::Network);
    assert_eq!(result.response.status, 200);
    assert_eq!(result.response.body, b"X");
    assert!(result.cached_at.is_none());
  }

  #[tokio::test]
  async fn test_network_responses_are_not_written_back() {
    let storage = storage();
    let worker = active_worker(Arc::clone(&storage)).await;

    let url = worker.resolve("/about").unwrap();
    worker.fetch(&Request::get(url.clone())).await.unwrap();
    let second = worker.fetch(&Request::get(url)).await.unwrap();

    assert_eq!(second.source, ResponseSource::Network);
    assert_eq!(storage.entry_count("account").unwrap(), 2);
  }

  #[tokio::test]
  async fn test_non_get_never_hits_cache() {
    let worker = active_worker(storage()).await;

    let request = Request {
      method: Method::POST,
      ..Request::get(worker.resolve("/favicon.webp").unwrap())
    };
    let result = worker.fetch(&request).await.unwrap();

    assert_eq!(result.source, ResponseSource::Network);
  }

  #[tokio::test]
  async fn test_failed_manifest_entry_aborts_install() {
    let storage = storage();
    let network = FakeNetwork::with_routes(&[("/favicon.webp", 200, "icon-bytes")]);
    let mut worker = worker(&WorkerConfig::default(), Arc::clone(&storage), network);

    let err = worker.install().await.unwrap_err();

    match err {
      WorkerError::Install { url, status } => {
        assert_eq!(url.path(), "/sw.js");
        assert_eq!(status, 404);
      }
      other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(worker.state(), WorkerState::Redundant);
    assert_eq!(storage.entry_count("account").unwrap(), 0);
    assert!(matches!(
      worker.activate(),
      Err(WorkerError::InvalidState { .. })
    ));
  }

  #[tokio::test]
  async fn test_requests_before_activation_are_uncontrolled() {
    let mut worker = worker(&WorkerConfig::default(), storage(), healthy_network());
    worker.install().await.unwrap();

    let url = worker.resolve("/favicon.webp").unwrap();
    let result = worker.fetch(&Request::get(url)).await.unwrap();

    assert_eq!(result.source, ResponseSource::Uncontrolled);
    assert!(!worker.controls_clients());
  }

  #[tokio::test]
  async fn test_activate_requires_install() {
    let mut worker = worker(&WorkerConfig::default(), storage(), healthy_network());
    let err = worker.activate().unwrap_err();
    assert!(matches!(
      err,
      WorkerError::InvalidState {
        action: "activate",
        state: "parsed"
      }
    ));
  }

  #[tokio::test]
  async fn test_restore_after_previous_install() {
    let storage = storage();
    active_worker(Arc::clone(&storage)).await;

    let mut next = worker(&WorkerConfig::default(), storage, healthy_network());
    assert!(next.restore().unwrap());
    next.activate().unwrap();

    assert!(next.controls_clients());
    assert_eq!(next.network.calls(), 0);
  }

  #[tokio::test]
  async fn test_restore_needs_every_manifest_entry() {
    let storage = storage();
    active_worker(Arc::clone(&storage)).await;

    let config = WorkerConfig {
      manifest: vec!["/favicon.webp".into(), "/manifest.json".into()],
      ..WorkerConfig::default()
    };
    let mut next = worker(&config, storage, healthy_network());
    assert!(!next.restore().unwrap());
    assert_eq!(next.state(), WorkerState::Parsed);
  }

  #[tokio::test]
  async fn test_stale_buckets_evicted_when_enabled() {
    let storage = storage();
    storage.open_bucket("account-1", "account").unwrap();
    storage.open_bucket("account", "account").unwrap();
    storage.open_bucket("account-settings", "account-settings").unwrap();
    storage.open_bucket("other", "other").unwrap();

    let config = WorkerConfig {
      version: Some("2".into()),
      evict_stale_buckets: true,
      ..WorkerConfig::default()
    };
    let mut worker = worker(&config, Arc::clone(&storage), healthy_network());
    worker.install().await.unwrap();
    worker.activate().unwrap();

    assert_eq!(worker.bucket(), "account-2");
    assert_eq!(
      storage.bucket_names().unwrap(),
      vec!["account-2", "account-settings", "other"]
    );
  }

  #[tokio::test]
  async fn test_eviction_spares_buckets_of_other_workers() {
    let storage = storage();
    // Same prefix, looks versioned, but opened by a worker named "account-v"
    storage.open_bucket("account-v-1", "account-v").unwrap();

    let config = WorkerConfig {
      version: Some("2".into()),
      evict_stale_buckets: true,
      ..WorkerConfig::default()
    };
    let mut worker = worker(&config, Arc::clone(&storage), healthy_network());
    worker.install().await.unwrap();
    worker.activate().unwrap();

    assert_eq!(
      storage.bucket_names().unwrap(),
      vec!["account-2", "account-v-1"]
    );
    assert_eq!(storage.buckets_for("account").unwrap(), vec!["account-2"]);
  }

  #[tokio::test]
  async fn test_stale_buckets_kept_by_default() {
    let storage = storage();
    storage.open_bucket("account-1", "account").unwrap();

    let config = WorkerConfig {
      version: Some("2".into()),
      ..WorkerConfig::default()
    };
    let mut worker = worker(&config, Arc::clone(&storage), healthy_network());
    worker.install().await.unwrap();
    worker.activate().unwrap();

    assert_eq!(
      storage.bucket_names().unwrap(),
      vec!["account-1", "account-2"]
    );
  }

  #[tokio::test]
  async fn test_network_failure_on_miss_propagates() {
    // Grab a free port, then close it so connections are refused
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = WorkerConfig {
      origin: format!("http://{}", addr),
      manifest: Vec::new(),
      ..WorkerConfig::default()
    };
    let http = reqwest::Client::builder().no_proxy().build().unwrap();
    let mut worker = worker(&config, storage(), HttpNetwork::with_client(http));
    worker.install().await.unwrap();
    worker.activate().unwrap();

    let url = worker.resolve("/missing").unwrap();
    let err = worker.fetch(&Request::get(url)).await.unwrap_err();

    assert!(matches!(err, WorkerError::Network(_)));
  }
}
