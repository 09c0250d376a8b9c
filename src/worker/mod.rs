//! Offline cache worker.
//!
//! Intercepts requests and answers them from a single named bucket:
//! - Bucket filled once at install from a fixed manifest, all or nothing
//! - Lookups ignore query strings and only apply to GET requests
//! - Misses go to the network untouched, nothing is written back

mod lifecycle;
mod network;
mod request;
mod storage;

pub use lifecycle::{FetchResult, OfflineWorker, ResponseSource, WorkerState};
pub use network::{HttpNetwork, Network};
pub use request::{Request, RequestKey, Response};
pub use storage::{CacheStorage, CachedEntry, SqliteStorage};
