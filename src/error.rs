//! Error types returned by the session store and the offline worker.

use thiserror::Error;
use url::Url;

/// Errors from the session store and its collaborators.
#[derive(Error, Debug)]
pub enum SessionError {
  #[error("Identity request failed: {0}")]
  Network(#[from] reqwest::Error),

  #[error("Identity API answered {status}: {message}")]
  Status { status: u16, message: String },

  #[error("Failed to decode user: {0}")]
  Decode(#[from] serde_json::Error),

  #[error("Session storage error: {0}")]
  Storage(String),
}

/// Errors from the offline cache worker.
#[derive(Error, Debug)]
pub enum WorkerError {
  #[error("Network request failed: {0}")]
  Network(#[from] reqwest::Error),

  #[error("Failed to cache {url}: server answered {status}")]
  Install { url: Url, status: u16 },

  #[error("Invalid URL {input:?}: {source}")]
  InvalidUrl {
    input: String,
    source: url::ParseError,
  },

  #[error("Cache storage error: {0}")]
  Storage(String),

  #[error("Cannot {action} while worker is {state}")]
  InvalidState {
    action: &'static str,
    state: &'static str,
  },
}

impl SessionError {
  pub(crate) fn storage(err: color_eyre::Report) -> Self {
    Self::Storage(err.to_string())
  }
}

impl WorkerError {
  pub(crate) fn storage(err: color_eyre::Report) -> Self {
    Self::Storage(err.to_string())
  }
}
