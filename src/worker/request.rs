//! Requests, responses, and the identity used to match them in a bucket.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// Outgoing request seen by the worker.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: Vec<(String, String)>,
}

impl Request {
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      headers: Vec::new(),
    }
  }
}

/// A response, either captured in a bucket or fresh from the network.
///
/// Header values are raw bytes: they need not be visible ASCII.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  /// In wire order, repeated names kept
  pub headers: Vec<(String, Vec<u8>)>,
  pub body: Vec<u8>,
}

impl Response {
  /// Whether the status is in the 200-299 range.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Every value of a header, case-insensitive on the name.
  pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a [u8]> + 'a {
    self
      .headers
      .iter()
      .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_slice())
  }
}

/// Identity of a request inside a bucket: its URL without query string
/// or fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  url: String,
}

impl RequestKey {
  pub fn from_url(url: &Url) -> Self {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    Self {
      url: url.to_string(),
    }
  }

  pub fn as_str(&self) -> &str {
    &self.url
  }

  /// SHA256 hex digest, used as the storage key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}
