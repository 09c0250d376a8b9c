use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::error::WorkerError;

use super::request::{Request, Response};

/// Trait for whatever answers requests the cache cannot.
pub trait Network: Send + Sync {
  fn fetch(
    &self,
    request: &Request,
  ) -> impl Future<Output = Result<Response, WorkerError>> + Send;
}

/// Network access over HTTP
#[derive(Clone)]
pub struct HttpNetwork {
  http: reqwest::Client,
}

impl HttpNetwork {
  pub fn new(timeout: Duration) -> Result<Self, WorkerError> {
    let http = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self::with_client(http))
  }

  pub fn with_client(http: reqwest::Client) -> Self {
    Self { http }
  }
}

impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, WorkerError> {
    debug!(method = %request.method, url = %request.url, "network fetch");

    let mut builder = self
      .http
      .request(request.method.clone(), request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }

    let response = builder.send().await?;

    let status = response.status().as_u16();
    // Values are kept as bytes, repeated names in wire order
    let headers = response
      .headers()
      .iter()
      .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
      .collect();
    let body = response.bytes().await?.to_vec();

    Ok(Response {
      status,
      headers,
      body,
    })
  }
}
