use reqwest::header::AUTHORIZATION;
use std::future::Future;
use tracing::debug;

use crate::config::Config;
use crate::error::SessionError;

use super::types::{ApiError, User};

/// Access to the identity API.
pub trait IdentityClient: Send + Sync {
  /// Fetch the user owning `authorization`. The value is sent as-is.
  fn fetch_me(
    &self,
    authorization: &str,
  ) -> impl Future<Output = Result<User, SessionError>> + Send;
}

/// Identity API client over HTTP
#[derive(Clone)]
pub struct HttpIdentityClient {
  http: reqwest::Client,
  base_url: String,
}

impl HttpIdentityClient {
  pub fn new(config: &Config) -> Result<Self, SessionError> {
    let http = reqwest::Client::builder()
      .timeout(config.request_timeout())
      .build()?;

    Ok(Self::with_client(http, config.api_url.clone()))
  }

  /// Build on an existing HTTP client.
  pub fn with_client(http: reqwest::Client, base_url: String) -> Self {
    Self { http, base_url }
  }

  fn me_url(&self) -> String {
    format!("{}/users/@me", self.base_url.trim_end_matches('/'))
  }
}

impl IdentityClient for HttpIdentityClient {
  async fn fetch_me(&self, authorization: &str) -> Result<User, SessionError> {
    let url = self.me_url();
    debug!(%url, "fetching current user");

    // The session token goes out verbatim, without any scheme prefix
    let response = self
      .http
      .get(&url)
      .header(AUTHORIZATION, authorization)
      .send()
      .await?;

    let status = response.status();
    let body = response.bytes().await?;

    if !status.is_success() {
      let message = serde_json::from_slice::<ApiError>(&body)
        .map(|e| e.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
      return Err(SessionError::Status {
        status: status.as_u16(),
        message,
      });
    }

    Ok(serde_json::from_slice(&body)?)
  }
}
