//! In-memory state of the connected user.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::SessionError;

use super::client::IdentityClient;
use super::cookies::{CookieStore, SESSION_COOKIE};
use super::types::{User, UserPatch};

/// What a call to [`SessionStore::fetch_user`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
  /// No session cookie, or a user was already loaded. Nothing was sent.
  Skipped,
  /// The state now holds this user.
  Fetched(User),
  /// The request completed after a logout; its result was dropped.
  Superseded,
}

struct State {
  user: User,
  /// Bumped on logout so in-flight fetches can tell they are stale
  generation: u64,
}

/// Holds the connected user and keeps it in sync with the identity API.
pub struct SessionStore<C, K> {
  client: C,
  cookies: K,
  state: RwLock<State>,
  /// Serializes overlapping fetches
  fetch_gate: Mutex<()>,
}

impl<C: IdentityClient, K: CookieStore> SessionStore<C, K> {
  /// Create a store holding the empty user.
  pub fn new(client: C, cookies: K) -> Self {
    Self {
      client,
      cookies,
      state: RwLock::new(State {
        user: User::empty(),
        generation: 0,
      }),
      fetch_gate: Mutex::new(()),
    }
  }

  /// Snapshot of the current user.
  pub fn user(&self) -> Result<User, SessionError> {
    Ok(self.read()?.user.clone())
  }

  pub fn cookies(&self) -> &K {
    &self.cookies
  }

  /// Load the user owning the session cookie.
  ///
  /// Unless `force` is set, nothing happens when there is no session
  /// cookie or a user is already loaded. On success the whole user is
  /// replaced; on failure the state is left untouched.
  pub async fn fetch_user(&self, force: bool) -> Result<FetchOutcome, SessionError> {
    let _gate = self.fetch_gate.lock().await;

    let session = self.cookies.get(SESSION_COOKIE)?.unwrap_or_default();
    let generation = {
      let state = self.read()?;
      if !force && (session.is_empty() || !state.user.vanity.is_empty()) {
        debug!(
          has_session = !session.is_empty(),
          vanity = %state.user.vanity,
          "skipping user fetch"
        );
        return Ok(FetchOutcome::Skipped);
      }
      state.generation
    };

    let user = self.client.fetch_me(&session).await?;

    let mut state = self.write()?;
    if state.generation != generation {
      debug!(vanity = %user.vanity, "dropping user fetched across a logout");
      return Ok(FetchOutcome::Superseded);
    }
    state.user = user.clone();
    info!(vanity = %user.vanity, "user loaded");

    Ok(FetchOutcome::Fetched(user))
  }

  /// Forget the session locally. The server-side session stays valid.
  pub fn logout(&self) -> Result<(), SessionError> {
    self.cookies.remove(SESSION_COOKIE)?;

    let mut state = self.write()?;
    state.user = User::empty();
    state.generation += 1;
    info!("logged out");

    Ok(())
  }

  /// Replace every field of the stored user.
  pub fn replace_user(&self, user: User) -> Result<(), SessionError> {
    self.write()?.user = user;
    Ok(())
  }

  /// Update only the fields set in `patch`.
  pub fn merge_user(&self, patch: UserPatch) -> Result<User, SessionError> {
    let mut state = self.write()?;
    patch.apply(&mut state.user);
    Ok(state.user.clone())
  }

  fn read(&self) -> Result<RwLockReadGuard<'_, State>, SessionError> {
    self
      .state
      .read()
      .map_err(|e| SessionError::Storage(format!("Lock poisoned: {}", e)))
  }

  fn write(&self) -> Result<RwLockWriteGuard<'_, State>, SessionError> {
    self
      .state
      .write()
      .map_err(|e| SessionError::Storage(format!("Lock poisoned: {}", e)))
  }
}
