//! Session state of the connected user.
//!
//! The store reads the `session` cookie, asks the identity API who owns it
//! and keeps the answer in memory until logout.

mod client;
mod cookies;
mod store;
mod types;

pub use client::{HttpIdentityClient, IdentityClient};
pub use cookies::{CookieStore, MemoryCookies, SqliteCookies, SESSION_COOKIE};
pub use store::{FetchOutcome, SessionStore};
pub use types::{ApiError, TokenResponse, User, UserPatch, UserSettings};
