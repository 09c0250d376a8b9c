//! Serde types matching the identity API.

use serde::{Deserialize, Serialize};

/// The connected user, as returned by `GET /users/@me`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  /// Unique and inalienable handle of the user.
  pub vanity: String,
  pub username: String,
  pub avatar: Option<String>,
  pub bio: Option<String>,
  pub email: Option<String>,
  pub verified: bool,
  /// Absent from some API revisions.
  #[serde(default)]
  pub deleted: bool,
  /// Bitfield of badges and privileges, a signed 32-bit integer on the API side.
  pub flags: i32,
}

impl User {
  /// Sentinel value held while nobody is connected.
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn is_empty(&self) -> bool {
    self.vanity.is_empty()
  }
}

/// Partial update applied by [`SessionStore::merge_user`](super::SessionStore::merge_user).
///
/// `None` leaves the field alone. Nullable fields take `Some(None)` to clear.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
  pub vanity: Option<String>,
  pub username: Option<String>,
  pub avatar: Option<Option<String>>,
  pub bio: Option<Option<String>>,
  pub email: Option<Option<String>>,
  pub verified: Option<bool>,
  pub deleted: Option<bool>,
  pub flags: Option<i32>,
}

impl UserPatch {
  pub(super) fn apply(self, user: &mut User) {
    if let Some(vanity) = self.vanity {
      user.vanity = vanity;
    }
    if let Some(username) = self.username {
      user.username = username;
    }
    if let Some(avatar) = self.avatar {
      user.avatar = avatar;
    }
    if let Some(bio) = self.bio {
      user.bio = bio;
    }
    if let Some(email) = self.email {
      user.email = email;
    }
    if let Some(verified) = self.verified {
      user.verified = verified;
    }
    if let Some(deleted) = self.deleted {
      user.deleted = deleted;
    }
    if let Some(flags) = self.flags {
      user.flags = flags;
    }
  }
}

/// Error body sent by the identity API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
  pub message: String,
  #[serde(default)]
  pub error: bool,
}

/// Response to a login or an account creation.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
  pub vanity: String,
  pub token: String,
  pub user_settings: UserSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserSettings {
  pub locale: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_sentinel() {
    let user = User::empty();
    assert_eq!(user.vanity, "");
    assert_eq!(user.username, "");
    assert_eq!(user.avatar, None);
    assert_eq!(user.bio, None);
    assert_eq!(user.email, None);
    assert!(!user.verified);
    assert!(!user.deleted);
    assert_eq!(user.flags, 0);
    assert!(user.is_empty());
  }

  #[test]
  fn test_deleted_defaults_when_missing() {
    let user: User = serde_json::from_str(
      r#"{
        "vanity":"bob",
        "username":"Bob",
        "avatar":null,
        "bio":null,
        "email":null,
        "verified":false,
        "flags":4
      }"#,
    )
    .unwrap();
    assert!(!user.deleted);
    assert_eq!(user.flags, 4);
  }

  #[test]
  fn test_flags_use_the_full_signed_range() {
    let user: User = serde_json::from_str(
      r#"{
        "vanity":"bob",
        "username":"Bob",
        "avatar":null,
        "bio":null,
        "email":null,
        "verified":false,
        "flags":-2147483648
      }"#,
    )
    .unwrap();
    assert_eq!(user.flags, i32::MIN);

    let back: User = serde_json::from_str(&serde_json::to_string(&user).unwrap()).unwrap();
    assert_eq!(back.flags, i32::MIN);
  }

  #[test]
  fn test_patch_only_touches_given_fields() {
    let mut user = User {
      vanity: "bob".into(),
      username: "Bob".into(),
      bio: Some("hello".into()),
      ..User::empty()
    };

    UserPatch {
      username: Some("Robert".into()),
      bio: Some(None),
      ..UserPatch::default()
    }
    .apply(&mut user);

    assert_eq!(user.vanity, "bob");
    assert_eq!(user.username, "Robert");
    assert_eq!(user.bio, None);
  }

  #[test]
  fn test_token_response() {
    let response: TokenResponse = serde_json::from_str(
      r#"{"vanity":"bob","token":"abc","user_settings":{"locale":"fr"}}"#,
    )
    .unwrap();
    assert_eq!(response.token, "abc");
    assert_eq!(response.user_settings.locale, "fr");
  }
}
