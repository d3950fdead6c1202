//! Identity verifier.
//!
//! Maps provider payloads to a normalized [`Identity`] and applies the group
//! allow-list. Two payload shapes exist: the userinfo JSON returned for a
//! bearer token, and the profile produced during the interactive login. Both
//! go through [`normalize`], which walks a fixed field-priority chain.
//!
//! Denial is reported differently per entry point. [`IdentityVerifier::verify_token`]
//! serves stateless API calls and returns `Ok(None)`, the plain
//! "unauthenticated" signal. [`IdentityVerifier::from_auth_callback`] runs
//! mid-login before any session exists and fails with
//! [`AuthError::AccessDenied`] so the flow can show an error page.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::types::Identity;
use crate::client::HttpClient;
use crate::error::{AuthError, AuthResult};

/// Identifier fields for userinfo payloads, highest priority first.
const USERINFO_ID_FIELDS: &[&str] = &["sub", "id", "user_id", "pk"];

/// Identifier fields for login profiles, highest priority first.
const PROFILE_ID_FIELDS: &[&str] = &["id", "sub", "user_id", "pk"];

/// Login name fields, highest priority first.
const USERNAME_FIELDS: &[&str] = &["username", "preferred_username", "nickname", "name", "email"];

/// Group membership fields, highest priority first.
const GROUP_FIELDS: &[&str] = &["groups", "roles"];

/// Keys consumed by normalization and therefore not copied into `claims`.
const MAPPED_KEYS: &[&str] = &[
    "sub",
    "id",
    "user_id",
    "pk",
    "username",
    "preferred_username",
    "email",
    "emails",
    "email_verified",
    "groups",
    "roles",
    "name",
    "given_name",
    "family_name",
];

/// A raw provider payload, tagged with where it came from.
#[derive(Debug, Clone)]
pub enum ProfileSource {
    /// JSON from the userinfo endpoint.
    UserInfo(Map<String, Value>),
    /// Profile produced by the interactive login callback.
    AuthCallback(Map<String, Value>),
}

impl ProfileSource {
    /// Wrap a userinfo body. Non-object bodies become an empty profile.
    #[must_use]
    pub fn user_info(value: Value) -> Self {
        Self::UserInfo(into_object(value))
    }

    /// Wrap a login profile. Non-object values become an empty profile.
    #[must_use]
    pub fn auth_callback(value: Value) -> Self {
        Self::AuthCallback(into_object(value))
    }

    const fn id_fields(&self) -> &'static [&'static str] {
        match self {
            Self::UserInfo(_) => USERINFO_ID_FIELDS,
            Self::AuthCallback(_) => PROFILE_ID_FIELDS,
        }
    }

    const fn fields(&self) -> &Map<String, Value> {
        match self {
            Self::UserInfo(map) | Self::AuthCallback(map) => map,
        }
    }
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Coerce a scalar JSON value to a non-empty string.
fn scalar_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

fn first_string(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| fields.get(*key).and_then(scalar_string))
}

fn optional_string(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(scalar_string)
}

fn resolve_email(fields: &Map<String, Value>) -> String {
    if let Some(email) = optional_string(fields, "email") {
        return email;
    }

    let first = fields.get("emails").and_then(Value::as_array).and_then(|a| a.first());
    match first {
        Some(Value::Object(entry)) => optional_string(entry, "value").unwrap_or_default(),
        Some(other) => scalar_string(other).unwrap_or_default(),
        None => String::new(),
    }
}

fn resolve_groups(fields: &Map<String, Value>) -> Vec<String> {
    let Some(raw) = GROUP_FIELDS.iter().find_map(|key| fields.get(*key).filter(|v| !v.is_null()))
    else {
        return Vec::new();
    };

    let Value::Array(items) = raw else {
        return Vec::new();
    };

    let mut groups: Vec<String> = Vec::new();
    for group in items.iter().filter_map(scalar_string) {
        if !groups.contains(&group) {
            groups.push(group);
        }
    }
    groups
}

/// Normalize a provider payload into an [`Identity`].
///
/// Fallback chains:
/// - id: `sub`/`id` (order depends on the source), then `user_id`, then `pk`
/// - username: `username`, `preferred_username`, `nickname`, `name`, `email`
/// - email: `email`, then `emails[0].value`, then `emails[0]`
/// - groups: `groups`, then `roles`; only an array counts
///
/// Fails with [`AuthError::InvalidProfile`] when no id or username resolves.
pub fn normalize(source: &ProfileSource) -> AuthResult<Identity> {
    let fields = source.fields();

    let id = first_string(fields, source.id_fields())
        .ok_or_else(|| AuthError::invalid_profile("no user identifier in profile"))?;
    let email = resolve_email(fields);
    let username = first_string(fields, USERNAME_FIELDS)
        .or_else(|| (!email.is_empty()).then(|| email.clone()))
        .ok_or_else(|| AuthError::invalid_profile("no login name in profile"))?;

    let claims = fields
        .iter()
        .filter(|(k, _)| !MAPPED_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok(Identity {
        id,
        username,
        email,
        email_verified: fields.get("email_verified").and_then(Value::as_bool),
        groups: resolve_groups(fields),
        name: optional_string(fields, "name"),
        given_name: optional_string(fields, "given_name"),
        family_name: optional_string(fields, "family_name"),
        claims,
    })
}

/// Group allow-list.
#[derive(Debug, Clone, Default)]
pub struct GroupPolicy {
    allowed: Vec<String>,
}

impl GroupPolicy {
    #[must_use]
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    /// Whether the policy restricts anything.
    #[must_use]
    pub fn is_enforced(&self) -> bool {
        !self.allowed.is_empty()
    }

    /// Allowed iff the allow-list is empty or shares a group with `groups`.
    #[must_use]
    pub fn permits(&self, groups: &[String]) -> bool {
        !self.is_enforced() || self.allowed.iter().any(|g| groups.contains(g))
    }
}

/// Resolves identities from tokens and login profiles.
#[derive(Clone)]
pub struct IdentityVerifier {
    http: Arc<dyn HttpClient>,
    policy: GroupPolicy,
}

impl IdentityVerifier {
    #[must_use]
    pub fn new(http: Arc<dyn HttpClient>, policy: GroupPolicy) -> Self {
        Self { http, policy }
    }

    /// Fetch raw userinfo for `access_token`.
    ///
    /// `Ok(None)` means the provider answered 401.
    pub async fn fetch_userinfo(
        &self,
        userinfo_endpoint: &str,
        access_token: &str,
    ) -> AuthResult<Option<Value>> {
        let headers = [("Authorization", format!("Bearer {access_token}"))];
        let response = self.http.get(userinfo_endpoint, &headers).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to verify token");
            AuthError::verification(e.to_string())
        })?;

        if response.status == 401 {
            return Ok(None);
        }
        if !response.is_success() {
            tracing::error!(status = response.status, "Userinfo request rejected");
            return Err(AuthError::verification(format!(
                "userinfo endpoint returned {}",
                response.status
            )));
        }

        Ok(Some(response.body))
    }

    /// Resolve the identity behind a bearer token.
    ///
    /// Returns `Ok(None)` for an invalid token (401) and for users outside the
    /// allowed groups.
    pub async fn verify_token(
        &self,
        userinfo_endpoint: &str,
        access_token: &str,
    ) -> AuthResult<Option<Identity>> {
        let Some(body) = self.fetch_userinfo(userinfo_endpoint, access_token).await? else {
            return Ok(None);
        };

        let identity = normalize(&ProfileSource::user_info(body))
            .map_err(|e| AuthError::verification(format!("unusable userinfo response: {e}")))?;

        if !self.policy.permits(&identity.groups) {
            tracing::warn!(user = %identity.id, "User not in allowed groups");
            return Ok(None);
        }

        Ok(Some(identity))
    }

    /// Resolve the identity from an interactive login profile.
    pub fn from_auth_callback(&self, profile: Value) -> AuthResult<Identity> {
        let identity = normalize(&ProfileSource::auth_callback(profile))?;

        if !self.policy.permits(&identity.groups) {
            tracing::warn!(user = %identity.id, "Login rejected: user not in allowed groups");
            return Err(AuthError::access_denied(identity.id));
        }

        Ok(identity)
    }
}

impl std::fmt::Debug for IdentityVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityVerifier").field("policy", &self.policy).finish()
    }
}
