//! Cached OAuth authorization grants
//!
//! A grant is what the token broker caches per user identity after a
//! successful authorization-code exchange: the access token, its computed
//! absolute expiry, and an optional refresh token. Grants are plain data;
//! lifecycle decisions (refresh, re-authorize) live in the broker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cached OAuth grant for one user identity.
///
/// Fields map to the token endpoint response defined in RFC 6749. The
/// `expires_at` field is an absolute UTC timestamp derived from the
/// `expires_in` seconds returned by the server, so expiry can be determined
/// without a server round-trip.
///
/// # Examples
///
/// ```
/// use vpnportal::oauth::grant::OAuthGrant;
///
/// let grant = OAuthGrant {
///     access_token: "my_access_token".to_string(),
///     token_type: "bearer".to_string(),
///     expires_at: None,
///     refresh_token: None,
///     scope: Some("config".to_string()),
/// };
///
/// // A grant with no expiry is never considered expired.
/// assert!(!grant.is_expired());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthGrant {
    /// The access token string issued by the authorization server.
    pub access_token: String,

    /// The token type, typically `"bearer"`.
    pub token_type: String,

    /// UTC timestamp at which the access token expires.
    ///
    /// When `None`, the token is treated as non-expiring.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub expires_at: Option<DateTime<Utc>>,

    /// Refresh token usable to obtain a new access token without sending
    /// the user back through the authorization endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Space-separated OAuth scopes granted by the authorization server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl OAuthGrant {
    /// Returns `true` when the access token is expired or about to expire.
    ///
    /// A 60-second buffer is applied so the broker has time to refresh
    /// before the resource server starts rejecting the token. Grants with
    /// no `expires_at` are considered perpetually valid; expiry is a
    /// pull-based check evaluated lazily on the next call, there is no
    /// background timer.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            None => false,
            Some(expires_at) => {
                let buffer = chrono::Duration::seconds(60);
                Utc::now() >= expires_at - buffer
            }
        }
    }
}
