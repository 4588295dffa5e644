//! OAuth token broker
//!
//! The broker owns the per-session mapping from user identity to cached
//! [`OAuthGrant`] and drives the authorization-code flow around it. The
//! identity is normally the target provider's base URI, except for
//! secure-internet locations when the session already has a home provider:
//! then the home URI is the identity, so one grant serves every location
//! under the same home umbrella.
//!
//! # Grant state machine (per identity)
//!
//! ```text
//! NoGrant --call()--> AwaitingCallback --handle_callback() ok--> Authorized
//!    ^                     |                                         |
//!    |        any OAuth error                                 expiry / 401
//!    +---------------------+-----------------------------------------+
//! ```
//!
//! "No valid token" is an expected, frequent outcome, so [`TokenBroker::call`]
//! models it as the [`ApiOutcome::AuthorizationRequired`] variant carrying
//! the redirect URI, never as an error.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;
use chrono::Utc;
use url::Url;

use crate::discovery::directory::ServerKind;
use crate::error::{PortalError, Result};
use crate::oauth::grant::OAuthGrant;
use crate::oauth::provider_info::ProviderInfo;
use crate::session::SessionState;

// ---------------------------------------------------------------------------
// ApiOutcome / ApiResponse
// ---------------------------------------------------------------------------

/// Result of an authenticated provider API call.
///
/// Either the caller gets data, or it gets a URL to send the user to; a
/// missing token is not a failure.
#[derive(Debug)]
pub enum ApiOutcome {
    /// The API call was performed; inspect the response status and body.
    Response(ApiResponse),

    /// No usable grant exists; redirect the user to `authorize_uri`.
    AuthorizationRequired {
        /// Authorization-code redirect URI carrying client id, scope,
        /// callback URI, and a fresh `state` nonce.
        authorize_uri: String,
    },
}

/// An HTTP response from a provider API endpoint.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: u16,
    body: bytes::Bytes,
}

impl ApiResponse {
    /// Builds a response from a status code and body bytes.
    pub fn new(status: u16, body: bytes::Bytes) -> Self {
        Self { status, body }
    }

    /// `true` for any 2xx status.
    pub fn is_okay(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// The raw body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Parses the body as JSON.
    pub fn json(&self) -> Result<serde_json::Value> {
        serde_json::from_slice(&self.body).map_err(|e| {
            PortalError::MalformedDocument(format!("invalid API response JSON: {e}")).into()
        })
    }

    /// The body as UTF-8 text (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

// ---------------------------------------------------------------------------
// Token endpoint response (raw deserialization)
// ---------------------------------------------------------------------------

/// Raw JSON response from an OAuth token endpoint, converted into the
/// canonical [`OAuthGrant`] before caching.
#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    /// `expires_in` seconds become an absolute UTC `expires_at` timestamp.
    fn into_grant(self) -> OAuthGrant {
        let expires_at = self.expires_in.map(|secs| {
            Utc::now() + chrono::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
        });

        OAuthGrant {
            access_token: self.access_token,
            token_type: self.token_type,
            expires_at,
            refresh_token: self.refresh_token,
            scope: self.scope,
        }
    }
}

// ---------------------------------------------------------------------------
// TokenBroker
// ---------------------------------------------------------------------------

/// Holds and exchanges OAuth grants per user identity.
///
/// One broker per session/user; brokers are never shared across users, so
/// concurrent users never observe each other's grants.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use vpnportal::oauth::broker::TokenBroker;
///
/// let broker = TokenBroker::new(
///     Arc::new(reqwest::Client::new()),
///     "org.example.portal".to_string(),
///     "config".to_string(),
/// );
/// assert!(!broker.has_grant("https://vpn.example.org/"));
/// ```
pub struct TokenBroker {
    http: Arc<reqwest::Client>,
    client_id: String,
    request_scope: String,
    grants: HashMap<String, OAuthGrant>,
    /// Issued `state` nonces per identity, awaiting their callback.
    pending: HashMap<String, String>,
}

impl TokenBroker {
    /// Creates a broker with no cached grants.
    ///
    /// # Arguments
    ///
    /// * `http` - Shared HTTP client for token endpoint requests and API
    ///   calls.
    /// * `client_id` - OAuth client identifier sent to every provider.
    /// * `request_scope` - Scope string requested in every authorization.
    pub fn new(http: Arc<reqwest::Client>, client_id: String, request_scope: String) -> Self {
        Self {
            http,
            client_id,
            request_scope,
            grants: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    /// Resolves the identity under which grants for `target_base_uri` are
    /// stored.
    ///
    /// A secure-internet target with an existing home binding resolves to
    /// the home URI; every other combination resolves to the target itself.
    /// The caller must then also use the home provider's OAuth endpoints
    /// (see [`ProviderInfo::with_authorization_from`]).
    pub fn resolve_identity(
        target_base_uri: &str,
        kind: ServerKind,
        session: &SessionState,
    ) -> String {
        if kind == ServerKind::SecureInternet {
            if let Some(home) = &session.secure_internet_home_base_uri {
                return home.clone();
            }
        }
        target_base_uri.to_string()
    }

    /// `true` when a grant (possibly expired) is cached for the identity.
    pub fn has_grant(&self, identity: &str) -> bool {
        self.grants.contains_key(identity)
    }

    /// Restores previously saved grants, e.g. when the host rehydrates the
    /// broker from its session store.
    pub fn restore_grants(&mut self, grants: HashMap<String, OAuthGrant>) {
        self.grants = grants;
    }

    /// The cached grants, for hosts that persist them with the session.
    pub fn grants(&self) -> &HashMap<String, OAuthGrant> {
        &self.grants
    }

    /// Restores the `state` nonces of outstanding authorizations.
    ///
    /// The broker lives for one request, but the redirect-to-callback round
    /// trip spans two: the host must persist these alongside the grants, or
    /// the callback arrives at a broker that knows no pending authorization.
    pub fn restore_pending_authorizations(&mut self, pending: HashMap<String, String>) {
        self.pending = pending;
    }

    /// The outstanding `state` nonces per identity, for hosts that persist
    /// them with the session.
    pub fn pending_authorizations(&self) -> &HashMap<String, String> {
        &self.pending
    }

    /// Performs an authenticated API call for an identity, or produces an
    /// authorization redirect.
    ///
    /// With a valid cached grant the call is performed directly; calling
    /// twice with an unexpired grant performs no token exchange in between.
    /// An expired grant with a refresh token is refreshed first; when no
    /// usable grant can be obtained without the user, the outcome is
    /// [`ApiOutcome::AuthorizationRequired`] and the issued `state` nonce
    /// is recorded for the later callback. A `401` from the API invalidates
    /// the cached grant and also yields the authorization outcome.
    ///
    /// # Arguments
    ///
    /// * `identity` - Resolved user identity (see [`Self::resolve_identity`]).
    /// * `provider_info` - Endpoints to use; for a home-federated call these
    ///   must already carry the home provider's OAuth endpoints.
    /// * `method` - `GET` or `POST`.
    /// * `api_path` - Relative API call, e.g. `"profile_list"`.
    /// * `params` - Query parameters (GET) or form fields (POST).
    /// * `redirect_uri` - The callback URI for a possible authorization
    ///   redirect; must end in `callback`.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::Transport`] for network-level failures and
    /// [`PortalError::OAuthExchange`] when a refresh attempt is rejected in
    /// a way that is not recoverable by re-authorization.
    pub async fn call(
        &mut self,
        identity: &str,
        provider_info: &ProviderInfo,
        method: reqwest::Method,
        api_path: &str,
        params: &[(&str, &str)],
        redirect_uri: &str,
    ) -> Result<ApiOutcome> {
        if let Some(grant) = self.usable_grant(identity, provider_info).await? {
            let response = self
                .send_api_request(&grant, provider_info, method, api_path, params)
                .await?;

            if response.status() == 401 {
                // The provider no longer accepts this token; drop it and
                // fall through to a fresh authorization.
                tracing::debug!(identity, "access token rejected with 401, discarding grant");
                self.grants.remove(identity);
            } else {
                return Ok(ApiOutcome::Response(response));
            }
        }

        let authorize_uri = self.authorize_uri(identity, provider_info, redirect_uri)?;
        Ok(ApiOutcome::AuthorizationRequired { authorize_uri })
    }

    /// Completes an authorization-code callback for an identity.
    ///
    /// Validates the `state` nonce issued by the matching [`Self::call`],
    /// rejects provider `error=` callbacks, exchanges the code at the token
    /// endpoint, and caches the resulting grant. Any failure returns the
    /// identity to the no-grant state.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::OAuthExchange`] on missing pending
    /// authorization (which also covers authorization-code replay, since
    /// the nonce is consumed on first use), state mismatch, provider error
    /// response, or token endpoint rejection.
    pub async fn handle_callback(
        &mut self,
        identity: &str,
        provider_info: &ProviderInfo,
        callback_params: &HashMap<String, String>,
        redirect_uri: &str,
    ) -> Result<()> {
        // Consume the pending state first; a replayed callback finds nothing.
        let pending = self.pending.remove(identity).ok_or_else(|| {
            PortalError::OAuthExchange(format!("no pending authorization for \"{identity}\""))
        })?;

        if let Some(error) = callback_params.get("error") {
            let description = callback_params
                .get("error_description")
                .map(String::as_str)
                .unwrap_or("");
            return Err(PortalError::OAuthExchange(format!(
                "authorization server returned error \"{error}\": {description}"
            ))
            .into());
        }

        match callback_params.get("state") {
            Some(state) if *state == pending => {}
            _ => {
                return Err(
                    PortalError::OAuthExchange("state mismatch in OAuth callback".to_string())
                        .into(),
                )
            }
        }

        let code = callback_params.get("code").ok_or_else(|| {
            PortalError::OAuthExchange("authorization code missing from callback".to_string())
        })?;

        let grant = self
            .exchange_code(provider_info, code, redirect_uri)
            .await?;
        tracing::info!(identity, "authorization grant obtained");
        self.grants.insert(identity.to_string(), grant);

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// Returns a grant valid for immediate use, refreshing an expired one
    /// when a refresh token is available. `None` means the user has to go
    /// through the authorization endpoint.
    async fn usable_grant(
        &mut self,
        identity: &str,
        provider_info: &ProviderInfo,
    ) -> Result<Option<OAuthGrant>> {
        let Some(grant) = self.grants.get(identity) else {
            return Ok(None);
        };

        if !grant.is_expired() {
            return Ok(Some(grant.clone()));
        }

        let Some(refresh_token) = grant.refresh_token.clone() else {
            self.grants.remove(identity);
            return Ok(None);
        };

        match self.refresh_grant(provider_info, &refresh_token).await {
            Ok(refreshed) => {
                tracing::debug!(identity, "access token refreshed");
                self.grants.insert(identity.to_string(), refreshed.clone());
                Ok(Some(refreshed))
            }
            Err(e) => {
                // A rejected refresh token means full re-authorization; this
                // is the Expired → NoGrant transition.
                tracing::debug!(identity, error = %e, "token refresh failed, discarding grant");
                self.grants.remove(identity);
                Ok(None)
            }
        }
    }

    /// Sends the authenticated API request itself.
    async fn send_api_request(
        &self,
        grant: &OAuthGrant,
        provider_info: &ProviderInfo,
        method: reqwest::Method,
        api_path: &str,
        params: &[(&str, &str)],
    ) -> Result<ApiResponse> {
        let url = format!(
            "{}/{}",
            provider_info.api_base_uri.trim_end_matches('/'),
            api_path
        );

        let request = if method == reqwest::Method::POST {
            self.http.post(&url).form(params)
        } else {
            self.http.get(&url).query(params)
        };

        let response = request
            .bearer_auth(&grant.access_token)
            .send()
            .await
            .map_err(|e| PortalError::Transport(format!("API call \"{url}\" failed: {e}")))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| PortalError::Transport(format!("unable to read \"{url}\": {e}")))?;

        Ok(ApiResponse::new(status, body))
    }

    /// Builds the authorization redirect URI and records the pending state
    /// nonce for the identity (NoGrant → AwaitingCallback).
    fn authorize_uri(
        &mut self,
        identity: &str,
        provider_info: &ProviderInfo,
        redirect_uri: &str,
    ) -> Result<String> {
        let mut url = Url::parse(&provider_info.authorization_endpoint).map_err(|e| {
            PortalError::MalformedDocument(format!("invalid authorization endpoint URL: {e}"))
        })?;

        let state = generate_state();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.client_id);
            query.append_pair("redirect_uri", redirect_uri);
            query.append_pair("scope", &self.request_scope);
            query.append_pair("state", &state);
            query.append_pair("response_type", "code");
        }

        self.pending.insert(identity.to_string(), state);

        Ok(url.to_string())
    }

    /// Exchanges an authorization code for a grant at the token endpoint.
    async fn exchange_code(
        &self,
        provider_info: &ProviderInfo,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthGrant> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", &self.client_id),
        ];

        let response = self
            .http
            .post(&provider_info.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| PortalError::OAuthExchange(format!("token exchange request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PortalError::OAuthExchange(format!(
                "token endpoint returned {status}: {body}"
            ))
            .into());
        }

        let raw: TokenResponse = response.json().await.map_err(|e| {
            PortalError::OAuthExchange(format!("failed to parse token response: {e}"))
        })?;

        Ok(raw.into_grant())
    }

    /// Refreshes an expired grant at the token endpoint.
    async fn refresh_grant(
        &self,
        provider_info: &ProviderInfo,
        refresh_token: &str,
    ) -> Result<OAuthGrant> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.client_id),
        ];

        let response = self
            .http
            .post(&provider_info.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| PortalError::OAuthExchange(format!("refresh request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PortalError::OAuthExchange(format!(
                "refresh token endpoint returned {status}: {body}"
            ))
            .into());
        }

        let raw: TokenResponse = response.json().await.map_err(|e| {
            PortalError::OAuthExchange(format!("failed to parse refresh response: {e}"))
        })?;

        Ok(raw.into_grant())
    }
}

/// Generates a cryptographically random `state` nonce: 16 random bytes,
/// base64url without padding.
fn generate_state() -> String {
    use rand::RngCore as _;
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
