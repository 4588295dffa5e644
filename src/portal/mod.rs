//! Portal use-cases
//!
//! [`PortalController`] composes the discovery directory, the token broker,
//! and the profile session into the handful of things a user can do: list
//! and add servers, walk through an OAuth authorization, fetch the profile
//! list, and download a VPN configuration. Rendering, routing, and cookie
//! plumbing stay outside; each use-case returns either typed view data or
//! a redirect target.
//!
//! Untrusted inputs used to build URLs (`base_uri`, `profile_id`) are
//! validated against strict allow-list patterns before any network call or
//! session mutation.

pub mod views;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use url::Url;

use crate::discovery::directory::{ProviderDirectory, ServerKind};
use crate::error::{PortalError, Result};
use crate::oauth::broker::{ApiOutcome, ApiResponse, TokenBroker};
use crate::oauth::provider_info::{self, ProviderInfo};
use crate::session::{ProfileSession, SessionBackend};
use self::views::{
    ChooseOrganizationView, ChooseServerView, HomeView, OrganizationListEntry, ProfileDownload,
    ProfileEntry, ProfileListView, SecureInternetView, ServerListEntry, SwitchLocationView,
};

// ---------------------------------------------------------------------------
// Input validation
// ---------------------------------------------------------------------------

/// Validates a provider base URI: `https://`, host of letters, digits,
/// hyphens and dots, trailing slash, nothing else.
///
/// # Errors
///
/// Returns [`PortalError::Validation`] for anything that does not match;
/// no coercion is attempted.
pub fn validate_base_uri(base_uri: &str) -> Result<()> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^https://[A-Za-z0-9\-.]+/$").expect("base URI pattern compiles")
    });
    if pattern.is_match(base_uri) {
        Ok(())
    } else {
        Err(PortalError::Validation(format!("invalid base URI \"{base_uri}\"")).into())
    }
}

/// Validates a profile identifier: letters, digits, hyphens and dots only.
///
/// # Errors
///
/// Returns [`PortalError::Validation`] on any other character.
pub fn validate_profile_id(profile_id: &str) -> Result<()> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9\-.]+$").expect("profile id pattern compiles"));
    if pattern.is_match(profile_id) {
        Ok(())
    } else {
        Err(PortalError::Validation(format!("invalid profile id \"{profile_id}\"")).into())
    }
}

// ---------------------------------------------------------------------------
// PortalOutcome
// ---------------------------------------------------------------------------

/// What a use-case hands back to the host: a page to render or a redirect.
#[derive(Debug)]
pub enum PortalOutcome<V> {
    /// Render this view.
    Page(V),

    /// Send the user to this URI. Used both for in-portal navigation and
    /// for OAuth authorization redirects.
    Redirect(String),
}

// ---------------------------------------------------------------------------
// PortalController
// ---------------------------------------------------------------------------

/// Session-scoped orchestration of directory, broker, and session.
///
/// One controller per request; the host persists the session state and the
/// broker's grants and pending authorizations between requests.
pub struct PortalController<B: SessionBackend> {
    http: Arc<reqwest::Client>,
    directory: ProviderDirectory,
    broker: TokenBroker,
    session: ProfileSession<B>,
    /// Deployment root, trailing slash included; the OAuth callback lives
    /// at `<root_uri>callback`.
    root_uri: String,
    /// Name under which issued client certificates are registered.
    app_display_name: String,
}

impl<B: SessionBackend> PortalController<B> {
    pub fn new(
        http: Arc<reqwest::Client>,
        directory: ProviderDirectory,
        broker: TokenBroker,
        session: ProfileSession<B>,
        root_uri: String,
        app_display_name: String,
    ) -> Self {
        Self {
            http,
            directory,
            broker,
            session,
            root_uri,
            app_display_name,
        }
    }

    /// The session, e.g. for persisting its state after the request.
    pub fn session(&self) -> &ProfileSession<B> {
        &self.session
    }

    /// The broker, e.g. for persisting its grants and pending
    /// authorizations after the request.
    pub fn broker(&self) -> &TokenBroker {
        &self.broker
    }

    fn redirect_uri(&self) -> String {
        format!("{}callback", self.root_uri)
    }

    fn page_uri(&self, page: &str) -> String {
        format!("{}{page}", self.root_uri)
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// The home page, or a redirect to the server chooser when the user has
    /// nothing configured yet.
    pub fn home(&self) -> PortalOutcome<HomeView> {
        if self.session.state().is_empty() {
            return PortalOutcome::Redirect(self.page_uri("choose_server"));
        }

        let locale = self.directory.preferred_locale().to_string();
        let resolve = |base_uri: &String| ServerListEntry {
            base_uri: base_uri.clone(),
            display_name: self
                .directory
                .find_provider(base_uri)
                .display_name
                .resolve(&locale)
                .to_string(),
        };

        let state = self.session.state();
        let secure_internet = match (
            &state.secure_internet_home_base_uri,
            &state.secure_internet_active_base_uri,
        ) {
            (Some(home), Some(active)) => Some(SecureInternetView {
                home_base_uri: home.clone(),
                active_base_uri: active.clone(),
                active_display_name: self
                    .directory
                    .find_provider(active)
                    .display_name
                    .resolve(&locale)
                    .to_string(),
            }),
            _ => None,
        };

        PortalOutcome::Page(HomeView {
            institute_access: state.institute_access_servers.iter().map(&resolve).collect(),
            alien: state.alien_servers.iter().map(&resolve).collect(),
            secure_internet,
            force_tcp: state.force_tcp,
        })
    }

    /// The add-a-server chooser.
    pub fn choose_server(&self) -> ChooseServerView {
        let locale = self.directory.preferred_locale();
        ChooseServerView {
            institute_access: self
                .directory
                .institute_access_list()
                .into_iter()
                .map(|entry| ServerListEntry {
                    base_uri: entry.base_uri.clone(),
                    display_name: entry.display_name.resolve(locale).to_string(),
                })
                .collect(),
            secure_internet_available: !self.directory.organization_list().is_empty(),
        }
    }

    /// The secure-internet location switcher.
    pub fn switch_location_view(&self) -> SwitchLocationView {
        let locale = self.directory.preferred_locale();
        SwitchLocationView {
            locations: self
                .directory
                .secure_internet_list()
                .into_iter()
                .map(|entry| ServerListEntry {
                    base_uri: entry.base_uri.clone(),
                    display_name: entry.display_name.resolve(locale).to_string(),
                })
                .collect(),
        }
    }

    /// The organization chooser for secure-internet onboarding.
    pub fn choose_organization(&self) -> ChooseOrganizationView {
        let locale = self.directory.preferred_locale();
        ChooseOrganizationView {
            organizations: self
                .directory
                .organization_list()
                .into_iter()
                .map(|org| OrganizationListEntry {
                    org_id: org.org_id.clone(),
                    display_name: org.display_name.resolve(locale).to_string(),
                })
                .collect(),
        }
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Adds a server by base URI.
    ///
    /// The session is only mutated once the provider proves reachable and
    /// authorized; until then the user is redirected to the authorization
    /// endpoint with the pending base URI recorded.
    pub async fn add_server(&mut self, base_uri: &str) -> Result<String> {
        validate_base_uri(base_uri)?;

        match self
            .oauth_call(base_uri, reqwest::Method::GET, "user_info", &[])
            .await?
        {
            ApiOutcome::AuthorizationRequired { authorize_uri } => Ok(authorize_uri),
            ApiOutcome::Response(response) if response.is_okay() => {
                self.record_server(base_uri);
                Ok(self.page_uri("home"))
            }
            ApiOutcome::Response(response) => Err(PortalError::Transport(format!(
                "user_info at \"{base_uri}\" returned status {}",
                response.status()
            ))
            .into()),
        }
    }

    /// Adds an ad-hoc server by bare hostname, normalized to
    /// `https://<hostname>/`.
    pub async fn add_other_server(&mut self, hostname: &str) -> Result<String> {
        let base_uri = format!("https://{hostname}/");
        self.add_server(&base_uri).await
    }

    /// Starts secure-internet onboarding for an organization.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::Validation`] when the organization id is not
    /// in the organization list; arbitrary ids never reach the network.
    pub async fn select_organization(&mut self, org_id: &str) -> Result<String> {
        let home_uri = self
            .directory
            .organization_home_uri(org_id)
            .ok_or_else(|| PortalError::Validation(format!("unknown organization \"{org_id}\"")))?
            .to_string();

        self.add_server(&home_uri).await
    }

    /// Switches the active secure-internet location.
    ///
    /// No new authorization is needed: the grant is keyed by the home
    /// provider and already covers every location.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::Validation`] when the URI is malformed, is not
    /// a secure-internet location, or no home binding exists yet.
    pub fn switch_location(&mut self, base_uri: &str) -> Result<String> {
        validate_base_uri(base_uri)?;

        if self.session.state().secure_internet_home_base_uri.is_none() {
            return Err(PortalError::Validation(
                "no secure internet home provider bound to this session".to_string(),
            )
            .into());
        }
        if self.directory.find_provider(base_uri).kind != ServerKind::SecureInternet {
            return Err(PortalError::Validation(format!(
                "\"{base_uri}\" is not a secure internet location"
            ))
            .into());
        }

        self.session.set_secure_internet_active(base_uri);
        Ok(self.page_uri("home"))
    }

    /// Saves user settings.
    pub fn save_settings(&mut self, force_tcp: bool) -> String {
        self.session.set_force_tcp(force_tcp);
        self.page_uri("home")
    }

    /// Wipes all portal state for this user.
    pub fn reset_app_data(&mut self) -> Result<String> {
        self.session.reset()?;
        tracing::info!("session state reset");
        Ok(self.page_uri("home"))
    }

    // -----------------------------------------------------------------------
    // Provider API use-cases
    // -----------------------------------------------------------------------

    /// Fetches the profile list and provider messages for one server.
    pub async fn profile_list(&mut self, base_uri: &str) -> Result<PortalOutcome<ProfileListView>> {
        validate_base_uri(base_uri)?;

        let response = match self
            .oauth_call(base_uri, reqwest::Method::GET, "profile_list", &[])
            .await?
        {
            ApiOutcome::AuthorizationRequired { authorize_uri } => {
                return Ok(PortalOutcome::Redirect(authorize_uri))
            }
            ApiOutcome::Response(response) => response,
        };
        let profiles = api_data(&response, "profile_list")?
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .filter_map(|profile| {
                Some(ProfileEntry {
                    profile_id: profile.get("profile_id")?.as_str()?.to_string(),
                    display_name: profile
                        .get("display_name")
                        .and_then(|name| name.as_str())
                        .unwrap_or_default()
                        .to_string(),
                })
            })
            .collect();

        let messages = match self
            .oauth_call(base_uri, reqwest::Method::GET, "system_messages", &[])
            .await?
        {
            ApiOutcome::Response(response) if response.is_okay() => {
                api_data(&response, "system_messages")?
                    .as_array()
                    .cloned()
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|entry| Some(entry.get("message")?.as_str()?.to_string()))
                    .collect()
            }
            _ => Vec::new(),
        };

        let locale = self.directory.preferred_locale();
        let display_name = self
            .directory
            .find_provider(base_uri)
            .display_name
            .resolve(locale)
            .to_string();

        Ok(PortalOutcome::Page(ProfileListView {
            base_uri: base_uri.to_string(),
            display_name,
            profiles,
            messages,
        }))
    }

    /// Creates a keypair and downloads the configuration for one profile.
    ///
    /// When the session has `force_tcp` set, every `remote` line carrying a
    /// UDP endpoint is stripped before the certificate and key are appended.
    pub async fn download_profile(
        &mut self,
        base_uri: &str,
        profile_id: &str,
    ) -> Result<PortalOutcome<ProfileDownload>> {
        validate_base_uri(base_uri)?;
        validate_profile_id(profile_id)?;

        let app_display_name = self.app_display_name.clone();
        let keypair = match self
            .oauth_call(
                base_uri,
                reqwest::Method::POST,
                "create_keypair",
                &[("display_name", app_display_name.as_str())],
            )
            .await?
        {
            ApiOutcome::AuthorizationRequired { authorize_uri } => {
                return Ok(PortalOutcome::Redirect(authorize_uri))
            }
            ApiOutcome::Response(response) => api_data(&response, "create_keypair")?,
        };

        let certificate = keypair
            .get("certificate")
            .and_then(|value| value.as_str())
            .ok_or_else(|| {
                PortalError::MalformedDocument("create_keypair lacks a certificate".to_string())
            })?
            .to_string();
        let private_key = keypair
            .get("private_key")
            .and_then(|value| value.as_str())
            .ok_or_else(|| {
                PortalError::MalformedDocument("create_keypair lacks a private key".to_string())
            })?
            .to_string();

        let config = match self
            .oauth_call(
                base_uri,
                reqwest::Method::GET,
                "profile_config",
                &[("profile_id", profile_id)],
            )
            .await?
        {
            ApiOutcome::AuthorizationRequired { authorize_uri } => {
                return Ok(PortalOutcome::Redirect(authorize_uri))
            }
            ApiOutcome::Response(response) if response.is_okay() => response.text(),
            ApiOutcome::Response(response) => {
                return Err(PortalError::Transport(format!(
                    "profile_config returned status {}",
                    response.status()
                ))
                .into())
            }
        };

        let config = if self.session.state().force_tcp {
            strip_udp_remotes(&config)
        } else {
            config
        };
        let content = append_certificate(&config, &certificate, &private_key);

        let host = Url::parse(base_uri)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .ok_or_else(|| PortalError::Validation(format!("invalid base URI \"{base_uri}\"")))?;

        Ok(PortalOutcome::Page(ProfileDownload {
            file_name: format!("{host}_{profile_id}.ovpn"),
            content,
        }))
    }

    // -----------------------------------------------------------------------
    // OAuth callback
    // -----------------------------------------------------------------------

    /// Completes an OAuth authorization redirect.
    ///
    /// The pending base URI is consumed first, before anything else can
    /// fail, so a replayed callback finds nothing pending. On success the
    /// server is classified and recorded in the session; any failure leaves
    /// the session's server lists untouched.
    pub async fn handle_callback(
        &mut self,
        callback_params: &HashMap<String, String>,
    ) -> Result<String> {
        let base_uri = self.session.take_pending_authorization().ok_or_else(|| {
            PortalError::OAuthExchange("no authorization pending for this session".to_string())
        })?;

        let (identity, provider_info) = self.resolve_endpoints(&base_uri).await?;
        let redirect_uri = self.redirect_uri();
        self.broker
            .handle_callback(&identity, &provider_info, callback_params, &redirect_uri)
            .await?;

        self.record_server(&base_uri);
        Ok(self.page_uri("home"))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Classifies and stores a server the user is now authorized against.
    fn record_server(&mut self, base_uri: &str) {
        match self.directory.find_provider(base_uri).kind {
            ServerKind::SecureInternet => {
                // First authorization against a location also makes it the
                // home; the grant identity already points there.
                if self.session.state().secure_internet_home_base_uri.is_none() {
                    self.session.set_secure_internet_home(base_uri);
                }
                self.session.set_secure_internet_active(base_uri);
            }
            ServerKind::InstituteAccess => self.session.add_institute_access(base_uri),
            ServerKind::Alien => self.session.add_alien(base_uri),
        }
    }

    /// Resolves the grant identity and effective endpoints for a target,
    /// applying the secure-internet home indirection.
    async fn resolve_endpoints(&self, target_base_uri: &str) -> Result<(String, ProviderInfo)> {
        let kind = self.directory.find_provider(target_base_uri).kind;
        let identity =
            TokenBroker::resolve_identity(target_base_uri, kind, self.session.state());

        let target_info = provider_info::fetch(&self.http, target_base_uri).await?;
        if identity == target_base_uri {
            return Ok((identity, target_info));
        }

        // Federated: API calls go to the target, OAuth goes to the home.
        let home_info = provider_info::fetch(&self.http, &identity).await?;
        Ok((identity, target_info.with_authorization_from(&home_info)))
    }

    /// Performs one authenticated provider API call, recording the pending
    /// authorization when a redirect is needed.
    async fn oauth_call(
        &mut self,
        target_base_uri: &str,
        method: reqwest::Method,
        api_path: &str,
        params: &[(&str, &str)],
    ) -> Result<ApiOutcome> {
        let (identity, provider_info) = self.resolve_endpoints(target_base_uri).await?;
        let redirect_uri = self.redirect_uri();

        let outcome = self
            .broker
            .call(&identity, &provider_info, method, api_path, params, &redirect_uri)
            .await?;

        if let ApiOutcome::AuthorizationRequired { .. } = &outcome {
            self.session.begin_authorization(target_base_uri);
        }
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Response unwrapping / config transforms
// ---------------------------------------------------------------------------

/// Unwraps the `{"<call>": {"ok": true, "data": ...}}` envelope of provider
/// API responses.
fn api_data(response: &ApiResponse, call_name: &str) -> Result<serde_json::Value> {
    if !response.is_okay() {
        return Err(PortalError::Transport(format!(
            "{call_name} returned status {}",
            response.status()
        ))
        .into());
    }

    let body = response.json()?;
    let envelope = body.get(call_name).ok_or_else(|| {
        PortalError::MalformedDocument(format!("response lacks the \"{call_name}\" envelope"))
    })?;
    if envelope.get("ok").and_then(|ok| ok.as_bool()) != Some(true) {
        return Err(
            PortalError::MalformedDocument(format!("{call_name} reported not ok")).into(),
        );
    }

    envelope.get("data").cloned().ok_or_else(|| {
        PortalError::MalformedDocument(format!("{call_name} response lacks data")).into()
    })
}

/// Removes every `remote` line with a UDP endpoint from an OpenVPN config.
///
/// Purely textual: lines starting with `remote ` and containing `udp` are
/// dropped, all other lines keep their order, and the file's line-ending
/// style is preserved.
pub fn strip_udp_remotes(config: &str) -> String {
    let eol = if config.contains("\r\n") { "\r\n" } else { "\n" };
    let kept: Vec<&str> = config
        .split(eol)
        .filter(|line| !(line.starts_with("remote ") && line.contains("udp")))
        .collect();
    kept.join(eol)
}

/// Appends the inline `<cert>`/`<key>` block after the configuration body.
pub fn append_certificate(config: &str, certificate: &str, private_key: &str) -> String {
    let eol = if config.contains("\r\n") { "\r\n" } else { "\n" };
    let body = config.trim_end_matches(eol);
    format!(
        "{body}{eol}<cert>{eol}{certificate}{eol}</cert>{eol}<key>{eol}{private_key}{eol}</key>{eol}"
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
