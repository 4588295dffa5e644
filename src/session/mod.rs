//! Per-user session state
//!
//! The portal is session-scoped: which servers a user added, which
//! secure-internet home they authenticated against, and whether an OAuth
//! redirect is in flight all live here. The host application provides the
//! actual cookie/storage machinery through the [`SessionBackend`] port;
//! this module owns the state itself plus two hardening rules taken from
//! the session layer it fronts: a one-hour identifier canary and
//! domain/path binding.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PortalError, Result};

/// How long a session identifier is used before it is regenerated.
const CANARY_LIFETIME_SECONDS: i64 = 3600;

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Serializable per-user portal state.
///
/// The host persists this through its own session store between requests;
/// every field round-trips through serde. Mutation goes through
/// [`ProfileSession`], which enforces the binding and canary rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    /// Base URI of the home provider the user authenticated against for
    /// secure internet, when any.
    #[serde(default)]
    pub secure_internet_home_base_uri: Option<String>,

    /// Base URI of the currently selected secure-internet location.
    #[serde(default)]
    pub secure_internet_active_base_uri: Option<String>,

    /// Institute-access servers the user added, insertion-ordered, no
    /// duplicates.
    #[serde(default)]
    pub institute_access_servers: Vec<String>,

    /// Ad-hoc servers the user added that no discovery document knows.
    #[serde(default)]
    pub alien_servers: Vec<String>,

    /// Strip UDP remotes from downloaded profile configurations.
    #[serde(default)]
    pub force_tcp: bool,

    /// Base URI an in-flight OAuth redirect was issued for. Set exactly
    /// when a redirect is returned, cleared exactly once at callback entry.
    #[serde(default)]
    pub pending_oauth_base_uri: Option<String>,

    /// When the session identifier was last (re)generated.
    pub canary: DateTime<Utc>,

    /// Cookie domain this session was bound to on first open.
    #[serde(default)]
    pub bound_domain: Option<String>,

    /// Cookie path this session was bound to on first open.
    #[serde(default)]
    pub bound_path: Option<String>,
}

impl SessionState {
    /// A fresh, empty state with the canary set to now.
    pub fn new() -> Self {
        Self {
            secure_internet_home_base_uri: None,
            secure_internet_active_base_uri: None,
            institute_access_servers: Vec::new(),
            alien_servers: Vec::new(),
            force_tcp: false,
            pending_oauth_base_uri: None,
            canary: Utc::now(),
            bound_domain: None,
            bound_path: None,
        }
    }

    /// `true` when the user has added or selected no servers at all.
    pub fn is_empty(&self) -> bool {
        self.secure_internet_home_base_uri.is_none()
            && self.institute_access_servers.is_empty()
            && self.alien_servers.is_empty()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// SessionBackend
// ---------------------------------------------------------------------------

/// Port to the host's session storage.
///
/// The portal never sees cookies or storage; it only asks the host to
/// rotate the opaque session identifier or to destroy the session outright.
pub trait SessionBackend {
    /// Replaces the session identifier, keeping the stored data.
    fn regenerate_identifier(&mut self) -> Result<()>;

    /// Destroys the session and all data stored under it.
    fn destroy(&mut self) -> Result<()>;
}

/// In-process backend for the CLI and for tests.
#[derive(Debug, Default)]
pub struct InMemorySessionBackend {
    identifier: u64,
    destroyed: bool,
}

impl InMemorySessionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current opaque identifier value.
    pub fn identifier(&self) -> u64 {
        self.identifier
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl SessionBackend for InMemorySessionBackend {
    fn regenerate_identifier(&mut self) -> Result<()> {
        use rand::Rng as _;
        self.identifier = rand::rng().random();
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        self.destroyed = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ProfileSession
// ---------------------------------------------------------------------------

/// A [`SessionState`] opened against a backend and a request context.
///
/// # Examples
///
/// ```
/// use vpnportal::session::{InMemorySessionBackend, ProfileSession};
///
/// let backend = InMemorySessionBackend::new();
/// let mut session = ProfileSession::start(backend, "vpn.example.org", "/portal").unwrap();
///
/// session.add_institute_access("https://vpn.example.org/");
/// session.add_institute_access("https://vpn.example.org/");
/// assert_eq!(session.state().institute_access_servers.len(), 1);
/// ```
pub struct ProfileSession<B: SessionBackend> {
    state: SessionState,
    backend: B,
}

impl<B: SessionBackend> ProfileSession<B> {
    /// Starts a brand new session bound to `domain` and `path`.
    ///
    /// The identifier is regenerated immediately so a pre-existing cookie
    /// value can never be fixated onto the new session.
    pub fn start(mut backend: B, domain: &str, path: &str) -> Result<Self> {
        backend.regenerate_identifier()?;
        let mut state = SessionState::new();
        state.bound_domain = Some(domain.to_string());
        state.bound_path = Some(path.to_string());
        Ok(Self { state, backend })
    }

    /// Resumes a persisted session for a request arriving at `domain` and
    /// `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::SessionBinding`] when the stored binding does
    /// not match the request context; the session must not be used further.
    pub fn resume(state: SessionState, mut backend: B, domain: &str, path: &str) -> Result<Self> {
        if let Some(bound) = &state.bound_domain {
            if bound != domain {
                return Err(PortalError::SessionBinding(format!(
                    "session bound to domain \"{bound}\", request for \"{domain}\""
                ))
                .into());
            }
        }
        if let Some(bound) = &state.bound_path {
            if bound != path {
                return Err(PortalError::SessionBinding(format!(
                    "session bound to path \"{bound}\", request for \"{path}\""
                ))
                .into());
            }
        }

        let mut state = state;
        if Utc::now() - state.canary > Duration::seconds(CANARY_LIFETIME_SECONDS) {
            backend.regenerate_identifier()?;
            state.canary = Utc::now();
        }

        Ok(Self { state, backend })
    }

    /// The current state, e.g. for persisting after the request.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Consumes the session, yielding state and backend.
    pub fn into_parts(self) -> (SessionState, B) {
        (self.state, self.backend)
    }

    // -----------------------------------------------------------------------
    // Mutators
    // -----------------------------------------------------------------------

    /// Binds the secure-internet home provider. Set once per authorization;
    /// overwritten only by a later authorization against a different home.
    pub fn set_secure_internet_home(&mut self, base_uri: &str) {
        self.state.secure_internet_home_base_uri = Some(base_uri.to_string());
    }

    /// Selects the active secure-internet location.
    pub fn set_secure_internet_active(&mut self, base_uri: &str) {
        self.state.secure_internet_active_base_uri = Some(base_uri.to_string());
    }

    /// Adds an institute-access server; duplicates are ignored.
    pub fn add_institute_access(&mut self, base_uri: &str) {
        add_unique(&mut self.state.institute_access_servers, base_uri);
    }

    /// Adds an ad-hoc server; duplicates are ignored.
    pub fn add_alien(&mut self, base_uri: &str) {
        add_unique(&mut self.state.alien_servers, base_uri);
    }

    pub fn set_force_tcp(&mut self, force_tcp: bool) {
        self.state.force_tcp = force_tcp;
    }

    /// Records that an OAuth redirect is being issued for `base_uri`.
    pub fn begin_authorization(&mut self, base_uri: &str) {
        self.state.pending_oauth_base_uri = Some(base_uri.to_string());
    }

    /// Takes the pending OAuth base URI, clearing it. The second call after
    /// a single redirect always returns `None`.
    pub fn take_pending_authorization(&mut self) -> Option<String> {
        self.state.pending_oauth_base_uri.take()
    }

    /// Wipes all portal state and regenerates the session identifier.
    ///
    /// This is the only path that resets the identifier together with the
    /// data; the domain/path binding survives since the user is still on
    /// the same deployment.
    pub fn reset(&mut self) -> Result<()> {
        let bound_domain = self.state.bound_domain.take();
        let bound_path = self.state.bound_path.take();
        self.state = SessionState::new();
        self.state.bound_domain = bound_domain;
        self.state.bound_path = bound_path;
        self.backend.regenerate_identifier()?;
        Ok(())
    }
}

fn add_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|existing| existing == value) {
        list.push(value.to_string());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn open_session() -> ProfileSession<InMemorySessionBackend> {
        ProfileSession::start(InMemorySessionBackend::new(), "vpn.example.org", "/portal")
            .expect("start session")
    }

    // -----------------------------------------------------------------------
    // Binding
    // -----------------------------------------------------------------------

    #[test]
    fn test_resume_with_matching_binding_succeeds() {
        let (state, backend) = open_session().into_parts();
        assert!(ProfileSession::resume(state, backend, "vpn.example.org", "/portal").is_ok());
    }

    #[test]
    fn test_resume_with_domain_mismatch_fails() {
        let (state, backend) = open_session().into_parts();
        let err = ProfileSession::resume(state, backend, "evil.example.net", "/portal")
            .err()
            .expect("binding mismatch");
        assert!(matches!(
            err.downcast_ref::<PortalError>(),
            Some(PortalError::SessionBinding(_))
        ));
    }

    #[test]
    fn test_resume_with_path_mismatch_fails() {
        let (state, backend) = open_session().into_parts();
        let err = ProfileSession::resume(state, backend, "vpn.example.org", "/other")
            .err()
            .expect("binding mismatch");
        assert!(matches!(
            err.downcast_ref::<PortalError>(),
            Some(PortalError::SessionBinding(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Canary
    // -----------------------------------------------------------------------

    #[test]
    fn test_fresh_canary_keeps_identifier() {
        let (state, backend) = open_session().into_parts();
        let before = backend.identifier();
        let session =
            ProfileSession::resume(state, backend, "vpn.example.org", "/portal").unwrap();
        let (_, backend) = session.into_parts();
        assert_eq!(backend.identifier(), before);
    }

    #[test]
    fn test_expired_canary_regenerates_identifier() {
        let (mut state, backend) = open_session().into_parts();
        let before = backend.identifier();
        state.canary = Utc::now() - Duration::seconds(CANARY_LIFETIME_SECONDS + 10);

        let session =
            ProfileSession::resume(state, backend, "vpn.example.org", "/portal").unwrap();
        // The canary itself was refreshed too.
        assert!(Utc::now() - session.state().canary < Duration::seconds(5));
        let (_, backend) = session.into_parts();
        assert_ne!(backend.identifier(), before);
    }

    // -----------------------------------------------------------------------
    // Mutators
    // -----------------------------------------------------------------------

    #[test]
    fn test_server_lists_have_set_semantics() {
        let mut session = open_session();
        session.add_institute_access("https://a.example.org/");
        session.add_institute_access("https://b.example.org/");
        session.add_institute_access("https://a.example.org/");
        session.add_alien("https://x.example.net/");
        session.add_alien("https://x.example.net/");

        assert_eq!(
            session.state().institute_access_servers,
            vec!["https://a.example.org/", "https://b.example.org/"]
        );
        assert_eq!(session.state().alien_servers, vec!["https://x.example.net/"]);
    }

    #[test]
    fn test_pending_authorization_cleared_exactly_once() {
        let mut session = open_session();
        session.begin_authorization("https://vpn.example.org/");

        assert_eq!(
            session.take_pending_authorization(),
            Some("https://vpn.example.org/".to_string())
        );
        assert_eq!(session.take_pending_authorization(), None);
    }

    #[test]
    fn test_is_empty_reflects_added_servers() {
        let mut session = open_session();
        assert!(session.state().is_empty());
        session.add_alien("https://x.example.net/");
        assert!(!session.state().is_empty());
    }

    // -----------------------------------------------------------------------
    // Reset
    // -----------------------------------------------------------------------

    #[test]
    fn test_reset_clears_state_and_regenerates_identifier() {
        let mut session = open_session();
        session.add_institute_access("https://a.example.org/");
        session.set_secure_internet_home("https://home.example.org/");
        session.set_force_tcp(true);
        session.begin_authorization("https://a.example.org/");
        let before = session.backend.identifier();

        session.reset().unwrap();

        assert!(session.state().is_empty());
        assert!(!session.state().force_tcp);
        assert!(session.state().pending_oauth_base_uri.is_none());
        // Binding survives the reset.
        assert_eq!(
            session.state().bound_domain.as_deref(),
            Some("vpn.example.org")
        );
        assert_ne!(session.backend.identifier(), before);
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    #[test]
    fn test_state_roundtrips_through_json() {
        let mut state = SessionState::new();
        state.secure_internet_home_base_uri = Some("https://home.example.org/".to_string());
        state.institute_access_servers = vec!["https://a.example.org/".to_string()];
        state.force_tcp = true;

        let json = serde_json::to_string(&state).expect("serialize");
        let restored: SessionState = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(
            restored.secure_internet_home_base_uri,
            state.secure_internet_home_base_uri
        );
        assert_eq!(restored.institute_access_servers, state.institute_access_servers);
        assert!(restored.force_tcp);
    }
}
