//! Portal controller flow tests
//!
//! Exercises the request-level behavior of `src/portal/mod.rs` without a
//! network: input validation happens before any fetch or mutation, session
//! state drives the home page, and the callback path refuses to run without
//! a pending authorization.

use std::collections::HashMap;
use std::sync::Arc;

use vpnportal::discovery::directory::ProviderDirectory;
use vpnportal::discovery::document::DiscoveryDocument;
use vpnportal::error::PortalError;
use vpnportal::oauth::broker::TokenBroker;
use vpnportal::portal::{PortalController, PortalOutcome};
use vpnportal::session::{InMemorySessionBackend, ProfileSession};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const ROOT_URI: &str = "https://portal.example.org/";

fn directory() -> ProviderDirectory {
    let institute = DiscoveryDocument::parse(
        br#"{"seq": 1, "instances": [
            {"base_uri": "https://institute.example.edu/", "display_name": "Example Institute"}
        ]}"#,
    )
    .unwrap();
    let secure = DiscoveryDocument::parse(
        br#"{"seq": 1, "instances": [
            {"base_uri": "https://nl.example.org/", "display_name": "Netherlands"},
            {"base_uri": "https://de.example.org/", "display_name": "Germany"}
        ]}"#,
    )
    .unwrap();
    let orgs = DiscoveryDocument::parse(
        br#"{"seq": 1, "organization_list": [
            {
                "org_id": "https://idp.example.org",
                "display_name": "Example Org",
                "secure_internet_home": "https://nl.example.org/"
            }
        ]}"#,
    )
    .unwrap();

    ProviderDirectory::from_documents(
        Some(institute),
        Some(secure),
        Some(orgs),
        "en-US".to_string(),
    )
}

fn session() -> ProfileSession<InMemorySessionBackend> {
    ProfileSession::start(InMemorySessionBackend::new(), "portal.example.org", "/")
        .expect("start session")
}

fn controller(
    session: ProfileSession<InMemorySessionBackend>,
) -> PortalController<InMemorySessionBackend> {
    let broker = TokenBroker::new(
        Arc::new(reqwest::Client::new()),
        "org.example.portal".to_string(),
        "config".to_string(),
    );
    PortalController::new(
        Arc::new(reqwest::Client::new()),
        directory(),
        broker,
        session,
        ROOT_URI.to_string(),
        "vpnportal".to_string(),
    )
}

fn assert_validation(err: anyhow::Error) {
    assert!(
        matches!(
            err.downcast_ref::<PortalError>(),
            Some(PortalError::Validation(_))
        ),
        "expected a validation error, got: {err}"
    );
}

// ---------------------------------------------------------------------------
// Input validation aborts before any side effect
// ---------------------------------------------------------------------------

/// A `javascript:` pseudo-URI never reaches the network or the session.
#[tokio::test]
async fn test_add_server_rejects_non_https_uri() {
    let mut controller = controller(session());
    let err = controller.add_server("javascript:alert(1)").await.unwrap_err();
    assert_validation(err);
    assert!(controller.session().state().is_empty());
}

#[tokio::test]
async fn test_add_server_rejects_uri_with_path() {
    let mut controller = controller(session());
    let err = controller
        .add_server("https://vpn.example.org/portal/")
        .await
        .unwrap_err();
    assert_validation(err);
}

/// A malformed profile id fails before the keypair request is ever built;
/// no mock server exists here, so reaching the network would surface as a
/// transport error instead.
#[tokio::test]
async fn test_download_profile_rejects_bad_profile_id() {
    let mut controller = controller(session());
    let err = controller
        .download_profile("https://institute.example.edu/", "../../etc/passwd")
        .await
        .unwrap_err();
    assert_validation(err);
}

#[tokio::test]
async fn test_select_organization_rejects_unknown_org() {
    let mut controller = controller(session());
    let err = controller
        .select_organization("https://unknown-idp.example.org")
        .await
        .unwrap_err();
    assert_validation(err);
}

// ---------------------------------------------------------------------------
// Home page and navigation
// ---------------------------------------------------------------------------

/// An empty session is sent to the server chooser instead of an empty home.
#[test]
fn test_home_redirects_to_chooser_when_empty() {
    let controller = controller(session());
    match controller.home() {
        PortalOutcome::Redirect(uri) => {
            assert_eq!(uri, format!("{ROOT_URI}choose_server"));
        }
        PortalOutcome::Page(_) => panic!("expected a redirect to the chooser"),
    }
}

/// Added servers appear on the home page with their directory display
/// names; unknown servers fall back to the base URI.
#[test]
fn test_home_lists_added_servers() {
    let mut session = session();
    session.add_institute_access("https://institute.example.edu/");
    session.add_alien("https://adhoc.example.net/");
    let controller = controller(session);

    let PortalOutcome::Page(view) = controller.home() else {
        panic!("expected the home page");
    };
    assert_eq!(view.institute_access.len(), 1);
    assert_eq!(view.institute_access[0].display_name, "Example Institute");
    assert_eq!(view.alien[0].display_name, "https://adhoc.example.net/");
    assert!(view.secure_internet.is_none());
}

#[test]
fn test_choose_server_lists_directory_entries() {
    let controller = controller(session());
    let view = controller.choose_server();
    assert_eq!(view.institute_access.len(), 1);
    assert!(view.secure_internet_available);
}

#[test]
fn test_switch_location_view_sorted_by_display_name() {
    let controller = controller(session());
    let view = controller.switch_location_view();
    let names: Vec<&str> = view
        .locations
        .iter()
        .map(|entry| entry.display_name.as_str())
        .collect();
    assert_eq!(names, vec!["Germany", "Netherlands"]);
}

// ---------------------------------------------------------------------------
// Location switching
// ---------------------------------------------------------------------------

#[test]
fn test_switch_location_requires_home_binding() {
    let mut controller = controller(session());
    let err = controller.switch_location("https://de.example.org/").unwrap_err();
    assert_validation(err);
}

#[test]
fn test_switch_location_rejects_non_secure_internet_target() {
    let mut session = session();
    session.set_secure_internet_home("https://nl.example.org/");
    let mut controller = controller(session);

    let err = controller
        .switch_location("https://institute.example.edu/")
        .unwrap_err();
    assert_validation(err);
}

/// With a home binding, switching to another listed location mutates only
/// the active selection; no new authorization is involved.
#[test]
fn test_switch_location_updates_active_selection() {
    let mut session = session();
    session.set_secure_internet_home("https://nl.example.org/");
    session.set_secure_internet_active("https://nl.example.org/");
    let mut controller = controller(session);

    let redirect = controller.switch_location("https://de.example.org/").unwrap();
    assert_eq!(redirect, format!("{ROOT_URI}home"));
    assert_eq!(
        controller
            .session()
            .state()
            .secure_internet_active_base_uri
            .as_deref(),
        Some("https://de.example.org/")
    );
    // The home binding is untouched.
    assert_eq!(
        controller
            .session()
            .state()
            .secure_internet_home_base_uri
            .as_deref(),
        Some("https://nl.example.org/")
    );
}

// ---------------------------------------------------------------------------
// Settings, callback, reset
// ---------------------------------------------------------------------------

#[test]
fn test_save_settings_toggles_force_tcp() {
    let mut controller = controller(session());
    controller.save_settings(true);
    assert!(controller.session().state().force_tcp);
    controller.save_settings(false);
    assert!(!controller.session().state().force_tcp);
}

/// A callback with nothing pending is an OAuth exchange failure, and a
/// second attempt finds the same empty state.
#[tokio::test]
async fn test_callback_without_pending_authorization_fails() {
    let mut controller = controller(session());
    let params = HashMap::from([
        ("code".to_string(), "abc".to_string()),
        ("state".to_string(), "xyz".to_string()),
    ]);

    let err = controller.handle_callback(&params).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PortalError>(),
        Some(PortalError::OAuthExchange(_))
    ));
    assert!(controller.session().state().is_empty());
}

#[test]
fn test_reset_app_data_clears_session() {
    let mut session = session();
    session.add_institute_access("https://institute.example.edu/");
    session.set_force_tcp(true);
    let mut controller = controller(session);

    let redirect = controller.reset_app_data().unwrap();
    assert_eq!(redirect, format!("{ROOT_URI}home"));
    assert!(controller.session().state().is_empty());
    assert!(!controller.session().state().force_tcp);
}
