//! View data handed to the external renderer
//!
//! The portal produces no markup; each use-case yields one of these plain
//! serializable structs and the host's templating collaborator turns it
//! into a page. Display names arrive already resolved for the configured
//! locale.

use serde::Serialize;

/// One provider row in a server list.
#[derive(Debug, Clone, Serialize)]
pub struct ServerListEntry {
    pub base_uri: String,
    pub display_name: String,
}

/// One organization row in the organization chooser.
#[derive(Debug, Clone, Serialize)]
pub struct OrganizationListEntry {
    pub org_id: String,
    pub display_name: String,
}

/// The active secure-internet selection shown on the home page.
#[derive(Debug, Clone, Serialize)]
pub struct SecureInternetView {
    /// Home provider the user authenticated against.
    pub home_base_uri: String,

    /// Currently selected location.
    pub active_base_uri: String,
    pub active_display_name: String,
}

/// The home page: everything the user has added or selected.
#[derive(Debug, Clone, Serialize)]
pub struct HomeView {
    pub institute_access: Vec<ServerListEntry>,
    pub alien: Vec<ServerListEntry>,
    pub secure_internet: Option<SecureInternetView>,
    pub force_tcp: bool,
}

/// The add-a-server chooser, listing every known institute-access provider.
#[derive(Debug, Clone, Serialize)]
pub struct ChooseServerView {
    pub institute_access: Vec<ServerListEntry>,

    /// Whether an organization list is available, so the chooser can offer
    /// the secure-internet path at all.
    pub secure_internet_available: bool,
}

/// The secure-internet location switcher.
#[derive(Debug, Clone, Serialize)]
pub struct SwitchLocationView {
    pub locations: Vec<ServerListEntry>,
}

/// The organization chooser for secure-internet onboarding.
#[derive(Debug, Clone, Serialize)]
pub struct ChooseOrganizationView {
    pub organizations: Vec<OrganizationListEntry>,
}

/// One VPN profile offered by a provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileEntry {
    pub profile_id: String,
    pub display_name: String,
}

/// The profile page for one provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileListView {
    pub base_uri: String,
    pub display_name: String,
    pub profiles: Vec<ProfileEntry>,

    /// Informational messages published by the provider.
    pub messages: Vec<String>,
}

/// A downloadable OpenVPN configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileDownload {
    /// Attachment file name, ending in `.ovpn`.
    pub file_name: String,

    /// Complete configuration text, certificate and key included.
    pub content: String,
}
