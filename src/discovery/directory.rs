//! Provider and organization lookups over persisted discovery documents
//!
//! The [`ProviderDirectory`] answers the portal's metadata questions from
//! the up-to-three persisted documents: institute-access instances,
//! secure-internet instances, and the organization list. Lookups by base
//! URI are total; an unknown server is synthesized as an `alien` entry
//! rather than an error, because users may add ad-hoc servers that no
//! discovery document knows about.

use crate::discovery::document::{DiscoveryDocument, DisplayName, OrgEntry, ProviderEntry};
use crate::discovery::store::{DiscoverySource, DiscoveryStore};
use crate::error::Result;

// ---------------------------------------------------------------------------
// ServerKind / ServerInfo
// ---------------------------------------------------------------------------

/// Classification of a provider base URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerKind {
    /// Direct single-provider access, no federation.
    InstituteAccess,

    /// A location in the secure-internet federation; authentication may be
    /// delegated to a home provider.
    SecureInternet,

    /// Not present in any discovery document; added ad hoc by the user.
    /// Synthesized, never fetched.
    Alien,
}

/// Resolved metadata for one provider base URI.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    /// The provider's base URI.
    pub base_uri: String,

    /// Display name, plain or localized.
    pub display_name: DisplayName,

    /// How the directory classified this provider.
    pub kind: ServerKind,
}

// ---------------------------------------------------------------------------
// ProviderDirectory
// ---------------------------------------------------------------------------

/// Read-only view over the persisted discovery documents.
///
/// Constructed once per request from the store; the documents it holds were
/// signature-verified before they were ever persisted, so no re-verification
/// happens here.
///
/// # Examples
///
/// ```
/// use vpnportal::discovery::directory::{ProviderDirectory, ServerKind};
/// use vpnportal::discovery::document::DiscoveryDocument;
///
/// let institute = DiscoveryDocument::parse(
///     br#"{"seq": 1, "instances": [
///         {"base_uri": "https://vpn.example.org/", "display_name": "Example"}
///     ]}"#,
/// ).unwrap();
///
/// let directory = ProviderDirectory::from_documents(
///     Some(institute), None, None, "en-US".to_string(),
/// );
///
/// let known = directory.find_provider("https://vpn.example.org/");
/// assert_eq!(known.kind, ServerKind::InstituteAccess);
///
/// // Unknown servers synthesize an alien entry; the lookup is total.
/// let unknown = directory.find_provider("https://other.example.net/");
/// assert_eq!(unknown.kind, ServerKind::Alien);
/// ```
#[derive(Debug, Clone)]
pub struct ProviderDirectory {
    institute_access: Option<DiscoveryDocument>,
    secure_internet: Option<DiscoveryDocument>,
    organizations: Option<DiscoveryDocument>,
    preferred_locale: String,
}

impl ProviderDirectory {
    /// Builds a directory from already-loaded documents.
    pub fn from_documents(
        institute_access: Option<DiscoveryDocument>,
        secure_internet: Option<DiscoveryDocument>,
        organizations: Option<DiscoveryDocument>,
        preferred_locale: String,
    ) -> Self {
        Self {
            institute_access,
            secure_internet,
            organizations,
            preferred_locale,
        }
    }

    /// Loads a directory from the persisted documents of the given sources.
    ///
    /// A source that has never been fetched contributes nothing; the
    /// directory still answers every lookup.
    pub fn load(
        store: &DiscoveryStore,
        institute_access: Option<&DiscoverySource>,
        secure_internet: Option<&DiscoverySource>,
        organizations: Option<&DiscoverySource>,
        preferred_locale: String,
    ) -> Result<Self> {
        let load = |source: Option<&DiscoverySource>| -> Result<Option<DiscoveryDocument>> {
            match source {
                Some(source) => store.load(source),
                None => Ok(None),
            }
        };

        Ok(Self {
            institute_access: load(institute_access)?,
            secure_internet: load(secure_internet)?,
            organizations: load(organizations)?,
            preferred_locale,
        })
    }

    /// The locale tag used to resolve localized display names.
    pub fn preferred_locale(&self) -> &str {
        &self.preferred_locale
    }

    /// Classifies a base URI and returns its metadata.
    ///
    /// Scans institute-access first, then secure-internet; when neither
    /// knows the URI, a synthesized alien entry whose display name is the
    /// base URI itself is returned. This lookup never fails.
    pub fn find_provider(&self, base_uri: &str) -> ServerInfo {
        let documents = [
            (&self.institute_access, ServerKind::InstituteAccess),
            (&self.secure_internet, ServerKind::SecureInternet),
        ];
        for (document, kind) in documents {
            let Some(document) = document else { continue };
            if let Some(entry) = document
                .instances
                .iter()
                .find(|entry| entry.base_uri == base_uri)
            {
                return ServerInfo {
                    base_uri: entry.base_uri.clone(),
                    display_name: entry.display_name.clone(),
                    kind,
                };
            }
        }

        ServerInfo {
            base_uri: base_uri.to_string(),
            display_name: DisplayName::Plain(base_uri.to_string()),
            kind: ServerKind::Alien,
        }
    }

    /// The secure-internet home base URI for an organization id, when the
    /// organization list knows it.
    pub fn organization_home_uri(&self, org_id: &str) -> Option<&str> {
        self.organizations
            .as_ref()?
            .organization_list
            .iter()
            .find(|org| org.org_id == org_id)
            .map(|org| org.secure_internet_home.as_str())
    }

    /// Institute-access entries sorted by resolved display name.
    pub fn institute_access_list(&self) -> Vec<&ProviderEntry> {
        self.sorted_instances(&self.institute_access)
    }

    /// Secure-internet entries sorted by resolved display name.
    pub fn secure_internet_list(&self) -> Vec<&ProviderEntry> {
        self.sorted_instances(&self.secure_internet)
    }

    /// Organization entries sorted by resolved display name.
    pub fn organization_list(&self) -> Vec<&OrgEntry> {
        let Some(document) = &self.organizations else {
            return Vec::new();
        };
        let mut entries: Vec<&OrgEntry> = document.organization_list.iter().collect();
        entries.sort_by(|a, b| {
            Self::sort_key(&a.display_name, &self.preferred_locale)
                .cmp(&Self::sort_key(&b.display_name, &self.preferred_locale))
        });
        entries
    }

    fn sorted_instances<'a>(&'a self, document: &'a Option<DiscoveryDocument>) -> Vec<&'a ProviderEntry> {
        let Some(document) = document else {
            return Vec::new();
        };
        let mut entries: Vec<&ProviderEntry> = document.instances.iter().collect();
        entries.sort_by(|a, b| {
            Self::sort_key(&a.display_name, &self.preferred_locale)
                .cmp(&Self::sort_key(&b.display_name, &self.preferred_locale))
        });
        entries
    }

    // Case-insensitive ordinal comparison key.
    fn sort_key(name: &DisplayName, preferred_locale: &str) -> String {
        name.resolve(preferred_locale).to_lowercase()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
