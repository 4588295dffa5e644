//! Discovery document data model
//!
//! A discovery document is a signed JSON file published by a central
//! authority listing available VPN providers (`instances`) or federated
//! organizations (`organization_list`). Documents are persisted verbatim
//! after verification; this module parses the verified bytes into a typed
//! structure while keeping the exact raw payload alongside so storage never
//! needs to re-serialize.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PortalError, Result};

// ---------------------------------------------------------------------------
// DisplayName
// ---------------------------------------------------------------------------

/// A provider or organization display name.
///
/// Discovery documents publish display names either as a plain string or as
/// a mapping from locale tag to string. The localized form uses a
/// `BTreeMap` so that the "first entry" fallback in [`DisplayName::resolve`]
/// is deterministic across calls.
///
/// # Examples
///
/// ```
/// use vpnportal::discovery::document::DisplayName;
///
/// let plain: DisplayName = serde_json::from_str(r#""Example University""#).unwrap();
/// assert_eq!(plain.resolve("en-US"), "Example University");
///
/// let localized: DisplayName =
///     serde_json::from_str(r#"{"nl-NL": "Voorbeeld", "en-US": "Example"}"#).unwrap();
/// assert_eq!(localized.resolve("nl-NL"), "Voorbeeld");
/// // Unknown preferred locale falls back to the first key in order.
/// assert_eq!(localized.resolve("de-DE"), "Example");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DisplayName {
    /// A single display name used for every locale.
    Plain(String),

    /// Locale tag to display name mapping.
    Localized(BTreeMap<String, String>),
}

impl DisplayName {
    /// Resolves the display name for the preferred locale tag.
    ///
    /// A localized name resolves to the value for `preferred_locale` when
    /// present, otherwise to the first entry in the map's iteration order.
    /// An empty localized map resolves to the empty string.
    pub fn resolve(&self, preferred_locale: &str) -> &str {
        match self {
            DisplayName::Plain(name) => name,
            DisplayName::Localized(map) => map
                .get(preferred_locale)
                .or_else(|| map.values().next())
                .map(String::as_str)
                .unwrap_or(""),
        }
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// One provider instance listed in a discovery document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Absolute HTTPS base URI of the provider, ending in `/`.
    pub base_uri: String,

    /// Display name, plain or localized.
    pub display_name: DisplayName,

    /// Published signing public key for this provider, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// One federated organization listed in an organization-list document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgEntry {
    /// Opaque organization identifier.
    pub org_id: String,

    /// Display name, plain or localized.
    pub display_name: DisplayName,

    /// Base URI of the organization's secure-internet home provider.
    pub secure_internet_home: String,
}

// ---------------------------------------------------------------------------
// DiscoveryDocument
// ---------------------------------------------------------------------------

/// Serde view of the document body; `seq` is mandatory, the entry lists are
/// each optional because provider and organization documents carry only one
/// of them.
#[derive(Debug, Deserialize)]
struct RawDocument {
    seq: u64,
    #[serde(default)]
    instances: Vec<ProviderEntry>,
    #[serde(default)]
    organization_list: Vec<OrgEntry>,
}

/// A parsed, verified discovery document.
///
/// The exact verified byte payload is retained in `raw` and is what gets
/// persisted; the typed fields are a read-only projection of it. `seq` is
/// the anti-rollback counter: it must never decrease across successive
/// fetches from the same source.
///
/// # Examples
///
/// ```
/// use vpnportal::discovery::document::DiscoveryDocument;
///
/// let body = br#"{"seq": 7, "instances": [
///     {"base_uri": "https://vpn.example.org/", "display_name": "Example"}
/// ]}"#;
/// let doc = DiscoveryDocument::parse(body).unwrap();
/// assert_eq!(doc.seq, 7);
/// assert_eq!(doc.instances.len(), 1);
/// assert_eq!(doc.raw_bytes(), body);
/// ```
#[derive(Debug, Clone)]
pub struct DiscoveryDocument {
    /// Monotonically increasing document sequence number.
    pub seq: u64,

    /// Provider instances (empty for organization-list documents).
    pub instances: Vec<ProviderEntry>,

    /// Federated organizations (empty for provider documents).
    pub organization_list: Vec<OrgEntry>,

    raw: Vec<u8>,
}

impl DiscoveryDocument {
    /// Parses a verified document payload.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::MalformedDocument`] when the payload is not
    /// valid JSON or does not carry the required `seq` field.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let parsed: RawDocument = serde_json::from_slice(raw)
            .map_err(|e| PortalError::MalformedDocument(format!("invalid document JSON: {e}")))?;

        Ok(Self {
            seq: parsed.seq,
            instances: parsed.instances,
            organization_list: parsed.organization_list,
            raw: raw.to_vec(),
        })
    }

    /// The exact verified byte payload this document was parsed from.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Maps each instance's host name to its published signing public key.
    ///
    /// Instances without a `public_key` field are skipped. An instance whose
    /// `base_uri` has no parseable host name is rejected rather than
    /// silently dropped, since a key bound to an unidentifiable host is
    /// useless for later verification.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::MalformedDocument`] when a keyed instance has
    /// a `base_uri` without a host name.
    pub fn host_public_keys(&self) -> Result<HashMap<String, String>> {
        let mut key_map = HashMap::new();
        for instance in &self.instances {
            let Some(public_key) = &instance.public_key else {
                continue;
            };
            let host = Url::parse(&instance.base_uri)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .ok_or_else(|| {
                    PortalError::MalformedDocument(format!(
                        "unable to extract host name from base_uri \"{}\"",
                        instance.base_uri
                    ))
                })?;
            key_map.insert(host, public_key.clone());
        }
        Ok(key_map)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // DisplayName
    // -----------------------------------------------------------------------

    #[test]
    fn test_display_name_plain_resolves_to_itself() {
        let name = DisplayName::Plain("Demo Server".to_string());
        assert_eq!(name.resolve("en-US"), "Demo Server");
        assert_eq!(name.resolve("nl-NL"), "Demo Server");
    }

    #[test]
    fn test_display_name_localized_prefers_requested_locale() {
        let mut map = BTreeMap::new();
        map.insert("en-US".to_string(), "Example".to_string());
        map.insert("nl-NL".to_string(), "Voorbeeld".to_string());
        let name = DisplayName::Localized(map);
        assert_eq!(name.resolve("nl-NL"), "Voorbeeld");
    }

    #[test]
    fn test_display_name_localized_falls_back_to_first_key() {
        let mut map = BTreeMap::new();
        map.insert("nl-NL".to_string(), "Voorbeeld".to_string());
        map.insert("nb-NO".to_string(), "Eksempel".to_string());
        let name = DisplayName::Localized(map);
        // "nb-NO" sorts before "nl-NL", so it is the deterministic fallback.
        assert_eq!(name.resolve("de-DE"), "Eksempel");
    }

    #[test]
    fn test_display_name_localized_fallback_is_stable() {
        let mut map = BTreeMap::new();
        map.insert("fr-FR".to_string(), "Exemple".to_string());
        map.insert("en-US".to_string(), "Example".to_string());
        let name = DisplayName::Localized(map);
        let first = name.resolve("xx-XX").to_string();
        for _ in 0..10 {
            assert_eq!(name.resolve("xx-XX"), first);
        }
    }

    #[test]
    fn test_display_name_empty_localized_map_resolves_empty() {
        let name = DisplayName::Localized(BTreeMap::new());
        assert_eq!(name.resolve("en-US"), "");
    }

    #[test]
    fn test_display_name_deserializes_both_shapes() {
        let plain: DisplayName = serde_json::from_str(r#""Plain Name""#).unwrap();
        assert!(matches!(plain, DisplayName::Plain(_)));

        let localized: DisplayName = serde_json::from_str(r#"{"en-US": "Name"}"#).unwrap();
        assert!(matches!(localized, DisplayName::Localized(_)));
    }

    // -----------------------------------------------------------------------
    // DiscoveryDocument::parse
    // -----------------------------------------------------------------------

    #[test]
    fn test_parse_provider_document() {
        let body = br#"{
            "seq": 3,
            "instances": [
                {"base_uri": "https://vpn.example.org/", "display_name": "Example"},
                {"base_uri": "https://vpn.example.net/", "display_name": {"en-US": "Net"}}
            ]
        }"#;
        let doc = DiscoveryDocument::parse(body).unwrap();
        assert_eq!(doc.seq, 3);
        assert_eq!(doc.instances.len(), 2);
        assert!(doc.organization_list.is_empty());
    }

    #[test]
    fn test_parse_organization_document() {
        let body = br#"{
            "seq": 12,
            "organization_list": [
                {
                    "org_id": "https://idp.example.org",
                    "display_name": "Example Org",
                    "secure_internet_home": "https://vpn.example.org/"
                }
            ]
        }"#;
        let doc = DiscoveryDocument::parse(body).unwrap();
        assert_eq!(doc.seq, 12);
        assert!(doc.instances.is_empty());
        assert_eq!(doc.organization_list.len(), 1);
        assert_eq!(
            doc.organization_list[0].secure_internet_home,
            "https://vpn.example.org/"
        );
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        let result = DiscoveryDocument::parse(b"not json at all");
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PortalError>(),
            Some(PortalError::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_parse_rejects_missing_seq() {
        let result = DiscoveryDocument::parse(br#"{"instances": []}"#);
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PortalError>(),
            Some(PortalError::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_raw_bytes_are_kept_verbatim() {
        // Odd whitespace must survive; the raw payload is persisted, never
        // re-serialized.
        let body = b"{\"seq\":1,  \"instances\":[]}\n";
        let doc = DiscoveryDocument::parse(body).unwrap();
        assert_eq!(doc.raw_bytes(), body);
    }

    // -----------------------------------------------------------------------
    // host_public_keys
    // -----------------------------------------------------------------------

    #[test]
    fn test_host_public_keys_maps_host_to_key() {
        let body = br#"{
            "seq": 1,
            "instances": [
                {
                    "base_uri": "https://vpn.example.org/",
                    "display_name": "Example",
                    "public_key": "a2V5MQ=="
                },
                {"base_uri": "https://vpn.example.net/", "display_name": "No Key"}
            ]
        }"#;
        let doc = DiscoveryDocument::parse(body).unwrap();
        let keys = doc.host_public_keys().unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys["vpn.example.org"], "a2V5MQ==");
    }

    #[test]
    fn test_host_public_keys_rejects_hostless_base_uri() {
        let body = br#"{
            "seq": 1,
            "instances": [
                {
                    "base_uri": "not a url",
                    "display_name": "Broken",
                    "public_key": "a2V5MQ=="
                }
            ]
        }"#;
        let doc = DiscoveryDocument::parse(body).unwrap();
        let err = doc.host_public_keys().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PortalError>(),
            Some(PortalError::MalformedDocument(_))
        ));
    }
}
