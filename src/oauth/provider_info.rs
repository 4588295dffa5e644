//! Live provider endpoint discovery
//!
//! Every provider publishes its OAuth endpoints and API base URI at
//! `<baseUri>info.json` under the versioned key
//! `api["http://eduvpn.org/api#2"]`. The result is a short-lived lookup,
//! fetched per request and never persisted; callers may add caching without
//! changing this contract.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{PortalError, Result};

/// JSON key selecting the supported API version inside `info.json`.
pub const API_DOCUMENT_KEY: &str = "http://eduvpn.org/api#2";

/// OAuth and API endpoints for one provider.
///
/// # Examples
///
/// ```
/// use vpnportal::oauth::provider_info::ProviderInfo;
///
/// let json = r#"{
///     "authorization_endpoint": "https://vpn.example.org/portal/_oauth/authorize",
///     "token_endpoint": "https://vpn.example.org/portal/oauth.php/token",
///     "api_base_uri": "https://vpn.example.org/portal/api.php"
/// }"#;
/// let info: ProviderInfo = serde_json::from_str(json).unwrap();
/// assert!(info.token_endpoint.ends_with("/token"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// The OAuth authorization endpoint.
    pub authorization_endpoint: String,

    /// The OAuth token endpoint.
    pub token_endpoint: String,

    /// Base URI for authenticated provider API calls.
    pub api_base_uri: String,
}

impl ProviderInfo {
    /// Returns a copy whose OAuth endpoints come from `home`, keeping this
    /// provider's `api_base_uri`.
    ///
    /// This is the secure-internet indirection: API calls still target the
    /// location provider, but authorization and token exchange happen
    /// against the home provider that issued the user's identity.
    pub fn with_authorization_from(&self, home: &ProviderInfo) -> ProviderInfo {
        ProviderInfo {
            authorization_endpoint: home.authorization_endpoint.clone(),
            token_endpoint: home.token_endpoint.clone(),
            api_base_uri: self.api_base_uri.clone(),
        }
    }
}

/// Shape of the `info.json` document: versioned API entries keyed by URI.
#[derive(Debug, Deserialize)]
struct InfoDocument {
    api: HashMap<String, ProviderInfo>,
}

/// Fetches `<base_uri>info.json` and extracts the supported API entry.
///
/// # Errors
///
/// - [`PortalError::Transport`] when the fetch fails or returns non-2xx.
/// - [`PortalError::MalformedDocument`] when the body does not parse or
///   lacks the [`API_DOCUMENT_KEY`] entry.
pub async fn fetch(http: &reqwest::Client, base_uri: &str) -> Result<ProviderInfo> {
    let info_url = format!("{base_uri}info.json");

    let response = http
        .get(&info_url)
        .send()
        .await
        .map_err(|e| PortalError::Transport(format!("unable to fetch \"{info_url}\": {e}")))?;

    if !response.status().is_success() {
        return Err(PortalError::Transport(format!(
            "unable to fetch \"{}\": status {}",
            info_url,
            response.status()
        ))
        .into());
    }

    let document: InfoDocument = response.json().await.map_err(|e| {
        PortalError::MalformedDocument(format!("invalid provider info at \"{info_url}\": {e}"))
    })?;

    document
        .api
        .get(API_DOCUMENT_KEY)
        .cloned()
        .ok_or_else(|| {
            PortalError::MalformedDocument(format!(
                "provider info at \"{info_url}\" lacks the \"{API_DOCUMENT_KEY}\" entry"
            ))
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_info_deserializes_from_info_document() {
        let json = r#"{
            "api": {
                "http://eduvpn.org/api#2": {
                    "authorization_endpoint": "https://vpn.example.org/authorize",
                    "token_endpoint": "https://vpn.example.org/token",
                    "api_base_uri": "https://vpn.example.org/api"
                }
            }
        }"#;
        let document: InfoDocument = serde_json::from_str(json).unwrap();
        let info = document.api.get(API_DOCUMENT_KEY).unwrap();
        assert_eq!(info.api_base_uri, "https://vpn.example.org/api");
    }

    #[test]
    fn test_with_authorization_from_splices_home_endpoints() {
        let target = ProviderInfo {
            authorization_endpoint: "https://location.example.org/authorize".to_string(),
            token_endpoint: "https://location.example.org/token".to_string(),
            api_base_uri: "https://location.example.org/api".to_string(),
        };
        let home = ProviderInfo {
            authorization_endpoint: "https://home.example.org/authorize".to_string(),
            token_endpoint: "https://home.example.org/token".to_string(),
            api_base_uri: "https://home.example.org/api".to_string(),
        };

        let resolved = target.with_authorization_from(&home);
        assert_eq!(
            resolved.authorization_endpoint,
            "https://home.example.org/authorize"
        );
        assert_eq!(resolved.token_endpoint, "https://home.example.org/token");
        // API calls still go to the location, not the home.
        assert_eq!(resolved.api_base_uri, "https://location.example.org/api");
    }
}
