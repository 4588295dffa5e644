//! Configuration management
//!
//! This module handles loading, parsing, and validating the YAML
//! configuration: OAuth client settings, the configured discovery sources
//! with their trust anchors, and HTTP client behavior.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::discovery::store::DiscoverySource;
use crate::error::{PortalError, Result};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// OAuth client settings used against every provider.
    pub oauth: OAuthConfig,

    /// Portal deployment settings.
    pub portal: PortalConfig,

    /// Discovery sources and cache location.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Outbound HTTP behavior.
    #[serde(default)]
    pub http: HttpConfig,
}

/// OAuth client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Client identifier registered with the providers.
    pub client_id: String,

    /// Scope requested in every authorization.
    #[serde(default = "default_request_scope")]
    pub request_scope: String,
}

fn default_request_scope() -> String {
    "config".to_string()
}

/// Portal deployment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Public root URI of this deployment, trailing slash included. The
    /// OAuth callback is `<root_uri>callback`.
    pub root_uri: String,

    /// Name under which issued client certificates are registered.
    #[serde(default = "default_app_display_name")]
    pub app_display_name: String,
}

fn default_app_display_name() -> String {
    "vpnportal".to_string()
}

/// One discovery source: document URL plus the base64 Ed25519 public key
/// that signs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub url: Url,
    pub public_key: String,
}

impl SourceConfig {
    /// The runtime source value used by the fetcher and store.
    pub fn to_source(&self) -> DiscoverySource {
        DiscoverySource {
            url: self.url.clone(),
            public_key: self.public_key.clone(),
        }
    }
}

/// Discovery sources and cache location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Institute-access instance list source.
    #[serde(default)]
    pub institute_access: Option<SourceConfig>,

    /// Secure-internet instance list source.
    #[serde(default)]
    pub secure_internet: Option<SourceConfig>,

    /// Organization list source.
    #[serde(default)]
    pub organization_list: Option<SourceConfig>,

    /// Where verified documents are cached. Defaults to the platform data
    /// directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Locale tag used to resolve localized display names.
    #[serde(default = "default_preferred_locale")]
    pub preferred_locale: String,
}

fn default_preferred_locale() -> String {
    "en-US".to_string()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            institute_access: None,
            secure_internet: None,
            organization_list: None,
            data_dir: None,
            preferred_locale: default_preferred_locale(),
        }
    }
}

impl DiscoveryConfig {
    /// The effective cache directory.
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        directories::ProjectDirs::from("org", "vpnportal", "vpnportal")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Every configured source, in fetch order.
    pub fn sources(&self) -> Vec<DiscoverySource> {
        [
            &self.institute_access,
            &self.secure_internet,
            &self.organization_list,
        ]
        .into_iter()
        .flatten()
        .map(SourceConfig::to_source)
        .collect()
    }
}

/// Outbound HTTP behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Timeout applied to every outbound request.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    10
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Config {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::Config`] when the file cannot be read and
    /// [`PortalError::Yaml`] when it does not parse.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            return Err(PortalError::Config(format!("config file not found at {path}")).into());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PortalError::Config(format!("failed to read config file: {e}")))?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.oauth.client_id.is_empty() {
            return Err(PortalError::Config("client_id cannot be empty".to_string()).into());
        }
        if self.oauth.request_scope.is_empty() {
            return Err(PortalError::Config("request_scope cannot be empty".to_string()).into());
        }
        if !self.portal.root_uri.starts_with("https://") || !self.portal.root_uri.ends_with('/') {
            return Err(PortalError::Config(format!(
                "root_uri must be an https URI with a trailing slash, got \"{}\"",
                self.portal.root_uri
            ))
            .into());
        }
        if self.http.timeout_seconds == 0 {
            return Err(
                PortalError::Config("timeout_seconds must be greater than 0".to_string()).into(),
            );
        }

        for source in [
            &self.discovery.institute_access,
            &self.discovery.secure_internet,
            &self.discovery.organization_list,
        ]
        .into_iter()
        .flatten()
        {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(&source.public_key)
                .map_err(|e| {
                    PortalError::Config(format!(
                        "public key for \"{}\" is not valid base64: {e}",
                        source.url
                    ))
                })?;
            if decoded.len() != 32 {
                return Err(PortalError::Config(format!(
                    "public key for \"{}\" must decode to 32 bytes, got {}",
                    source.url,
                    decoded.len()
                ))
                .into());
            }
        }

        Ok(())
    }

    /// Builds the shared HTTP client with the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::Http`] when the client cannot be constructed.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.http.timeout_seconds))
            .build()?;
        Ok(client)
    }
}
