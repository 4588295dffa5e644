//! vpnportal - VPN provider portal core
//!
//! Lets a user pick one of many independently operated VPN providers,
//! authenticate against that provider's OAuth authorization server, and
//! download a signed VPN client configuration. Two subsystems carry the
//! weight:
//!
//! - **Trusted discovery** ([`discovery`]): fetches centrally published
//!   provider/organization lists, verifies their detached Ed25519
//!   signatures, refuses sequence-number rollback, and persists the
//!   verified bytes verbatim.
//! - **OAuth token brokering** ([`oauth`]): per-session grant management
//!   with a home-provider indirection, so one authorization covers every
//!   secure-internet location federated under the same home.
//!
//! [`portal`] composes both with per-user [`session`] state into the
//! portal's use-cases; rendering, routing and cookie storage stay with the
//! host application.

pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod oauth;
pub mod portal;
pub mod session;

pub use config::Config;
pub use discovery::directory::{ProviderDirectory, ServerInfo, ServerKind};
pub use discovery::document::{DiscoveryDocument, DisplayName};
pub use discovery::fetcher::DiscoveryFetcher;
pub use discovery::store::{DiscoverySource, DiscoveryStore};
pub use error::{PortalError, Result};
pub use oauth::{ApiOutcome, ApiResponse, OAuthGrant, ProviderInfo, TokenBroker};
pub use portal::{PortalController, PortalOutcome};
pub use session::{ProfileSession, SessionBackend, SessionState};
