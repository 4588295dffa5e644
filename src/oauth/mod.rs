//! OAuth token brokering for provider APIs
//!
//! Providers expose their APIs behind OAuth 2.0 authorization-code flows.
//! This module discovers a provider's endpoints from its `info.json`
//! ([`provider_info`]), caches grants per user identity ([`grant`]), and
//! drives the call/authorize/callback cycle ([`broker`]). Secure-internet
//! federation is handled by resolving the grant identity to the user's home
//! provider while API traffic still targets the selected location.

pub mod broker;
pub mod grant;
pub mod provider_info;

pub use broker::{ApiOutcome, ApiResponse, TokenBroker};
pub use grant::OAuthGrant;
pub use provider_info::ProviderInfo;
