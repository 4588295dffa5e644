//! Trusted discovery document pipeline
//!
//! [`DiscoveryFetcher::update`] runs the full fetch → verify → parse →
//! anti-rollback → persist sequence for one discovery source. The ordering
//! is deliberate and security-relevant:
//!
//! 1. Fetch the document and its `.sig` companion; both must be 2xx.
//! 2. Verify the detached Ed25519 signature over the exact body bytes.
//!    Nothing unverified is ever parsed as trusted or stored.
//! 3. Parse the verified bytes; a structural failure is
//!    [`PortalError::MalformedDocument`], never confused with a signature
//!    failure because verification already happened.
//! 4. Compare the fetched `seq` against the stored document (absent = 0).
//!    A regression is [`PortalError::Rollback`], a hard trust violation
//!    that leaves the store untouched.
//! 5. Persist the raw verified bytes atomically.

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;

use crate::discovery::document::DiscoveryDocument;
use crate::discovery::signature::verify_detached;
use crate::discovery::store::{DiscoverySource, DiscoveryStore};
use crate::error::{PortalError, Result};

/// Fetches, verifies, and persists discovery documents for configured
/// sources.
///
/// Independent sources may be updated concurrently; each source's sequence
/// touches only its own cache file and is idempotent.
///
/// # Examples
///
/// ```no_run
/// use url::Url;
/// use vpnportal::discovery::fetcher::DiscoveryFetcher;
/// use vpnportal::discovery::store::{DiscoverySource, DiscoveryStore};
///
/// # async fn example() -> vpnportal::error::Result<()> {
/// let store = DiscoveryStore::new("/var/lib/vpnportal/data");
/// let fetcher = DiscoveryFetcher::new(reqwest::Client::new(), store);
///
/// let source = DiscoverySource {
///     url: Url::parse("https://disco.example.org/institute_access.json")?,
///     public_key: "E5On0JTtyUVZmcWd+I/FXRm32nuDNfp5SUM+yoSqbs4=".to_string(),
/// };
/// let doc = fetcher.update(&source).await?;
/// println!("updated to seq {}", doc.seq);
/// # Ok(())
/// # }
/// ```
pub struct DiscoveryFetcher {
    http: reqwest::Client,
    store: DiscoveryStore,
}

impl DiscoveryFetcher {
    /// Creates a fetcher backed by the given HTTP client and store.
    ///
    /// Timeout policy belongs to the client the caller builds; a timed-out
    /// fetch surfaces as [`PortalError::Transport`].
    pub fn new(http: reqwest::Client, store: DiscoveryStore) -> Self {
        Self { http, store }
    }

    /// The store this fetcher persists into.
    pub fn store(&self) -> &DiscoveryStore {
        &self.store
    }

    /// Fetches the source's document, verifies it, and persists it if it is
    /// newer than (or equal to) the stored one.
    ///
    /// # Errors
    ///
    /// - [`PortalError::Transport`] when either HTTP fetch fails or returns
    ///   a non-success status.
    /// - [`PortalError::Verification`] when the signature (or its base64
    ///   transport encoding, or the configured public key) is invalid. The
    ///   previously persisted document is left untouched.
    /// - [`PortalError::MalformedDocument`] when the verified bytes are not
    ///   a structurally valid document. Not persisted.
    /// - [`PortalError::Rollback`] when the fetched sequence number is
    ///   strictly less than the stored one. Not persisted, never silently
    ///   accepted.
    pub async fn update(&self, source: &DiscoverySource) -> Result<DiscoveryDocument> {
        // The signature covers the exact wire bytes; any charset transcoding
        // of the body would break verification of an authentic document.
        let body = self.http_get_bytes(source.url.as_str()).await?;
        let signature_body = self.http_get_text(&format!("{}.sig", source.url)).await?;

        // Both the signature and the configured key arrive base64-encoded;
        // a decode failure is a verification failure, fail closed.
        let signature = BASE64_STANDARD
            .decode(signature_body.trim().as_bytes())
            .map_err(|e| PortalError::Verification(format!("signature is not valid base64: {e}")))?;
        let public_key = BASE64_STANDARD.decode(&source.public_key).map_err(|e| {
            PortalError::Verification(format!("configured public key is not valid base64: {e}"))
        })?;

        if !verify_detached(&body, &signature, &public_key) {
            return Err(PortalError::Verification(format!(
                "unable to verify signature for \"{}\"",
                source.url
            ))
            .into());
        }

        let document = DiscoveryDocument::parse(&body)?;

        let stored = self.store.load(source)?;
        let stored_seq = stored.as_ref().map(|d| d.seq).unwrap_or(0);
        if document.seq < stored_seq {
            return Err(PortalError::Rollback {
                stored: stored_seq,
                fetched: document.seq,
            }
            .into());
        }

        if let Some(stored) = &stored {
            warn_on_dropped_entries(source, stored, &document);
        }

        self.store.save(source, &body)?;
        tracing::info!(url = %source.url, seq = document.seq, "discovery document updated");

        Ok(document)
    }

    /// GETs a URL as raw bytes, untouched by any charset decoding, treating
    /// any transport error or non-2xx status as [`PortalError::Transport`].
    async fn http_get_bytes(&self, url: &str) -> Result<bytes::Bytes> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| PortalError::Transport(format!("unable to fetch \"{url}\": {e}")))?;

        if !response.status().is_success() {
            return Err(PortalError::Transport(format!(
                "unable to fetch \"{}\": status {}",
                url,
                response.status()
            ))
            .into());
        }

        response
            .bytes()
            .await
            .map_err(|e| PortalError::Transport(format!("unable to read \"{url}\": {e}")).into())
    }

    /// GETs a URL as text. Only used for the base64 `.sig` companion, where
    /// charset decoding cannot change the decoded signature.
    async fn http_get_text(&self, url: &str) -> Result<String> {
        let bytes = self.http_get_bytes(url).await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| PortalError::Transport(format!("unable to read \"{url}\": {e}")).into())
    }
}

/// Logs a warning when a newer document silently drops previously known
/// provider entries. The top-level `seq` check does not catch this, so make
/// it operator-visible without failing the update.
fn warn_on_dropped_entries(
    source: &DiscoverySource,
    stored: &DiscoveryDocument,
    fetched: &DiscoveryDocument,
) {
    let fetched_uris: HashSet<&str> = fetched
        .instances
        .iter()
        .map(|i| i.base_uri.as_str())
        .collect();
    for instance in &stored.instances {
        if !fetched_uris.contains(instance.base_uri.as_str()) {
            tracing::warn!(
                url = %source.url,
                base_uri = %instance.base_uri,
                stored_seq = stored.seq,
                fetched_seq = fetched.seq,
                "previously known provider entry disappeared from discovery document"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
//
// Wiremock integration tests covering the full pipeline (tampered payloads,
// rollback, first-run) live in tests/discovery_fetcher_test.rs.
