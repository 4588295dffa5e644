//! Last-known-good discovery document persistence
//!
//! Each configured discovery source gets one cache file under the data
//! directory, named after the final path segment of the source URL and
//! containing the verified raw document bytes verbatim. Writes go through
//! a uniquely named temp file followed by a rename, so a crash mid-write
//! never leaves a corrupt or partially written file observable to readers,
//! and concurrent updates of the same source simply last-write-win.

use std::fs;
use std::path::{Path, PathBuf};

use rand::RngCore as _;
use url::Url;

use crate::discovery::document::DiscoveryDocument;
use crate::error::{PortalError, Result};

// ---------------------------------------------------------------------------
// DiscoverySource
// ---------------------------------------------------------------------------

/// One configured discovery source: where to fetch and which key signs it.
///
/// Immutable, configured at startup.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use vpnportal::discovery::store::DiscoverySource;
///
/// let source = DiscoverySource {
///     url: Url::parse("https://disco.example.org/institute_access.json").unwrap(),
///     public_key: "insecure+test+key".to_string(),
/// };
/// assert_eq!(source.cache_file_name().unwrap(), "institute_access.json");
/// ```
#[derive(Debug, Clone)]
pub struct DiscoverySource {
    /// HTTPS URL of the discovery document; the signature lives at
    /// `<url>.sig`.
    pub url: Url,

    /// Base64-encoded Ed25519 public key that signs this source.
    pub public_key: String,
}

impl DiscoverySource {
    /// Deterministic cache file name for this source: the final path
    /// segment of the URL.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::Config`] when the URL has no usable path
    /// segment (e.g. a bare origin), since the cache file would otherwise
    /// be unnameable.
    pub fn cache_file_name(&self) -> Result<String> {
        let name = self
            .url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                PortalError::Config(format!(
                    "discovery URL \"{}\" has no file name component",
                    self.url
                ))
            })?;
        Ok(name.to_string())
    }
}

// ---------------------------------------------------------------------------
// DiscoveryStore
// ---------------------------------------------------------------------------

/// Persists the last-known-good document per discovery source.
///
/// The store only ever holds bytes that passed signature verification; it is
/// the [`DiscoveryFetcher`](crate::discovery::fetcher::DiscoveryFetcher)'s
/// job to enforce that ordering.
///
/// # Examples
///
/// ```no_run
/// use url::Url;
/// use vpnportal::discovery::store::{DiscoverySource, DiscoveryStore};
///
/// # fn example() -> vpnportal::error::Result<()> {
/// let store = DiscoveryStore::new("/var/lib/vpnportal/data");
/// let source = DiscoverySource {
///     url: Url::parse("https://disco.example.org/secure_internet.json")?,
///     public_key: "key".to_string(),
/// };
/// if let Some(doc) = store.load(&source)? {
///     println!("stored seq: {}", doc.seq);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DiscoveryStore {
    data_dir: PathBuf,
}

impl DiscoveryStore {
    /// Creates a store rooted at the given data directory.
    ///
    /// The directory is created lazily on the first [`save`](Self::save).
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// The cache file path for a source.
    pub fn cache_path(&self, source: &DiscoverySource) -> Result<PathBuf> {
        Ok(self.data_dir.join(source.cache_file_name()?))
    }

    /// Loads the last persisted document for a source.
    ///
    /// Absence (e.g. first run) is a valid state and yields `Ok(None)`, not
    /// an error; callers treat it as sequence number zero for rollback
    /// comparison.
    ///
    /// # Errors
    ///
    /// Propagates IO failures other than not-found, and
    /// [`PortalError::MalformedDocument`] when the stored bytes no longer
    /// parse (on-disk corruption).
    pub fn load(&self, source: &DiscoverySource) -> Result<Option<DiscoveryDocument>> {
        let path = self.cache_path(source)?;
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PortalError::Io(e).into()),
        };

        Ok(Some(DiscoveryDocument::parse(&raw)?))
    }

    /// Atomically overwrites the persisted document for a source.
    ///
    /// The raw verified bytes are written verbatim to a uniquely named temp
    /// file in the data directory and renamed into place. The rename is the
    /// commit point; readers either see the old complete file or the new
    /// complete file.
    pub fn save(&self, source: &DiscoverySource, raw: &[u8]) -> Result<()> {
        let path = self.cache_path(source)?;
        fs::create_dir_all(&self.data_dir)?;

        let tmp_path = Self::temp_sibling(&path);
        fs::write(&tmp_path, raw)?;
        if let Err(e) = fs::rename(&tmp_path, &path) {
            // Clean up the orphaned temp file before surfacing the error.
            let _ = fs::remove_file(&tmp_path);
            return Err(PortalError::Io(e).into());
        }

        tracing::debug!(path = %path.display(), bytes = raw.len(), "persisted discovery document");
        Ok(())
    }

    /// A temp file path next to `path` with a random suffix, so concurrent
    /// writers of the same source never share a temp file.
    fn temp_sibling(path: &Path) -> PathBuf {
        let mut suffix = [0u8; 8];
        rand::rng().fill_bytes(&mut suffix);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "discovery".to_string());
        path.with_file_name(format!("{}.{:016x}.tmp", file_name, u64::from_le_bytes(suffix)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
