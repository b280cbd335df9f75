//! Remote host identity verification
//!
//! Fingerprints are compared in the unpadded base64 SHA-256 form, with an
//! optional `SHA256:` prefix tolerated on either side.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::io::AsyncWriteExt;

use bastion_core::config::HostKeyPolicy;
use bastion_core::error::ConfigError;

/// Decides whether a server key is acceptable for a host
#[async_trait]
pub trait HostKeyVerifier: Send + Sync {
    /// Return `true` to continue the handshake
    async fn verify(&self, host: &str, fingerprint: &str) -> bool;
}

/// Build the verifier selected by the configured policy
pub fn verifier_from_policy(policy: &HostKeyPolicy) -> Result<Arc<dyn HostKeyVerifier>, ConfigError> {
    Ok(match policy {
        HostKeyPolicy::AcceptAny => Arc::new(AcceptAnyHostKey),
        HostKeyPolicy::Pinned { fingerprints } => Arc::new(PinnedHostKeys::new(fingerprints)),
        HostKeyPolicy::TrustOnFirstUse { store } => Arc::new(TrustOnFirstUse::open(store)?),
    })
}

fn normalize(fingerprint: &str) -> &str {
    let trimmed = fingerprint.trim();
    trimmed.strip_prefix("SHA256:").unwrap_or(trimmed)
}

/// Accepts every server key
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAnyHostKey;

#[async_trait]
impl HostKeyVerifier for AcceptAnyHostKey {
    async fn verify(&self, host: &str, fingerprint: &str) -> bool {
        tracing::warn!(
            "Accepting unverified host key for {} (SHA256:{})",
            host,
            normalize(fingerprint)
        );
        true
    }
}

/// Accepts only keys from a fixed fingerprint list, for any host
#[derive(Debug, Clone)]
pub struct PinnedHostKeys {
    fingerprints: HashSet<String>,
}

impl PinnedHostKeys {
    pub fn new<S: AsRef<str>>(fingerprints: &[S]) -> Self {
        Self {
            fingerprints: fingerprints
                .iter()
                .map(|f| normalize(f.as_ref()).to_string())
                .collect(),
        }
    }
}

#[async_trait]
impl HostKeyVerifier for PinnedHostKeys {
    async fn verify(&self, host: &str, fingerprint: &str) -> bool {
        let known = self.fingerprints.contains(normalize(fingerprint));
        if !known {
            tracing::warn!(
                "Rejecting host key for {}: SHA256:{} is not pinned",
                host,
                normalize(fingerprint)
            );
        }
        known
    }
}

/// Records the first key seen per host and rejects later changes.
///
/// The store is a text file with one `host fingerprint` pair per line.
#[derive(Debug)]
pub struct TrustOnFirstUse {
    store: PathBuf,
    known: DashMap<String, String>,
}

impl TrustOnFirstUse {
    /// Load the store, creating nothing until the first key is recorded
    pub fn open(store: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let store = store.into();
        let known = DashMap::new();

        if store.exists() {
            let content = fs::read_to_string(&store).map_err(|e| {
                ConfigError::Invalid(format!(
                    "Failed to read host key store {}: {}",
                    store.display(),
                    e
                ))
            })?;
            for (line_no, line) in content.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                let mut parts = line.split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some(host), Some(fingerprint)) => {
                        known.insert(host.to_string(), normalize(fingerprint).to_string());
                    }
                    _ => {
                        return Err(ConfigError::Invalid(format!(
                            "Malformed host key store entry at {}:{}",
                            store.display(),
                            line_no + 1
                        )))
                    }
                }
            }
            tracing::debug!("Loaded {} known host keys from {}", known.len(), store.display());
        }

        Ok(Self { store, known })
    }

    /// Number of hosts with a recorded key
    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    async fn append(path: &Path, host: &str, fingerprint: &str) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(format!("{} {}\n", host, fingerprint).as_bytes())
            .await?;
        file.flush().await
    }
}

#[async_trait]
impl HostKeyVerifier for TrustOnFirstUse {
    async fn verify(&self, host: &str, fingerprint: &str) -> bool {
        let fingerprint = normalize(fingerprint);
        // The map entry is settled before the store is touched, so only the
        // first of several concurrent handshakes records the key.
        match self.known.entry(host.to_string()) {
            Entry::Occupied(entry) => {
                let matches = entry.get() == fingerprint;
                if !matches {
                    tracing::error!(
                        "Host key for {} changed: expected SHA256:{}, got SHA256:{}",
                        host,
                        entry.get(),
                        fingerprint
                    );
                }
                return matches;
            }
            Entry::Vacant(entry) => {
                entry.insert(fingerprint.to_string());
            }
        }

        tracing::info!("Trusting new host key for {}: SHA256:{}", host, fingerprint);
        if let Err(e) = Self::append(&self.store, host, fingerprint).await {
            tracing::warn!(
                "Failed to persist host key for {} to {}: {}",
                host,
                self.store.display(),
                e
            );
        }
        true
    }
}
