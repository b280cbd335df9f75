//! Bootstrap record
//!
//! When a client opens the duplex channel without connection parameters, its
//! first message carries them as `host|user|password|privatekeyBase64`.
//! Password and key segments may be absent or empty.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::ProtocolError;

/// Field separator of the bootstrap record
pub const BOOTSTRAP_DELIMITER: char = '|';

/// Connection parameters sent ahead of the session protocol
#[derive(Clone, PartialEq, Eq)]
pub struct BootstrapRecord {
    /// Remote host, optionally `host:port`
    pub host: String,
    /// Remote user
    pub user: String,
    /// Password, if given
    pub password: Option<String>,
    /// Private key bytes, if given
    pub private_key: Option<Vec<u8>>,
}

impl BootstrapRecord {
    /// Parse a bootstrap record.
    ///
    /// Host and user presence is checked before anything else is decoded.
    pub fn parse(record: &str) -> Result<Self, ProtocolError> {
        let mut parts = record.split(BOOTSTRAP_DELIMITER);

        let host = parts.next().unwrap_or_default().trim();
        let user = parts.next().unwrap_or_default().trim();
        if host.is_empty() || user.is_empty() {
            return Err(ProtocolError::MissingCredentials);
        }

        let password = parts
            .next()
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        let private_key = match parts.next().map(str::trim).filter(|k| !k.is_empty()) {
            Some(encoded) => Some(
                STANDARD
                    .decode(encoded)
                    .map_err(|_| ProtocolError::InvalidEncoding { field: "private key" })?,
            ),
            None => None,
        };

        Ok(Self {
            host: host.to_string(),
            user: user.to_string(),
            password,
            private_key,
        })
    }
}

impl std::fmt::Debug for BootstrapRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapRecord")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
