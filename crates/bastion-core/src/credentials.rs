//! Credential bundles
//!
//! A bundle is everything needed to authenticate one remote connection. It is
//! built per request (from direct parameters, a bootstrap record, or an access
//! token), handed to the connector and dropped; it is never persisted.

use serde::{Deserialize, Serialize};

use bastion_protocol::BootstrapRecord;

/// Default SSH port appended when the host carries none
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Authentication method kinds, in the order they are attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethodKind {
    /// Password authentication
    Password,
    /// Public key authentication
    PublicKey,
}

/// Credentials for one remote connection
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialBundle {
    /// Remote user
    pub user: String,
    /// Remote host, optionally `host:port`
    pub host: String,
    /// Password, if any
    pub password: Option<String>,
    /// Private key bytes (OpenSSH or PEM text), if any
    pub private_key: Option<Vec<u8>>,
}

impl CredentialBundle {
    /// Create a bundle with no secrets attached
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            password: None,
            private_key: None,
        }
    }

    /// Attach a password; empty strings are treated as absent
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        let password = password.into();
        self.password = (!password.is_empty()).then_some(password);
        self
    }

    /// Attach private key bytes; empty input is treated as absent
    pub fn with_private_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        let key = key.into();
        self.private_key = (!key.is_empty()).then_some(key);
        self
    }

    /// Authentication methods to offer: password first, then key
    pub fn auth_methods(&self) -> Vec<AuthMethodKind> {
        let mut methods = Vec::with_capacity(2);
        if self.password.is_some() {
            methods.push(AuthMethodKind::Password);
        }
        if self.private_key.is_some() {
            methods.push(AuthMethodKind::PublicKey);
        }
        methods
    }

    /// Dial address with the default port applied
    pub fn remote_address(&self) -> String {
        with_default_port(&self.host, DEFAULT_SSH_PORT)
    }
}

impl From<BootstrapRecord> for CredentialBundle {
    fn from(record: BootstrapRecord) -> Self {
        Self {
            user: record.user,
            host: record.host,
            password: record.password,
            private_key: record.private_key,
        }
    }
}

impl std::fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("user", &self.user)
            .field("host", &self.host)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Append `:port` unless the host already names one.
///
/// A trailing `]` marks a bracketed IPv6 literal without a port.
pub fn with_default_port(host: &str, port: u16) -> String {
    if has_port(host) {
        host.to_string()
    } else {
        format!("{}:{}", host, port)
    }
}

fn has_port(host: &str) -> bool {
    for c in host.chars().rev() {
        match c {
            ':' => return true,
            ']' => return false,
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port() {
        assert_eq!(with_default_port("example.com", 22), "example.com:22");
        assert_eq!(with_default_port("example.com:2222", 22), "example.com:2222");
        assert_eq!(with_default_port("[::1]", 22), "[::1]:22");
        assert_eq!(with_default_port("[::1]:2200", 22), "[::1]:2200");
    }

    #[test]
    fn test_auth_method_order() {
        let bundle = CredentialBundle::new("h", "u")
            .with_private_key(b"key".to_vec())
            .with_password("pw");
        assert_eq!(
            bundle.auth_methods(),
            vec![AuthMethodKind::Password, AuthMethodKind::PublicKey]
        );

        let bundle = CredentialBundle::new("h", "u").with_password("");
        assert!(bundle.auth_methods().is_empty());
    }

    #[test]
    fn test_from_bootstrap_record() {
        let record = BootstrapRecord::parse("example.com|bob|pw").unwrap();
        let bundle = CredentialBundle::from(record);
        assert_eq!(bundle.remote_address(), "example.com:22");
        assert_eq!(bundle.user, "bob");
        assert_eq!(bundle.password.as_deref(), Some("pw"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let bundle = CredentialBundle::new("h", "u")
            .with_password("hunter2")
            .with_private_key(b"-----BEGIN".to_vec());
        let debug = format!("{:?}", bundle);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("BEGIN"));
    }
}
