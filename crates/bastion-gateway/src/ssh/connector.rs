//! Connection establisher
//!
//! Dials the remote host, verifies its identity and authenticates with the
//! supplied credentials, offering the password before the private key.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Config, Handle};
use russh::Disconnect;
use russh_keys::key::{KeyPair, PublicKey};

use bastion_core::config::GatewayConfig;
use bastion_core::error::{ConfigError, ConnectionError};
use bastion_core::traits::{
    PtyRequest, RemoteChannel, RemoteConnection, RemoteConnector, ShellChannel,
};
use bastion_core::CredentialBundle;

use super::channel::{await_reply, command_channel, shell_channel, TERMINAL_MODES};
use super::host_keys::{verifier_from_policy, HostKeyVerifier};

/// Credential in the order it will be offered
enum AuthMethod {
    Password(String),
    PublicKey(Arc<KeyPair>),
}

/// Turn a credential bundle into the ordered method list.
///
/// The key is parsed before any network activity so that malformed key
/// material fails fast.
fn build_auth_methods(credentials: &CredentialBundle) -> Result<Vec<AuthMethod>, ConnectionError> {
    let mut methods = Vec::with_capacity(2);

    if let Some(password) = &credentials.password {
        methods.push(AuthMethod::Password(password.clone()));
    }

    if let Some(key) = &credentials.private_key {
        let text = std::str::from_utf8(key)
            .map_err(|_| ConnectionError::KeyParse("key is not valid UTF-8".to_string()))?;
        let pair = russh_keys::decode_secret_key(text, None)
            .map_err(|e| ConnectionError::KeyParse(e.to_string()))?;
        methods.push(AuthMethod::PublicKey(Arc::new(pair)));
    }

    if methods.is_empty() {
        return Err(ConnectionError::NoAuthMethods);
    }
    Ok(methods)
}

/// russh client event handler; only host key checks are customised
pub struct ClientHandler {
    addr: String,
    verifier: Arc<dyn HostKeyVerifier>,
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        tracing::debug!("Server host key for {}: SHA256:{}", self.addr, fingerprint);
        Ok(self.verifier.verify(&self.addr, &fingerprint).await)
    }
}

/// Establishes authenticated SSH connections
pub struct SshConnector {
    ssh_config: Arc<Config>,
    verifier: Arc<dyn HostKeyVerifier>,
    connect_timeout: Duration,
}

impl SshConnector {
    pub fn new(verifier: Arc<dyn HostKeyVerifier>, connect_timeout: Duration) -> Self {
        Self {
            ssh_config: Arc::new(Config::default()),
            verifier,
            connect_timeout,
        }
    }

    /// Build a connector from the gateway configuration
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
        let verifier = verifier_from_policy(&config.host_keys)?;
        Ok(Self::new(verifier, config.connect_timeout))
    }

    async fn dial_and_authenticate(
        &self,
        addr: &str,
        user: &str,
        methods: Vec<AuthMethod>,
    ) -> Result<Handle<ClientHandler>, ConnectionError> {
        let handler = ClientHandler {
            addr: addr.to_string(),
            verifier: Arc::clone(&self.verifier),
        };

        let mut handle = client::connect(Arc::clone(&self.ssh_config), addr, handler)
            .await
            .map_err(|e| match e {
                russh::Error::UnknownKey => ConnectionError::HostKeyRejected {
                    addr: addr.to_string(),
                },
                other => ConnectionError::Dial {
                    addr: addr.to_string(),
                    reason: other.to_string(),
                },
            })?;

        for method in methods {
            let (kind, result) = match method {
                AuthMethod::Password(password) => {
                    ("password", handle.authenticate_password(user, password).await)
                }
                AuthMethod::PublicKey(key) => {
                    ("publickey", handle.authenticate_publickey(user, key).await)
                }
            };
            match result {
                Ok(true) => {
                    tracing::debug!("Authenticated {}@{} with {}", user, addr, kind);
                    return Ok(handle);
                }
                Ok(false) => tracing::debug!("{} authentication rejected for {}@{}", kind, user, addr),
                Err(e) => {
                    return Err(ConnectionError::Dial {
                        addr: addr.to_string(),
                        reason: format!("{} authentication error: {}", kind, e),
                    })
                }
            }
        }

        Err(ConnectionError::AuthenticationFailed {
            user: user.to_string(),
        })
    }
}

#[async_trait]
impl RemoteConnector for SshConnector {
    async fn connect(
        &self,
        credentials: &CredentialBundle,
    ) -> Result<Arc<dyn RemoteConnection>, ConnectionError> {
        let methods = build_auth_methods(credentials)?;
        let addr = credentials.remote_address();

        tracing::info!("Connecting to {} as {}", addr, credentials.user);
        let handle = tokio::time::timeout(
            self.connect_timeout,
            self.dial_and_authenticate(&addr, &credentials.user, methods),
        )
        .await
        .map_err(|_| ConnectionError::Timeout { addr: addr.clone() })??;

        Ok(Arc::new(SshConnection {
            handle,
            addr,
            closed: AtomicBool::new(false),
        }))
    }
}

/// An authenticated SSH connection
pub struct SshConnection {
    handle: Handle<ClientHandler>,
    addr: String,
    closed: AtomicBool,
}

#[async_trait]
impl RemoteConnection for SshConnection {
    async fn open_shell(&self, pty: &PtyRequest) -> Result<ShellChannel, ConnectionError> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| ConnectionError::ChannelOpen(e.to_string()))?;

        channel
            .request_pty(
                true,
                &pty.term,
                u32::from(pty.size.cols),
                u32::from(pty.size.rows),
                0,
                0,
                TERMINAL_MODES,
            )
            .await
            .map_err(|e| ConnectionError::ShellRequest(e.to_string()))?;
        await_reply(&mut channel, "pty")
            .await
            .map_err(ConnectionError::ShellRequest)?;

        channel
            .request_shell(true)
            .await
            .map_err(|e| ConnectionError::ShellRequest(e.to_string()))?;
        await_reply(&mut channel, "shell")
            .await
            .map_err(ConnectionError::ShellRequest)?;

        tracing::debug!("Shell started on {}", self.addr);
        Ok(shell_channel(channel))
    }

    async fn open_command(&self, command: &str) -> Result<RemoteChannel, ConnectionError> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| ConnectionError::ChannelOpen(e.to_string()))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| ConnectionError::ChannelOpen(e.to_string()))?;
        await_reply(&mut channel, "exec")
            .await
            .map_err(ConnectionError::ChannelOpen)?;

        tracing::debug!("Started remote command on {}: {}", self.addr, command);
        Ok(command_channel(channel))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            tracing::debug!("Disconnect from {} failed: {}", self.addr, e);
        }
        tracing::debug!("Disconnected from {}", self.addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_methods() {
        let credentials = CredentialBundle::new("h", "u");
        assert!(matches!(
            build_auth_methods(&credentials),
            Err(ConnectionError::NoAuthMethods)
        ));
    }

    #[test]
    fn test_password_only() {
        let credentials = CredentialBundle::new("h", "u").with_password("pw");
        let methods = build_auth_methods(&credentials).unwrap();
        assert_eq!(methods.len(), 1);
        assert!(matches!(&methods[0], AuthMethod::Password(p) if p == "pw"));
    }

    #[test]
    fn test_malformed_key_fails_before_dialing() {
        let credentials = CredentialBundle::new("h", "u")
            .with_password("pw")
            .with_private_key(b"not a key".to_vec());
        assert!(matches!(
            build_auth_methods(&credentials),
            Err(ConnectionError::KeyParse(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_a_dial_error() {
        let connector = SshConnector::new(
            Arc::new(super::super::host_keys::AcceptAnyHostKey),
            Duration::from_secs(5),
        );
        // Port 1 on loopback is essentially never listening.
        let credentials = CredentialBundle::new("127.0.0.1:1", "u").with_password("pw");
        let result = connector.connect(&credentials).await;
        assert!(matches!(
            result,
            Err(ConnectionError::Dial { .. }) | Err(ConnectionError::Timeout { .. })
        ));
    }
}
