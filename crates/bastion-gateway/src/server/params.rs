//! Connection parameters supplied by clients

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;

use bastion_core::{AccessTokenCodec, CredentialBundle, TokenError};
use bastion_protocol::ProtocolError;

/// Credentials as they arrive in a query string or form fields.
///
/// Either `access` (an opaque token) or `host` plus `user` must be present.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ConnectParams {
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Base64 (standard alphabet) private key
    pub privatekey: Option<String>,
    pub access: Option<String>,
}

/// Why parameters could not be turned into credentials
#[derive(Debug, thiserror::Error)]
pub enum ParamError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl ConnectParams {
    /// No host and no token: credentials must come from the bootstrap frame
    pub fn is_empty(&self) -> bool {
        non_empty(&self.host).is_none() && non_empty(&self.access).is_none()
    }

    /// Record a named form field; unknown names are ignored
    pub fn set(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "host" => &mut self.host,
            "user" => &mut self.user,
            "password" => &mut self.password,
            "privatekey" => &mut self.privatekey,
            "access" => &mut self.access,
            _ => return false,
        };
        *slot = Some(value);
        true
    }

    /// Resolve into credentials. A token, when present, takes precedence.
    pub fn resolve(&self, tokens: Option<&AccessTokenCodec>) -> Result<CredentialBundle, ParamError> {
        if let Some(token) = non_empty(&self.access) {
            let codec = tokens.ok_or(TokenError)?;
            return Ok(codec.decode(token)?);
        }

        let (host, user) = match (non_empty(&self.host), non_empty(&self.user)) {
            (Some(host), Some(user)) => (host, user),
            _ => return Err(ProtocolError::MissingCredentials.into()),
        };

        let mut credentials = CredentialBundle::new(host, user);
        if let Some(password) = non_empty(&self.password) {
            credentials = credentials.with_password(password);
        }
        if let Some(key) = non_empty(&self.privatekey) {
            let key = STANDARD
                .decode(key.as_bytes())
                .map_err(|_| ProtocolError::InvalidEncoding { field: "private key" })?;
            credentials = credentials.with_private_key(key);
        }
        Ok(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_plain_params() {
        let params = ConnectParams {
            host: Some("h1".into()),
            user: Some("alice".into()),
            password: Some("pw".into()),
            privatekey: Some(STANDARD.encode("KEY")),
            access: None,
        };
        let credentials = params.resolve(None).unwrap();
        assert_eq!(credentials.host, "h1");
        assert_eq!(credentials.password.as_deref(), Some("pw"));
        assert_eq!(credentials.private_key.as_deref(), Some(&b"KEY"[..]));
    }

    #[test]
    fn test_missing_user() {
        let params = ConnectParams {
            host: Some("h1".into()),
            ..Default::default()
        };
        let err = params.resolve(None).unwrap_err();
        assert_eq!(err.to_string(), "Missing host or user");
    }

    #[test]
    fn test_bad_key_encoding() {
        let params = ConnectParams {
            host: Some("h1".into()),
            user: Some("alice".into()),
            privatekey: Some("***".into()),
            ..Default::default()
        };
        let err = params.resolve(None).unwrap_err();
        assert_eq!(err.to_string(), "Invalid private key encoding");
    }

    #[test]
    fn test_token_without_codec_is_rejected() {
        let params = ConnectParams {
            access: Some("abc".into()),
            ..Default::default()
        };
        assert!(matches!(params.resolve(None), Err(ParamError::Token(_))));
    }

    #[test]
    fn test_token_takes_precedence() {
        let codec = AccessTokenCodec::new(&AccessTokenCodec::generate_key()).unwrap();
        let token = codec
            .encode(&CredentialBundle::new("h1", "alice").with_password("pw"));
        let params = ConnectParams {
            host: Some("other".into()),
            user: Some("mallory".into()),
            access: Some(token),
            ..Default::default()
        };
        let credentials = params.resolve(Some(&codec)).unwrap();
        assert_eq!(credentials.host, "h1");
        assert_eq!(credentials.user, "alice");
    }

    #[test]
    fn test_is_empty() {
        assert!(ConnectParams::default().is_empty());
        let mut params = ConnectParams::default();
        assert!(params.set("host", "h1".into()));
        assert!(!params.set("file", "x".into()));
        assert!(!params.is_empty());
    }
}
