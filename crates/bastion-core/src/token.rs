//! Access token codec
//!
//! An access token is an opaque, URL-safe string that carries a credential
//! bundle sealed under a server-held Fernet key. The provisioning tool
//! encodes tokens; the gateway only decodes them.
//!
//! # Format
//!
//! ```text
//! fernet( base64( "username=<u>&hostname=<h>&privatekey=<base64 key>&password=<p>" ) )
//! ```
//!
//! `privatekey` and `password` are optional. The issue time is the Fernet
//! timestamp, so a maximum age maps onto the Fernet TTL. Links issued by the
//! older provisioning script decode unchanged.
//!
//! Every decoding failure collapses into the same [`TokenError`].

use std::collections::HashMap;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use fernet::Fernet;
use url::form_urlencoded;

use crate::credentials::CredentialBundle;
use crate::error::{ConfigError, TokenError};
use crate::time::current_time_secs;

/// Seals and opens access tokens under one Fernet key
pub struct AccessTokenCodec {
    fernet: Fernet,
    max_age: Option<Duration>,
}

impl AccessTokenCodec {
    /// Build a codec from a Fernet key (32 bytes, URL-safe base64)
    pub fn new(key: &str) -> Result<Self, ConfigError> {
        let fernet = Fernet::new(key.trim()).ok_or_else(|| {
            ConfigError::Invalid(
                "token key must be a Fernet key (32 bytes of URL-safe base64)".to_string(),
            )
        })?;

        Ok(Self {
            fernet,
            max_age: None,
        })
    }

    /// Reject tokens older than `max_age`
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// Generate a fresh random key in the format [`AccessTokenCodec::new`] accepts
    pub fn generate_key() -> String {
        Fernet::generate_key()
    }

    /// Seal a credential bundle, stamped with the current time
    pub fn encode(&self, bundle: &CredentialBundle) -> String {
        self.encode_at(bundle, current_time_secs())
    }

    /// Seal a credential bundle with an explicit issue time
    pub fn encode_at(&self, bundle: &CredentialBundle, issued_at: u64) -> String {
        let mut fields = form_urlencoded::Serializer::new(String::new());
        fields
            .append_pair("username", &bundle.user)
            .append_pair("hostname", &bundle.host);
        if let Some(key) = &bundle.private_key {
            fields.append_pair("privatekey", &STANDARD.encode(key));
        }
        if let Some(password) = &bundle.password {
            fields.append_pair("password", password);
        }

        let payload = STANDARD.encode(fields.finish());
        self.fernet.encrypt_at_time(payload.as_bytes(), issued_at)
    }

    /// Open a token into its credential bundle
    pub fn decode(&self, token: &str) -> Result<CredentialBundle, TokenError> {
        self.decode_at(token, current_time_secs())
    }

    /// Open a token, judging its age against `now`
    pub fn decode_at(&self, token: &str, now: u64) -> Result<CredentialBundle, TokenError> {
        let result = self.open(token, now);
        if let Err(reason) = &result {
            tracing::debug!("Access token rejected: {}", reason);
        }
        result.map_err(|_| TokenError)
    }

    fn open(&self, token: &str, now: u64) -> Result<CredentialBundle, &'static str> {
        let ttl = self.max_age.map(|age| age.as_secs());
        let sealed = self
            .fernet
            .decrypt_at_time(token.trim(), ttl, now)
            .map_err(|_| "decryption failed or token expired")?;

        let query = STANDARD.decode(&sealed).map_err(|_| "payload is not base64")?;

        let mut fields: HashMap<String, String> = HashMap::new();
        for (name, value) in form_urlencoded::parse(&query) {
            fields
                .entry(name.into_owned())
                .or_insert_with(|| value.into_owned());
        }

        let user = fields.remove("username").unwrap_or_default();
        let host = fields.remove("hostname").unwrap_or_default();
        if user.is_empty() || host.is_empty() {
            return Err("missing user or host");
        }

        let mut bundle = CredentialBundle::new(host, user);
        if let Some(password) = fields.remove("password") {
            bundle = bundle.with_password(password);
        }
        if let Some(encoded) = fields.remove("privatekey") {
            // Older links carry the key unescaped, so '+' arrives as a space.
            let key = STANDARD
                .decode(encoded.replace(' ', "+"))
                .map_err(|_| "malformed private key")?;
            bundle = bundle.with_private_key(key);
        }

        Ok(bundle)
    }
}

impl std::fmt::Debug for AccessTokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenCodec")
            .field("key", &"<redacted>")
            .field("max_age", &self.max_age)
            .finish()
    }
}
