//! Shared gateway state

use std::sync::Arc;

use bastion_core::config::GatewayConfig;
use bastion_core::traits::RemoteConnector;
use bastion_core::{AccessTokenCodec, BastionError};

use crate::bridge::BridgeSettings;
use crate::registry::SessionRegistry;
use crate::ssh::SshConnector;
use crate::transfer::TransferLimits;

/// State shared by every request handler
pub struct GatewayState {
    /// Configuration
    pub config: GatewayConfig,
    /// Establishes remote connections
    pub connector: Arc<dyn RemoteConnector>,
    /// Access token codec, when a key is configured
    pub tokens: Option<AccessTokenCodec>,
    /// Live sessions
    pub sessions: Arc<SessionRegistry>,
}

impl GatewayState {
    pub fn new(
        config: GatewayConfig,
        connector: Arc<dyn RemoteConnector>,
        tokens: Option<AccessTokenCodec>,
    ) -> Self {
        Self {
            config,
            connector,
            tokens,
            sessions: Arc::new(SessionRegistry::new()),
        }
    }

    /// Validate the configuration and build the SSH connector and token codec
    pub fn from_config(config: GatewayConfig) -> Result<Self, BastionError> {
        config.validate()?;
        let connector = SshConnector::from_config(&config)?;
        let tokens = match &config.token_key {
            Some(key) => Some(AccessTokenCodec::new(key)?.with_max_age(config.token_max_age)),
            None => {
                tracing::warn!("No token_key configured; access tokens will be rejected");
                None
            }
        };
        Ok(Self::new(config, Arc::new(connector), tokens))
    }

    /// Settings for new bridged sessions
    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings::from(&self.config)
    }

    /// Limits for transfers
    pub fn transfer_limits(&self) -> TransferLimits {
        TransferLimits::from(&self.config.transfer)
    }
}
