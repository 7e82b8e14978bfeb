//! Local gateway brokering remote introspection requests.
//!
//! The gateway runs next to databases that a remote caller cannot reach and
//! answers `list-connectors`, `export` and `sample-entity` requests over a
//! newline-delimited JSON protocol (see [`protocol`]). Each TCP connection is
//! an independent session; a session must `authenticate` with the shared
//! token before anything else is served.
//!
//! # Security Guarantees
//! - Connection URLs received in a request live only as long as that request
//! - Only read-only sampling and catalog queries can be triggered remotely
//! - The bind address defaults to loopback

pub mod protocol;
mod server;
mod session;

pub use session::SessionState;

use crate::Result;
use crate::connectors::ConnectorFactory;
use crate::error::SchemaportError;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

/// Default gateway port.
pub const DEFAULT_GATEWAY_PORT: u16 = 4177;

/// Gateway settings.
#[derive(Clone)]
pub struct GatewayConfig {
    pub bind: SocketAddr,
    token: Zeroizing<String>,
    /// Longest accepted request frame, in bytes
    pub max_line_length: usize,
    /// Concurrent export/sample requests per session
    pub max_in_flight: usize,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("bind", &self.bind)
            .field("token", &"****")
            .field("max_line_length", &self.max_line_length)
            .field("max_in_flight", &self.max_in_flight)
            .finish()
    }
}

impl GatewayConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_GATEWAY_PORT)),
            token: Zeroizing::new(token.into()),
            max_line_length: 64 * 1024,
            max_in_flight: 8,
        }
    }

    /// Builder method to set the listen address.
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }

    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max;
        self
    }

    /// Shared secret a session must present.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns a configuration error for an empty token or zero limits
    pub fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(SchemaportError::configuration(
                "Gateway token must not be empty",
            ));
        }
        if self.max_line_length < 1024 {
            return Err(SchemaportError::configuration(
                "max_line_length must be at least 1024 bytes",
            ));
        }
        if self.max_in_flight == 0 {
            return Err(SchemaportError::configuration(
                "max_in_flight must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Gateway service.
#[derive(Clone)]
pub struct Gateway {
    factory: Arc<dyn ConnectorFactory>,
    config: Arc<GatewayConfig>,
}

impl Gateway {
    /// Creates a gateway serving connectors from `factory`.
    ///
    /// # Errors
    /// Returns a configuration error if `config` does not validate
    pub fn new(factory: Arc<dyn ConnectorFactory>, config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            factory,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Serves one session over an already-established stream.
    ///
    /// Returns when the peer disconnects or the transport fails, after all
    /// of the session's in-flight requests have finished.
    pub async fn serve_connection<S>(&self, stream: S) -> SessionState
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        self.serve_connection_until(stream, CancellationToken::new())
            .await
    }

    /// Like [`Gateway::serve_connection`], also closing the session when
    /// `shutdown` is cancelled.
    pub async fn serve_connection_until<S>(
        &self,
        stream: S,
        shutdown: CancellationToken,
    ) -> SessionState
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        session::Session::new(Arc::clone(&self.factory), Arc::clone(&self.config))
            .run(stream, shutdown)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_to_loopback() {
        let config = GatewayConfig::new("token");
        assert!(config.bind.ip().is_loopback());
        assert_eq!(config.bind.port(), DEFAULT_GATEWAY_PORT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(GatewayConfig::new("  ").validate().is_err());
        assert!(GatewayConfig::new("t").with_max_in_flight(0).validate().is_err());
        assert!(GatewayConfig::new("t").with_max_line_length(10).validate().is_err());
    }

    #[test]
    fn test_debug_hides_token() {
        let config = GatewayConfig::new("very-secret-token");
        assert!(!format!("{:?}", config).contains("very-secret-token"));
    }
}
