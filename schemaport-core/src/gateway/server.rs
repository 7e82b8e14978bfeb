//! TCP accept loop.

use super::Gateway;
use crate::Result;
use crate::error::SchemaportError;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

impl Gateway {
    /// Binds the configured address and serves sessions until `shutdown`.
    ///
    /// # Errors
    /// Returns an I/O error if the address cannot be bound
    pub async fn bind_and_serve(&self, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind)
            .await
            .map_err(|e| SchemaportError::Io {
                context: format!("Failed to bind gateway to {}", self.config.bind),
                source: e,
            })?;
        self.serve(listener, shutdown).await;
        Ok(())
    }

    /// Accepts sessions from `listener` until `shutdown` is cancelled.
    ///
    /// Open sessions are closed too; their in-flight requests finish before
    /// this returns.
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) {
        match listener.local_addr() {
            Ok(addr) => tracing::info!(address = %addr, "Gateway listening"),
            Err(e) => tracing::warn!(error = %e, "Gateway listening on unknown address"),
        }

        let mut sessions = JoinSet::new();
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!("Gateway shutting down");
                    break;
                }
                accepted = listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };
                    tracing::debug!(peer = %peer, "New connection");
                    if let Err(e) = socket.set_nodelay(true) {
                        tracing::debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                    }

                    let gateway = self.clone();
                    let session_shutdown = shutdown.child_token();
                    sessions.spawn(async move {
                        gateway.serve_connection_until(socket, session_shutdown).await;
                    });
                }
                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
            }
        }

        drop(listener);
        while sessions.join_next().await.is_some() {}
    }
}
