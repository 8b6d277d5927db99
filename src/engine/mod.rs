//! Async FTP protocol engine.
//!
//! The engine owns the listening socket and runs one task per control
//! connection. It is transport-generic: the same command loop drives
//! plaintext sessions and sessions upgraded to TLS via `AUTH TLS`.

mod session;

use tokio_util::sync::CancellationToken;

use crate::auth::UserRegistry;

/// How control and data channels are (optionally) TLS-terminated.
#[derive(Clone)]
pub enum HandlerKind {
    Plain,
    Tls(tokio_rustls::TlsAcceptor),
}

pub struct FtpEngine {
    listener: std::net::TcpListener,
    registry: std::sync::Arc<UserRegistry>,
    handler: HandlerKind,
}

impl FtpEngine {
    pub fn new(
        listener: std::net::TcpListener,
        registry: UserRegistry,
        handler: HandlerKind,
    ) -> Self {
        FtpEngine {
            listener,
            registry: std::sync::Arc::new(registry),
            handler,
        }
    }

    /// Accepts control connections until cancelled, then closes the
    /// listening socket and tears down the remaining sessions.
    pub async fn serve_forever(self, cancel: CancellationToken) -> anyhow::Result<()> {
        self.listener.set_nonblocking(true)?;
        let listener = tokio::net::TcpListener::from_std(self.listener)?;
        let mut sessions = tokio::task::JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((socket, peer)) => {
                            tracing::debug!("accepted control connection from {peer}");
                            let registry = self.registry.clone();
                            let handler = self.handler.clone();
                            sessions.spawn(async move {
                                if let Err(error) = session::run(socket, registry, handler).await {
                                    tracing::debug!("session from {peer} ended: {error:#}");
                                }
                            });
                        }
                        Err(error) => tracing::warn!("accept failed: {error}"),
                    }
                }
                _ = cancel.cancelled() => break,
            }
            // reap finished sessions without blocking the accept loop
            while sessions.try_join_next().is_some() {}
        }
        // close the listening socket before aborting sessions so new
        // connections are refused immediately
        drop(listener);
        sessions.abort_all();
        while sessions.join_next().await.is_some() {}
        Ok(())
    }
}
