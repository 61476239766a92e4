//! Listener loop
//!
//! TLS connections are terminated with tokio-rustls and handed to hyper's
//! auto (HTTP/1 + HTTP/2) connection builder. Plain HTTP goes through
//! `axum::serve`.

use crate::tls::TlsError;
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use rustls::ServerConfig;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Could not bind the listen address
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Listen address
        addr: SocketAddr,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// TLS material invalid
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// Plain HTTP server failed
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport security of the listener
#[derive(Clone)]
pub enum Transport {
    /// Terminate TLS with this config
    Tls(Arc<ServerConfig>),
    /// Plain HTTP
    Insecure,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Tls(_) => "Tls",
            Self::Insecure => "Insecure",
        })
    }
}

/// Bind `addr`
///
/// # Errors
/// Returns [`ServerError::Bind`] if the address is unavailable.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Serve `app` on `listener` until `shutdown` resolves
///
/// # Errors
/// Returns error if the plain HTTP server fails.
pub async fn serve<F>(listener: TcpListener, app: Router, transport: Transport, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    match transport {
        Transport::Insecure => {
            warn!("serving plain HTTP; the API server requires TLS for admission webhooks");
            axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;
            Ok(())
        }
        Transport::Tls(config) => {
            serve_tls(listener, app, TlsAcceptor::from(config), shutdown).await;
            Ok(())
        }
    }
}

/// Resolve on Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

async fn serve_tls<F>(listener: TcpListener, app: Router, acceptor: TlsAcceptor, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            () = &mut shutdown => {
                info!("shutdown signal received, no longer accepting connections");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(err) => {
                    warn!(error = %err, "failed to accept connection");
                    continue;
                }
            },
        };

        let acceptor = acceptor.clone();
        let service = TowerToHyperService::new(app.clone());
        tokio::spawn(async move {
            let tls = match acceptor.accept(stream).await {
                Ok(tls) => tls,
                Err(err) => {
                    debug!(peer = %peer, error = %err, "TLS handshake failed");
                    return;
                }
            };
            if let Err(err) = auto::Builder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(tls), service)
                .await
            {
                debug!(peer = %peer, error = %err, "connection closed with error");
            }
        });
    }
}
