//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::service::router;
use crate::error::Result;
use crate::ratelimit::{RateLimiter, SharedStateBackend};

/// HTTP server exposing one rate limiter for the life of the process.
pub struct HttpServer<B: SharedStateBackend + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    /// The rate limiter instance
    limiter: Arc<RateLimiter<B>>,
}

impl<B: SharedStateBackend + 'static> HttpServer<B> {
    pub fn new(addr: SocketAddr, limiter: Arc<RateLimiter<B>>) -> Self {
        Self { addr, limiter }
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// In-flight requests are drained once `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            e
        })?;

        info!(
            addr = %listener.local_addr()?,
            "Starting HTTP server for rate limiter with graceful shutdown"
        );

        axum::serve(listener, router(self.limiter))
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                e.into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;

    #[tokio::test]
    async fn test_server_creation() {
        let limiter = Arc::new(RateLimiter::new(Arc::new(MemoryBackend::new())));
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = HttpServer::new(addr, limiter);
        assert_eq!(server.addr, addr);
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown_signal() {
        let limiter = Arc::new(RateLimiter::new(Arc::new(MemoryBackend::new())));
        let server = HttpServer::new("127.0.0.1:0".parse().unwrap(), limiter);

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            server.serve_with_shutdown(async {}),
        )
        .await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_bind_failure_is_io_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();
        let limiter = Arc::new(RateLimiter::new(Arc::new(MemoryBackend::new())));

        let result = HttpServer::new(addr, limiter)
            .serve_with_shutdown(async {})
            .await;
        assert!(matches!(result, Err(crate::error::RatekeeperError::Io(_))));
    }
}
