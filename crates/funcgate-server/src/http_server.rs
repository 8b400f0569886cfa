//! HTTP server front end.
//!
//! Thin hyper layer: one tokio task per connection, all routing decisions
//! delegated to [`GatewayRouter`]. The response type is infallible; every
//! failure below this point has already been rendered into a JSON envelope.

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::gateway::Gateway;
use crate::router::GatewayRouter;
use funcgate_common::{GatewayError, Result};

pub struct HttpServer {
    router: Arc<GatewayRouter>,
}

impl HttpServer {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            router: Arc::new(GatewayRouter::new(gateway)),
        }
    }

    /// Binds `addr` and serves until the process exits.
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Transport(format!("failed to bind {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| GatewayError::Transport(format!("failed to get local address: {}", e)))?;
        tracing::info!(addr = %local_addr, "gateway listening");

        self.serve(listener).await
    }

    /// Accept loop over an already bound listener; split out so tests can
    /// bind port 0 themselves.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, _) = listener
                .accept()
                .await
                .map_err(|e| GatewayError::Transport(format!("failed to accept: {}", e)))?;

            let io = TokioIo::new(stream);
            let router = self.router.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let router = router.clone();
                    async move { Ok::<_, Infallible>(router.route(req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::debug!(error = %err, "error serving connection");
                }
            });
        }
    }
}
