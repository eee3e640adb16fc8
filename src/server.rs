//! HTTP health endpoint.
//!
//! One plaintext banner route, used both by external health checks and by
//! the crate's own liveness prober. The socket binds once at startup; a bind
//! failure is a startup failure.

use std::net::{Ipv4Addr, SocketAddr};

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::Result;

const BANNER: &str = concat!(
    "chatline ",
    env!("CARGO_PKG_VERSION"),
    " - bot session alive\n"
);

/// Liveness endpoint on a dedicated listener.
pub struct HealthServer {
    listener: TcpListener,
}

impl HealthServer {
    /// Bind the health listener. Port 0 picks an ephemeral port.
    pub async fn bind(port: u16) -> Result<Self> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "health endpoint listening");
        Ok(Self { listener })
    }

    /// The bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve connections forever.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(handle_request);
                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await
                        {
                            error!(%addr, error = %err, "error serving health connection");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "error accepting health connection");
                }
            }
        }
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/" | "/health") => Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/plain")
            .body(Full::new(Bytes::from_static(BANNER.as_bytes()))),
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from_static(b"not found\n"))),
    };

    // Static response construction cannot fail at runtime.
    Ok(response.unwrap_or_else(|_| Response::new(Full::new(Bytes::new()))))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn started() -> SocketAddr {
        let server = HealthServer::bind(0).await.expect("bind failed");
        let addr = server.local_addr().expect("missing addr");
        tokio::spawn(server.run());
        addr
    }

    #[tokio::test]
    async fn root_returns_banner() {
        let addr = started().await;

        let body = reqwest::get(format!("http://{addr}/"))
            .await
            .expect("request failed")
            .error_for_status()
            .expect("non-success status")
            .text()
            .await
            .expect("missing body");

        assert!(body.contains("chatline"), "banner should name the service");
    }

    #[tokio::test]
    async fn health_alias_matches_root() {
        let addr = started().await;

        let status = reqwest::get(format!("http://{addr}/health"))
            .await
            .expect("request failed")
            .status();

        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let addr = started().await;

        let status = reqwest::get(format!("http://{addr}/metrics"))
            .await
            .expect("request failed")
            .status();

        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
