//! HTTP dev server used in server mode.
//!
//! Serves the content base, answers unknown paths with the index page so
//! client-side routing works, and gzip-compresses responses.

use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::services::{ServeDir, ServeFile};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Dev server needs a bundler port but none was allocated")]
    NoPort,

    #[error("Failed to bind dev server on {host}:{port}: {source}")]
    Bind {
        host: String,
        port: u16,
        source: std::io::Error,
    },
}

pub struct DevServer {
    pub addr: SocketAddr,
    pub shutdown: watch::Sender<bool>,
}

/// Bind and start serving. Returns once the listener is bound.
pub async fn listen(
    content_base: &Path,
    index: &str,
    host: &str,
    port: u16,
) -> Result<DevServer, ServerError> {
    let listener = TcpListener::bind((host, port))
        .await
        .map_err(|source| ServerError::Bind {
            host: host.to_string(),
            port,
            source,
        })?;
    let addr = listener.local_addr().map_err(|source| ServerError::Bind {
        host: host.to_string(),
        port,
        source,
    })?;

    let service = ServiceBuilder::new()
        .layer(CompressionLayer::new())
        .service(ServeDir::new(content_base).fallback(ServeFile::new(content_base.join(index))));

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::debug!("dev server stopped");
                        break;
                    }
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let service = TowerToHyperService::new(service.clone());
                            tokio::spawn(async move {
                                if let Err(e) = Builder::new(TokioExecutor::new())
                                    .serve_connection(TokioIo::new(stream), service)
                                    .await
                                {
                                    tracing::debug!(error = %e, "dev server connection ended");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "dev server accept failed");
                        }
                    }
                }
            }
        }
    });

    tracing::info!(%addr, "dev server listening");
    Ok(DevServer {
        addr,
        shutdown: shutdown_tx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request =
            format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn serves_files_and_falls_back_to_index() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("index.html"), "<h1>app</h1>").unwrap();
        std::fs::write(temp.path().join("style.css"), "body{}").unwrap();

        let server = listen(temp.path(), "index.html", "127.0.0.1", 0).await.unwrap();

        let css = get(server.addr, "/style.css").await;
        assert!(css.starts_with("HTTP/1.1 200"));
        assert!(css.ends_with("body{}"));

        let routed = get(server.addr, "/users/42").await;
        assert!(routed.starts_with("HTTP/1.1 200"));
        assert!(routed.ends_with("<h1>app</h1>"));

        server.shutdown.send(true).unwrap();
    }

    #[tokio::test]
    async fn port_in_use_is_a_bind_error() {
        let held = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = held.local_addr().unwrap().port();
        let temp = TempDir::new().unwrap();
        let err = listen(temp.path(), "index.html", "127.0.0.1", port)
            .await
            .err()
            .expect("bind fails");
        assert!(matches!(err, ServerError::Bind { .. }));
    }
}
