//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use hosting_bridge::config::BridgeConfig;
use hosting_bridge::{BridgeSettings, FrontEnd, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Start a raw HTTP/1.1 backend that answers every request with `body`,
/// adding `extra_headers` verbatim. Each request head it receives is sent
/// on the returned channel.
pub async fn start_mock_backend(
    addr: SocketAddr,
    extra_headers: &'static str,
    body: &'static str,
) -> mpsc::UnboundedReceiver<String> {
    let listener = TcpListener::bind(addr).await.unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 8192];
                        let mut read = 0;
                        while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut buf[read..]).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => read += n,
                            }
                        }
                        let _ = tx.send(String::from_utf8_lossy(&buf[..read]).to_string());

                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}\r\n{}",
                            body.len(),
                            extra_headers,
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    rx
}

/// Serve an axum application on `addr`.
pub async fn start_app_backend(addr: SocketAddr, app: Router) {
    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
}

/// Prepare and run a front end. Returns the settings it was built from and
/// the shutdown handle that stops it.
pub async fn start_front_end(config: BridgeConfig, app: Option<Router>) -> (BridgeSettings, Shutdown) {
    let settings = BridgeSettings::prepare(&config).unwrap();
    let front_end = FrontEnd::new(config, &settings, app).unwrap();

    let shutdown = Shutdown::new();
    let handle = shutdown.clone();
    tokio::spawn(async move {
        let _ = front_end.run(handle).await;
    });

    // Give listeners a moment to bind.
    tokio::time::sleep(Duration::from_millis(300)).await;
    (settings, shutdown)
}

/// A client that never reuses connections and never follows redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}
