// ────────────────────────────────
// src/server/builder.rs
// ────────────────────────────────
use crate::config::HealthConfig;
use crate::server::listener::bind_tcp;
use anyhow::{Context, Result};
use hyper::{server::conn::Http, Body, Request, Response};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::time::Instant;
use tower::{Service, ServiceBuilder};

/// Per-connection HTTP limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// Time allowed to receive request headers.
    pub read: Duration,
    /// Time allowed to produce a response.
    pub write: Duration,
    /// Time a connection may wait for its next request before it is closed.
    pub idle: Duration,
}

impl From<&HealthConfig> for HttpTimeouts {
    fn from(config: &HealthConfig) -> Self {
        Self {
            read: config.read_timeout,
            write: config.write_timeout,
            idle: config.idle_timeout,
        }
    }
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self::from(&HealthConfig::default())
    }
}

/// Builder pattern so the entry point can inject any request handler.
pub struct ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    addr: SocketAddr,
    handler: Option<H>,
    timeouts: HttpTimeouts,
}

impl<H> ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            handler: None,
            timeouts: HttpTimeouts::default(),
        }
    }

    pub fn with_handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_timeouts(mut self, timeouts: HttpTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Bind the configured address and serve until `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = bind_tcp(self.addr)
            .await
            .with_context(|| format!("health server error: cannot bind {}", self.addr))?;
        self.serve_listener(listener, signal).await
    }

    /// Serve connections from an already bound listener until `signal` resolves.
    /// Connections already accepted finish on their own.
    pub async fn serve_listener<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let handler = self
            .handler
            .context("handler must be set via with_handler()")?;
        let local_addr = listener.local_addr()?;
        let timeouts = self.timeouts;

        let mut http = Http::new();
        http.http1_header_read_timeout(timeouts.read);

        let service = ServiceBuilder::new()
            .timeout(timeouts.write)
            .service(handler);

        tracing::info!("HTTP server listening on {}", local_addr);
        tokio::pin!(signal);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(err) => {
                        tracing::warn!(%err, "failed to accept connection");
                        continue;
                    }
                },
                _ = &mut signal => break,
            };

            let http = http.clone();
            let activity = Arc::new(Notify::new());
            let svc = {
                let activity = activity.clone();
                ServiceBuilder::new()
                    .map_request(move |req: Request<Body>| {
                        activity.notify_one();
                        req
                    })
                    .service(service.clone())
            };

            // One Tokio task per connection.
            tokio::spawn(async move {
                let conn = http.serve_connection(stream, svc);
                tokio::pin!(conn);

                // Re-armed on every request; fires only on a quiet connection.
                let idle = tokio::time::sleep(timeouts.idle);
                tokio::pin!(idle);
                let mut closing = false;

                let result = loop {
                    tokio::select! {
                        res = conn.as_mut() => break res,
                        _ = activity.notified(), if !closing => {
                            idle.as_mut().reset(Instant::now() + timeouts.idle);
                        }
                        _ = &mut idle, if !closing => {
                            conn.as_mut().graceful_shutdown();
                            closing = true;
                        }
                    }
                };

                if let Err(err) = result {
                    tracing::warn!(%peer, %err, "connection error");
                }
            });
        }

        tracing::info!("HTTP server on {} stopped accepting connections", local_addr);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::Client;
    use std::convert::Infallible;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tower::service_fn;

    const REQUEST: &[u8] = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";

    async fn ok(_req: Request<Body>) -> Result<Response<Body>, Infallible> {
        Ok(Response::new(Body::from("ok")))
    }

    #[test]
    fn timeouts_follow_health_config() {
        let config = HealthConfig::default().with_http_timeouts(
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(3),
        );
        let timeouts = HttpTimeouts::from(&config);
        assert_eq!(timeouts.read, Duration::from_secs(1));
        assert_eq!(timeouts.write, Duration::from_secs(2));
        assert_eq!(timeouts.idle, Duration::from_secs(3));

        let defaults = HttpTimeouts::default();
        assert_eq!(defaults.read, Duration::from_secs(10));
        assert_eq!(defaults.write, Duration::from_secs(10));
        assert_eq!(defaults.idle, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn serving_without_handler_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let err = ServerBuilder::<crate::server::HealthHandler>::new(addr)
            .serve_listener(listener, std::future::pending())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("with_handler"));
    }

    #[tokio::test]
    async fn serves_until_signal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let server = tokio::spawn(
            ServerBuilder::new(addr)
                .with_handler(service_fn(ok))
                .serve_listener(listener, async {
                    rx.await.ok();
                }),
        );

        let response = Client::new()
            .get(format!("http://{}/", addr).parse().unwrap())
            .await
            .unwrap();
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], b"ok");

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }

    /// Serve a handler answering "ok" after `delay` with the given limits.
    async fn serve_with(timeouts: HttpTimeouts, delay: Duration) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handler = service_fn(move |_req: Request<Body>| async move {
            tokio::time::sleep(delay).await;
            Ok::<_, Infallible>(Response::new(Body::from("ok")))
        });

        tokio::spawn(
            ServerBuilder::new(addr)
                .with_handler(handler)
                .with_timeouts(timeouts)
                .serve_listener(listener, std::future::pending()),
        );
        addr
    }

    /// Read until the server closes the socket, or fail after two seconds.
    async fn read_until_closed(stream: &mut TcpStream) -> Vec<u8> {
        let mut buf = Vec::new();
        // A reset counts as closed too, so only the timeout matters.
        let _ = tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut buf))
            .await
            .expect("server kept the connection open");
        buf
    }

    /// Send one request and read its complete response ("ok" body).
    async fn round_trip(stream: &mut TcpStream) {
        stream.write_all(REQUEST).await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 512];
        while !buf.ends_with(b"ok") {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed mid-response");
            buf.extend_from_slice(&chunk[..n]);
        }
        assert!(buf.starts_with(b"HTTP/1.1 200"));
    }

    #[tokio::test]
    async fn partial_headers_are_dropped_after_read_timeout() {
        let timeouts = HttpTimeouts {
            read: Duration::from_millis(200),
            write: Duration::from_secs(5),
            idle: Duration::from_secs(5),
        };
        let addr = serve_with(timeouts, Duration::ZERO).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\nHost: loc").await.unwrap();

        let started = Instant::now();
        let response = read_until_closed(&mut stream).await;
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert!(!response.starts_with(b"HTTP/1.1 200"));
    }

    #[tokio::test]
    async fn quiet_connection_is_closed_after_idle_timeout() {
        let timeouts = HttpTimeouts {
            read: Duration::from_secs(5),
            write: Duration::from_secs(5),
            idle: Duration::from_millis(300),
        };
        let addr = serve_with(timeouts, Duration::ZERO).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        round_trip(&mut stream).await;

        let started = Instant::now();
        let rest = read_until_closed(&mut stream).await;
        assert!(rest.is_empty());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn busy_connection_outlives_idle_timeout() {
        let timeouts = HttpTimeouts {
            read: Duration::from_secs(5),
            write: Duration::from_secs(5),
            idle: Duration::from_millis(300),
        };
        let addr = serve_with(timeouts, Duration::ZERO).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let started = Instant::now();
        for _ in 0..5 {
            round_trip(&mut stream).await;
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        // Well past one idle period, still on the same connection.
        assert!(started.elapsed() >= Duration::from_millis(600));
        round_trip(&mut stream).await;
    }

    #[tokio::test]
    async fn slow_handler_is_cut_off_by_write_timeout() {
        let timeouts = HttpTimeouts {
            read: Duration::from_secs(5),
            write: Duration::from_millis(100),
            idle: Duration::from_secs(5),
        };
        let addr = serve_with(timeouts, Duration::from_millis(500)).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(REQUEST).await.unwrap();

        let started = Instant::now();
        let response = read_until_closed(&mut stream).await;
        assert!(!response.starts_with(b"HTTP/1.1 200"));
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
