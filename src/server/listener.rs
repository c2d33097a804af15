// ────────────────────────────────
// src/server/listener.rs
// TCP bind for the health listener; tests bind ephemeral ports themselves.
// ────────────────────────────────
use anyhow::Result;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpSocket};

const BACKLOG: u32 = 1024;

/// Bind with `SO_REUSEADDR` so a restarted process can reclaim its port
/// while old connections sit in TIME_WAIT.
pub async fn bind_tcp(addr: SocketAddr) -> Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    #[cfg(unix)]
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    Ok(socket.listen(BACKLOG)?)
}
