//! SOCKS5-tunnelled TCP connect helper shared by the TCP, DoT resolvers (§6.2). No example in the
//! retrieval pack proxies outbound connections; `tokio-socks` is the standard async SOCKS5 client
//! crate for a tokio codebase (see DESIGN.md).

use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;

use crate::error::{ForwarderError, Result};

pub async fn connect(address: &str, socks5_address: Option<&str>) -> Result<TcpStream> {
    match socks5_address {
        None => TcpStream::connect(address)
            .await
            .map_err(|e| ForwarderError::Transport(e.to_string())),
        Some(proxy) => Socks5Stream::connect(proxy, address)
            .await
            .map(Socks5Stream::into_inner)
            .map_err(|e| ForwarderError::Transport(e.to_string())),
    }
}
