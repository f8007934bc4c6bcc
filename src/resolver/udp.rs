//! UDP resolver with the embedded-TCP truncation fallback from §4.4, grounded literally on
//! `original_source/core/outbound/clients/resolver/udp_resolver.go`.

use async_trait::async_trait;
use tokio::net::UdpSocket;

use crate::config::{DnsUpstream, Protocol};
use crate::dns::Message;
use crate::error::{ForwarderError, Result};

use super::tcp::TcpResolver;
use super::Resolver as _;

pub struct UdpResolver {
    upstream: DnsUpstream,
    tcp: TcpResolver,
}

impl UdpResolver {
    pub fn new(upstream: DnsUpstream) -> Result<Self> {
        // Same name suffixed " - tcp", same address/timeout/ECS/SOCKS5 — exactly
        // `UDPResolver.Init()` in the source this is grounded on.
        let mut tcp_upstream = upstream.clone();
        tcp_upstream.name = format!("{} - tcp", upstream.name);
        tcp_upstream.protocol = Protocol::Tcp;

        Ok(UdpResolver {
            upstream,
            tcp: TcpResolver::new(tcp_upstream),
        })
    }

    async fn exchange_udp(&self, query: &Message) -> Result<Message> {
        let fut = async {
            let socket = UdpSocket::bind("0.0.0.0:0")
                .await
                .map_err(|e| ForwarderError::Transport(e.to_string()))?;
            socket
                .connect(&self.upstream.address)
                .await
                .map_err(|e| ForwarderError::Transport(e.to_string()))?;

            let wire = query.to_bytes();
            socket
                .send(&wire)
                .await
                .map_err(|e| ForwarderError::Transport(e.to_string()))?;

            let mut buf = vec![0u8; 4096];
            let len = socket
                .recv(&mut buf)
                .await
                .map_err(|e| ForwarderError::Transport(e.to_string()))?;

            Message::from_bytes(&buf[..len]).map_err(ForwarderError::from)
        };

        tokio::time::timeout(super::timeout_duration(&self.upstream), fut)
            .await
            .map_err(|_| ForwarderError::Timeout)?
    }
}

#[async_trait]
impl super::Resolver for UdpResolver {
    async fn exchange(&self, query: &Message) -> Result<Message> {
        let response = self.exchange_udp(query).await?;
        if response.tc {
            tracing::debug!(qname = ?query.question().map(|q| q.qname.to_string()), "truncated UDP response, retrying over TCP");
            return self.tcp.exchange(query).await;
        }
        Ok(response)
    }

    fn name(&self) -> &str {
        &self.upstream.name
    }
}
