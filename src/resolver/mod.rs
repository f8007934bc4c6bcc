//! Outbound resolver variants (§4.3, §6.2): one `Resolver` implementation per transport, each
//! wrapping a single upstream and enforcing its configured per-exchange timeout.

mod https;
mod socks5;
mod tcp;
mod tls;
mod udp;

pub use https::HttpsResolver;
pub use tcp::TcpResolver;
pub use tls::TlsResolver;
pub use udp::UdpResolver;

use async_trait::async_trait;
use std::time::Duration;

use crate::config::{DnsUpstream, Protocol};
use crate::dns::Message;
use crate::error::Result;

#[async_trait]
pub trait Resolver: Send + Sync {
    async fn exchange(&self, query: &Message) -> Result<Message>;

    fn name(&self) -> &str;
}

/// Builds the concrete resolver for an upstream's configured protocol (§4.3). UDP resolvers come
/// pre-wrapped with their TCP truncation fallback (§4.4).
pub fn build_resolver(upstream: &DnsUpstream) -> Result<Box<dyn Resolver>> {
    match upstream.protocol {
        Protocol::Udp => Ok(Box::new(UdpResolver::new(upstream.clone())?)),
        Protocol::Tcp => Ok(Box::new(TcpResolver::new(upstream.clone()))),
        Protocol::TcpTls => Ok(Box::new(TlsResolver::new(upstream.clone())?)),
        Protocol::Https => Ok(Box::new(HttpsResolver::new(upstream.clone())?)),
    }
}

pub(crate) fn timeout_duration(upstream: &DnsUpstream) -> Duration {
    Duration::from_millis(upstream.timeout_ms)
}
