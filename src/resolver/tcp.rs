use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::config::DnsUpstream;
use crate::dns::Message;
use crate::error::{ForwarderError, Result};

use super::socks5;

/// A single TCP exchange: length-prefixed (RFC 1035 §4.2.2) query, length-prefixed response.
pub struct TcpResolver {
    upstream: DnsUpstream,
}

impl TcpResolver {
    pub fn new(upstream: DnsUpstream) -> Self {
        TcpResolver { upstream }
    }

    pub async fn exchange_on_stream(upstream: &DnsUpstream, query: &Message) -> Result<Message> {
        let fut = async {
            let mut stream = socks5::connect(&upstream.address, upstream.socks5_address.as_deref()).await?;

            let wire = query.to_bytes();
            let mut framed = Vec::with_capacity(2 + wire.len());
            framed.extend_from_slice(&(wire.len() as u16).to_be_bytes());
            framed.extend_from_slice(&wire);
            stream
                .write_all(&framed)
                .await
                .map_err(|e| ForwarderError::Transport(e.to_string()))?;

            let mut len_buf = [0u8; 2];
            stream
                .read_exact(&mut len_buf)
                .await
                .map_err(|e| ForwarderError::Transport(e.to_string()))?;
            let len = u16::from_be_bytes(len_buf) as usize;

            let mut body = vec![0u8; len];
            stream
                .read_exact(&mut body)
                .await
                .map_err(|e| ForwarderError::Transport(e.to_string()))?;

            Message::from_bytes(&body).map_err(ForwarderError::from)
        };

        tokio::time::timeout(super::timeout_duration(upstream), fut)
            .await
            .map_err(|_| ForwarderError::Timeout)?
    }
}

#[async_trait]
impl super::Resolver for TcpResolver {
    async fn exchange(&self, query: &Message) -> Result<Message> {
        Self::exchange_on_stream(&self.upstream, query).await
    }

    fn name(&self) -> &str {
        &self.upstream.name
    }
}
