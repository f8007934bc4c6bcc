//! DNS-over-HTTPS outbound client (RFC 8484, §6.2), using `reqwest` as the teacher already does
//! for its outbound HTTP needs.

use async_trait::async_trait;
use reqwest::Client;

use crate::config::DnsUpstream;
use crate::dns::Message;
use crate::error::{ForwarderError, Result};

pub struct HttpsResolver {
    upstream: DnsUpstream,
    client: Client,
}

impl HttpsResolver {
    pub fn new(upstream: DnsUpstream) -> Result<Self> {
        let mut builder = Client::builder().timeout(super::timeout_duration(&upstream));
        if let Some(proxy_addr) = &upstream.socks5_address {
            let proxy = reqwest::Proxy::all(format!("socks5h://{proxy_addr}"))
                .map_err(|e| ForwarderError::Config(e.to_string()))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| ForwarderError::Config(e.to_string()))?;
        Ok(HttpsResolver { upstream, client })
    }
}

#[async_trait]
impl super::Resolver for HttpsResolver {
    async fn exchange(&self, query: &Message) -> Result<Message> {
        let wire = query.to_bytes();
        let response = self
            .client
            .post(&self.upstream.address)
            .header("content-type", "application/dns-message")
            .header("accept", "application/dns-message")
            .body(wire)
            .send()
            .await
            .map_err(|e| ForwarderError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ForwarderError::Transport(format!(
                "DoH upstream returned {}",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ForwarderError::Transport(e.to_string()))?;

        Message::from_bytes(&body).map_err(ForwarderError::from)
    }

    fn name(&self) -> &str {
        &self.upstream.name
    }
}
