//! DNS-over-TLS outbound client (§6.2). Unlike the teacher's `transport/dot.rs`, which terminates
//! *inbound* DoT connections and therefore presents a server certificate, this resolver is a
//! *client*: it validates the upstream's certificate against the OS trust store.

use std::sync::Arc;

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_rustls::TlsConnector;

use crate::config::DnsUpstream;
use crate::dns::Message;
use crate::error::{ForwarderError, Result};

use super::socks5;

pub struct TlsResolver {
    upstream: DnsUpstream,
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl TlsResolver {
    pub fn new(upstream: DnsUpstream) -> Result<Self> {
        let mut roots = rustls::RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        for cert in native.certs {
            let _ = roots.add(cert);
        }

        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        let host = upstream
            .address
            .rsplit_once(':')
            .map(|(h, _)| h)
            .unwrap_or(upstream.address.as_str())
            .to_string();
        let server_name = ServerName::try_from(host)
            .map_err(|_| ForwarderError::Config("invalid DoT server name".into()))?;

        Ok(TlsResolver {
            upstream,
            connector: TlsConnector::from(Arc::new(config)),
            server_name,
        })
    }
}

#[async_trait]
impl super::Resolver for TlsResolver {
    async fn exchange(&self, query: &Message) -> Result<Message> {
        let fut = async {
            let tcp = socks5::connect(&self.upstream.address, self.upstream.socks5_address.as_deref()).await?;
            let mut stream = self
                .connector
                .connect(self.server_name.clone(), tcp)
                .await
                .map_err(|e| ForwarderError::Transport(e.to_string()))?;

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

        tokio::time::timeout(super::timeout_duration(&self.upstream), fut)
            .await
            .map_err(|_| ForwarderError::Timeout)?
    }

    fn name(&self) -> &str {
        &self.upstream.name
    }
}
