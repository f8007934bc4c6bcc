//! Process entry point: parses CLI flags, loads config, builds the dispatch pipeline, and runs
//! the inbound listeners to completion. Grounded on the library's own `config`/`graceful_shutdown`
//! modules for wiring order, and on `clap::Parser` + `tracing_subscriber::EnvFilter` as the
//! dependency stack already carries (the crate's original binary entry point predates this
//! codebase's real server/config/dispatcher modules and isn't a useful style reference here).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use meridian::cache::Cache;
use meridian::coalesce::Coalescer;
use meridian::config::Config;
use meridian::dispatcher::Dispatcher;
use meridian::domain_ttl;
use meridian::graceful_shutdown::GracefulShutdown;
use meridian::http_server::DebugHttpServer;
use meridian::ipset::IpSet;
use meridian::local_client::LocalClient;
use meridian::matcher::{self, Matcher};
use meridian::metrics::ForwarderMetrics;
use meridian::replace::ip::block;
use meridian::replace::{DomainReplace, IpReplace};
use meridian::server::{run_tcp_server, run_udp_server, InboundServer};

#[derive(Parser, Debug)]
#[command(name = "meridiand", about = "Split-horizon recursive DNS forwarder")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,
}

fn ip_set_from_file(path: &Option<String>) -> IpSet {
    match path {
        Some(p) => {
            let p = Path::new(p);
            match std::fs::read_to_string(p) {
                Ok(raw) => IpSet::from_strs(
                    raw.lines()
                        .filter(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#')),
                ),
                Err(e) => {
                    warn!(path = %p.display(), error = %e, "failed to load IP-network file, continuing without it");
                    IpSet::default()
                }
            }
        }
        None => IpSet::default(),
    }
}

fn matcher_from_file(path: &Option<String>, matcher_name: &Option<String>) -> Box<dyn Matcher> {
    let mut m = matcher::matcher_by_name(matcher_name.as_deref().unwrap_or("full-map"));
    if let Some(p) = path {
        match std::fs::read_to_string(p) {
            Ok(raw) => {
                for line in raw.lines() {
                    let line = line.split('#').next().unwrap_or("").trim();
                    if line.is_empty() {
                        continue;
                    }
                    if let Err(e) = m.insert(line) {
                        warn!(pattern = line, error = %e, "failed to insert domain pattern");
                    }
                }
            }
            Err(e) => {
                warn!(path = p, error = %e, "failed to load domain file, continuing without it");
            }
        }
    }
    m
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    info!(config = %cli.config.display(), "configuration loaded");

    let local = match &config.hosts_file.hosts_file {
        Some(p) => LocalClient::load(Path::new(p)),
        None => LocalClient::empty(),
    };

    let ip_network_primary = ip_set_from_file(&config.ip_network_file.primary);
    let ip_network_alternative = ip_set_from_file(&config.ip_network_file.alternative);

    let domain_primary = matcher_from_file(&config.domain_file.primary, &config.domain_file.matcher);
    let domain_alternative =
        matcher_from_file(&config.domain_file.alternative, &config.domain_file.matcher);
    let domain_block = matcher_from_file(&config.domain_file.block, &config.domain_file.matcher);

    let domain_ttl_map = match &config.domain_ttl_file {
        Some(p) => domain_ttl::load(Path::new(p)),
        None => Vec::new(),
    };

    let domain_replace = match &config.domain_replace_file {
        Some(p) => DomainReplace::load(Path::new(p)),
        None => DomainReplace::empty(),
    };
    let ip_replace = match &config.ip_replace_file {
        Some(p) => IpReplace::load(Path::new(p)),
        None => IpReplace::empty(),
    };
    let block_ips = match &config.ip_block_file {
        Some(p) => block::load(Path::new(p)),
        None => IpSet::default(),
    };

    let cache = Arc::new(Cache::new(config.cache_size));
    let coalescer = Arc::new(Coalescer::default());
    let metrics = Arc::new(ForwarderMetrics::new().map_err(|e| {
        Box::<dyn std::error::Error + Send + Sync>::from(format!("metrics init failed: {e}"))
    })?);

    let dispatcher = Arc::new(Dispatcher::new(
        &config,
        local,
        ip_network_primary,
        ip_network_alternative,
        domain_primary,
        domain_alternative,
        domain_ttl_map,
        cache.clone(),
        coalescer,
    )?);

    let inbound = Arc::new(InboundServer::new(
        dispatcher,
        domain_replace,
        domain_block,
        block_ips,
        ip_replace,
        &config.reject_qtype,
        metrics.clone(),
    ));

    let shutdown = Arc::new(GracefulShutdown::new());

    for addr in &config.bind_address {
        let addr: SocketAddr = addr.parse()?;
        let server = inbound.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = run_udp_server(addr, server, shutdown_rx).await {
                error!(addr = %addr, error = %e, "UDP listener exited with an error");
            }
        });

        let server = inbound.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = run_tcp_server(addr, server, shutdown_rx).await {
                error!(addr = %addr, error = %e, "TCP listener exited with an error");
            }
        });
    }

    if let Some(debug_addr) = &config.debug_http_address {
        let addr: SocketAddr = debug_addr.parse()?;
        let debug_server = DebugHttpServer::new(cache.clone(), metrics.clone(), addr);
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = debug_server.run(shutdown_rx).await {
                error!(addr = %addr, error = %e, "debug HTTP listener exited with an error");
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    shutdown.shutdown().await?;

    Ok(())
}
