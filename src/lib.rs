pub mod bundle;
pub mod cache;
pub mod client;
pub mod coalesce;
pub mod config;
pub mod dispatcher;
pub mod dns;
pub mod domain_ttl;
pub mod error;
pub mod graceful_shutdown;
pub mod http_server;
pub mod ipset;
pub mod local_client;
pub mod matcher;
pub mod metrics;
pub mod replace;
pub mod resolver;
pub mod server;
