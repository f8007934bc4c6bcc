//! Domain-replace, IP-replace, and IP-block tables applied by the inbound server (§4.10, §6.7).

pub mod domain;
pub mod ip;

pub use domain::DomainReplace;
pub use ip::IpReplace;
