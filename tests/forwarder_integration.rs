//! End-to-end dispatcher test against a real (loopback) UDP upstream, in the style of this
//! repository's socket-based integration tests — no mocked transport layer, just a fake upstream
//! bound on `127.0.0.1:0`.

use std::net::IpAddr;
use std::sync::Arc;

use meridian::cache::Cache;
use meridian::coalesce::Coalescer;
use meridian::config::{Config, DnsUpstream, EdnsClientSubnetConfig, Protocol};
use meridian::dispatcher::Dispatcher;
use meridian::dns::{Message, Name, RData, Record, RecordClass, RecordType, Question};
use meridian::ipset::IpSet;
use meridian::local_client::LocalClient;
use meridian::matcher::FullSetMatcher;
use tokio::net::UdpSocket;

async fn spawn_fake_upstream(answer_ip: std::net::Ipv4Addr) -> String {
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = sock.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 512];
        loop {
            let Ok((len, src)) = sock.recv_from(&mut buf).await else {
                break;
            };
            let Ok(query) = Message::from_bytes(&buf[..len]) else {
                continue;
            };
            let Some(question) = query.question().cloned() else {
                continue;
            };
            let mut response = Message::query(query.id, question.clone());
            response.qr = true;
            response.ra = true;
            response.answers.push(Record {
                name: question.qname.clone(),
                rtype: RecordType::A,
                rclass: RecordClass::IN,
                ttl: 300,
                rdata: RData::A(answer_ip),
            });
            let _ = sock.send_to(&response.to_bytes(), src).await;
        }
    });

    addr
}

fn upstream(name: &str, address: String) -> DnsUpstream {
    DnsUpstream {
        name: name.to_string(),
        address,
        protocol: Protocol::Udp,
        socks5_address: None,
        timeout_ms: 2000,
        edns_client_subnet: EdnsClientSubnetConfig::default(),
    }
}

fn a_query(qname: &str) -> Message {
    Message::query(
        7,
        Question {
            qname: Name::from_str_lossy(qname),
            qtype: RecordType::A,
            qclass: RecordClass::IN,
        },
    )
}

#[tokio::test]
async fn dispatch_resolves_through_primary_upstream() {
    let answer = "93.184.216.34".parse().unwrap();
    let addr = spawn_fake_upstream(answer).await;

    let config = Config {
        bind_address: vec!["127.0.0.1:0".to_string()],
        debug_http_address: None,
        primary_dns: vec![upstream("primary-1", addr)],
        alternative_dns: vec![],
        only_primary_dns: false,
        ipv6_use_alternative_dns: false,
        redirect_ipv6_record: false,
        alternative_dns_concurrent: false,
        alternative_first: false,
        when_primary_dns_answer_none_use: Default::default(),
        ip_network_file: Default::default(),
        domain_file: Default::default(),
        hosts_file: Default::default(),
        minimum_ttl: 0,
        cache_size: 64,
        reject_qtype: vec![],
        domain_ttl_file: None,
        domain_replace_file: None,
        ip_replace_file: None,
        ip_block_file: None,
    };

    let dispatcher = Dispatcher::new(
        &config,
        LocalClient::empty(),
        IpSet::default(),
        IpSet::default(),
        Box::new(FullSetMatcher::new()),
        Box::new(FullSetMatcher::new()),
        Vec::new(),
        Arc::new(Cache::new(config.cache_size)),
        Arc::new(Coalescer::default()),
    )
    .unwrap();

    let query = a_query("example.com");
    let client_ip: IpAddr = "203.0.113.7".parse().unwrap();

    let (response, tag) = dispatcher.dispatch(&query, client_ip).await.unwrap();
    assert_eq!(tag, "Primary");
    assert_eq!(response.answers.len(), 1);
    assert_eq!(response.answers[0].ip(), Some(answer.into()));
}

#[tokio::test]
async fn second_identical_query_is_served_from_cache() {
    let answer = "198.51.100.9".parse().unwrap();
    let addr = spawn_fake_upstream(answer).await;

    let config = Config {
        bind_address: vec!["127.0.0.1:0".to_string()],
        debug_http_address: None,
        primary_dns: vec![upstream("primary-1", addr)],
        alternative_dns: vec![],
        only_primary_dns: false,
        ipv6_use_alternative_dns: false,
        redirect_ipv6_record: false,
        alternative_dns_concurrent: false,
        alternative_first: false,
        when_primary_dns_answer_none_use: Default::default(),
        ip_network_file: Default::default(),
        domain_file: Default::default(),
        hosts_file: Default::default(),
        minimum_ttl: 0,
        cache_size: 64,
        reject_qtype: vec![],
        domain_ttl_file: None,
        domain_replace_file: None,
        ip_replace_file: None,
        ip_block_file: None,
    };

    let dispatcher = Dispatcher::new(
        &config,
        LocalClient::empty(),
        IpSet::default(),
        IpSet::default(),
        Box::new(FullSetMatcher::new()),
        Box::new(FullSetMatcher::new()),
        Vec::new(),
        Arc::new(Cache::new(config.cache_size)),
        Arc::new(Coalescer::default()),
    )
    .unwrap();

    let query = a_query("cached.example.com");
    let client_ip: IpAddr = "203.0.113.8".parse().unwrap();

    let (_, first_tag) = dispatcher.dispatch(&query, client_ip).await.unwrap();
    assert_eq!(first_tag, "Primary");

    let (_, second_tag) = dispatcher.dispatch(&query, client_ip).await.unwrap();
    assert_eq!(second_tag, "Cache");
}
