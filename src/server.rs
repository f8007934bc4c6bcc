//! Inbound UDP/TCP listeners (§4.10), grounded on this repository's `run_udp_server`/
//! `run_tcp_server`/`handle_tcp_connection` shape: a `tokio::select!` loop racing socket I/O
//! against a shutdown broadcast, one spawned task per datagram/connection.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::dns::{Message, Name, RData, Record, RecordClass, RecordType, Rcode};
use crate::ipset::IpSet;
use crate::matcher::Matcher;
use crate::metrics::ForwarderMetrics;
use crate::replace::{DomainReplace, IpReplace};

/// Local SOA authority synthesised for blocked domains (§6.3).
fn blocked_soa() -> RData {
    RData::Soa {
        mname: Name::from_str_lossy("ns.local"),
        rname: Name::from_str_lossy("hostmaster.local"),
        serial: 1,
        refresh: 7200,
        retry: 3600,
        expire: 1_209_600,
        minimum: 3600,
    }
}

/// Shared, read-mostly policy state plus the dispatcher, wired together by `main`.
pub struct InboundServer {
    dispatcher: Arc<Dispatcher>,
    domain_replace: DomainReplace,
    block_domains: Box<dyn Matcher>,
    block_ips: IpSet,
    ip_replace: IpReplace,
    reject_qtypes: HashSet<u16>,
    metrics: Arc<ForwarderMetrics>,
}

impl InboundServer {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        domain_replace: DomainReplace,
        block_domains: Box<dyn Matcher>,
        block_ips: IpSet,
        ip_replace: IpReplace,
        reject_qtypes: &[String],
        metrics: Arc<ForwarderMetrics>,
    ) -> InboundServer {
        InboundServer {
            dispatcher,
            domain_replace,
            block_domains,
            block_ips,
            ip_replace,
            reject_qtypes: reject_qtypes.iter().map(|s| qtype_by_name(s)).collect(),
            metrics,
        }
    }

    /// The §4.10 nine-step pipeline for one already-parsed query.
    async fn handle(&self, query: &Message, client_ip: IpAddr, protocol: &str) -> Message {
        let start = std::time::Instant::now();
        let Some(question) = query.question() else {
            return reply_with_rcode(query, Rcode::FormErr);
        };
        let original_qname = question.qname.clone();
        let original_qtype = question.qtype;

        // 2. Reject qtype.
        if self.reject_qtypes.contains(&original_qtype.value()) {
            self.metrics.record_blocked("qtype");
            self.metrics.record_query(protocol, "Block", start.elapsed().as_secs_f64());
            return reply_with_rcode(query, Rcode::ServFail);
        }

        // 3. Domain replace on a copy.
        let mut rewritten = query.clone();
        let rewritten_qname_str = original_qname.to_string_no_trailing_dot();
        if let Some(replacement) = self.domain_replace.replacement_for(&rewritten_qname_str) {
            if let Some(q) = rewritten.questions.first_mut() {
                q.qname = Name::from_str_lossy(&replacement);
            }
        }
        let Some(rewritten_question) = rewritten.question() else {
            return reply_with_rcode(query, Rcode::FormErr);
        };
        let rewritten_qname = rewritten_question.qname.to_string_no_trailing_dot();

        // 4. Blocked domain.
        if self.block_domains.has(&rewritten_qname) {
            self.metrics.record_blocked("domain");
            self.metrics.record_query(protocol, "Block", start.elapsed().as_secs_f64());
            return blocked_response(query);
        }

        // 5. Dispatch.
        let Some((response, tag)) = self.dispatcher.dispatch(&rewritten, client_ip).await else {
            self.metrics.record_query(protocol, "SERVFAIL", start.elapsed().as_secs_f64());
            return reply_with_rcode(query, Rcode::ServFail);
        };

        // 6. Copy, drop blocked IPs.
        let mut response = response;
        response.answers.retain(|rr| match rr.ip() {
            Some(ip) => !self.block_ips.contains(ip, false, "ip-block"),
            None => true,
        });

        // 7. Re-frame to the original question.
        reframe(&mut response, query, &original_qname);

        // 8. IP replace.
        let final_response = match self.apply_ip_replace(&response, &original_qname, original_qtype) {
            Some(synthesised) => synthesised,
            None => response,
        };

        self.metrics.record_query(protocol, tag, start.elapsed().as_secs_f64());
        final_response
    }

    fn apply_ip_replace(
        &self,
        response: &Message,
        original_qname: &Name,
        original_qtype: RecordType,
    ) -> Option<Message> {
        let (rr, replacement) = find_ip_replace(&self.ip_replace, &response.answers)?;
        let mut synthesised = response.clone();
        synthesised.answers = vec![Record {
            name: original_qname.clone(),
            rtype: original_qtype,
            rclass: RecordClass::IN,
            ttl: rr.ttl,
            rdata: match replacement {
                IpAddr::V4(v4) => RData::A(v4),
                IpAddr::V6(v6) => RData::Aaaa(v6),
            },
        }];
        Some(synthesised)
    }
}

/// §4.10 step 8: the first Answer A/AAAA record whose IP matches an IPReplace rule wins — not
/// necessarily the first Answer record overall, since earlier records may be of a different type
/// or simply not match any rule.
fn find_ip_replace<'a>(
    ip_replace: &IpReplace,
    answers: &'a [Record],
) -> Option<(&'a Record, IpAddr)> {
    answers.iter().find_map(|rr| {
        let ip = rr.ip()?;
        let replacement = ip_replace.replacement_for(ip)?;
        Some((rr, replacement))
    })
}

fn qtype_by_name(name: &str) -> u16 {
    match name.to_ascii_uppercase().as_str() {
        "A" => 1,
        "NS" => 2,
        "CNAME" => 5,
        "SOA" => 6,
        "PTR" => 12,
        "MX" => 15,
        "TXT" => 16,
        "AAAA" => 28,
        "SRV" => 33,
        "OPT" => 41,
        "ANY" => 255,
        other => other.parse::<u16>().unwrap_or(0),
    }
}

/// SERVFAIL/FORMERR reply framed to `query`'s own question, used for rejected qtypes and
/// dispatcher failures.
fn reply_with_rcode(query: &Message, rcode: Rcode) -> Message {
    let mut response = query.clone();
    response.qr = true;
    response.ra = true;
    response.set_rcode(rcode);
    response.answers.clear();
    response.authorities.clear();
    response.additionals.clear();
    response
}

/// §6.3: empty answer, local SOA in Authority, framed to the original query.
fn blocked_response(query: &Message) -> Message {
    let mut response = query.clone();
    response.qr = true;
    response.ra = true;
    response.set_rcode(Rcode::NoError);
    response.answers.clear();
    response.additionals.clear();
    if let Some(question) = query.question() {
        response.authorities = vec![Record {
            name: question.qname.clone(),
            rtype: RecordType::SOA,
            rclass: RecordClass::IN,
            ttl: 3600,
            rdata: blocked_soa(),
        }];
    } else {
        response.authorities.clear();
    }
    response
}

/// Reply-flag framing plus rewriting every record's Name back to the original qname (§4.10 step
/// 7) — the dispatcher answered the (possibly domain-replaced) rewritten question, but the wire
/// reply must echo the question the client actually asked (§8 invariant 1).
fn reframe(response: &mut Message, original_query: &Message, original_qname: &Name) {
    response.id = original_query.id;
    response.qr = true;
    response.rd = original_query.rd;
    response.ra = true;
    response.questions = original_query.questions.clone();
    for rr in response
        .answers
        .iter_mut()
        .chain(response.authorities.iter_mut())
        .chain(response.additionals.iter_mut())
    {
        if rr.rtype != RecordType::OPT {
            rr.name = original_qname.clone();
        }
    }
}

async fn respond_udp(server: &InboundServer, sock: &UdpSocket, buf: &[u8], src: SocketAddr) {
    let query = match Message::from_bytes(buf) {
        Ok(q) => q,
        Err(e) => {
            debug!(error = %e, src = %src, "malformed UDP query, dropping");
            return;
        }
    };
    let response = server.handle(&query, src.ip(), "udp").await;
    let mut bytes = response.to_bytes();
    if bytes.len() > 4096 {
        let mut truncated = reply_with_rcode(&query, response.rcode);
        truncated.tc = true;
        bytes = truncated.to_bytes();
    }
    if let Err(e) = sock.send_to(&bytes, src).await {
        warn!(error = %e, src = %src, "failed to send UDP response");
    }
}

/// Runs the UDP listener until the shutdown signal fires (§5).
pub async fn run_udp_server(
    bind_addr: SocketAddr,
    server: Arc<InboundServer>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let sock = Arc::new(UdpSocket::bind(bind_addr).await?);
    info!(addr = %bind_addr, "UDP listener started");

    let mut buf = vec![0u8; 4096];
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!(addr = %bind_addr, "UDP listener shutting down");
                break;
            }
            result = sock.recv_from(&mut buf) => {
                let (len, src) = result?;
                let datagram = buf[..len].to_vec();
                let server = server.clone();
                let sock = sock.clone();
                tokio::spawn(async move {
                    respond_udp(&server, &sock, &datagram, src).await;
                });
            }
        }
    }
    Ok(())
}

async fn handle_tcp_connection(
    mut stream: TcpStream,
    src: SocketAddr,
    server: Arc<InboundServer>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut length_buf = [0u8; 2];
    loop {
        match stream.read_exact(&mut length_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!(src = %src, "TCP connection closed by peer");
                break;
            }
            Err(e) => return Err(e.into()),
        }
        let message_len = u16::from_be_bytes(length_buf) as usize;
        let mut message_buf = vec![0u8; message_len];
        stream.read_exact(&mut message_buf).await?;

        let query = match Message::from_bytes(&message_buf) {
            Ok(q) => q,
            Err(e) => {
                debug!(error = %e, src = %src, "malformed TCP query, closing connection");
                break;
            }
        };
        let response = server.handle(&query, src.ip(), "tcp").await;
        let bytes = response.to_bytes();
        stream.write_all(&(bytes.len() as u16).to_be_bytes()).await?;
        stream.write_all(&bytes).await?;
    }
    Ok(())
}

/// Runs the TCP listener until the shutdown signal fires (§5).
pub async fn run_tcp_server(
    bind_addr: SocketAddr,
    server: Arc<InboundServer>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "TCP listener started");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!(addr = %bind_addr, "TCP listener shutting down");
                break;
            }
            result = listener.accept() => {
                let (stream, src) = result?;
                let server = server.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_tcp_connection(stream, src, server).await {
                        warn!(error = %e, src = %src, "TCP connection error");
                    }
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::Question;

    fn sample_query() -> Message {
        Message::query(
            42,
            Question {
                qname: Name::from_str_lossy("example.com"),
                qtype: RecordType::A,
                qclass: RecordClass::IN,
            },
        )
    }

    #[test]
    fn reply_with_rcode_preserves_question_and_id() {
        let query = sample_query();
        let response = reply_with_rcode(&query, Rcode::ServFail);
        assert_eq!(response.id, query.id);
        assert_eq!(response.rcode, Rcode::ServFail);
        assert!(response.qr);
        assert_eq!(response.questions, query.questions);
    }

    #[test]
    fn blocked_response_carries_soa_authority() {
        let query = sample_query();
        let response = blocked_response(&query);
        assert!(response.has_soa_in_authority());
        assert!(response.answers.is_empty());
    }

    #[test]
    fn reframe_rewrites_record_names_to_original_qname() {
        let query = sample_query();
        let original_qname = query.question().unwrap().qname.clone();
        let mut response = query.clone();
        response.answers.push(Record {
            name: Name::from_str_lossy("replaced.example.net"),
            rtype: RecordType::A,
            rclass: RecordClass::IN,
            ttl: 60,
            rdata: RData::A("1.2.3.4".parse().unwrap()),
        });
        reframe(&mut response, &query, &original_qname);
        assert_eq!(response.answers[0].name, original_qname);
    }

    #[test]
    fn qtype_by_name_resolves_known_names() {
        assert_eq!(qtype_by_name("aaaa"), 28);
        assert_eq!(qtype_by_name("ANY"), 255);
    }

    #[test]
    fn find_ip_replace_matches_a_later_answer_record() {
        use crate::replace::IpReplace;
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "203.0.113.0/24 9.9.9.9").unwrap();
        let ip_replace = IpReplace::load(file.path());

        let answers = vec![
            Record {
                name: Name::from_str_lossy("example.com"),
                rtype: RecordType::A,
                rclass: RecordClass::IN,
                ttl: 60,
                rdata: RData::A("1.2.3.4".parse().unwrap()),
            },
            Record {
                name: Name::from_str_lossy("example.com"),
                rtype: RecordType::A,
                rclass: RecordClass::IN,
                ttl: 120,
                rdata: RData::A("203.0.113.5".parse().unwrap()),
            },
        ];
        let (rr, replacement) = find_ip_replace(&ip_replace, &answers).expect("expected a match");
        assert_eq!(rr.ttl, 120);
        assert_eq!(replacement, "9.9.9.9".parse().unwrap());
    }
}
