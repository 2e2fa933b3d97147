//! DNS collaborator
//!
//! Minimal RFC 1035 UDP client covering the three lookups the checks need:
//! MX presence, A/AAAA presence and SPF TXT presence. One datagram per
//! query against the configured resolver, bounded by the collaborator
//! timeout.

use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Record types used by the checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordType {
    A = 1,
    Txt = 16,
    Aaaa = 28,
    Mx = 15,
}

/// DNS resolution collaborator
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// Whether the domain has at least one MX record
    async fn has_mx(&self, domain: &str) -> Result<bool>;

    /// Whether the domain resolves to an A or AAAA record
    async fn has_address(&self, domain: &str) -> Result<bool>;

    /// Whether the domain publishes an SPF TXT record
    async fn has_spf(&self, domain: &str) -> Result<bool>;
}

/// UDP resolver against a configured nameserver
pub struct UdpDnsResolver {
    server: String,
    timeout: Duration,
}

impl UdpDnsResolver {
    pub fn new(server: impl Into<String>, timeout: Duration) -> Self {
        Self {
            server: server.into(),
            timeout,
        }
    }

    async fn query(&self, domain: &str, rtype: RecordType) -> Result<DnsResponse> {
        let packet = encode_query(domain, rtype)
            .ok_or_else(|| RuntimeError::Collaborator(format!("unencodable name: {}", domain)))?;

        let lookup = async {
            let socket = UdpSocket::bind("0.0.0.0:0")
                .await
                .map_err(|e| RuntimeError::Collaborator(e.to_string()))?;
            socket
                .send_to(&packet, &self.server)
                .await
                .map_err(|e| RuntimeError::Collaborator(e.to_string()))?;

            let mut buf = [0u8; 2048];
            let (len, _) = socket
                .recv_from(&mut buf)
                .await
                .map_err(|e| RuntimeError::Collaborator(e.to_string()))?;

            parse_response(&buf[..len], rtype)
                .ok_or_else(|| RuntimeError::Collaborator("malformed dns response".to_string()))
        };

        timeout(self.timeout, lookup)
            .await
            .map_err(|_| RuntimeError::Collaborator("dns query timed out".to_string()))?
    }
}

#[async_trait]
impl DnsResolver for UdpDnsResolver {
    async fn has_mx(&self, domain: &str) -> Result<bool> {
        Ok(self.query(domain, RecordType::Mx).await?.answer_count > 0)
    }

    async fn has_address(&self, domain: &str) -> Result<bool> {
        if self.query(domain, RecordType::A).await?.answer_count > 0 {
            return Ok(true);
        }
        Ok(self.query(domain, RecordType::Aaaa).await?.answer_count > 0)
    }

    async fn has_spf(&self, domain: &str) -> Result<bool> {
        let response = self.query(domain, RecordType::Txt).await?;
        Ok(response
            .txt_records
            .iter()
            .any(|txt| txt.starts_with("v=spf1")))
    }
}

struct DnsResponse {
    /// Answers matching the queried type
    answer_count: usize,
    /// Concatenated character-strings per TXT answer
    txt_records: Vec<String>,
}

/// Encode a single-question recursive query
fn encode_query(domain: &str, rtype: RecordType) -> Option<Vec<u8>> {
    let mut packet = Vec::with_capacity(32 + domain.len());
    let id: u16 = rand::thread_rng().gen();

    packet.extend_from_slice(&id.to_be_bytes());
    packet.extend_from_slice(&0x0100u16.to_be_bytes()); // RD
    packet.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    packet.extend_from_slice(&[0; 6]); // AN/NS/AR

    for label in domain.trim_end_matches('.').split('.') {
        if label.is_empty() || label.len() > 63 {
            return None;
        }
        packet.push(label.len() as u8);
        packet.extend_from_slice(label.as_bytes());
    }
    packet.push(0);
    packet.extend_from_slice(&(rtype as u16).to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes()); // IN

    Some(packet)
}

/// Walk past a possibly-compressed name, returning the next offset
fn skip_name(buf: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let len = *buf.get(pos)? as usize;
        if len == 0 {
            return Some(pos + 1);
        }
        // Compression pointer terminates the name
        if len & 0xC0 == 0xC0 {
            return Some(pos + 2);
        }
        pos += 1 + len;
    }
}

fn parse_response(buf: &[u8], rtype: RecordType) -> Option<DnsResponse> {
    if buf.len() < 12 {
        return None;
    }
    let rcode = buf[3] & 0x0F;
    let qdcount = u16::from_be_bytes([buf[4], buf[5]]) as usize;
    let ancount = u16::from_be_bytes([buf[6], buf[7]]) as usize;

    // NXDOMAIN and friends simply mean "no such record"
    if rcode != 0 {
        return Some(DnsResponse {
            answer_count: 0,
            txt_records: Vec::new(),
        });
    }

    let mut pos = 12;
    for _ in 0..qdcount {
        pos = skip_name(buf, pos)?;
        pos += 4; // qtype + qclass
    }

    let mut answer_count = 0;
    let mut txt_records = Vec::new();

    for _ in 0..ancount {
        pos = skip_name(buf, pos)?;
        if pos + 10 > buf.len() {
            return None;
        }
        let atype = u16::from_be_bytes([buf[pos], buf[pos + 1]]);
        let rdlength = u16::from_be_bytes([buf[pos + 8], buf[pos + 9]]) as usize;
        pos += 10;
        if pos + rdlength > buf.len() {
            return None;
        }

        if atype == rtype as u16 {
            answer_count += 1;
            if rtype == RecordType::Txt {
                let mut text = String::new();
                let mut tpos = pos;
                while tpos < pos + rdlength {
                    let chunk_len = buf[tpos] as usize;
                    tpos += 1;
                    let chunk = buf.get(tpos..tpos + chunk_len)?;
                    text.push_str(&String::from_utf8_lossy(chunk));
                    tpos += chunk_len;
                }
                txt_records.push(text);
            }
        }
        pos += rdlength;
    }

    Some(DnsResponse {
        answer_count,
        txt_records,
    })
}

/// Scripted resolver for tests
#[derive(Default)]
pub struct MockDnsResolver {
    mx: HashMap<String, bool>,
    address: HashMap<String, bool>,
    spf: HashMap<String, bool>,
    /// When set, every lookup fails as unreachable
    pub unreachable: bool,
}

impl MockDnsResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fully-configured domain: MX, address and SPF all present
    pub fn with_healthy_domain(mut self, domain: &str) -> Self {
        self.mx.insert(domain.to_string(), true);
        self.address.insert(domain.to_string(), true);
        self.spf.insert(domain.to_string(), true);
        self
    }

    pub fn with_records(mut self, domain: &str, mx: bool, address: bool, spf: bool) -> Self {
        self.mx.insert(domain.to_string(), mx);
        self.address.insert(domain.to_string(), address);
        self.spf.insert(domain.to_string(), spf);
        self
    }

    fn lookup(&self, map: &HashMap<String, bool>, domain: &str) -> Result<bool> {
        if self.unreachable {
            return Err(RuntimeError::Collaborator("dns unreachable".to_string()));
        }
        Ok(*map.get(domain).unwrap_or(&false))
    }
}

#[async_trait]
impl DnsResolver for MockDnsResolver {
    async fn has_mx(&self, domain: &str) -> Result<bool> {
        self.lookup(&self.mx, domain)
    }

    async fn has_address(&self, domain: &str) -> Result<bool> {
        self.lookup(&self.address, domain)
    }

    async fn has_spf(&self, domain: &str) -> Result<bool> {
        self.lookup(&self.spf, domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_query_shape() {
        let packet = encode_query("example.com", RecordType::Mx).unwrap();

        // header + 1+7 + 1+3 + root + qtype + qclass
        assert_eq!(packet.len(), 12 + 13 + 4);
        assert_eq!(packet[12], 7);
        assert_eq!(&packet[13..20], b"example");
        assert_eq!(packet[20], 3);
        // QTYPE at the tail
        assert_eq!(
            u16::from_be_bytes([packet[packet.len() - 4], packet[packet.len() - 3]]),
            15
        );
    }

    #[test]
    fn test_encode_rejects_oversized_label() {
        let label = "a".repeat(64);
        assert!(encode_query(&format!("{}.com", label), RecordType::A).is_none());
    }

    #[test]
    fn test_parse_response_counts_matching_answers() {
        // Header: id 0, response flags, 1 question, 1 answer
        let mut buf = vec![
            0x00, 0x00, 0x81, 0x80, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00,
        ];
        // Question: example.com A IN
        buf.extend_from_slice(&[7]);
        buf.extend_from_slice(b"example");
        buf.extend_from_slice(&[3]);
        buf.extend_from_slice(b"com");
        buf.extend_from_slice(&[0, 0, 1, 0, 1]);
        // Answer: pointer to offset 12, A IN ttl=60 rdlength=4 rdata
        buf.extend_from_slice(&[0xC0, 0x0C, 0, 1, 0, 1, 0, 0, 0, 60, 0, 4, 93, 184, 216, 34]);

        let response = parse_response(&buf, RecordType::A).unwrap();
        assert_eq!(response.answer_count, 1);

        // Same packet queried as MX matches nothing
        let response = parse_response(&buf, RecordType::Mx).unwrap();
        assert_eq!(response.answer_count, 0);
    }

    #[test]
    fn test_parse_nxdomain_is_empty_not_error() {
        let buf = [
            0x00, 0x00, 0x81, 0x83, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let response = parse_response(&buf, RecordType::A).unwrap();
        assert_eq!(response.answer_count, 0);
    }

    #[test]
    fn test_parse_txt_character_strings() {
        let mut buf = vec![
            0x00, 0x00, 0x81, 0x80, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00,
        ];
        buf.extend_from_slice(&[7]);
        buf.extend_from_slice(b"example");
        buf.extend_from_slice(&[3]);
        buf.extend_from_slice(b"com");
        buf.extend_from_slice(&[0, 0, 16, 0, 1]);
        // TXT answer: "v=spf1 -all" as one character-string
        let txt = b"v=spf1 -all";
        buf.extend_from_slice(&[0xC0, 0x0C, 0, 16, 0, 1, 0, 0, 0, 60]);
        buf.extend_from_slice(&((txt.len() + 1) as u16).to_be_bytes());
        buf.push(txt.len() as u8);
        buf.extend_from_slice(txt);

        let response = parse_response(&buf, RecordType::Txt).unwrap();
        assert_eq!(response.txt_records, vec!["v=spf1 -all".to_string()]);
    }

    #[test]
    fn test_parse_truncated_packet() {
        assert!(parse_response(&[0x00, 0x01], RecordType::A).is_none());
    }

    #[tokio::test]
    async fn test_mock_resolver() {
        let dns = MockDnsResolver::new().with_records("example.com", true, true, false);

        assert!(dns.has_mx("example.com").await.unwrap());
        assert!(!dns.has_spf("example.com").await.unwrap());
        assert!(!dns.has_mx("other.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_mock_resolver_unreachable() {
        let mut dns = MockDnsResolver::new();
        dns.unreachable = true;
        assert!(dns.has_mx("example.com").await.is_err());
    }
}
