//! Parsed DNS messages and matched query/response pairs.

use chrono::{DateTime, Utc};
use std::net::IpAddr;

/// Transport a message was carried over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportType {
    #[default]
    Udp,
    Tcp,
    /// DNS over TLS.
    Dot,
    /// DNS over DTLS.
    Ddot,
    /// DNS over HTTPS.
    Doh,
}

/// Role of the server in the observed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransactionType {
    Stub = 0,
    Client = 1,
    Resolver = 2,
    Auth = 3,
    Forwarder = 4,
    Tool = 5,
}

/// DNS header flag bits, already split out by the parser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DnsHeaderFlags {
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
    pub z: bool,
    pub ad: bool,
    pub cd: bool,
}

/// EDNS(0) information from an OPT pseudo-record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Edns {
    pub version: u8,
    pub udp_payload_size: u16,
    /// High 8 bits of the extended response code.
    pub extended_rcode: u8,
    pub do_bit: bool,
    pub opt_rdata: Vec<u8>,
}

/// One entry of the question section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionData {
    /// Wire-format domain name.
    pub name: Vec<u8>,
    pub qtype: u16,
    pub qclass: u16,
}

/// One resource record from an answer/authority/additional section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RrData {
    /// Wire-format domain name.
    pub name: Vec<u8>,
    pub rr_type: u16,
    pub rr_class: u16,
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

/// A parsed DNS message plus its network context.
///
/// Header counts are the counts from the wire header; the section vectors
/// hold whatever the parser extracted and may be shorter for truncated or
/// partially parsed messages.
#[derive(Debug, Clone)]
pub struct DnsMessage {
    pub timestamp: DateTime<Utc>,
    pub client_ip: Option<IpAddr>,
    pub server_ip: Option<IpAddr>,
    pub client_port: Option<u16>,
    pub server_port: Option<u16>,
    pub hoplimit: Option<u8>,
    /// Size of the DNS payload on the wire.
    pub wire_size: Option<u32>,
    pub transport: TransportType,
    pub transaction_type: Option<TransactionType>,
    pub id: u16,
    pub opcode: u8,
    pub rcode: u8,
    pub flags: DnsHeaderFlags,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
    pub questions: Vec<QuestionData>,
    pub answers: Vec<RrData>,
    pub authority: Vec<RrData>,
    pub additional: Vec<RrData>,
    pub edns: Option<Edns>,
}

impl Default for DnsMessage {
    fn default() -> Self {
        Self {
            timestamp: DateTime::UNIX_EPOCH,
            client_ip: None,
            server_ip: None,
            client_port: None,
            server_port: None,
            hoplimit: None,
            wire_size: None,
            transport: TransportType::default(),
            transaction_type: None,
            id: 0,
            opcode: 0,
            rcode: 0,
            flags: DnsHeaderFlags::default(),
            qdcount: 0,
            ancount: 0,
            nscount: 0,
            arcount: 0,
            questions: Vec::new(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            edns: None,
        }
    }
}

/// A matched query/response pair.
///
/// Holds a timed-out query without response, a response without query, or
/// a query with its matching response. At least one side is always
/// present.
#[derive(Debug, Clone)]
pub struct QueryResponse {
    query: Option<Box<DnsMessage>>,
    response: Option<Box<DnsMessage>>,
}

impl QueryResponse {
    /// Pair starting from an unanswered query.
    #[must_use]
    pub fn from_query(query: DnsMessage) -> Self {
        Self {
            query: Some(Box::new(query)),
            response: None,
        }
    }

    /// Pair for a response that matched no query.
    #[must_use]
    pub fn from_response(response: DnsMessage) -> Self {
        Self {
            query: None,
            response: Some(Box::new(response)),
        }
    }

    /// Attach the matching response.
    pub fn set_response(&mut self, response: DnsMessage) {
        self.response = Some(Box::new(response));
    }

    #[must_use]
    pub fn has_query(&self) -> bool {
        self.query.is_some()
    }

    #[must_use]
    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    #[must_use]
    pub fn query(&self) -> Option<&DnsMessage> {
        self.query.as_deref()
    }

    #[must_use]
    pub fn response(&self) -> Option<&DnsMessage> {
        self.response.as_deref()
    }

    /// The query if present, otherwise the response.
    #[must_use]
    pub fn lead(&self) -> &DnsMessage {
        self.query
            .as_deref()
            .or(self.response.as_deref())
            .expect("pair holds at least one message")
    }

    /// The pair timestamp: query timestamp if there is a query, response
    /// timestamp otherwise.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.lead().timestamp
    }
}
