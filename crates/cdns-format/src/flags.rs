//! Wire bitsets: qr-flags, transport flags, DNS flags, storage hints.

use cdns_core::{DnsMessage, QueryResponse, TransportType};

/// Transaction shape flags (`qr-sig-flags` on the wire).
pub mod qr_flags {
    pub const HAS_QUERY: u16 = 1 << 0;
    pub const HAS_RESPONSE: u16 = 1 << 1;
    pub const QUERY_HAS_OPT: u16 = 1 << 2;
    pub const RESPONSE_HAS_OPT: u16 = 1 << 3;
    pub const QUERY_HAS_NO_QUESTION: u16 = 1 << 4;
    pub const RESPONSE_HAS_NO_QUESTION: u16 = 1 << 5;
}

/// Transport flags: an IPv6 bit plus a one-hot transport.
pub mod transport_flags {
    pub const IPV6: u16 = 1 << 0;
    pub const UDP: u16 = 1 << 1;
    pub const TCP: u16 = 1 << 2;
    pub const TLS: u16 = 1 << 3;
    pub const DTLS: u16 = 1 << 4;
    pub const DOH: u16 = 1 << 5;
}

/// Combined query/response DNS header flags.
pub mod dns_flags {
    pub const QUERY_CD: u16 = 1 << 0;
    pub const QUERY_AD: u16 = 1 << 1;
    pub const QUERY_Z: u16 = 1 << 2;
    pub const QUERY_RA: u16 = 1 << 3;
    pub const QUERY_RD: u16 = 1 << 4;
    pub const QUERY_TC: u16 = 1 << 5;
    pub const QUERY_AA: u16 = 1 << 6;
    pub const QUERY_DO: u16 = 1 << 7;
    pub const RESPONSE_CD: u16 = 1 << 8;
    pub const RESPONSE_AD: u16 = 1 << 9;
    pub const RESPONSE_Z: u16 = 1 << 10;
    pub const RESPONSE_RA: u16 = 1 << 11;
    pub const RESPONSE_RD: u16 = 1 << 12;
    pub const RESPONSE_TC: u16 = 1 << 13;
    pub const RESPONSE_AA: u16 = 1 << 14;
}

/// Storage hint bits naming the fields a capture records.
pub mod hints {
    // Query/response item hints.
    pub const TIME_OFFSET: u32 = 1 << 0;
    pub const CLIENT_ADDRESS_INDEX: u32 = 1 << 1;
    pub const CLIENT_PORT: u32 = 1 << 2;
    pub const TRANSACTION_ID: u32 = 1 << 3;
    pub const QR_SIGNATURE_INDEX: u32 = 1 << 4;
    pub const CLIENT_HOPLIMIT: u32 = 1 << 5;
    pub const RESPONSE_DELAY: u32 = 1 << 6;
    pub const QUERY_NAME_INDEX: u32 = 1 << 7;
    pub const QUERY_SIZE: u32 = 1 << 8;
    pub const RESPONSE_SIZE: u32 = 1 << 9;
    pub const RESPONSE_PROCESSING_DATA: u32 = 1 << 10;
    pub const QUERY_QUESTION_SECTIONS: u32 = 1 << 11;
    pub const QUERY_ANSWER_SECTIONS: u32 = 1 << 12;
    pub const QUERY_AUTHORITY_SECTIONS: u32 = 1 << 13;
    pub const QUERY_ADDITIONAL_SECTIONS: u32 = 1 << 14;
    pub const RESPONSE_ANSWER_SECTIONS: u32 = 1 << 15;
    pub const RESPONSE_AUTHORITY_SECTIONS: u32 = 1 << 16;
    pub const RESPONSE_ADDITIONAL_SECTIONS: u32 = 1 << 17;

    // Signature hints.
    pub const SERVER_ADDRESS: u32 = 1 << 0;
    pub const SERVER_PORT: u32 = 1 << 1;
    pub const QR_TRANSPORT_FLAGS: u32 = 1 << 2;
    pub const QR_TYPE: u32 = 1 << 3;
    pub const QR_SIG_FLAGS: u32 = 1 << 4;
    pub const QUERY_OPCODE: u32 = 1 << 5;
    pub const QR_DNS_FLAGS: u32 = 1 << 6;
    pub const QUERY_RCODE: u32 = 1 << 7;
    pub const QUERY_CLASS_TYPE: u32 = 1 << 8;
    pub const QUERY_QDCOUNT: u32 = 1 << 9;
    pub const QUERY_ANCOUNT: u32 = 1 << 10;
    pub const QUERY_NSCOUNT: u32 = 1 << 11;
    pub const QUERY_ARCOUNT: u32 = 1 << 12;
    pub const QUERY_EDNS_VERSION: u32 = 1 << 13;
    pub const QUERY_UDP_SIZE: u32 = 1 << 14;
    pub const QUERY_OPT_RDATA: u32 = 1 << 15;
    pub const RESPONSE_RCODE: u32 = 1 << 16;

    // RR hints.
    pub const TTL: u32 = 1 << 0;
    pub const RDATA_INDEX: u32 = 1 << 1;

    // Other-data hints.
    pub const MALFORMED_MESSAGES: u32 = 1 << 0;
    pub const ADDRESS_EVENT_COUNTS: u32 = 1 << 1;
    pub const SAMPLED_DATA: u32 = 1 << 2;
}

/// Transport flags for a pair, taken from its leading message.
#[must_use]
pub fn transport_flags(qr: &QueryResponse) -> u16 {
    let lead = qr.lead();
    let mut flags = match lead.transport {
        TransportType::Udp => transport_flags::UDP,
        TransportType::Tcp => transport_flags::TCP,
        TransportType::Dot => transport_flags::TLS,
        TransportType::Ddot => transport_flags::DTLS,
        TransportType::Doh => transport_flags::DOH,
    };
    if lead.client_ip.map_or(false, |a| a.is_ipv6()) {
        flags |= transport_flags::IPV6;
    }
    flags
}

/// Transaction type for a pair, taken from its leading message.
#[must_use]
pub fn transaction_type(qr: &QueryResponse) -> Option<u8> {
    qr.lead().transaction_type.map(|t| t as u8)
}

fn side_flags(m: &DnsMessage, shift: u16) -> u16 {
    let mut flags = 0;
    if m.flags.cd {
        flags |= dns_flags::QUERY_CD;
    }
    if m.flags.ad {
        flags |= dns_flags::QUERY_AD;
    }
    if m.flags.z {
        flags |= dns_flags::QUERY_Z;
    }
    if m.flags.ra {
        flags |= dns_flags::QUERY_RA;
    }
    if m.flags.rd {
        flags |= dns_flags::QUERY_RD;
    }
    if m.flags.tc {
        flags |= dns_flags::QUERY_TC;
    }
    if m.flags.aa {
        flags |= dns_flags::QUERY_AA;
    }
    flags << shift
}

/// Combined DNS flag set for a pair. The query DO bit comes from the
/// query's OPT record; response flags occupy the high bits.
#[must_use]
pub fn dns_flags(qr: &QueryResponse) -> u16 {
    let mut flags = 0;
    if let Some(q) = qr.query() {
        flags |= side_flags(q, 0);
        if q.edns.as_ref().map_or(false, |e| e.do_bit) {
            flags |= dns_flags::QUERY_DO;
        }
    }
    if let Some(r) = qr.response() {
        flags |= side_flags(r, 8);
    }
    flags
}
