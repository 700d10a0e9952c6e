//! Encoder configuration.
//!
//! Loading and CLI parsing live upstream; this module defines the value
//! the writer is constructed with, its defaults, and validation.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;

/// Default client IPv4 prefix kept in the output (bits).
pub const DEFAULT_CLIENT_ADDRESS_PREFIX_IPV4: u8 = 24;
/// Default client IPv6 prefix kept in the output (bits).
pub const DEFAULT_CLIENT_ADDRESS_PREFIX_IPV6: u8 = 64;
/// Default server IPv4 prefix kept in the output (bits).
pub const DEFAULT_SERVER_ADDRESS_PREFIX_IPV4: u8 = 32;
/// Default server IPv6 prefix kept in the output (bits).
pub const DEFAULT_SERVER_ADDRESS_PREFIX_IPV6: u8 = 128;

/// Extended output section selection bits, per message side.
pub mod sections {
    /// Questions beyond the first.
    pub const EXTRA_QUESTIONS: u8 = 1 << 0;
    /// Answer section resource records.
    pub const ANSWERS: u8 = 1 << 1;
    /// Authority section resource records.
    pub const AUTHORITIES: u8 = 1 << 2;
    /// Additional section resource records.
    pub const ADDITIONALS: u8 = 1 << 3;
}

/// Output stream compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Plain CBOR, no compression.
    #[default]
    None,
    /// gzip, extension `.gz`.
    Gzip,
    /// xz, extension `.xz`.
    Xz,
}

/// Configuration for the C-DNS block writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Output filename pattern with strftime-style substitutions.
    pub output_pattern: String,

    /// File rotation period in seconds. 0 disables time-based rotation.
    pub rotation_period: u64,

    /// Rotate when this many bytes have been written. 0 disables.
    pub max_output_size: u64,

    /// Records per block before the block is flushed.
    pub max_block_items: usize,

    /// Output compression.
    pub compression: Compression,

    /// gzip compression level.
    pub gzip_level: u32,

    /// xz compression preset.
    pub xz_preset: u32,

    /// Client address prefix lengths kept in the output (bits).
    pub client_address_prefix_ipv4: u8,
    pub client_address_prefix_ipv6: u8,

    /// Server address prefix lengths kept in the output (bits).
    pub server_address_prefix_ipv4: u8,
    pub server_address_prefix_ipv6: u8,

    /// Take block start/end times from record timestamps rather than
    /// rotation boundaries.
    pub start_end_times_from_data: bool,

    /// Log file open/rename/compression handling.
    pub log_file_handling: bool,

    /// Extended sections recorded for queries (see [`sections`]).
    pub query_sections: u8,

    /// Extended sections recorded for responses (see [`sections`]).
    pub response_sections: u8,

    /// RR types left out of extended sections. Ignored when
    /// `accept_rr_types` is non-empty.
    pub ignore_rr_types: Vec<u16>,

    /// When non-empty, only these RR types appear in extended sections.
    pub accept_rr_types: Vec<u16>,

    /// Per-field output suppressions.
    pub exclude_hints: HintsExcluded,

    /// Collection parameters recorded in the file preamble.
    pub collection: CollectionConfig,
}

/// Independent boolean suppressions, one per optional output field.
///
/// An enabled hint removes the field from the output entirely; on the
/// wire this is indistinguishable from the field being absent from the
/// packet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HintsExcluded {
    pub timestamp: bool,
    pub client_address: bool,
    pub client_port: bool,
    pub client_hoplimit: bool,
    pub server_address: bool,
    pub server_port: bool,
    pub transport: bool,
    pub transaction_type: bool,
    pub transaction_id: bool,
    pub dns_flags: bool,
    pub qr_flags: bool,
    pub qr_signature: bool,
    pub query_name: bool,
    pub query_class_type: bool,
    pub query_qdcount: bool,
    pub query_ancount: bool,
    pub query_nscount: bool,
    pub query_arcount: bool,
    pub query_opcode: bool,
    pub query_rcode: bool,
    pub query_size: bool,
    pub query_udp_size: bool,
    pub query_edns_version: bool,
    pub query_opt_rdata: bool,
    pub response_rcode: bool,
    pub response_size: bool,
    pub response_delay: bool,
    pub rr_ttl: bool,
    pub rr_rdata: bool,
    pub address_events: bool,
}

/// Capture collection parameters, recorded verbatim in the file preamble.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Query timeout in milliseconds.
    pub query_timeout: u64,
    /// Skew timeout in microseconds.
    pub skew_timeout: u64,
    /// Capture snap length.
    pub snaplen: u32,
    /// DNS port filtered on.
    pub dns_port: u16,
    /// Promiscuous capture.
    pub promisc: bool,
    /// Capture interfaces.
    pub interfaces: Vec<String>,
    /// Server addresses of interest.
    pub server_addresses: Vec<IpAddr>,
    /// VLAN IDs of interest.
    pub vlan_ids: Vec<u16>,
    /// Capture filter expression.
    pub filter: String,
    /// Identifier of the generating program.
    pub generator_id: String,
    /// Identifier of the capturing host.
    pub host_id: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            output_pattern: String::from("cdns-%Y%m%d-%H%M%S"),
            rotation_period: 300,
            max_output_size: 0,
            max_block_items: 5000,
            compression: Compression::None,
            gzip_level: 6,
            xz_preset: 6,
            client_address_prefix_ipv4: DEFAULT_CLIENT_ADDRESS_PREFIX_IPV4,
            client_address_prefix_ipv6: DEFAULT_CLIENT_ADDRESS_PREFIX_IPV6,
            server_address_prefix_ipv4: DEFAULT_SERVER_ADDRESS_PREFIX_IPV4,
            server_address_prefix_ipv6: DEFAULT_SERVER_ADDRESS_PREFIX_IPV6,
            start_end_times_from_data: false,
            log_file_handling: false,
            query_sections: 0,
            response_sections: 0,
            ignore_rr_types: Vec::new(),
            accept_rr_types: Vec::new(),
            exclude_hints: HintsExcluded::default(),
            collection: CollectionConfig::default(),
        }
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            query_timeout: 5000,
            skew_timeout: 10,
            snaplen: 65535,
            dns_port: 53,
            promisc: false,
            interfaces: Vec::new(),
            server_addresses: Vec::new(),
            vlan_ids: Vec::new(),
            filter: String::new(),
            generator_id: format!(
                "{} {}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ),
            host_id: String::new(),
        }
    }
}

impl Configuration {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| crate::CdnsError::Config(e.to_string()))
        } else {
            Ok(Self::default())
        }
    }

    /// Check field ranges. The output pattern is validated separately,
    /// when it is compiled.
    pub fn validate(&self) -> crate::Result<()> {
        fn check_prefix(name: &str, value: u8, max: u8) -> crate::Result<()> {
            if value > max {
                return Err(crate::CdnsError::Config(format!(
                    "{name} must be 0-{max}, got {value}"
                )));
            }
            Ok(())
        }

        check_prefix("client_address_prefix_ipv4", self.client_address_prefix_ipv4, 32)?;
        check_prefix("client_address_prefix_ipv6", self.client_address_prefix_ipv6, 128)?;
        check_prefix("server_address_prefix_ipv4", self.server_address_prefix_ipv4, 32)?;
        check_prefix("server_address_prefix_ipv6", self.server_address_prefix_ipv6, 128)?;

        if self.max_block_items == 0 {
            return Err(crate::CdnsError::Config(
                "max_block_items must be at least 1".into(),
            ));
        }
        if self.output_pattern.is_empty() {
            return Err(crate::CdnsError::Config("output_pattern is empty".into()));
        }
        Ok(())
    }

    /// Prefix length to apply to an address, by role and family.
    #[must_use]
    pub fn address_prefix(&self, is_client: bool, is_ipv6: bool) -> u8 {
        match (is_client, is_ipv6) {
            (true, false) => self.client_address_prefix_ipv4,
            (true, true) => self.client_address_prefix_ipv6,
            (false, false) => self.server_address_prefix_ipv4,
            (false, true) => self.server_address_prefix_ipv6,
        }
    }

    /// `true` if an RR of this type should appear in extended sections.
    #[must_use]
    pub fn rr_type_wanted(&self, rr_type: u16) -> bool {
        if !self.accept_rr_types.is_empty() {
            self.accept_rr_types.contains(&rr_type)
        } else {
            !self.ignore_rr_types.contains(&rr_type)
        }
    }
}
