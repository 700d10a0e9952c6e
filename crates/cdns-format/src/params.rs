//! Block parameters recorded in the file preamble.
//!
//! Storage parameters describe how blocks were built (tick rate, block
//! capacity, which fields the capture keeps); collection parameters
//! describe how the traffic was captured. Both are written once per file.

use std::io::{self, Write};
use std::net::IpAddr;

use cdns_core::config::{
    DEFAULT_CLIENT_ADDRESS_PREFIX_IPV4, DEFAULT_CLIENT_ADDRESS_PREFIX_IPV6,
    DEFAULT_SERVER_ADDRESS_PREFIX_IPV4, DEFAULT_SERVER_ADDRESS_PREFIX_IPV6,
};
use cdns_core::{config::sections, Configuration};

use crate::cbor::CborEncoder;
use crate::flags::hints;
use crate::schema::{
    BlockParametersField, CollectionParametersField, StorageHintsField, StorageParametersField,
    DEFAULT_TICKS_PER_SECOND,
};

/// Bit masks naming which optional data a capture records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageHints {
    pub query_response_hints: u32,
    pub query_response_signature_hints: u32,
    pub rr_hints: u32,
    pub other_data_hints: u32,
}

/// Parameters governing block construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageParameters {
    pub ticks_per_second: u64,
    pub max_block_items: u64,
    pub storage_hints: StorageHints,
    pub opcodes: Vec<u8>,
    pub rr_types: Vec<u16>,
    pub storage_flags: u32,
    pub client_address_prefix_ipv4: u8,
    pub client_address_prefix_ipv6: u8,
    pub server_address_prefix_ipv4: u8,
    pub server_address_prefix_ipv6: u8,
    pub sampling_method: String,
    pub anonymisation_method: String,
}

/// Parameters describing the capture itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionParameters {
    pub query_timeout_ms: u64,
    pub skew_timeout_us: u64,
    pub snaplen: u32,
    pub dns_port: u16,
    pub promisc: bool,
    pub interfaces: Vec<String>,
    pub server_addresses: Vec<IpAddr>,
    pub vlan_ids: Vec<u16>,
    pub filter: String,
    pub generator_id: String,
    pub host_id: String,
}

/// One entry of the preamble's block-parameters array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockParameters {
    pub storage: StorageParameters,
    pub collection: CollectionParameters,
}

impl StorageHints {
    /// Derive hint bits from the configured exclusions and section
    /// options: a bit is set exactly when the field can appear in output.
    #[must_use]
    pub fn from_config(config: &Configuration) -> Self {
        let ex = &config.exclude_hints;

        let mut qr = 0;
        let mut qr_bit = |excluded: bool, bit: u32| {
            if !excluded {
                qr |= bit;
            }
        };
        qr_bit(ex.timestamp, hints::TIME_OFFSET);
        qr_bit(ex.client_address, hints::CLIENT_ADDRESS_INDEX);
        qr_bit(ex.client_port, hints::CLIENT_PORT);
        qr_bit(ex.transaction_id, hints::TRANSACTION_ID);
        qr_bit(ex.qr_signature, hints::QR_SIGNATURE_INDEX);
        qr_bit(ex.client_hoplimit, hints::CLIENT_HOPLIMIT);
        qr_bit(ex.response_delay, hints::RESPONSE_DELAY);
        qr_bit(ex.query_name, hints::QUERY_NAME_INDEX);
        qr_bit(ex.query_size, hints::QUERY_SIZE);
        qr_bit(ex.response_size, hints::RESPONSE_SIZE);
        if config.query_sections & sections::EXTRA_QUESTIONS != 0 {
            qr |= hints::QUERY_QUESTION_SECTIONS;
        }
        if config.query_sections & sections::ANSWERS != 0 {
            qr |= hints::QUERY_ANSWER_SECTIONS;
        }
        if config.query_sections & sections::AUTHORITIES != 0 {
            qr |= hints::QUERY_AUTHORITY_SECTIONS;
        }
        if config.query_sections & sections::ADDITIONALS != 0 {
            qr |= hints::QUERY_ADDITIONAL_SECTIONS;
        }
        if config.response_sections & sections::ANSWERS != 0 {
            qr |= hints::RESPONSE_ANSWER_SECTIONS;
        }
        if config.response_sections & sections::AUTHORITIES != 0 {
            qr |= hints::RESPONSE_AUTHORITY_SECTIONS;
        }
        if config.response_sections & sections::ADDITIONALS != 0 {
            qr |= hints::RESPONSE_ADDITIONAL_SECTIONS;
        }

        let mut sig = 0;
        let mut sig_bit = |excluded: bool, bit: u32| {
            if !excluded {
                sig |= bit;
            }
        };
        sig_bit(ex.server_address, hints::SERVER_ADDRESS);
        sig_bit(ex.server_port, hints::SERVER_PORT);
        sig_bit(ex.transport, hints::QR_TRANSPORT_FLAGS);
        sig_bit(ex.transaction_type, hints::QR_TYPE);
        sig_bit(ex.qr_flags, hints::QR_SIG_FLAGS);
        sig_bit(ex.query_opcode, hints::QUERY_OPCODE);
        sig_bit(ex.dns_flags, hints::QR_DNS_FLAGS);
        sig_bit(ex.query_rcode, hints::QUERY_RCODE);
        sig_bit(ex.query_class_type, hints::QUERY_CLASS_TYPE);
        sig_bit(ex.query_qdcount, hints::QUERY_QDCOUNT);
        sig_bit(ex.query_ancount, hints::QUERY_ANCOUNT);
        sig_bit(ex.query_nscount, hints::QUERY_NSCOUNT);
        sig_bit(ex.query_arcount, hints::QUERY_ARCOUNT);
        sig_bit(ex.query_edns_version, hints::QUERY_EDNS_VERSION);
        sig_bit(ex.query_udp_size, hints::QUERY_UDP_SIZE);
        sig_bit(ex.query_opt_rdata, hints::QUERY_OPT_RDATA);
        sig_bit(ex.response_rcode, hints::RESPONSE_RCODE);

        let mut rr = 0;
        if !ex.rr_ttl {
            rr |= hints::TTL;
        }
        if !ex.rr_rdata {
            rr |= hints::RDATA_INDEX;
        }

        let mut other = 0;
        if !ex.address_events {
            other |= hints::ADDRESS_EVENT_COUNTS;
        }

        Self {
            query_response_hints: qr,
            query_response_signature_hints: sig,
            rr_hints: rr,
            other_data_hints: other,
        }
    }

    pub fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        enc.write_map(4)?;
        enc.write_int(StorageHintsField::QueryResponseHints.index())?;
        enc.write_uint(u64::from(self.query_response_hints))?;
        enc.write_int(StorageHintsField::QueryResponseSignatureHints.index())?;
        enc.write_uint(u64::from(self.query_response_signature_hints))?;
        enc.write_int(StorageHintsField::RrHints.index())?;
        enc.write_uint(u64::from(self.rr_hints))?;
        enc.write_int(StorageHintsField::OtherDataHints.index())?;
        enc.write_uint(u64::from(self.other_data_hints))
    }
}

impl StorageParameters {
    #[must_use]
    pub fn from_config(config: &Configuration) -> Self {
        Self {
            ticks_per_second: DEFAULT_TICKS_PER_SECOND,
            max_block_items: config.max_block_items as u64,
            storage_hints: StorageHints::from_config(config),
            opcodes: Vec::new(),
            rr_types: Vec::new(),
            storage_flags: 0,
            client_address_prefix_ipv4: config.client_address_prefix_ipv4,
            client_address_prefix_ipv6: config.client_address_prefix_ipv6,
            server_address_prefix_ipv4: config.server_address_prefix_ipv4,
            server_address_prefix_ipv6: config.server_address_prefix_ipv6,
            sampling_method: String::new(),
            anonymisation_method: String::new(),
        }
    }

    pub fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        use StorageParametersField as F;

        enc.write_map_indefinite()?;
        enc.write_int(F::TicksPerSecond.index())?;
        enc.write_uint(self.ticks_per_second)?;
        enc.write_int(F::MaxBlockItems.index())?;
        enc.write_uint(self.max_block_items)?;
        enc.write_int(F::StorageHints.index())?;
        self.storage_hints.write_cbor(enc)?;
        enc.write_int(F::Opcodes.index())?;
        enc.write_array(self.opcodes.len())?;
        for &op in &self.opcodes {
            enc.write_uint(u64::from(op))?;
        }
        enc.write_int(F::RrTypes.index())?;
        enc.write_array(self.rr_types.len())?;
        for &t in &self.rr_types {
            enc.write_uint(u64::from(t))?;
        }
        if self.storage_flags != 0 {
            enc.write_int(F::StorageFlags.index())?;
            enc.write_uint(u64::from(self.storage_flags))?;
        }
        // Prefix lengths only appear when they differ from the defaults.
        let prefixes = [
            (
                F::ClientAddressPrefixIpv4,
                self.client_address_prefix_ipv4,
                DEFAULT_CLIENT_ADDRESS_PREFIX_IPV4,
            ),
            (
                F::ClientAddressPrefixIpv6,
                self.client_address_prefix_ipv6,
                DEFAULT_CLIENT_ADDRESS_PREFIX_IPV6,
            ),
            (
                F::ServerAddressPrefixIpv4,
                self.server_address_prefix_ipv4,
                DEFAULT_SERVER_ADDRESS_PREFIX_IPV4,
            ),
            (
                F::ServerAddressPrefixIpv6,
                self.server_address_prefix_ipv6,
                DEFAULT_SERVER_ADDRESS_PREFIX_IPV6,
            ),
        ];
        for (field, value, default) in prefixes {
            if value != default {
                enc.write_int(field.index())?;
                enc.write_uint(u64::from(value))?;
            }
        }
        if !self.sampling_method.is_empty() {
            enc.write_int(F::SamplingMethod.index())?;
            enc.write_text(&self.sampling_method)?;
        }
        if !self.anonymisation_method.is_empty() {
            enc.write_int(F::AnonymisationMethod.index())?;
            enc.write_text(&self.anonymisation_method)?;
        }
        enc.write_break()
    }
}

impl CollectionParameters {
    #[must_use]
    pub fn from_config(config: &Configuration) -> Self {
        let c = &config.collection;
        Self {
            query_timeout_ms: c.query_timeout,
            skew_timeout_us: c.skew_timeout,
            snaplen: c.snaplen,
            dns_port: c.dns_port,
            promisc: c.promisc,
            interfaces: c.interfaces.clone(),
            server_addresses: c.server_addresses.clone(),
            vlan_ids: c.vlan_ids.clone(),
            filter: c.filter.clone(),
            generator_id: c.generator_id.clone(),
            host_id: c.host_id.clone(),
        }
    }

    pub fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        use CollectionParametersField as F;

        enc.write_map_indefinite()?;
        enc.write_int(F::QueryTimeout.index())?;
        enc.write_uint(self.query_timeout_ms)?;
        enc.write_int(F::SkewTimeout.index())?;
        enc.write_uint(self.skew_timeout_us)?;
        enc.write_int(F::Snaplen.index())?;
        enc.write_uint(u64::from(self.snaplen))?;
        enc.write_int(F::DnsPort.index())?;
        enc.write_uint(u64::from(self.dns_port))?;
        enc.write_int(F::Promisc.index())?;
        enc.write_bool(self.promisc)?;
        if !self.interfaces.is_empty() {
            enc.write_int(F::Interfaces.index())?;
            enc.write_array(self.interfaces.len())?;
            for name in &self.interfaces {
                enc.write_text(name)?;
            }
        }
        if !self.server_addresses.is_empty() {
            enc.write_int(F::ServerAddresses.index())?;
            enc.write_array(self.server_addresses.len())?;
            for addr in &self.server_addresses {
                match addr {
                    IpAddr::V4(a) => enc.write_bytes(&a.octets())?,
                    IpAddr::V6(a) => enc.write_bytes(&a.octets())?,
                }
            }
        }
        if !self.vlan_ids.is_empty() {
            enc.write_int(F::VlanIds.index())?;
            enc.write_array(self.vlan_ids.len())?;
            for &id in &self.vlan_ids {
                enc.write_uint(u64::from(id))?;
            }
        }
        if !self.filter.is_empty() {
            enc.write_int(F::Filter.index())?;
            enc.write_text(&self.filter)?;
        }
        if !self.generator_id.is_empty() {
            enc.write_int(F::GeneratorId.index())?;
            enc.write_text(&self.generator_id)?;
        }
        if !self.host_id.is_empty() {
            enc.write_int(F::HostId.index())?;
            enc.write_text(&self.host_id)?;
        }
        enc.write_break()
    }
}

impl BlockParameters {
    #[must_use]
    pub fn from_config(config: &Configuration) -> Self {
        Self {
            storage: StorageParameters::from_config(config),
            collection: CollectionParameters::from_config(config),
        }
    }

    pub fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        enc.write_map(2)?;
        enc.write_int(BlockParametersField::StorageParameters.index())?;
        self.storage.write_cbor(enc)?;
        enc.write_int(BlockParametersField::CollectionParameters.index())?;
        self.collection.write_cbor(enc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(f: impl FnOnce(&mut CborEncoder<Vec<u8>>)) -> Vec<u8> {
        let mut enc = CborEncoder::new(Vec::new());
        f(&mut enc);
        enc.into_inner().unwrap()
    }

    #[test]
    fn test_storage_hints_encoding() {
        let sh = StorageHints {
            query_response_hints: hints::TIME_OFFSET
                | hints::CLIENT_ADDRESS_INDEX
                | hints::CLIENT_PORT
                | hints::TRANSACTION_ID,
            query_response_signature_hints: hints::SERVER_ADDRESS
                | hints::SERVER_PORT
                | hints::QR_TRANSPORT_FLAGS
                | hints::QR_SIG_FLAGS,
            rr_hints: hints::TTL,
            other_data_hints: hints::ADDRESS_EVENT_COUNTS,
        };
        let bytes = encode(|e| sh.write_cbor(e).unwrap());
        assert_eq!(
            bytes,
            [(5 << 5) | 4, 0, 0x0f, 1, 0x17, 2, 1, 3, 2]
        );
    }

    #[test]
    fn test_default_config_sets_all_field_hints() {
        let sh = StorageHints::from_config(&Configuration::default());
        // Field hints all on, section hints off with default sections.
        assert_eq!(sh.query_response_hints & 0x3ff, 0x3ff);
        assert_eq!(sh.query_response_hints >> 11, 0);
        assert_eq!(sh.query_response_signature_hints, 0x1ffff);
        assert_eq!(sh.rr_hints, hints::TTL | hints::RDATA_INDEX);
        assert_eq!(sh.other_data_hints, hints::ADDRESS_EVENT_COUNTS);
    }

    #[test]
    fn test_exclusions_clear_hint_bits() {
        let mut config = Configuration::default();
        config.exclude_hints.client_port = true;
        config.exclude_hints.rr_ttl = true;
        config.exclude_hints.address_events = true;
        let sh = StorageHints::from_config(&config);
        assert_eq!(sh.query_response_hints & hints::CLIENT_PORT, 0);
        assert_eq!(sh.rr_hints, hints::RDATA_INDEX);
        assert_eq!(sh.other_data_hints, 0);
    }

    #[test]
    fn test_storage_parameters_minimal_encoding() {
        let mut sp = StorageParameters::from_config(&Configuration::default());
        sp.ticks_per_second = 1;
        sp.max_block_items = 2;
        let bytes = encode(|e| sp.write_cbor(e).unwrap());
        // Indefinite map, tps, max items, hints map, empty opcode and
        // rr-type lists, no prefixes (defaults), break.
        assert_eq!(bytes[0], (5 << 5) | 31);
        assert_eq!(&bytes[1..5], [0, 1, 1, 2]);
        assert_eq!(*bytes.last().unwrap(), 0xff);

        // Same parameters with a shrunk hint set: prefixes at their
        // defaults are omitted, so the map ends right after the empty
        // opcode and rr-type lists.
        sp.storage_hints = StorageHints {
            query_response_hints: 0,
            query_response_signature_hints: 0,
            rr_hints: 0,
            other_data_hints: 0,
        };
        let bytes = encode(|e| sp.write_cbor(e).unwrap());
        assert_eq!(
            bytes,
            [
                (5 << 5) | 31,
                0, 1,
                1, 2,
                2, (5 << 5) | 4, 0, 0, 1, 0, 2, 0, 3, 0,
                3, (4 << 5),
                4, (4 << 5),
                0xff
            ]
        );
    }

    #[test]
    fn test_non_default_prefixes_are_written() {
        let mut config = Configuration::default();
        config.client_address_prefix_ipv4 = 16;
        let sp = StorageParameters::from_config(&config);
        let bytes = encode(|e| sp.write_cbor(e).unwrap());
        // ... 6, 16, ... appears before the break.
        assert!(bytes.windows(2).any(|w| w == [6, 16]));
    }

    #[test]
    fn test_collection_parameters_encoding() {
        let params = CollectionParameters {
            query_timeout_ms: 1,
            skew_timeout_us: 2,
            snaplen: 3,
            dns_port: 4,
            promisc: true,
            interfaces: Vec::new(),
            server_addresses: Vec::new(),
            vlan_ids: Vec::new(),
            filter: String::new(),
            generator_id: String::new(),
            host_id: String::new(),
        };
        let bytes = encode(|e| params.write_cbor(e).unwrap());
        assert_eq!(
            bytes,
            [
                (5 << 5) | 31,
                0, 1,
                1, 2,
                2, 3,
                (1 << 5), 4, // dns-port at key -1
                3, (7 << 5) | 21,
                0xff
            ]
        );
    }

    #[test]
    fn test_block_parameters_shape() {
        let bp = BlockParameters::from_config(&Configuration::default());
        let bytes = encode(|e| bp.write_cbor(e).unwrap());
        assert_eq!(bytes[0], (5 << 5) | 2);
        assert_eq!(bytes[1], 0);
    }
}
