//! In-memory block data and its serialization.
//!
//! A block is a self-contained deduplication unit: eight intern tables,
//! the ordered list of query/response items referencing them, a multiset
//! of address events, and a statistics window. Blocks are built up by the
//! writer and serialized wholesale when full or on close.

use std::collections::BTreeMap;
use std::io::{self, Write};

use chrono::{DateTime, Utc};
use cdns_core::{AddressEventType, PacketStatistics};

use crate::cbor::CborEncoder;
use crate::params::BlockParameters;
use crate::schema::{
    AddressEventCountField, BlockField, BlockPreambleField, BlockStatisticsField,
    BlockTablesField, ClassTypeField, QueryResponseExtendedField, QueryResponseField,
    QueryResponseSignatureField, QuestionField, RrField,
};
use crate::table::{InternTable, TableIndex};

/// A query type and class pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassType {
    pub qtype: u16,
    pub qclass: u16,
}

/// A question table entry. Fields may be absent when excluded by hints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Question {
    pub qname: Option<TableIndex>,
    pub classtype: Option<TableIndex>,
}

/// A resource-record table entry. Fields may be absent when excluded by
/// hints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ResourceRecord {
    pub name: Option<TableIndex>,
    pub classtype: Option<TableIndex>,
    pub ttl: Option<u32>,
    pub rdata: Option<TableIndex>,
}

/// The recurring shape of a transaction, factored out of the per-record
/// item for deduplication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct QueryResponseSignature {
    pub server_address: Option<TableIndex>,
    pub server_port: Option<u16>,
    pub transport_flags: Option<u16>,
    pub qr_type: Option<u8>,
    pub qr_flags: Option<u16>,
    pub query_opcode: Option<u8>,
    pub dns_flags: Option<u16>,
    pub query_rcode: Option<u16>,
    pub query_classtype: Option<TableIndex>,
    pub qdcount: Option<u16>,
    pub query_ancount: Option<u16>,
    pub query_nscount: Option<u16>,
    pub query_arcount: Option<u16>,
    pub query_edns_version: Option<u8>,
    pub query_edns_payload_size: Option<u16>,
    pub query_opt_rdata: Option<TableIndex>,
    pub response_rcode: Option<u16>,
}

/// Indices of the interned extended-section lists of one message side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryResponseExtraInfo {
    pub questions_list: Option<TableIndex>,
    pub answers_list: Option<TableIndex>,
    pub authority_list: Option<TableIndex>,
    pub additional_list: Option<TableIndex>,
}

/// One recorded transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResponseItem {
    pub qr_flags: u16,
    pub tstamp: Option<DateTime<Utc>>,
    pub client_address: Option<TableIndex>,
    pub client_port: Option<u16>,
    pub transaction_id: Option<u16>,
    pub signature: Option<TableIndex>,
    pub hoplimit: Option<u8>,
    pub response_delay: Option<chrono::Duration>,
    pub qname: Option<TableIndex>,
    pub query_size: Option<u32>,
    pub response_size: Option<u32>,
    pub query_extra_info: Option<QueryResponseExtraInfo>,
    pub response_extra_info: Option<QueryResponseExtraInfo>,
}

impl QueryResponseItem {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn write_cbor<W: Write>(
        &self,
        enc: &mut CborEncoder<W>,
        earliest: DateTime<Utc>,
        ticks_per_second: u64,
    ) -> io::Result<()> {
        use QueryResponseField as F;

        enc.write_map_indefinite()?;
        if let Some(t) = self.tstamp {
            enc.write_int(F::TimeOffset.index())?;
            enc.write_duration(t - earliest, ticks_per_second)?;
        }
        if let Some(idx) = self.client_address {
            enc.write_int(F::ClientAddressIndex.index())?;
            enc.write_uint(idx as u64)?;
        }
        if let Some(port) = self.client_port {
            enc.write_int(F::ClientPort.index())?;
            enc.write_uint(u64::from(port))?;
        }
        if let Some(id) = self.transaction_id {
            enc.write_int(F::TransactionId.index())?;
            enc.write_uint(u64::from(id))?;
        }
        if let Some(idx) = self.signature {
            enc.write_int(F::QrSignatureIndex.index())?;
            enc.write_uint(idx as u64)?;
        }
        if let Some(hops) = self.hoplimit {
            enc.write_int(F::ClientHoplimit.index())?;
            enc.write_uint(u64::from(hops))?;
        }
        if let Some(delay) = self.response_delay {
            enc.write_int(F::ResponseDelay.index())?;
            enc.write_duration(delay, ticks_per_second)?;
        }
        if let Some(idx) = self.qname {
            enc.write_int(F::QueryNameIndex.index())?;
            enc.write_uint(idx as u64)?;
        }
        if let Some(size) = self.query_size {
            enc.write_int(F::QuerySize.index())?;
            enc.write_uint(u64::from(size))?;
        }
        if let Some(size) = self.response_size {
            enc.write_int(F::ResponseSize.index())?;
            enc.write_uint(u64::from(size))?;
        }
        if let Some(ei) = &self.query_extra_info {
            enc.write_int(F::QueryExtended.index())?;
            write_extra_info(enc, ei)?;
        }
        if let Some(ei) = &self.response_extra_info {
            enc.write_int(F::ResponseExtended.index())?;
            write_extra_info(enc, ei)?;
        }
        enc.write_break()
    }
}

fn write_extra_info<W: Write>(
    enc: &mut CborEncoder<W>,
    ei: &QueryResponseExtraInfo,
) -> io::Result<()> {
    use QueryResponseExtendedField as F;

    enc.write_map_indefinite()?;
    if let Some(idx) = ei.questions_list {
        enc.write_int(F::QuestionIndex.index())?;
        enc.write_uint(idx as u64)?;
    }
    if let Some(idx) = ei.answers_list {
        enc.write_int(F::AnswerIndex.index())?;
        enc.write_uint(idx as u64)?;
    }
    if let Some(idx) = ei.authority_list {
        enc.write_int(F::AuthorityIndex.index())?;
        enc.write_uint(idx as u64)?;
    }
    if let Some(idx) = ei.additional_list {
        enc.write_int(F::AdditionalIndex.index())?;
        enc.write_uint(idx as u64)?;
    }
    enc.write_break()
}

impl ClassType {
    fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        enc.write_map(2)?;
        enc.write_int(ClassTypeField::Type.index())?;
        enc.write_uint(u64::from(self.qtype))?;
        enc.write_int(ClassTypeField::Class.index())?;
        enc.write_uint(u64::from(self.qclass))
    }
}

impl Question {
    fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        let nitems = usize::from(self.qname.is_some()) + usize::from(self.classtype.is_some());
        enc.write_map(nitems)?;
        if let Some(idx) = self.qname {
            enc.write_int(QuestionField::NameIndex.index())?;
            enc.write_uint(idx as u64)?;
        }
        if let Some(idx) = self.classtype {
            enc.write_int(QuestionField::ClassTypeIndex.index())?;
            enc.write_uint(idx as u64)?;
        }
        Ok(())
    }
}

impl ResourceRecord {
    fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        let nitems = usize::from(self.name.is_some())
            + usize::from(self.classtype.is_some())
            + usize::from(self.ttl.is_some())
            + usize::from(self.rdata.is_some());
        enc.write_map(nitems)?;
        if let Some(idx) = self.name {
            enc.write_int(RrField::NameIndex.index())?;
            enc.write_uint(idx as u64)?;
        }
        if let Some(idx) = self.classtype {
            enc.write_int(RrField::ClassTypeIndex.index())?;
            enc.write_uint(idx as u64)?;
        }
        if let Some(ttl) = self.ttl {
            enc.write_int(RrField::Ttl.index())?;
            enc.write_uint(u64::from(ttl))?;
        }
        if let Some(idx) = self.rdata {
            enc.write_int(RrField::RdataIndex.index())?;
            enc.write_uint(idx as u64)?;
        }
        Ok(())
    }
}

impl QueryResponseSignature {
    fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        use QueryResponseSignatureField as F;

        let nitems = usize::from(self.server_address.is_some())
            + usize::from(self.server_port.is_some())
            + usize::from(self.transport_flags.is_some())
            + usize::from(self.qr_type.is_some())
            + usize::from(self.qr_flags.is_some())
            + usize::from(self.query_opcode.is_some())
            + usize::from(self.dns_flags.is_some())
            + usize::from(self.query_rcode.is_some())
            + usize::from(self.query_classtype.is_some())
            + usize::from(self.qdcount.is_some())
            + usize::from(self.query_ancount.is_some())
            + usize::from(self.query_nscount.is_some())
            + usize::from(self.query_arcount.is_some())
            + usize::from(self.query_edns_version.is_some())
            + usize::from(self.query_edns_payload_size.is_some())
            + usize::from(self.query_opt_rdata.is_some())
            + usize::from(self.response_rcode.is_some());

        enc.write_map(nitems)?;
        if let Some(idx) = self.server_address {
            enc.write_int(F::ServerAddressIndex.index())?;
            enc.write_uint(idx as u64)?;
        }
        if let Some(port) = self.server_port {
            enc.write_int(F::ServerPort.index())?;
            enc.write_uint(u64::from(port))?;
        }
        if let Some(flags) = self.transport_flags {
            enc.write_int(F::QrTransportFlags.index())?;
            enc.write_uint(u64::from(flags))?;
        }
        if let Some(t) = self.qr_type {
            enc.write_int(F::QrType.index())?;
            enc.write_uint(u64::from(t))?;
        }
        if let Some(flags) = self.qr_flags {
            enc.write_int(F::QrSigFlags.index())?;
            enc.write_uint(u64::from(flags))?;
        }
        if let Some(opcode) = self.query_opcode {
            enc.write_int(F::QueryOpcode.index())?;
            enc.write_uint(u64::from(opcode))?;
        }
        if let Some(flags) = self.dns_flags {
            enc.write_int(F::QrDnsFlags.index())?;
            enc.write_uint(u64::from(flags))?;
        }
        if let Some(rcode) = self.query_rcode {
            enc.write_int(F::QueryRcode.index())?;
            enc.write_uint(u64::from(rcode))?;
        }
        if let Some(idx) = self.query_classtype {
            enc.write_int(F::QueryClassTypeIndex.index())?;
            enc.write_uint(idx as u64)?;
        }
        if let Some(count) = self.qdcount {
            enc.write_int(F::QueryQdCount.index())?;
            enc.write_uint(u64::from(count))?;
        }
        if let Some(count) = self.query_ancount {
            enc.write_int(F::QueryAnCount.index())?;
            enc.write_uint(u64::from(count))?;
        }
        if let Some(count) = self.query_nscount {
            enc.write_int(F::QueryNsCount.index())?;
            enc.write_uint(u64::from(count))?;
        }
        if let Some(count) = self.query_arcount {
            enc.write_int(F::QueryArCount.index())?;
            enc.write_uint(u64::from(count))?;
        }
        if let Some(version) = self.query_edns_version {
            enc.write_int(F::QueryEdnsVersion.index())?;
            enc.write_uint(u64::from(version))?;
        }
        if let Some(size) = self.query_edns_payload_size {
            enc.write_int(F::QueryUdpSize.index())?;
            enc.write_uint(u64::from(size))?;
        }
        if let Some(idx) = self.query_opt_rdata {
            enc.write_int(F::QueryOptRdataIndex.index())?;
            enc.write_uint(idx as u64)?;
        }
        if let Some(rcode) = self.response_rcode {
            enc.write_int(F::ResponseRcode.index())?;
            enc.write_uint(u64::from(rcode))?;
        }
        Ok(())
    }
}

/// Identity of an address-event counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AddressEventKey {
    pub event_type: AddressEventType,
    pub code: u16,
    pub address: TableIndex,
    pub transport_flags: u16,
}

impl AddressEventKey {
    fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>, count: u64) -> io::Result<()> {
        use AddressEventCountField as F;

        enc.write_map_indefinite()?;
        enc.write_int(F::AeType.index())?;
        enc.write_uint(self.event_type as u64)?;
        enc.write_int(F::AeCode.index())?;
        enc.write_uint(u64::from(self.code))?;
        enc.write_int(F::AeAddressIndex.index())?;
        enc.write_uint(self.address as u64)?;
        enc.write_int(F::AeTransportFlags.index())?;
        enc.write_uint(u64::from(self.transport_flags))?;
        enc.write_int(F::AeCount.index())?;
        enc.write_uint(count)?;
        enc.write_break()
    }
}

/// One block's worth of capture data.
#[derive(Debug, Clone)]
pub struct BlockData {
    ticks_per_second: u64,
    max_block_items: usize,

    pub earliest_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,

    pub start_packet_statistics: PacketStatistics,
    pub last_packet_statistics: PacketStatistics,

    pub addresses: InternTable<Vec<u8>>,
    pub class_types: InternTable<ClassType>,
    pub names_rdatas: InternTable<Vec<u8>>,
    pub query_response_signatures: InternTable<QueryResponseSignature>,
    pub questions_lists: InternTable<Vec<TableIndex>>,
    pub question_records: InternTable<Question>,
    pub rr_lists: InternTable<Vec<TableIndex>>,
    pub resource_records: InternTable<ResourceRecord>,

    pub query_response_items: Vec<QueryResponseItem>,
    pub address_event_counts: BTreeMap<AddressEventKey, u64>,
}

impl BlockData {
    #[must_use]
    pub fn new(params: &BlockParameters) -> Self {
        Self {
            ticks_per_second: params.storage.ticks_per_second,
            max_block_items: params.storage.max_block_items as usize,
            earliest_time: None,
            start_time: None,
            end_time: None,
            start_packet_statistics: PacketStatistics::default(),
            last_packet_statistics: PacketStatistics::default(),
            addresses: InternTable::new(),
            class_types: InternTable::new(),
            names_rdatas: InternTable::new(),
            query_response_signatures: InternTable::new(),
            questions_lists: InternTable::new(),
            question_records: InternTable::new(),
            rr_lists: InternTable::new(),
            resource_records: InternTable::new(),
            query_response_items: Vec::new(),
            address_event_counts: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn ticks_per_second(&self) -> u64 {
        self.ticks_per_second
    }

    /// `true` once the block holds the configured number of records.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.query_response_items.len() >= self.max_block_items
    }

    /// `true` when flushing the block would write no data of interest.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.query_response_items.is_empty() && self.address_event_counts.is_empty()
    }

    /// Drop all tables, items and counters, keeping the block parameters.
    pub fn clear(&mut self) {
        self.earliest_time = None;
        self.start_time = None;
        self.end_time = None;
        self.start_packet_statistics = PacketStatistics::default();
        self.last_packet_statistics = PacketStatistics::default();
        self.addresses.clear();
        self.class_types.clear();
        self.names_rdatas.clear();
        self.query_response_signatures.clear();
        self.questions_lists.clear();
        self.question_records.clear();
        self.rr_lists.clear();
        self.resource_records.clear();
        self.query_response_items.clear();
        self.address_event_counts.clear();
    }

    pub fn add_address(&mut self, address: Vec<u8>) -> TableIndex {
        self.addresses.add(address)
    }

    pub fn add_classtype(&mut self, ct: ClassType) -> TableIndex {
        self.class_types.add(ct)
    }

    pub fn add_name_rdata(&mut self, bytes: Vec<u8>) -> TableIndex {
        self.names_rdatas.add(bytes)
    }

    pub fn add_question(&mut self, q: Question) -> TableIndex {
        self.question_records.add(q)
    }

    pub fn add_resource_record(&mut self, rr: ResourceRecord) -> TableIndex {
        self.resource_records.add(rr)
    }

    pub fn add_questions_list(&mut self, list: Vec<TableIndex>) -> TableIndex {
        self.questions_lists.add(list)
    }

    pub fn add_rrs_list(&mut self, list: Vec<TableIndex>) -> TableIndex {
        self.rr_lists.add(list)
    }

    pub fn add_query_response_signature(&mut self, sig: QueryResponseSignature) -> TableIndex {
        self.query_response_signatures.add(sig)
    }

    /// Count one address event against its (type, code, address,
    /// transport) identity.
    pub fn count_address_event(
        &mut self,
        event_type: AddressEventType,
        code: u16,
        address: Vec<u8>,
        is_ipv6: bool,
    ) {
        let address = self.addresses.add(address);
        let key = AddressEventKey {
            event_type,
            code,
            address,
            transport_flags: if is_ipv6 {
                crate::flags::transport_flags::IPV6
            } else {
                0
            },
        };
        *self.address_event_counts.entry(key).or_insert(0) += 1;
    }

    /// Serialize the whole block as one CBOR map.
    pub fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        let earliest = self
            .earliest_time
            .or(self.start_time)
            .unwrap_or(DateTime::UNIX_EPOCH);

        enc.write_map_indefinite()?;

        // Preamble. The start time is suppressed when it post-dates the
        // earliest record, which happens when a live capture is fed old
        // data.
        let start = self.start_time.filter(|&t| t <= earliest);
        enc.write_int(BlockField::Preamble.index())?;
        enc.write_map(1 + usize::from(self.end_time.is_some()) + usize::from(start.is_some()))?;
        enc.write_int(BlockPreambleField::EarliestTime.index())?;
        enc.write_time(earliest, self.ticks_per_second)?;
        if let Some(end) = self.end_time {
            enc.write_int(BlockPreambleField::EndTime.index())?;
            enc.write_time(end, self.ticks_per_second)?;
        }
        if let Some(start) = start {
            enc.write_int(BlockPreambleField::StartTime.index())?;
            enc.write_time(start, self.ticks_per_second)?;
        }

        enc.write_int(BlockField::Statistics.index())?;
        self.write_stats(enc)?;

        enc.write_int(BlockField::Tables.index())?;
        self.write_tables(enc)?;

        if !self.query_response_items.is_empty() {
            enc.write_int(BlockField::Items.index())?;
            enc.write_array(self.query_response_items.len())?;
            for item in &self.query_response_items {
                item.write_cbor(enc, earliest, self.ticks_per_second)?;
            }
        }

        if !self.address_event_counts.is_empty() {
            enc.write_int(BlockField::AddressEventCounts.index())?;
            enc.write_array(self.address_event_counts.len())?;
            for (key, &count) in &self.address_event_counts {
                key.write_cbor(enc, count)?;
            }
        }

        enc.write_break()
    }

    /// Statistics are written as the window between the start and last
    /// snapshots.
    fn write_stats<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        use BlockStatisticsField as F;

        let s = &self.start_packet_statistics;
        let l = &self.last_packet_statistics;
        let fields = [
            (F::ProcessedMessages, l.processed_message_count, s.processed_message_count),
            (F::QrDataItems, l.qr_pair_count, s.qr_pair_count),
            (F::UnmatchedQueries, l.query_without_response_count, s.query_without_response_count),
            (F::UnmatchedResponses, l.response_without_query_count, s.response_without_query_count),
            (F::DiscardedOpcode, l.discarded_opcode_count, s.discarded_opcode_count),
            (F::MalformedItems, l.malformed_message_count, s.malformed_message_count),
            (F::NonDnsPackets, l.unhandled_packet_count, s.unhandled_packet_count),
            (F::OutOfOrderPackets, l.out_of_order_packet_count, s.out_of_order_packet_count),
            (F::MissingPairs, l.output_cbor_drop_count, s.output_cbor_drop_count),
            (F::MissingPackets, l.output_raw_pcap_drop_count, s.output_raw_pcap_drop_count),
            (F::MissingNonDns, l.output_ignored_pcap_drop_count, s.output_ignored_pcap_drop_count),
            (F::Packets, l.raw_packet_count, s.raw_packet_count),
            (F::MissingReceived, l.sniffer_drop_count, s.sniffer_drop_count),
            (F::DiscardedPackets, l.discarded_sampling_count, s.discarded_sampling_count),
            (F::MissingMatcher, l.matcher_drop_count, s.matcher_drop_count),
            (F::PcapPackets, l.pcap_recv_count, s.pcap_recv_count),
            (F::PcapMissingIf, l.pcap_ifdrop_count, s.pcap_ifdrop_count),
            (F::PcapMissingOs, l.pcap_drop_count, s.pcap_drop_count),
        ];

        enc.write_map_indefinite()?;
        for (field, last, start) in fields {
            enc.write_int(field.index())?;
            enc.write_uint(last.saturating_sub(start))?;
        }
        enc.write_break()
    }

    fn write_tables<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        use BlockTablesField as F;

        enc.write_map_indefinite()?;
        if !self.addresses.is_empty() {
            enc.write_int(F::IpAddress.index())?;
            enc.write_array(self.addresses.len())?;
            for addr in self.addresses.iter() {
                enc.write_bytes(addr)?;
            }
        }
        if !self.class_types.is_empty() {
            enc.write_int(F::ClassType.index())?;
            enc.write_array(self.class_types.len())?;
            for ct in self.class_types.iter() {
                ct.write_cbor(enc)?;
            }
        }
        if !self.names_rdatas.is_empty() {
            enc.write_int(F::NameRdata.index())?;
            enc.write_array(self.names_rdatas.len())?;
            for bytes in self.names_rdatas.iter() {
                enc.write_bytes(bytes)?;
            }
        }
        if !self.query_response_signatures.is_empty() {
            enc.write_int(F::QueryResponseSignature.index())?;
            enc.write_array(self.query_response_signatures.len())?;
            for sig in self.query_response_signatures.iter() {
                sig.write_cbor(enc)?;
            }
        }
        if !self.questions_lists.is_empty() {
            enc.write_int(F::QuestionList.index())?;
            enc.write_array(self.questions_lists.len())?;
            for list in self.questions_lists.iter() {
                enc.write_array(list.len())?;
                for &idx in list {
                    enc.write_uint(idx as u64)?;
                }
            }
        }
        if !self.question_records.is_empty() {
            enc.write_int(F::QuestionRr.index())?;
            enc.write_array(self.question_records.len())?;
            for q in self.question_records.iter() {
                q.write_cbor(enc)?;
            }
        }
        if !self.rr_lists.is_empty() {
            enc.write_int(F::RrList.index())?;
            enc.write_array(self.rr_lists.len())?;
            for list in self.rr_lists.iter() {
                enc.write_array(list.len())?;
                for &idx in list {
                    enc.write_uint(idx as u64)?;
                }
            }
        }
        if !self.resource_records.is_empty() {
            enc.write_int(F::Rr.index())?;
            enc.write_array(self.resource_records.len())?;
            for rr in self.resource_records.iter() {
                rr.write_cbor(enc)?;
            }
        }
        enc.write_break()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdns_core::Configuration;
    use chrono::TimeZone;

    fn encode(f: impl FnOnce(&mut CborEncoder<Vec<u8>>)) -> Vec<u8> {
        let mut enc = CborEncoder::new(Vec::new());
        f(&mut enc);
        enc.into_inner().unwrap()
    }

    fn test_params(max_block_items: usize, ticks_per_second: u64) -> BlockParameters {
        let mut params = BlockParameters::from_config(&Configuration::default());
        params.storage.max_block_items = max_block_items as u64;
        params.storage.ticks_per_second = ticks_per_second;
        params
    }

    #[test]
    fn test_classtype_encoding() {
        let ct = ClassType { qtype: 1, qclass: 1 };
        assert_eq!(encode(|e| ct.write_cbor(e).unwrap()), [0xa2, 0, 1, 1, 1]);
        let ct = ClassType { qtype: 5, qclass: 1 };
        assert_eq!(encode(|e| ct.write_cbor(e).unwrap()), [0xa2, 0, 5, 1, 1]);
    }

    #[test]
    fn test_question_encoding_with_exclusions() {
        let q = Question {
            qname: Some(1),
            classtype: Some(20),
        };
        assert_eq!(encode(|e| q.write_cbor(e).unwrap()), [0xa2, 0, 1, 1, 20]);

        let q = Question {
            qname: None,
            classtype: Some(20),
        };
        assert_eq!(encode(|e| q.write_cbor(e).unwrap()), [0xa1, 1, 20]);

        let q = Question {
            qname: Some(1),
            classtype: None,
        };
        assert_eq!(encode(|e| q.write_cbor(e).unwrap()), [0xa1, 0, 1]);
    }

    #[test]
    fn test_resource_record_encoding_with_exclusions() {
        let full = ResourceRecord {
            name: Some(1),
            classtype: Some(12),
            ttl: Some(10),
            rdata: Some(11),
        };
        assert_eq!(
            encode(|e| full.write_cbor(e).unwrap()),
            [0xa4, 0, 1, 1, 12, 2, 10, 3, 11]
        );

        let no_ttl = ResourceRecord {
            ttl: None,
            ..full
        };
        assert_eq!(
            encode(|e| no_ttl.write_cbor(e).unwrap()),
            [0xa3, 0, 1, 1, 12, 3, 11]
        );

        let no_rdata = ResourceRecord {
            rdata: None,
            ..full
        };
        assert_eq!(
            encode(|e| no_rdata.write_cbor(e).unwrap()),
            [0xa3, 0, 1, 1, 12, 2, 10]
        );
    }

    #[test]
    fn test_signature_encoding_counts_present_fields() {
        let mut sig = QueryResponseSignature::default();
        sig.server_address = Some(1);
        sig.server_port = Some(2);
        sig.transport_flags = Some(3);
        sig.qr_type = Some(4);
        sig.qr_flags = Some(0x1f);
        sig.qdcount = Some(1);
        sig.query_rcode = Some(22);
        sig.response_rcode = Some(23);
        sig.query_opcode = Some(2);
        sig.query_edns_version = Some(0);
        sig.query_edns_payload_size = Some(22);
        sig.query_opt_rdata = Some(4);
        sig.dns_flags = Some(8);
        sig.query_classtype = Some(3);
        sig.query_ancount = Some(2);
        sig.query_nscount = Some(4);
        sig.query_arcount = Some(3);

        let bytes = encode(|e| sig.write_cbor(e).unwrap());
        assert_eq!(
            bytes,
            [
                (5 << 5) | 17,
                0, 1,
                1, 2,
                2, 3,
                3, 4,
                4, 0x18, 0x1f,
                5, 2,
                6, 8,
                7, 22,
                8, 3,
                9, 1,
                10, 2,
                11, 4,
                12, 3,
                13, 0,
                14, 22,
                15, 4,
                16, 23,
            ]
        );

        // Dropping a field shrinks the map by one entry.
        sig.server_address = None;
        let bytes = encode(|e| sig.write_cbor(e).unwrap());
        assert_eq!(bytes[0], (5 << 5) | 16);
        assert_eq!(bytes[1], 1);
    }

    #[test]
    fn test_item_encoding() {
        let earliest = Utc.timestamp_opt(0, 0).unwrap();
        let item = QueryResponseItem {
            qr_flags: 0x1f,
            tstamp: Some(Utc.timestamp_opt(0, 5000).unwrap()),
            client_address: Some(1),
            client_port: Some(2),
            transaction_id: Some(21),
            signature: Some(6),
            hoplimit: Some(20),
            response_delay: Some(chrono::Duration::microseconds(10)),
            qname: Some(5),
            query_size: Some(10),
            response_size: Some(20),
            query_extra_info: Some(QueryResponseExtraInfo {
                questions_list: Some(12),
                answers_list: Some(13),
                authority_list: Some(14),
                additional_list: Some(15),
            }),
            response_extra_info: Some(QueryResponseExtraInfo {
                questions_list: Some(16),
                answers_list: Some(17),
                authority_list: Some(18),
                additional_list: Some(19),
            }),
        };

        // Microsecond ticks, so offsets come out in microseconds.
        let bytes = encode(|e| item.write_cbor(e, earliest, 1_000_000).unwrap());
        assert_eq!(
            bytes,
            [
                (5 << 5) | 31,
                0, 5,
                1, 1,
                2, 2,
                3, 21,
                4, 6,
                5, 20,
                6, 10,
                7, 5,
                8, 10,
                9, 20,
                11, (5 << 5) | 31, 0, 12, 1, 13, 2, 14, 3, 15, 0xff,
                12, (5 << 5) | 31, 0, 16, 1, 17, 2, 18, 3, 19, 0xff,
                0xff,
            ]
        );
    }

    #[test]
    fn test_item_encoding_optional_absence() {
        let earliest = Utc.timestamp_opt(0, 0).unwrap();
        let item = QueryResponseItem {
            tstamp: Some(Utc.timestamp_opt(0, 5000).unwrap()),
            signature: Some(6),
            ..Default::default()
        };
        let bytes = encode(|e| item.write_cbor(e, earliest, 1_000_000).unwrap());
        assert_eq!(bytes, [(5 << 5) | 31, 0, 5, 4, 6, 0xff]);
    }

    #[test]
    fn test_interning_via_block() {
        let mut block = BlockData::new(&test_params(10, 1_000_000));
        let a = block.add_name_rdata(b"example.com".to_vec());
        let b = block.add_name_rdata(b"example.com".to_vec());
        let c = block.add_name_rdata(b"example.org".to_vec());
        assert_eq!((a, b, c), (1, 1, 2));

        let ct = ClassType { qtype: 1, qclass: 1 };
        assert_eq!(block.add_classtype(ct), 1);
        assert_eq!(block.add_classtype(ct), 1);

        let sig = QueryResponseSignature {
            server_port: Some(53),
            ..Default::default()
        };
        assert_eq!(block.add_query_response_signature(sig), 1);
        assert_eq!(block.add_query_response_signature(sig), 1);
        let sig2 = QueryResponseSignature {
            server_port: Some(5353),
            ..Default::default()
        };
        assert_eq!(block.add_query_response_signature(sig2), 2);
    }

    #[test]
    fn test_block_capacity() {
        let mut block = BlockData::new(&test_params(2, 1_000_000));
        assert!(!block.is_full());
        block.query_response_items.push(QueryResponseItem::default());
        assert!(!block.is_full());
        block.query_response_items.push(QueryResponseItem::default());
        assert!(block.is_full());
        block.clear();
        assert!(!block.is_full());
        assert!(block.is_empty());
    }

    #[test]
    fn test_address_event_accumulation() {
        let mut block = BlockData::new(&test_params(10, 1_000_000));
        block.count_address_event(AddressEventType::TcpReset, 0, vec![192, 0, 2], false);
        block.count_address_event(AddressEventType::TcpReset, 0, vec![192, 0, 2], false);
        block.count_address_event(AddressEventType::TcpReset, 0, vec![192, 0, 3], false);
        assert_eq!(block.address_event_counts.len(), 2);
        assert_eq!(block.address_event_counts.values().sum::<u64>(), 3);
        // Both distinct addresses interned once.
        assert_eq!(block.addresses.len(), 2);
    }

    #[test]
    fn test_empty_block_encoding() {
        let mut block = BlockData::new(&test_params(10, 1_000_000));
        block.earliest_time = Some(Utc.timestamp_opt(1, 1000).unwrap());
        block.end_time = Some(Utc.timestamp_opt(1, 10_000).unwrap());

        let bytes = encode(|e| block.write_cbor(e).unwrap());
        let expected = [
            (5 << 5) | 31,
            0, (5 << 5) | 2,
            0, (4 << 5) | 2, 1, 1,
            (1 << 5), (4 << 5) | 2, 1, 10,
            1,
            (5 << 5) | 31,
            0, 0,
            1, 0,
            2, 0,
            3, 0,
            4, 0,
            5, 0,
            (1 << 5), 0,
            (1 << 5) | 1, 0,
            (1 << 5) | 2, 0,
            (1 << 5) | 3, 0,
            (1 << 5) | 4, 0,
            (1 << 5) | 5, 0,
            (1 << 5) | 6, 0,
            (1 << 5) | 7, 0,
            (1 << 5) | 8, 0,
            (1 << 5) | 9, 0,
            (1 << 5) | 10, 0,
            (1 << 5) | 11, 0,
            0xff,
            2,
            (5 << 5) | 31,
            0xff,
            0xff,
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_block_start_time_suppressed_when_late() {
        let mut block = BlockData::new(&test_params(10, 1_000_000));
        block.earliest_time = Some(Utc.timestamp_opt(1, 2000).unwrap());
        block.end_time = Some(Utc.timestamp_opt(1, 3000).unwrap());

        // In range: written.
        block.start_time = Some(Utc.timestamp_opt(1, 1000).unwrap());
        let bytes = encode(|e| block.write_cbor(e).unwrap());
        assert_eq!(bytes[2], (5 << 5) | 3);
        assert!(bytes.windows(5).any(|w| w == [(1 << 5) | 1, (4 << 5) | 2, 1, 1, 1]));

        // Later than earliest: suppressed.
        block.start_time = Some(Utc.timestamp_opt(1, 5000).unwrap());
        let bytes = encode(|e| block.write_cbor(e).unwrap());
        assert_eq!(bytes[2], (5 << 5) | 2);
    }

    #[test]
    fn test_stats_window_deltas() {
        let mut block = BlockData::new(&test_params(10, 1_000_000));
        block.start_packet_statistics.processed_message_count = 10;
        block.start_packet_statistics.qr_pair_count = 4;
        block.last_packet_statistics.processed_message_count = 17;
        block.last_packet_statistics.qr_pair_count = 9;

        let bytes = encode(|e| block.write_stats(e).unwrap());
        assert_eq!(bytes[0], (5 << 5) | 31);
        assert_eq!(&bytes[1..5], [0, 7, 1, 5]);
    }

    #[test]
    fn test_block_with_tables_and_items() {
        let mut block = BlockData::new(&test_params(10, 1_000_000));
        let t0 = Utc.timestamp_opt(100, 0).unwrap();
        block.earliest_time = Some(t0);

        let name = block.add_name_rdata(b"\x07example\x03com\x00".to_vec());
        let ct = block.add_classtype(ClassType { qtype: 1, qclass: 1 });
        let addr = block.add_address(vec![198, 51, 100]);
        let sig = block.add_query_response_signature(QueryResponseSignature {
            query_classtype: Some(ct),
            ..Default::default()
        });
        block.query_response_items.push(QueryResponseItem {
            tstamp: Some(t0),
            client_address: Some(addr),
            qname: Some(name),
            signature: Some(sig),
            ..Default::default()
        });

        let bytes = encode(|e| block.write_cbor(e).unwrap());

        // Structural checks via a generic CBOR decode.
        let value: ciborium::Value = ciborium::from_reader(bytes.as_slice()).unwrap();
        let map = value.as_map().unwrap();
        let keys: Vec<i64> = map
            .iter()
            .map(|(k, _)| k.as_integer().unwrap().try_into().unwrap())
            .collect();
        assert_eq!(keys, [0, 1, 2, 3]);

        let tables = map[2].1.as_map().unwrap();
        let table_keys: Vec<i64> = tables
            .iter()
            .map(|(k, _)| k.as_integer().unwrap().try_into().unwrap())
            .collect();
        // Address, classtype, name-rdata and signature tables present;
        // question/RR tables absent.
        assert_eq!(table_keys, [0, 1, 2, 3]);

        let items = map[3].1.as_array().unwrap();
        assert_eq!(items.len(), 1);
    }
}
