//! Cumulative packet statistics.
//!
//! The capture pipeline keeps one running instance of these counters and
//! passes a snapshot with every record and address event. Blocks record
//! the window between the snapshot at their first record and the snapshot
//! at their last.

/// Cumulative counters maintained by the capture pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketStatistics {
    /// DNS messages fully processed.
    pub processed_message_count: u64,
    /// Query/response pairs emitted.
    pub qr_pair_count: u64,
    /// Queries that timed out without a response.
    pub query_without_response_count: u64,
    /// Responses that matched no query.
    pub response_without_query_count: u64,
    /// Messages dropped for an unhandled OPCODE.
    pub discarded_opcode_count: u64,
    /// Messages that failed DNS parsing.
    pub malformed_message_count: u64,
    /// Packets that were not DNS at all.
    pub unhandled_packet_count: u64,
    /// Packets that arrived out of timestamp order.
    pub out_of_order_packet_count: u64,
    /// Pairs dropped on the way to the CBOR output.
    pub output_cbor_drop_count: u64,
    /// Raw packets dropped on the way to PCAP output.
    pub output_raw_pcap_drop_count: u64,
    /// Ignored packets dropped on the way to PCAP output.
    pub output_ignored_pcap_drop_count: u64,
    /// Raw packets seen.
    pub raw_packet_count: u64,
    /// Packets dropped by the sniffer.
    pub sniffer_drop_count: u64,
    /// Packets discarded by sampling.
    pub discarded_sampling_count: u64,
    /// Packets dropped by the matcher.
    pub matcher_drop_count: u64,
    /// Packets received by libpcap.
    pub pcap_recv_count: u64,
    /// Packets dropped by the interface.
    pub pcap_ifdrop_count: u64,
    /// Packets dropped by the OS.
    pub pcap_drop_count: u64,
}
