//! The block CBOR writer.
//!
//! Drives the file lifecycle (preamble, blocks, footer), rotation by
//! wall time and output size, per-record ingest, block flushing and the
//! statistics window. Ingest follows a strict sequence per transaction:
//! `start_record`, `write_basic`, optional extended groups, `end_record`.
//! The [`BlockCborWriter::write_qr`] driver runs the whole sequence from
//! a matched pair.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use cdns_core::address::mask_address;
use cdns_core::config::sections;
use cdns_core::{
    AddressEvent, CdnsError, Configuration, DnsMessage, PacketStatistics, QueryResponse,
    QuestionData, Result, RrData,
};
use cdns_format::block::{
    BlockData, ClassType, Question, QueryResponseExtraInfo, QueryResponseItem,
    QueryResponseSignature, ResourceRecord,
};
use cdns_format::cbor::CborEncoder;
use cdns_format::flags::{self, qr_flags};
use cdns_format::params::BlockParameters;
use cdns_format::schema::{self, FilePreambleField};
use cdns_format::table::TableIndex;

use crate::pattern::OutputPattern;
use crate::sink::CaptureSink;

/// RR type of the OPT pseudo-record.
const TYPE_OPT: u16 = 41;

/// Which message side an extended group belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtendedSide {
    Query,
    Response,
}

/// Which RR scratch list `write_resource_record` appends to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RrSection {
    Answers,
    Authority,
    Additional,
}

/// Writes observed DNS transactions as rotated C-DNS files.
pub struct BlockCborWriter {
    config: Configuration,
    pattern: OutputPattern,
    block_parameters: BlockParameters,
    live: bool,

    enc: Option<CborEncoder<CaptureSink>>,
    open_period: i64,

    data: BlockData,
    in_progress: QueryResponseItem,
    record_active: bool,

    ext_side: Option<ExtendedSide>,
    rr_section: Option<RrSection>,
    ext_questions: Vec<TableIndex>,
    ext_answers: Vec<TableIndex>,
    ext_authority: Vec<TableIndex>,
    ext_additional: Vec<TableIndex>,

    last_end_block_statistics: PacketStatistics,
    need_start_block_stats: bool,
}

impl BlockCborWriter {
    /// Build a writer. No file is opened until the first
    /// [`check_for_rotation`](Self::check_for_rotation).
    ///
    /// In live mode the first block's start time is the construction
    /// time, and closing stamps a missing end time with the current
    /// time.
    pub fn new(config: Configuration, live: bool) -> Result<Self> {
        config.validate()?;
        let pattern = OutputPattern::new(
            &config.output_pattern,
            CaptureSink::suggested_extension(config.compression),
            config.rotation_period,
        )?;
        let block_parameters = BlockParameters::from_config(&config);
        let mut data = BlockData::new(&block_parameters);
        if live {
            data.start_time = Some(Utc::now());
        }

        Ok(Self {
            config,
            pattern,
            block_parameters,
            live,
            enc: None,
            open_period: 0,
            data,
            in_progress: QueryResponseItem::default(),
            record_active: false,
            ext_side: None,
            rr_section: None,
            ext_questions: Vec::new(),
            ext_answers: Vec::new(),
            ext_authority: Vec::new(),
            ext_additional: Vec::new(),
            last_end_block_statistics: PacketStatistics::default(),
            need_start_block_stats: true,
        })
    }

    /// `true` while an output file is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.enc.is_some()
    }

    /// Name of the file currently being written.
    #[must_use]
    pub fn current_file(&self) -> Option<&Path> {
        self.enc.as_ref().map(|e| e.get_ref().path())
    }

    /// Open or rotate the output file if `ts` calls for it: no file is
    /// open yet, the size cap is reached, or `ts` crossed a rotation
    /// period boundary.
    pub fn check_for_rotation(&mut self, ts: DateTime<Utc>) -> Result<()> {
        let rotate = match &self.enc {
            None => true,
            Some(enc) => {
                (self.config.max_output_size > 0
                    && enc.bytes_written() >= self.config.max_output_size)
                    || self.pattern.needs_rotation(self.open_period, ts)
            }
        };
        if !rotate {
            return Ok(());
        }

        if self.enc.is_some() {
            self.data.end_time = Some(ts);
            self.close()?;
            self.data.start_time = Some(ts);
        }

        let filename = self.pattern.filename(ts);
        info!(file = %filename.display(), "rotating C-DNS output");
        let level = match self.config.compression {
            cdns_core::Compression::Gzip => self.config.gzip_level,
            cdns_core::Compression::Xz => self.config.xz_preset,
            cdns_core::Compression::None => 0,
        };
        let sink = CaptureSink::create(
            &filename,
            self.config.compression,
            level,
            self.config.log_file_handling,
        )?;
        self.enc = Some(CborEncoder::new(sink));
        self.open_period = self.pattern.period_index(ts);
        self.write_file_header()
    }

    /// Begin a record. If the current block is full it is flushed first
    /// and the new block starts at this record's leading timestamp.
    pub fn start_record(&mut self, qr: &QueryResponse) -> Result<()> {
        if self.data.is_full() {
            let ts = qr.timestamp();
            self.data.end_time = Some(ts);
            let mut enc = self.enc.take().ok_or_else(|| {
                CdnsError::Invariant("block full with no output file open".into())
            })?;
            let res = self.flush_block(&mut enc);
            self.enc = Some(enc);
            res?;
            self.data.start_time = Some(ts);
        }
        self.in_progress.clear();
        self.clear_scratch();
        self.record_active = true;
        Ok(())
    }

    /// Move the in-progress record into the block.
    pub fn end_record(&mut self, _qr: &QueryResponse) -> Result<()> {
        if !self.record_active {
            return Err(CdnsError::Invariant(
                "end_record without start_record".into(),
            ));
        }
        self.data
            .query_response_items
            .push(std::mem::take(&mut self.in_progress));
        self.record_active = false;
        Ok(())
    }

    /// Populate the in-progress record and its signature from the pair,
    /// honoring the configured exclusion hints.
    pub fn write_basic(&mut self, qr: &QueryResponse, stats: &PacketStatistics) -> Result<()> {
        if !self.record_active {
            return Err(CdnsError::Invariant(
                "write_basic without start_record".into(),
            ));
        }

        let lead = qr.lead();
        let mut qs = QueryResponseSignature::default();
        self.in_progress.qr_flags = 0;

        self.update_block_stats(stats);

        if self.data.query_response_items.is_empty()
            || self.data.earliest_time.map_or(true, |t| lead.timestamp < t)
        {
            self.data.earliest_time = Some(lead.timestamp);
        }
        if self.config.start_end_times_from_data {
            if self.data.end_time.map_or(true, |t| lead.timestamp > t) {
                self.data.end_time = Some(lead.timestamp);
            }
            if self.data.start_time.map_or(true, |t| lead.timestamp < t) {
                self.data.start_time = Some(lead.timestamp);
            }
        }

        let ex = self.config.exclude_hints.clone();

        // Signature basics.
        if !ex.server_address {
            if let Some(addr) = lead.server_ip {
                let masked =
                    mask_address(&addr, self.config.address_prefix(false, addr.is_ipv6()));
                qs.server_address = Some(self.data.add_address(masked));
            }
        }
        if !ex.server_port {
            qs.server_port = lead.server_port;
        }
        if !ex.transport {
            qs.transport_flags = Some(flags::transport_flags(qr));
        }
        if !ex.transaction_type {
            qs.qr_type = flags::transaction_type(qr);
        }
        if !ex.dns_flags {
            qs.dns_flags = Some(flags::dns_flags(qr));
        }

        // Record basics.
        if !ex.timestamp {
            self.in_progress.tstamp = Some(lead.timestamp);
        }
        if !ex.client_address {
            if let Some(addr) = lead.client_ip {
                let masked =
                    mask_address(&addr, self.config.address_prefix(true, addr.is_ipv6()));
                self.in_progress.client_address = Some(self.data.add_address(masked));
            }
        }
        if !ex.client_port {
            self.in_progress.client_port = lead.client_port;
        }
        if !ex.transaction_id {
            self.in_progress.transaction_id = Some(lead.id);
        }
        if !ex.query_qdcount {
            qs.qdcount = Some(lead.qdcount);
        }

        // First question.
        if lead.questions.is_empty() {
            self.in_progress.qr_flags |= qr_flags::QUERY_HAS_NO_QUESTION;
        } else {
            let question = &lead.questions[0];
            if !ex.query_class_type {
                qs.query_classtype = Some(self.data.add_classtype(ClassType {
                    qtype: question.qtype,
                    qclass: question.qclass,
                }));
            }
            if !ex.query_name {
                self.in_progress.qname = Some(self.data.add_name_rdata(question.name.clone()));
            }
        }

        if let Some(q) = qr.query() {
            self.in_progress.qr_flags |= qr_flags::HAS_QUERY;
            if !ex.query_size {
                self.in_progress.query_size = q.wire_size;
            }
            if !ex.client_hoplimit {
                self.in_progress.hoplimit = q.hoplimit;
            }
            if !ex.query_opcode {
                qs.query_opcode = Some(q.opcode);
            }
            if !ex.query_rcode {
                qs.query_rcode = Some(u16::from(q.rcode));
            }
            if !ex.query_ancount {
                qs.query_ancount = Some(q.ancount);
            }
            if !ex.query_nscount {
                qs.query_nscount = Some(q.nscount);
            }
            if !ex.query_arcount {
                qs.query_arcount = Some(q.arcount);
            }

            if let Some(edns) = &q.edns {
                if !ex.query_rcode {
                    qs.query_rcode =
                        Some(u16::from(edns.extended_rcode) << 4 | u16::from(q.rcode));
                }
                self.in_progress.qr_flags |= qr_flags::QUERY_HAS_OPT;
                if !ex.query_udp_size {
                    qs.query_edns_payload_size = Some(edns.udp_payload_size);
                }
                if !ex.query_edns_version {
                    qs.query_edns_version = Some(edns.version);
                }
                if !ex.query_opt_rdata {
                    qs.query_opt_rdata =
                        Some(self.data.add_name_rdata(edns.opt_rdata.clone()));
                }
            }
        }

        if let Some(r) = qr.response() {
            self.in_progress.qr_flags |= qr_flags::HAS_RESPONSE;
            if !ex.response_size {
                self.in_progress.response_size = r.wire_size;
            }
            // Set from the response only when there was no query.
            if !ex.query_opcode && qs.query_opcode.is_none() {
                qs.query_opcode = Some(r.opcode);
            }
            if !ex.response_rcode {
                qs.response_rcode = Some(u16::from(r.rcode));
            }

            if let Some(edns) = &r.edns {
                if !ex.response_rcode {
                    qs.response_rcode =
                        Some(u16::from(edns.extended_rcode) << 4 | u16::from(r.rcode));
                }
                self.in_progress.qr_flags |= qr_flags::RESPONSE_HAS_OPT;
            }

            if r.qdcount == 0 {
                self.in_progress.qr_flags |= qr_flags::RESPONSE_HAS_NO_QUESTION;
            }
        }

        if let (Some(q), Some(r)) = (qr.query(), qr.response()) {
            if !ex.response_delay {
                self.in_progress.response_delay = Some(r.timestamp - q.timestamp);
            }
        }

        if !ex.qr_flags {
            qs.qr_flags = Some(self.in_progress.qr_flags);
        }
        if !ex.qr_signature {
            self.in_progress.signature = Some(self.data.add_query_response_signature(qs));
        }
        Ok(())
    }

    /// Create or select the query side's extended info.
    pub fn start_extended_query_group(&mut self) {
        if self.in_progress.query_extra_info.is_none() {
            self.in_progress.query_extra_info = Some(QueryResponseExtraInfo::default());
        }
        self.ext_side = Some(ExtendedSide::Query);
    }

    /// Create or select the response side's extended info.
    pub fn start_extended_response_group(&mut self) {
        if self.in_progress.response_extra_info.is_none() {
            self.in_progress.response_extra_info = Some(QueryResponseExtraInfo::default());
        }
        self.ext_side = Some(ExtendedSide::Response);
    }

    pub fn start_answers_section(&mut self) {
        self.rr_section = Some(RrSection::Answers);
    }

    pub fn start_authority_section(&mut self) {
        self.rr_section = Some(RrSection::Authority);
    }

    pub fn start_additional_section(&mut self) {
        self.rr_section = Some(RrSection::Additional);
    }

    /// Intern a question into the block and stage it for the active
    /// extended group.
    pub fn write_question_record(&mut self, question: &QuestionData) -> Result<()> {
        if self.ext_side.is_none() {
            return Err(CdnsError::Invariant(
                "question record outside extended group".into(),
            ));
        }
        let mut q = Question::default();
        if !self.config.exclude_hints.query_name {
            q.qname = Some(self.data.add_name_rdata(question.name.clone()));
        }
        if !self.config.exclude_hints.query_class_type {
            q.classtype = Some(self.data.add_classtype(ClassType {
                qtype: question.qtype,
                qclass: question.qclass,
            }));
        }
        let idx = self.data.add_question(q);
        self.ext_questions.push(idx);
        Ok(())
    }

    /// Intern a resource record into the block and stage it for the
    /// active section.
    pub fn write_resource_record(&mut self, resource: &RrData) -> Result<()> {
        let Some(section) = self.rr_section else {
            return Err(CdnsError::Invariant(
                "resource record outside an RR section".into(),
            ));
        };
        let mut rr = ResourceRecord::default();
        if !self.config.exclude_hints.query_name {
            rr.name = Some(self.data.add_name_rdata(resource.name.clone()));
        }
        if !self.config.exclude_hints.query_class_type {
            rr.classtype = Some(self.data.add_classtype(ClassType {
                qtype: resource.rr_type,
                qclass: resource.rr_class,
            }));
        }
        if !self.config.exclude_hints.rr_ttl {
            rr.ttl = Some(resource.ttl);
        }
        if !self.config.exclude_hints.rr_rdata {
            rr.rdata = Some(self.data.add_name_rdata(resource.rdata.clone()));
        }
        let idx = self.data.add_resource_record(rr);
        match section {
            RrSection::Answers => self.ext_answers.push(idx),
            RrSection::Authority => self.ext_authority.push(idx),
            RrSection::Additional => self.ext_additional.push(idx),
        }
        Ok(())
    }

    /// Intern the staged section lists and attach their indices to the
    /// active side's extended info.
    pub fn end_extended_group(&mut self) -> Result<()> {
        let Some(side) = self.ext_side else {
            return Err(CdnsError::Invariant(
                "end_extended_group without an active group".into(),
            ));
        };
        let Some(info) = (match side {
            ExtendedSide::Query => self.in_progress.query_extra_info.as_mut(),
            ExtendedSide::Response => self.in_progress.response_extra_info.as_mut(),
        }) else {
            return Err(CdnsError::Invariant(
                "extended group state lost before end_extended_group".into(),
            ));
        };

        if !self.ext_questions.is_empty() {
            info.questions_list = Some(
                self.data
                    .add_questions_list(std::mem::take(&mut self.ext_questions)),
            );
        }
        if !self.ext_answers.is_empty() {
            info.answers_list = Some(
                self.data
                    .add_rrs_list(std::mem::take(&mut self.ext_answers)),
            );
        }
        if !self.ext_authority.is_empty() {
            info.authority_list = Some(
                self.data
                    .add_rrs_list(std::mem::take(&mut self.ext_authority)),
            );
        }
        if !self.ext_additional.is_empty() {
            info.additional_list = Some(
                self.data
                    .add_rrs_list(std::mem::take(&mut self.ext_additional)),
            );
        }
        self.clear_scratch();
        Ok(())
    }

    /// Count an address event against the current block.
    pub fn write_ae(&mut self, ae: &AddressEvent, stats: &PacketStatistics) {
        if !self.config.exclude_hints.address_events {
            let is_ipv6 = ae.address.is_ipv6();
            let masked =
                mask_address(&ae.address, self.config.address_prefix(true, is_ipv6));
            self.data
                .count_address_event(ae.event_type, ae.code, masked, is_ipv6);
        }
        self.update_block_stats(stats);
    }

    /// Drive the full ingest sequence for one matched pair.
    pub fn write_qr(&mut self, qr: &QueryResponse, stats: &PacketStatistics) -> Result<()> {
        self.check_for_rotation(qr.timestamp())?;
        self.start_record(qr)?;
        self.write_basic(qr, stats)?;

        if let Some(q) = qr.query() {
            if self.config.query_sections != 0 {
                self.start_extended_query_group();
                self.write_extended_sections(q, self.config.query_sections, true)?;
                self.end_extended_group()?;
            }
        }
        if let Some(r) = qr.response() {
            if self.config.response_sections != 0 {
                self.start_extended_response_group();
                self.write_extended_sections(r, self.config.response_sections, false)?;
                self.end_extended_group()?;
            }
        }

        self.end_record(qr)
    }

    /// Flush any open file, finishing with a footer and atomic rename.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut enc) = self.enc.take() {
            if self.live && self.data.end_time.is_none() {
                self.data.end_time = Some(Utc::now());
            }
            self.flush_block(&mut enc)?;
            // File footer: terminate the blocks array.
            enc.write_break()?;
            let sink = enc.into_inner()?;
            sink.finish()?;
        }
        Ok(())
    }

    /// Sections of one message side, filtered by type and staged via the
    /// public ingest calls. The first question is already covered by
    /// `write_basic`; query-side OPT records live in the signature
    /// instead of the additional section.
    fn write_extended_sections(
        &mut self,
        m: &DnsMessage,
        opts: u8,
        is_query: bool,
    ) -> Result<()> {
        if opts & sections::EXTRA_QUESTIONS != 0 {
            for question in m.questions.iter().skip(1) {
                if self.config.rr_type_wanted(question.qtype) {
                    self.write_question_record(question)?;
                }
            }
        }
        if opts & sections::ANSWERS != 0 {
            self.start_answers_section();
            self.write_section_rrs(&m.answers, is_query)?;
        }
        if opts & sections::AUTHORITIES != 0 {
            self.start_authority_section();
            self.write_section_rrs(&m.authority, is_query)?;
        }
        if opts & sections::ADDITIONALS != 0 {
            self.start_additional_section();
            self.write_section_rrs(&m.additional, is_query)?;
        }
        Ok(())
    }

    fn write_section_rrs(&mut self, rrs: &[RrData], is_query: bool) -> Result<()> {
        for rr in rrs {
            if is_query && rr.rr_type == TYPE_OPT {
                continue;
            }
            if self.config.rr_type_wanted(rr.rr_type) {
                self.write_resource_record(rr)?;
            }
        }
        Ok(())
    }

    fn write_file_header(&mut self) -> Result<()> {
        let enc = self.enc.as_mut().expect("file open");

        enc.write_array(3)?;
        enc.write_text(schema::FILE_TYPE_ID)?;

        enc.write_map(4)?;
        enc.write_int(FilePreambleField::MajorFormatVersion.index())?;
        enc.write_uint(schema::MAJOR_FORMAT_VERSION)?;
        enc.write_int(FilePreambleField::MinorFormatVersion.index())?;
        enc.write_uint(schema::MINOR_FORMAT_VERSION)?;
        enc.write_int(FilePreambleField::PrivateVersion.index())?;
        enc.write_uint(schema::PRIVATE_VERSION)?;
        enc.write_int(FilePreambleField::BlockParameters.index())?;
        enc.write_array(1)?;
        self.block_parameters.write_cbor(enc)?;

        // Start of the file blocks array.
        enc.write_array_indefinite()?;
        Ok(())
    }

    /// Serialize the block if it holds anything, then reset it for the
    /// next window.
    fn flush_block(&mut self, enc: &mut CborEncoder<CaptureSink>) -> Result<()> {
        if !self.data.is_empty() {
            self.data.last_packet_statistics = self.last_end_block_statistics;
            self.data.write_cbor(enc)?;
            enc.flush()?;
            debug!(
                items = self.data.query_response_items.len(),
                "flushed C-DNS block"
            );
        }
        self.data.clear();
        self.need_start_block_stats = true;
        Ok(())
    }

    fn update_block_stats(&mut self, stats: &PacketStatistics) {
        if self.need_start_block_stats {
            self.data.start_packet_statistics = self.last_end_block_statistics;
            self.need_start_block_stats = false;
        }
        self.last_end_block_statistics = *stats;
    }

    fn clear_scratch(&mut self) {
        self.ext_questions.clear();
        self.ext_answers.clear();
        self.ext_authority.clear();
        self.ext_additional.clear();
        self.ext_side = None;
        self.rr_section = None;
    }
}

impl Drop for BlockCborWriter {
    fn drop(&mut self) {
        if self.enc.is_some() {
            if let Err(e) = self.close() {
                warn!(error = %e, "error closing C-DNS writer");
            }
        }
    }
}
