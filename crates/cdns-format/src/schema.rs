//! Map-key assignment for C-DNS format 1.0.
//!
//! Every CBOR map in the format keys its fields with small integers. The
//! enums here pin those integers for the `(1, 0, PRIVATE_VERSION)`
//! version triple; implementation-specific fields use negative keys so
//! they can never collide with future standard assignments.

/// File type identifier at the head of every capture.
pub const FILE_TYPE_ID: &str = "C-DNS";

pub const MAJOR_FORMAT_VERSION: u64 = 1;
pub const MINOR_FORMAT_VERSION: u64 = 0;
pub const PRIVATE_VERSION: u64 = 2;

/// Default sub-second tick rate: nanoseconds.
pub const DEFAULT_TICKS_PER_SECOND: u64 = 1_000_000_000;

macro_rules! field_enum {
    ($(#[$doc:meta])* $name:ident { $($variant:ident = $idx:literal),+ $(,)? }) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(i8)]
        pub enum $name {
            $($variant = $idx),+
        }

        impl $name {
            /// Map key for this field.
            #[must_use]
            pub const fn index(self) -> i64 {
                self as i8 as i64
            }
        }
    };
}

field_enum! {
    /// Fields of the file preamble map.
    FilePreambleField {
        MajorFormatVersion = 0,
        MinorFormatVersion = 1,
        PrivateVersion = 2,
        BlockParameters = 3,
    }
}

field_enum! {
    /// Fields of a block-parameters map.
    BlockParametersField {
        StorageParameters = 0,
        CollectionParameters = 1,
    }
}

field_enum! {
    /// Fields of a storage-parameters map.
    StorageParametersField {
        TicksPerSecond = 0,
        MaxBlockItems = 1,
        StorageHints = 2,
        Opcodes = 3,
        RrTypes = 4,
        StorageFlags = 5,
        ClientAddressPrefixIpv4 = 6,
        ClientAddressPrefixIpv6 = 7,
        ServerAddressPrefixIpv4 = 8,
        ServerAddressPrefixIpv6 = 9,
        SamplingMethod = 10,
        AnonymisationMethod = 11,
    }
}

field_enum! {
    /// Fields of a storage-hints map.
    StorageHintsField {
        QueryResponseHints = 0,
        QueryResponseSignatureHints = 1,
        RrHints = 2,
        OtherDataHints = 3,
    }
}

field_enum! {
    /// Fields of a collection-parameters map. The DNS port is an
    /// implementation extension.
    CollectionParametersField {
        QueryTimeout = 0,
        SkewTimeout = 1,
        Snaplen = 2,
        Promisc = 3,
        Interfaces = 4,
        ServerAddresses = 5,
        VlanIds = 6,
        Filter = 7,
        GeneratorId = 8,
        HostId = 9,
        DnsPort = -1,
    }
}

field_enum! {
    /// Top-level sections of a block map.
    BlockField {
        Preamble = 0,
        Statistics = 1,
        Tables = 2,
        Items = 3,
        AddressEventCounts = 4,
    }
}

field_enum! {
    /// Fields of a block preamble. Start and end times are
    /// implementation extensions.
    BlockPreambleField {
        EarliestTime = 0,
        BlockParametersIndex = 1,
        EndTime = -1,
        StartTime = -2,
    }
}

field_enum! {
    /// Fields of a block statistics map. Negative keys are
    /// implementation extensions.
    BlockStatisticsField {
        ProcessedMessages = 0,
        QrDataItems = 1,
        UnmatchedQueries = 2,
        UnmatchedResponses = 3,
        DiscardedOpcode = 4,
        MalformedItems = 5,
        NonDnsPackets = -1,
        OutOfOrderPackets = -2,
        MissingPairs = -3,
        MissingPackets = -4,
        MissingNonDns = -5,
        Packets = -6,
        MissingReceived = -7,
        DiscardedPackets = -8,
        MissingMatcher = -9,
        PcapPackets = -10,
        PcapMissingIf = -11,
        PcapMissingOs = -12,
    }
}

field_enum! {
    /// Sections of the block tables map.
    BlockTablesField {
        IpAddress = 0,
        ClassType = 1,
        NameRdata = 2,
        QueryResponseSignature = 3,
        QuestionList = 4,
        QuestionRr = 5,
        RrList = 6,
        Rr = 7,
    }
}

field_enum! {
    /// Fields of a class/type table entry.
    ClassTypeField {
        Type = 0,
        Class = 1,
    }
}

field_enum! {
    /// Fields of a question table entry.
    QuestionField {
        NameIndex = 0,
        ClassTypeIndex = 1,
    }
}

field_enum! {
    /// Fields of a resource-record table entry.
    RrField {
        NameIndex = 0,
        ClassTypeIndex = 1,
        Ttl = 2,
        RdataIndex = 3,
    }
}

field_enum! {
    /// Fields of a query/response signature table entry.
    QueryResponseSignatureField {
        ServerAddressIndex = 0,
        ServerPort = 1,
        QrTransportFlags = 2,
        QrType = 3,
        QrSigFlags = 4,
        QueryOpcode = 5,
        QrDnsFlags = 6,
        QueryRcode = 7,
        QueryClassTypeIndex = 8,
        QueryQdCount = 9,
        QueryAnCount = 10,
        QueryNsCount = 11,
        QueryArCount = 12,
        QueryEdnsVersion = 13,
        QueryUdpSize = 14,
        QueryOptRdataIndex = 15,
        ResponseRcode = 16,
    }
}

field_enum! {
    /// Fields of a query/response item map.
    QueryResponseField {
        TimeOffset = 0,
        ClientAddressIndex = 1,
        ClientPort = 2,
        TransactionId = 3,
        QrSignatureIndex = 4,
        ClientHoplimit = 5,
        ResponseDelay = 6,
        QueryNameIndex = 7,
        QuerySize = 8,
        ResponseSize = 9,
        ResponseProcessingData = 10,
        QueryExtended = 11,
        ResponseExtended = 12,
    }
}

field_enum! {
    /// Fields of an extended section-info map.
    QueryResponseExtendedField {
        QuestionIndex = 0,
        AnswerIndex = 1,
        AuthorityIndex = 2,
        AdditionalIndex = 3,
    }
}

field_enum! {
    /// Fields of an address-event count entry.
    AddressEventCountField {
        AeType = 0,
        AeCode = 1,
        AeAddressIndex = 2,
        AeTransportFlags = 3,
        AeCount = 4,
    }
}
