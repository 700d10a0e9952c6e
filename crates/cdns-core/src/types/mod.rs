//! Input data model handed over by the capture and matching layers.

mod event;
mod message;
mod stats;

pub use event::{AddressEvent, AddressEventType};
pub use message::{
    DnsHeaderFlags, DnsMessage, Edns, QueryResponse, QuestionData, RrData, TransactionType,
    TransportType,
};
pub use stats::PacketStatistics;
