//! Interprocess protocol between the query pool and its worker processes.
//!
//! Messages are newline-delimited JSON records with a `type` discriminator.
//! Dates cross the serialization boundary as ISO-8601 strings and are
//! rematerialized as BSON timestamps on the receiving side; the
//! [`bridge`] module owns that symmetric conversion.

mod bridge;
mod dates;
mod error;
mod framing;
mod message;

pub use bridge::bson_to_wire;
pub use bridge::wire_to_bson;
pub use bridge::wire_to_document;
pub use dates::format_wire_date;
pub use dates::is_wire_date;
pub use dates::parse_wire_date;
pub use error::ProtocolError;
pub use error::Result;
pub use framing::read_message;
pub use framing::write_message;
pub use message::Message;
pub use message::QueryMetrics;
pub use message::QueryRequest;
pub use message::QueryResult;
pub use message::WireError;
