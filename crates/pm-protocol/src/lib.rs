//! pm Protocol - Wire protocol for daemon communication
//!
//! One command per TCP connection:
//! - the client writes a single shell-quoted command line (`request`)
//! - the daemon answers with one tagged response (`response`) and closes
//!
//! Structured responses carry per-process records (`record`) whose byte
//! layout is the integration contract with the command-line client.

pub mod record;
pub mod request;
pub mod response;

pub use record::{decode_list, decode_records, encode_list, encode_records, ListEntry, Record, RecordKind, Value};
pub use request::{AddRequest, Metric, Request, RequestError, Stream};
pub use response::{DecodeError, Response, Severity, DATA_TAG, STATUS_TAG};
