//! Call-control wire protocol: commands, reports and URI handling

pub mod opcode;
pub mod records;
pub mod uri;

pub use opcode::{Command, Opcode, ParseError, ResultCode};
pub use records::{status_report, terminate_report, uri_record, ReportWriter};
pub use uri::{scheme_in_list, uri_scheme, valid_uri, MIN_URI_LEN};
