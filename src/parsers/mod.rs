pub mod apache;

pub use apache::{COMBINED_LOG_FORMAT, LineError, LogFormat, LogLine};
