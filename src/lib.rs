//! Extract Apache combined access logs as a stream of flat, all-text records.
//!
//! ```no_run
//! use tap_apachelog::{ApacheLogStream, FileConfig};
//!
//! let stream = ApacheLogStream::discover(&FileConfig {
//!     entity: "access".into(),
//!     path: "/var/log/apache2".into(),
//! })?;
//! for record in stream.records() {
//!     println!("{}", serde_json::to_string(&record?)?);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod normalizer;
pub mod parsers;
pub mod record;
pub mod resolver;
pub mod stream;
pub mod tap;

pub use config::{FileConfig, TapConfig};
pub use error::{Error, Result};
pub use parsers::LogFormat;
pub use record::{LogRecord, RECORD_KEYS, Schema};
pub use resolver::{LogFileEntry, ResolvedFiles};
pub use stream::{ApacheLogStream, MalformedLinePolicy};
pub use tap::{Catalog, Tap};
