use serde::Serialize;
use tracing::info;

use crate::config::{FileConfig, TapConfig};
use crate::error::{Error, Result};
use crate::record::Schema;
use crate::stream::{ApacheLogStream, MalformedLinePolicy};

/// All streams of one run, resolved up front so configuration and path
/// errors surface before the first record is emitted.
///
/// A configuration error fails the whole run. A path error only fails its
/// own source: it is kept in `failures` and the other sources still extract.
#[derive(Debug)]
pub struct Tap {
    streams: Vec<ApacheLogStream>,
    failures: Vec<Error>,
}

impl Tap {
    pub fn discover(config: &TapConfig, policy: MalformedLinePolicy) -> Result<Self> {
        let mut streams = Vec::new();
        let mut failures = Vec::new();
        for file_config in config.file_configs()? {
            match ApacheLogStream::discover(&file_config) {
                Ok(stream) => streams.push(stream.with_policy(policy)),
                Err(e) => failures.push(e),
            }
        }

        info!(
            streams = streams.len(),
            failed = failures.len(),
            "discovered streams"
        );
        Ok(Self { streams, failures })
    }

    pub fn streams(&self) -> &[ApacheLogStream] {
        &self.streams
    }

    /// Sources that could not be resolved, in configuration order.
    pub fn failures(&self) -> &[Error] {
        &self.failures
    }
}

#[derive(Debug, Serialize)]
pub struct CatalogEntry {
    pub tap_stream_id: String,
    pub stream: String,
    pub schema: Schema,
    pub key_properties: Vec<String>,
}

/// Stream catalog. Built from configuration alone; no file is touched.
#[derive(Debug, Serialize)]
pub struct Catalog {
    pub streams: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn from_configs(configs: &[FileConfig]) -> Self {
        let streams = configs
            .iter()
            .map(|config| CatalogEntry {
                tap_stream_id: config.entity.clone(),
                stream: config.entity.clone(),
                schema: ApacheLogStream::schema(),
                key_properties: Vec::new(),
            })
            .collect();
        Self { streams }
    }
}
