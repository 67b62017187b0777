use crate::config::FileConfig;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const LOG_EXTENSION: &str = ".log";

/// An existing file whose name ends in `.log`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LogFileEntry {
    path: PathBuf,
}

impl LogFileEntry {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The files of one stream, resolved once before extraction starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFiles {
    entries: Vec<LogFileEntry>,
}

impl ResolvedFiles {
    pub fn entries(&self) -> &[LogFileEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a ResolvedFiles {
    type Item = &'a LogFileEntry;
    type IntoIter = std::slice::Iter<'a, LogFileEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

pub fn resolve_config(config: &FileConfig) -> Result<ResolvedFiles> {
    resolve(&config.entity, &config.path)
}

/// Resolve a configured file or directory into the `.log` files to read.
///
/// Directory listings are not recursive and are sorted by path.
pub fn resolve(entity: &str, path: &Path) -> Result<ResolvedFiles> {
    if !path.exists() {
        return Err(Error::PathNotFound {
            entity: entity.to_string(),
            path: path.to_path_buf(),
        });
    }

    let candidates = if path.is_dir() {
        let mut listed = Vec::new();
        for entry in fs::read_dir(path).map_err(|e| Error::io(path, e))? {
            let entry = entry.map_err(|e| Error::io(path, e))?;
            listed.push(entry.path());
        }
        listed.sort();
        listed
    } else {
        vec![path.to_path_buf()]
    };

    let entries: Vec<LogFileEntry> = candidates
        .into_iter()
        .filter(|candidate| is_valid_filename(candidate))
        .map(|path| LogFileEntry { path })
        .collect();

    if entries.is_empty() {
        return Err(Error::NoAcceptableFiles {
            entity: entity.to_string(),
            path: path.to_path_buf(),
        });
    }

    debug!(entity, files = entries.len(), "resolved log files");
    Ok(ResolvedFiles { entries })
}

fn is_valid_filename(candidate: &Path) -> bool {
    let has_extension = candidate
        .as_os_str()
        .as_encoded_bytes()
        .ends_with(LOG_EXTENSION.as_bytes());
    if !has_extension {
        warn!(
            file = %candidate.display(),
            "skipping non-log file; provide a log file that ends with '.log', e.g. 'access.log'"
        );
        return false;
    }
    if !candidate.is_file() {
        warn!(file = %candidate.display(), "skipping '.log' entry that is not a regular file");
        return false;
    }
    true
}
