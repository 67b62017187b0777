use std::fs::File;
use std::io::{BufRead, BufReader, Split};
use std::path::PathBuf;

use clap::ValueEnum;
use tracing::{debug, error, info, warn};

use crate::config::FileConfig;
use crate::error::{Error, Result};
use crate::parsers::LogFormat;
use crate::record::{LogRecord, Schema};
use crate::resolver::{self, ResolvedFiles};

/// What to do with a line that does not match the log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum MalformedLinePolicy {
    /// Log a warning and continue with the next line.
    #[default]
    Skip,
    /// Log an error and continue with the next file.
    AbortFile,
    /// Yield the error and stop the stream.
    AbortRun,
}

/// One configured log source. Yields a record per accepted line, in file
/// order then line order.
#[derive(Debug, Clone)]
pub struct ApacheLogStream {
    entity: String,
    files: ResolvedFiles,
    format: LogFormat,
    policy: MalformedLinePolicy,
}

impl ApacheLogStream {
    pub fn new(entity: impl Into<String>, files: ResolvedFiles, format: LogFormat) -> Self {
        Self {
            entity: entity.into(),
            files,
            format,
            policy: MalformedLinePolicy::default(),
        }
    }

    /// Resolve the configured path and build a stream over the combined format.
    pub fn discover(config: &FileConfig) -> Result<Self> {
        let files = resolver::resolve_config(config)?;
        Ok(Self::new(&config.entity, files, LogFormat::combined()?))
    }

    pub fn with_policy(mut self, policy: MalformedLinePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.entity
    }

    pub fn files(&self) -> &ResolvedFiles {
        &self.files
    }

    pub fn schema() -> Schema {
        Schema
    }

    /// Lazily read every file. Nothing is opened until the first `next()`.
    pub fn records(&self) -> Records<'_> {
        Records {
            stream: self,
            next_file: 0,
            current: None,
            done: false,
        }
    }
}

impl<'a> IntoIterator for &'a ApacheLogStream {
    type Item = Result<LogRecord>;
    type IntoIter = Records<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.records()
    }
}

struct OpenFile {
    path: PathBuf,
    lines: Split<BufReader<File>>,
    line_no: usize,
    emitted: usize,
    skipped: usize,
}

/// Single-pass iterator over the records of one stream.
pub struct Records<'a> {
    stream: &'a ApacheLogStream,
    next_file: usize,
    current: Option<OpenFile>,
    done: bool,
}

impl Records<'_> {
    fn open_next(&mut self) -> Option<Result<OpenFile>> {
        let entry = self.stream.files.entries().get(self.next_file)?;
        self.next_file += 1;

        let path = entry.path().to_path_buf();
        debug!(entity = %self.stream.entity, file = %path.display(), "opening log file");
        Some(match File::open(&path) {
            Ok(file) => Ok(OpenFile {
                lines: BufReader::new(file).split(b'\n'),
                path,
                line_no: 0,
                emitted: 0,
                skipped: 0,
            }),
            Err(e) => Err(Error::io(path, e)),
        })
    }
}

impl Iterator for Records<'_> {
    type Item = Result<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let file = match &mut self.current {
                Some(file) => file,
                None => match self.open_next()? {
                    Ok(opened) => self.current.insert(opened),
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                },
            };

            let bytes = match file.lines.next() {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    let err = Error::io(file.path.clone(), e);
                    self.current = None;
                    self.done = true;
                    return Some(Err(err));
                }
                None => {
                    info!(
                        entity = %self.stream.entity,
                        file = %file.path.display(),
                        records = file.emitted,
                        skipped = file.skipped,
                        "finished log file"
                    );
                    self.current = None;
                    continue;
                }
            };
            file.line_no += 1;

            let (line, parsed) = match String::from_utf8(bytes) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let parsed = self.stream.format.parse(&line).map_err(|e| e.to_string());
                    (line, parsed)
                }
                Err(e) => {
                    let line = String::from_utf8_lossy(e.as_bytes()).into_owned();
                    (line, Err("invalid UTF-8".to_string()))
                }
            };

            let reason = match parsed {
                Ok(parsed) => {
                    file.emitted += 1;
                    return Some(Ok(parsed.into_record()));
                }
                Err(reason) => reason,
            };
            file.skipped += 1;

            let raw = line.trim_end_matches('\r');
            match self.stream.policy {
                MalformedLinePolicy::Skip => {
                    warn!(
                        entity = %self.stream.entity,
                        file = %file.path.display(),
                        line = file.line_no,
                        raw,
                        %reason,
                        "skipping malformed log line"
                    );
                }
                MalformedLinePolicy::AbortFile => {
                    error!(
                        entity = %self.stream.entity,
                        file = %file.path.display(),
                        line = file.line_no,
                        raw,
                        %reason,
                        "malformed log line, skipping rest of file"
                    );
                    self.current = None;
                }
                MalformedLinePolicy::AbortRun => {
                    let err = Error::MalformedLogLine {
                        file: file.path.clone(),
                        line: raw.to_string(),
                        reason,
                    };
                    self.current = None;
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RECORD_KEYS;
    use std::fs;
    use tempfile::TempDir;

    fn line(host: &str, path: &str) -> String {
        format!(
            r#"{host} - - [10/Oct/2023:13:55:36 -0700] "GET {path} HTTP/1.1" 200 100 "-" "test-agent""#
        )
    }

    const BROKEN: &str =
        r#"10.0.0.9 - - [10/Oct/2023:13:55:36 -0700] "GET /broken HTTP/1.1 200 100 "-" "test-agent""#;

    fn write_log(dir: &TempDir, name: &str, lines: &[String]) {
        fs::write(dir.path().join(name), lines.join("\n") + "\n").unwrap();
    }

    fn stream(dir: &TempDir) -> ApacheLogStream {
        ApacheLogStream::discover(&FileConfig {
            entity: "access".into(),
            path: dir.path().to_path_buf(),
        })
        .unwrap()
    }

    fn hosts(records: Vec<LogRecord>) -> Vec<String> {
        records
            .iter()
            .map(|r| r.get("remote_host").unwrap().to_string())
            .collect()
    }

    #[test]
    fn two_files_in_file_then_line_order() {
        let dir = TempDir::new().unwrap();
        let n = 3;
        let b: Vec<String> = (0..n).map(|i| line(&format!("b{i}"), "/")).collect();
        let a: Vec<String> = (0..n).map(|i| line(&format!("a{i}"), "/")).collect();
        write_log(&dir, "b.log", &b);
        write_log(&dir, "a.log", &a);

        let records: Vec<LogRecord> = stream(&dir).records().collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 2 * n);
        assert_eq!(hosts(records), vec!["a0", "a1", "a2", "b0", "b1", "b2"]);
    }

    #[test]
    fn every_record_has_the_schema_keys() {
        let dir = TempDir::new().unwrap();
        write_log(&dir, "x.log", &[line("h", "/a"), line("h", "/b")]);
        let schema = ApacheLogStream::schema();
        for record in stream(&dir).records() {
            let record = record.unwrap();
            let keys: Vec<&str> = record.iter().map(|(k, _)| k).collect();
            assert_eq!(keys, schema.field_names());
            assert_eq!(keys, RECORD_KEYS);
        }
    }

    #[test]
    fn schema_does_not_depend_on_reading() {
        let dir = TempDir::new().unwrap();
        write_log(&dir, "x.log", &[line("h", "/")]);
        let before = serde_json::to_string(&ApacheLogStream::schema()).unwrap();
        let _ = stream(&dir).records().count();
        let after = serde_json::to_string(&ApacheLogStream::schema()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn malformed_line_is_skipped_by_default() {
        let dir = TempDir::new().unwrap();
        write_log(
            &dir,
            "x.log",
            &[line("first", "/"), BROKEN.to_string(), line("third", "/")],
        );
        let records: Vec<LogRecord> = stream(&dir).records().collect::<Result<_>>().unwrap();
        assert_eq!(hosts(records), vec!["first", "third"]);
    }

    #[test]
    fn abort_file_moves_to_next_file() {
        let dir = TempDir::new().unwrap();
        write_log(
            &dir,
            "a.log",
            &[line("a0", "/"), BROKEN.to_string(), line("a2", "/")],
        );
        write_log(&dir, "b.log", &[line("b0", "/")]);
        let records: Vec<LogRecord> = stream(&dir)
            .with_policy(MalformedLinePolicy::AbortFile)
            .records()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(hosts(records), vec!["a0", "b0"]);
    }

    #[test]
    fn abort_run_yields_error_then_stops() {
        let dir = TempDir::new().unwrap();
        write_log(&dir, "a.log", &[line("a0", "/"), BROKEN.to_string()]);
        write_log(&dir, "b.log", &[line("b0", "/")]);
        let stream = stream(&dir).with_policy(MalformedLinePolicy::AbortRun);
        let mut records = stream.records();

        assert!(records.next().unwrap().is_ok());
        match records.next() {
            Some(Err(Error::MalformedLogLine { file, line, .. })) => {
                assert!(file.ends_with("a.log"));
                assert!(line.contains("/broken"));
            }
            other => panic!("expected MalformedLogLine, got {other:?}"),
        }
        assert!(records.next().is_none());
    }

    #[test]
    fn blank_lines_and_crlf() {
        let dir = TempDir::new().unwrap();
        let content = format!("{}\r\n\r\n   \n{}\r\n", line("one", "/"), line("two", "/"));
        fs::write(dir.path().join("x.log"), content).unwrap();
        let records: Vec<LogRecord> = stream(&dir).records().collect::<Result<_>>().unwrap();
        assert_eq!(hosts(records), vec!["one", "two"]);
    }

    #[test]
    fn early_termination_does_not_touch_later_files() {
        let dir = TempDir::new().unwrap();
        write_log(&dir, "a.log", &[line("a0", "/")]);
        write_log(&dir, "b.log", &[line("b0", "/")]);
        let stream = stream(&dir);
        // b.log disappears after resolution; stopping early must not notice
        fs::remove_file(dir.path().join("b.log")).unwrap();
        let first: Vec<_> = stream.records().take(1).collect();
        assert_eq!(first.len(), 1);
        assert!(first[0].is_ok());

        let all: Vec<_> = stream.records().collect();
        assert!(matches!(all.last(), Some(Err(Error::Io { .. }))));
    }

    #[test]
    fn each_call_rereads_from_start() {
        let dir = TempDir::new().unwrap();
        write_log(&dir, "x.log", &[line("h", "/")]);
        let stream = stream(&dir);
        assert_eq!(stream.records().count(), 1);
        assert_eq!((&stream).into_iter().count(), 1);
    }
}
