//! Apache access-log parsing.
//!
//! A log format is given the way Apache's `LogFormat` directive declares it,
//! e.g. the combined format:
//! ```text
//! %h %l %u %t "%r" %>s %b "%{Referer}i" "%{User-agent}i"
//! ```
//! and compiled into one anchored regex with a capture group per directive.
//!
//! Example line:
//! ```text
//! 127.0.0.1 - frank [10/Oct/2023:13:55:36 -0700] "GET /apache_pb.gif HTTP/1.0" 200 2326 "http://example.com/start.html" "Mozilla/4.08"
//! ```
use chrono::{DateTime, FixedOffset};
use memchr::memchr;
use regex::Regex;
use thiserror::Error;

use crate::error::{Error, Result};
use crate::normalizer::{self, ABSENT};
use crate::record::{FIELD_COUNT, LogRecord};

/// Apache "combined" log format.
pub const COMBINED_LOG_FORMAT: &str =
    r#"%h %l %u %t "%r" %>s %b "%{Referer}i" "%{User-agent}i""#;

/// `%t` layout, e.g. `10/Oct/2023:13:55:36 -0700`.
pub const REQUEST_TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

const QUOTED_VALUE: &str = r#"((?:[^"\\]|\\.)*)"#;
const BARE_TOKEN: &str = r"(\S+)";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Directive {
    RemoteHost,
    RemoteLogname,
    RemoteUser,
    RequestTime,
    RequestLine,
    Status,
    FinalStatus,
    BytesSent,
    /// `%{Name}i`, name stored lowercased.
    HeaderIn(String),
}

impl Directive {
    fn pattern(&self, quoted: bool) -> &'static str {
        match self {
            Directive::RequestTime => r"\[([^\]]+)\]",
            Directive::Status | Directive::FinalStatus => r"(\d+)",
            Directive::BytesSent => r"(\d+|-)",
            _ if quoted => QUOTED_VALUE,
            _ => BARE_TOKEN,
        }
    }
}

/// Why a single line failed to parse.
#[derive(Error, Debug)]
pub enum LineError {
    #[error("line does not match log format")]
    NoMatch,

    #[error("invalid request time {value:?}: {source}")]
    BadTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// A compiled log format.
#[derive(Debug, Clone)]
pub struct LogFormat {
    regex: Regex,
    directives: Vec<Directive>,
}

impl LogFormat {
    /// The combined format.
    pub fn combined() -> Result<Self> {
        Self::compile(COMBINED_LOG_FORMAT)
    }

    pub fn compile(format: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidFormat {
            format: format.to_string(),
            reason,
        };

        let mut pattern = String::from("^");
        let mut literal = String::new();
        let mut directives = Vec::new();
        let mut chars = format.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }

            let mut final_value = false;
            if chars.peek() == Some(&'>') {
                chars.next();
                final_value = true;
            }

            let mut name = None;
            if chars.peek() == Some(&'{') {
                chars.next();
                let mut buf = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => buf.push(ch),
                        None => return Err(invalid("unterminated '%{'".to_string())),
                    }
                }
                name = Some(buf);
            }

            let code = chars
                .next()
                .ok_or_else(|| invalid("dangling '%' at end of format".to_string()))?;

            let directive = match (code, name, final_value) {
                ('%', None, false) => {
                    literal.push('%');
                    continue;
                }
                ('h', None, _) => Directive::RemoteHost,
                ('l', None, _) => Directive::RemoteLogname,
                ('u', None, _) => Directive::RemoteUser,
                ('t', None, _) => Directive::RequestTime,
                ('r', None, _) => Directive::RequestLine,
                ('s', None, false) => Directive::Status,
                ('s', None, true) => Directive::FinalStatus,
                ('b', None, _) => Directive::BytesSent,
                ('i', Some(header), _) => Directive::HeaderIn(header.to_ascii_lowercase()),
                (other, _, _) => {
                    return Err(invalid(format!("unsupported directive '%{other}'")));
                }
            };

            let quoted = literal.ends_with('"') && chars.peek() == Some(&'"');
            pattern.push_str(&regex::escape(&literal));
            literal.clear();
            pattern.push_str(directive.pattern(quoted));
            directives.push(directive);
        }
        pattern.push_str(&regex::escape(&literal));
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|e| invalid(e.to_string()))?;
        Ok(Self { regex, directives })
    }

    /// Parse one raw line. A trailing line terminator is ignored.
    pub fn parse(&self, line: &str) -> std::result::Result<LogLine, LineError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let caps = self.regex.captures(line).ok_or(LineError::NoMatch)?;

        let mut parsed = LogLine::default();
        for (directive, group) in self.directives.iter().zip(caps.iter().skip(1)) {
            let raw = group.map(|m| m.as_str()).unwrap_or_default();
            match directive {
                Directive::RemoteHost => parsed.remote_host = Some(unescape(raw)),
                Directive::RemoteLogname => parsed.remote_logname = Some(unescape(raw)),
                Directive::RemoteUser => parsed.remote_user = Some(unescape(raw)),
                Directive::RequestTime => {
                    let time = DateTime::parse_from_str(raw, REQUEST_TIME_FORMAT).map_err(
                        |source| LineError::BadTimestamp {
                            value: raw.to_string(),
                            source,
                        },
                    )?;
                    parsed.request_time = Some(time);
                }
                Directive::RequestLine => parsed.request_line = Some(unescape(raw)),
                Directive::Status => parsed.status = Some(raw.to_string()),
                Directive::FinalStatus => parsed.final_status = Some(raw.to_string()),
                Directive::BytesSent => parsed.bytes_sent = Some(raw.to_string()),
                Directive::HeaderIn(name) => {
                    parsed.headers_in.push((name.clone(), unescape(raw)));
                }
            }
        }
        Ok(parsed)
    }
}

/// The directive values of one parsed line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogLine {
    pub remote_host: Option<String>,
    pub remote_logname: Option<String>,
    pub remote_user: Option<String>,
    pub request_time: Option<DateTime<FixedOffset>>,
    pub request_line: Option<String>,
    pub status: Option<String>,
    pub final_status: Option<String>,
    pub bytes_sent: Option<String>,
    headers_in: Vec<(String, String)>,
}

impl LogLine {
    /// Request header value by case-insensitive name.
    pub fn header_in(&self, name: &str) -> Option<&str> {
        self.headers_in
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Field values in `RECORD_KEYS` order.
    pub fn into_fields(self) -> [String; FIELD_COUNT] {
        let referer = self.header_in("referer").map(str::to_string);
        let user_agent = self.header_in("user-agent").map(str::to_string);
        let timestamp = self
            .request_time
            .map(|t| t.format(REQUEST_TIME_FORMAT).to_string());
        let final_status = self.final_status.or(self.status);

        normalizer::normalize(
            [
                self.remote_host,
                self.remote_logname,
                self.remote_user,
                timestamp,
                self.request_line,
                final_status,
                self.bytes_sent,
                referer,
                user_agent,
            ]
            .map(|value| value.unwrap_or_else(|| ABSENT.to_string())),
        )
    }

    pub fn into_record(self) -> LogRecord {
        LogRecord::from_fields(self.into_fields())
    }
}

/// Undo Apache's escaping of logged strings: `\"`, `\\`, `\n`, `\r`, `\t`
/// and `\xhh`. Unknown escapes are kept verbatim.
fn unescape(raw: &str) -> String {
    let bytes = raw.as_bytes();
    if memchr(b'\\', bytes).is_none() {
        return raw.to_string();
    }

    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b != b'\\' || i + 1 >= bytes.len() {
            out.push(b);
            i += 1;
            continue;
        }
        match bytes[i + 1] {
            b'"' => out.push(b'"'),
            b'\\' => out.push(b'\\'),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'x' => match bytes.get(i + 2..i + 4).and_then(hex_byte) {
                Some(decoded) => {
                    out.push(decoded);
                    i += 4;
                    continue;
                }
                None => out.extend_from_slice(b"\\x"),
            },
            other => {
                out.push(b'\\');
                out.push(other);
            }
        }
        i += 2;
    }

    match String::from_utf8(out) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

fn hex_byte(pair: &[u8]) -> Option<u8> {
    if !pair.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let s = std::str::from_utf8(pair).ok()?;
    u8::from_str_radix(s, 16).ok()
}
