use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tap_apachelog::{LogRecord, Schema};

/// Singer protocol messages, one JSON object per line.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum Message<'a> {
    Schema {
        stream: &'a str,
        schema: Schema,
        key_properties: [&'a str; 0],
    },
    Record {
        stream: &'a str,
        record: &'a LogRecord,
        time_extracted: DateTime<Utc>,
    },
}

pub enum Writer {
    Singer(Box<dyn Write>),
    JsonlFile(BufWriter<File>),
    CsvFile(BufWriter<File>, bool), // bool tracks if we've written headers
    TsvFile(BufWriter<File>, bool),
}

impl Writer {
    /// Announce a stream before its records.
    pub fn write_schema(&mut self, stream: &str) -> Result<()> {
        match self {
            Writer::Singer(writer) => {
                let message = Message::Schema {
                    stream,
                    schema: Schema,
                    key_properties: [],
                };
                writeln!(writer, "{}", serde_json::to_string(&message)?)?;
            }
            Writer::JsonlFile(_) => {}
            Writer::CsvFile(writer, headers_written) => {
                if !*headers_written {
                    writeln!(writer, "stream,{}", Schema.field_names().join(","))?;
                    *headers_written = true;
                }
            }
            Writer::TsvFile(writer, headers_written) => {
                if !*headers_written {
                    writeln!(writer, "stream\t{}", Schema.field_names().join("\t"))?;
                    *headers_written = true;
                }
            }
        }
        Ok(())
    }

    pub fn write_record(
        &mut self,
        stream: &str,
        record: &LogRecord,
        time_extracted: DateTime<Utc>,
    ) -> Result<()> {
        match self {
            Writer::Singer(writer) => {
                let message = Message::Record {
                    stream,
                    record,
                    time_extracted,
                };
                writeln!(writer, "{}", serde_json::to_string(&message)?)?;
            }
            Writer::JsonlFile(writer) => {
                writeln!(writer, "{}", serde_json::to_string(record)?)?;
            }
            Writer::CsvFile(writer, _) => {
                let row: Vec<String> = std::iter::once(stream)
                    .chain(record.values().iter().map(String::as_str))
                    .map(escape_csv_field)
                    .collect();
                writeln!(writer, "{}", row.join(","))?;
            }
            Writer::TsvFile(writer, _) => {
                let row: Vec<String> = std::iter::once(stream)
                    .chain(record.values().iter().map(String::as_str))
                    .map(escape_tsv_field)
                    .collect();
                writeln!(writer, "{}", row.join("\t"))?;
            }
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        match self {
            Writer::JsonlFile(ref mut writer)
            | Writer::CsvFile(ref mut writer, _)
            | Writer::TsvFile(ref mut writer, _) => {
                writer.flush()?;
            }
            Writer::Singer(ref mut writer) => {
                writer.flush()?;
            }
        }
        Ok(())
    }
}

pub fn create_writer(output_arg: &str) -> Result<Writer> {
    match output_arg {
        "stdout" | "singer" => Ok(Writer::Singer(Box::new(BufWriter::new(io::stdout())))),
        path if path.ends_with(".jsonl") || path.ends_with(".ndjson") => {
            Ok(Writer::JsonlFile(create_file(path)?))
        }
        path if path.ends_with(".csv") => Ok(Writer::CsvFile(create_file(path)?, false)),
        path if path.ends_with(".tsv") => Ok(Writer::TsvFile(create_file(path)?, false)),
        _ => Err(anyhow!(
            "Unknown output: {}. Use 'stdout' or a .jsonl, .ndjson, .csv or .tsv path",
            output_arg
        )),
    }
}

fn create_file(file_path: &str) -> Result<BufWriter<File>> {
    if let Some(parent) = Path::new(file_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(BufWriter::new(File::create(file_path)?))
}

fn escape_csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn escape_tsv_field(field: &str) -> String {
    field
        .replace('\t', " ")
        .replace('\n', " ")
        .replace('\r', " ")
}
