use serde::ser::{Serialize, SerializeMap, Serializer};

/// Field names of a combined-log record, in emission order.
pub const RECORD_KEYS: [&str; FIELD_COUNT] = [
    "remote_host",
    "remote_logname",
    "remote_user",
    "timestamp",
    "request_line",
    "final_status",
    "bytes_sent",
    "referer",
    "user_agent",
];

pub const FIELD_COUNT: usize = 9;

/// One parsed log line. Keys are always `RECORD_KEYS`, in order; values are text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    values: [String; FIELD_COUNT],
}

impl LogRecord {
    /// Zip a parsed field list with `RECORD_KEYS`.
    pub fn from_fields(values: [String; FIELD_COUNT]) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        RECORD_KEYS
            .iter()
            .position(|k| *k == key)
            .map(|i| self.values[i].as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        RECORD_KEYS
            .iter()
            .copied()
            .zip(self.values.iter().map(String::as_str))
    }

    pub fn values(&self) -> &[String; FIELD_COUNT] {
        &self.values
    }
}

impl Serialize for LogRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FIELD_COUNT))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Static JSON schema of a `LogRecord`: every field is a string.
///
/// Built from constants only, so it is identical for every stream and never
/// depends on file content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Schema;

impl Schema {
    pub fn field_names(&self) -> &'static [&'static str] {
        &RECORD_KEYS
    }
}

struct StringProperty;

impl Serialize for StringProperty {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("type", &["string"])?;
        map.end()
    }
}

struct Properties;

impl Serialize for Properties {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FIELD_COUNT))?;
        for key in RECORD_KEYS {
            map.serialize_entry(key, &StringProperty)?;
        }
        map.end()
    }
}

impl Serialize for Schema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("type", "object")?;
        map.serialize_entry("properties", &Properties)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LogRecord {
        LogRecord::from_fields(RECORD_KEYS.map(|k| format!("v_{k}")))
    }

    #[test]
    fn record_serializes_in_key_order() {
        let json = serde_json::to_string(&sample()).unwrap();
        let mut last = 0;
        for key in RECORD_KEYS {
            let at = json.find(&format!("\"{key}\"")).unwrap();
            assert!(at >= last, "{key} out of order in {json}");
            last = at;
        }
    }

    #[test]
    fn get_by_name() {
        let r = sample();
        assert_eq!(r.get("referer"), Some("v_referer"));
        assert_eq!(r.get("nope"), None);
        assert_eq!(r.iter().count(), FIELD_COUNT);
    }

    #[test]
    fn schema_is_all_strings() {
        let schema = serde_json::to_value(Schema).unwrap();
        let props = schema["properties"].as_object().unwrap();
        assert_eq!(props.len(), FIELD_COUNT);
        for key in RECORD_KEYS {
            assert_eq!(props[key]["type"], serde_json::json!(["string"]));
        }
        let text = serde_json::to_string(&Schema).unwrap();
        assert!(text.find("remote_host").unwrap() < text.find("user_agent").unwrap());
    }
}
