use crate::record::{FIELD_COUNT, RECORD_KEYS};

/// Value used for a field the log line did not carry.
pub const ABSENT: &str = "-";

/// Fields Apache logs as `-` when there is nothing to report.
const OPTIONAL_KEYS: [&str; 3] = ["bytes_sent", "referer", "user_agent"];

/// Normalize absence in the optional fields: an empty value becomes `-`, so
/// "no value" has a single spelling in every record.
pub fn normalize(mut values: [String; FIELD_COUNT]) -> [String; FIELD_COUNT] {
    for (key, value) in RECORD_KEYS.iter().zip(values.iter_mut()) {
        if value.is_empty() && OPTIONAL_KEYS.contains(key) {
            *value = ABSENT.to_string();
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_optional_fields_become_dash() {
        let mut values: [String; FIELD_COUNT] = Default::default();
        values[0] = "host".into();
        let out = normalize(values);
        assert_eq!(out[0], "host");
        // remote_logname is not optional: left as-is
        assert_eq!(out[1], "");
        assert_eq!(&out[6..], ["-", "-", "-"]);
    }
}
