//! Hive-style partition directory encoding
//!
//! Partitioned tables lay data out as `<location>/<k1>=<v1>/<k2>=<v2>/<file>`,
//! one directory level per partition key in declared order. Null and empty
//! values use the Hive default partition name.

use crate::Result;

use object_store::path::Path;

/// Directory value used for null or empty partition values
pub const DEFAULT_PARTITION_NAME: &str = "__HIVE_DEFAULT_PARTITION__";

fn needs_escape(c: char) -> bool {
    matches!(
        c,
        '\u{01}'..='\u{1F}'
            | '"'
            | '#'
            | '%'
            | '\''
            | '*'
            | '/'
            | ':'
            | '='
            | '?'
            | '\\'
            | '\u{7F}'
            | '{'
            | '['
            | ']'
            | '^'
    )
}

/// Percent-escape characters that cannot appear in a partition directory name
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if needs_escape(c) {
            out.push_str(&format!("%{:02X}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

/// Reverse of [`escape`]. Malformed escapes are kept literally.
pub fn unescape(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            out.push(hex_value(bytes[i + 1]) << 4 | hex_value(bytes[i + 2]));
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        _ => b - b'A' + 10,
    }
}

/// `key=value` directory name for one partition level
pub fn segment(key: &str, value: Option<&str>) -> String {
    let value = match value {
        Some(v) if !v.is_empty() => escape(v),
        _ => DEFAULT_PARTITION_NAME.to_string(),
    };
    format!("{}={}", escape(key), value)
}

/// Split a `key=value` directory name. Returns `None` if it is not one.
pub fn parse_segment(segment: &str) -> Option<(String, Option<String>)> {
    let (key, value) = segment.split_once('=')?;
    if key.is_empty() {
        return None;
    }
    let value = if value == DEFAULT_PARTITION_NAME {
        None
    } else {
        Some(unescape(value))
    };
    Some((unescape(key), value))
}

/// Directory of one partition under `prefix`
pub fn partition_dir(prefix: &Path, keys: &[String], values: &[Option<String>]) -> Result<Path> {
    let mut raw = prefix.as_ref().to_string();
    for (key, value) in keys.iter().zip(values) {
        if !raw.is_empty() {
            raw.push('/');
        }
        raw.push_str(&segment(key, value.as_deref()));
    }
    Ok(Path::parse(raw)?)
}

/// Partition values of a data file, checked against the expected keys.
///
/// `relative` are the path parts below the table location, file name last.
pub fn values_for_file(keys: &[String], relative: &[&str]) -> Option<Vec<Option<String>>> {
    if relative.len() != keys.len() + 1 {
        return None;
    }
    let mut values = Vec::with_capacity(keys.len());
    for (key, part) in keys.iter().zip(relative) {
        let (found_key, value) = parse_segment(part)?;
        if &found_key != key {
            return None;
        }
        values.push(value);
    }
    Some(values)
}
