use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use std::path::Path;

use crate::types::FetchRecord;

/// Render records as a pretty-printed JSON array with 4-space indentation.
/// serde_json leaves non-ASCII characters unescaped, so the vendor's
/// Chinese-language payloads stay readable in the output files.
pub fn to_pretty_json(records: &[FetchRecord]) -> Result<String> {
    let mut buf = Vec::new();
    let fmt = PrettyFormatter::with_indent(b"    ");
    let mut ser = Serializer::with_formatter(&mut buf, fmt);
    records
        .serialize(&mut ser)
        .context("failed to serialize records")?;
    Ok(String::from_utf8(buf).expect("serde_json output is valid UTF-8"))
}

/// Write one record collection to its output document.
pub fn write_records(path: impl AsRef<Path>, records: &[FetchRecord]) -> Result<()> {
    let json = to_pretty_json(records)?;
    std::fs::write(path.as_ref(), json)
        .with_context(|| format!("failed to write {}", path.as_ref().display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn uses_four_space_indent() {
        let records = vec![FetchRecord {
            sn: 7,
            response: json!({"name": "x"}),
        }];
        let out = to_pretty_json(&records).unwrap();
        assert!(out.starts_with("[\n    {\n        \"sn\": 7,"), "{out}");
    }

    #[test]
    fn non_ascii_stays_literal() {
        let records = vec![FetchRecord {
            sn: 1,
            response: json!({"addr": "臺北市中正區"}),
        }];
        let out = to_pretty_json(&records).unwrap();
        assert!(out.contains("臺北市中正區"));
        assert!(!out.contains("\\u"));
    }

    #[test]
    fn empty_collection_is_empty_array() {
        assert_eq!(to_pretty_json(&[]).unwrap(), "[]");
    }
}
