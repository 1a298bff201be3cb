use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use time::{format_description::well_known, OffsetDateTime};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::types::FetchRecord;

/// One journal line: everything collected for a serial number that finished
/// processing, whether or not either call produced data. A serial listed
/// here is never re-attempted by a resumed run.
///
/// `info`/`comment` are `None` when the corresponding call produced no
/// record. (A hypothetical API body of literal JSON `null` is
/// indistinguishable from "no record" after a reload; such a body carries
/// no data either way.)
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JournalEntry {
    pub sn: u64,
    pub ts: String,
    pub info: Option<Value>,
    pub comment: Option<Value>,
}

/// Append-only JSON Lines journal. Each entry is flushed as soon as it is
/// written so a crash loses at most the in-flight serials.
#[derive(Debug)]
pub struct Journal {
    file: File,
}

impl Journal {
    /// Open (creating if needed) a journal for appending. An existing file
    /// is extended, which is what `--resume` relies on.
    pub async fn open_append(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .await
            .with_context(|| format!("failed to open journal: {}", path.as_ref().display()))?;
        Ok(Self { file })
    }

    pub async fn append(&mut self, entry: &JournalEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry).context("failed to encode journal entry")?;
        line.push('\n');
        self.file.write_all(line.as_bytes()).await?;
        self.file.flush().await?;
        Ok(())
    }
}

/// RFC3339 UTC timestamp for journal entries.
pub fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

/// Read a journal back. Unparseable lines are skipped with a warning rather
/// than failing the load: a crash mid-append leaves a truncated last line,
/// and losing one serial to a re-fetch beats refusing to resume.
pub fn load_journal(path: impl AsRef<Path>) -> Result<Vec<JournalEntry>> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read journal: {}", path.as_ref().display()))?;
    let mut entries = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<JournalEntry>(line) {
            Ok(e) => entries.push(e),
            Err(err) => eprintln!(
                "journal: skipping unparseable line {} ({err})",
                idx + 1
            ),
        }
    }
    Ok(entries)
}

/// Serial numbers that already finished in a previous run.
pub fn completed_serials(entries: &[JournalEntry]) -> HashSet<u64> {
    entries.iter().map(|e| e.sn).collect()
}

/// Split journal entries back into the two record collections, preserving
/// journal (completion) order.
pub fn split_records(entries: Vec<JournalEntry>) -> (Vec<FetchRecord>, Vec<FetchRecord>) {
    let mut info = Vec::new();
    let mut comments = Vec::new();
    for e in entries {
        if let Some(v) = e.info {
            info.push(FetchRecord {
                sn: e.sn,
                response: v,
            });
        }
        if let Some(v) = e.comment {
            comments.push(FetchRecord {
                sn: e.sn,
                response: v,
            });
        }
    }
    (info, comments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(sn: u64, info: Option<Value>, comment: Option<Value>) -> JournalEntry {
        JournalEntry {
            sn,
            ts: "2024-11-30T23:43:45Z".to_string(),
            info,
            comment,
        }
    }

    #[test]
    fn completed_serials_collects_all_listed() {
        let entries = vec![
            entry(3, Some(json!({})), None),
            entry(1, None, None),
            entry(2, None, Some(json!([]))),
        ];
        let done = completed_serials(&entries);
        assert_eq!(done, HashSet::from([1, 2, 3]));
    }

    #[test]
    fn split_skips_absent_sides() {
        let entries = vec![
            entry(1, Some(json!({"a": 1})), None),
            entry(2, None, Some(json!({"b": 2}))),
            entry(3, None, None),
        ];
        let (info, comments) = split_records(entries);
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].sn, 1);
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].sn, 2);
    }

    #[test]
    fn now_rfc3339_has_utc_suffix() {
        let ts = now_rfc3339();
        assert!(ts.ends_with('Z'), "unexpected timestamp format: {ts}");
    }
}
