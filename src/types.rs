use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One collected record for a serial number: the raw JSON body the vendor
/// API returned, tagged with the serial it was fetched for.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FetchRecord {
    pub sn: u64,
    pub response: Value,
}

/// Aggregate results and progress counters for one scrape run.
///
/// `info` and `comments` are independent: a serial number may appear in one,
/// both, or neither, and append order is completion order, not serial order.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ScrapeResults {
    pub attempted_total: u64,
    pub attempted_done: u64,
    pub info: Vec<FetchRecord>,
    pub comments: Vec<FetchRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_serializes_to_sn_and_response_only() {
        let rec = FetchRecord {
            sn: 42,
            response: json!({"ok": true}),
        };
        let v = serde_json::to_value(&rec).unwrap();
        let obj = v.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(obj["sn"], json!(42));
        assert_eq!(obj["response"], json!({"ok": true}));
    }
}
