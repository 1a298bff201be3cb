use anyhow::{Context, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE, USER_AGENT};
use serde_json::Value;
use std::time::Duration;

/// Boundary token the vendor's web frontend uses; the API rejects bodies
/// whose `Content-Type` boundary does not match the encoded parts.
pub const MULTIPART_BOUNDARY: &str = "WebKitFormBoundaryFY6KgfarKVSxikGN";

const API_PATH: &str = "/app_v3/api/_points.aspx";
const UA_VALUE: &str = "Mozilla/5.0";
const ACCEPT_VALUE: &str = "application/json, text/javascript, */*; q=0.01";

/// Outcome of a single API call. Every failure mode is contained here so
/// one bad serial number can never abort the batch.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// HTTP 200 with a JSON-parseable body; the only path that records data.
    Success(Value),
    /// Any status other than 200.
    BadStatus(u16),
    /// HTTP 200 whose body failed to parse as JSON.
    NotJson { body: String, error: String },
    /// DNS/connect/timeout/read failure before a usable response existed.
    Transport(String),
}

impl FetchOutcome {
    /// Emit the per-call progress line: successes to stdout, failures to
    /// stderr, always tagged with the call kind and serial number.
    pub fn log(&self, call: &str, sn: u64) {
        match self {
            FetchOutcome::Success(_) => println!("{call} {sn} ok"),
            FetchOutcome::BadStatus(code) => eprintln!("{call} {sn} failed with status {code}"),
            FetchOutcome::NotJson { body, error } => {
                eprintln!("{call} {sn} body is not JSON: {body:?} ({error})")
            }
            FetchOutcome::Transport(error) => eprintln!("{call} {sn} request error: {error}"),
        }
    }

    pub fn into_success(self) -> Option<Value> {
        match self {
            FetchOutcome::Success(v) => Some(v),
            _ => None,
        }
    }
}

/// Client for the vendor's points API. Holds one pooled `reqwest::Client`
/// shared across all requests and the pre-authenticated cookie header.
#[derive(Debug, Clone)]
pub struct VendorApi {
    client: reqwest::Client,
    base_url: String,
    cookie_header: String,
}

impl VendorApi {
    pub fn new(base_url: &str, cookie_header: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cookie_header,
        })
    }

    /// GET `?fn=pt_info&sn={sn}`, the per-device metadata call.
    pub async fn point_info(&self, sn: u64) -> FetchOutcome {
        let url = format!("{}{}?fn=pt_info&sn={}", self.base_url, API_PATH, sn);
        let mut req = self
            .client
            .get(&url)
            .header(USER_AGENT, UA_VALUE)
            .header(ACCEPT, ACCEPT_VALUE);
        if !self.cookie_header.is_empty() {
            req = req.header(COOKIE, &self.cookie_header);
        }
        outcome_of(req.send().await).await
    }

    /// POST the fixed multipart form for page 1 of the device's comments.
    pub async fn comments(&self, sn: u64) -> FetchOutcome {
        let url = format!("{}{}", self.base_url, API_PATH);
        let mut req = self
            .client
            .post(&url)
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
            )
            .header(USER_AGENT, UA_VALUE)
            .body(comment_form_body(sn));
        if !self.cookie_header.is_empty() {
            req = req.header(COOKIE, &self.cookie_header);
        }
        outcome_of(req.send().await).await
    }
}

/// Apply the shared result policy: 200 + JSON is the only success.
/// The body is read as text first so parse failures can report the raw
/// payload verbatim.
async fn outcome_of(sent: reqwest::Result<reqwest::Response>) -> FetchOutcome {
    let resp = match sent {
        Ok(r) => r,
        Err(e) => return FetchOutcome::Transport(e.to_string()),
    };
    let status = resp.status().as_u16();
    if status != 200 {
        return FetchOutcome::BadStatus(status);
    }
    let text = match resp.text().await {
        Ok(t) => t,
        Err(e) => return FetchOutcome::Transport(e.to_string()),
    };
    match serde_json::from_str::<Value>(&text) {
        Ok(v) => FetchOutcome::Success(v),
        Err(e) => FetchOutcome::NotJson {
            body: text,
            error: e.to_string(),
        },
    }
}

/// Encode the three-field comment form (`fn=comment`, `page=1`, `sisn={sn}`)
/// with the fixed boundary, byte-for-byte what the vendor frontend sends.
pub fn comment_form_body(sn: u64) -> String {
    format!(
        "--{b}\r\n\
         Content-Disposition: form-data; name=\"fn\"\r\n\r\n\
         comment\r\n\
         --{b}\r\n\
         Content-Disposition: form-data; name=\"page\"\r\n\r\n\
         1\r\n\
         --{b}\r\n\
         Content-Disposition: form-data; name=\"sisn\"\r\n\r\n\
         {sn}\r\n\
         --{b}--",
        b = MULTIPART_BOUNDARY
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_body_matches_vendor_encoding() {
        let body = comment_form_body(316279);
        let expected = "--WebKitFormBoundaryFY6KgfarKVSxikGN\r\n\
             Content-Disposition: form-data; name=\"fn\"\r\n\r\n\
             comment\r\n\
             --WebKitFormBoundaryFY6KgfarKVSxikGN\r\n\
             Content-Disposition: form-data; name=\"page\"\r\n\r\n\
             1\r\n\
             --WebKitFormBoundaryFY6KgfarKVSxikGN\r\n\
             Content-Disposition: form-data; name=\"sisn\"\r\n\r\n\
             316279\r\n\
             --WebKitFormBoundaryFY6KgfarKVSxikGN--";
        assert_eq!(body, expected);
    }

    #[test]
    fn form_body_ends_with_closing_boundary() {
        let body = comment_form_body(1);
        assert!(body.ends_with(&format!("--{MULTIPART_BOUNDARY}--")));
        // The closing delimiter must not be followed by a stray CRLF.
        assert!(!body.ends_with("\r\n"));
    }

    #[test]
    fn into_success_filters_failures() {
        assert!(FetchOutcome::BadStatus(404).into_success().is_none());
        assert!(FetchOutcome::Transport("timeout".into())
            .into_success()
            .is_none());
        let v = FetchOutcome::Success(serde_json::json!([1, 2]))
            .into_success()
            .unwrap();
        assert_eq!(v, serde_json::json!([1, 2]));
    }
}
