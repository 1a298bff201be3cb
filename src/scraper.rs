use crate::checkpoint::{self, Journal, JournalEntry};
use crate::fetch::VendorApi;
use crate::types::{FetchRecord, ScrapeResults};
use anyhow::{bail, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;

/// Knobs for one scrape run. Every value that was a hardcoded literal in
/// the vendor's own tooling is explicit here.
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    /// First serial number, inclusive.
    pub sn_start: u64,
    /// Last serial number, inclusive.
    pub sn_end: u64,
    /// Maximum serial numbers in flight at once.
    pub concurrency: usize,
    /// Pause admission after this many completed serials. 0 disables the throttle.
    pub pause_every: u64,
    /// How long to hold back admission at each throttle point.
    pub pause: Duration,
}

impl ScrapeOptions {
    pub fn validate(&self) -> Result<()> {
        if self.sn_start > self.sn_end {
            bail!(
                "invalid serial range: {} > {}",
                self.sn_start,
                self.sn_end
            );
        }
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        Ok(())
    }
}

/// Walk the serial range and fetch device info + comments for each serial,
/// with a concurrency limit and periodic admission pauses.
///
/// - Limits in-flight serials using a `Semaphore`; the permit is held until
///   both calls for that serial finish.
/// - Serials are admitted in increasing order, but completion (and thus
///   record append) order depends on network latency.
/// - Per-call failures are contained in [`crate::fetch::FetchOutcome`]; one
///   bad serial never stops the batch.
pub async fn scrape_range(api: &VendorApi, opts: &ScrapeOptions) -> Result<ScrapeResults> {
    scrape_internal(api, opts, None, HashSet::new(), None).await
}

/// Variant that accepts a `CancellationToken`: cancellation stops admitting
/// new serials, already-admitted serials drain normally.
pub async fn scrape_range_with_cancel(
    api: &VendorApi,
    opts: &ScrapeOptions,
    cancel: CancellationToken,
) -> Result<ScrapeResults> {
    scrape_internal(api, opts, Some(cancel), HashSet::new(), None).await
}

/// Full variant: `skip` holds serials already completed by a previous run
/// (they are not re-attempted and do not count toward the throttle), and
/// each completed serial is appended to `journal` when one is given.
pub async fn scrape_range_with_journal(
    api: &VendorApi,
    opts: &ScrapeOptions,
    cancel: CancellationToken,
    skip: HashSet<u64>,
    journal: Option<Journal>,
) -> Result<ScrapeResults> {
    scrape_internal(api, opts, Some(cancel), skip, journal).await
}

async fn scrape_internal(
    api: &VendorApi,
    opts: &ScrapeOptions,
    cancel_opt: Option<CancellationToken>,
    skip: HashSet<u64>,
    journal_opt: Option<Journal>,
) -> Result<ScrapeResults> {
    opts.validate()?;

    let range_len = opts.sn_end - opts.sn_start + 1;
    let skipped = skip
        .iter()
        .filter(|sn| (opts.sn_start..=opts.sn_end).contains(*sn))
        .count() as u64;
    let attempted_total = range_len - skipped;

    let attempted_done = Arc::new(AtomicU64::new(0));
    let info = Arc::new(Mutex::new(Vec::<FetchRecord>::new()));
    let comments = Arc::new(Mutex::new(Vec::<FetchRecord>::new()));
    let journal = journal_opt.map(|j| Arc::new(Mutex::new(j)));

    let sem = Arc::new(Semaphore::new(opts.concurrency.clamp(1, 1_000)));
    let mut set = JoinSet::new();
    let cancel = cancel_opt.unwrap_or_default();

    // Ctrl-C stops admission; in-flight serials drain before the flush.
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_ctrlc.cancel();
        }
    });

    let mut paused_batches = 0u64;
    for sn in opts.sn_start..=opts.sn_end {
        if cancel.is_cancelled() {
            eprintln!("cancelled, stopping admission at sn {sn}");
            break;
        }
        if skip.contains(&sn) {
            continue;
        }

        // Throttle: once another pause_every completions have landed, hold
        // back the next admission. In-flight serials are unaffected.
        if opts.pause_every > 0 {
            let done = attempted_done.load(Ordering::Relaxed);
            let batches = done / opts.pause_every;
            if batches > paused_batches {
                paused_batches = batches;
                println!("completed {done} serials, pausing {:?}", opts.pause);
                time::sleep(opts.pause).await;
            }
        }

        let permit = sem
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore in scope");
        let api = api.clone();
        let info = info.clone();
        let comments = comments.clone();
        let attempted_done = attempted_done.clone();
        let journal = journal.clone();

        set.spawn(async move {
            let _permit = permit; // keep permit until both calls complete

            let outcome = api.point_info(sn).await;
            outcome.log("GET", sn);
            let info_value = outcome.into_success();
            if let Some(v) = &info_value {
                let mut guard = info.lock().await;
                guard.push(FetchRecord {
                    sn,
                    response: v.clone(),
                });
            }

            let outcome = api.comments(sn).await;
            outcome.log("POST", sn);
            let comment_value = outcome.into_success();
            if let Some(v) = &comment_value {
                let mut guard = comments.lock().await;
                guard.push(FetchRecord {
                    sn,
                    response: v.clone(),
                });
            }

            if let Some(journal) = &journal {
                let entry = JournalEntry {
                    sn,
                    ts: checkpoint::now_rfc3339(),
                    info: info_value,
                    comment: comment_value,
                };
                let mut guard = journal.lock().await;
                if let Err(e) = guard.append(&entry).await {
                    eprintln!("journal append failed for sn {sn}: {e}");
                }
            }

            attempted_done.fetch_add(1, Ordering::Relaxed);
        });
    }

    while let Some(_res) = set.join_next().await {}

    let info = match Arc::try_unwrap(info) {
        Ok(m) => m.into_inner(),
        Err(arc) => arc.lock().await.clone(),
    };
    let comments = match Arc::try_unwrap(comments) {
        Ok(m) => m.into_inner(),
        Err(arc) => arc.lock().await.clone(),
    };

    Ok(ScrapeResults {
        attempted_total,
        attempted_done: attempted_done.load(Ordering::Relaxed),
        info,
        comments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_inverted_range() {
        let opts = ScrapeOptions {
            sn_start: 10,
            sn_end: 9,
            concurrency: 5,
            pause_every: 100,
            pause: Duration::from_secs(3),
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let opts = ScrapeOptions {
            sn_start: 1,
            sn_end: 1,
            concurrency: 0,
            pause_every: 100,
            pause: Duration::from_secs(3),
        };
        assert!(opts.validate().is_err());
    }
}
