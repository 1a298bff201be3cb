use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use water_scrape_rs::checkpoint::{self, Journal};
use water_scrape_rs::fetch::VendorApi;
use water_scrape_rs::output;
use water_scrape_rs::scraper::{self, ScrapeOptions};
use water_scrape_rs::session;

/// water-scrape-rs — bounded-concurrency scraper for water-point metadata and comments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "water-scrape-rs",
    version,
    about = "Bounded-concurrency scraper for water-point metadata and comments.",
    long_about = None
)]
struct Cli {
    /// First serial number to fetch (inclusive).
    #[arg(long, default_value_t = 1)]
    sn_start: u64,

    /// Last serial number to fetch (inclusive).
    #[arg(long, default_value_t = 28500)]
    sn_end: u64,

    /// Max serial numbers processed concurrently.
    #[arg(long, default_value_t = 5)]
    concurrency: usize,

    /// Pause admission after this many completed serials (0 disables).
    #[arg(long, default_value_t = 100)]
    pause_every: u64,

    /// Admission pause duration in seconds.
    #[arg(long, default_value_t = 3)]
    pause_secs: u64,

    /// Per-request timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 10_000)]
    timeout_ms: u64,

    /// Vendor API origin.
    #[arg(long, default_value = "https://water.circuplus.org")]
    base_url: String,

    /// Cookie file holding the pre-authenticated session blob
    /// (one Name=Value per line, or a pasted Cookie header value).
    #[arg(long)]
    cookies: Option<PathBuf>,

    /// Output path for device-info records.
    #[arg(long, default_value = "pt_info.json")]
    info_output: PathBuf,

    /// Output path for comment records.
    #[arg(long, default_value = "comment.json")]
    comment_output: PathBuf,

    /// Append each completed serial to this JSON-lines journal.
    #[arg(long)]
    journal: Option<PathBuf>,

    /// Skip serials already present in the journal (requires --journal).
    #[arg(long, default_value_t = false)]
    resume: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    println!("water-scrape-rs configuration:");
    println!("  range         : {}..={}", cli.sn_start, cli.sn_end);
    println!("  concurrency   : {}", cli.concurrency);
    println!(
        "  pause         : {}s after every {} serials",
        cli.pause_secs, cli.pause_every
    );
    println!("  timeout_ms    : {}", cli.timeout_ms);
    println!("  base_url      : {}", cli.base_url);
    println!(
        "  cookies       : {}",
        cli.cookies
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<none>".to_string())
    );
    println!("  info_output   : {}", cli.info_output.display());
    println!("  comment_output: {}", cli.comment_output.display());
    println!(
        "  journal       : {}",
        cli.journal
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<none>".to_string())
    );
    println!("  resume        : {}", cli.resume);

    let cookie_pairs = match &cli.cookies {
        Some(path) => session::load_cookies_from_path(path)?,
        None => {
            eprintln!("Warning: no --cookies file given; requests go out unauthenticated");
            Vec::new()
        }
    };
    let cookie_header = session::cookie_header_value(&cookie_pairs);

    let api = VendorApi::new(
        &cli.base_url,
        cookie_header,
        Duration::from_millis(cli.timeout_ms),
    )?;

    // Resume: pre-seed the output collections with earlier results and skip
    // those serials. Journal entries outside the configured range (a reused
    // journal with a narrower range) are ignored.
    let mut info_records = Vec::new();
    let mut comment_records = Vec::new();
    let mut skip = HashSet::new();
    if cli.resume {
        let Some(path) = &cli.journal else {
            bail!("--resume requires --journal");
        };
        if path.exists() {
            let mut entries = checkpoint::load_journal(path)?;
            entries.retain(|e| (cli.sn_start..=cli.sn_end).contains(&e.sn));
            skip = checkpoint::completed_serials(&entries);
            println!("resuming: {} serials already completed", skip.len());
            let (info, comments) = checkpoint::split_records(entries);
            info_records = info;
            comment_records = comments;
        } else {
            println!(
                "resuming: journal {} does not exist yet, starting fresh",
                path.display()
            );
        }
    }

    let journal = match &cli.journal {
        Some(path) => Some(Journal::open_append(path).await?),
        None => None,
    };

    let opts = ScrapeOptions {
        sn_start: cli.sn_start,
        sn_end: cli.sn_end,
        concurrency: cli.concurrency,
        pause_every: cli.pause_every,
        pause: Duration::from_secs(cli.pause_secs),
    };

    let cancel = CancellationToken::new();
    let results = scraper::scrape_range_with_journal(&api, &opts, cancel, skip, journal).await?;

    println!(
        "\nFetched {} of {} serials: {} info records, {} comment records",
        results.attempted_done,
        results.attempted_total,
        results.info.len(),
        results.comments.len()
    );

    info_records.extend(results.info);
    comment_records.extend(results.comments);

    output::write_records(&cli.info_output, &info_records)?;
    output::write_records(&cli.comment_output, &comment_records)?;
    println!(
        "All data saved to {} and {}",
        cli.info_output.display(),
        cli.comment_output.display()
    );

    Ok(())
}
