//! concord-tail - follow the log of a Concord process from the terminal
//!
//! Prints the tail of a process (or segment) log and keeps printing new
//! output until the process reaches a final status or Ctrl-C is pressed.

use anyhow::{bail, Context, Result};
use clap::Parser;
use concord_client::{
    pagination::DEFAULT_LIMIT, ClientConfig, ConcordClient, HttpClient, InstanceId, Pagination,
    SegmentFilter, SegmentId, ThrottledClient,
};
use concord_config::AppConfig;
use concord_log_tail::{follow, LogReader, LogTarget, ReaderOptions, RefreshOutcome};
use log::{debug, info, warn};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

mod logger;

#[derive(Debug, Parser)]
#[command(name = "concord-tail")]
#[command(about = "Follow the log of a Concord process")]
struct Args {
    /// Process instance ID
    instance_id: String,

    /// Follow a single log segment instead of the whole log
    #[arg(long)]
    segment: Option<SegmentId>,

    /// Start from the beginning of the log instead of its tail
    #[arg(long)]
    whole: bool,

    /// Print what is there and exit
    #[arg(long)]
    once: bool,

    /// Delay between two polls (default from config: 5000)
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Concord server URL
    #[arg(long, env = "CONCORD_SERVER_URL")]
    server: Option<String>,

    /// List the log segments of the process instead of printing the log
    #[arg(long, conflicts_with_all = ["segment", "whole", "once", "interval_ms"])]
    list_segments: bool,

    /// First segment to list
    #[arg(long, default_value_t = 0, requires = "list_segments")]
    offset: u32,

    /// Number of segments to list
    #[arg(long, default_value_t = DEFAULT_LIMIT, requires = "list_segments")]
    limit: u32,

    /// Fold child segments into their parents
    #[arg(long, requires = "list_segments", conflicts_with = "parent")]
    collapsed: bool,

    /// List only the children of this segment
    #[arg(long, requires = "list_segments")]
    parent: Option<SegmentId>,
}

impl Args {
    fn target(&self) -> LogTarget {
        let instance_id = InstanceId::new(self.instance_id.as_str());
        match self.segment {
            Some(segment_id) => LogTarget::Segment {
                instance_id,
                segment_id,
            },
            None => LogTarget::Process(instance_id),
        }
    }

    fn segment_filter(&self) -> SegmentFilter {
        SegmentFilter {
            collapsed: self.collapsed,
            parent_id: self.parent,
        }
    }

    fn apply_to(&self, config: &mut AppConfig) {
        if let Some(server) = &self.server {
            config.server_url = server.clone();
        }
        if let Some(interval_ms) = self.interval_ms {
            config.poll_interval_ms = interval_ms;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logger::init();

    // Load .env file if no API key is set
    if std::env::var("CONCORD_API_KEY").is_err() {
        match dotenvy::dotenv() {
            Ok(path) => debug!("Loaded .env file from: {:?}", path),
            Err(_) => debug!(".env file not found, will rely on environment variables"),
        }
    }

    let mut config = AppConfig::load();
    args.apply_to(&mut config);

    let http = HttpClient::new(&ClientConfig::from_app_config(&config))
        .context("Failed to create Concord client")?;
    let client = Arc::new(ThrottledClient::new(
        http,
        config.throttle_window().unwrap_or_default(),
    ));

    if args.list_segments {
        let instance_id = InstanceId::new(args.instance_id.as_str());
        let page = Pagination::with_offset(args.offset, args.limit);
        return list_segments(client.as_ref(), &instance_id, page, args.segment_filter()).await;
    }

    let reader = LogReader::with_options(
        client,
        args.target(),
        ReaderOptions {
            tail_bytes: config.tail_bytes,
            request_timeout: config.request_timeout(),
        },
    );

    tail(reader, &args, config.poll_interval()).await
}

async fn tail<C: ConcordClient + 'static>(
    reader: LogReader<C>,
    args: &Args,
    interval: Duration,
) -> Result<()> {
    let first = if args.whole {
        reader.load_whole().await
    } else {
        reader.refresh(true).await
    }
    .context("Failed to fetch the process log")?;
    print_chunk(&first);

    if reader.should_offer_full_load() {
        info!("Showing the end of the log only, use --whole to see all of it");
    }

    if args.once || !first.keep_polling() {
        info!("Process is {}", first.status);
        return Ok(());
    }

    info!("Following log of {} (process is {})", args.instance_id, first.status);
    let poller = follow(reader.clone(), interval, print_chunk);

    tokio::select! {
        _ = poller.finished() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            poller.stop();
        }
    }

    if let Some(error) = poller.last_error() {
        if error.is_protocol_violation() {
            bail!("Stopped following the log: {}", error);
        }
        warn!("Last refresh failed: {}", error);
    }

    if let Some(status) = reader.state().status {
        info!("Process is {}", status);
    }
    Ok(())
}

async fn list_segments<C: ConcordClient>(
    client: &C,
    instance_id: &InstanceId,
    page: Pagination,
    filter: SegmentFilter,
) -> Result<()> {
    let segments = client
        .list_log_segments(instance_id, page, filter)
        .await
        .context("Failed to list log segments")?;

    let mut stdout = std::io::stdout().lock();
    for segment in &segments.items {
        let status = segment
            .status
            .map(|s| format!("{:?}", s).to_uppercase())
            .unwrap_or_default();
        writeln!(
            stdout,
            "{:>8}  {:<10}  {}  {}",
            segment.id,
            status,
            segment.created_at.format("%Y-%m-%d %H:%M:%S"),
            segment.name
        )?;
    }

    if segments.next {
        let mut next = page;
        next.next();
        info!("More segments available, use --offset {}", next.offset());
    }
    Ok(())
}

fn print_chunk(outcome: &RefreshOutcome) {
    if let Some(text) = &outcome.appended {
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = stdout.write_all(text.as_bytes()).and_then(|_| stdout.flush()) {
            warn!("Failed to write log output: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follow_args() {
        let args = Args::try_parse_from([
            "concord-tail",
            "abc",
            "--segment",
            "7",
            "--interval-ms",
            "1000",
        ])
        .unwrap();

        assert_eq!(
            args.target(),
            LogTarget::Segment {
                instance_id: InstanceId::new("abc"),
                segment_id: 7,
            }
        );

        let mut config = AppConfig::default();
        args.apply_to(&mut config);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_list_segments_args() {
        let args =
            Args::try_parse_from(["concord-tail", "abc", "--list-segments", "--offset", "50"])
                .unwrap();
        assert!(args.list_segments);
        assert_eq!(args.offset, 50);
        assert_eq!(args.limit, DEFAULT_LIMIT);

        assert!(
            Args::try_parse_from(["concord-tail", "abc", "--list-segments", "--whole"]).is_err()
        );
        assert!(Args::try_parse_from(["concord-tail", "abc", "--offset", "10"]).is_err());
    }

    #[test]
    fn test_list_segments_filter_args() {
        let args = Args::try_parse_from(["concord-tail", "abc", "--list-segments", "--collapsed"])
            .unwrap();
        assert_eq!(args.segment_filter(), SegmentFilter::collapsed());

        let args =
            Args::try_parse_from(["concord-tail", "abc", "--list-segments", "--parent", "12"])
                .unwrap();
        assert_eq!(args.segment_filter(), SegmentFilter::children_of(12));

        let args = Args::try_parse_from(["concord-tail", "abc", "--list-segments"]).unwrap();
        assert_eq!(args.segment_filter(), SegmentFilter::default());

        assert!(Args::try_parse_from([
            "concord-tail",
            "abc",
            "--list-segments",
            "--collapsed",
            "--parent",
            "12"
        ])
        .is_err());
        assert!(Args::try_parse_from(["concord-tail", "abc", "--parent", "12"]).is_err());
    }
}
