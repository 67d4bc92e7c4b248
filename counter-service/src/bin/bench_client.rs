//! Load generator for the counter service.
//!
//! Keeps a bounded number of `/track` requests in flight, reads `/count` once
//! per second, and prints throughput every 100ms until interrupted.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::{select, sync::Semaphore, time::interval};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the counter service.
    #[arg(long, default_value = "http://localhost:8000")]
    url: String,

    /// Maximum number of unresolved /track requests at once.
    #[arg(long, default_value_t = 100)]
    in_flight: usize,

    /// Query string sent with every /track request.
    #[arg(long, default_value = "count=1&foo=bar")]
    query: String,

    /// Stop after this many seconds instead of waiting for ctrl-c.
    #[arg(long)]
    duration_secs: Option<u64>,
}

#[derive(Default)]
struct Stats {
    sent: AtomicU64,
    received: AtomicU64,
    failed: AtomicU64,
}

impl Stats {
    fn record(&self, ok: bool) {
        let counter = if ok { &self.received } else { &self.failed };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn report(&self, started: Instant) {
        let sent = self.sent.load(Ordering::Relaxed);
        let received = self.received.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);
        println!(
            "{} req/s {} processing {} rejected {} total",
            (received as f64 / elapsed).floor(),
            sent.saturating_sub(received + failed),
            failed,
            received
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = reqwest::Client::new();
    let stats = Arc::new(Stats::default());
    let permits = Arc::new(Semaphore::new(args.in_flight.max(1)));
    let started = Instant::now();

    let track_url = format!("{}/track?{}", args.url.trim_end_matches('/'), args.query);
    let count_url = format!("{}/count", args.url.trim_end_matches('/'));

    let mut report = interval(Duration::from_millis(100));
    let mut count = interval(Duration::from_secs(1));
    let stop = async {
        match args.duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    };
    tokio::pin!(stop);

    loop {
        select! {
            _ = &mut stop => break,
            _ = report.tick() => stats.report(started),
            _ = count.tick() => {
                spawn_request(client.get(&count_url), &stats, None);
            }
            permit = Arc::clone(&permits).acquire_owned() => {
                let permit = permit.context("request limiter closed")?;
                spawn_request(client.post(&track_url), &stats, Some(permit));
            }
        }
    }

    stats.report(started);
    Ok(())
}

fn spawn_request(
    request: reqwest::RequestBuilder,
    stats: &Arc<Stats>,
    permit: Option<tokio::sync::OwnedSemaphorePermit>,
) {
    let stats = Arc::clone(stats);
    stats.sent.fetch_add(1, Ordering::Relaxed);
    tokio::spawn(async move {
        let ok = matches!(request.send().await, Ok(response) if response.status().is_success());
        stats.record(ok);
        drop(permit);
    });
}
