//! Uploader run loop: scan, intake, render progress, summarize.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use ledger_protocol::UploadStatus;
use ledger_transfer::{ProgressSnapshot, format_bytes, validate_destination_path};
use ledger_upload::{
    HttpSessionClient, ScannedFile, UploadEvent, UploadFile, UploadOrchestrator, join_destination,
    scan_paths,
};
use tokio::sync::mpsc;

use crate::Args;
use crate::config::{self, Config};

/// Outcome counters for the final summary.
#[derive(Debug, Default)]
struct Summary {
    completed: usize,
    cancelled: usize,
    failed: Vec<(String, String)>,
}

impl Summary {
    fn record(&mut self, event: UploadEvent) {
        match event {
            UploadEvent::FileCompleted { file_name, .. } => {
                tracing::debug!(file = %file_name, "completed");
                self.completed += 1;
            }
            UploadEvent::FileFailed {
                file_name, error, ..
            } => self.failed.push((file_name, error)),
            UploadEvent::FileCancelled { .. } => self.cancelled += 1,
            UploadEvent::ListingChanged { .. } => {}
        }
    }
}

/// Uploads everything named on the command line.
pub async fn run(args: Args, config: Config) -> anyhow::Result<()> {
    let token = config::token_from_env();
    if token.is_none() {
        tracing::warn!("{} is not set, uploading without authentication", config::TOKEN_ENV);
    }
    let client = HttpSessionClient::new(&config.server, token.as_deref())?;
    let mut orch = UploadOrchestrator::new(config.upload.clone(), Arc::new(client))?;
    let mut events = orch
        .take_events()
        .ok_or_else(|| anyhow::anyhow!("event receiver already taken"))?;

    let scanned = scan_paths(&args.paths).await?;
    if scanned.is_empty() {
        println!("Nothing to upload.");
        return Ok(());
    }

    let batches = plan_batches(scanned, &config)?;
    let file_count: usize = batches.values().map(Vec::len).sum();
    let total_bytes: u64 = batches.values().flatten().map(UploadFile::size).sum();

    println!(
        "Uploading {file_count} file(s), {} to {}",
        format_bytes(total_bytes),
        config.server
    );

    let started = Instant::now();
    for (destination, files) in batches {
        if let Err(e) = orch.intake(&destination, files) {
            orch.shutdown().await;
            return Err(e).with_context(|| format!("queueing uploads for '{destination}'"));
        }
    }

    let mut summary = Summary::default();
    tokio::select! {
        _ = drive(&orch, &mut events, &mut summary, args.quiet) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, cancelling uploads");
            orch.shutdown().await;
        }
    }
    while let Ok(event) = events.try_recv() {
        summary.record(event);
    }
    if !args.quiet {
        eprintln!();
    }

    print_summary(&summary, &orch.snapshot(), started.elapsed());
    if !summary.failed.is_empty() {
        bail!("{} file(s) failed to upload", summary.failed.len());
    }
    Ok(())
}

/// Groups scanned files by remote directory.
///
/// Every destination is validated up front so a bad directory name fails
/// the run before anything is uploaded.
fn plan_batches(
    scanned: Vec<ScannedFile>,
    config: &Config,
) -> anyhow::Result<BTreeMap<String, Vec<UploadFile>>> {
    let mut batches: BTreeMap<String, Vec<UploadFile>> = BTreeMap::new();
    for mut entry in scanned {
        if let Some(content_type) = &config.content_type {
            entry.file.content_type = content_type.clone();
        }
        let destination = join_destination(&config.destination, &entry.relative_dir);
        validate_destination_path(&destination)
            .with_context(|| format!("cannot upload {}", entry.file.name))?;
        batches.entry(destination).or_default().push(entry.file);
    }
    Ok(batches)
}

/// Renders progress and tallies events until the pipeline is idle.
async fn drive(
    orch: &UploadOrchestrator,
    events: &mut mpsc::Receiver<UploadEvent>,
    summary: &mut Summary,
    quiet: bool,
) {
    let mut feed = orch.subscribe();
    let idle = orch.wait_idle();
    tokio::pin!(idle);

    loop {
        tokio::select! {
            _ = &mut idle => break,
            Some(event) = events.recv() => summary.record(event),
            Ok(()) = feed.changed() => {
                if !quiet {
                    let snapshot = feed.borrow_and_update().clone();
                    render(&snapshot);
                }
            }
        }
    }
}

fn render(snapshot: &ProgressSnapshot) {
    let aggregate = &snapshot.aggregate;
    let active = snapshot
        .files
        .iter()
        .filter(|f| f.status == UploadStatus::Active)
        .count();
    let parts_done: u32 = snapshot.files.iter().map(|f| f.chunks_completed).sum();
    let parts_total: u32 = snapshot.files.iter().map(|f| f.total_chunks).sum();

    let mut stderr = std::io::stderr().lock();
    let _ = write!(
        stderr,
        "\r{:>3}% {}/{} parts, {} / {} at {}/s, {active} active   ",
        aggregate.percent(),
        parts_done,
        parts_total,
        format_bytes(aggregate.uploaded_bytes),
        format_bytes(aggregate.target_bytes),
        format_bytes(aggregate.bytes_per_second as u64),
    );
    let _ = stderr.flush();
}

fn print_summary(summary: &Summary, snapshot: &ProgressSnapshot, elapsed: Duration) {
    println!(
        "Done in {:.1}s: {} completed, {} failed, {} cancelled",
        elapsed.as_secs_f64(),
        summary.completed,
        summary.failed.len(),
        summary.cancelled
    );
    for (name, error) in &summary.failed {
        println!("  failed: {name}: {error}");
    }

    let stuck = snapshot
        .files
        .iter()
        .filter(|f| f.status.is_active())
        .count();
    if stuck > 0 {
        println!("  {stuck} file(s) did not finish");
    }
}
