use std::{collections::HashMap, path::Path, path::PathBuf, sync::Arc};

use anyhow::Result;
use config::AgentConfig;
use processing::{recorder::ActivityRecorder, ProcessingModule};
use scanner::{records::ChangeRecord, records::ScanReport, state::DiffStateStore, ScanModule};
use tokio::{select, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::{
    tracker::{
        aggregator::{StaticConfigSource, WorkHourAggregator},
        buckets::BucketStorageImpl,
    },
    utils::clock::{Clock, DefaultClock},
};

pub mod config;
pub mod processing;
pub mod scanner;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Represents the starting point for the agent: a scanning loop feeding an
/// aggregation pipeline until the process is told to stop.
pub async fn start_agent(dir: PathBuf) -> Result<()> {
    let config = AgentConfig::load(&dir.join("config.json"));

    let (sender, receiver) = mpsc::channel::<ChangeRecord>(CHANGE_CHANNEL_CAPACITY);
    let shutdown_token = CancellationToken::new();

    let scanner = create_scanner(&dir, &config, sender, &shutdown_token, DefaultClock)?;
    let processor = create_processor(&dir, &config, receiver)?;

    let (_, scan_result, processing_result) = tokio::join!(
        detect_shutdown(shutdown_token),
        scanner.run(),
        processor.run(),
    );

    if let Err(scan_result) = scan_result {
        error!("Scan module got an error {:?}", scan_result);
    }

    if let Err(processing_result) = processing_result {
        error!("Processing module got an error {:?}", processing_result);
    }

    Ok(())
}

/// Runs a single scan pass and drains the pipeline. Used by the `scan` cli
/// command.
pub async fn scan_once(dir: PathBuf) -> Result<ScanReport> {
    let config = AgentConfig::load(&dir.join("config.json"));

    let (sender, receiver) = mpsc::channel::<ChangeRecord>(CHANGE_CHANNEL_CAPACITY);
    let scanner = create_scanner(
        &dir,
        &config,
        sender,
        &CancellationToken::new(),
        DefaultClock,
    )?;
    let processor = create_processor(&dir, &config, receiver)?;

    let (report, processing_result) = tokio::join!(
        async move {
            let report = scanner.scan_pass().await;
            // Dropping the scanner closes the channel and lets the processor finish.
            drop(scanner);
            report
        },
        processor.run(),
    );

    processing_result?;
    report
}

/// Detects signals sent to the process.
async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            cancelation.cancel();
        },
    };
}

fn create_scanner(
    dir: &Path,
    config: &AgentConfig,
    sender: mpsc::Sender<ChangeRecord>,
    shutdown_token: &CancellationToken,
    clock: impl Clock,
) -> Result<ScanModule> {
    Ok(ScanModule::new(
        sender,
        DiffStateStore::new(&dir.join("state"))?,
        config.watch_roots.clone(),
        config.exclude_patterns.clone(),
        config.poll_interval(),
        shutdown_token.clone(),
        Box::new(clock),
    ))
}

fn create_processor(
    dir: &Path,
    config: &AgentConfig,
    receiver: mpsc::Receiver<ChangeRecord>,
) -> Result<ProcessingModule<ActivityRecorder<BucketStorageImpl>>> {
    let storage = BucketStorageImpl::new(dir.join("buckets"))?;
    let configs = StaticConfigSource::new(HashMap::from([(
        config.user_id.clone(),
        config.work_time.clone(),
    )]));
    let aggregator = WorkHourAggregator::new(storage, Box::new(configs));
    let recorder = ActivityRecorder::new(aggregator, Arc::from(config.user_id.as_str()));
    Ok(ProcessingModule::new(receiver, recorder))
}
