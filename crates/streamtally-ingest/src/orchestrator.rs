//! Sweep orchestrator
//!
//! Runs every configured channel through fetch, assemble, stage and load,
//! one after another. An empty fetch or assembly skips the channel before
//! anything is staged. A staging or load failure is logged and recorded for
//! that channel, and the sweep moves on.

use std::sync::Arc;
use streamtally_common::Result;
use tracing::{error, info, info_span, warn, Instrument};

use crate::assembler::SnapshotAssembler;
use crate::config::IngestConfig;
use crate::models::{ChannelTarget, SweepId, TableRef};
use crate::staging::{S3ObjectStore, StagingStore};
use crate::trigger::TriggerEvent;
use crate::warehouse::{BigQueryClient, LoadResult, WarehouseLoader};
use crate::youtube::{VideoPlatform, YouTubeClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Search returned no live videos
    NoLiveVideos,
    /// Every discovered video was malformed
    NoRows,
}

#[derive(Debug)]
pub enum ChannelOutcome {
    Loaded(LoadResult),
    Skipped(SkipReason),
    Failed(String),
}

#[derive(Debug)]
pub struct SweepReport {
    pub sweep: SweepId,
    pub channels: Vec<(ChannelTarget, ChannelOutcome)>,
}

impl SweepReport {
    pub fn loaded(&self) -> usize {
        self.count(|o| matches!(o, ChannelOutcome::Loaded(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ChannelOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ChannelOutcome::Failed(_)))
    }

    pub fn rows_loaded(&self) -> usize {
        self.channels
            .iter()
            .filter_map(|(_, o)| match o {
                ChannelOutcome::Loaded(result) => Some(result.rows),
                _ => None,
            })
            .sum()
    }

    fn count(&self, pred: impl Fn(&ChannelOutcome) -> bool) -> usize {
        self.channels.iter().filter(|(_, o)| pred(o)).count()
    }
}

pub struct SweepOrchestrator {
    platform: Arc<dyn VideoPlatform>,
    assembler: SnapshotAssembler,
    staging: StagingStore,
    loader: WarehouseLoader,
    destination: TableRef,
    channels: Vec<ChannelTarget>,
}

impl SweepOrchestrator {
    pub fn new(
        platform: Arc<dyn VideoPlatform>,
        assembler: SnapshotAssembler,
        staging: StagingStore,
        loader: WarehouseLoader,
        destination: TableRef,
        channels: Vec<ChannelTarget>,
    ) -> Self {
        Self {
            platform,
            assembler,
            staging,
            loader,
            destination,
            channels,
        }
    }

    /// Wire the production clients from configuration
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        let platform: Arc<dyn VideoPlatform> = Arc::new(YouTubeClient::from_config(config)?);
        let store = S3ObjectStore::new(&config.staging, &config.bucket_name)
            .map_err(|e| streamtally_common::TallyError::config(format!("{:#}", e)))?;
        let warehouse = BigQueryClient::from_config(config)?;

        Ok(Self::new(
            platform.clone(),
            SnapshotAssembler::new(platform),
            StagingStore::new(Arc::new(store), &config.scratch_dir),
            WarehouseLoader::from_config(Arc::new(warehouse), config),
            config.destination(),
            config.channels(),
        ))
    }

    /// Decode the start signal and run one sweep.
    ///
    /// An undecodable event is returned as an error and nothing is processed.
    pub async fn handle_event(&self, event: &TriggerEvent) -> Result<SweepReport> {
        let payload = event.decode()?;
        info!("Received event: {}", payload);
        Ok(self.run().await)
    }

    /// One full pass over the channel list
    pub async fn run(&self) -> SweepReport {
        let sweep = SweepId::new();
        info!(sweep = %sweep, channels = self.channels.len(), "Starting sweep");

        let mut outcomes = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let span = info_span!("channel", channel_id = %channel, sweep = %sweep);
            let outcome = self.process_channel(channel, sweep).instrument(span).await;
            outcomes.push((channel.clone(), outcome));
        }

        let report = SweepReport {
            sweep,
            channels: outcomes,
        };
        info!(
            sweep = %sweep,
            loaded = report.loaded(),
            skipped = report.skipped(),
            failed = report.failed(),
            rows = report.rows_loaded(),
            "Sweep complete"
        );
        report
    }

    async fn process_channel(&self, channel: &ChannelTarget, sweep: SweepId) -> ChannelOutcome {
        let videos = self.platform.fetch_live_videos(channel).await;
        if videos.is_empty() {
            info!("No data retrieved for channel ID: {}", channel);
            return ChannelOutcome::Skipped(SkipReason::NoLiveVideos);
        }

        let rows = self.assembler.build_rows(&videos, channel).await;
        if rows.is_empty() {
            warn!("No rows to write for channel ID: {}", channel);
            return ChannelOutcome::Skipped(SkipReason::NoRows);
        }

        let artifact = match self.staging.stage(&rows, channel, sweep).await {
            Ok(artifact) => artifact,
            Err(e) => {
                let message = format!("{:#}", e);
                error!(error = %message, "Staging failed, skipping channel");
                return ChannelOutcome::Failed(message);
            },
        };

        match self.loader.load(&artifact, &self.destination, &self.staging).await {
            Ok(result) => ChannelOutcome::Loaded(result),
            Err(e) => {
                let message = format!("{:#}", e);
                error!(error = %message, key = %artifact.key, "Load failed, skipping channel");
                ChannelOutcome::Failed(message)
            },
        }
    }
}
