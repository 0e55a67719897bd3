//! streamtally ingest library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Snapshots the viewer counts of live broadcasts on a set of channels and
//! appends them to a warehouse table, one bounded sweep per invocation.
//!
//! # Pipeline
//!
//! - **youtube**: paginated live search and per-video/per-channel lookups
//! - **assembler**: search items to [`models::ViewerSnapshotRow`]s
//! - **staging**: CSV artifact written, uploaded, later deleted
//! - **warehouse**: bulk load job, waited on, then cleanup
//! - **orchestrator**: drives the above channel by channel
//!
//! # Example
//!
//! ```no_run
//! use streamtally_ingest::{config::IngestConfig, orchestrator::SweepOrchestrator, trigger::TriggerEvent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::load("config.json")?;
//!     let orchestrator = SweepOrchestrator::from_config(&config)?;
//!     let event = TriggerEvent::local(&config.channels())?;
//!     let report = orchestrator.handle_event(&event).await?;
//!     tracing::info!(loaded = report.loaded(), "Sweep finished");
//!     Ok(())
//! }
//! ```

pub mod assembler;
pub mod config;
pub mod models;
pub mod orchestrator;
pub mod staging;
pub mod trigger;
pub mod warehouse;
pub mod youtube;
