//! Analysis job pipeline.
//!
//! This crate provides:
//! - The `AnalysisService` facade: start, status, stop, list and delete
//! - FIFO admission under a concurrency ceiling
//! - Overlapped decoding and batched inference
//! - Result aggregation with monotonic progress
//! - Background sweeping of orphaned temp files

pub mod aggregator;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod scheduler;
pub mod service;
pub mod sweeper;

pub use aggregator::{ResultAggregator, ScoredFrame, RUNNING_PROGRESS_CAP};
pub use config::{PipelineConfig, StopPolicy};
pub use dispatcher::{spawn_producer, BatchDispatcher, FrameBatch};
pub use error::{PipelineError, PipelineResult};
pub use logging::{JobLogger, ANALYSIS_OPERATION};
pub use registry::{FoldOutcome, JobEntry, JobRegistry};
pub use scheduler::{JobScheduler, PipelineContext};
pub use service::AnalysisService;
pub use sweeper::TempSweeper;
