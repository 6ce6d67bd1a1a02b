//! Background removal of orphaned source temp files.
//!
//! Files left behind by a crash or a hard kill are deleted once they exceed
//! the configured age. Live jobs delete their own files on exit.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};
use vscan_media::{sweep_stale_temp_files, MediaResult};

use crate::config::PipelineConfig;

/// Periodic temp directory sweeper.
#[derive(Debug, Clone)]
pub struct TempSweeper {
    dir: PathBuf,
    max_age: Duration,
    every: Duration,
}

impl TempSweeper {
    pub fn new(dir: impl Into<PathBuf>, max_age: Duration, every: Duration) -> Self {
        Self {
            dir: dir.into(),
            max_age,
            every,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.temp_dir.clone(),
            config.temp_max_age,
            config.temp_sweep_interval,
        )
    }

    /// Run a single sweep.
    pub async fn run_once(&self) -> MediaResult<usize> {
        let removed = sweep_stale_temp_files(&self.dir, self.max_age).await?;
        if removed > 0 {
            info!(dir = %self.dir.display(), removed, "Removed stale temp files");
        } else {
            debug!(dir = %self.dir.display(), "No stale temp files");
        }
        Ok(removed)
    }

    /// Sweep now and then every interval until `shutdown` flips to true.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                dir = %self.dir.display(),
                max_age_secs = self.max_age.as_secs(),
                "Starting temp sweeper (interval: {:?})",
                self.every
            );

            let mut ticker = interval(self.every.max(Duration::from_secs(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_requested(&mut shutdown) => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!("Temp sweep error: {}", e);
                        }
                    }
                }
            }

            debug!("Temp sweeper stopped");
        })
    }
}

/// Resolves once `shutdown` reads true or its sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
