//! Background TOC maintenance: a poll timer feeds filesystem changes into
//! the maintainer's queue and a drain timer applies them.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use arbor_namespace::{ChangeFeed, TocMaintainer, TocManager};

use crate::config::WatchConfig;
use crate::error::{ServiceError, ServiceResult};

/// Run until `shutdown` turns true. Returns the number of TOC entries
/// changed.
pub async fn run_maintenance(
    mut maintainer: TocMaintainer,
    mut feed: Box<dyn ChangeFeed>,
    config: WatchConfig,
    mut shutdown: watch::Receiver<bool>,
) -> usize {
    let mut poll = interval(config.poll_interval());
    let mut drain = interval(config.drain_interval());
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    drain.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let sender = maintainer.sender();
    let mut changed = 0;

    loop {
        tokio::select! {
            _ = poll.tick() => match feed.poll().await {
                Ok(events) => {
                    for event in events {
                        if sender.send(event).is_err() {
                            warn!("maintenance queue closed, event dropped");
                        }
                    }
                }
                Err(e) => warn!(error = %e, "change feed poll failed"),
            },
            _ = drain.tick() => {
                changed += maintainer.drain().await;
            }
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    changed += maintainer.drain().await;
    info!(changed, "toc maintenance stopped");
    changed
}

/// A maintenance loop running on the tokio runtime.
pub struct MaintenanceHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<usize>,
}

impl MaintenanceHandle {
    pub fn spawn(toc: Arc<TocManager>, feed: Box<dyn ChangeFeed>, config: WatchConfig) -> Self {
        let (shutdown, rx) = watch::channel(false);
        debug!(
            poll_ms = config.poll_interval_ms,
            drain_ms = config.drain_interval_ms,
            "toc maintenance started"
        );
        let task = tokio::spawn(run_maintenance(TocMaintainer::new(toc), feed, config, rx));
        Self { shutdown, task }
    }

    /// Signal the loop, wait for its final drain, and return the number of
    /// TOC entries it changed.
    pub async fn shutdown(self) -> ServiceResult<usize> {
        // the loop also stops if the receiver is already gone
        let _ = self.shutdown.send(true);
        self.task
            .await
            .map_err(|e| ServiceError::Internal(format!("maintenance task failed: {e}")))
    }
}

impl std::fmt::Debug for MaintenanceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceHandle")
            .field("finished", &self.task.is_finished())
            .finish()
    }
}
