//! Periodic rebuilds.
//!
//! Every tick, each context whose frequency interval has elapsed since its last
//! successful task gets a rebuild. Contexts that are busy are skipped until the
//! next tick. A context whose latest build failed waits out
//! [`FAILURE_BACKOFF_HOURS`] before the next attempt.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reindexer_shared::{Frequency, TaskTarget};
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::errors::ReindexError;
use crate::service::ReindexService;
use crate::tracker::TaskTicket;

/// Hours to wait after a failed build before the scheduler retries it.
pub const FAILURE_BACKOFF_HOURS: i64 = 1;

/// Completion times of a context's latest builds.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildHistory {
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
}

/// Whether a context with `history` is due at `now`.
pub fn is_due(frequency: Frequency, history: BuildHistory, now: DateTime<Utc>) -> bool {
    if let Some(failed) = history.last_failure {
        let latest = history.last_success.map_or(true, |ok| failed > ok);
        if latest && now - failed < chrono::Duration::hours(FAILURE_BACKOFF_HOURS) {
            return false;
        }
    }
    match history.last_success {
        None => true,
        Some(at) => now - at >= frequency.interval(),
    }
}

pub struct Scheduler {
    service: Arc<ReindexService>,
}

impl Scheduler {
    pub fn new(service: Arc<ReindexService>) -> Self {
        Self { service }
    }

    /// Queue a rebuild for every due context.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<Vec<TaskTicket>, ReindexError> {
        let mut queued = Vec::new();

        let tracker = self.service.tracker();
        for context in self.service.catalog().contexts() {
            let target = TaskTarget::Context(context.id);
            let history = BuildHistory {
                last_success: tracker.last_success(&target).await?.and_then(|t| t.stop_date),
                last_failure: tracker.last_failure(&target).await?.and_then(|t| t.stop_date),
            };
            if !is_due(context.frequency, history, now) {
                continue;
            }

            match self.service.rebuild_context(context.id, None).await {
                Ok(ticket) => {
                    info!(context = %context.name, task_id = %ticket.task_id, "Scheduled rebuild queued");
                    queued.push(ticket);
                }
                Err(ReindexError::LockedError(_)) => {
                    debug!(context = %context.name, "Context busy, skipping scheduled rebuild");
                }
                Err(e) => {
                    warn!(context = %context.name, error = %e, "Scheduled rebuild rejected");
                }
            }
        }

        Ok(queued)
    }

    /// Tick every `period` until shutdown.
    pub async fn run(self, period: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        error!(error = %e, "Scheduler tick failed");
                    }
                }
                _ = shutdown.recv() => {
                    debug!("Scheduler stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn succeeded(at: DateTime<Utc>) -> BuildHistory {
        BuildHistory {
            last_success: Some(at),
            last_failure: None,
        }
    }

    #[test]
    fn test_is_due() {
        let now = Utc::now();
        assert!(is_due(Frequency::Daily, BuildHistory::default(), now));
        assert!(is_due(Frequency::Daily, succeeded(now - ChronoDuration::days(1)), now));
        assert!(!is_due(Frequency::Daily, succeeded(now - ChronoDuration::hours(23)), now));
        assert!(!is_due(Frequency::Weekly, succeeded(now - ChronoDuration::days(6)), now));
        assert!(is_due(Frequency::Weekly, succeeded(now - ChronoDuration::days(7)), now));
        assert!(!is_due(Frequency::Monthly, succeeded(now - ChronoDuration::days(29)), now));
        assert!(is_due(Frequency::Monthly, succeeded(now - ChronoDuration::days(30)), now));
    }

    #[test]
    fn test_failed_build_backs_off() {
        let now = Utc::now();
        let never_built = BuildHistory {
            last_success: None,
            last_failure: Some(now - ChronoDuration::minutes(10)),
        };
        assert!(!is_due(Frequency::Daily, never_built, now));
        assert!(is_due(Frequency::Daily, never_built, now + ChronoDuration::hours(1)));

        let overdue = BuildHistory {
            last_success: Some(now - ChronoDuration::days(3)),
            last_failure: Some(now - ChronoDuration::minutes(10)),
        };
        assert!(!is_due(Frequency::Daily, overdue, now));

        // A failure older than the last success does not hold anything back
        let recovered = BuildHistory {
            last_success: Some(now - ChronoDuration::days(2)),
            last_failure: Some(now - ChronoDuration::days(2) - ChronoDuration::minutes(1)),
        };
        assert!(is_due(Frequency::Daily, recovered, now));
    }
}
