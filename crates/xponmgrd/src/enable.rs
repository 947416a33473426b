//! Deferred-enable scheduler.
//!
//! Enabling an ONU the moment its `Enable` parameter flips would race
//! the discovery of its interfaces: the hardware rejects an activation
//! before the UNIs and ANIs are known. Enables of ONU instances are
//! therefore queued and retried until the instance has at least one
//! EthernetUNI and one ANI, with a bounded number of checks before the
//! enable is forced through anyway. Non-ONU paths pass on the first
//! tick.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};
use xpon_dm::catalog::ObjectId;
use xpon_dm::path::classify;

use crate::manager::XponManager;

#[derive(Debug)]
pub(crate) struct EnableTask {
    pub(crate) path: String,
    /// How often the UNI/ANI presence check ran for this task.
    pub(crate) checks: u8,
}

/// Queue of pending enables plus its timer deadline.
pub(crate) struct EnableScheduler {
    tasks: VecDeque<EnableTask>,
    deadline: Option<Instant>,
}

impl EnableScheduler {
    pub(crate) fn new() -> Self {
        Self {
            tasks: VecDeque::new(),
            deadline: None,
        }
    }

    /// Queues a deferred enable of `path` and arms the timer.
    ///
    /// No-op when a queued task already covers `path` or an object
    /// below it.
    pub(crate) fn schedule(&mut self, path: &str, short_timeout: Duration) {
        if self.tasks.iter().any(|t| t.path.starts_with(path)) {
            debug!("{}: enable already scheduled", path);
            return;
        }
        debug!("{}: scheduling deferred enable", path);
        self.tasks.push_back(EnableTask {
            path: path.to_string(),
            checks: 0,
        });
        self.deadline = Some(Instant::now() + short_timeout);
    }

    /// Drops the first queued task matching `path` exactly.
    pub(crate) fn cancel(&mut self, path: &str) {
        if let Some(pos) = self.tasks.iter().position(|t| t.path == path) {
            debug!("{}: cancelling deferred enable", path);
            self.tasks.remove(pos);
        }
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }
}

impl XponManager {
    /// Queues `path` for a deferred enable.
    pub(crate) fn schedule_enable(&mut self, path: &str) {
        self.enable_sched.schedule(path, self.config.short_timeout());
    }

    pub(crate) fn cancel_scheduled_enable(&mut self, path: &str) {
        self.enable_sched.cancel(path);
    }

    /// Sweeps the deferred-enable queue once.
    ///
    /// Every task is visited: non-ONU paths are enabled outright, ONU
    /// paths only once both an EthernetUNI and an ANI exist or after
    /// the check budget ran out. The timer re-arms at the retry
    /// interval while tasks remain.
    #[instrument(skip(self))]
    pub(crate) async fn enable_tick(&mut self) {
        self.enable_sched.deadline = None;
        if self.enable_sched.tasks.is_empty() {
            warn!("enable timer fired with an empty queue");
            return;
        }
        let mut pending = std::mem::take(&mut self.enable_sched.tasks);
        let mut kept = VecDeque::new();
        while let Some(mut task) = pending.pop_front() {
            if classify(&task.path) == Some(ObjectId::Onu) {
                let unis = self.nr_of_ethernet_unis(&task.path);
                let anis = self.nr_of_anis(&task.path);
                if unis == 0 || anis == 0 {
                    if task.checks < self.config.max_uni_ani_checks {
                        task.checks += 1;
                        kept.push_back(task);
                        continue;
                    }
                    warn!(
                        "Enable {} despite nr_of_ethernet_unis={} nr_of_anis={}",
                        task.path, unis, anis
                    );
                }
            }
            self.pon_ctrl.set_enable(&task.path, true).await;
        }
        self.enable_sched.tasks = kept;
        if !self.enable_sched.tasks.is_empty() {
            self.enable_sched.deadline =
                Some(Instant::now() + self.config.enable_retry_interval());
        }
    }
}
