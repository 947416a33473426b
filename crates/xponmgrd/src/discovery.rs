//! Startup reconciliation.
//!
//! After the vendor backend attaches, the tree is empty while the
//! hardware may already run ONUs. Discovery walks the hardware state
//! breadth-first: query the instance indexes of a template, then the
//! content of each instance, then recurse into the children the catalog
//! declares. One task runs per timer tick so a large tree never stalls
//! the event loop.
//!
//! An outer timer re-queries the ONU table until every slot up to
//! `max_onus` was seen once or the sweep budget is exhausted.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};
use xpon_dm::catalog::{self, ObjectId};
use xpon_dm::path::classify;

use crate::manager::XponManager;
use crate::pon_ctrl::InstanceArgs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DiscoveryTask {
    /// Ask the hardware which instances of a template exist.
    QueryIndexes { path: String },
    /// Ask the hardware for the content of one object. `index` 0 means
    /// a singleton child rather than a template instance.
    QueryContent { path: String, index: u32 },
}

/// Discovery queue, its timer and the bounded ONU bookkeeping.
pub(crate) struct Discovery {
    tasks: VecDeque<DiscoveryTask>,
    deadline: Option<Instant>,
    /// Slot `i` records that ONU instance `i + 1` was fully queried.
    onu_initialized: Vec<bool>,
    /// ONU table queries issued so far, the initial seed included.
    queries_issued: u32,
    sweep_deadline: Option<Instant>,
}

impl Discovery {
    pub(crate) fn new(max_onus: u32) -> Self {
        Self {
            tasks: VecDeque::new(),
            deadline: None,
            onu_initialized: vec![false; max_onus as usize],
            queries_issued: 0,
            sweep_deadline: None,
        }
    }

    fn arm(&mut self, short_timeout: Duration) {
        self.deadline = Some(Instant::now() + short_timeout);
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) fn next_sweep_deadline(&self) -> Option<Instant> {
        self.sweep_deadline
    }

    fn initialized(&self, index: u32) -> bool {
        self.onu_initialized
            .get((index - 1) as usize)
            .copied()
            .unwrap_or(false)
    }

    fn mark_initialized(&mut self, index: u32) {
        if let Some(slot) = self.onu_initialized.get_mut((index - 1) as usize) {
            *slot = true;
        }
    }

    fn all_initialized(&self) -> bool {
        self.onu_initialized.iter().all(|found| *found)
    }

    #[cfg(test)]
    pub(crate) fn tasks(&self) -> &VecDeque<DiscoveryTask> {
        &self.tasks
    }
}

impl XponManager {
    /// Seeds the first ONU table query and arms the outer sweep.
    pub(crate) fn start_discovery(&mut self) {
        debug!("starting hardware discovery");
        self.discovery.tasks.push_back(DiscoveryTask::QueryIndexes {
            path: onu_template().to_string(),
        });
        self.discovery.queries_issued = 1;
        self.discovery.arm(self.config.short_timeout());
        self.discovery.sweep_deadline = Some(Instant::now() + self.config.query_onus_interval());
    }

    /// Processes one discovery task.
    #[instrument(skip(self))]
    pub(crate) async fn discovery_tick(&mut self) {
        self.discovery.deadline = None;
        let Some(task) = self.discovery.tasks.pop_front() else {
            debug!("discovery timer fired with an empty queue");
            return;
        };
        match task {
            DiscoveryTask::QueryIndexes { path } => self.query_indexes(&path).await,
            DiscoveryTask::QueryContent { path, index } => self.query_content(&path, index).await,
        }
        if !self.discovery.tasks.is_empty() {
            self.discovery.arm(self.config.short_timeout());
        }
    }

    /// Re-queries the ONU table until all slots are seen or the budget
    /// runs out.
    #[instrument(skip(self))]
    pub(crate) async fn sweep_tick(&mut self) {
        self.discovery.sweep_deadline = None;
        if self.discovery.all_initialized() {
            info!("all ONUs found, stopping ONU table queries");
            return;
        }
        if self.discovery.queries_issued >= self.config.query_onus_max_sweeps {
            warn!(
                "giving up on the ONU table after {} queries",
                self.discovery.queries_issued
            );
            return;
        }
        self.discovery.tasks.push_back(DiscoveryTask::QueryIndexes {
            path: onu_template().to_string(),
        });
        self.discovery.queries_issued += 1;
        self.discovery.arm(self.config.short_timeout());
        self.discovery.sweep_deadline = Some(Instant::now() + self.config.query_onus_interval());
    }

    async fn query_indexes(&mut self, path: &str) {
        let reply = match self.pon_ctrl.get_instances(path).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("{}: cannot query instances: {}", path, e);
                return;
            }
        };
        let is_onu_root = path == onu_template();
        for entry in reply.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let index: u32 = match entry.parse() {
                Ok(index) => index,
                Err(_) => {
                    error!("{}: non-numeric instance index '{}'", path, entry);
                    continue;
                }
            };
            if is_onu_root {
                if index < 1 || index > self.config.max_onus {
                    error!(
                        "{}: index {} outside 1..={}",
                        path, index, self.config.max_onus
                    );
                    continue;
                }
                if self.tree.instance_exists(path, index) && self.discovery.initialized(index) {
                    continue;
                }
            } else if self.tree.instance_exists(path, index) {
                continue;
            }
            self.discovery.tasks.push_back(DiscoveryTask::QueryContent {
                path: path.to_string(),
                index,
            });
        }
    }

    async fn query_content(&mut self, path: &str, index: u32) {
        let content = match self.pon_ctrl.get_object_content(path, index).await {
            Ok(content) => content,
            Err(e) => {
                warn!("{}.{}: cannot query content: {}", path, index, e);
                return;
            }
        };

        let concrete = if index != 0 {
            let args = InstanceArgs {
                path: Some(path.to_string()),
                index: Some(index),
                keys: Some(content.keys),
                parameters: Some(content.parameters),
            };
            if let Err(e) = self.add_or_change_instance(args).await {
                error!("{}.{}: cannot bring instance into the tree: {}", path, index, e);
                return;
            }
            format!("{}.{}", path, index)
        } else {
            let args = InstanceArgs {
                path: Some(path.to_string()),
                parameters: Some(content.parameters),
                ..Default::default()
            };
            // Singleton children exist in the skeleton already; a failed
            // update must not cut off the subtree below them.
            if let Err(e) = self.change_object(args).await {
                error!("{}: cannot update singleton content: {}", path, e);
            }
            path.to_string()
        };

        let Some(id) = classify(&concrete) else {
            error!("{}: not a cataloged object, no children queried", concrete);
            return;
        };
        let info = catalog::info(id);
        for child in info.singletons {
            self.discovery.tasks.push_back(DiscoveryTask::QueryContent {
                path: format!("{}.{}", concrete, child),
                index: 0,
            });
        }
        for child in info.templates {
            self.discovery.tasks.push_back(DiscoveryTask::QueryIndexes {
                path: format!("{}.{}", concrete, child),
            });
        }
        if id == ObjectId::Onu && index != 0 {
            self.discovery.mark_initialized(index);
        }
    }
}

fn onu_template() -> &'static str {
    catalog::info(ObjectId::Onu).generic_path
}
