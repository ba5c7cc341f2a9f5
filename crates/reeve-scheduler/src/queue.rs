//! Serialized scan queue.
//!
//! Scan requests are processed by a single worker task, strictly in submission
//! order and one at a time. The queue is bounded; submitting blocks while it is
//! full. Closing the queue rejects further submissions and lets the worker exit
//! once the requests accepted before closing have been processed.

use chrono::Utc;
use reeve_core::host::MessageDispatch;
use reeve_core::message::ActionBundle;
use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::cron::{CronRuleCollector, CronScheduler, parse_schedule};
use crate::orchestrator::ScanOrchestrator;
use crate::state::PluginState;
use crate::visitor::ScanVisitor;
use crate::webui::{WebUiActionCollector, publish_bundle};
use crate::ScanQueueError;

/// Capacity of the scan queue.
pub const QUEUE_CAPACITY: usize = 10;

/// Work item of the scan queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanRequest {
    /// Discover all accessible repositories and scan each of them.
    FullScan,
    /// Scan a single repository.
    Notify(String),
}

type SharedSender = Arc<Mutex<Option<mpsc::Sender<ScanRequest>>>>;

async fn enqueue(sender: &SharedSender, request: ScanRequest) -> Result<(), ScanQueueError> {
    let guard = sender.lock().await;
    let Some(tx) = guard.as_ref() else {
        return Err(ScanQueueError::Closed);
    };
    tx.send(request).await.map_err(|_| ScanQueueError::Closed)
}

/// Front end of the scan queue.
pub struct ScanScheduler {
    sender: SharedSender,
    worker: StdMutex<Option<JoinHandle<()>>>,
    discovery: StdMutex<Option<JoinHandle<()>>>,
}

impl ScanScheduler {
    /// Spawn the worker and, if `discovery_schedule` is set, a timer that
    /// submits full scans on that schedule.
    pub fn start(
        worker: ScanWorker,
        discovery_schedule: Option<&str>,
    ) -> Result<Self, ScanQueueError> {
        let discovery_schedule = discovery_schedule
            .map(|expression| {
                parse_schedule(expression).map_err(|e| ScanQueueError::InvalidSchedule {
                    schedule: expression.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()?;

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let sender: SharedSender = Arc::new(Mutex::new(Some(tx)));

        let worker = tokio::spawn(worker.run(rx));

        let discovery = match discovery_schedule {
            Some(schedule) => {
                info!(schedule = %schedule, "Scheduled discovery scans configured");
                let sender = sender.clone();
                Some(tokio::spawn(async move {
                    let mut after = Utc::now();
                    while let Some(next) = schedule.after(&after).next() {
                        let wait = (next - Utc::now()).to_std().unwrap_or_default();
                        tokio::time::sleep(wait).await;
                        after = next;

                        info!("Triggering scheduled discovery scan");
                        if enqueue(&sender, ScanRequest::FullScan).await.is_err() {
                            break;
                        }
                    }
                }))
            }
            None => {
                info!("Scheduled discovery scans are disabled");
                None
            }
        };

        Ok(Self {
            sender,
            worker: StdMutex::new(Some(worker)),
            discovery: StdMutex::new(discovery),
        })
    }

    /// Submit a full discovery scan.
    pub async fn scan(&self) -> Result<(), ScanQueueError> {
        enqueue(&self.sender, ScanRequest::FullScan).await
    }

    /// Submit a scan of a single repository.
    pub async fn notify(&self, repository: impl Into<String>) -> Result<(), ScanQueueError> {
        enqueue(&self.sender, ScanRequest::Notify(repository.into())).await
    }

    /// Reject further submissions and stop the discovery timer.
    ///
    /// Requests accepted before closing are still processed.
    pub async fn close(&self) {
        self.sender.lock().await.take();

        if let Some(discovery) = self
            .discovery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            discovery.abort();
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.sender.lock().await.is_none()
    }

    /// Wait for the worker to drain the queue. Only returns after [`Self::close`].
    pub async fn join(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(error = %e, "Scan worker failed");
            }
        }
    }
}

/// The consuming side of the scan queue.
///
/// Owns the set of repositories seen on the last full scan.
pub struct ScanWorker {
    orchestrator: ScanOrchestrator,
    cron: Arc<CronScheduler>,
    dispatch: Arc<dyn MessageDispatch>,
    state: Arc<PluginState>,
    known_repositories: HashSet<String>,
}

impl ScanWorker {
    pub fn new(
        orchestrator: ScanOrchestrator,
        cron: Arc<CronScheduler>,
        dispatch: Arc<dyn MessageDispatch>,
        state: Arc<PluginState>,
    ) -> Self {
        Self {
            orchestrator,
            cron,
            dispatch,
            state,
            known_repositories: HashSet::new(),
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<ScanRequest>) {
        info!("Starting scan worker");

        while let Some(request) = rx.recv().await {
            match request {
                ScanRequest::FullScan => self.full_scan().await,
                ScanRequest::Notify(repository) => self.notify(&repository).await,
            }
        }

        info!("Scan worker stopped");
    }

    async fn full_scan(&mut self) {
        info!("Starting discovery scan");

        let repositories = match self.orchestrator.host().search("").await {
            Ok(repositories) => repositories,
            Err(e) => {
                error!(error = %e, "Searching repositories failed");
                return;
            }
        };

        let current: HashSet<String> = repositories.iter().map(|r| r.full_name.clone()).collect();

        for dropped in self.known_repositories.difference(&current) {
            info!(repository = %dropped, "Dropping repository");
            publish_bundle(
                self.dispatch.as_ref(),
                ActionBundle::empty_for_repository(dropped),
            )
            .await;
        }
        self.known_repositories = current;

        for repository in &repositories {
            self.notify(&repository.full_name).await;
        }

        info!(repositories = repositories.len(), "Discovery scan finished");
    }

    async fn notify(&self, repository: &str) {
        if repository.is_empty() {
            return;
        }

        info!(repository, "Scanning repository");

        let mut cron = CronRuleCollector::new(self.cron.clone(), repository);
        let mut webui = self
            .state
            .webui_present()
            .then(|| WebUiActionCollector::new(self.dispatch.clone(), repository));

        let mut visitors: Vec<&mut dyn ScanVisitor> = Vec::with_capacity(2);
        if let Some(webui) = webui.as_mut() {
            visitors.push(webui);
        }
        visitors.push(&mut cron);

        if let Err(e) = self
            .orchestrator
            .scan_repository(repository, "", &mut visitors)
            .await
        {
            error!(repository, error = %e, "Repository scan failed");
        }
    }
}
