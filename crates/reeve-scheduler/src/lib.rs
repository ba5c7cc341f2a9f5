//! Repository scanning and scheduling for the Reeve Gitea bridge.
//!
//! A single worker drains the scan queue in submission order. Each scan runs the
//! attached visitors over the resolved configuration of one repository:
//! - [`PipelineCollector`] resolves pipelines and env for discovery
//! - [`CronRuleCollector`] installs cron triggers through the [`CronScheduler`]
//! - [`WebUiActionCollector`] publishes the repository's actions to the web UI

pub mod cron;
pub mod discover;
pub mod error;
pub mod orchestrator;
pub mod queue;
pub mod state;
pub mod visitor;
pub mod webui;

#[cfg(test)]
pub(crate) mod testing;

pub use self::cron::{CronRuleCollector, CronRuleset, CronScheduler};
pub use discover::PipelineCollector;
pub use error::{ScanError, ScanQueueError, ScanResult};
pub use orchestrator::ScanOrchestrator;
pub use queue::{ScanRequest, ScanScheduler, ScanWorker};
pub use state::PluginState;
pub use visitor::{InitContext, ScanVisitor};
pub use webui::WebUiActionCollector;
