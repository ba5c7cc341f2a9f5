//! Cron triggers declared by repositories.
//!
//! Each repository owns one timer task per distinct cron expression. Rulesets
//! are compared before installation so rescanning an unchanged repository
//! keeps its timers running.

use async_trait::async_trait;
use chrono::Utc;
use ::cron::Schedule;
use reeve_config::{Document, SourceDocument};
use reeve_core::host::MessageDispatch;
use reeve_core::message::Message;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::ScanResult;
use crate::visitor::ScanVisitor;

const DAY_NAMES: [&str; 8] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

/// Enabled actions per cron expression.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CronRuleset {
    rules: BTreeMap<String, BTreeSet<String>>,
}

impl CronRuleset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable `action` under `expression`. Empty values are ignored.
    pub fn add(&mut self, expression: &str, action: &str) {
        if expression.is_empty() || action.is_empty() {
            return;
        }
        self.rules
            .entry(expression.to_string())
            .or_default()
            .insert(action.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.rules.iter()
    }

    pub fn actions(&self, expression: &str) -> Option<&BTreeSet<String>> {
        self.rules.get(expression)
    }
}

/// Convert an expression into the seconds-prefixed form of the `cron` crate.
///
/// Five-field expressions get a zero seconds field and their day-of-week
/// numbers (0-7, Sunday being 0 and 7) replaced by day names. Anything else
/// passes through unchanged.
pub fn normalize_expression(expression: &str) -> String {
    let expression = expression.trim();
    let fields: Vec<&str> = expression.split_whitespace().collect();

    if fields.len() != 5 {
        return expression.to_string();
    }

    format!(
        "0 {} {} {} {} {}",
        fields[0],
        fields[1],
        fields[2],
        fields[3],
        normalize_day_of_week(fields[4])
    )
}

fn normalize_day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(|part| {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (part, None),
            };

            if let Some((start, "7")) = range.split_once('-') {
                if let Some(days) = sunday_closed_range(start, step) {
                    return days;
                }
            }

            let mapped = match range.split_once('-') {
                Some((start, end)) => format!("{}-{}", day_name(start), day_name(end)),
                None => day_name(range),
            };

            match step {
                Some(step) => format!("{}/{}", mapped, step),
                None => mapped,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// A range ending in Sunday as 7. Named ranges cannot wrap past Saturday, so
/// the range is closed at SAT with SUN added, and stepped ranges are listed
/// day by day.
fn sunday_closed_range(start: &str, step: Option<&str>) -> Option<String> {
    let start = start.parse::<usize>().ok().filter(|start| *start <= 7)?;

    let Some(step) = step else {
        return Some(match start {
            0 => "SUN-SAT".to_string(),
            7 => "SUN".to_string(),
            _ => format!("{}-SAT,SUN", DAY_NAMES[start]),
        });
    };

    let step = step.parse::<usize>().ok().filter(|step| *step > 0)?;
    let days: BTreeSet<usize> = (start..=7).step_by(step).map(|day| day % 7).collect();
    Some(
        days.into_iter()
            .map(|day| DAY_NAMES[day])
            .collect::<Vec<_>>()
            .join(","),
    )
}

fn day_name(value: &str) -> String {
    value
        .parse::<usize>()
        .ok()
        .and_then(|day| DAY_NAMES.get(day))
        .map(|name| name.to_string())
        .unwrap_or_else(|| value.to_string())
}

/// Parse a cron expression in either five-field or `cron` crate syntax.
pub fn parse_schedule(expression: &str) -> Result<Schedule, ::cron::error::Error> {
    Schedule::from_str(&normalize_expression(expression))
}

struct InstalledRules {
    rules: CronRuleset,
    jobs: Vec<JoinHandle<()>>,
}

impl Drop for InstalledRules {
    fn drop(&mut self) {
        for job in &self.jobs {
            job.abort();
        }
    }
}

#[derive(Default)]
struct CronState {
    closed: bool,
    repositories: HashMap<String, InstalledRules>,
}

/// Installs cron timers per repository and fires their actions.
pub struct CronScheduler {
    dispatch: Arc<dyn MessageDispatch>,
    state: Mutex<CronState>,
    installs: AtomicU64,
}

impl CronScheduler {
    pub fn new(dispatch: Arc<dyn MessageDispatch>) -> Self {
        Self {
            dispatch,
            state: Mutex::new(CronState::default()),
            installs: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CronState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the cron triggers of `repository` with `rules`.
    ///
    /// An identical ruleset leaves the running timers untouched; an empty
    /// ruleset removes the repository.
    pub fn update_rules(&self, repository: &str, rules: CronRuleset) {
        let mut state = self.lock();

        if state.closed {
            debug!(repository, "Cron scheduler closed, ignoring rules");
            return;
        }

        if let Some(installed) = state.repositories.get(repository) {
            if installed.rules == rules {
                return;
            }
        }

        let previous = state.repositories.remove(repository);

        if rules.is_empty() {
            if previous.is_some() {
                info!(repository, "Clearing cron triggers");
            }
            return;
        }

        info!(repository, expressions = rules.len(), "Updating cron triggers");

        let jobs = rules
            .iter()
            .filter_map(|(expression, actions)| self.spawn_job(repository, expression, actions))
            .collect();

        self.installs.fetch_add(1, Ordering::Relaxed);
        state
            .repositories
            .insert(repository.to_string(), InstalledRules { rules, jobs });
    }

    fn spawn_job(
        &self,
        repository: &str,
        expression: &str,
        actions: &BTreeSet<String>,
    ) -> Option<JoinHandle<()>> {
        let schedule = match parse_schedule(expression) {
            Ok(schedule) => schedule,
            Err(e) => {
                warn!(repository, expression, error = %e, "Invalid cron expression");
                return None;
            }
        };

        let dispatch = self.dispatch.clone();
        let repository = repository.to_string();
        let names = actions.iter().cloned().collect::<Vec<_>>().join(", ");
        let messages: Vec<Message> = actions.iter().map(|a| Message::action(a.as_str())).collect();

        Some(tokio::spawn(async move {
            let mut after = Utc::now();
            while let Some(next) = schedule.after(&after).next() {
                let wait = (next - Utc::now()).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;
                after = next;

                info!(repository = %repository, actions = %names, "Triggering scheduled cron actions");
                if let Err(e) = dispatch.notify_messages(messages.clone()).await {
                    error!(repository = %repository, error = %e, "Failed to send cron actions");
                }
            }
        }))
    }

    /// The ruleset currently installed for `repository`.
    pub fn installed(&self, repository: &str) -> Option<CronRuleset> {
        self.lock()
            .repositories
            .get(repository)
            .map(|installed| installed.rules.clone())
    }

    /// Number of ruleset installations since creation.
    pub fn install_count(&self) -> u64 {
        self.installs.load(Ordering::Relaxed)
    }

    /// Tear down all timers. Later updates are ignored.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.repositories.clear();
    }
}

/// Collects the cron rules of one repository and installs them on close.
///
/// An aborted pass installs an empty ruleset, clearing stale triggers.
pub struct CronRuleCollector {
    scheduler: Arc<CronScheduler>,
    repository: String,
    rules: CronRuleset,
    done: bool,
}

impl CronRuleCollector {
    pub fn new(scheduler: Arc<CronScheduler>, repository: impl Into<String>) -> Self {
        Self {
            scheduler,
            repository: repository.into(),
            rules: CronRuleset::new(),
            done: false,
        }
    }
}

#[async_trait]
impl ScanVisitor for CronRuleCollector {
    fn scan(&mut self, document: &SourceDocument) -> ScanResult<()> {
        if let Document::Trigger { cron, action } = &document.document {
            self.rules.add(cron, action);
        }
        Ok(())
    }

    fn done(&mut self) {
        self.done = true;
    }

    async fn close(&mut self) {
        let rules = if self.done {
            std::mem::take(&mut self.rules)
        } else {
            CronRuleset::new()
        };
        self.scheduler.update_rules(&self.repository, rules);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use crate::testing::RecordingDispatch;
    use std::time::Duration;

    fn ruleset(rules: &[(&str, &str)]) -> CronRuleset {
        let mut ruleset = CronRuleset::new();
        for (expression, action) in rules {
            ruleset.add(expression, action);
        }
        ruleset
    }

    fn trigger(cron: &str, action: &str) -> SourceDocument {
        SourceDocument {
            document: Document::Trigger {
                cron: cron.to_string(),
                action: action.to_string(),
            },
            source_file: ".reeve.yaml".to_string(),
        }
    }

    #[test]
    fn test_ruleset_equality_is_order_independent() {
        let a = ruleset(&[("0 * * * *", "build"), ("0 * * * *", "lint"), ("@daily", "nightly")]);
        let b = ruleset(&[("@daily", "nightly"), ("0 * * * *", "lint"), ("0 * * * *", "build")]);
        assert_eq!(a, b);

        let c = ruleset(&[("@daily", "nightly"), ("0 * * * *", "lint")]);
        assert_ne!(a, c);

        let d = ruleset(&[
            ("0 * * * *", "build"),
            ("0 * * * *", "lint"),
            ("@daily", "nightly"),
            ("@daily", "cleanup"),
        ]);
        assert_ne!(a, d);
    }

    #[test]
    fn test_ruleset_ignores_empty_and_duplicates() {
        let rules = ruleset(&[("", "build"), ("0 * * * *", ""), ("0 * * * *", "build"), ("0 * * * *", "build")]);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules.actions("0 * * * *").unwrap().len(), 1);
    }

    #[test]
    fn test_normalize_expression() {
        assert_eq!(normalize_expression("0 12 * * *"), "0 0 12 * * *");
        assert_eq!(normalize_expression("30 2 * * 0"), "0 30 2 * * SUN");
        assert_eq!(normalize_expression("30 2 * * 7"), "0 30 2 * * SUN");
        assert_eq!(normalize_expression("0 9 * * 1-5"), "0 0 9 * * MON-FRI");
        assert_eq!(normalize_expression("0 9 * * 5-7"), "0 0 9 * * FRI-SAT,SUN");
        assert_eq!(normalize_expression("0 9 * * 0-7"), "0 0 9 * * SUN-SAT");
        assert_eq!(normalize_expression("0 9 * * 7-7"), "0 0 9 * * SUN");
        assert_eq!(normalize_expression("0 9 * * 1-7/2"), "0 0 9 * * SUN,MON,WED,FRI");
        assert_eq!(normalize_expression("0 9 * * 0-7/3"), "0 0 9 * * SUN,WED,SAT");
        assert_eq!(normalize_expression("0 9 * * 0,3"), "0 0 9 * * SUN,WED");
        assert_eq!(normalize_expression("0 9 * * */2"), "0 0 9 * * */2");
        assert_eq!(normalize_expression("0 9 * * MON"), "0 0 9 * * MON");
        assert_eq!(normalize_expression("@daily"), "@daily");
        assert_eq!(normalize_expression("*/5 * * * * *"), "*/5 * * * * *");
    }

    #[test]
    fn test_parse_schedule() {
        assert!(parse_schedule("0 12 * * *").is_ok());
        assert!(parse_schedule("0 9 * * 1-5").is_ok());
        assert!(parse_schedule("@hourly").is_ok());
        assert!(parse_schedule("not a schedule").is_err());
    }

    fn firing_days(expression: &str) -> BTreeSet<String> {
        let schedule = parse_schedule(expression).unwrap();
        schedule
            .upcoming(Utc)
            .take(14)
            .map(|time| time.weekday().to_string())
            .collect()
    }

    #[test]
    fn test_sunday_as_seven_fires_on_expected_days() {
        assert_eq!(firing_days("0 9 * * 0-7").len(), 7);
        assert_eq!(firing_days("0 9 * * 5-7"), days(&["Fri", "Sat", "Sun"]));
        assert_eq!(firing_days("0 9 * * 1-7/2"), days(&["Mon", "Wed", "Fri", "Sun"]));
    }

    fn days(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[tokio::test]
    async fn test_identical_rules_install_once() {
        let scheduler = CronScheduler::new(Arc::new(RecordingDispatch::default()));
        let rules = ruleset(&[("0 * * * *", "build")]);

        scheduler.update_rules("acme/web", rules.clone());
        scheduler.update_rules("acme/web", rules.clone());
        assert_eq!(scheduler.install_count(), 1);
        assert_eq!(scheduler.installed("acme/web"), Some(rules));

        scheduler.update_rules("acme/web", ruleset(&[("0 * * * *", "build"), ("0 * * * *", "lint")]));
        assert_eq!(scheduler.install_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_rules_remove_repository() {
        let scheduler = CronScheduler::new(Arc::new(RecordingDispatch::default()));
        scheduler.update_rules("acme/web", ruleset(&[("0 * * * *", "build")]));
        scheduler.update_rules("acme/web", CronRuleset::new());

        assert!(scheduler.installed("acme/web").is_none());
        assert_eq!(scheduler.install_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_expression_skipped() {
        let scheduler = CronScheduler::new(Arc::new(RecordingDispatch::default()));
        let rules = ruleset(&[("bogus", "build"), ("0 * * * *", "lint")]);
        scheduler.update_rules("acme/web", rules.clone());

        assert_eq!(scheduler.installed("acme/web"), Some(rules));
    }

    #[tokio::test]
    async fn test_close_clears_and_ignores_updates() {
        let scheduler = CronScheduler::new(Arc::new(RecordingDispatch::default()));
        scheduler.update_rules("acme/web", ruleset(&[("0 * * * *", "build")]));
        scheduler.close();

        assert!(scheduler.installed("acme/web").is_none());
        scheduler.update_rules("acme/api", ruleset(&[("0 * * * *", "build")]));
        assert!(scheduler.installed("acme/api").is_none());
    }

    #[tokio::test]
    async fn test_timer_fires_actions() {
        let dispatch = Arc::new(RecordingDispatch::default());
        let scheduler = CronScheduler::new(dispatch.clone());
        scheduler.update_rules("acme/web", ruleset(&[("* * * * * *", "ping")]));

        let mut fired = Vec::new();
        for _ in 0..40 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            fired = dispatch.messages();
            if !fired.is_empty() {
                break;
            }
        }

        assert!(!fired.is_empty());
        assert_eq!(fired[0], Message::action("ping"));
        scheduler.close();
    }

    #[tokio::test]
    async fn test_collector_installs_on_done() {
        let scheduler = Arc::new(CronScheduler::new(Arc::new(RecordingDispatch::default())));
        let mut collector = CronRuleCollector::new(scheduler.clone(), "acme/web");

        collector.scan(&trigger("0 * * * *", "build")).unwrap();
        collector.scan(&trigger("0 * * * *", "build")).unwrap();
        collector.done();
        collector.close().await;

        assert_eq!(
            scheduler.installed("acme/web"),
            Some(ruleset(&[("0 * * * *", "build")]))
        );
    }

    #[tokio::test]
    async fn test_aborted_collector_clears_rules() {
        let scheduler = Arc::new(CronScheduler::new(Arc::new(RecordingDispatch::default())));
        scheduler.update_rules("acme/web", ruleset(&[("0 * * * *", "build")]));

        let mut collector = CronRuleCollector::new(scheduler.clone(), "acme/web");
        collector.scan(&trigger("0 * * * *", "lint")).unwrap();
        collector.close().await;

        assert!(scheduler.installed("acme/web").is_none());
    }
}
