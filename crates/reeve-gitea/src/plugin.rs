//! The Gitea plugin: message handling, CLI methods and lifecycle.

use reeve_config::SystemConfig;
use reeve_core::host::{GitHost, MessageDispatch};
use reeve_core::message::{
    Action, ActionBundle, EVENT_STARTUP_COMPLETE, Message, PLUGIN_NAME, SERVER_SOURCE, Trigger,
    WEBUI_TARGET,
};
use reeve_core::secret::encrypt_secret;
use reeve_scheduler::webui::publish_bundle;
use reeve_scheduler::{CronScheduler, PluginState, ScanOrchestrator, ScanScheduler, ScanWorker};
use std::sync::Arc;
use tracing::{debug, info};

use crate::PluginError;
use crate::webhook::PushEvent;

/// CLI methods offered to the engine, with their usage.
pub const CLI_METHODS: [(&str, &str); 3] = [
    ("action", "<action> [<search ...>] - execute action"),
    (
        "encrypt",
        "<secret value> - encrypt variables for usage in .reeve.yaml secrets",
    ),
    ("rescan", "rescan all repositories"),
];

/// Reply of CLI methods that only enqueue work.
pub const ACCEPTED: &str = "accepted";

const OPERATIONS_BUNDLE: &str = "operations";
const RESCAN: &str = "rescan";

/// The running bridge.
pub struct GiteaPlugin {
    pub(crate) config: SystemConfig,
    pub(crate) host: Arc<dyn GitHost>,
    pub(crate) dispatch: Arc<dyn MessageDispatch>,
    pub(crate) orchestrator: ScanOrchestrator,
    scheduler: ScanScheduler,
    cron: Arc<CronScheduler>,
    state: Arc<PluginState>,
}

impl GiteaPlugin {
    /// Start the scan worker and the discovery timer. Must be called within a
    /// Tokio runtime.
    pub fn start(
        config: SystemConfig,
        host: Arc<dyn GitHost>,
        dispatch: Arc<dyn MessageDispatch>,
    ) -> Result<Self, PluginError> {
        let cron = Arc::new(CronScheduler::new(dispatch.clone()));
        let state = Arc::new(PluginState::new());
        let orchestrator = ScanOrchestrator::new(host.clone(), config.gitea.unrestricted);

        let worker = ScanWorker::new(
            orchestrator.clone(),
            cron.clone(),
            dispatch.clone(),
            state.clone(),
        );
        let scheduler = ScanScheduler::start(worker, config.discovery.schedule.as_deref())?;

        info!(
            gitea = %config.gitea.url,
            unrestricted = config.gitea.unrestricted,
            "Gitea plugin started"
        );

        Ok(Self {
            config,
            host,
            dispatch,
            orchestrator,
            scheduler,
            cron,
            state,
        })
    }

    pub fn webui_present(&self) -> bool {
        self.state.webui_present()
    }

    /// Handle a message routed to the plugin by the engine.
    pub async fn message(&self, source: &str, message: Message) -> Result<(), PluginError> {
        if source == SERVER_SOURCE {
            if message.option("event") == EVENT_STARTUP_COMPLETE {
                info!("Triggering initial discovery scan");
                self.scheduler.scan().await?;
            }
            return Ok(());
        }

        if source == WEBUI_TARGET && message.option("webui") == "present" {
            info!("Web UI is present");
            self.state.set_webui_present(true);
            publish_bundle(self.dispatch.as_ref(), operations_bundle()).await;
            return Ok(());
        }

        match message.option("type") {
            "webhook" => {
                let payload = message.data.as_deref().unwrap_or_default();
                self.handle_webhook(payload).await
            }
            "operation" => match message.option("operation") {
                "" => Err(PluginError::InvalidMessage("missing operation".to_string())),
                RESCAN => {
                    info!("Triggering user requested discovery scan");
                    self.scheduler.scan().await?;
                    Ok(())
                }
                operation => {
                    debug!(operation, "Ignoring unknown operation");
                    Ok(())
                }
            },
            "action" => match message.option("action") {
                "" => Err(PluginError::InvalidMessage("missing action".to_string())),
                action => self.trigger_action(action, message.option("search")).await,
            },
            message_type => {
                debug!(source, message_type, "Ignoring message");
                Ok(())
            }
        }
    }

    /// Handle a push webhook: rescan the repository and dispatch a push trigger
    /// unless the head commit skips CI.
    pub async fn handle_webhook(&self, payload: &[u8]) -> Result<(), PluginError> {
        let event = PushEvent::parse(payload)
            .map_err(|e| PluginError::InvalidMessage(format!("error parsing webhook: {}", e)))?;

        let repository = event.repository.full_name.clone();
        self.scheduler.notify(repository.clone()).await?;

        if event.skips_ci() {
            info!(repository = %repository, git_ref = %event.git_ref, "Skipping CI for push");
            return Ok(());
        }

        let Some(trigger) = event.trigger() else {
            debug!(repository = %repository, git_ref = %event.git_ref, "Push without head commit");
            return Ok(());
        };

        info!(repository = %repository, git_ref = %event.git_ref, "Dispatching push trigger");
        self.dispatch.notify_triggers(vec![trigger]).await?;
        Ok(())
    }

    /// Dispatch `action` triggers for the default branch of every repository
    /// matching `search`.
    async fn trigger_action(&self, action: &str, search: &str) -> Result<(), PluginError> {
        let repositories = self.host.search(search).await?;

        let mut triggers = Vec::with_capacity(repositories.len());
        for repository in repositories {
            let Some(commit) = self
                .host
                .fetch_commit(&repository.full_name, &repository.default_branch)
                .await?
            else {
                continue;
            };

            triggers.push(Trigger::from([
                ("type".to_string(), "git".to_string()),
                ("trigger".to_string(), "action".to_string()),
                ("action".to_string(), action.to_string()),
                ("ref".to_string(), format!("refs/heads/{}", repository.default_branch)),
                ("commit".to_string(), commit.id),
                ("commitMessage".to_string(), commit.message),
                ("repository".to_string(), repository.full_name),
                ("repositoryURL".to_string(), repository.html_url),
                ("cloneURL".to_string(), repository.clone_url),
                ("defaultBranch".to_string(), repository.default_branch),
            ]));
        }

        if triggers.is_empty() {
            debug!(action, search, "No repositories for action");
            return Ok(());
        }

        info!(action, count = triggers.len(), "Dispatching action triggers");
        self.dispatch.notify_triggers(triggers).await?;
        Ok(())
    }

    /// Run a CLI method. Methods that enqueue work reply [`ACCEPTED`].
    pub async fn cli_method(&self, method: &str, args: &[String]) -> Result<String, PluginError> {
        match method {
            "action" => {
                let action = args.first().map(String::as_str).unwrap_or_default();
                if action.is_empty() {
                    return Err(PluginError::InvalidArguments(
                        "no action was specified".to_string(),
                    ));
                }

                let message = Message::action(action).with_option("search", args[1..].join(" "));
                self.dispatch.notify_messages(vec![message]).await?;
                Ok(ACCEPTED.to_string())
            }
            "encrypt" => {
                let [value] = args else {
                    return Err(PluginError::InvalidArguments(format!(
                        "encrypt expects one argument but got {}",
                        args.len()
                    )));
                };
                Ok(encrypt_secret(&self.config.discovery.secret_key, value)?)
            }
            "rescan" => {
                self.dispatch
                    .notify_messages(vec![Message::operation(RESCAN)])
                    .await?;
                Ok(ACCEPTED.to_string())
            }
            _ => Err(PluginError::UnknownMethod(method.to_string())),
        }
    }

    /// Stop accepting scans, drain the queue and tear down cron timers.
    pub async fn shutdown(&self) {
        info!("Shutting down Gitea plugin");
        self.scheduler.close().await;
        self.scheduler.join().await;
        self.cron.close();
    }
}

fn operations_bundle() -> ActionBundle {
    ActionBundle {
        bundle_id: OPERATIONS_BUNDLE.to_string(),
        actions: vec![Action {
            id: RESCAN.to_string(),
            name: "rescan repositories".to_string(),
            groups: vec![PLUGIN_NAME.to_string()],
            message: Message::operation(RESCAN),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeGitea, SECRET_KEY, start_plugin};
    use reeve_core::secret::decrypt_secret;
    use std::time::Duration;

    const CONFIG: &str = r#"
type: pipeline
name: build
when:
  action:
    include: [release]
steps:
  - name: compile
    task: rust
---
type: trigger
cron: "0 3 * * *"
action: nightly
"#;

    const PUSH: &str = r#"{
        "ref": "refs/heads/main",
        "head_commit": { "id": "abcd", "message": "Add feature" },
        "commits": [{ "added": ["src/lib.rs"], "removed": [], "modified": [] }],
        "repository": {
            "full_name": "acme/web",
            "html_url": "https://git.example.com/acme/web",
            "clone_url": "https://git.example.com/acme/web.git",
            "default_branch": "main"
        }
    }"#;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    async fn eventually(mut condition: impl FnMut() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met");
    }

    #[tokio::test]
    async fn test_webhook_dispatches_push_and_rescans() {
        let host = FakeGitea::new().with_file("acme/web", ".reeve.yaml", CONFIG);
        let (plugin, _, engine) = start_plugin(host);

        let message = Message::new(PLUGIN_NAME)
            .with_option("type", "webhook")
            .with_data(PUSH.as_bytes().to_vec());
        plugin.message("gitea", message).await.unwrap();

        let triggers = engine.triggers();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0]["trigger"], "push");
        assert_eq!(triggers[0]["files"], "src/lib.rs");

        // the notify installs the repository's cron triggers
        eventually(|| plugin.cron.installed("acme/web").is_some()).await;
        plugin.shutdown().await;
    }

    #[tokio::test]
    async fn test_webhook_skip_ci() {
        let (plugin, _, engine) = start_plugin(FakeGitea::new());

        let payload = PUSH.replace("Add feature", "Update docs [skip ci]");
        plugin.handle_webhook(payload.as_bytes()).await.unwrap();
        assert!(engine.triggers().is_empty());

        let result = plugin.handle_webhook(b"not json").await;
        assert!(matches!(result, Err(PluginError::InvalidMessage(_))));
        plugin.shutdown().await;
    }

    #[tokio::test]
    async fn test_action_message_triggers_matching_repositories() {
        let host = FakeGitea::new()
            .with_repository("acme/web", Some("c1"))
            .with_repository("acme/empty", None)
            .with_repository("other/tools", Some("c3"));
        let (plugin, host, engine) = start_plugin(host);

        let message = Message::action("deploy").with_option("search", "acme");
        plugin.message("gitea", message).await.unwrap();

        assert_eq!(host.searches(), vec!["acme"]);
        let triggers = engine.triggers();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0]["trigger"], "action");
        assert_eq!(triggers[0]["action"], "deploy");
        assert_eq!(triggers[0]["ref"], "refs/heads/main");
        assert_eq!(triggers[0]["commit"], "c1");
        assert_eq!(triggers[0]["repository"], "acme/web");
        plugin.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_messages() {
        let (plugin, _, _) = start_plugin(FakeGitea::new());

        let missing_action = Message::new(PLUGIN_NAME).with_option("type", "action");
        assert!(plugin.message("gitea", missing_action).await.is_err());

        let missing_operation = Message::new(PLUGIN_NAME).with_option("type", "operation");
        assert!(plugin.message("gitea", missing_operation).await.is_err());

        let unknown = Message::new(PLUGIN_NAME).with_option("type", "other");
        assert!(plugin.message("gitea", unknown).await.is_ok());
        plugin.shutdown().await;
    }

    #[tokio::test]
    async fn test_webui_presence_publishes_operations() {
        let (plugin, _, engine) = start_plugin(FakeGitea::new());
        assert!(!plugin.webui_present());

        let message = Message::new(PLUGIN_NAME).with_option("webui", "present");
        plugin.message(WEBUI_TARGET, message).await.unwrap();

        assert!(plugin.webui_present());
        let messages = engine.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].target, WEBUI_TARGET);

        let bundle: ActionBundle = serde_json::from_slice(messages[0].data.as_deref().unwrap()).unwrap();
        assert_eq!(bundle, operations_bundle());
        plugin.shutdown().await;
    }

    #[tokio::test]
    async fn test_startup_complete_runs_full_scan() {
        let host = FakeGitea::new()
            .with_repository("acme/web", Some("c1"))
            .with_file("acme/web", ".reeve.yaml", CONFIG);
        let (plugin, host, _) = start_plugin(host);

        let other = Message::new(PLUGIN_NAME).with_option("event", "shutdown");
        plugin.message(SERVER_SOURCE, other).await.unwrap();

        let startup = Message::new(PLUGIN_NAME).with_option("event", EVENT_STARTUP_COMPLETE);
        plugin.message(SERVER_SOURCE, startup).await.unwrap();

        eventually(|| plugin.cron.installed("acme/web").is_some()).await;
        plugin.shutdown().await;
        assert_eq!(host.searches(), vec![""]);
    }

    #[tokio::test]
    async fn test_cli_methods() {
        let (plugin, _, engine) = start_plugin(FakeGitea::new());

        let reply = plugin
            .cli_method("action", &args(&["deploy", "acme", "web"]))
            .await
            .unwrap();
        assert_eq!(reply, ACCEPTED);

        let reply = plugin.cli_method("rescan", &[]).await.unwrap();
        assert_eq!(reply, ACCEPTED);

        let messages = engine.messages();
        assert_eq!(messages[0], Message::action("deploy").with_option("search", "acme web"));
        assert_eq!(messages[1], Message::operation("rescan"));

        let encrypted = plugin.cli_method("encrypt", &args(&["hunter2"])).await.unwrap();
        assert_eq!(decrypt_secret(SECRET_KEY, &encrypted).unwrap(), "hunter2");

        assert!(matches!(
            plugin.cli_method("action", &[]).await,
            Err(PluginError::InvalidArguments(_))
        ));
        assert!(matches!(
            plugin.cli_method("encrypt", &args(&["a", "b"])).await,
            Err(PluginError::InvalidArguments(_))
        ));
        assert!(matches!(
            plugin.cli_method("deploy", &[]).await,
            Err(PluginError::UnknownMethod(_))
        ));
        plugin.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_rejects_scans() {
        let (plugin, _, _) = start_plugin(FakeGitea::new());
        plugin.shutdown().await;

        let result = plugin.message("gitea", Message::operation(RESCAN)).await;
        assert!(matches!(result, Err(PluginError::Queue(_))));
    }
}
