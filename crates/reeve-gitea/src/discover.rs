//! Pipeline discovery for git triggers.

use regex::Regex;
use reeve_core::message::Trigger;
use reeve_core::schema::{Condition, Conditions, Env, Facts, Param, Pipeline, Setup};
use reeve_scheduler::PipelineCollector;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::{GiteaPlugin, PluginError};

/// Env name under which the Gitea token is handed to the setup task.
pub const GIT_TOKEN_ENV: &str = "__GIT_TOKEN";

const SHORT_COMMIT_LEN: usize = 10;
const BRANCH_PREFIX: &str = "refs/heads/";
const TAG_PREFIX: &str = "refs/tags/";

static REPOSITORY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+$").unwrap());

const REQUIRED_FIELDS: [&str; 7] = [
    "trigger",
    "ref",
    "commit",
    "repository",
    "repositoryURL",
    "cloneURL",
    "defaultBranch",
];

/// Strip `prefix` from `value`, ignoring ASCII case.
fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

fn is_valid_repository(repository: &str) -> bool {
    REPOSITORY_REGEX.is_match(repository)
        && repository
            .split('/')
            .all(|segment| segment != "." && segment != "..")
}

fn field<'a>(trigger: &'a Trigger, key: &str) -> &'a str {
    trigger.get(key).map(String::as_str).unwrap_or_default()
}

fn fact(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl GiteaPlugin {
    /// Resolve the pipelines of the repository a git trigger refers to.
    ///
    /// Triggers for other hosts yield no pipelines. Malformed triggers for this
    /// host are rejected.
    pub async fn discover(&self, trigger: &Trigger) -> Result<Vec<Pipeline>, PluginError> {
        let public_url = self.config.gitea.public_url.as_str();

        let repository_url = field(trigger, "repositoryURL");
        let clone_url = field(trigger, "cloneURL");
        let clone_path = strip_prefix_ignore_case(clone_url, public_url);
        if field(trigger, "type") != "git"
            || strip_prefix_ignore_case(repository_url, public_url).is_none()
            || clone_path.is_none()
        {
            debug!("Ignoring trigger for another host");
            return Ok(Vec::new());
        }

        let missing: Vec<&str> = REQUIRED_FIELDS
            .into_iter()
            .filter(|key| field(trigger, key).is_empty())
            .collect();
        if !missing.is_empty() {
            return Err(PluginError::InvalidTrigger(format!(
                "missing fields {}",
                missing.join(", ")
            )));
        }

        let trigger_type = field(trigger, "trigger");
        let action = field(trigger, "action");
        let git_ref = field(trigger, "ref");
        let commit = field(trigger, "commit");
        let commit_message = field(trigger, "commitMessage");
        let repository = field(trigger, "repository");
        let default_branch = field(trigger, "defaultBranch");

        if trigger_type != "push" && trigger_type != "action" {
            return Err(PluginError::InvalidTrigger(format!(
                "unknown trigger type {}",
                trigger_type
            )));
        }

        if !is_valid_repository(repository) {
            return Err(PluginError::InvalidTrigger(format!(
                "malformed repository identifier {}",
                repository
            )));
        }

        let mut facts = Facts::from([
            ("trigger".to_string(), fact(&[trigger_type])),
            ("action".to_string(), Vec::new()),
            ("ref".to_string(), fact(&[git_ref])),
            ("branch".to_string(), Vec::new()),
            ("file".to_string(), Vec::new()),
            ("tag".to_string(), Vec::new()),
            ("repository".to_string(), fact(&[repository])),
        ]);

        if trigger_type == "action" {
            if action.is_empty() {
                return Err(PluginError::InvalidTrigger("missing field action".to_string()));
            }
            facts.insert("action".to_string(), fact(&[action]));
        }

        let branch = git_ref.strip_prefix(BRANCH_PREFIX);
        let tag = git_ref.strip_prefix(TAG_PREFIX);

        if let Some(branch) = branch {
            facts.insert("branch".to_string(), fact(&[branch]));
            if trigger_type == "push" {
                facts.entry("trigger".to_string()).or_default().push("commit".to_string());
            }
            if let Some(files) = trigger.get("files") {
                let files = files.lines().filter(|f| !f.is_empty()).collect::<Vec<_>>();
                facts.insert("file".to_string(), fact(&files));
            }
        }

        if let Some(tag) = tag {
            facts.insert("tag".to_string(), fact(&[tag]));
            if trigger_type == "push" {
                facts.entry("trigger".to_string()).or_default().push("tag".to_string());
            }
        }

        let default_conditions = Conditions::from([
            ("trigger".to_string(), Condition::include(["commit"])),
            ("action".to_string(), Condition::include([""])),
            ("branch".to_string(), Condition::include([default_branch])),
        ]);

        let (headline, trigger_description) = match trigger_type {
            "push" => {
                let mut headline = match (branch, tag) {
                    (Some(branch), _) => format!("[branch {}]", branch),
                    (None, Some(tag)) => format!("[tag {}]", tag),
                    (None, None) => format!("[push {}]", git_ref),
                };
                if !commit_message.trim().is_empty() {
                    headline.push(' ');
                    headline.push_str(commit_message);
                }
                (headline, format!("{}: {}", trigger_type, git_ref))
            }
            _ => (
                format!("[action {}]", action),
                format!("{}: {}", trigger_type, action),
            ),
        };

        let short_commit: String = commit.chars().take(SHORT_COMMIT_LEN).collect();
        let description = format!(
            "> [{repository}]({url}) | [{short_commit}]({url}/src/commit/{commit})\\\n> {trigger_description}\n\n",
            url = repository_url,
        );

        let mut collector = PipelineCollector::new(
            repository,
            self.config.discovery.secret_key.as_str(),
            default_conditions,
        );
        self.orchestrator
            .scan_repository(repository, commit, &mut [&mut collector])
            .await?;
        let (definitions, mut env) = collector.finish();

        env.insert(
            GIT_TOKEN_ENV.to_string(),
            Env::secret(self.config.gitea.token.as_str()),
        );

        let setup = Setup {
            task: self.config.pipelines.setup_task.clone(),
            params: BTreeMap::from([
                (
                    "GIT_REPOSITORY".to_string(),
                    Param::Literal(format!(
                        "{}{}",
                        self.config.gitea.clone_url,
                        clone_path.unwrap_or_default()
                    )),
                ),
                (
                    "GIT_PASSWORD".to_string(),
                    Param::Env {
                        env: GIT_TOKEN_ENV.to_string(),
                    },
                ),
                ("GIT_COMMIT".to_string(), Param::Literal(commit.to_string())),
            ]),
        };

        info!(
            repository,
            commit,
            pipelines = definitions.len(),
            "Discovered pipelines"
        );

        Ok(definitions
            .into_iter()
            .map(|mut definition| {
                if definition.headline.trim().is_empty() {
                    definition.headline = headline.clone();
                }
                definition.description = format!("{}{}", description, definition.description);

                Pipeline {
                    definition,
                    env: env.clone(),
                    facts: facts.clone(),
                    task_domains: self.config.pipelines.task_domains.clone(),
                    trusted_domains: self.config.pipelines.trusted_domains.clone(),
                    trusted_tasks: self.config.pipelines.trusted_tasks.clone(),
                    setup: setup.clone(),
                }
            })
            .collect())
    }
}
