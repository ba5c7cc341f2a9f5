//! Action bundles for the web UI.

use async_trait::async_trait;
use reeve_config::{Document, SourceDocument};
use reeve_core::host::MessageDispatch;
use reeve_core::message::{Action, ActionBundle, Message, repository_bundle_id};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::error;

use crate::ScanResult;
use crate::visitor::ScanVisitor;

const ACTION_DIMENSION: &str = "action";
const TRIGGER_GROUP: &str = "pipeline triggers";

/// Send `bundle` to the web UI. Failures are logged.
pub async fn publish_bundle(dispatch: &dyn MessageDispatch, bundle: ActionBundle) -> bool {
    let bundle_id = bundle.bundle_id.clone();

    let message = match bundle.into_message() {
        Ok(message) => message,
        Err(e) => {
            error!(bundle = %bundle_id, error = %e, "Failed to build action bundle");
            return false;
        }
    };

    match dispatch.notify_messages(vec![message]).await {
        Ok(()) => true,
        Err(e) => {
            error!(bundle = %bundle_id, error = %e, "Failed to send actions to web UI");
            false
        }
    }
}

/// Build the bundle presenting `actions` of `repository`.
///
/// Actions starting with `:` are internal and not presented. Colon separated
/// segments become groups, the last segment the name.
pub fn build_bundle<'a>(repository: &str, actions: impl IntoIterator<Item = &'a String>) -> ActionBundle {
    let actions = actions
        .into_iter()
        .filter(|action| !action.is_empty() && !action.starts_with(':'))
        .map(|action| {
            let mut groups = vec![TRIGGER_GROUP.to_string()];
            let mut parts: Vec<&str> = action.trim_matches(':').split(':').collect();
            let name = parts.pop().unwrap_or_default().to_string();
            groups.extend(parts.into_iter().map(String::from));

            Action {
                id: format!("trigger:{}", action),
                name,
                groups,
                message: Message::action(action.as_str()),
            }
        })
        .collect();

    ActionBundle {
        bundle_id: repository_bundle_id(repository),
        actions,
    }
}

/// Collects the actions a repository's pipelines react to.
///
/// The bundle is published on close; an aborted pass publishes an empty bundle.
pub struct WebUiActionCollector {
    dispatch: Arc<dyn MessageDispatch>,
    repository: String,
    actions: BTreeSet<String>,
    done: bool,
}

impl WebUiActionCollector {
    pub fn new(dispatch: Arc<dyn MessageDispatch>, repository: impl Into<String>) -> Self {
        Self {
            dispatch,
            repository: repository.into(),
            actions: BTreeSet::new(),
            done: false,
        }
    }
}

#[async_trait]
impl ScanVisitor for WebUiActionCollector {
    fn scan(&mut self, document: &SourceDocument) -> ScanResult<()> {
        let Document::Pipeline(pipeline) = &document.document else {
            return Ok(());
        };

        let conditions = std::iter::once(&pipeline.when).chain(pipeline.steps.iter().map(|s| &s.when));
        for when in conditions {
            if let Some(condition) = when.get(ACTION_DIMENSION) {
                self.actions.extend(condition.include.iter().cloned());
            }
        }
        Ok(())
    }

    fn done(&mut self) {
        self.done = true;
    }

    async fn close(&mut self) {
        let bundle = if self.done {
            build_bundle(&self.repository, &self.actions)
        } else {
            ActionBundle::empty_for_repository(&self.repository)
        };
        publish_bundle(self.dispatch.as_ref(), bundle).await;
    }
}
