//! Scoped partial commit of this run's registrations.
//!
//! The commit is limited to one administrator's pending changes and excludes
//! templates, template stacks, log collectors, log-collector groups and
//! shared objects, so edits other operators have in flight are never
//! published by this workflow.

use serde::Serialize;

use onboard_xapi::escape_xml;

use crate::error::{OnboardError, OnboardResult};
use crate::obs;
use crate::resolver::ActiveController;

pub const DEFAULT_COMMIT_DESCRIPTION: &str = "Add Firewall Serial Numbers";

/// A partial commit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialCommit {
    pub admin: String,
    pub description: String,
}

impl PartialCommit {
    pub fn new(admin: &str, description: &str) -> Self {
        PartialCommit {
            admin: admin.to_string(),
            description: description.to_string(),
        }
    }

    /// The `<commit>` command sent to the controller.
    pub fn to_xml(&self) -> String {
        format!(
            "<commit><partial>\
             <admin><member>{}</member></admin>\
             <no-template/><no-template-stack/>\
             <no-log-collector-group/><no-log-collector/>\
             <shared-object>excluded</shared-object>\
             </partial><description>{}</description></commit>",
            escape_xml(&self.admin),
            escape_xml(&self.description)
        )
    }
}

/// Final status of the run's commit with its messages in controller order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitResult {
    pub status: String,
    pub job_id: Option<String>,
    pub messages: Vec<String>,
}

/// Issues the run's single partial commit.
#[derive(Debug, Clone)]
pub struct CommitCoordinator {
    description: String,
}

impl CommitCoordinator {
    pub fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
        }
    }

    /// Commit `acting_admin`'s pending changes and wait for completion.
    ///
    /// A non-OK final status is an error carrying the controller's messages.
    pub async fn commit(
        &self,
        controller: &ActiveController,
        acting_admin: &str,
    ) -> OnboardResult<CommitResult> {
        let request = PartialCommit::new(acting_admin, &self.description);
        obs::emit_commit_started(acting_admin);

        let resp = controller.client().commit(&request.to_xml()).await?;
        obs::emit_commit_finished(&resp.status, resp.messages.len());

        if !resp.succeeded() {
            return Err(OnboardError::Commit {
                host: controller.endpoint().address().to_string(),
                status: resp.status,
                messages: resp.messages,
            });
        }
        Ok(CommitResult {
            status: resp.status,
            job_id: resp.job_id,
            messages: resp.messages,
        })
    }
}

impl Default for CommitCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_COMMIT_DESCRIPTION)
    }
}
