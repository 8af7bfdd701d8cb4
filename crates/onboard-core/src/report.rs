//! Run summaries for the operator.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use onboard_xapi::ControllerEndpoint;
use serde::Serialize;

use crate::commit::CommitResult;
use crate::orchestrator::RunMode;
use crate::registry::{DeviceAction, RegistrationOutcome};
use crate::resolver::{ActiveNodeResolver, CandidateReport};

/// Everything one onboarding run did, in configured device order.
#[derive(Debug, Clone, Serialize)]
pub struct OnboardReport {
    pub run_id: String,
    pub mode: RunMode,
    pub controller: ControllerEndpoint,
    pub hostname: String,
    pub outcomes: Vec<RegistrationOutcome>,
    pub commit: Option<CommitResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl OnboardReport {
    fn count(&self, action: DeviceAction) -> usize {
        self.outcomes.iter().filter(|o| o.action == action).count()
    }

    pub fn added_count(&self) -> usize {
        self.count(DeviceAction::Registered)
    }

    pub fn present_count(&self) -> usize {
        self.count(DeviceAction::Skipped)
    }

    pub fn planned_count(&self) -> usize {
        self.count(DeviceAction::Planned)
    }

    /// Multi-line text summary.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Connected to the active controller: {} ({})",
            self.hostname, self.controller
        );

        for outcome in &self.outcomes {
            let id = &outcome.identifier;
            let _ = match (&outcome.action, &outcome.message) {
                (DeviceAction::Skipped, _) => {
                    writeln!(out, "-- Serial number {id} already present")
                }
                (DeviceAction::Registered, Some(message)) => {
                    writeln!(out, "-- Added serial number {id}: {message}")
                }
                (DeviceAction::Registered, None) => writeln!(out, "-- Added serial number {id}"),
                (DeviceAction::Planned, _) => {
                    writeln!(out, "-- Serial number {id} not present (would be added)")
                }
            };
        }

        match (&self.commit, self.mode) {
            (Some(commit), _) => {
                let job = commit
                    .job_id
                    .as_deref()
                    .map(|j| format!(" (job {j})"))
                    .unwrap_or_default();
                let _ = writeln!(out, "Commit status: {}{}", commit.status, job);
                for message in &commit.messages {
                    let _ = writeln!(out, "   {message}");
                }
            }
            (None, RunMode::Apply) => {
                let _ = writeln!(out, "Nothing to commit");
            }
            (None, RunMode::CheckOnly) => {}
        }

        let _ = match self.mode {
            RunMode::Apply => write!(
                out,
                "Summary: {} added, {} already present",
                self.added_count(),
                self.present_count()
            ),
            RunMode::CheckOnly => write!(
                out,
                "Summary: {} to add, {} already present",
                self.planned_count(),
                self.present_count()
            ),
        };
        out
    }
}

impl std::fmt::Display for OnboardReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

/// HA state of every configured controller and which one would be used.
#[derive(Debug, Clone, Serialize)]
pub struct SurveyReport {
    pub candidates: Vec<CandidateReport>,
    pub active: Option<ControllerEndpoint>,
}

impl SurveyReport {
    pub fn new(candidates: Vec<CandidateReport>) -> Self {
        let active = ActiveNodeResolver::select(&candidates).map(|c| c.endpoint.clone());
        SurveyReport { candidates, active }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for candidate in &self.candidates {
            let marker = if Some(&candidate.endpoint) == self.active.as_ref() {
                "*"
            } else {
                " "
            };
            let _ = writeln!(out, "{marker} {}", candidate.describe());
        }
        let _ = match &self.active {
            Some(endpoint) => write!(out, "Active controller: {endpoint}"),
            None => write!(out, "Couldn't find the active controller"),
        };
        out
    }
}

impl std::fmt::Display for SurveyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}
