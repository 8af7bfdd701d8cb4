//! Active-node discovery.
//!
//! Candidates form an ordered preference list. Each one is inspected on its
//! own connection (concurrently; there is no shared state between them),
//! classified ACTIVE / NOT-ACTIVE, and the first ACTIVE candidate in
//! configured order wins. The winner then gets a fresh connection that the
//! rest of the run uses.
//!
//! An inspection failure never aborts discovery: the node simply counts as
//! not active. Only "no candidate is active" is fatal.

use std::sync::Arc;

use futures::future::join_all;
use onboard_xapi::{ControllerClient, ControllerConnector, ControllerEndpoint};
use serde::Serialize;

use crate::error::{OnboardError, OnboardResult};
use crate::ha::{HaState, HaStateInspector};
use crate::obs;

/// Operational query for system information.
pub const SYSTEM_INFO_CMD: &str = "show system info";

/// Where the hostname lives in the system info response.
pub const HOSTNAME_PATH: &str = "result/system/hostname";

/// Outcome of inspecting one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateReport {
    pub endpoint: ControllerEndpoint,
    /// Reported HA state, when the inspection succeeded
    pub state: Option<HaState>,
    /// Why the inspection failed, when it did
    pub error: Option<String>,
}

impl CandidateReport {
    fn from_inspection(endpoint: ControllerEndpoint, result: OnboardResult<HaState>) -> Self {
        match result {
            Ok(state) => {
                obs::emit_candidate_inspected(
                    endpoint.address(),
                    state.as_str(),
                    state.is_active(),
                );
                CandidateReport {
                    endpoint,
                    state: Some(state),
                    error: None,
                }
            }
            Err(err) => {
                obs::emit_candidate_unreachable(endpoint.address(), &err);
                CandidateReport {
                    endpoint,
                    state: None,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    /// ACTIVE classification; failed inspections are never active.
    pub fn is_active(&self) -> bool {
        self.state.as_ref().map(HaState::is_active).unwrap_or(false)
    }

    /// One-line description, e.g. `10.0.0.1: passive`.
    pub fn describe(&self) -> String {
        match (&self.state, &self.error) {
            (Some(state), _) => format!("{}: {}", self.endpoint, state),
            (None, Some(err)) => format!("{}: not inspected ({})", self.endpoint, err),
            (None, None) => format!("{}: not inspected", self.endpoint),
        }
    }
}

/// The controller node selected for this run, with its open connection.
pub struct ActiveController {
    endpoint: ControllerEndpoint,
    client: Arc<dyn ControllerClient>,
    hostname: String,
    state: HaState,
}

impl ActiveController {
    pub fn endpoint(&self) -> &ControllerEndpoint {
        &self.endpoint
    }

    pub fn client(&self) -> &dyn ControllerClient {
        self.client.as_ref()
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn state(&self) -> &HaState {
        &self.state
    }
}

impl std::fmt::Debug for ActiveController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveController")
            .field("endpoint", &self.endpoint)
            .field("hostname", &self.hostname)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Finds the active node among an ordered list of candidates.
pub struct ActiveNodeResolver {
    connector: Arc<dyn ControllerConnector>,
    inspector: HaStateInspector,
}

impl ActiveNodeResolver {
    pub fn new(connector: Arc<dyn ControllerConnector>) -> Self {
        let inspector = HaStateInspector::new(Arc::clone(&connector));
        Self {
            connector,
            inspector,
        }
    }

    /// Inspect every candidate. Reports come back in candidate order.
    pub async fn survey(&self, candidates: &[ControllerEndpoint]) -> Vec<CandidateReport> {
        let inspections = candidates.iter().map(|endpoint| async move {
            let result = self.inspector.inspect(endpoint).await;
            CandidateReport::from_inspection(endpoint.clone(), result)
        });
        join_all(inspections).await
    }

    /// First ACTIVE report in order, if any.
    pub fn select(reports: &[CandidateReport]) -> Option<&CandidateReport> {
        let chosen = reports.iter().find(|r| r.is_active())?;
        let active_count = reports.iter().filter(|r| r.is_active()).count();
        if active_count > 1 {
            obs::emit_split_brain(chosen.endpoint.address(), active_count);
        }
        Some(chosen)
    }

    /// Resolve an HA pair, preferring `primary` when both are active.
    pub async fn resolve(
        &self,
        primary: &ControllerEndpoint,
        secondary: &ControllerEndpoint,
    ) -> OnboardResult<ActiveController> {
        self.resolve_any(&[primary.clone(), secondary.clone()])
            .await
    }

    /// Resolve any ordered list of candidates.
    pub async fn resolve_any(
        &self,
        candidates: &[ControllerEndpoint],
    ) -> OnboardResult<ActiveController> {
        let reports = self.survey(candidates).await;
        let winner = Self::select(&reports).ok_or_else(|| no_active_node(&reports))?;
        self.attach(winner).await
    }

    async fn attach(&self, winner: &CandidateReport) -> OnboardResult<ActiveController> {
        let client = self.connector.connect(&winner.endpoint).await?;
        let info = client.op(SYSTEM_INFO_CMD).await?;
        let hostname = info.require_text(HOSTNAME_PATH)?;
        obs::emit_controller_resolved(winner.endpoint.address(), &hostname);

        Ok(ActiveController {
            endpoint: winner.endpoint.clone(),
            client,
            hostname,
            state: winner.state.clone().unwrap_or(HaState::Active),
        })
    }
}

fn no_active_node(reports: &[CandidateReport]) -> OnboardError {
    let summary = if reports.is_empty() {
        "no controllers configured".to_string()
    } else {
        reports
            .iter()
            .map(CandidateReport::describe)
            .collect::<Vec<_>>()
            .join(", ")
    };
    obs::emit_no_active_node(&summary);
    OnboardError::NoActiveNode { summary }
}
