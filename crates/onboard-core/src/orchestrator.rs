//! End-to-end onboarding workflow.
//!
//! ```text
//! Init -> Resolving -> (Checking -> [Registering])* -> [Committing] -> Done
//! ```
//!
//! Devices are processed one at a time in configured order over the single
//! active-controller connection. A device is registered only after a lookup
//! found it absent, and the partial commit runs at most once, after the last
//! device, and only if something was registered.

use std::sync::Arc;

use chrono::Utc;
use onboard_xapi::ControllerConnector;
use serde::Serialize;
use tracing::Instrument;

use crate::commit::CommitCoordinator;
use crate::config::{DeviceId, OnboardConfig};
use crate::error::{OnboardError, OnboardResult};
use crate::obs;
use crate::registry::{DeviceRegistry, Presence, RegistrationOutcome};
use crate::report::OnboardReport;
use crate::resolver::ActiveNodeResolver;

/// Whether the run may write to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Register missing devices and commit
    #[default]
    Apply,
    /// Report what would be registered; no writes, no commit
    CheckOnly,
}

/// Where the workflow currently is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "device", rename_all = "snake_case")]
pub enum OnboardPhase {
    Init,
    Resolving,
    Checking(DeviceId),
    Registering(DeviceId),
    Committing,
    Done,
    Failed,
}

impl std::fmt::Display for OnboardPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OnboardPhase::Init => write!(f, "init"),
            OnboardPhase::Resolving => write!(f, "resolving"),
            OnboardPhase::Checking(id) => write!(f, "checking {id}"),
            OnboardPhase::Registering(id) => write!(f, "registering {id}"),
            OnboardPhase::Committing => write!(f, "committing"),
            OnboardPhase::Done => write!(f, "done"),
            OnboardPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Drives one onboarding run from configuration to report.
pub struct OnboardingOrchestrator {
    config: Arc<OnboardConfig>,
    resolver: ActiveNodeResolver,
    coordinator: CommitCoordinator,
    mode: RunMode,
    phase: OnboardPhase,
    run_id: String,
}

impl OnboardingOrchestrator {
    pub fn new(config: Arc<OnboardConfig>, connector: Arc<dyn ControllerConnector>) -> Self {
        let coordinator = CommitCoordinator::new(&config.commit.description);
        Self {
            config,
            resolver: ActiveNodeResolver::new(connector),
            coordinator,
            mode: RunMode::Apply,
            phase: OnboardPhase::Init,
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn phase(&self) -> &OnboardPhase {
        &self.phase
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Execute the workflow. The phase is `Done` on success, `Failed` otherwise.
    pub async fn run(&mut self) -> OnboardResult<OnboardReport> {
        let span = obs::run_span(&self.run_id);
        let result = self.drive().instrument(span).await;
        if result.is_err() {
            self.enter(OnboardPhase::Failed);
        }
        result
    }

    fn enter(&mut self, phase: OnboardPhase) {
        obs::emit_phase(&phase);
        self.phase = phase;
    }

    async fn drive(&mut self) -> OnboardResult<OnboardReport> {
        let started_at = Utc::now();
        let config = Arc::clone(&self.config);

        self.enter(OnboardPhase::Resolving);
        let controller = self.resolver.resolve_any(&config.controllers).await?;
        let registry = DeviceRegistry::new(&controller);

        let mut outcomes = Vec::with_capacity(config.devices.len());
        for id in &config.devices {
            let outcome = self
                .process(&registry, id)
                .await
                .map_err(|err| with_pending(err, &outcomes))?;
            outcomes.push(outcome);
        }

        let commit = if outcomes.iter().any(RegistrationOutcome::needs_commit) {
            self.enter(OnboardPhase::Committing);
            let result = self
                .coordinator
                .commit(&controller, config.acting_admin())
                .await
                .map_err(|err| with_pending(err, &outcomes))?;
            Some(result)
        } else {
            None
        };

        self.enter(OnboardPhase::Done);
        let report = OnboardReport {
            run_id: self.run_id.clone(),
            mode: self.mode,
            controller: controller.endpoint().clone(),
            hostname: controller.hostname().to_string(),
            outcomes,
            commit,
            started_at,
            finished_at: Utc::now(),
        };
        obs::emit_run_finished(
            report.added_count(),
            report.present_count(),
            report.commit.is_some(),
        );
        Ok(report)
    }

    /// Check one device and, when applying, register it if absent.
    async fn process(
        &mut self,
        registry: &DeviceRegistry<'_>,
        id: &DeviceId,
    ) -> OnboardResult<RegistrationOutcome> {
        self.enter(OnboardPhase::Checking(id.clone()));
        if self.mode == RunMode::CheckOnly {
            return registry.check(id).await;
        }
        match registry.lookup(id).await? {
            Presence::Found => Ok(RegistrationOutcome::present(id.clone())),
            Presence::NotFound => {
                self.enter(OnboardPhase::Registering(id.clone()));
                let message = registry.register(id).await?;
                Ok(RegistrationOutcome::registered(id.clone(), message))
            }
        }
    }
}

/// Attach the devices this run already wrote to `err`, if any.
fn with_pending(err: OnboardError, outcomes: &[RegistrationOutcome]) -> OnboardError {
    let pending: Vec<DeviceId> = outcomes
        .iter()
        .filter(|o| o.needs_commit())
        .map(|o| o.identifier.clone())
        .collect();
    if pending.is_empty() {
        return err;
    }
    let ids: Vec<String> = pending.iter().map(DeviceId::to_string).collect();
    obs::emit_uncommitted(&ids, &err);
    OnboardError::Uncommitted {
        pending,
        cause: Box::new(err),
    }
}
