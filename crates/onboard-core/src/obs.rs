//! Structured observability hooks for onboarding runs.
//!
//! Every run executes inside a span carrying its `run_id`; the functions
//! below emit one named event per workflow milestone so log pipelines can
//! key on `event=...` instead of message text.
//!
//! Verbosity follows `ONBOARD_LOG` (or `RUST_LOG`); see [`crate::telemetry`].

use tracing::{info, warn};

/// Span that tags every event of one run with its `run_id`.
///
/// Attach it with `tracing::Instrument` so it survives `.await` points.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("onboard.run", run_id = %run_id)
}

/// Emit event: the workflow moved to a new phase.
pub fn emit_phase(phase: &dyn std::fmt::Display) {
    tracing::debug!(event = "onboard.phase", phase = %phase);
}

/// Emit event: one candidate node was inspected.
pub fn emit_candidate_inspected(address: &str, state: &str, active: bool) {
    info!(event = "ha.inspected", controller = %address, state = %state, active = active);
}

/// Emit event: a candidate could not be inspected and counts as not active.
pub fn emit_candidate_unreachable(address: &str, error: &dyn std::fmt::Display) {
    warn!(event = "ha.inspect_failed", controller = %address, error = %error);
}

/// Emit event: more than one candidate claims to be active.
pub fn emit_split_brain(chosen: &str, active_count: usize) {
    warn!(
        event = "ha.split_brain",
        chosen = %chosen,
        active_count = active_count,
        "multiple controllers report an active state; preferring the first"
    );
}

/// Emit event: the active controller was selected and reached.
pub fn emit_controller_resolved(address: &str, hostname: &str) {
    info!(event = "onboard.resolved", controller = %address, hostname = %hostname);
}

/// Emit event: no candidate reported an active state.
pub fn emit_no_active_node(summary: &str) {
    warn!(event = "onboard.no_active_node", candidates = %summary);
}

/// Emit event: presence lookup finished for a device.
pub fn emit_device_checked(device: &str, present: bool) {
    info!(event = "device.checked", device = %device, present = present);
}

/// Emit event: a device entry was created on the controller.
pub fn emit_device_registered(device: &str, message: &str) {
    info!(event = "device.registered", device = %device, message = %message);
}

/// Emit event: partial commit submitted.
pub fn emit_commit_started(admin: &str) {
    info!(event = "commit.started", admin = %admin);
}

/// Emit event: partial commit finished.
pub fn emit_commit_finished(status: &str, message_count: usize) {
    info!(event = "commit.finished", status = %status, messages = message_count);
}

/// Emit event: the run failed with registrations still uncommitted.
pub fn emit_uncommitted(pending: &[String], error: &dyn std::fmt::Display) {
    warn!(
        event = "onboard.uncommitted",
        pending = %pending.join(","),
        error = %error,
        "devices were added to the candidate configuration but not committed"
    );
}

/// Emit event: run finished.
pub fn emit_run_finished(added: usize, present: usize, committed: bool) {
    info!(
        event = "onboard.finished",
        added = added,
        already_present = present,
        committed = committed,
    );
}
