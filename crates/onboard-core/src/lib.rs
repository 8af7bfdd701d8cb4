//! onboard-core: controller onboarding workflow
//!
//! Finds the active node of a redundant controller pair, registers device
//! serial numbers that are not yet known to it, and publishes only those
//! changes with a scoped partial commit.

pub mod commit;
pub mod config;
pub mod error;
pub mod ha;
pub mod obs;
pub mod orchestrator;
pub mod registry;
pub mod report;
pub mod resolver;
pub mod telemetry;

pub use commit::{CommitCoordinator, CommitResult, PartialCommit, DEFAULT_COMMIT_DESCRIPTION};
pub use config::{CommitSettings, ConfigOverrides, DeviceId, OnboardConfig};
pub use error::{OnboardError, OnboardResult};
pub use ha::{HaState, HaStateInspector};
pub use orchestrator::{OnboardPhase, OnboardingOrchestrator, RunMode};
pub use registry::{DeviceAction, DeviceRegistry, Presence, RegistrationOutcome};
pub use report::{OnboardReport, SurveyReport};
pub use resolver::{ActiveController, ActiveNodeResolver, CandidateReport};
pub use telemetry::init_tracing;
