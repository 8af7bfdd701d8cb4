//! Controller onboarding CLI
//!
//! The `pano-onboard` command registers firewall serial numbers on the active
//! node of a redundant management-controller pair.
//!
//! ## Commands
//!
//! - `onboard`: register missing devices and commit (default)
//! - `check`: report which devices would be registered, without writing
//! - `status`: show the HA state of every configured controller

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{debug, Level};

use onboard_core::{
    ActiveNodeResolver, ConfigOverrides, OnboardConfig, OnboardError, OnboardingOrchestrator,
    RunMode, SurveyReport,
};
use onboard_xapi::{ControllerConnector, XapiConnector};

/// Config file read when `--config` is not given.
const DEFAULT_CONFIG: &str = "onboard.toml";

/// Exit status for any failure other than a missing active controller.
const EXIT_ERROR: u8 = 1;
/// Exit status when no configured controller reports itself active.
const EXIT_NO_ACTIVE: u8 = 2;

#[derive(Parser)]
#[command(name = "pano-onboard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Register firewalls on the active management controller", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Path to the TOML configuration file
    #[arg(short, long, global = true, env = "ONBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Format of the report printed on stdout
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    #[command(flatten)]
    overrides: OverrideArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Debug, Default)]
struct OverrideArgs {
    /// Controller address, in preference order (repeat for each node)
    #[arg(long = "controller", global = true)]
    controllers: Vec<String>,

    /// Device serial number to register (repeatable)
    #[arg(long = "device", global = true)]
    devices: Vec<String>,

    /// Login user
    #[arg(long, global = true)]
    username: Option<String>,

    /// Login password
    #[arg(long, global = true, env = "ONBOARD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// API key, used instead of logging in with a password
    #[arg(long, global = true, env = "ONBOARD_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

impl From<OverrideArgs> for ConfigOverrides {
    fn from(args: OverrideArgs) -> Self {
        ConfigOverrides {
            controllers: args.controllers,
            devices: args.devices,
            username: args.username,
            password: args.password,
            api_key: args.api_key,
        }
    }
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Register missing devices on the active controller and commit
    Onboard,
    /// Show which devices would be registered; writes nothing
    Check,
    /// Show the HA state of every configured controller
    Status,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    onboard_core::init_tracing(cli.json, level);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            let (line, code) = diagnostic(&err);
            eprintln!("{line}");
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let command = cli.command.unwrap_or(Commands::Onboard);
    let mut config = load_config(cli.config.as_deref())?;
    config.apply_overrides(cli.overrides.into());

    match command {
        Commands::Status => {
            config.validate_access()?;
            let connector = connector(&config)?;
            let active_found = cmd_status(&config, connector, cli.output).await?;
            Ok(if active_found {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_NO_ACTIVE)
            })
        }
        Commands::Onboard | Commands::Check => {
            let mode = if command == Commands::Check {
                RunMode::CheckOnly
            } else {
                RunMode::Apply
            };
            let config = config.into_shared()?;
            let connector = connector(&config)?;
            cmd_onboard(config, connector, mode, cli.output).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<OnboardConfig> {
    match path {
        Some(path) => OnboardConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => OnboardConfig::load(Path::new(DEFAULT_CONFIG))
            .with_context(|| format!("Failed to load config from {DEFAULT_CONFIG}")),
        None => {
            debug!("no config file; using command-line values only");
            Ok(OnboardConfig::default())
        }
    }
}

fn connector(config: &OnboardConfig) -> Result<Arc<dyn ControllerConnector>> {
    let connector = XapiConnector::new(config.credentials.clone(), config.client.clone())
        .context("Failed to build HTTP client")?;
    Ok(Arc::new(connector))
}

async fn cmd_onboard(
    config: Arc<OnboardConfig>,
    connector: Arc<dyn ControllerConnector>,
    mode: RunMode,
    output: OutputFormat,
) -> Result<()> {
    let mut orchestrator = OnboardingOrchestrator::new(config, connector).with_mode(mode);
    let report = orchestrator.run().await?;
    emit(&report, &report.render(), output)
}

/// Returns whether any controller reported an active state.
async fn cmd_status(
    config: &OnboardConfig,
    connector: Arc<dyn ControllerConnector>,
    output: OutputFormat,
) -> Result<bool> {
    let candidates = ActiveNodeResolver::new(connector)
        .survey(&config.controllers)
        .await;
    let survey = SurveyReport::new(candidates);
    emit(&survey, &survey.render(), output)?;
    Ok(survey.active.is_some())
}

fn emit<T: Serialize>(value: &T, text: &str, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Text => println!("{text}"),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

/// The one-line stderr diagnostic for `err` and the exit status to use.
///
/// Failures after registrations were written name the devices still
/// waiting in the candidate configuration.
fn diagnostic(err: &anyhow::Error) -> (String, u8) {
    match err.downcast_ref::<OnboardError>() {
        Some(OnboardError::NoActiveNode { summary }) => (
            format!("-- Couldn't find the active controller: {summary}"),
            EXIT_NO_ACTIVE,
        ),
        Some(OnboardError::Uncommitted { pending, cause }) => {
            let ids: Vec<String> = pending.iter().map(ToString::to_string).collect();
            let line = format!(
                "-- Error: {cause}; not committed: {}. Commit or revert them on the controller",
                ids.join(", ")
            );
            (line, EXIT_ERROR)
        }
        _ => (format!("-- Error: {err:#}"), EXIT_ERROR),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onboard_xapi::fakes::{FakeConnector, FakeController};
    use std::io::Write;

    fn fake_pair(first: &str, second: &str) -> Arc<FakeConnector> {
        Arc::new(
            FakeConnector::new()
                .with_node(FakeController::new("10.0.0.1").with_ha_state(first))
                .with_node(FakeController::new("10.0.0.2").with_ha_state(second)),
        )
    }

    fn shared_config() -> Arc<OnboardConfig> {
        let mut config = OnboardConfig::default();
        config.apply_overrides(ConfigOverrides {
            controllers: vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()],
            devices: vec!["SN001".to_string()],
            username: Some("admin".to_string()),
            password: Some("secret".to_string()),
            api_key: None,
        });
        config.into_shared().unwrap()
    }

    #[test]
    fn test_no_subcommand_defaults_to_onboard() {
        let cli = Cli::try_parse_from(["pano-onboard"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.command.unwrap_or(Commands::Onboard), Commands::Onboard);
        assert_eq!(cli.output, OutputFormat::Text);
    }

    #[test]
    fn test_repeated_overrides_after_subcommand() {
        let cli = Cli::try_parse_from([
            "pano-onboard",
            "check",
            "--controller",
            "10.0.0.1",
            "--controller",
            "10.0.0.2",
            "--device",
            "SN001",
            "--username",
            "ops",
            "--output",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.command, Some(Commands::Check));
        assert_eq!(cli.overrides.controllers, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(cli.overrides.devices, vec!["SN001"]);
        assert_eq!(cli.overrides.username.as_deref(), Some("ops"));
        assert_eq!(cli.output, OutputFormat::Json);
    }

    #[test]
    fn test_unknown_output_format_rejected() {
        assert!(Cli::try_parse_from(["pano-onboard", "--output", "yaml"]).is_err());
    }

    #[test]
    fn test_load_config_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"
controllers = ["10.0.0.1", "10.0.0.2"]
devices = ["SN001"]
[credentials]
username = "admin"
api_key = "LUFRPT1key"
"#,
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.controllers.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));
    }

    #[tokio::test]
    async fn test_cmd_onboard_registers_on_active_node() {
        let fake = fake_pair("passive", "active");
        cmd_onboard(
            shared_config(),
            fake.clone(),
            RunMode::Apply,
            OutputFormat::Json,
        )
        .await
        .unwrap();

        let active = fake.node("10.0.0.2").unwrap();
        assert_eq!(active.devices(), vec!["SN001".to_string()]);
        assert_eq!(active.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_cmd_onboard_without_active_node_is_no_active_error() {
        let fake = fake_pair("suspended", "suspended");
        let err = cmd_onboard(shared_config(), fake, RunMode::Apply, OutputFormat::Text)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<OnboardError>(),
            Some(OnboardError::NoActiveNode { .. })
        ));

        let (line, code) = diagnostic(&err);
        assert!(line.starts_with("-- Couldn't find the active controller: "));
        assert!(line.contains("10.0.0.1"));
        assert!(line.contains("10.0.0.2"));
        assert!(!line.contains('\n'));
        assert_eq!(code, EXIT_NO_ACTIVE);
    }

    #[tokio::test]
    async fn test_diagnostic_lists_uncommitted_devices() {
        let node = FakeController::new("10.0.0.1")
            .with_ha_state("active")
            .rejecting_device("SN002", "SN002 is not a valid serial");
        let fake = Arc::new(
            FakeConnector::new()
                .with_node(node)
                .with_node(FakeController::new("10.0.0.2").with_ha_state("passive")),
        );
        let mut config = OnboardConfig::default();
        config.apply_overrides(ConfigOverrides {
            controllers: vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()],
            devices: vec!["SN001".to_string(), "SN002".to_string()],
            username: Some("admin".to_string()),
            password: Some("secret".to_string()),
            api_key: None,
        });
        let config = config.into_shared().unwrap();

        let err = cmd_onboard(config, fake.clone(), RunMode::Apply, OutputFormat::Text)
            .await
            .unwrap_err();

        let (line, code) = diagnostic(&err);
        assert!(line.starts_with("-- Error: 10.0.0.1: SN002 is not a valid serial"));
        assert!(line.contains("not committed: SN001."));
        assert!(!line.contains("SN002."));
        assert_eq!(code, EXIT_ERROR);
        assert_eq!(fake.node("10.0.0.1").unwrap().commit_count(), 0);
    }

    #[test]
    fn test_diagnostic_for_other_errors() {
        let err = anyhow::Error::new(OnboardError::Config("no devices configured".to_string()))
            .context("Failed to load config from onboard.toml");

        let (line, code) = diagnostic(&err);
        assert_eq!(
            line,
            "-- Error: Failed to load config from onboard.toml: \
             invalid configuration: no devices configured"
        );
        assert_eq!(code, EXIT_ERROR);
    }

    #[tokio::test]
    async fn test_cmd_status_reports_active_presence() {
        let config = shared_config();

        let found = cmd_status(&config, fake_pair("passive", "active"), OutputFormat::Text)
            .await
            .unwrap();
        assert!(found);

        let fake = fake_pair("passive", "initial");
        let found = cmd_status(&config, fake, OutputFormat::Json).await.unwrap();
        assert!(!found);
    }
}
