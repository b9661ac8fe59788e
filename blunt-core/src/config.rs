//! Run configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.blunt/
//!   config.yaml   (optional, every field has a default)
//! ```
//!
//! # API pattern
//!
//! - `load_at(path)`: explicit file; missing file is an error
//! - `load_or_default_at(home)`: `<home>/.blunt/config.yaml` if present
//! - `load_or_default()`: derives home from `dirs::home_dir()`
//!
//! Tests must NEVER call the no-arg wrapper; always use `_at`.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{DaemonStatus, EXIT_DIAGNOSTICS};

pub const CONFIG_DIR: &str = ".blunt";
pub const CONFIG_FILE: &str = "config.yaml";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A program plus the arguments that always precede the forwarded ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Bare program names resolve inside `bin_dir` when one is configured;
    /// anything with a path component is used as given.
    pub fn resolve_program(&self, bin_dir: Option<&Path>) -> PathBuf {
        let program = Path::new(&self.program);
        let bare = matches!(
            program.components().collect::<Vec<_>>().as_slice(),
            [Component::Normal(_)]
        );
        match bin_dir {
            Some(dir) if bare => dir.join(program),
            _ => program.to_path_buf(),
        }
    }
}

/// How parse problems in checker output are surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParseWarningMode {
    Skip,
    #[default]
    Warn,
}

/// A daemon failure message fragment and what it says about the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonSignature {
    /// Case-insensitive substring searched for in stdout and stderr.
    pub pattern: String,
    pub status: DaemonStatus,
}

impl DaemonSignature {
    pub fn new(pattern: &str, status: DaemonStatus) -> Self {
        Self {
            pattern: pattern.to_string(),
            status,
        }
    }
}

/// Signatures matching dmypy's wording at the time of writing.
pub fn default_signatures() -> Vec<DaemonSignature> {
    vec![
        DaemonSignature::new("daemon is stale", DaemonStatus::Stale),
        DaemonSignature::new("needs restarting", DaemonStatus::Stale),
        DaemonSignature::new("Restarting: configuration changed", DaemonStatus::Stale),
        DaemonSignature::new("Daemon crashed!", DaemonStatus::Crashed),
        DaemonSignature::new("Daemon has died", DaemonStatus::Crashed),
        DaemonSignature::new("Traceback (most recent call last)", DaemonStatus::Crashed),
        DaemonSignature::new("could not connect", DaemonStatus::NotRunning),
        DaemonSignature::new("Daemon is not running", DaemonStatus::NotRunning),
        DaemonSignature::new("No status file found", DaemonStatus::NotRunning),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub enabled: bool,
    /// `<program> <args...> <flags...> <files...>` runs one daemon check.
    pub command: CommandSpec,
    pub status_args: Vec<String>,
    pub kill_args: Vec<String>,
    /// Probe liveness first and skip the daemon when it is clearly down.
    pub probe_before_race: bool,
    pub probe_timeout_secs: u64,
    /// Kill the daemon after a rejected result so the next run starts fresh.
    pub kill_on_failure: bool,
    /// How long a losing daemon may keep running after the full scan wins.
    pub grace_ms: u64,
    pub signatures: Vec<DaemonSignature>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: CommandSpec::new("dmypy", &["run", "--"]),
            status_args: vec!["status".to_string()],
            kill_args: vec!["kill".to_string()],
            probe_before_race: false,
            probe_timeout_secs: 5,
            kill_on_failure: true,
            grace_ms: 1000,
            signatures: default_signatures(),
        }
    }
}

impl DaemonConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// The daemon program with different leading arguments (`status`, `kill`).
    pub fn control_command(&self, args: &[String]) -> CommandSpec {
        CommandSpec {
            program: self.command.program.clone(),
            args: args.to_vec(),
        }
    }
}

/// Everything a race needs, threaded explicitly into the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluntConfig {
    pub full_scan: CommandSpec,
    pub daemon: DaemonConfig,
    pub bin_dir: Option<PathBuf>,
    pub full_scan_timeout_secs: Option<u64>,
    pub daemon_timeout_secs: Option<u64>,
    pub global_timeout_secs: Option<u64>,
    /// The checkers' "ran fine, found issues" exit code.
    pub diagnostics_exit_code: i32,
    /// Only trust a daemon run whose stdout ends with a summary line.
    pub require_summary: bool,
    pub parse_warnings: ParseWarningMode,
}

impl Default for BluntConfig {
    fn default() -> Self {
        Self {
            full_scan: CommandSpec::new("mypy", &[]),
            daemon: DaemonConfig::default(),
            bin_dir: None,
            full_scan_timeout_secs: None,
            daemon_timeout_secs: None,
            global_timeout_secs: None,
            diagnostics_exit_code: EXIT_DIAGNOSTICS,
            require_summary: true,
            parse_warnings: ParseWarningMode::default(),
        }
    }
}

impl BluntConfig {
    pub fn full_scan_timeout(&self) -> Option<Duration> {
        self.full_scan_timeout_secs.map(Duration::from_secs)
    }

    pub fn daemon_timeout(&self) -> Option<Duration> {
        self.daemon_timeout_secs.map(Duration::from_secs)
    }

    pub fn global_timeout(&self) -> Option<Duration> {
        self.global_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.full_scan.program.trim().is_empty() {
            return Err(ConfigError::Invalid("full_scan.program is empty".into()));
        }
        if self.daemon.enabled && self.daemon.command.program.trim().is_empty() {
            return Err(ConfigError::Invalid("daemon.command.program is empty".into()));
        }
        if self.diagnostics_exit_code == 0 {
            return Err(ConfigError::Invalid(
                "diagnostics_exit_code must be non-zero".into(),
            ));
        }
        for signature in &self.daemon.signatures {
            if signature.pattern.trim().is_empty() {
                return Err(ConfigError::Invalid("daemon signature with empty pattern".into()));
            }
            if signature.status == DaemonStatus::Running {
                return Err(ConfigError::Invalid(format!(
                    "daemon signature '{}' cannot map to status 'running'",
                    signature.pattern
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// `<home>/.blunt/config.yaml`. Pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(CONFIG_DIR).join(CONFIG_FILE)
}

/// Load and validate an explicit config file.
///
/// Returns `ConfigError::NotFound` if absent, `ConfigError::Parse` (with path
/// and line context) if malformed YAML.
pub fn load_at(path: &Path) -> Result<BluntConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    // An empty file is a valid "all defaults" config.
    if contents.trim().is_empty() {
        return Ok(BluntConfig::default());
    }
    let config: BluntConfig =
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    config.validate()?;
    Ok(config)
}

/// Load `<home>/.blunt/config.yaml`, falling back to defaults when absent.
pub fn load_or_default_at(home: &Path) -> Result<BluntConfig, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(BluntConfig::default());
    }
    load_at(&path)
}

/// `load_or_default_at` convenience wrapper.
pub fn load_or_default() -> Result<BluntConfig, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
    load_or_default_at(&home)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_mypy_and_dmypy() {
        let config = BluntConfig::default();
        assert_eq!(config.full_scan.program, "mypy");
        assert_eq!(config.daemon.command.args, vec!["run", "--"]);
        assert_eq!(config.diagnostics_exit_code, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bare_program_resolves_inside_bin_dir() {
        let spec = CommandSpec::new("mypy", &[]);
        assert_eq!(
            spec.resolve_program(Some(Path::new("/venv/bin"))),
            PathBuf::from("/venv/bin/mypy")
        );
        assert_eq!(spec.resolve_program(None), PathBuf::from("mypy"));

        let absolute = CommandSpec::new("/opt/mypy", &[]);
        assert_eq!(
            absolute.resolve_program(Some(Path::new("/venv/bin"))),
            PathBuf::from("/opt/mypy")
        );
    }

    #[test]
    fn control_command_reuses_daemon_program() {
        let daemon = DaemonConfig::default();
        let kill = daemon.control_command(&daemon.kill_args);
        assert_eq!(kill.program, "dmypy");
        assert_eq!(kill.args, vec!["kill"]);
    }

    #[test]
    fn running_signature_is_rejected() {
        let mut config = BluntConfig::default();
        config
            .daemon
            .signatures
            .push(DaemonSignature::new("all good", DaemonStatus::Running));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
