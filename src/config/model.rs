// src/config/model.rs

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// grace_period_secs = 5
///
/// [[service]]
/// id = "web"
/// name = "Web frontend"
/// command = "npm run dev"
/// dir = "frontend"
/// env = { PORT = "3000" }
/// autostart = true
///
/// [[service]]
/// id = "api"
/// command = "cargo run"
/// ```
///
/// Services are an *array of tables* so the declaration order in the file is
/// preserved; `list_all()` reports services in that order.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Supervisor tuning from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// All services from `[[service]]`.
    #[serde(default)]
    pub service: Vec<ServiceConfig>,
}

/// Validated configuration. Constructed via `TryFrom<RawConfigFile>` in
/// `config::validate`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub service: Vec<ServiceConfig>,
}

impl ConfigFile {
    /// Internal constructor used after validation has passed.
    pub(crate) fn new_unchecked(config: ConfigSection, service: Vec<ServiceConfig>) -> Self {
        Self { config, service }
    }
}

/// `[config]` section: supervisor-wide tuning.
///
/// Defaults match the documented behaviour (10k-entry log ring, 5 s grace
/// period before SIGKILL escalation); tests override them to stay fast.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Seconds to wait after the graceful signal before escalating to a
    /// forceful kill of the process tree.
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// Per-instance log ring capacity (entries). Oldest entries are evicted
    /// first once the ring is full.
    #[serde(default = "default_log_buffer_capacity")]
    pub log_buffer_capacity: usize,
}

fn default_grace_period_secs() -> u64 {
    5
}

fn default_log_buffer_capacity() -> usize {
    10_000
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period_secs(),
            log_buffer_capacity: default_log_buffer_capacity(),
        }
    }
}

/// One `[[service]]` entry: a named external command the supervisor can run.
///
/// Immutable after load; reconfiguration replaces the whole set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Unique key used in every command (`start("web")`, ...).
    pub id: String,

    /// Human-readable name. Defaults to `id` when omitted.
    #[serde(default)]
    pub name: Option<String>,

    /// The shell command line to execute. Handed to `sh -c` verbatim; the
    /// supervisor never parses or tokenizes it.
    pub command: String,

    /// Working directory the process is started in. Must exist at start
    /// time. Defaults to the supervisor's own working directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Environment overrides layered on top of the supervisor's own
    /// environment.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Advisory flag: the CLI bootstrapper starts these at launch. The
    /// supervisor core itself ignores it.
    #[serde(default)]
    pub autostart: bool,
}

impl ServiceConfig {
    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Behavioural knobs for a `Supervisor`, derived from `[config]`.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// How long the graceful termination signal gets before escalation.
    pub grace_period: Duration,

    /// How long the forceful kill gets to be confirmed before `stop` gives
    /// up with a termination failure.
    pub kill_confirm: Duration,

    /// Pause between the old instance reaching a terminal state and the new
    /// start during `restart`, so released OS resources (ports) settle.
    pub settle_delay: Duration,

    /// Log ring capacity per running instance.
    pub log_buffer_capacity: usize,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(default_grace_period_secs()),
            kill_confirm: Duration::from_secs(2),
            settle_delay: Duration::from_millis(250),
            log_buffer_capacity: default_log_buffer_capacity(),
        }
    }
}

impl From<&ConfigSection> for SupervisorOptions {
    fn from(section: &ConfigSection) -> Self {
        Self {
            grace_period: Duration::from_secs(section.grace_period_secs),
            log_buffer_capacity: section.log_buffer_capacity,
            ..Self::default()
        }
    }
}
