//! In-memory run configuration.
//!
//! `Config`, `Task` and the component/connection descriptions in [`crate::model`] are produced
//! by an external reader and handed to the engine already parsed; nothing in this module touches
//! the filesystem except [`Config::from_env`], which only reads environment variables.

use std::path::PathBuf;

/// Policy for the non-finite value check applied by the value bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NanCheckPolicy {
    Off,
    #[default]
    ConnectedOnly,
    All,
}

impl NanCheckPolicy {
    fn from_env_code(code: &str) -> Self {
        match code {
            "0" => NanCheckPolicy::Off,
            "2" => NanCheckPolicy::All,
            _ => NanCheckPolicy::ConnectedOnly,
        }
    }
}

/// Engine-wide configuration, largely sourced from the environment variables named in the
/// external interface contract.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory FMUs are extracted into. `None` means auto-create-and-clean-up a
    /// `tempfile`-managed directory; `Some` (from `USE_TEMP_DIR`) pins a fixed root that is never
    /// removed by the engine.
    pub temp_dir: Option<PathBuf>,
    pub result_dir: PathBuf,
    pub log_file: Option<PathBuf>,
    pub emit_graph: bool,
    pub verbose: bool,
    pub nan_check: NanCheckPolicy,
    pub num_nan_check_messages: usize,
    pub num_time_snap_warnings: usize,
    pub flush_store: bool,
    pub sum_time: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            temp_dir: None,
            result_dir: PathBuf::from("."),
            log_file: None,
            emit_graph: false,
            verbose: false,
            nan_check: NanCheckPolicy::default(),
            num_nan_check_messages: 10,
            num_time_snap_warnings: 10,
            flush_store: false,
            sum_time: false,
        }
    }
}

impl Config {
    /// Build a [`Config`] from the environment variables named in the external interface
    /// contract, falling back to defaults for anything unset. Read once at startup; the engine
    /// never consults the environment again mid-run.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(dir) = std::env::var("USE_TEMP_DIR") {
            cfg.temp_dir = Some(PathBuf::from(dir));
        }
        cfg.emit_graph = env_flag("MC_ENABLE_GRAPHS");
        cfg.flush_store = env_flag("FLUSH_STORE");
        cfg.sum_time = env_flag("SUM_TIME");
        if let Ok(code) = std::env::var("MC_NAN_CHECK") {
            cfg.nan_check = NanCheckPolicy::from_env_code(&code);
        }
        if let Some(n) = env_usize("MC_NUM_NAN_CHECK_MESSAGES") {
            cfg.num_nan_check_messages = n;
        }
        if let Some(n) = env_usize("NUM_TIME_SNAP_WARNINGS") {
            cfg.num_time_snap_warnings = n;
        }
        cfg
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v != "0" && !v.is_empty())
        .unwrap_or(false)
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Which initialization mode the engine runs. `MC_COSIM_INIT` selects between them externally;
/// the field is carried here so a caller can override without touching the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitMode {
    /// The full multi-phase protocol described in the initialization engine.
    #[default]
    Full,
    /// Skip the fixed-point loop resolution step; used by components known to have no algebraic
    /// loops, to avoid the iteration-budget overhead.
    NoLoopResolution,
}

/// Per-run task configuration: the simulated time window and the synchronization cadence.
#[derive(Debug, Clone)]
pub struct Task {
    pub start_time: f64,
    pub stop_time: f64,
    pub step_size: f64,
    /// Interval, in multiples of `step_size`, between stored rows. `1` stores every point.
    pub output_interval: u32,
    pub init_mode: InitMode,
    /// Absolute + relative tolerance used by the fixed-point loop resolvers.
    pub loop_tolerance_abs: f64,
    pub loop_tolerance_rel: f64,
    pub init_iteration_budget: usize,
    pub step_iteration_budget: usize,
}

impl Default for Task {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            stop_time: 1.0,
            step_size: 0.1,
            output_interval: 1,
            init_mode: InitMode::default(),
            loop_tolerance_abs: 1e-6,
            loop_tolerance_rel: 1e-6,
            init_iteration_budget: 100,
            step_iteration_budget: 10,
        }
    }
}
