//! Engine settings and command-line override resolution.

use std::collections::HashMap;
use std::time::Duration;

pub const FLAG_DATADIR: &str = "datadir";
pub const FLAG_DATABASE: &str = "database";
pub const FLAG_RPC: &str = "rpc";
pub const FLAG_RPC_GATEWAY: &str = "rpcgateway";
pub const FLAG_RPC_SHUTDOWN: &str = "rpcshutdown";

/// Resolved feature flags and tunables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    /// Explicit config path; empty means resolve the default.
    pub config_file: String,
    /// Data directory override; empty keeps the configured one.
    pub data_dir: String,
    pub enable_dry_run: bool,

    pub enable_database_manager: bool,
    pub enable_rpc: bool,
    pub enable_rpc_gateway: bool,
    pub enable_rpc_shutdown: bool,

    /// Requested parallelism; non-positive means all CPUs.
    pub max_procs: i64,
    /// Worker threads actually used by the runtime.
    pub worker_threads: usize,

    pub http_timeout: Duration,
    pub global_http_timeout: Duration,
}

/// Flags explicitly given on the command line, keyed by flag name.
#[derive(Debug, Clone, Default)]
pub struct FlagSet(HashMap<String, bool>);

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>) {
        self.0.insert(name.into(), true);
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.0.get(name).copied().unwrap_or(false)
    }

    /// Resolves `flag` against the config value: an unset flag never
    /// overrides config; an explicitly set flag always wins.
    pub fn with_bool(&self, name: &str, flag: &mut bool, config: bool) {
        let explicit = self.is_set(name);
        *flag = (!explicit && config) || (explicit && *flag);
    }
}

impl<S: Into<String>> FromIterator<S> for FlagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut flags = Self::new();
        for name in iter {
            flags.set(name);
        }
        flags
    }
}

/// Worker count for `requested`: non-positive or above the CPU count means
/// every CPU.
pub fn resolve_parallelism(requested: i64) -> usize {
    let cpus = num_cpus::get();
    if requested <= 0 || requested as usize > cpus {
        cpus
    } else {
        requested as usize
    }
}
