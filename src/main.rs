//! Trading daemon.
//!
//! Loads the config, merges command-line overrides, starts the engine and
//! runs until SIGINT/SIGTERM or an authorised RPC `Shutdown`.

use std::time::Duration;

use anyhow::Context;
use clap::parser::ValueSource;
use clap::{ArgAction, CommandFactory, FromArgMatches, Parser};

use trading_daemon::engine::settings::{
    FLAG_DATABASE, FLAG_DATADIR, FLAG_RPC, FLAG_RPC_GATEWAY, FLAG_RPC_SHUTDOWN,
};
use trading_daemon::lifecycle::signals::wait_for_interrupt;
use trading_daemon::{Engine, FlagSet, Settings};

#[derive(Parser, Debug)]
#[command(name = "trading-daemon", version, about = "Trading daemon control plane")]
struct Cli {
    /// Config file to load; defaults to the executable dir, then the data dir
    #[arg(long, default_value = "")]
    config: String,

    /// Data directory override (implies --dryrun)
    #[arg(long, default_value = "")]
    datadir: String,

    /// Never write the config back to disk
    #[arg(long, action = ArgAction::SetTrue)]
    dryrun: bool,

    /// Enable the database manager
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, default_value_t = false,
          default_missing_value = "true", require_equals = true)]
    database: bool,

    /// Enable the RPC server
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, default_value_t = false,
          default_missing_value = "true", require_equals = true)]
    rpc: bool,

    /// Enable the REST gateway
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, default_value_t = false,
          default_missing_value = "true", require_equals = true)]
    rpcgateway: bool,

    /// Allow shutting the daemon down via RPC
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, default_value_t = false,
          default_missing_value = "true", require_equals = true)]
    rpcshutdown: bool,

    /// Worker threads; 0 or less uses every CPU
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    maxprocs: i64,

    /// Outbound HTTP timeout in seconds; 0 uses the config value
    #[arg(long, default_value_t = 0)]
    httptimeout: u64,

    /// Global HTTP timeout in seconds; 0 uses the config value
    #[arg(long, default_value_t = 0)]
    globalhttptimeout: u64,
}

const OVERRIDE_FLAGS: [&str; 5] = [
    FLAG_DATADIR,
    FLAG_DATABASE,
    FLAG_RPC,
    FLAG_RPC_GATEWAY,
    FLAG_RPC_SHUTDOWN,
];

fn main() -> anyhow::Result<()> {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches)?;

    let flags: FlagSet = OVERRIDE_FLAGS
        .into_iter()
        .filter(|name| matches.value_source(name) == Some(ValueSource::CommandLine))
        .collect();

    let settings = Settings {
        config_file: cli.config,
        data_dir: cli.datadir,
        enable_dry_run: cli.dryrun,
        enable_database_manager: cli.database,
        enable_rpc: cli.rpc,
        enable_rpc_gateway: cli.rpcgateway,
        enable_rpc_shutdown: cli.rpcshutdown,
        max_procs: cli.maxprocs,
        worker_threads: 0,
        http_timeout: Duration::from_secs(cli.httptimeout),
        global_http_timeout: Duration::from_secs(cli.globalhttptimeout),
    };

    let engine = Engine::new_from_settings(settings, &flags)
        .context("unable to initialise engine")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(engine.settings().worker_threads)
        .enable_all()
        .build()
        .context("unable to build runtime")?;

    runtime.block_on(run(engine))
}

async fn run(engine: Engine) -> anyhow::Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        workers = engine.settings().worker_threads,
        "trading-daemon starting"
    );
    engine.start().await?;

    tokio::select! {
        _ = wait_for_interrupt() => {}
        _ = engine.wait_for_shutdown_request() => {
            tracing::info!("Shutdown requested via RPC");
        }
    }

    engine.stop().await;
    Ok(())
}
