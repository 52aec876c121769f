use std::{
    env,
    io::Read,
    net::SocketAddr,
    num::NonZeroU32,
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{Args, Parser, Subcommand};
use http::Uri;
use jemallocator::Jemalloc;
use loadgen::{
    action,
    clock::RealClock,
    config::{self, Config, Telemetry},
    probe::CurrencyProbe,
    runner::{self, Budget, Runner, Summary},
    target::frontend::HttpTarget,
    user::{Shopper, user_rng},
    weighted,
};
use metrics::gauge;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::{
    runtime::Builder,
    signal,
    time::{self, Duration},
};
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Invalid loadgen config: {0}")]
    Config(#[from] config::Error),
    #[error("Invalid action weights: {0}")]
    Weights(#[from] weighted::Error),
    #[error("Virtual users returned an error: {0}")]
    Runner(#[from] runner::Error),
    #[error("Could not join the runner task: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Failed to install prometheus exporter: {0}")]
    Prometheus(#[from] metrics_exporter_prometheus::BuildError),
}

#[derive(Parser)]
#[clap(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the storefront frontend with shopping virtual users
    Run(LoadgenArgs),
    /// Ask the currency service for its supported currencies, once
    ProbeCurrency(LoadgenArgs),
    /// Validate configuration file and exit
    ConfigCheck(ConfigCheckCommand),
}

#[derive(Args)]
struct LoadgenArgs {
    /// path on disk to the configuration file, takes precedence over the
    /// `LOADGEN_CONFIG` environment variable
    #[clap(long)]
    config_path: Option<PathBuf>,
    /// root of the storefront frontend, overrides `BASE_URL`
    #[clap(long)]
    base_url: Option<Uri>,
    /// number of concurrent virtual users, overrides `USERS`
    #[clap(long)]
    users: Option<NonZeroU32>,
    /// how long virtual users keep starting iterations, overrides `DURATION`
    #[clap(long, value_parser = humantime::parse_duration)]
    duration: Option<Duration>,
    /// address of the currency service, overrides `CURRENCY_ADDR`
    #[clap(long)]
    currency_addr: Option<Uri>,
    /// address to bind the prometheus exporter to
    #[clap(long)]
    prometheus_addr: Option<SocketAddr>,
    /// the maximum time to wait, in seconds, for controlled shutdown
    #[clap(long, default_value_t = 30)]
    max_shutdown_delay: u16,
}

#[derive(Args)]
struct ConfigCheckCommand {
    /// path on disk to the configuration file
    #[clap(long)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Workload {
    Shop,
    ProbeCurrency,
}

fn load_config_contents(config_path: Option<&Path>) -> Result<String, Error> {
    if let Some(path) = config_path {
        debug!("Attempting to open configuration file at: {}", path.display());
        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|err| {
                error!("Could not read config file '{}': {}", path.display(), err);
                err
            })?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Ok(contents)
    } else if let Ok(env_var_value) = env::var("LOADGEN_CONFIG") {
        debug!("Using config from env var 'LOADGEN_CONFIG'");
        Ok(env_var_value)
    } else {
        debug!("No configuration given, using defaults");
        Ok(String::new())
    }
}

fn get_config<F>(args: &LoadgenArgs, contents: &str, lookup: F) -> Result<Config, Error>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = Config::from_yaml(contents)?;
    config.apply_env(lookup)?;

    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(users) = args.users {
        config.users = users;
    }
    if let Some(duration) = args.duration {
        config.duration = duration;
    }
    if let Some(currency_addr) = &args.currency_addr {
        config.currency_addr = currency_addr.clone();
    }
    if let Some(prometheus_addr) = args.prometheus_addr {
        config.telemetry = Some(Telemetry { prometheus_addr });
    }
    config.validate()?;
    Ok(config)
}

fn validate_config(config_path: Option<&Path>) -> Result<Config, Error> {
    let contents = load_config_contents(config_path)?;
    let config = Config::from_yaml(&contents).map_err(|err| {
        error!("Configuration validation failed: {}", err);
        err
    })?;
    action::catalog(&config.weights).map_err(|err| {
        error!("Configuration validation failed: {}", err);
        err
    })?;
    info!("Configuration file is valid");
    Ok(config)
}

async fn inner_main(workload: Workload, config: Config) -> Result<Summary, Error> {
    if let Some(Telemetry { prometheus_addr }) = config.telemetry {
        PrometheusBuilder::new()
            .with_http_listener(prometheus_addr)
            .install()?;
        info!("prometheus exporter listening on {prometheus_addr}");
    }

    let (shutdown_watcher, shutdown_broadcast) = loadgen_signal::signal();

    let mut run = match workload {
        Workload::Shop => {
            let catalog = Arc::new(action::catalog(&config.weights)?);
            let target = HttpTarget::new(&config.base_url, config.request_timeout);
            let time_unit = config.time_unit;
            let seed = config.seed;
            info!(
                "{users} shoppers against {base} for {duration}",
                users = config.users,
                base = target.base(),
                duration = humantime::format_duration(config.duration),
            );
            let runner = Runner::new(
                config.users,
                Budget::Duration(config.duration),
                shutdown_watcher,
            );
            tokio::spawn(runner.run(move |user| {
                Shopper::new(
                    user,
                    Arc::clone(&catalog),
                    target.clone(),
                    RealClock,
                    time_unit,
                    user_rng(seed, user),
                )
            }))
        }
        Workload::ProbeCurrency => {
            info!("probing currency service at {}", config.currency_addr);
            let addr = config.currency_addr;
            let connect_timeout = config.request_timeout;
            let time_unit = config.time_unit;
            let runner = Runner::new(
                NonZeroU32::MIN,
                Budget::Iterations(NonZeroU32::MIN),
                shutdown_watcher,
            );
            tokio::spawn(runner.run(move |_| {
                CurrencyProbe::new(addr.clone(), connect_timeout, RealClock, time_unit)
            }))
        }
    };

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut shutdown_broadcast = Some(shutdown_broadcast);
    let mut interval = time::interval(Duration::from_millis(400));
    let joined = loop {
        tokio::select! {
            _ = interval.tick() => {
                gauge!("loadgen.running").set(1.0);
            },
            _ = &mut ctrl_c, if shutdown_broadcast.is_some() => {
                info!("received ctrl-c, stopping virtual users");
                if let Some(broadcast) = shutdown_broadcast.take() {
                    broadcast.signal();
                }
            },
            joined = &mut run => break joined,
        }
    };
    if let Some(broadcast) = shutdown_broadcast {
        broadcast.signal_and_wait().await;
    }

    let summary = joined??;
    info!(
        "{iterations} iterations, {failures} failed",
        iterations = summary.iterations,
        failures = summary.failures,
    );
    Ok(summary)
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_ansi(false)
        .finish()
        .init();

    let version = env!("CARGO_PKG_VERSION");
    info!("Starting loadgen {version} run.");

    let cli = Cli::parse();
    let (workload, args) = match cli.command {
        Commands::Run(args) => (Workload::Shop, args),
        Commands::ProbeCurrency(args) => (Workload::ProbeCurrency, args),
        Commands::ConfigCheck(config_check_cmd) => {
            match validate_config(config_check_cmd.config_path.as_deref()) {
                Ok(_) => std::process::exit(0),
                Err(_) => std::process::exit(1),
            }
        }
    };

    let contents = load_config_contents(args.config_path.as_deref())?;
    let config = get_config(&args, &contents, |name| env::var(name).ok()).map_err(|err| {
        error!("{err}");
        err
    })?;
    let max_shutdown_delay = Duration::from_secs(args.max_shutdown_delay.into());

    let runtime = Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()?;
    let res = runtime.block_on(inner_main(workload, config));
    info!(
        "Shutting down runtime with a {} second delay. May leave orphaned tasks.",
        max_shutdown_delay.as_secs(),
    );
    runtime.shutdown_timeout(max_shutdown_delay);
    if let Err(err) = &res {
        error!("{err}");
    }
    info!("Bye. :)");
    res.map(|_| ())
}
