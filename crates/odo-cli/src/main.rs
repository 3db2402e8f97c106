//! `odo`: runs the enabled station adapters until interrupted.
//!
//! Every adapter gets its own MQTT session named `odo-<module>`. The process
//! exits with a failure status when an adapter stops on a fatal error; the
//! remaining adapters are terminated first so each can report `disconnected`.

mod config;

use anyhow::{Context, Result, bail};
use clap::Parser;
use odo_adapters::{
    AdapterExit, AdapterManager, CaptureAdapter, EncoderAdapter, RetryPolicy, Supervisor,
    SupervisorConfig,
};
use odo_hardware::http::HttpLogSource;
use odo_hardware::process::{Pm3Config, Pm3Process};
use odo_network::{MqttBusClient, MqttConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, MqttSettings};

/// Badge cloning station.
#[derive(Parser, Debug)]
#[command(name = "odo", version, about)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log filter used when RUST_LOG is unset (e.g. "debug", "odo_adapters=trace")
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn setup_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn retry_policy(enabled: bool) -> RetryPolicy {
    if enabled {
        RetryPolicy::default()
    } else {
        RetryPolicy::disabled()
    }
}

fn bus(settings: &MqttSettings, module: &str) -> MqttBusClient {
    MqttBusClient::new(
        MqttConfig::new(settings.host.clone(), format!("odo-{module}")).with_port(settings.port),
    )
}

fn start_adapters(config: &Config, manager: &mut AdapterManager) -> Result<()> {
    let bus_retry = retry_policy(config.mqtt.retry);

    if let Some(espkey) = &config.modules.espkey {
        let source = HttpLogSource::new(espkey.url.clone(), espkey.log.clone())
            .context("espkey source")?;
        let adapter = CaptureAdapter::new("espkey", source, config.cred_topics.clone())
            .with_poll_interval(espkey.poll_interval());
        let supervisor_config = SupervisorConfig {
            bus_retry,
            resource_retry: RetryPolicy::default(),
        };
        manager.start(Supervisor::new(
            adapter,
            bus(&config.mqtt, "espkey"),
            supervisor_config,
        ));
    }

    if let Some(proxmark3) = &config.modules.proxmark3 {
        let driver = Pm3Process::new(Pm3Config {
            port: proxmark3.port.clone(),
            timeout: proxmark3.client_timeout(),
            ..Pm3Config::default()
        });
        let adapter = EncoderAdapter::new("proxmark3", driver, config.cred_topics.clone())
            .with_routing(proxmark3.mode, proxmark3.target);
        let supervisor_config = SupervisorConfig {
            bus_retry,
            resource_retry: retry_policy(proxmark3.client_retry),
        };
        manager.start(Supervisor::new(
            adapter,
            bus(&config.mqtt, "proxmark3"),
            supervisor_config,
        ));
    }

    if config.modules.lovense.is_some() {
        warn!(adapter = "lovense", "No BLE transport available, haptic adapter disabled");
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.config)?;
    info!(
        config = %cli.config.display(),
        broker = %format!("{}:{}", config.mqtt.host, config.mqtt.port),
        "Configuration loaded"
    );

    let mut manager = AdapterManager::new();
    start_adapters(&config, &mut manager)?;
    if manager.is_empty() {
        bail!("No module enabled in {}", cli.config.display());
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome = loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                if let Err(e) = signal {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                }
                info!("Interrupted, stopping adapters");
                break Ok(());
            }
            exit = manager.next_exit() => match exit {
                Some(AdapterExit { name, result: Err(e) }) => {
                    error!(adapter = %name, error = %e, "Adapter failed");
                    break Err(anyhow::Error::new(e).context(format!("adapter {name} failed")));
                }
                Some(AdapterExit { name, .. }) => info!(adapter = %name, "Adapter exited"),
                None => break Ok(()),
            },
        }
    };

    manager.terminate();
    let remaining = manager.join().await;
    outcome?;
    remaining.context("adapter failed during shutdown")
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_tracing(&cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "odo stopped");
            ExitCode::FAILURE
        }
    }
}
