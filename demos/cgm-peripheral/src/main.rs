//! Continuous Glucose Monitoring Peripheral Example
//!
//! This runs the CGM service with a simulated sensor and a scripted collector. The two are
//! connected by a channel in place of a Bluetooth link, so this can be run anywhere.
//!
//! The service configuration is read from `cgm-peripheral/config.yaml` within the config
//! directory of the user (or the file passed with `--config`). The defaults are used when there
//! is no configuration file, `--write-config` saves them so they can be edited.

mod bearer;
mod collector;
mod sensor;

use anyhow::Context;
use bearer::ChannelBearer;
use cgms::server::characteristic::SessionStartTime;
use cgms::server::task::TaskError;
use cgms::server::{CgmsService, ServiceConfig, ServiceError};
use clap::Parser;
use collector::Collector;
use sensor::Sensor;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DIR_NAME: &str = "cgm-peripheral";

const FILE_NAME: &str = "config.yaml";

#[derive(Parser, Debug)]
#[command(about = "Continuous Glucose Monitoring Peripheral Example")]
#[command(
    long_about = "This is an example CGM sensor. It generates glucose measurements that are sent to a \
    scripted collector as notifications. Before the measurements start the collector reads the records \
    stored by the sensor through the record access control point."
)]
struct Cli {
    /// The service configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Save the configuration to the configuration file and exit
    #[arg(long)]
    write_config: bool,

    /// Enable the E2E-CRC regardless of the configuration
    #[arg(long)]
    e2e_crc: bool,

    /// The number of measurements to make
    #[arg(long, default_value_t = 10)]
    measurements: usize,

    /// The time between measurements in milliseconds
    #[arg(long, default_value_t = 500)]
    period: u64,

    /// Seed of the simulated sensor
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,
}

fn config_path(cli: &Cli) -> anyhow::Result<PathBuf> {
    if let Some(path) = &cli.config {
        return Ok(path.clone());
    }

    let mut path = dirs::config_dir().context("there is no config directory")?;

    path.push(DIR_NAME);
    path.push(FILE_NAME);

    Ok(path)
}

fn load_config(path: &Path) -> anyhow::Result<ServiceConfig> {
    match std::fs::File::open(path) {
        Ok(file) => {
            let config = serde_yaml::from_reader(file).with_context(|| format!("invalid config {}", path.display()))?;

            log::info!("loaded configuration from {}", path.display());

            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServiceConfig::default()),
        Err(e) => Err(e).with_context(|| format!("failed to open {}", path.display())),
    }
}

fn save_config(path: &Path, config: &ServiceConfig) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    let file = std::fs::File::create(path)?;

    serde_yaml::to_writer(file, config)?;

    println!("configuration saved to {}", path.display());

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    TermLogger::init(cli.log_level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto)?;

    let path = config_path(&cli)?;

    let mut config = load_config(&path)?;

    if cli.write_config {
        return save_config(&path, &config);
    }

    if cli.e2e_crc {
        config = config.with_e2e_crc(true);
    }

    let service = CgmsService::new(config)?;

    let latest_offset = service.records().latest_active().map_or(0, |record| record.time_offset);

    let (bearer, outgoing) = ChannelBearer::new();

    let (handle, join_handle) = cgms::server::task::spawn(service, bearer);

    let mut collector = Collector::new(handle.clone(), outgoing, config.handles);

    let start_time = SessionStartTime {
        year: 2024,
        month: 1,
        day: 1,
        time_zone: SessionStartTime::TIME_ZONE_UNKNOWN,
        dst_offset: SessionStartTime::DST_OFFSET_UNKNOWN,
        ..SessionStartTime::default()
    };

    collector.connect(start_time).await?;

    let listener = tokio::spawn(async move { collector.listen().await });

    let interval = u16::from(config.specific_ops.communication_interval);

    let mut sensor = Sensor::new(cli.seed, latest_offset, interval);

    for _ in 0..cli.measurements {
        tokio::time::sleep(Duration::from_millis(cli.period)).await;

        match handle.push_measurement(sensor.measure()).await {
            Ok(index) => log::debug!("stored measurement {}", index),
            Err(TaskError::Service(ServiceError::SessionStopped)) => log::warn!("the session is stopped"),
            Err(e) => return Err(e.into()),
        }
    }

    handle.shutdown()?;

    let (service, bearer) = join_handle.await?;

    drop(bearer);

    listener.await??;

    log::info!(
        "{} records stored, {} active",
        service.records().len(),
        service.records().active_count()
    );

    Ok(())
}
