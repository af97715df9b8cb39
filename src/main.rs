// trailcam-uploader - unattended upload daemon for field camera recordings

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use trailcam_uploader::api::HttpUploadClient;
use trailcam_uploader::config;
use trailcam_uploader::connectivity::{AlwaysUp, ConnectionGate, ProbeGate};
use trailcam_uploader::constants::{
    CONNECTION_MAX_RETRIES, CONNECTION_RETRY_INTERVAL, CONNECTION_TIMEOUT, DEFAULT_CONFIG_FILE,
    FAILED_UPLOADS_FOLDER,
};
use trailcam_uploader::keepalive::{CommandKeepAlive, KeepAlive, NoopKeepAlive};
use trailcam_uploader::transcode::FfmpegTranscoder;
use trailcam_uploader::watch::DirWatcher;
use trailcam_uploader::worker::Worker;

#[derive(Parser)]
#[command(name = "trailcam-uploader")]
#[command(about = "Upload field camera recordings to the ingestion API", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .format_timestamp_secs()
        .init();

    log::info!("running version: {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(cli) {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let conf = config::load_config(&cli.config)
        .with_context(|| format!("configuration error in {}", cli.config.display()))?;

    let creds_path = config::private_config_path(&cli.config);
    let creds = match config::load_credentials(&creds_path)? {
        Some(creds) => creds,
        None => {
            // Registration is owned by an external tool; exit cleanly so
            // the supervisor retries once it has run.
            log::info!("device not registered, exiting and waiting to be restarted");
            return Ok(());
        }
    };

    let gate: Box<dyn ConnectionGate> = match conf.probe_address.clone() {
        Some(addr) => Box::new(ProbeGate::new(addr)),
        None => Box::new(AlwaysUp),
    };
    let keepalive: Box<dyn KeepAlive> =
        if conf.stay_awake_command.is_some() || conf.idle_command.is_some() {
            Box::new(CommandKeepAlive::new(
                conf.stay_awake_command.clone(),
                conf.idle_command.clone(),
            ))
        } else {
            Box::new(NoopKeepAlive)
        };

    log::info!("requesting internet connection");
    gate.request();
    gate.wait_until_up(
        CONNECTION_TIMEOUT,
        CONNECTION_RETRY_INTERVAL,
        CONNECTION_MAX_RETRIES,
    )?;
    log::info!("internet connection made");

    let client = HttpUploadClient::new(&conf, &creds).context("connecting to the API")?;
    gate.release();

    std::fs::create_dir_all(conf.directory.join(FAILED_UPLOADS_FOLDER))
        .context("creating the failed uploads directory")?;

    let watcher = DirWatcher::new(&conf.directory)?;
    let transcoder = FfmpegTranscoder;

    let mut worker = Worker::new(
        &conf.directory,
        &client,
        &transcoder,
        gate.as_ref(),
        keepalive.as_ref(),
        watcher,
    );
    worker.run()?;
    Ok(())
}
