use std::process::ExitCode;

use log::{debug, error, info};

use crate::adapter::{AdapterContext, AdapterRegistry, LogAdapter};
use crate::config_file::FluentdRancherConfigFile;
use crate::source::DockerLogSource;
use crate::transport::TransportRegistry;

mod adapter;
mod classifier;
mod cli;
mod config_file;
mod forwarder;
mod message;
mod route;
mod signals;
mod source;
mod tags;
mod transport;
mod wire;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize the logger
    env_logger::init();

    let args = cli::get_cli_args();

    let config = match FluentdRancherConfigFile::try_init() {
        Ok(config) => config,
        Err(err) => {
            error!("Unable to read config {}: {err}", args.config.display());
            return ExitCode::FAILURE;
        }
    };

    let route = match config.route(args.route.as_deref()) {
        Ok(route) => route,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let tags = match config.tag_table() {
        Ok(tags) => tags,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    for tag in tags.tags() {
        debug!("Tag {tag}: {}", tags.images(tag).join(", "));
    }

    let docker = match source::docker::connect_docker() {
        Ok(docker) => docker,
        Err(err) => {
            error!("Unable to connect to the Docker daemon: {err}");
            return ExitCode::FAILURE;
        }
    };

    let context = AdapterContext {
        transports: TransportRegistry::with_defaults(),
        tags,
    };
    let mut adapter = match AdapterRegistry::with_defaults().build(&route, &context).await {
        Ok(adapter) => adapter,
        Err(err) => {
            error!("Unable to create adapter for {route}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let (tx, rx) = tokio::sync::mpsc::channel(config.source.channel_capacity.max(1));
    let (cancel_tx, cancel_rx) = tokio::sync::mpsc::channel(1);
    signals::handle_shutdown(cancel_tx);

    let log_source = DockerLogSource::new(docker, config.source.clone());
    let source_task = tokio::spawn(log_source.run(tx, cancel_rx));

    let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]);
    info!("Forwarding logs to {route}");

    adapter.stream(rx).await;

    match source_task.await {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(err)) => {
            error!("Log source failed: {err}");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!("Log source task panicked: {err}");
            ExitCode::FAILURE
        }
    }
}
