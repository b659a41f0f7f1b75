use std::{process::ExitCode, sync::Arc};

mod config;
mod net;
mod relay;
mod route;
mod smtp;
mod tls;
mod util;

#[tokio::main]
async fn main() -> ExitCode {
    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Err(err) = logger.try_init() {
        eprintln!("error creating logger: {err}");
        return ExitCode::from(4);
    }

    // Missing or malformed arguments make argh exit with status 1
    let config = match config::load() {
        Ok(config) => Arc::new(config),
        Err(err) => {
            log::error!("error reading config: {err:#}");
            return ExitCode::from(2);
        }
    };

    if let Err(err) = smtp::server::start(config).await {
        log::error!("error listening: {err:#}");
        return ExitCode::from(3);
    }

    ExitCode::SUCCESS
}
