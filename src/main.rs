use std::io;
use std::path::PathBuf;

use clap::Parser;
use logwin::config::{ConfigError, ServerConfig};
use logwin::server::Server;
use logwin::service::LogWindowService;
use thiserror::Error;

/// Serves bounded line windows and keyword search over large log files.
#[derive(Debug, Parser)]
#[command(name = "logwin-server", version, about)]
struct Cli {
    /// JSON config file; flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Address to listen on, e.g. 127.0.0.1:8765.
    #[arg(long)]
    listen: Option<String>,
    #[arg(long)]
    max_window_lines: Option<u64>,
    /// Keep every N-th line offset in the index.
    #[arg(long)]
    sample_interval: Option<u64>,
    /// Fold ASCII case when searching.
    #[arg(long)]
    case_insensitive: bool,
    /// Close sessions idle for this many seconds.
    #[arg(long)]
    idle_timeout: Option<u64>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("server error: {0}")]
    Io(#[from] io::Error),
}

impl Cli {
    fn server_config(&self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        if let Some(listen) = &self.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(max) = self.max_window_lines {
            config.max_window_lines = max;
        }
        if let Some(interval) = self.sample_interval {
            config.sample_interval = interval;
        }
        if self.case_insensitive {
            config.search_case_sensitive = false;
        }
        if self.idle_timeout.is_some() {
            config.session_idle_timeout_secs = self.idle_timeout;
        }
        Ok(config)
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = cli.server_config()?;
    log::debug!("effective config: {config:?}");
    let server = Server::bind(LogWindowService::new(config))?;
    server.run()?;
    Ok(())
}

fn main() {
    env_logger::init();

    if let Err(error) = run(Cli::parse()) {
        log::error!("{error}");
        eprintln!("{error}");
        std::process::exit(1);
    }
}
