//! CLI interface for fleetrun

use crate::dispatcher::TaskDispatcher;
use crate::error::{FleetError, Result};
use crate::executors::ssh::SshExecutor;
use crate::logging::{init_logging, LogConfig};
use crate::models::{ConnectionConfig, Credential};
use crate::parser::{load_commands, load_hosts};
use crate::settings::{Settings, SettingsOverrides};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// fleetrun - run every command on every host over SSH
#[derive(Parser, Debug)]
#[command(name = "fleetrun")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run a list of commands across a list of hosts over SSH", long_about = None)]
pub struct Cli {
    /// File with one command per line
    #[arg(short = 'c', long = "commands", value_name = "FILE")]
    pub commands: PathBuf,

    /// File with one host per line (host, host:port, IPv4 or IPv6)
    #[arg(short = 'd', long = "devices", value_name = "FILE")]
    pub devices: PathBuf,

    /// Remote user (defaults to $USER)
    #[arg(short, long)]
    pub user: Option<String>,

    /// Connection timeout in seconds
    #[arg(short = 't', long = "timeout", value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Maximum number of concurrent sessions
    #[arg(short = 'p', long)]
    pub max_parallel: Option<usize>,

    /// SSH port for hosts that do not specify one
    #[arg(long)]
    pub port: Option<u16>,

    /// Settings file (toml, yaml, json, ...)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,
}

impl Cli {
    /// Initialize logging based on CLI arguments
    pub fn init_logging(&self) -> anyhow::Result<()> {
        let config = LogConfig::new(
            self.log_level.as_str().into(),
            self.log_format.as_str().into(),
        );

        init_logging(&config)
    }

    /// Flags that take precedence over every other settings layer
    pub fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            user: self.user.clone(),
            connect_timeout_secs: self.timeout,
            port: self.port,
            max_parallel: self.max_parallel,
        }
    }

    /// Execute the run described by the arguments
    pub async fn execute(&self) -> anyhow::Result<()> {
        let settings = Settings::load(self.config.as_deref(), &self.overrides())?;
        debug!("Settings: {:?}", settings);

        let commands = load_commands(&self.commands);
        let hosts = load_hosts(&self.devices);

        for host in &hosts {
            info!("Running on device: {}", host);
        }
        for command in &commands {
            info!("Running command: {}", command);
        }

        if commands.is_empty() || hosts.is_empty() {
            warn!(
                "Nothing to run ({} commands, {} hosts)",
                commands.len(),
                hosts.len()
            );
            return Ok(());
        }

        let credential = prompt_credential()?;
        let config = Arc::new(
            ConnectionConfig::new(settings.user.clone(), credential, settings.connect_timeout())
                .with_port(settings.port),
        );

        let dispatcher = TaskDispatcher::new(Arc::new(SshExecutor::new()), settings.max_parallel);
        let summary = dispatcher
            .run(&commands, &hosts, config, &mut std::io::stdout())
            .await?;

        if summary.failed > 0 {
            warn!("{} of {} tasks failed", summary.failed, summary.expected);
        }

        Ok(())
    }
}

/// Prompt for the shared password until a non-empty one is entered.
pub fn prompt_credential() -> Result<Credential> {
    loop {
        let secret = rpassword::prompt_password("Password: ")
            .map_err(|e| FleetError::Credential(format!("failed to read password: {}", e)))?;

        match Credential::new(secret) {
            Ok(credential) => return Ok(credential),
            Err(_) => continue,
        }
    }
}
