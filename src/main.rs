// src/main.rs
mod alert;
mod broadcast;
mod config;
mod controller;
mod display;
mod drivers;
mod engine;
mod mqtt;
mod notifier;
mod simulator;
mod types;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::AppConfig;
use crate::controller::RunOptions;
use crate::drivers::IngestMode;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    /// One raw sample per message, windowed and transformed locally.
    Single,
    /// Five band energies per message.
    Banded,
}

#[derive(Parser, Debug)]
#[command(name = "neuro-alert", version, about = "EEG band monitor with scripted alerts")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, env = "NEURO_ALERT_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long)]
    broker: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    topic: Option<String>,
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
    /// Payload field carrying the sample in single-channel mode.
    #[arg(long)]
    field: Option<String>,
    /// POST alert notifications to this URL.
    #[arg(long)]
    webhook: Option<String>,
    #[arg(long)]
    tick_ms: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Monitor telemetry and drive the alert timeline.
    Run {
        /// Use the built-in generator instead of the broker.
        #[arg(long)]
        offline: bool,
        /// Wait for `start` on stdin.
        #[arg(long)]
        manual: bool,
        /// Print display states and alert events as JSON lines.
        #[arg(long)]
        emit_json: bool,
    },
    /// Publish synthetic telemetry to the broker until ctrl-c.
    Simulate,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(host) = &self.broker {
            config.broker.host = host.clone();
        }
        if let Some(port) = self.port {
            config.broker.port = port;
        }
        if let Some(topic) = &self.topic {
            config.broker.topic = topic.clone();
        }
        match (self.mode, &self.field) {
            (Some(ModeArg::Banded), _) => config.ingest = IngestMode::PreBanded,
            (Some(ModeArg::Single), field) => {
                let field = field
                    .clone()
                    .or_else(|| match &config.ingest {
                        IngestMode::SingleChannel { field } => Some(field.clone()),
                        IngestMode::PreBanded => None,
                    })
                    .unwrap_or_else(|| IngestMode::default_field().to_owned());
                config.ingest = IngestMode::SingleChannel { field };
            }
            (None, Some(field)) => {
                if let IngestMode::SingleChannel { field: current } = &mut config.ingest {
                    *current = field.clone();
                }
            }
            (None, None) => {}
        }
        if let Some(url) = &self.webhook {
            config.webhook.url = Some(url.clone());
        }
        if let Some(tick_ms) = self.tick_ms {
            config.tick_ms = tick_ms;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    match cli.command {
        Command::Run {
            offline,
            manual,
            emit_json,
        } => {
            controller::run(
                config,
                RunOptions {
                    offline,
                    manual,
                    emit_json,
                },
            )
            .await
        }
        Command::Simulate => {
            info!("ctrl-c to stop");
            simulator::publish(&config, StdRng::from_entropy(), async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "neuro-alert",
            "--topic",
            "neuroNexus/eeg",
            "--mode",
            "banded",
            "--tick-ms",
            "250",
            "run",
            "--offline",
        ]);
        let mut config = AppConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.broker.topic, "neuroNexus/eeg");
        assert_eq!(config.ingest, IngestMode::PreBanded);
        assert_eq!(config.tick_ms, 250);
        assert!(matches!(cli.command, Command::Run { offline: true, .. }));
    }

    #[test]
    fn field_flag_selects_channel() {
        let cli = Cli::parse_from(["neuro-alert", "--field", "ch3", "simulate"]);
        let mut config = AppConfig::default();
        cli.apply(&mut config);
        assert_eq!(
            config.ingest,
            IngestMode::SingleChannel {
                field: "ch3".into()
            }
        );
    }
}
