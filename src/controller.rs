// src/controller.rs
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::broadcast::Subscription;
use crate::config::AppConfig;
use crate::engine::Engine;
use crate::mqtt::MqttSource;
use crate::notifier::{LogNotifier, Notifier, WebhookNotifier};
use crate::simulator::SyntheticSource;
use crate::types::RunCommand;

#[derive(Clone, Copy, Debug, Default)]
pub struct RunOptions {
    /// Feed runs from the in-process generator instead of the broker.
    pub offline: bool,
    /// Wait for a `start` command instead of starting immediately.
    pub manual: bool,
    /// Print display states and alert events on stdout as JSON lines.
    pub emit_json: bool,
}

fn build_notifier(config: &AppConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    Ok(match &config.webhook.url {
        Some(url) => {
            info!("alert notifications go to {url}");
            Arc::new(WebhookNotifier::new(
                url.clone(),
                Duration::from_millis(config.webhook.timeout_ms),
            )?)
        }
        None => Arc::new(LogNotifier),
    })
}

fn start_run(engine: &mut Engine, config: &AppConfig, offline: bool) -> anyhow::Result<()> {
    if engine.is_running() {
        info!("run already active; ignoring start");
        return Ok(());
    }
    if offline {
        engine.start(SyntheticSource::new(config, StdRng::from_entropy()))?;
    } else {
        engine.start(MqttSource::connect(&config.broker))?;
    }
    Ok(())
}

fn emit_lines<T: Clone + Serialize + Send + Sync + 'static>(mut subscription: Subscription<T>) {
    tokio::spawn(async move {
        while let Some(value) = subscription.next().await {
            match serde_json::to_string(&value) {
                Ok(line) => println!("{line}"),
                Err(err) => warn!("could not encode event: {err}"),
            }
        }
    });
}

/// Runs until `quit` on stdin or ctrl-c, stopping any active run on the way out.
pub async fn run(config: AppConfig, options: RunOptions) -> anyhow::Result<()> {
    let notifier = build_notifier(&config)?;
    let mut engine = Engine::new(config.clone(), notifier)?;
    if options.emit_json {
        let hubs = engine.hubs();
        emit_lines(hubs.display.subscribe());
        emit_lines(hubs.alerts.subscribe());
    }
    if !options.manual {
        start_run(&mut engine, &config, options.offline)?;
    }
    info!("commands: start | stop | status | quit");

    let mut lines = Some(BufReader::new(tokio::io::stdin()).lines());
    loop {
        let command = tokio::select! {
            _ = tokio::signal::ctrl_c() => RunCommand::Quit,
            line = async {
                match lines.as_mut() {
                    Some(lines) => lines.next_line().await,
                    None => std::future::pending().await,
                }
            } => match line {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match line.parse::<RunCommand>() {
                    Ok(command) => command,
                    Err(err) => {
                        warn!("{err}");
                        continue;
                    }
                },
                Ok(None) => {
                    info!("stdin closed; ctrl-c to exit");
                    lines = None;
                    continue;
                }
                Err(err) => {
                    warn!("reading stdin failed: {err}");
                    lines = None;
                    continue;
                }
            },
        };
        match command {
            RunCommand::Start => start_run(&mut engine, &config, options.offline)?,
            RunCommand::Stop => {
                if engine.stop().await.is_none() {
                    info!("no active run; ignoring stop");
                }
            }
            RunCommand::Status => {
                let hubs = engine.hubs();
                info!(
                    "run {}; {} display and {} alert subscribers",
                    if engine.is_running() { "active" } else { "stopped" },
                    hubs.display.subscriber_count(),
                    hubs.alerts.subscriber_count()
                );
            }
            RunCommand::Quit => break,
        }
    }
    engine.stop().await;
    info!("bye");
    Ok(())
}
