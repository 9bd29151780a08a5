// SPDX-License-Identifier: MIT OR Apache-2.0

use cep_node::core::stream::input::WatermarkStrategy;
use cep_node::core::util::ShutdownCoordinator;
use cep_node::{ComputeNode, NodeConfig, NodeResult, NodeStats, RelayEngine};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "cep-node", about = "Compute node of a distributed CEP pipeline")]
struct Cli {
    /// Local node configuration
    #[arg(long, default_value = "./conf/config.json")]
    localconfig: PathBuf,

    /// Global address book
    #[arg(long, default_value = "./conf/address_book.json")]
    globalconfig: PathBuf,

    /// Watermark strategy (per_connection_minimum or wall_clock_counter)
    #[arg(long)]
    watermark: Option<WatermarkStrategy>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(stats) => {
            log::info!(
                "[cep-node] Finished after {} event(s), {} result(s) forwarded",
                stats.events_received,
                stats.events_forwarded
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("[cep-node] {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> NodeResult<NodeStats> {
    let config = NodeConfig::load(&cli.localconfig, &cli.globalconfig)?;

    let coordinator = ShutdownCoordinator::new();
    let node = ComputeNode::from_config(
        &config,
        cli.watermark,
        Box::new(RelayEngine),
        coordinator.handle(),
    )?;
    spawn_signal_watcher(coordinator);

    node.run()
}

fn spawn_signal_watcher(coordinator: ShutdownCoordinator) {
    let spawned = std::thread::Builder::new()
        .name("signal-watcher".to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    log::warn!("[cep-node] Ctrl-C handling unavailable: {}", e);
                    return;
                }
            };
            if let Err(e) = rt.block_on(coordinator.wait_for_shutdown_signal()) {
                log::warn!("[cep-node] Failed to listen for Ctrl-C: {}", e);
            }
        });
    if let Err(e) = spawned {
        log::warn!("[cep-node] Failed to spawn signal watcher: {}", e);
    }
}
