// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use telemetry_gateway::config::{apply_env_overrides, load_config, GatewayConfig};
use telemetry_gateway::{ControlInterface, Dispatcher, Gateway, TcpJsonSource};

/// Telemetry Gateway - share one broker connection with local consumers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Upstream broker address (overrides config file)
    #[arg(short, long)]
    upstream: Option<String>,

    /// Recording root directory (overrides config file)
    #[arg(short, long)]
    record_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration from file
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    apply_env_overrides(&mut config);

    // Apply CLI overrides
    if let Some(upstream) = args.upstream {
        config.upstream.address = upstream;
    }
    if let Some(dir) = args.record_dir {
        config.recording.root_directory = Some(dir);
    }

    // Initialize tracing; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Telemetry Gateway");
    if let Some(path) = &args.config {
        info!("Loaded configuration from: {:?}", path);
    }
    info!("Upstream broker: {}", config.upstream.address);

    let gateway = Arc::new(Gateway::from_config(&config).await?);

    // Start ingesting from the broker
    let source = Arc::new(TcpJsonSource::from_config(&config.upstream));
    let ingest = gateway.ingest_loop(source, config.upstream.reconnect_delay());
    let _ingest_task = ingest.spawn();

    if let Some(root) = &config.recording.root_directory {
        tokio::fs::create_dir_all(root)
            .await
            .with_context(|| format!("Failed to create {}", root.display()))?;
        gateway.set_root_record_directory(root).await?;
        for channel in &config.recording.channels {
            if let Err(e) = gateway.enable_recording(channel) {
                warn!("Cannot record '{}': {:#}", channel, e);
            }
        }
    } else if !config.recording.channels.is_empty() {
        warn!("recording.channels is set but no root directory is configured");
    }

    let dispatcher = Dispatcher::new(gateway.clone());

    let control = match &config.control.listen {
        Some(address) => Some(ControlInterface::bind(address, dispatcher).await?),
        None => None,
    };

    // Run until Ctrl+C
    tokio::select! {
        result = async {
            match control {
                Some(control) => control.run().await,
                None => std::future::pending().await,
            }
        } => {
            if let Err(e) = result {
                error!("Control interface error: {:#}", e);
            }
            info!("Control interface stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    // Close open recordings
    gateway.recordings().shutdown().await;
    info!("Telemetry Gateway shut down successfully");

    Ok(())
}
