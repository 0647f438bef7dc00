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


// Configuration loader with environment variable substitution

use super::types::*;
use crate::recorder::manager::is_valid_channel_name;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<GatewayConfig> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;
        Self::load_str(&content)
    }

    pub fn load_str(content: &str) -> Result<GatewayConfig> {
        let content = Self::substitute_env_vars(content)?;

        let config: GatewayConfig = serde_yaml::from_str(&content)
            .context("Failed to parse YAML configuration")?;

        Self::validate(&config)?;

        Ok(config)
    }

    /// Substitute ${VAR} and ${VAR:-default} patterns with environment variables
    ///
    /// Examples:
    /// - ${HOME} -> /home/user
    /// - ${RECORD_DIR:-/var/lib/gateway} -> /var/lib/gateway (if RECORD_DIR not set)
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}")
            .context("Invalid substitution pattern")?;

        Ok(re
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                match std::env::var(var_name) {
                    Ok(value) => value,
                    Err(_) => match caps.get(2) {
                        Some(default) => default.as_str().to_string(),
                        // Keep original if no default and var not found
                        None => format!("${{{}}}", var_name),
                    },
                }
            })
            .to_string())
    }

    fn validate(config: &GatewayConfig) -> Result<()> {
        if config.upstream.address.trim().is_empty() {
            bail!("upstream.address cannot be empty");
        }

        if config.recording.blob_field.is_empty() {
            bail!("recording.blob_field cannot be empty");
        }

        if config.recording.raw_suffix.is_empty() {
            bail!("recording.raw_suffix cannot be empty");
        }

        if config.recording.blob_field.ends_with(&config.recording.raw_suffix) {
            bail!("recording.blob_field must not end with recording.raw_suffix");
        }

        if let Some(channel) = config
            .recording
            .channels
            .iter()
            .find(|c| !is_valid_channel_name(c))
        {
            bail!("recording.channels contains an invalid channel name: '{}'", channel);
        }

        match config.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => bail!("Unknown logging.level: '{}'", other),
        }

        Ok(())
    }
}
