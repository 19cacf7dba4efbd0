//! Configuration resolution for `PipeCast`.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Config file (explicit path, or ~/.config/pipecast/relay.json)
//! 3. Environment variables
//! 4. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Port used when neither the config file nor `PORT` provide one.
pub const DEFAULT_PORT: u16 = 3000;

/// Complete relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl RelayConfig {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let path = &self.server.socket_path;
        if !path.starts_with('/') || path == "/health" {
            return Err(Error::Config(format!(
                "socket_path must start with '/' and not shadow /health: {path:?}"
            )));
        }
        if self.encoder.program.as_os_str().is_empty() {
            return Err(Error::Config("encoder program is empty".to_string()));
        }
        // The pending buffer is flushed into the stdin queue in one go.
        if let (Some(queue), Some(pending)) =
            (self.encoder.queue_cap(), self.session.pending_cap())
            && queue < pending
        {
            return Err(Error::Config(format!(
                "encoder.max_queued_bytes ({queue}) is smaller than session.max_pending_bytes ({pending})"
            )));
        }
        Ok(())
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Route the WebSocket transport is mounted on.
    pub socket_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            socket_path: "/socket".to_string(),
        }
    }
}

/// External encoder invocation.
///
/// Options are passed through to the encoder unchanged; the relay never
/// interprets them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EncoderConfig {
    /// Encoder binary, resolved through `PATH` when relative.
    pub program: PathBuf,
    /// Options placed before the `pipe:0` input.
    pub input_options: Vec<String>,
    /// Options placed between the input and the destination URI.
    pub output_options: Vec<String>,
    /// Number of trailing stderr lines attached to abnormal-exit errors.
    pub stderr_tail_lines: usize,
    /// Cap on bytes accepted but not yet written to the encoder's stdin.
    /// `0` means unbounded.
    pub max_queued_bytes: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            input_options: split_options(&["-analyzeduration 100000", "-probesize 100000"]),
            output_options: split_options(&[
                "-c:v libx264",
                "-preset ultrafast",
                "-tune zerolatency",
                "-maxrate 2500k",
                "-bufsize 5000k",
                "-pix_fmt yuv420p",
                "-g 60",
                "-c:a aac",
                "-ar 44100",
                "-b:a 128k",
                "-f flv",
            ]),
            stderr_tail_lines: 8,
            max_queued_bytes: 64 * 1024 * 1024, // 64 MiB
        }
    }
}

impl EncoderConfig {
    /// Stdin queue byte cap, `None` when unbounded.
    pub const fn queue_cap(&self) -> Option<usize> {
        if self.max_queued_bytes == 0 {
            None
        } else {
            Some(self.max_queued_bytes)
        }
    }
}

fn split_options(pairs: &[&str]) -> Vec<String> {
    pairs
        .iter()
        .flat_map(|pair| pair.split_whitespace())
        .map(str::to_string)
        .collect()
}

/// What to do with a chunk that would push the pending buffer past its cap.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Refuse the incoming chunk. Keeps the stream header intact.
    #[default]
    RejectNew,
    /// Evict the oldest buffered chunks until the new one fits.
    DropOldest,
}

/// Per-session relay behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds to wait for the encoder's readiness edge. `0` disables.
    pub startup_timeout_secs: u64,
    /// Cap on bytes buffered before readiness. `0` means unbounded.
    pub max_pending_bytes: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            startup_timeout_secs: 10,
            max_pending_bytes: 32 * 1024 * 1024, // 32 MiB
            overflow_policy: OverflowPolicy::RejectNew,
        }
    }
}

impl SessionConfig {
    /// Startup timeout as a `Duration`, `None` when disabled.
    pub const fn startup_timeout(&self) -> Option<Duration> {
        if self.startup_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.startup_timeout_secs))
        }
    }

    /// Pending-buffer byte cap, `None` when unbounded.
    pub const fn pending_cap(&self) -> Option<usize> {
        if self.max_pending_bytes == 0 {
            None
        } else {
            Some(self.max_pending_bytes)
        }
    }
}

/// Load configuration with hierarchical resolution.
///
/// An explicit `path` must exist; the global path is optional.
pub fn load_config(path: Option<&Path>) -> Result<RelayConfig> {
    let mut config = match path {
        Some(path) => load_config_file(path)?,
        None => match global_config_path() {
            Some(global) if global.exists() => load_config_file(&global)?,
            _ => RelayConfig::default(),
        },
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;

    Ok(config)
}

/// Path of the per-user config file, `$XDG_CONFIG_HOME/pipecast/relay.json`
/// falling back to `~/.config/pipecast/relay.json`.
pub fn global_config_path() -> Option<PathBuf> {
    config_path_from(|key| std::env::var(key).ok())
}

fn config_path_from<F>(lookup: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    let base = lookup("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| lookup("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    Some(base.join("pipecast").join("relay.json"))
}

fn load_config_file(path: &Path) -> Result<RelayConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Apply environment overrides using `lookup` to read variables.
///
/// `PORT` follows the hosting-platform convention and is deliberately
/// unprefixed. A present but unparseable value is a configuration error.
pub fn apply_env_overrides<F>(config: &mut RelayConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("PORT") {
        config.server.port = val
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("PORT is not a valid port: {val:?}")))?;
    }
    if let Some(val) = lookup("PIPECAST_FFMPEG") {
        config.encoder.program = PathBuf::from(val);
    }
    if let Some(val) = lookup("PIPECAST_STARTUP_TIMEOUT") {
        config.session.startup_timeout_secs = val.trim().parse().map_err(|_| {
            Error::Config(format!("PIPECAST_STARTUP_TIMEOUT is not a number: {val:?}"))
        })?;
    }
    Ok(())
}
