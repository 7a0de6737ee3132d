pub mod action;
pub mod capture;
pub mod error;
pub mod native;
pub mod pipeline;
pub mod server;
pub mod utils;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use action::{ActionHandler, LogActions};
pub use capture::{Encoding, Frame, FrameSource, PixelFormat};
pub use error::{BridgeError, Error, FrameError, SessionError, SourceError, SubmitError};
pub use native::NativeBridge;
pub use pipeline::{Advance, FrameExchange, FramePump, Rendezvous, ResultChannel, Shutdown};
pub use server::{RunningServer, Server};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub exchange: ExchangeConfig,
    pub source: SourceConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// How long a consumer waits for a new frame
    pub timeout_ms: u64,
    /// Multiple of the timeout after which a stuck submitter's frame is reused
    pub stall_factor: u32,
    /// Bound on waiting for a result; unset waits until shutdown
    pub result_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Image directory; a synthetic pattern is served when unset
    pub directory: Option<PathBuf>,
    pub encoding: Encoding,
    /// Give every connection its own source and channels
    pub per_connection: bool,
    pub pattern_width: u32,
    pub pattern_height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Answer bad requests with `{"error": ...}` instead of staying silent
    pub report_errors: bool,
    pub camera_id: String,
    pub camera_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Config {
    /// Defaults, then the optional TOML file, then `VIA_` environment
    /// variables (`VIA_SERVER__PORT=9001`).
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix("VIA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

impl ExchangeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn result_timeout(&self) -> Option<Duration> {
        self.result_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 9000,
        }
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 1000,
            stall_factor: 3,
            result_timeout_ms: None,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            directory: None,
            encoding: Encoding::Raw,
            per_connection: false,
            pattern_width: 800,
            pattern_height: 600,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            report_errors: false,
            camera_id: "via-bridge".into(),
            camera_name: "VIA bridge camera".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "via_bridge=info".into(),
        }
    }
}
