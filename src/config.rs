use crate::audio::{DecodingPlayer, NullSink, PcmSink, WavDirSink};
use crate::session::{LatePartialPolicy, SessionConfig};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Environment variable prefix; `VOICE_CHAT__CONNECTION__URL` overrides `connection.url`
pub const ENV_PREFIX: &str = "VOICE_CHAT";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub session: ChatConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_http_bind")]
    pub bind: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct ConnectionConfig {
    /// Base WebSocket endpoint; the client id is appended as a path segment
    #[serde(default = "default_url")]
    pub url: String,
    /// Generated per run when unset
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct PlaybackConfig {
    /// Codec hint for incoming speech segments
    #[serde(default = "default_codec")]
    pub codec: String,
    /// Write played segments here as WAV files
    #[serde(default)]
    pub output_dir: Option<String>,
    /// Hold each segment for its real duration before playing the next
    #[serde(default = "default_true")]
    pub pace: bool,
}

#[derive(Debug, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_timeslice_ms")]
    pub timeslice_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatConfig {
    #[serde(default)]
    pub greeting: Option<String>,
    #[serde(default)]
    pub late_partial: LatePartialPolicy,
}

fn default_service_name() -> String {
    "voice-chat".to_string()
}

fn default_http_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    8002
}

fn default_url() -> String {
    "ws://localhost:8001/ws/chat".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_codec() -> String {
    "mp3".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeslice_ms() -> u64 {
    250
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_http_bind(),
            port: default_http_port(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            client_id: None,
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            codec: default_codec(),
            output_dir: None,
            pace: true,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            timeslice_ms: default_timeslice_ms(),
        }
    }
}

impl Config {
    /// Load `path` (any format the `config` crate infers from the extension;
    /// the file is optional) with `VOICE_CHAT__*` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        Ok(settings.try_deserialize()?)
    }

    /// Session settings, generating a client id if none is configured
    pub fn session_config(&self) -> SessionConfig {
        let defaults = SessionConfig::default();
        SessionConfig {
            client_id: self
                .connection
                .client_id
                .clone()
                .unwrap_or(defaults.client_id),
            reconnect_delay: Duration::from_millis(self.connection.reconnect_delay_ms),
            greeting: self.session.greeting.clone(),
            late_partial: self.session.late_partial,
        }
    }

    /// `connection.url` with the client id appended as the last path segment
    pub fn endpoint(&self, client_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.connection.url)
            .with_context(|| format!("Invalid connection.url: {}", self.connection.url))?;

        let base = url.to_string();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("connection.url cannot take a path: {}", base))?
            .pop_if_empty()
            .push(client_id);

        Ok(url)
    }

    pub fn capture_timeslice(&self) -> Duration {
        Duration::from_millis(self.capture.timeslice_ms.max(1))
    }

    /// Player for incoming speech segments as configured under `playback`
    pub fn build_player(&self) -> Result<DecodingPlayer> {
        let sink: Arc<dyn PcmSink> = match &self.playback.output_dir {
            Some(dir) => Arc::new(
                WavDirSink::new(dir).context("Failed to set up playback output directory")?,
            ),
            None => Arc::new(NullSink),
        };

        let player = DecodingPlayer::new(self.playback.codec.clone(), sink);
        Ok(if self.playback.pace {
            player
        } else {
            player.without_pacing()
        })
    }
}
