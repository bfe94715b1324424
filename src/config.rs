use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::error::PlaybackError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Caché de audio
    pub cache_dir: PathBuf,
    pub cache_capacity_mb: u64,
    pub audio_format: String,
    pub metadata_ttl_secs: u64,

    // Sesiones
    pub idle_timeout_secs: u64,
    pub idle_poll_ms: u64,
    pub max_queue_size: usize,

    // Límites
    pub max_song_duration: u64,     // En segundos
    pub resolve_timeout_secs: u64,  // Por búsqueda
    pub download_timeout_secs: u64, // Por descarga

    // Herramientas externas
    pub ytdlp_path: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Caché
            cache_dir: std::env::var("CACHE_DIR")
                .unwrap_or_else(|_| "audiocache".to_string())
                .into(),
            cache_capacity_mb: std::env::var("CACHE_CAPACITY_MB")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
            audio_format: std::env::var("AUDIO_FORMAT").unwrap_or_else(|_| "mp3".to_string()),
            metadata_ttl_secs: std::env::var("METADATA_TTL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()?,

            // Sesiones
            idle_timeout_secs: std::env::var("IDLE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,
            idle_poll_ms: std::env::var("IDLE_POLL_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,

            // Límites
            max_song_duration: std::env::var("MAX_SONG_DURATION")
                .unwrap_or_else(|_| "3600".to_string()) // 1 hora
                .parse()?,
            resolve_timeout_secs: std::env::var("RESOLVE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            download_timeout_secs: std::env::var("DOWNLOAD_TIMEOUT_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,

            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Cache capacity must be greater than 0 and fit in bytes
    /// - Audio format must be a bare extension (`mp3`, not `.mp3`)
    /// - The idle poll interval must be shorter than the idle timeout
    /// - Queue size, song duration and timeouts must be greater than 0
    pub fn validate(&self) -> Result<(), PlaybackError> {
        if self.cache_capacity_mb == 0 {
            return Err(PlaybackError::Configuration(
                "CACHE_CAPACITY_MB debe ser mayor que 0".into(),
            ));
        }

        if self.audio_format.is_empty() || self.audio_format.starts_with('.') {
            return Err(PlaybackError::Configuration(format!(
                "AUDIO_FORMAT debe ser una extensión sin punto, recibido: '{}'",
                self.audio_format
            )));
        }

        if self.cache_capacity_mb.checked_mul(1024 * 1024).is_none() {
            return Err(PlaybackError::Configuration(format!(
                "CACHE_CAPACITY_MB fuera de rango: {}",
                self.cache_capacity_mb
            )));
        }

        let idle_timeout_ms = self.idle_timeout_secs.checked_mul(1000).ok_or_else(|| {
            PlaybackError::Configuration(format!(
                "IDLE_TIMEOUT_SECS fuera de rango: {}",
                self.idle_timeout_secs
            ))
        })?;

        if self.idle_poll_ms == 0 || self.idle_poll_ms > idle_timeout_ms {
            return Err(PlaybackError::Configuration(format!(
                "IDLE_POLL_MS ({}) debe estar entre 1 y IDLE_TIMEOUT_SECS ({}s)",
                self.idle_poll_ms, self.idle_timeout_secs
            )));
        }

        if self.max_queue_size == 0 {
            return Err(PlaybackError::Configuration(
                "MAX_QUEUE_SIZE debe ser mayor que 0".into(),
            ));
        }

        if self.max_song_duration == 0
            || self.resolve_timeout_secs == 0
            || self.download_timeout_secs == 0
        {
            return Err(PlaybackError::Configuration(
                "MAX_SONG_DURATION, RESOLVE_TIMEOUT_SECS y DOWNLOAD_TIMEOUT_SECS deben ser mayores que 0"
                    .into(),
            ));
        }

        Ok(())
    }

    pub fn cache_capacity_bytes(&self) -> u64 {
        self.cache_capacity_mb.saturating_mul(1024 * 1024)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the Discord token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Cache: {} MB en {} ({})\n  \
            Sessions: idle {} (poll {}), queue {}\n  \
            Limits: {}s max duration, {}s resolve / {}s download timeout",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.cache_capacity_mb,
            self.cache_dir.display(),
            self.audio_format,
            humantime::format_duration(self.idle_timeout()),
            humantime::format_duration(self.idle_poll_interval()),
            self.max_queue_size,
            self.max_song_duration,
            self.resolve_timeout_secs,
            self.download_timeout_secs,
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            cache_dir: "audiocache".into(),
            cache_capacity_mb: 100,
            audio_format: "mp3".to_string(),
            metadata_ttl_secs: 3600,

            idle_timeout_secs: 20,
            idle_poll_ms: 1000,
            max_queue_size: 100,

            max_song_duration: 3600,
            resolve_timeout_secs: 60,
            download_timeout_secs: 300,

            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}
