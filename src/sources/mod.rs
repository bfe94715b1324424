//! # Sources Module
//!
//! Collaborators that turn a user query into a playable file on disk.
//!
//! - [`Resolver`]: query or URL → [`TrackInfo`] (id, title, locator, size estimate)
//! - [`Downloader`]: [`TrackInfo`] → audio file at a given path
//!
//! [`ytdlp::YtDlpClient`] implements both on top of the `yt-dlp` binary.

pub mod ytdlp;

use async_trait::async_trait;
use regex::Regex;
use std::{
    path::Path,
    sync::LazyLock,
    time::Duration,
};

use crate::error::PlaybackResult;

pub use ytdlp::YtDlpClient;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("regex válida"));

/// Metadata de un track resuelto
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    /// Identificador estable de la fuente (clave de la caché)
    pub id: String,
    pub title: String,
    /// URL de la página del track
    pub locator: String,
    pub estimated_size_bytes: u64,
    pub duration: Option<Duration>,
}

/// Resuelve una consulta de texto o URL a un track concreto
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, query: &str) -> PlaybackResult<TrackInfo>;
}

/// Descarga el audio de un track a una ruta local
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Devuelve el tamaño en bytes del archivo escrito en `destination`.
    async fn fetch(&self, track: &TrackInfo, destination: &Path) -> PlaybackResult<u64>;
}

/// Clave de deduplicación de una consulta.
///
/// Las URLs quedan tal cual; el texto libre se recorta, pasa a minúsculas y
/// colapsa los espacios.
pub fn normalize_query(query: &str) -> String {
    let trimmed = query.trim();
    if is_url(trimmed) {
        trimmed.to_string()
    } else {
        WHITESPACE.replace_all(trimmed, " ").to_lowercase()
    }
}

/// Verifica si la consulta empieza con una URL http(s)
pub fn is_url(query: &str) -> bool {
    let first_word = query.split_whitespace().next().unwrap_or_default();
    url::Url::parse(first_word)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}
