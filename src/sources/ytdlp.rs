use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::{path::Path, time::Duration};
use tracing::{debug, info};

use super::{is_url, Downloader, Resolver, TrackInfo};
use crate::error::{PlaybackError, PlaybackResult};

/// Bytes por segundo a 192 kbps, para estimar el tamaño de la descarga
const BYTES_PER_SECOND_192K: u64 = 192_000 / 8;

/// Estimación cuando yt-dlp no reporta duración ni tamaño
const FALLBACK_ESTIMATE_BYTES: u64 = 10 * 1024 * 1024;

/// Cliente para resolver y descargar con yt-dlp
pub struct YtDlpClient {
    binary: String,
    audio_format: String,
    // Limitar procesos concurrentes de yt-dlp
    limiter: tokio::sync::Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: String,
    duration: Option<f64>,
    webpage_url: Option<String>,
    filesize: Option<u64>,
    filesize_approx: Option<u64>,
    #[serde(default)]
    entries: Vec<YtDlpInfo>,
}

impl YtDlpClient {
    pub fn new(binary: impl Into<String>, audio_format: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            audio_format: audio_format.into(),
            limiter: tokio::sync::Semaphore::new(3),
        }
    }

    /// Verifica que yt-dlp esté instalado
    pub async fn verify_available(&self) -> anyhow::Result<String> {
        let output = Command::new(&self.binary).arg("--version").output().await?;
        if !output.status.success() {
            anyhow::bail!("{} --version falló", self.binary);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn search_target(query: &str) -> String {
        let query = query.trim();
        if is_url(query) {
            // Sólo la URL, ignorando palabras extra
            query.split_whitespace().next().unwrap_or(query).to_string()
        } else {
            format!("ytsearch1:{}", query)
        }
    }

    fn parse_info(query: &str, stdout: &str) -> PlaybackResult<TrackInfo> {
        let line = stdout
            .lines()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| PlaybackError::resolution(query, "yt-dlp no devolvió resultados"))?;

        let mut info: YtDlpInfo = serde_json::from_str(line)
            .map_err(|e| PlaybackError::resolution(query, format!("respuesta inválida: {}", e)))?;

        // Playlists y búsquedas: primer elemento
        if !info.entries.is_empty() {
            info = info.entries.remove(0);
        }

        let duration = info
            .duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(Duration::from_secs_f64);

        let estimated_size_bytes = info
            .filesize
            .or(info.filesize_approx)
            .or_else(|| duration.map(|d| d.as_secs().max(1) * BYTES_PER_SECOND_192K))
            .unwrap_or(FALLBACK_ESTIMATE_BYTES);

        let locator = info
            .webpage_url
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", info.id));

        Ok(TrackInfo {
            id: info.id,
            title: info.title,
            locator,
            estimated_size_bytes,
            duration,
        })
    }
}

#[async_trait]
impl Resolver for YtDlpClient {
    async fn resolve(&self, query: &str) -> PlaybackResult<TrackInfo> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| PlaybackError::resolution(query, e))?;

        let target = Self::search_target(query);
        info!("🔍 Resolviendo con yt-dlp: {}", target);

        let output = Command::new(&self.binary)
            .args([
                "--no-playlist",
                "--dump-json",
                "--skip-download",
                "--no-warnings",
                target.as_str(),
            ])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PlaybackError::resolution(query, format!("no se pudo ejecutar yt-dlp: {}", e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(PlaybackError::resolution(query, format!("yt-dlp error: {}", error.trim())));
        }

        let info = Self::parse_info(query, &String::from_utf8_lossy(&output.stdout))?;
        debug!("📊 Resuelto '{}' → {} ({})", query, info.title, info.id);
        Ok(info)
    }
}

#[async_trait]
impl Downloader for YtDlpClient {
    async fn fetch(&self, track: &TrackInfo, destination: &Path) -> PlaybackResult<u64> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| PlaybackError::resolution(&track.title, e))?;

        // yt-dlp pone la extensión final tras extraer el audio
        let template = destination.with_extension("%(ext)s");
        info!("⬇️ Descargando {} en {}", track.locator, destination.display());

        let output = Command::new(&self.binary)
            .args([
                "--no-playlist",
                "--no-warnings",
                "-f",
                "worstaudio/worst",
                "-x",
                "--audio-format",
                self.audio_format.as_str(),
                "--audio-quality",
                "192K",
                "-o",
            ])
            .arg(&template)
            .arg(&track.locator)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                PlaybackError::resolution(&track.title, format!("no se pudo ejecutar yt-dlp: {}", e))
            })?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(PlaybackError::resolution(
                &track.title,
                format!("descarga fallida: {}", error.trim()),
            ));
        }

        let metadata = tokio::fs::metadata(destination).await.map_err(|e| {
            PlaybackError::resolution(
                &track.title,
                format!("el archivo descargado no está en {}: {}", destination.display(), e),
            )
        })?;

        info!("✅ Descarga completa: {} ({} bytes)", track.title, metadata.len());
        Ok(metadata.len())
    }
}
