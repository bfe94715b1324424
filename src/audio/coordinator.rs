use std::{path::Path, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use super::flight::SingleFlight;
use crate::{
    cache::{AudioCache, CacheLease, TrackMetadataCache},
    config::Config,
    error::{PlaybackError, PlaybackResult},
    sources::{normalize_query, Downloader, Resolver, TrackInfo},
};

/// Track listo para reproducir: metadata más un pin sobre su archivo.
#[derive(Debug)]
pub struct ResolvedTrack {
    pub info: TrackInfo,
    lease: CacheLease,
}

impl ResolvedTrack {
    pub fn path(&self) -> &Path {
        self.lease.path()
    }

    pub fn key(&self) -> &str {
        self.lease.key()
    }

    pub fn title(&self) -> &str {
        &self.info.title
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub max_track_duration: Duration,
    pub resolve_timeout: Duration,
    pub download_timeout: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            max_track_duration: Duration::from_secs(3600),
            resolve_timeout: Duration::from_secs(60),
            download_timeout: Duration::from_secs(300),
        }
    }
}

impl From<&Config> for CoordinatorSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_track_duration: Duration::from_secs(config.max_song_duration),
            resolve_timeout: Duration::from_secs(config.resolve_timeout_secs),
            download_timeout: Duration::from_secs(config.download_timeout_secs),
        }
    }
}

/// Convierte consultas en archivos en caché, deduplicando trabajo en curso.
///
/// Hay dos niveles de deduplicación:
/// - por consulta normalizada: una sola búsqueda para peticiones idénticas;
/// - por id de track: una sola descarga aunque las consultas difieran.
///
/// Ninguno reintenta; un error llega igual a todos los que esperan.
pub struct ResolutionCoordinator {
    cache: Arc<AudioCache>,
    resolver: Arc<dyn Resolver>,
    downloader: Arc<dyn Downloader>,
    metadata: Arc<TrackMetadataCache>,
    lookups: SingleFlight<TrackInfo>,
    downloads: SingleFlight<Arc<ResolvedTrack>>,
    settings: CoordinatorSettings,
}

impl ResolutionCoordinator {
    pub fn new(
        cache: Arc<AudioCache>,
        resolver: Arc<dyn Resolver>,
        downloader: Arc<dyn Downloader>,
        metadata: Arc<TrackMetadataCache>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            cache,
            resolver,
            downloader,
            metadata,
            lookups: SingleFlight::new(),
            downloads: SingleFlight::new(),
            settings,
        }
    }

    pub fn cache(&self) -> &Arc<AudioCache> {
        &self.cache
    }

    /// Resuelve una consulta a un archivo local con pin.
    pub async fn resolve(&self, query: &str) -> PlaybackResult<Arc<ResolvedTrack>> {
        let info = self.lookup(query).await?;

        let max = self.settings.max_track_duration;
        if let Some(duration) = info.duration.filter(|d| *d > max) {
            warn!("⏱️ '{}' dura {:?}, excede el máximo", info.title, duration);
            return Err(PlaybackError::TrackTooLong {
                duration_secs: duration.as_secs(),
                max_secs: max.as_secs(),
            });
        }

        if let Some(lease) = self.cache.lease(&info.id) {
            debug!("🎯 Cache hit: {} ({})", info.title, info.id);
            return Ok(Arc::new(ResolvedTrack { info, lease }));
        }

        self.download(info).await
    }

    async fn lookup(&self, query: &str) -> PlaybackResult<TrackInfo> {
        let key = normalize_query(query);
        if let Some(info) = self.metadata.get(&key) {
            debug!("🎯 Metadata en memoria para '{}'", key);
            return Ok(info);
        }

        let resolver = self.resolver.clone();
        let metadata = self.metadata.clone();
        let timeout = self.settings.resolve_timeout;
        let query = query.to_string();
        let memo_key = key.clone();

        self.lookups
            .run(&key, move || async move {
                let info = tokio::time::timeout(timeout, resolver.resolve(&query))
                    .await
                    .map_err(|_| {
                        warn!("⏱️ La búsqueda de '{}' no respondió a tiempo", query);
                        PlaybackError::resolution(
                            &query,
                            format!("la búsqueda superó {}", humantime::format_duration(timeout)),
                        )
                    })??;
                metadata.insert(memo_key, info.clone());
                Ok(info)
            })
            .await
    }

    async fn download(&self, info: TrackInfo) -> PlaybackResult<Arc<ResolvedTrack>> {
        let cache = self.cache.clone();
        let downloader = self.downloader.clone();
        let timeout = self.settings.download_timeout;
        let id = info.id.clone();

        self.downloads
            .run(&id, move || async move {
                // Otro flight pudo terminar entre el lookup y este punto
                if let Some(lease) = cache.lease(&info.id) {
                    return Ok(Arc::new(ResolvedTrack { info, lease }));
                }

                cache.reserve(&info.id, info.estimated_size_bytes)?;
                let destination = cache.path_for(&info.id);

                let fetched =
                    match tokio::time::timeout(timeout, downloader.fetch(&info, &destination)).await {
                        Ok(result) => result,
                        Err(_) => Err(PlaybackError::resolution(
                            &info.title,
                            format!(
                                "la descarga superó {}",
                                humantime::format_duration(timeout)
                            ),
                        )),
                    };

                match fetched {
                    Ok(size_bytes) => {
                        let lease = cache.commit_lease(&info.id, size_bytes)?;
                        info!("✅ Listo para reproducir: {}", info.title);
                        Ok(Arc::new(ResolvedTrack { info, lease }))
                    }
                    Err(e) => {
                        cache.cancel_reservation(&info.id);
                        discard_partial(&destination);
                        Err(e)
                    }
                }
            })
            .await
    }
}

fn discard_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("🗑️ Descarga parcial eliminada: {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("⚠️ No se pudo borrar la descarga parcial {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        sources::{MockDownloader, MockResolver},
        testing::{track, FakeDownloader, FakeResolver},
    };
    use pretty_assertions::assert_eq;

    fn coordinator(
        resolver: Arc<dyn Resolver>,
        downloader: Arc<dyn Downloader>,
        capacity: u64,
    ) -> (tempfile::TempDir, ResolutionCoordinator) {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(AudioCache::open(dir.path(), capacity, "mp3").unwrap());
        let coordinator = ResolutionCoordinator::new(
            cache,
            resolver,
            downloader,
            Arc::new(TrackMetadataCache::new(Duration::from_secs(60))),
            CoordinatorSettings::default(),
        );
        (dir, coordinator)
    }

    #[tokio::test]
    async fn test_resolver_error_propagates_without_download() {
        let mut resolver = MockResolver::new();
        resolver
            .expect_resolve()
            .times(1)
            .returning(|q| Err(PlaybackError::resolution(q, "sin resultados")));
        let mut downloader = MockDownloader::new();
        downloader.expect_fetch().never();

        let (_dir, coordinator) = coordinator(Arc::new(resolver), Arc::new(downloader), 1024);
        let err = coordinator.resolve("X").await.unwrap_err();

        assert_eq!(err, PlaybackError::resolution("X", "sin resultados"));
        assert_eq!(coordinator.cache().stats().reserved_bytes, 0);
    }

    #[tokio::test]
    async fn test_metadata_memo_skips_resolver() {
        let mut resolver = MockResolver::new();
        resolver
            .expect_resolve()
            .times(1)
            .returning(|_| Ok(track("abc", 100)));
        let downloader = FakeDownloader::new(100);

        let (_dir, coordinator) = coordinator(Arc::new(resolver), downloader.clone(), 1024);

        let first = coordinator.resolve("Mi Canción").await.unwrap();
        drop(first);
        let second = coordinator.resolve("  mi   canción").await.unwrap();

        assert_eq!(second.key(), "abc");
        // Segunda vez: cache hit, sin descarga
        assert_eq!(downloader.fetches(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_identical_resolves_download_once() {
        let resolver = FakeResolver::new().with_track("x", track("x-id", 100));
        let downloader = FakeDownloader::new(100).with_delay(Duration::from_millis(50));
        let (_dir, coordinator) = coordinator(resolver.clone(), downloader.clone(), 1024);

        let (a, b, c) = tokio::join!(
            coordinator.resolve("x"),
            coordinator.resolve("x"),
            coordinator.resolve("X "),
        );
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

        assert_eq!(downloader.fetches(), 1);
        assert_eq!(resolver.calls(), 1);
        assert_eq!(a.path(), b.path());
        assert_eq!(b.path(), c.path());
        assert!(coordinator.cache().is_pinned("x-id"));

        drop((a, b, c));
        assert!(!coordinator.cache().is_pinned("x-id"));
    }

    #[tokio::test]
    async fn test_too_large_fails_without_download() {
        let resolver = FakeResolver::new().with_track("big", track("big-id", 5000));
        let downloader = FakeDownloader::new(5000);
        let (_dir, coordinator) = coordinator(resolver, downloader.clone(), 1024);

        let err = coordinator.resolve("big").await.unwrap_err();
        assert!(matches!(err, PlaybackError::InsufficientCapacity { .. }));
        assert_eq!(downloader.fetches(), 0);
    }

    #[tokio::test]
    async fn test_download_failure_cancels_reservation() {
        let resolver = FakeResolver::new().with_track("x", track("x-id", 100));
        let downloader = FakeDownloader::new(100).failing("x-id");
        let (_dir, coordinator) = coordinator(resolver, downloader, 1024);

        assert!(coordinator.resolve("x").await.is_err());
        let stats = coordinator.cache().stats();
        assert_eq!(stats.reserved_bytes, 0);
        assert_eq!(stats.entries, 0);
    }

    #[tokio::test]
    async fn test_rejects_tracks_over_max_duration() {
        let mut long = track("long", 100);
        long.duration = Some(Duration::from_secs(7200));
        let resolver = FakeResolver::new().with_track("long", long);
        let downloader = FakeDownloader::new(100);
        let (_dir, coordinator) = coordinator(resolver, downloader.clone(), 1024);

        assert_eq!(
            coordinator.resolve("long").await.unwrap_err(),
            PlaybackError::TrackTooLong {
                duration_secs: 7200,
                max_secs: 3600
            }
        );
        assert_eq!(downloader.fetches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_lookup_times_out_and_is_not_joined() {
        let resolver = FakeResolver::new().with_delay(Duration::from_secs(3600));
        let downloader = FakeDownloader::new(100);
        let (_dir, coordinator) = coordinator(resolver.clone(), downloader.clone(), 1024);

        let err = coordinator.resolve("colgado").await.unwrap_err();
        assert!(matches!(err, PlaybackError::ResolutionFailed { .. }));
        assert_eq!(coordinator.lookups.in_flight(), 0);

        // La siguiente petición lanza una búsqueda nueva
        assert!(coordinator.resolve("colgado").await.is_err());
        assert_eq!(resolver.calls(), 2);
        assert_eq!(downloader.fetches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_timeout() {
        let resolver = FakeResolver::new().with_track("slow", track("slow-id", 100));
        let downloader = FakeDownloader::new(100).with_delay(Duration::from_secs(600));
        let (_dir, coordinator) = coordinator(resolver, downloader, 1024);

        let err = coordinator.resolve("slow").await.unwrap_err();
        assert!(matches!(err, PlaybackError::ResolutionFailed { .. }));
        assert_eq!(coordinator.cache().stats().reserved_bytes, 0);
    }
}
