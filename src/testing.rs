//! Fakes de los colaboradores externos para tests del núcleo.
//!
//! They only touch the filesystem through `std::fs`, so they are safe to use
//! under `#[tokio::test(start_paused = true)]`.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{oneshot, Semaphore};

use crate::{
    audio::transport::{PlaybackEnd, PlaybackHandle, TrackControl, Transport},
    error::{PlaybackError, PlaybackResult},
    sources::{normalize_query, Downloader, Resolver, TrackInfo},
};

pub fn track(id: &str, size: u64) -> TrackInfo {
    TrackInfo {
        id: id.to_string(),
        title: format!("Título {}", id),
        locator: format!("https://example.com/{}", id),
        estimated_size_bytes: size,
        duration: Some(Duration::from_secs(180)),
    }
}

/// Resuelve cualquier consulta a un track cuyo id es la consulta normalizada.
#[derive(Default)]
pub struct FakeResolver {
    tracks: Mutex<HashMap<String, TrackInfo>>,
    failures: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl FakeResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_track(self: Arc<Self>, query: &str, info: TrackInfo) -> Arc<Self> {
        self.tracks.lock().insert(normalize_query(query), info);
        self
    }

    pub fn failing(self: Arc<Self>, query: &str) -> Arc<Self> {
        self.failures.lock().insert(normalize_query(query));
        self
    }

    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.delay.lock() = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolver for FakeResolver {
    async fn resolve(&self, query: &str) -> PlaybackResult<TrackInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = normalize_query(query);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failures.lock().contains(&key) {
            return Err(PlaybackError::resolution(query, "sin resultados"));
        }

        let known = self.tracks.lock().get(&key).cloned();
        Ok(known.unwrap_or_else(|| track(&key.replace(' ', "-"), 100)))
    }
}

/// Escribe `size` bytes en el destino; opcionalmente con retardo o compuerta.
pub struct FakeDownloader {
    size: u64,
    delay: Mutex<Option<Duration>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    failures: Mutex<HashSet<String>>,
    fetches: AtomicUsize,
}

impl FakeDownloader {
    pub fn new(size: u64) -> Arc<Self> {
        Arc::new(Self {
            size,
            delay: Mutex::new(None),
            gate: Mutex::new(None),
            failures: Mutex::new(HashSet::new()),
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.delay.lock() = Some(delay);
        self
    }

    /// Las descargas esperan a que el test llame a [`FakeDownloader::open_gate`].
    pub fn gated(self: Arc<Self>) -> Arc<Self> {
        *self.gate.lock() = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn open_gate(&self, downloads: usize) {
        if let Some(gate) = self.gate.lock().as_ref() {
            gate.add_permits(downloads);
        }
    }

    pub fn failing(self: Arc<Self>, id: &str) -> Arc<Self> {
        self.failures.lock().insert(id.to_string());
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn fetch(&self, track: &TrackInfo, destination: &Path) -> PlaybackResult<u64> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| PlaybackError::resolution(&track.title, e))?;
            permit.forget();
        }

        if self.failures.lock().contains(&track.id) {
            return Err(PlaybackError::resolution(&track.title, "descarga fallida"));
        }

        std::fs::write(destination, vec![0u8; self.size as usize])
            .map_err(|e| PlaybackError::resolution(&track.title, e))?;
        Ok(self.size)
    }
}

/// Control que registra las llamadas y termina el track al detenerlo.
#[derive(Default)]
pub struct FakeControl {
    end: Mutex<Option<oneshot::Sender<PlaybackEnd>>>,
    pub pauses: AtomicUsize,
    pub resumes: AtomicUsize,
    pub stopped: AtomicBool,
}

impl FakeControl {
    pub fn finish(&self, end: PlaybackEnd) {
        if let Some(sender) = self.end.lock().take() {
            let _ = sender.send(end);
        }
    }
}

impl TrackControl for FakeControl {
    fn pause(&self) -> PlaybackResult<()> {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> PlaybackResult<()> {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.finish(PlaybackEnd::Finished);
    }
}

/// Transporte en memoria; los tracks sólo terminan con [`FakeTransport::finish_current`] o al detenerlos.
#[derive(Default)]
pub struct FakeTransport {
    connects: Mutex<Vec<(GuildId, ChannelId)>>,
    plays: Mutex<Vec<PathBuf>>,
    controls: Mutex<Vec<Arc<FakeControl>>>,
    disconnects: AtomicUsize,
    disconnect_delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<&'static str>>,
    fail_connect: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `disconnect` tarda `delay` en completarse
    pub fn with_disconnect_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.disconnect_delay.lock() = Some(delay);
        self
    }

    /// Llamadas recibidas, en orden
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Termina el último track iniciado
    pub fn finish_current(&self, end: PlaybackEnd) {
        if let Some(control) = self.controls.lock().last() {
            control.finish(end);
        }
    }

    pub fn current_control(&self) -> Option<Arc<FakeControl>> {
        self.controls.lock().last().cloned()
    }

    pub fn connects(&self) -> Vec<(GuildId, ChannelId)> {
        self.connects.lock().clone()
    }

    pub fn plays(&self) -> Vec<PathBuf> {
        self.plays.lock().clone()
    }

    /// Nombres de archivo reproducidos, en orden
    pub fn played_stems(&self) -> Vec<String> {
        self.plays
            .lock()
            .iter()
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, guild: GuildId, channel: ChannelId) -> PlaybackResult<()> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(PlaybackError::Transport("conexión rechazada".into()));
        }
        self.connects.lock().push((guild, channel));
        self.calls.lock().push("connect");
        Ok(())
    }

    async fn play(&self, _guild: GuildId, path: &Path) -> PlaybackResult<PlaybackHandle> {
        let (tx, rx) = oneshot::channel();
        let control = Arc::new(FakeControl {
            end: Mutex::new(Some(tx)),
            ..Default::default()
        });

        self.plays.lock().push(path.to_path_buf());
        self.calls.lock().push("play");
        self.controls.lock().push(control.clone());

        Ok(PlaybackHandle {
            control,
            finished: rx,
        })
    }

    async fn disconnect(&self, _guild: GuildId) {
        self.calls.lock().push("disconnect-start");
        let delay = *self.disconnect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push("disconnect");
    }
}
