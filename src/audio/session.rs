//! Sesión de reproducción de un guild.
//!
//! A [`PlaybackSession`] owns the FIFO queue of one guild and a single loop
//! task that drains it:
//!
//! ```text
//!            enqueue                 resolve ok             track end / skip
//!  Idle ───────────────► Waiting ─────────────────► Playing ─────────────────► Waiting | Idle
//!   │                      │  resolve error: next      │ ▲
//!   │ idle timeout         │                     pause │ │ resume
//!   ▼                      ▼                           ▼ │
//!  Stopped ◄──────────── stop ──────────────────────── Paused
//! ```
//!
//! All mutable state sits behind one `parking_lot::Mutex` that is never held
//! across an `.await`. Command handlers and the loop task synchronize through
//! that lock plus two [`Notify`] signals: `wake` (new work or stop) and
//! `interrupt` (skip or stop while resolving/playing). A stopped session
//! stays registered until its teardown (voice disconnect included) is done,
//! so a replacement for the same guild never overlaps it.

use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};

use super::{
    coordinator::{ResolutionCoordinator, ResolvedTrack},
    events::{EventBus, SessionEvent, SessionEventKind, StopReason},
    queue::{Request, TrackQueue},
    registry::SessionRegistry,
    transport::{PlaybackEnd, PlaybackHandle, TrackControl, Transport},
};
use crate::{
    config::Config,
    error::{PlaybackError, PlaybackResult},
};

const WATCHDOG_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Waiting,
    Playing,
    Paused,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub idle_timeout: Duration,
    pub idle_poll: Duration,
    pub max_queue_size: usize,
    pub max_track_duration: Duration,
}

impl SessionSettings {
    /// Ticks de sondeo vacíos antes de cerrar la sesión
    fn idle_threshold(&self) -> u32 {
        let poll = self.idle_poll.as_millis().max(1);
        (self.idle_timeout.as_millis() / poll).max(1) as u32
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(20),
            idle_poll: Duration::from_secs(1),
            max_queue_size: 100,
            max_track_duration: Duration::from_secs(3600),
        }
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            idle_timeout: config.idle_timeout(),
            idle_poll: config.idle_poll_interval(),
            max_queue_size: config.max_queue_size,
            max_track_duration: Duration::from_secs(config.max_song_duration),
        }
    }
}

/// Resultado de `/skip`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipOutcome {
    /// Quedan `remaining` peticiones después de la siguiente
    Next { remaining: usize },
    /// No hay nada más en cola; la sesión quedará inactiva
    QueueEmpty,
}

/// Resultado de `/resume`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    Resumed,
    AlreadyPlaying,
    NothingToResume,
}

/// Vista de la cola para `/queue`
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub state: PlayerState,
    pub current: Option<Request>,
    pub now_playing: Option<String>,
    pub duration: Option<Duration>,
    pub upcoming: Vec<Request>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Skip,
    Stop,
}

struct SessionState {
    queue: TrackQueue,
    current: Option<Request>,
    now_playing: Option<String>,
    duration: Option<Duration>,
    state: PlayerState,
    connected: Option<ChannelId>,
    idle_ticks: u32,
    loop_running: bool,
    control: Option<Arc<dyn TrackControl>>,
    interrupt: Option<Interrupt>,
    stop_reason: Option<StopReason>,
    announce_channel: Option<ChannelId>,
}

pub struct PlaybackSession {
    guild: GuildId,
    state: Mutex<SessionState>,
    wake: Notify,
    interrupt: Notify,
    closed: watch::Sender<bool>,
    coordinator: Arc<ResolutionCoordinator>,
    transport: Arc<dyn Transport>,
    events: EventBus,
    registry: Weak<SessionRegistry>,
    settings: SessionSettings,
}

impl PlaybackSession {
    pub(crate) fn new(
        guild: GuildId,
        coordinator: Arc<ResolutionCoordinator>,
        transport: Arc<dyn Transport>,
        events: EventBus,
        registry: Weak<SessionRegistry>,
        settings: SessionSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            guild,
            state: Mutex::new(SessionState {
                queue: TrackQueue::new(settings.max_queue_size),
                current: None,
                now_playing: None,
                duration: None,
                state: PlayerState::Idle,
                connected: None,
                idle_ticks: 0,
                loop_running: false,
                control: None,
                interrupt: None,
                stop_reason: None,
                announce_channel: None,
            }),
            wake: Notify::new(),
            interrupt: Notify::new(),
            closed: watch::channel(false).0,
            coordinator,
            transport,
            events,
            registry,
            settings,
        })
    }

    pub fn guild(&self) -> GuildId {
        self.guild
    }

    pub fn state(&self) -> PlayerState {
        self.state.lock().state
    }

    /// Canal de voz al que la sesión está conectada
    pub fn connected_channel(&self) -> Option<ChannelId> {
        self.state.lock().connected
    }

    /// Espera a que termine el cierre de la sesión
    pub(crate) async fn closed(&self) {
        let mut closed = self.closed.subscribe();
        // El emisor vive tanto como la sesión
        let _ = closed.wait_for(|closed| *closed).await;
    }

    /// Agrega una petición a la cola y arranca el loop si no está corriendo.
    ///
    /// Devuelve la posición (desde 1) en la cola de espera.
    pub fn enqueue(self: &Arc<Self>, request: Request) -> PlaybackResult<usize> {
        let (position, start_loop) = {
            let mut s = self.state.lock();
            if s.state == PlayerState::Stopped {
                return Err(PlaybackError::SessionClosed);
            }

            let position = s.queue.push(request.clone())?;
            if request.text_channel.is_some() {
                s.announce_channel = request.text_channel;
            }
            if s.state == PlayerState::Idle {
                s.state = PlayerState::Waiting;
            }
            s.idle_ticks = 0;

            let start_loop = !s.loop_running;
            s.loop_running = true;
            (position, start_loop)
        };

        self.emit(SessionEventKind::TrackQueued { request, position });

        if start_loop {
            let session = self.clone();
            tokio::spawn(async move { session.drive().await });
        }
        self.wake.notify_one();

        Ok(position)
    }

    /// Detiene la sesión: vacía la cola, corta el track y desconecta.
    pub async fn stop(self: &Arc<Self>) {
        self.stop_with(StopReason::Command).await;
    }

    pub(crate) async fn stop_with(self: &Arc<Self>, reason: StopReason) {
        let teardown_inline = {
            let mut s = self.state.lock();
            if s.state == PlayerState::Stopped {
                return;
            }
            s.state = PlayerState::Stopped;
            s.stop_reason = Some(reason);
            s.interrupt = Some(Interrupt::Stop);
            s.queue.clear();
            if let Some(control) = &s.control {
                control.stop();
            }
            !s.loop_running
        };

        info!("⏹️ Deteniendo sesión en guild {}", self.guild);
        self.wake.notify_one();
        self.interrupt.notify_waiters();

        // Sin loop, nadie más va a cerrar la sesión
        if teardown_inline {
            self.teardown().await;
        }
    }

    pub fn pause(&self) -> PlaybackResult<()> {
        {
            let mut s = self.state.lock();
            match (s.state, s.control.clone()) {
                (PlayerState::Paused, _) => return Ok(()),
                (PlayerState::Playing, Some(control)) => {
                    control.pause()?;
                    s.state = PlayerState::Paused;
                }
                _ => return Err(PlaybackError::NothingPlaying),
            }
        }

        info!("⏸️ Reproducción pausada en guild {}", self.guild);
        self.emit(SessionEventKind::Paused);
        Ok(())
    }

    pub fn resume(&self) -> PlaybackResult<ResumeOutcome> {
        {
            let mut s = self.state.lock();
            match s.state {
                PlayerState::Paused => {
                    if let Some(control) = &s.control {
                        control.resume()?;
                    }
                    s.state = PlayerState::Playing;
                }
                PlayerState::Playing => return Ok(ResumeOutcome::AlreadyPlaying),
                _ => return Ok(ResumeOutcome::NothingToResume),
            }
        }

        info!("▶️ Reproducción reanudada en guild {}", self.guild);
        self.emit(SessionEventKind::Resumed);
        Ok(ResumeOutcome::Resumed)
    }

    /// Corta la petición actual (resolviéndose o sonando) y pasa a la siguiente.
    pub fn skip(&self) -> PlaybackResult<SkipOutcome> {
        let pending = {
            let mut s = self.state.lock();
            let active = matches!(
                s.state,
                PlayerState::Waiting | PlayerState::Playing | PlayerState::Paused
            );
            if !active || s.current.is_none() {
                return Err(PlaybackError::NothingPlaying);
            }
            s.interrupt = Some(Interrupt::Skip);
            s.queue.len()
        };

        info!("⏭️ Saltando canción en guild {}", self.guild);
        self.interrupt.notify_waiters();

        Ok(match pending {
            0 => SkipOutcome::QueueEmpty,
            n => SkipOutcome::Next { remaining: n - 1 },
        })
    }

    /// Vacía la cola sin tocar la petición actual
    pub fn clear(&self) -> usize {
        self.state.lock().queue.clear()
    }

    pub fn shuffle(&self) -> usize {
        let mut s = self.state.lock();
        s.queue.shuffle();
        s.queue.len()
    }

    pub fn list_queue(&self) -> QueueSnapshot {
        let s = self.state.lock();
        QueueSnapshot {
            state: s.state,
            current: s.current.clone(),
            now_playing: s.now_playing.clone(),
            duration: s.duration,
            upcoming: s.queue.snapshot(),
        }
    }

    async fn drive(self: Arc<Self>) {
        debug!("🔁 Loop de reproducción iniciado en guild {}", self.guild);

        loop {
            let next = {
                let mut s = self.state.lock();
                if s.state == PlayerState::Stopped {
                    break;
                }
                let next = s.queue.pop_front();
                if let Some(request) = &next {
                    s.current = Some(request.clone());
                    s.now_playing = None;
                    s.duration = None;
                    s.state = PlayerState::Waiting;
                    s.interrupt = None;
                    s.idle_ticks = 0;
                }
                next
            };

            match next {
                Some(request) => {
                    self.emit(SessionEventKind::Resolving {
                        request: request.clone(),
                    });
                    self.play_request(request).await;
                }
                None => {
                    if !self.idle_wait().await {
                        break;
                    }
                }
            }
        }

        self.teardown().await;
    }

    /// Espera nuevas peticiones. Devuelve `false` si la sesión debe cerrarse.
    async fn idle_wait(&self) -> bool {
        let became_idle = {
            let mut s = self.state.lock();
            match s.state {
                PlayerState::Stopped => return false,
                PlayerState::Idle => false,
                _ => {
                    s.state = PlayerState::Idle;
                    true
                }
            }
        };
        if became_idle {
            debug!("💤 Cola vacía en guild {}", self.guild);
            self.emit(SessionEventKind::Idle);
        }

        let threshold = self.settings.idle_threshold();
        loop {
            tokio::select! {
                _ = self.wake.notified() => return true,
                _ = tokio::time::sleep(self.settings.idle_poll) => {
                    let mut s = self.state.lock();
                    if s.state == PlayerState::Stopped {
                        return false;
                    }
                    if !s.queue.is_empty() {
                        return true;
                    }
                    s.idle_ticks += 1;
                    if s.idle_ticks >= threshold {
                        info!(
                            "⏰ Sesión inactiva por {:?} en guild {}, desconectando",
                            self.settings.idle_timeout, self.guild
                        );
                        s.state = PlayerState::Stopped;
                        s.stop_reason = Some(StopReason::IdleTimeout);
                        return false;
                    }
                }
            }
        }
    }

    async fn play_request(&self, request: Request) {
        let resolved = tokio::select! {
            result = self.coordinator.resolve(&request.query) => result,
            interrupt = self.next_interrupt() => {
                debug!("Resolución de '{}' abandonada ({:?})", request.query, interrupt);
                self.finish_current();
                return;
            }
        };

        let track = match resolved {
            Ok(track) => track,
            Err(e) => {
                warn!("❌ No se pudo reproducir '{}': {}", request.query, e);
                self.fail(request, e);
                return;
            }
        };

        if let Err(e) = self.ensure_connected(request.voice_channel).await {
            error!("❌ Error de conexión de voz en guild {}: {}", self.guild, e);
            self.fail(request, e);
            return;
        }

        if self.state() == PlayerState::Stopped {
            self.finish_current();
            return;
        }

        let handle = match self.transport.play(self.guild, track.path()).await {
            Ok(handle) => handle,
            Err(e) => {
                error!("❌ Error al iniciar la reproducción: {}", e);
                self.state.lock().connected = None;
                self.fail(request, e);
                return;
            }
        };

        {
            let mut s = self.state.lock();
            if s.state == PlayerState::Stopped {
                handle.control.stop();
                drop(s);
                self.finish_current();
                return;
            }
            s.state = PlayerState::Playing;
            s.control = Some(handle.control.clone());
            s.now_playing = Some(track.title().to_string());
            s.duration = track.info.duration;
        }

        info!("🎵 Reproduciendo: {} en guild {}", track.title(), self.guild);
        self.emit(SessionEventKind::NowPlaying {
            request,
            title: track.title().to_string(),
            duration: track.info.duration,
        });

        let end = self.wait_playback(handle, &track).await;

        {
            let mut s = self.state.lock();
            s.control = None;
            if end == PlaybackEnd::Disconnected {
                s.connected = None;
            }
        }
        if let PlaybackEnd::Errored(reason) = &end {
            warn!("⚠️ El track {} terminó con error: {}", track.title(), reason);
        }

        self.finish_current();
        self.emit(SessionEventKind::TrackFinished {
            title: track.title().to_string(),
        });
        // Al soltar `track` se libera el pin de la caché
    }

    async fn wait_playback(&self, handle: PlaybackHandle, track: &ResolvedTrack) -> PlaybackEnd {
        let PlaybackHandle {
            control,
            mut finished,
        } = handle;

        let mut watchdog = tokio::time::interval(WATCHDOG_TICK);
        watchdog.tick().await;
        let mut played = Duration::ZERO;

        loop {
            tokio::select! {
                end = &mut finished => {
                    return end.unwrap_or(PlaybackEnd::Disconnected);
                }
                interrupt = self.next_interrupt() => {
                    debug!("Track {} cortado ({:?})", track.title(), interrupt);
                    control.stop();
                    return PlaybackEnd::Finished;
                }
                _ = watchdog.tick() => {
                    if self.state() == PlayerState::Playing {
                        played += WATCHDOG_TICK;
                    }
                    if played > self.settings.max_track_duration {
                        error!(
                            "⏱️ {} superó la duración máxima ({:?}), deteniendo",
                            track.title(),
                            self.settings.max_track_duration
                        );
                        control.stop();
                        return PlaybackEnd::Finished;
                    }
                }
            }
        }
    }

    async fn next_interrupt(&self) -> Interrupt {
        loop {
            let notified = self.interrupt.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let pending = self.state.lock().interrupt.take();
            if let Some(interrupt) = pending {
                return interrupt;
            }
            notified.await;
        }
    }

    async fn ensure_connected(&self, channel: ChannelId) -> PlaybackResult<()> {
        let connected = self.state.lock().connected;
        if connected == Some(channel) {
            return Ok(());
        }

        self.transport.connect(self.guild, channel).await?;
        self.state.lock().connected = Some(channel);
        Ok(())
    }

    fn fail(&self, request: Request, error: PlaybackError) {
        self.finish_current();
        self.emit(SessionEventKind::TrackFailed { request, error });
    }

    fn finish_current(&self) {
        let mut s = self.state.lock();
        s.current = None;
        s.now_playing = None;
        s.duration = None;
    }

    async fn teardown(&self) {
        let (was_connected, reason) = {
            let mut s = self.state.lock();
            s.state = PlayerState::Stopped;
            s.loop_running = false;
            s.current = None;
            s.now_playing = None;
            s.duration = None;
            s.queue.clear();
            if let Some(control) = s.control.take() {
                control.stop();
            }
            (
                s.connected.take().is_some(),
                s.stop_reason.unwrap_or(StopReason::Command),
            )
        };

        if was_connected {
            self.transport.disconnect(self.guild).await;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.guild, self);
        }

        info!("🛑 Sesión cerrada en guild {} ({:?})", self.guild, reason);
        self.emit(SessionEventKind::Stopped { reason });
        self.closed.send_replace(true);
    }

    fn emit(&self, kind: SessionEventKind) {
        let text_channel = self.state.lock().announce_channel;
        self.events.publish(SessionEvent {
            guild: self.guild,
            text_channel,
            kind,
        });
    }
}
